//! Plain-text alert messages.

use std::fmt::Write as _;

use rust_decimal::{Decimal, RoundingStrategy};

use super::predicate::{Alert, AlertCategory, AlertDetail, Offender, MAX_LISTED_OFFENDERS};
use crate::records::LiquidationEvent;

/// Format a dollar amount as `$1,234.56`, rounding half away from zero.
#[must_use]
pub fn format_usd(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("${sign}{grouped}.{frac_part}")
}

/// Render an alert as the text sent to the market channel.
#[must_use]
pub fn render(alert: &Alert) -> String {
    match &alert.detail {
        AlertDetail::Liquidation {
            event,
            notional,
            threshold,
        } => liquidation_message(alert.category, event, *notional, *threshold),
        AlertDetail::Stale {
            block_number,
            block_time,
            threshold_secs,
            offenders,
        } => stale_message(
            block_number.as_deref(),
            block_time,
            *threshold_secs,
            offenders,
        ),
    }
}

fn liquidation_message(
    category: AlertCategory,
    event: &LiquidationEvent,
    notional: Option<Decimal>,
    threshold: Decimal,
) -> String {
    let mut lines = Vec::with_capacity(10);

    if category == AlertCategory::Backstop {
        lines.push("Liquidation alert: backstop (ADL occurred on the exchange)".to_string());
    } else {
        lines.push("Liquidation alert".to_string());
    }

    if let Some(method) = &event.method {
        lines.push(format!("method: {method}"));
    }
    if let Some(coin) = &event.coin {
        lines.push(format!("coin: {coin}"));
    }
    lines.push(format!("px: {}", event.px.as_deref().unwrap_or("n/a")));
    lines.push(format!("sz: {}", event.sz.as_deref().unwrap_or("n/a")));
    if let Some(notional) = notional {
        lines.push(format!(
            "notional: {} (threshold {})",
            format_usd(notional),
            format_usd(threshold)
        ));
    }
    if let Some(user) = &event.liquidated_user {
        lines.push(format!("user: {user}"));
    }
    if let Some(hash) = &event.hash {
        lines.push(format!("hash: {hash}"));
    }
    if let Some(block) = &event.block_number {
        lines.push(format!("block: {block}"));
    }
    if let Some(block_time) = &event.block_time {
        lines.push(format!("block_time: {block_time}"));
    }

    lines.join("\n")
}

fn stale_message(
    block_number: Option<&str>,
    block_time: &str,
    threshold_secs: f64,
    offenders: &[Offender],
) -> String {
    let worst = offenders.first().map_or(0.0, |o| o.skew_secs);

    let mut out = String::new();
    out.push_str("ALERT: HIP3 Oracle Update Skew Detected\n\n");
    let _ = writeln!(out, "Block: {}", block_number.unwrap_or("unknown"));
    let _ = writeln!(out, "Block Time: {block_time}");
    let _ = writeln!(out, "Threshold: {threshold_secs:.3}s");
    let _ = writeln!(out, "Worst Skew: {worst:.3}s");
    let _ = writeln!(out, "Total Stale Markets: {}\n", offenders.len());
    out.push_str("Market Name:");

    for (i, offender) in offenders.iter().take(MAX_LISTED_OFFENDERS).enumerate() {
        let _ = write!(
            out,
            "\n  {}. {} - Skew: {:.3}s (last_update: {})",
            i + 1,
            offender.symbol,
            offender.skew_secs,
            offender.last_update
        );
    }
    if offenders.len() > MAX_LISTED_OFFENDERS {
        let _ = write!(
            out,
            "\n\n... and {} more",
            offenders.len() - MAX_LISTED_OFFENDERS
        );
    }

    out
}
