//! Alert evaluation, suppression and delivery.
//!
//! A [`DomainEvent`](crate::records::DomainEvent) goes through the
//! [`AlertPredicate`], then the per-category [`AlertGate`], and finally the
//! [`AlertDispatcher`] which renders and sends it.

mod dispatch;
mod gate;
mod message;
mod predicate;

pub use dispatch::{
    AlertDispatcher, DisabledNotifier, Notifier, NotifyError, TelegramNotifier,
    DEFAULT_SEND_TIMEOUT, TELEGRAM_API_BASE,
};
pub use gate::{
    AlertGate, DedupGate, RateWindow, SuppressionPolicy, DEFAULT_LIQUIDATION_CAPACITY,
    DEFAULT_STALE_CAPACITY,
};
pub use message::{format_usd, render};
pub use predicate::{
    classify_liquidation, notional, parse_decimal, parse_timestamp, stale_offenders, Alert,
    AlertCategory, AlertDetail, AlertKey, AlertPredicate, LiquidationRules, Offender, StaleRules,
    Verdict, MAX_LISTED_OFFENDERS,
};
