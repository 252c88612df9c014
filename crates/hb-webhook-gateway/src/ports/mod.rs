//! Ports (hexagonal boundaries) for the Webhook Gateway.

pub mod outbound;

pub use outbound::{ClockSource, LookupError, Notifier, NotifyError, RecipeLookup, SystemClock};
