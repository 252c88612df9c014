//! Outbound adapters wired into the gateway by the runtime.

pub mod wecom;

pub use wecom::WeComNotifier;
