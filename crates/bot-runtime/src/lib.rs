//! # Bot Runtime Library
//!
//! Exposes the runtime's configuration loader and outbound adapters for
//! testing. The entry point is the `main.rs` binary.

#![warn(clippy::all)]

pub mod adapters;
pub mod config;

pub use adapters::WeComNotifier;
pub use config::{RuntimeConfig, RuntimeConfigError};
