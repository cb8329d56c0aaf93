//! Shared building blocks for the notifier workspace.
//! - `utils::logging`: tracing subscriber setup used by the binary.
//! - `env`: startup checks for the data directory.
//! - `types`: contact batch shapes consumed by the notification driver.

pub mod types;
pub mod utils;
pub mod env;
