//! Batch notification: lookup, decide, deliver, wait.

pub mod driver;

pub use driver::{ContactReport, DriverConfig, NotificationDriver, Verdict, BREACH_SUBJECT, CLEAN_SUBJECT};
