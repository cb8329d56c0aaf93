//! Breach lookups against the upstream breach database.
//!
//! `LookupClient` performs one bounded request per address and reports a
//! `LookupOutcome`. The `BreachLookup` trait is the seam the notification
//! driver depends on so tests can script outcomes without a network.

pub mod client;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::LookupClient;

/// One breach entry as reported by the upstream service.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct BreachRecord {
    pub name: String,
    pub title: String,
    pub domain: String,
    pub breach_date: String,
    pub added_date: String,
    pub modified_date: String,
    pub pwn_count: i64,
    pub description: String,
    #[serde(default)]
    pub logo_path: String,
    #[serde(default)]
    pub data_classes: Vec<String>,
    pub is_verified: bool,
    pub is_fabricated: bool,
    pub is_sensitive: bool,
    pub is_retired: bool,
    pub is_spam_list: bool,
}

/// Failures of a single lookup. Timeouts are not an error variant; they are
/// reported as `LookupOutcome::TimedOut`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned status {status}")]
    Status { status: u16 },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("lookup task failed: {0}")]
    Task(String),
}

impl LookupError {
    /// Stable numeric code for external mapping/logging
    pub fn code(&self) -> u16 {
        match self {
            LookupError::Transport(_) => 2001,
            LookupError::Status { .. } => 2002,
            LookupError::Decode(_) => 2101,
            LookupError::Task(_) => 2200,
        }
    }

    /// True when the failure points at the upstream side rather than at the
    /// request we sent.
    pub fn is_upstream_unavailable(&self) -> bool {
        match self {
            LookupError::Transport(_) | LookupError::Task(_) => true,
            LookupError::Status { status } => *status >= 500 || *status == 429,
            LookupError::Decode(_) => false,
        }
    }
}

/// Result of one breach lookup. Exactly one variant applies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(Vec<BreachRecord>),
    NotFound,
    Failed(LookupError),
    TimedOut,
}

impl LookupOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            LookupOutcome::Found(_) => "found",
            LookupOutcome::NotFound => "not_found",
            LookupOutcome::Failed(_) => "failed",
            LookupOutcome::TimedOut => "timed_out",
        }
    }
}

#[async_trait]
pub trait BreachLookup: Send + Sync {
    async fn lookup(&self, address: &str, deadline: Duration) -> LookupOutcome;
}
