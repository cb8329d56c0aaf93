//! Outbound message delivery (email and SMS).

pub mod mailgun;
pub mod twilio;

use async_trait::async_trait;
use thiserror::Error;

pub use mailgun::MailgunNotifier;
pub use twilio::TwilioNotifier;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected provider reply: {0}")]
    Decode(String),
}

/// A channel that can deliver one message and report the provider's id for it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<String, DeliveryError>;
}

/// In-memory notifier for tests and dry runs
pub mod mock {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SentMessage {
        pub recipient: String,
        pub subject: String,
        pub body: String,
    }

    #[derive(Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<SentMessage>>,
        failing: Mutex<HashSet<String>>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self { Self::default() }

        /// Make every send to `recipient` fail with a transport error.
        pub fn fail_for(&self, recipient: &str) {
            self.failing.lock().unwrap().insert(recipient.to_string());
        }

        pub fn sent(&self) -> Vec<SentMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<String, DeliveryError> {
            if self.failing.lock().unwrap().contains(recipient) {
                return Err(DeliveryError::Transport(format!("simulated failure for {recipient}")));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(SentMessage {
                recipient: recipient.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
            Ok(format!("mock-{}", sent.len()))
        }
    }
}
