use serde::{Deserialize, Serialize};

/// One person to check: the address that is looked up and an optional
/// phone number used as the secondary channel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

impl Contact {
    pub fn new(email: impl Into<String>, phone: impl Into<String>) -> Self {
        Self { email: email.into(), phone: phone.into() }
    }
}

/// Batch body accepted by the notifier: `{"contacts": [...]}`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ContactBatch {
    #[serde(default)]
    pub contacts: Vec<Contact>,
}
