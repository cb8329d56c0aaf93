use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{DeliveryError, Notifier};

#[derive(Debug, Deserialize)]
struct MailgunReply {
    id: String,
}

/// Email channel backed by the Mailgun messages API.
#[derive(Clone)]
pub struct MailgunNotifier {
    http: reqwest::Client,
    api_base: String,
    domain: String,
    api_key: String,
    from: String,
}

impl MailgunNotifier {
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        domain: impl Into<String>,
        api_key: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            domain: domain.into(),
            api_key: api_key.into(),
            from: from.into(),
        }
    }
}

#[async_trait]
impl Notifier for MailgunNotifier {
    #[instrument(level = "debug", skip(self, body))]
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<String, DeliveryError> {
        let url = format!("{}/{}/messages", self.api_base, self.domain);
        let resp = self
            .http
            .post(&url)
            .basic_auth("api", Some(&self.api_key))
            .form(&[
                ("from", self.from.as_str()),
                ("to", recipient),
                ("subject", subject),
                ("text", body),
            ])
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected { status: status.as_u16(), body });
        }
        let reply: MailgunReply = resp
            .json()
            .await
            .map_err(|e| DeliveryError::Decode(e.to_string()))?;
        debug!(event = "email_queued", id = %reply.id, "mailgun accepted message");
        Ok(reply.id)
    }
}
