use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{DeliveryError, Notifier};

#[derive(Debug, Deserialize)]
struct TwilioReply {
    sid: String,
}

/// SMS channel backed by the Twilio Messages API.
#[derive(Clone)]
pub struct TwilioNotifier {
    http: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioNotifier {
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: from_number.into(),
        }
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    /// SMS has no subject line; `subject` and `body` are joined into one text.
    #[instrument(level = "debug", skip(self, body))]
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<String, DeliveryError> {
        let url = format!("{}/2010-04-01/Accounts/{}/Messages.json", self.api_base, self.account_sid);
        let text = if body.is_empty() { subject.to_string() } else { format!("{subject}\n{body}") };
        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("From", self.from_number.as_str()), ("To", recipient), ("Body", text.as_str())])
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected { status: status.as_u16(), body });
        }
        let reply: TwilioReply = resp
            .json()
            .await
            .map_err(|e| DeliveryError::Decode(e.to_string()))?;
        debug!(event = "sms_queued", sid = %reply.sid, "twilio accepted message");
        Ok(reply.sid)
    }
}
