use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;
use tracing::{debug, info, instrument, warn};

use super::{BreachLookup, BreachRecord, LookupError, LookupOutcome};

/// HTTP client for the breach lookup API.
///
/// Each call issues exactly one `GET {base_url}/{address}` and never retries.
/// The request runs on its own task so the caller's deadline can win the race;
/// a request that loses is left to finish in the background and its result is
/// dropped with the task.
#[derive(Clone)]
pub struct LookupClient {
    http: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl LookupClient {
    pub fn new(
        base_url: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        Ok(Self::with_client(http, base_url, user_agent))
    }

    /// Reuse an existing connection pool.
    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url, user_agent: user_agent.into() }
    }

    /// Full request URL for `address`; the address is percent-encoded as a
    /// single path segment.
    pub fn request_url(&self, address: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(address))
    }

    #[instrument(level = "debug", skip(self), fields(deadline_ms = deadline.as_millis() as u64))]
    pub async fn lookup(&self, address: &str, deadline: Duration) -> LookupOutcome {
        let url = self.request_url(address);
        let started = Instant::now();
        let mut task = tokio::spawn(fetch_breaches(
            self.http.clone(),
            url,
            self.user_agent.clone(),
        ));

        let outcome = tokio::select! {
            joined = &mut task => match joined {
                Ok(Ok(Some(records))) => LookupOutcome::Found(records),
                Ok(Ok(None)) => LookupOutcome::NotFound,
                Ok(Err(e)) => LookupOutcome::Failed(e),
                Err(e) => LookupOutcome::Failed(LookupError::Task(e.to_string())),
            },
            _ = tokio::time::sleep(deadline) => {
                // detach: the request finishes or fails on its own
                drop(task);
                LookupOutcome::TimedOut
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            LookupOutcome::Found(records) => info!(
                event = "lookup_found",
                breaches = records.len(),
                elapsed_ms,
                "address found in breaches"
            ),
            LookupOutcome::NotFound => {
                debug!(event = "lookup_not_found", elapsed_ms, "no breach for address")
            }
            LookupOutcome::Failed(e) => warn!(
                event = "lookup_failed",
                error = %e,
                code = e.code(),
                elapsed_ms,
                "breach lookup failed"
            ),
            LookupOutcome::TimedOut => warn!(
                event = "lookup_timed_out",
                elapsed_ms,
                "breach lookup deadline elapsed"
            ),
        }
        outcome
    }
}

#[async_trait]
impl BreachLookup for LookupClient {
    async fn lookup(&self, address: &str, deadline: Duration) -> LookupOutcome {
        LookupClient::lookup(self, address, deadline).await
    }
}

/// `Ok(None)` means the upstream answered "no breach": an empty body on a
/// success or 404 reply. Any other error status is a failure, body or not.
async fn fetch_breaches(
    http: reqwest::Client,
    url: String,
    user_agent: String,
) -> Result<Option<Vec<BreachRecord>>, LookupError> {
    let resp = http
        .get(&url)
        .header(USER_AGENT, user_agent)
        .send()
        .await
        .map_err(|e| LookupError::Transport(e.to_string()))?;
    let status = resp.status();
    let body = resp
        .bytes()
        .await
        .map_err(|e| LookupError::Transport(e.to_string()))?;

    let no_breach_status = status.is_success() || status == StatusCode::NOT_FOUND;
    if body.is_empty() && no_breach_status {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(LookupError::Status { status: status.as_u16() });
    }
    serde_json::from_slice::<Vec<BreachRecord>>(&body)
        .map(Some)
        .map_err(|e| LookupError::Decode(e.to_string()))
}
