//! Runtime wiring
//!
//! Builds the configured components so the binary only deals with
//! `configs::AppConfig` and never with provider details.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use configs::AppConfig;
use tracing::info;

use crate::delivery::{mock::RecordingNotifier, MailgunNotifier, Notifier, TwilioNotifier};
use crate::lookup::LookupClient;
use crate::notify::{DriverConfig, NotificationDriver};

/// Ensure the snapshot directory exists before the store is hydrated.
pub async fn ensure_env(snapshot_path: &str) -> anyhow::Result<()> {
    common::env::ensure_env(snapshot_path).await
}

pub fn driver_config(cfg: &AppConfig) -> DriverConfig {
    DriverConfig {
        lookup_timeout: Duration::from_millis(cfg.lookup.timeout_ms),
        inter_call_delay: Duration::from_millis(cfg.notify.inter_call_delay_ms),
    }
}

type Channels = (Arc<dyn Notifier>, Option<Arc<dyn Notifier>>);

/// Email and SMS channels. Dry runs record messages in memory; a real run
/// needs a Mailgun section and fails without one.
pub fn build_notifiers(
    cfg: &AppConfig,
    http: &reqwest::Client,
    dry_run: bool,
) -> anyhow::Result<Channels> {
    if dry_run {
        info!(event = "dry_run", "messages are recorded, not sent");
        let email: Arc<dyn Notifier> = Arc::new(RecordingNotifier::new());
        let sms: Arc<dyn Notifier> = Arc::new(RecordingNotifier::new());
        return Ok((email, Some(sms)));
    }

    let mg = cfg.mailgun.as_ref().ok_or_else(|| {
        anyhow!(
            "no [mailgun] section or MAILGUN_* credentials configured; \
             pass --dry-run to record messages instead"
        )
    })?;
    let email: Arc<dyn Notifier> = Arc::new(MailgunNotifier::new(
        http.clone(),
        mg.api_base.clone(),
        mg.domain.clone(),
        mg.private_api_key.clone(),
        cfg.notify.from.clone(),
    ));
    let sms: Option<Arc<dyn Notifier>> = cfg.twilio.as_ref().map(|tw| {
        Arc::new(TwilioNotifier::new(
            http.clone(),
            tw.api_base.clone(),
            tw.account_sid.clone(),
            tw.auth_token.clone(),
            tw.from_number.clone(),
        )) as Arc<dyn Notifier>
    });
    Ok((email, sms))
}

pub fn build_driver(cfg: &AppConfig, dry_run: bool) -> anyhow::Result<NotificationDriver> {
    let http = reqwest::Client::builder().build().context("cannot build HTTP client")?;
    let lookup = LookupClient::with_client(
        http.clone(),
        cfg.lookup.base_url.clone(),
        cfg.lookup.user_agent.clone(),
    );
    let (email, sms) = build_notifiers(cfg, &http, dry_run)?;
    Ok(NotificationDriver::new(Arc::new(lookup), email, sms, driver_config(cfg)))
}

/// How a command ended when raced against a shutdown signal.
#[derive(Debug, PartialEq, Eq)]
pub enum Completion<T> {
    Finished(T),
    Interrupted,
}

/// Drive `work` until it finishes or `shutdown` resolves first. An
/// interrupted command is dropped mid-flight, so callers must treat
/// `Interrupted` as incomplete work.
pub async fn until_shutdown<W, S>(work: W, shutdown: S) -> Completion<W::Output>
where
    W: Future,
    S: Future,
{
    tokio::select! {
        out = work => Completion::Finished(out),
        _ = shutdown => Completion::Interrupted,
    }
}
