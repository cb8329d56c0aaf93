use std::sync::Arc;
use std::time::Duration;

use common::types::Contact;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::delivery::Notifier;
use crate::lookup::{BreachLookup, BreachRecord, LookupOutcome};

pub const BREACH_SUBJECT: &str = "YOU HAVE BEEN PWNED :(";
pub const CLEAN_SUBJECT: &str = "YOU HAVE NOT BEEN PWNED :)";

#[derive(Clone, Debug)]
pub struct DriverConfig {
    pub lookup_timeout: Duration,
    /// Pause between two consecutive contacts; the upstream allows one
    /// lookup per 1.5 s.
    pub inter_call_delay: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { lookup_timeout: Duration::from_secs(7), inter_call_delay: Duration::from_millis(1500) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pwned,
    Clean,
    Failed,
    TimedOut,
}

/// What happened for one contact of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct ContactReport {
    pub email: String,
    pub verdict: Verdict,
    pub breaches: usize,
    pub subject: Option<&'static str>,
    pub email_delivery: Option<String>,
    pub sms_delivery: Option<String>,
    pub error: Option<String>,
}

impl ContactReport {
    fn new(email: &str, verdict: Verdict) -> Self {
        Self {
            email: email.to_string(),
            verdict,
            breaches: 0,
            subject: None,
            email_delivery: None,
            sms_delivery: None,
            error: None,
        }
    }
}

/// Runs contacts through lookup and delivery strictly one at a time.
pub struct NotificationDriver {
    lookup: Arc<dyn BreachLookup>,
    email: Arc<dyn Notifier>,
    sms: Option<Arc<dyn Notifier>>,
    cfg: DriverConfig,
}

impl NotificationDriver {
    pub fn new(
        lookup: Arc<dyn BreachLookup>,
        email: Arc<dyn Notifier>,
        sms: Option<Arc<dyn Notifier>>,
        cfg: DriverConfig,
    ) -> Self {
        Self { lookup, email, sms, cfg }
    }

    /// Process `contacts` in order. Failures are recorded in the reports and
    /// never stop the batch; the inter-call delay is applied between every
    /// pair of contacts regardless of outcome.
    #[instrument(skip(self, contacts), fields(contacts = contacts.len()))]
    pub async fn run_batch(&self, contacts: &[Contact], always_notify: bool) -> Vec<ContactReport> {
        let mut reports = Vec::with_capacity(contacts.len());
        for (i, contact) in contacts.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.cfg.inter_call_delay).await;
            }
            reports.push(self.notify_contact(contact, always_notify).await);
        }

        let pwned = reports.iter().filter(|r| r.verdict == Verdict::Pwned).count();
        let failed = reports.iter().filter(|r| r.error.is_some()).count();
        info!(event = "batch_done", total = reports.len(), pwned, failed, "notification batch finished");
        reports
    }

    /// Lookup and deliver for a single contact. No delay is applied here.
    pub async fn notify_contact(&self, contact: &Contact, always_notify: bool) -> ContactReport {
        let outcome = self.lookup.lookup(&contact.email, self.cfg.lookup_timeout).await;

        let (mut report, message) = match outcome {
            LookupOutcome::Found(records) => {
                let mut report = ContactReport::new(&contact.email, Verdict::Pwned);
                report.breaches = records.len();
                (report, Some((BREACH_SUBJECT, breach_body(&contact.email, &records))))
            }
            LookupOutcome::NotFound => {
                let report = ContactReport::new(&contact.email, Verdict::Clean);
                let message = always_notify.then(|| (CLEAN_SUBJECT, clean_body(&contact.email)));
                (report, message)
            }
            // a failed lookup says nothing about the address, so nobody is told
            LookupOutcome::Failed(e) => {
                let mut report = ContactReport::new(&contact.email, Verdict::Failed);
                report.error = Some(format!("lookup failed: {e}"));
                (report, None)
            }
            LookupOutcome::TimedOut => {
                let mut report = ContactReport::new(&contact.email, Verdict::TimedOut);
                report.error = Some("lookup timed out".to_string());
                (report, None)
            }
        };

        let Some((subject, body)) = message else {
            debug!(event = "no_message", verdict = ?report.verdict, "nothing to deliver");
            return report;
        };
        report.subject = Some(subject);

        match self.email.send(&contact.email, subject, &body).await {
            Ok(id) => report.email_delivery = Some(id),
            Err(e) => {
                warn!(event = "email_failed", error = %e, "primary delivery failed; skipping secondary");
                report.error = Some(format!("email delivery failed: {e}"));
                return report;
            }
        }

        if contact.phone.is_empty() {
            return report;
        }
        let Some(sms) = &self.sms else {
            warn!(event = "sms_unconfigured", "contact has a phone number but no SMS channel is configured");
            return report;
        };
        match sms.send(&contact.phone, subject, "").await {
            Ok(id) => report.sms_delivery = Some(id),
            Err(e) => {
                warn!(event = "sms_failed", error = %e, "secondary delivery failed");
                report.error = Some(format!("sms delivery failed: {e}"));
            }
        }
        report
    }
}

fn breach_body(email: &str, records: &[BreachRecord]) -> String {
    let mut body = format!("{email} appears in {} known breach(es):\n", records.len());
    for r in records {
        body.push_str(&format!("- {} ({}), breached {}", r.title, r.domain, r.breach_date));
        if !r.data_classes.is_empty() {
            body.push_str(&format!(": {}", r.data_classes.join(", ")));
        }
        body.push('\n');
    }
    body
}

fn clean_body(email: &str) -> String {
    format!("{email} does not appear in any known breach.\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::mock::RecordingNotifier;
    use crate::lookup::LookupError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn record(title: &str) -> BreachRecord {
        BreachRecord {
            name: title.into(),
            title: title.into(),
            domain: format!("{}.com", title.to_lowercase()),
            breach_date: "2013-10-04".into(),
            added_date: "2013-12-04T00:00:00Z".into(),
            modified_date: "2013-12-04T00:00:00Z".into(),
            pwn_count: 10,
            description: String::new(),
            logo_path: String::new(),
            data_classes: vec!["Passwords".into()],
            is_verified: true,
            is_fabricated: false,
            is_sensitive: false,
            is_retired: false,
            is_spam_list: false,
        }
    }

    /// Returns scripted outcomes per address and records when it was called.
    struct ScriptedLookup {
        outcomes: HashMap<String, LookupOutcome>,
        calls: Mutex<Vec<(String, Duration, Instant)>>,
    }

    impl ScriptedLookup {
        fn new(outcomes: Vec<(&str, LookupOutcome)>) -> Self {
            Self {
                outcomes: outcomes.into_iter().map(|(a, o)| (a.to_string(), o)).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BreachLookup for ScriptedLookup {
        async fn lookup(&self, address: &str, deadline: Duration) -> LookupOutcome {
            self.calls.lock().unwrap().push((address.to_string(), deadline, Instant::now()));
            self.outcomes.get(address).cloned().unwrap_or(LookupOutcome::NotFound)
        }
    }

    fn driver(
        lookup: Arc<ScriptedLookup>,
        email: Arc<RecordingNotifier>,
        sms: Option<Arc<RecordingNotifier>>,
    ) -> NotificationDriver {
        NotificationDriver::new(
            lookup,
            email,
            sms.map(|s| s as Arc<dyn Notifier>),
            DriverConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn three_contacts_take_two_delays_even_when_lookups_fail() {
        let lookup = Arc::new(ScriptedLookup::new(vec![
            ("a@example.com", LookupOutcome::Failed(LookupError::Transport("refused".into()))),
            ("b@example.com", LookupOutcome::TimedOut),
            ("c@example.com", LookupOutcome::Found(vec![record("Adobe")])),
        ]));
        let email = Arc::new(RecordingNotifier::new());
        let d = driver(lookup.clone(), email.clone(), None);

        let contacts = vec![
            Contact::new("a@example.com", ""),
            Contact::new("b@example.com", ""),
            Contact::new("c@example.com", ""),
        ];
        let started = Instant::now();
        let reports = d.run_batch(&contacts, false).await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(3000), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(3100), "elapsed {:?}", elapsed);

        let calls = lookup.calls.lock().unwrap();
        let order: Vec<_> = calls.iter().map(|c| c.0.as_str()).collect();
        assert_eq!(order, vec!["a@example.com", "b@example.com", "c@example.com"]);
        for pair in calls.windows(2) {
            assert!(pair[1].2 - pair[0].2 >= Duration::from_millis(1500));
        }
        assert!(calls.iter().all(|c| c.1 == Duration::from_secs(7)));

        let verdicts: Vec<_> = reports.iter().map(|r| r.verdict).collect();
        assert_eq!(verdicts, vec![Verdict::Failed, Verdict::TimedOut, Verdict::Pwned]);
    }

    #[tokio::test(start_paused = true)]
    async fn single_contact_has_no_delay() {
        let lookup = Arc::new(ScriptedLookup::new(vec![]));
        let d = driver(lookup, Arc::new(RecordingNotifier::new()), None);

        let started = Instant::now();
        d.run_batch(&[Contact::new("solo@example.com", "")], false).await;
        assert!(started.elapsed() < Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn pwned_contact_gets_email_then_sms() {
        let lookup = Arc::new(ScriptedLookup::new(vec![(
            "victim@example.com",
            LookupOutcome::Found(vec![record("Adobe"), record("Zynga")]),
        )]));
        let email = Arc::new(RecordingNotifier::new());
        let sms = Arc::new(RecordingNotifier::new());
        let d = driver(lookup, email.clone(), Some(sms.clone()));

        let report = d.notify_contact(&Contact::new("victim@example.com", "+15550100"), false).await;
        assert_eq!(report.verdict, Verdict::Pwned);
        assert_eq!(report.breaches, 2);
        assert_eq!(report.email_delivery.as_deref(), Some("mock-1"));
        assert_eq!(report.sms_delivery.as_deref(), Some("mock-1"));
        assert!(report.error.is_none());

        let mails = email.sent();
        assert_eq!(mails[0].recipient, "victim@example.com");
        assert_eq!(mails[0].subject, BREACH_SUBJECT);
        assert!(mails[0].body.contains("Adobe (adobe.com)"));
        assert!(mails[0].body.contains("Zynga (zynga.com)"));
        let texts = sms.sent();
        assert_eq!(texts[0].recipient, "+15550100");
        assert_eq!(texts[0].subject, BREACH_SUBJECT);
    }

    #[tokio::test]
    async fn clean_contact_is_told_only_when_always_notify() {
        let lookup = Arc::new(ScriptedLookup::new(vec![]));
        let email = Arc::new(RecordingNotifier::new());
        let sms = Arc::new(RecordingNotifier::new());
        let d = driver(lookup, email.clone(), Some(sms.clone()));
        let contact = Contact::new("clean@example.com", "+15550101");

        let quiet = d.notify_contact(&contact, false).await;
        assert_eq!(quiet.verdict, Verdict::Clean);
        assert!(quiet.subject.is_none());
        assert!(email.sent().is_empty());

        let told = d.notify_contact(&contact, true).await;
        assert_eq!(told.subject, Some(CLEAN_SUBJECT));
        assert_eq!(email.sent()[0].subject, CLEAN_SUBJECT);
        assert_eq!(sms.sent()[0].subject, CLEAN_SUBJECT);
    }

    #[tokio::test]
    async fn failed_or_timed_out_lookup_sends_nothing() {
        let lookup = Arc::new(ScriptedLookup::new(vec![
            ("err@example.com", LookupOutcome::Failed(LookupError::Decode("eof".into()))),
            ("slow@example.com", LookupOutcome::TimedOut),
        ]));
        let email = Arc::new(RecordingNotifier::new());
        let d = driver(lookup, email.clone(), None);

        let failed = d.notify_contact(&Contact::new("err@example.com", ""), true).await;
        let timed_out = d.notify_contact(&Contact::new("slow@example.com", ""), true).await;

        assert!(failed.error.as_deref().unwrap().contains("decode"));
        assert_eq!(timed_out.verdict, Verdict::TimedOut);
        assert!(email.sent().is_empty());
    }

    #[tokio::test]
    async fn email_failure_skips_sms_and_batch_continues() {
        let lookup = Arc::new(ScriptedLookup::new(vec![
            ("broken@example.com", LookupOutcome::Found(vec![record("Adobe")])),
            ("ok@example.com", LookupOutcome::Found(vec![record("Adobe")])),
        ]));
        let email = Arc::new(RecordingNotifier::new());
        email.fail_for("broken@example.com");
        let sms = Arc::new(RecordingNotifier::new());
        let d = NotificationDriver::new(
            lookup,
            email.clone(),
            Some(sms.clone()),
            DriverConfig { lookup_timeout: Duration::from_secs(7), inter_call_delay: Duration::from_millis(1) },
        );

        let reports = d
            .run_batch(
                &[Contact::new("broken@example.com", "+1555"), Contact::new("ok@example.com", "+1666")],
                false,
            )
            .await;

        assert!(reports[0].error.as_deref().unwrap().contains("email delivery failed"));
        assert!(reports[0].sms_delivery.is_none());
        assert!(reports[1].error.is_none());
        let texts = sms.sent();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].recipient, "+1666");
    }

    #[tokio::test]
    async fn empty_phone_or_missing_channel_skips_sms() {
        let lookup = Arc::new(ScriptedLookup::new(vec![(
            "victim@example.com",
            LookupOutcome::Found(vec![record("Adobe")]),
        )]));
        let sms = Arc::new(RecordingNotifier::new());
        let d = driver(lookup.clone(), Arc::new(RecordingNotifier::new()), Some(sms.clone()));
        let report = d.notify_contact(&Contact::new("victim@example.com", ""), false).await;
        assert!(report.sms_delivery.is_none());
        assert!(sms.sent().is_empty());

        let no_channel = driver(lookup, Arc::new(RecordingNotifier::new()), None);
        let report = no_channel.notify_contact(&Contact::new("victim@example.com", "+1555"), false).await;
        assert!(report.email_delivery.is_some());
        assert!(report.sms_delivery.is_none());
        assert!(report.error.is_none());
    }
}
