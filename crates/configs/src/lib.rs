use anyhow::Result;
use serde::Deserialize;
use anyhow::anyhow;

/// Lowest spacing the breach API tolerates between two lookups.
pub const MIN_INTER_CALL_DELAY_MS: u64 = 1500;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub lookup: LookupConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub mailgun: Option<MailgunConfig>,
    #[serde(default)]
    pub twilio: Option<TwilioConfig>,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LookupConfig {
    #[serde(default = "default_lookup_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_lookup_timeout")]
    pub timeout_ms: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: default_lookup_base_url(),
            user_agent: default_user_agent(),
            timeout_ms: default_lookup_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_inter_call_delay")]
    pub inter_call_delay_ms: u64,
    #[serde(default)]
    pub always_notify: bool,
    #[serde(default = "default_from")]
    pub from: String,
    /// Lets dev/test setups go below the upstream rate limit.
    #[serde(default)]
    pub allow_fast_delay: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            inter_call_delay_ms: default_inter_call_delay(),
            always_notify: false,
            from: default_from(),
            allow_fast_delay: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailgunConfig {
    #[serde(default = "default_mailgun_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub private_api_key: String,
}

impl Default for MailgunConfig {
    fn default() -> Self {
        Self { api_base: default_mailgun_api_base(), domain: String::new(), private_api_key: String::new() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwilioConfig {
    #[serde(default = "default_twilio_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default)]
    pub from_number: String,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            api_base: default_twilio_api_base(),
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { snapshot_path: default_snapshot_path() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub worker_threads: Option<usize>,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { worker_threads: Some(4), log_format: default_log_format() }
    }
}

fn default_lookup_base_url() -> String { "https://haveibeenpwned.com/api/v2/breachedaccount".into() }
fn default_user_agent() -> String { "RJ-And-Friends-Nightly-Pwnage-Checker".into() }
fn default_lookup_timeout() -> u64 { 7000 }
fn default_inter_call_delay() -> u64 { MIN_INTER_CALL_DELAY_MS }
fn default_from() -> String { "robot@mail.therileyjohnson.com".into() }
fn default_mailgun_api_base() -> String { "https://api.mailgun.net/v3".into() }
fn default_twilio_api_base() -> String { "https://api.twilio.com".into() }
fn default_snapshot_path() -> String { "data/keys.json".into() }
fn default_log_format() -> String { "compact".into() }

/// Explicit path first, then `CONFIG_PATH`, then `config.toml`.
pub fn config_path(explicit: Option<&str>) -> String {
    match explicit {
        Some(p) => p.to_string(),
        None => std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string()),
    }
}

/// Read `path`, or return the built-in defaults when it does not exist.
pub fn load_or_default(path: &str) -> Result<AppConfig> {
    if !std::path::Path::new(path).exists() {
        return Ok(AppConfig::default());
    }
    load_from_file(path).map_err(|e| anyhow!("failed to read {path}: {e}"))
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    load_from_str(&content)
}

pub fn load_from_str(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    /// Load from `path` (or `CONFIG_PATH`), falling back to defaults when the
    /// file does not exist, then normalize and validate.
    pub fn load_and_validate(path: Option<&str>) -> Result<Self> {
        let mut cfg = load_or_default(&config_path(path))?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.lookup.validate()?;
        self.notify.validate()?;
        // credentials may come from the environment instead of the file
        if let Some(mg) = MailgunConfig::normalize_from_env(self.mailgun.take()) {
            mg.validate()?;
            self.mailgun = Some(mg);
        }
        if let Some(tw) = TwilioConfig::normalize_from_env(self.twilio.take()) {
            tw.validate()?;
            self.twilio = Some(tw);
        }
        self.runtime.normalize();
        if self.store.snapshot_path.trim().is_empty() {
            return Err(anyhow!("store.snapshot_path must not be empty"));
        }
        Ok(())
    }
}

fn check_http_url(field: &str, url: &str) -> Result<()> {
    let lower = url.to_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return Err(anyhow!("{field} must start with http:// or https://"));
    }
    Ok(())
}

impl LookupConfig {
    pub fn validate(&self) -> Result<()> {
        check_http_url("lookup.base_url", &self.base_url)?;
        if self.user_agent.trim().is_empty() {
            return Err(anyhow!("lookup.user_agent must not be empty"));
        }
        if self.timeout_ms == 0 {
            return Err(anyhow!("lookup.timeout_ms must be a positive number of milliseconds"));
        }
        Ok(())
    }
}

impl NotifyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.inter_call_delay_ms < MIN_INTER_CALL_DELAY_MS && !self.allow_fast_delay {
            return Err(anyhow!(
                "notify.inter_call_delay_ms must be >= {MIN_INTER_CALL_DELAY_MS} (upstream rate limit)"
            ));
        }
        if !self.from.contains('@') {
            return Err(anyhow!("notify.from must be an email address"));
        }
        Ok(())
    }
}

impl MailgunConfig {
    /// Fill blank fields from `MAILGUN_DOMAIN` / `MAILGUN_API_KEY`. Returns
    /// `None` when neither the file nor the environment configures Mailgun.
    pub fn normalize_from_env(cfg: Option<Self>) -> Option<Self> {
        let env_domain = std::env::var("MAILGUN_DOMAIN").ok();
        let env_key = std::env::var("MAILGUN_API_KEY").ok();
        if cfg.is_none() && env_domain.is_none() && env_key.is_none() {
            return None;
        }
        let mut cfg = cfg.unwrap_or_default();
        if cfg.domain.trim().is_empty() {
            if let Some(d) = env_domain { cfg.domain = d; }
        }
        if cfg.private_api_key.trim().is_empty() {
            if let Some(k) = env_key { cfg.private_api_key = k; }
        }
        Some(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        check_http_url("mailgun.api_base", &self.api_base)?;
        if self.domain.trim().is_empty() {
            return Err(anyhow!("mailgun.domain is empty; set it in config.toml or MAILGUN_DOMAIN"));
        }
        if self.private_api_key.trim().is_empty() {
            return Err(anyhow!("mailgun.private_api_key is empty; set it in config.toml or MAILGUN_API_KEY"));
        }
        Ok(())
    }
}

impl TwilioConfig {
    /// Fill blank credentials from `TWILIO_ACCOUNT_SID` / `TWILIO_AUTH_TOKEN`.
    pub fn normalize_from_env(cfg: Option<Self>) -> Option<Self> {
        let env_sid = std::env::var("TWILIO_ACCOUNT_SID").ok();
        let env_token = std::env::var("TWILIO_AUTH_TOKEN").ok();
        if cfg.is_none() && env_sid.is_none() && env_token.is_none() {
            return None;
        }
        let mut cfg = cfg.unwrap_or_default();
        if cfg.account_sid.trim().is_empty() {
            if let Some(s) = env_sid { cfg.account_sid = s; }
        }
        if cfg.auth_token.trim().is_empty() {
            if let Some(t) = env_token { cfg.auth_token = t; }
        }
        Some(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        check_http_url("twilio.api_base", &self.api_base)?;
        if self.account_sid.trim().is_empty() || self.auth_token.trim().is_empty() {
            return Err(anyhow!("twilio.account_sid and twilio.auth_token are required when [twilio] is configured"));
        }
        if self.from_number.trim().is_empty() {
            return Err(anyhow!("twilio.from_number must not be empty"));
        }
        Ok(())
    }
}

impl RuntimeConfig {
    fn normalize(&mut self) {
        match self.worker_threads {
            Some(0) | None => self.worker_threads = Some(4),
            Some(_) => {}
        }
        if self.log_format.trim().is_empty() {
            self.log_format = default_log_format();
        }
    }
}
