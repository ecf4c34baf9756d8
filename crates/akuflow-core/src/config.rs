//! Akuflow configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AkuflowError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AkuflowConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl AkuflowConfig {
    /// Load config from `$AKUFLOW_CONFIG` or the default path, then apply
    /// environment overrides. A missing file yields defaults.
    pub fn load() -> Result<Self> {
        let path = Self::resolve_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AkuflowError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AkuflowError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Config path: `$AKUFLOW_CONFIG` if set, else the default path.
    pub fn resolve_path() -> PathBuf {
        std::env::var("AKUFLOW_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Akuflow home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".akuflow")
    }

    /// Secrets and connection strings usually come from the deployment
    /// environment rather than the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(secret) = non_empty("CRON_SECRET") {
            self.gateway.cron_secret = Some(secret);
        }
        if let Some(key) = non_empty("RESEND_API_KEY") {
            self.mail.resend_api_key = key;
        }
        if let Some(url) = non_empty("DATABASE_URL") {
            self.storage.postgres_url = url;
        }
        if let Some(backend) = non_empty("AKUFLOW_STORAGE") {
            self.storage.backend = backend;
        }
    }
}

fn bool_true() -> bool { true }

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret the cron trigger must present as a bearer token.
    #[serde(default)]
    pub cron_secret: Option<String>,
    /// Accept unauthenticated cron triggers when no secret is configured.
    /// Off by default: without a secret the trigger refuses to run.
    #[serde(default)]
    pub allow_missing_cron_secret: bool,
    /// Bearer keys for the admin API.
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
    #[serde(default = "bool_true")]
    pub cors_permissive: bool,
}

fn default_port() -> u16 { 3000 }
fn default_host() -> String { "127.0.0.1".into() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cron_secret: None,
            allow_missing_cron_secret: false,
            api_keys: Vec::new(),
            cors_permissive: true,
        }
    }
}

/// Roles that can be granted to admin API keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Support,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Support => "support",
        }
    }
}

/// One admin API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    pub key: String,
    pub role: Role,
    #[serde(default)]
    pub label: String,
}

/// Storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `sqlite`, `postgres`, or `memory`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default)]
    pub postgres_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_storage_backend() -> String { "sqlite".into() }
fn default_sqlite_path() -> String { "~/.akuflow/akuflow.db".into() }
fn default_max_connections() -> u32 { 5 }

impl StorageConfig {
    /// SQLite path with `~` expanded.
    pub fn expanded_sqlite_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.sqlite_path).to_string())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            sqlite_path: default_sqlite_path(),
            postgres_url: String::new(),
            max_connections: default_max_connections(),
        }
    }
}

/// Outbound mail configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// `resend`, `smtp`, or `log`.
    #[serde(default = "default_mail_provider")]
    pub provider: String,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    #[serde(default)]
    pub resend_api_key: String,
    #[serde(default = "default_resend_base_url")]
    pub resend_base_url: String,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,
}

fn default_mail_provider() -> String { "log".into() }
fn default_from_email() -> String { "hello@akuflow.dev".into() }
fn default_from_name() -> String { "Akuflow".into() }
fn default_resend_base_url() -> String { "https://api.resend.com".into() }
fn default_smtp_port() -> u16 { 587 }
fn default_mail_timeout() -> u64 { 30 }

impl MailConfig {
    /// `Name <address>` form used in the From header.
    pub fn from_header(&self) -> String {
        if self.from_name.is_empty() {
            self.from_email.clone()
        } else {
            format!("{} <{}>", self.from_name, self.from_email)
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            provider: default_mail_provider(),
            from_email: default_from_email(),
            from_name: default_from_name(),
            resend_api_key: String::new(),
            resend_base_url: default_resend_base_url(),
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            timeout_secs: default_mail_timeout(),
        }
    }
}

/// Retention job tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Max candidates fetched per stage per run.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Base URL linked from every email.
    #[serde(default = "default_app_url")]
    pub app_url: String,
    /// How far the window start reaches before the stage anchor.
    #[serde(default = "default_window_lead_hours")]
    pub window_lead_hours: i64,
    /// Window width.
    #[serde(default = "default_window_span_hours")]
    pub window_span_hours: i64,
    /// Run the job in-process every N seconds. 0 leaves scheduling to an
    /// external trigger.
    #[serde(default)]
    pub interval_secs: u64,
}

fn default_batch_size() -> u32 { 100 }
fn default_app_url() -> String { "https://app.akuflow.dev".into() }
fn default_window_lead_hours() -> i64 { 1 }
fn default_window_span_hours() -> i64 { 24 }

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            app_url: default_app_url(),
            window_lead_hours: default_window_lead_hours(),
            window_span_hours: default_window_span_hours(),
            interval_secs: 0,
        }
    }
}
