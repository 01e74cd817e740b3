//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ProvisionError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Provisioner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Console log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit console logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Directory for the rolling log file
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Container registry host
    #[serde(default = "default_registry")]
    pub registry: String,

    /// Editor opened when an artifact fails validation
    #[serde(default = "default_editor")]
    pub editor: String,

    /// Seconds to wait after `up -d` before polling container status
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,

    /// Local port the application container publishes
    #[serde(default = "default_app_port")]
    pub app_port: u16,

    /// Compose file name inside the app dir
    #[serde(default = "default_compose_file")]
    pub compose_file: String,

    /// Name used for the systemd unit and Nginx site
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Human readable site name written to the environment file
    #[serde(default = "default_site_name")]
    pub site_name: String,

    /// Dedicated OS user created for deployments
    #[serde(default = "default_deployer_user")]
    pub deployer_user: String,

    /// Generate a `SECRET_KEY` when the environment file has none
    #[serde(default = "default_true")]
    pub generate_secret_key: bool,

    /// Nginx rate limiting
    #[serde(default)]
    pub rate_limits: RateLimitSettings,

    /// `/etc/os-release` IDs the pipeline accepts
    #[serde(default = "default_distributions")]
    pub supported_distributions: Vec<String>,

    /// Baseline apt packages
    #[serde(default = "default_base_packages")]
    pub base_packages: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/escprov")
}

fn default_registry() -> String {
    "ghcr.io".to_string()
}

fn default_editor() -> String {
    std::env::var("EDITOR").unwrap_or_else(|_| "nano".to_string())
}

fn default_settle_secs() -> u64 {
    10
}

fn default_app_port() -> u16 {
    8000
}

fn default_compose_file() -> String {
    "docker-compose.yml".to_string()
}

fn default_service_name() -> String {
    "esc".to_string()
}

fn default_site_name() -> String {
    "ESC".to_string()
}

fn default_deployer_user() -> String {
    "deployer".to_string()
}

fn default_distributions() -> Vec<String> {
    vec!["ubuntu".to_string(), "debian".to_string()]
}

fn default_base_packages() -> Vec<String> {
    [
        "ca-certificates",
        "curl",
        "git",
        "gnupg",
        "lsb-release",
        "openssl",
        "ufw",
        "unattended-upgrades",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Warn,
            log_json: false,
            log_dir: default_log_dir(),
            registry: default_registry(),
            editor: default_editor(),
            settle_secs: default_settle_secs(),
            app_port: default_app_port(),
            compose_file: default_compose_file(),
            service_name: default_service_name(),
            site_name: default_site_name(),
            deployer_user: default_deployer_user(),
            generate_secret_key: true,
            rate_limits: RateLimitSettings::default(),
            supported_distributions: default_distributions(),
            base_packages: default_base_packages(),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the file is absent
    pub async fn load(file: &File) -> Result<Self, ProvisionError> {
        if !file.exists().await {
            debug!("No settings file at {:?}, using defaults", file.path());
            return Ok(Self::default());
        }
        file.read_json().await
    }
}

/// Nginx `limit_req` zones
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Site-wide rate
    #[serde(default = "default_general_rate")]
    pub general: String,

    /// Rate for `/api/`
    #[serde(default = "default_api_rate")]
    pub api: String,

    /// Rate for login and auth endpoints
    #[serde(default = "default_auth_rate")]
    pub auth: String,

    /// Status returned when a limit is exceeded
    #[serde(default = "default_limit_status")]
    pub status_code: u16,
}

fn default_general_rate() -> String {
    "10r/s".to_string()
}

fn default_api_rate() -> String {
    "30r/m".to_string()
}

fn default_auth_rate() -> String {
    "5r/m".to_string()
}

fn default_limit_status() -> u16 {
    429
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            general: default_general_rate(),
            api: default_api_rate(),
            auth: default_auth_rate(),
            status_code: default_limit_status(),
        }
    }
}
