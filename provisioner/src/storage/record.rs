//! Persisted deployment record
//!
//! A `KEY=value` file readable only by its owner. It holds every collected
//! field except the registry secret, which is asked for again on each run.

use std::path::PathBuf;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::kv;
use crate::config::model::{format_whitelist, parse_whitelist};
use crate::config::{DeploymentConfig, SslMode};
use crate::errors::ProvisionError;
use crate::filesys::file::File;

/// Permission bits of the record file
pub const RECORD_MODE: u32 = 0o600;

const KEYS: &[&str] = &[
    "DOMAIN",
    "REGISTRY_USERNAME",
    "APP_DIR",
    "SOURCE_REPO",
    "SSL_MODE",
    "SSL_EMAIL",
    "SECURITY_ENABLED",
    "ADMIN_EMAIL",
    "SSH_HARDENING",
    "SSH_PORT",
    "DISABLE_ROOT_LOGIN",
    "PASSWORD_AUTH",
    "ADMIN_IP_WHITELIST",
    "FAIL2BAN_AGGRESSIVE",
    "CREATE_DEPLOYER_USER",
    "CONFIGURE_FIREWALL",
];

/// Serialize a config to record lines
pub fn encode(config: &DeploymentConfig) -> String {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let bool_str = |b: bool| if b { "true" } else { "false" };

    let values = [
        config.domain.clone(),
        config.registry_username.clone(),
        config.app_dir.display().to_string(),
        config.source_repo.clone().unwrap_or_default(),
        config.ssl_mode.as_str().to_string(),
        config.ssl_email.clone(),
        bool_str(config.security_enabled).to_string(),
        config.admin_email.clone(),
        bool_str(config.ssh_hardening).to_string(),
        config.ssh_port.to_string(),
        yes_no(config.disable_root_login).to_string(),
        bool_str(config.password_auth).to_string(),
        format_whitelist(&config.admin_ip_whitelist),
        bool_str(config.fail2ban_aggressive).to_string(),
        bool_str(config.create_deployer_user).to_string(),
        bool_str(config.configure_firewall).to_string(),
    ];

    let mut out = String::from("# escprov deployment record\n");
    for (key, value) in KEYS.iter().zip(values.iter()) {
        out.push_str(key);
        out.push('=');
        out.push_str(&kv::format_value(value));
        out.push('\n');
    }
    out
}

/// Parse record lines into a config.
///
/// Missing keys take their defaults; unknown keys are ignored with a warning.
pub fn decode(text: &str) -> Result<DeploymentConfig, ProvisionError> {
    let mut config = DeploymentConfig::default();

    for (key, value) in kv::parse(text) {
        match key.as_str() {
            "DOMAIN" => config.domain = value,
            "REGISTRY_USERNAME" => config.registry_username = value,
            "APP_DIR" => {
                if !value.is_empty() {
                    config.app_dir = PathBuf::from(value);
                }
            }
            "SOURCE_REPO" => config.source_repo = Some(value).filter(|v| !v.is_empty()),
            "SSL_MODE" => {
                config.ssl_mode = value
                    .parse::<SslMode>()
                    .map_err(ProvisionError::ConfigError)?
            }
            "SSL_EMAIL" => config.ssl_email = value,
            "SECURITY_ENABLED" => config.security_enabled = parse_flag(&key, &value)?,
            "ADMIN_EMAIL" => config.admin_email = value,
            "SSH_HARDENING" => config.ssh_hardening = parse_flag(&key, &value)?,
            "SSH_PORT" => {
                config.ssh_port = value
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| ProvisionError::ConfigError(format!("Invalid SSH_PORT: {}", value)))?
            }
            "DISABLE_ROOT_LOGIN" => config.disable_root_login = parse_flag(&key, &value)?,
            "PASSWORD_AUTH" => config.password_auth = parse_flag(&key, &value)?,
            "ADMIN_IP_WHITELIST" => {
                config.admin_ip_whitelist =
                    parse_whitelist(&value).map_err(ProvisionError::ConfigError)?
            }
            "FAIL2BAN_AGGRESSIVE" => config.fail2ban_aggressive = parse_flag(&key, &value)?,
            "CREATE_DEPLOYER_USER" => config.create_deployer_user = parse_flag(&key, &value)?,
            "CONFIGURE_FIREWALL" => config.configure_firewall = parse_flag(&key, &value)?,
            other => warn!("Ignoring unknown record key: {}", other),
        }
    }

    Ok(config)
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ProvisionError> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Ok(true),
        "false" | "no" | "n" | "0" => Ok(false),
        _ => Err(ProvisionError::ConfigError(format!(
            "Invalid {}: {} (expected yes/no)",
            key, value
        ))),
    }
}

/// Load the record, `None` when no previous run saved one
pub async fn load_record(file: &File) -> Result<Option<DeploymentConfig>, ProvisionError> {
    if !file.exists().await {
        return Ok(None);
    }
    let text = file.read_string().await?;
    decode(&text).map(Some)
}

/// Atomically replace the record with `config`
pub async fn save_record(file: &File, config: &DeploymentConfig) -> Result<(), ProvisionError> {
    file.write_atomic(encode(config).as_bytes(), Some(RECORD_MODE)).await?;
    info!("Deployment record saved to {:?} at {}", file.path(), Utc::now().to_rfc3339());
    Ok(())
}
