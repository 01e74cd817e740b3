//! Deployment configuration model

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use ipnet::IpNet;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::ProvisionError;

pub const DEFAULT_APP_DIR: &str = "/opt/apps/esc";
pub const DEFAULT_SSH_PORT: u16 = 2222;
pub const STOCK_SSH_PORT: u16 = 22;

/// TLS certificate source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    LetsEncrypt,
    SelfSigned,
    None,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::LetsEncrypt => "letsencrypt",
            SslMode::SelfSigned => "selfsigned",
            SslMode::None => "none",
        }
    }

    /// Whether the site is served over HTTPS
    pub fn is_tls(&self) -> bool {
        !matches!(self, SslMode::None)
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SslMode::LetsEncrypt => "Let's Encrypt",
            SslMode::SelfSigned => "Self-signed",
            SslMode::None => "None (HTTP only)",
        };
        f.write_str(label)
    }
}

impl FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "letsencrypt" | "lets-encrypt" | "le" => Ok(SslMode::LetsEncrypt),
            "2" | "selfsigned" | "self-signed" => Ok(SslMode::SelfSigned),
            "3" | "none" | "off" | "http" => Ok(SslMode::None),
            _ => Err(format!("Invalid SSL mode: {}", s)),
        }
    }
}

/// Everything the pipeline needs to provision a host.
///
/// The registry secret is deliberately not part of this type; see
/// [`Credentials`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub domain: String,
    pub registry_username: String,
    pub app_dir: PathBuf,
    pub source_repo: Option<String>,
    pub ssl_mode: SslMode,
    pub ssl_email: String,
    pub security_enabled: bool,
    pub admin_email: String,
    pub ssh_hardening: bool,
    pub ssh_port: u16,
    pub disable_root_login: bool,
    pub password_auth: bool,
    pub admin_ip_whitelist: BTreeSet<IpNet>,
    pub fail2ban_aggressive: bool,
    pub create_deployer_user: bool,
    pub configure_firewall: bool,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            registry_username: String::new(),
            app_dir: PathBuf::from(DEFAULT_APP_DIR),
            source_repo: None,
            ssl_mode: SslMode::LetsEncrypt,
            ssl_email: String::new(),
            security_enabled: true,
            admin_email: String::new(),
            ssh_hardening: false,
            ssh_port: DEFAULT_SSH_PORT,
            disable_root_login: true,
            password_auth: false,
            admin_ip_whitelist: BTreeSet::new(),
            fail2ban_aggressive: false,
            create_deployer_user: true,
            configure_firewall: true,
        }
    }
}

impl DeploymentConfig {
    /// `server_name` values: the apex domain and its `www.` alias
    pub fn server_names(&self) -> Vec<String> {
        let apex = self.domain.trim_start_matches("www.");
        vec![apex.to_string(), format!("www.{}", apex)]
    }

    /// Port sshd listens on once the pipeline has run
    pub fn effective_ssh_port(&self) -> u16 {
        if self.ssh_hardening {
            self.ssh_port
        } else {
            STOCK_SSH_PORT
        }
    }

    /// Every invariant violation, empty when the config is consistent
    pub fn violations(&self, app_port: u16) -> Vec<String> {
        let mut violations = Vec::new();

        if self.domain.trim().is_empty() {
            violations.push("domain must not be empty".to_string());
        } else if self.domain.chars().any(char::is_whitespace) {
            violations.push(format!("domain '{}' must not contain whitespace", self.domain));
        }
        if self.registry_username.trim().is_empty() {
            violations.push("registry username must not be empty".to_string());
        }
        if self.ssl_mode == SslMode::LetsEncrypt && self.ssl_email.trim().is_empty() {
            violations.push("an SSL email is required for Let's Encrypt".to_string());
        }
        if self.security_enabled && self.admin_email.trim().is_empty() {
            violations.push("an admin email is required when security is enabled".to_string());
        }
        if self.ssh_hardening {
            if self.ssh_port == 0 {
                violations.push("SSH port must be between 1 and 65535".to_string());
            } else if reserved_ports(app_port).contains(&self.ssh_port) {
                violations.push(format!(
                    "SSH port {} collides with a port already used by the stack",
                    self.ssh_port
                ));
            }
        }
        if !self.app_dir.is_absolute() {
            violations.push(format!("app dir {} must be an absolute path", self.app_dir.display()));
        }

        violations
    }

    /// Fail with a configuration error listing every violation
    pub fn check(&self, app_port: u16) -> Result<(), ProvisionError> {
        let violations = self.violations(app_port);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ProvisionError::ConfigError(violations.join("; ")))
        }
    }
}

/// Ports the stack opens for other purposes
pub fn reserved_ports(app_port: u16) -> [u16; 3] {
    [80, 443, app_port]
}

/// Secrets collected for a single run and never persisted
#[derive(Debug)]
pub struct Credentials {
    pub registry_secret: SecretString,
}

impl Credentials {
    pub fn new(registry_secret: impl Into<String>) -> Self {
        Self {
            registry_secret: SecretString::from(registry_secret.into()),
        }
    }
}

/// Parse a single whitelist entry: an address or a CIDR block
pub fn parse_admin_ip(entry: &str) -> Result<IpNet, String> {
    let entry = entry.trim();
    if let Ok(net) = entry.parse::<IpNet>() {
        return Ok(net.trunc());
    }
    entry
        .parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|_| format!("'{}' is not an IP address or CIDR block", entry))
}

/// Parse a comma or whitespace separated whitelist
pub fn parse_whitelist(text: &str) -> Result<BTreeSet<IpNet>, String> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(parse_admin_ip)
        .collect()
}

/// Render a whitelist entry the way an operator would type it
pub fn display_admin_ip(net: &IpNet) -> String {
    if net.prefix_len() == net.max_prefix_len() {
        net.addr().to_string()
    } else {
        net.to_string()
    }
}

/// Comma separated whitelist
pub fn format_whitelist(whitelist: &BTreeSet<IpNet>) -> String {
    whitelist
        .iter()
        .map(display_admin_ip)
        .collect::<Vec<_>>()
        .join(",")
}
