//! Interactive configuration collection

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ipnet::IpNet;
use tracing::{debug, info, warn};

use crate::collect::prompt::{confirm, Prompt, Prompter, Tone};
use crate::config::model::{format_whitelist, parse_whitelist, reserved_ports, STOCK_SSH_PORT};
use crate::config::{Credentials, DeploymentConfig, SslMode};
use crate::errors::ProvisionError;

/// Outcome of a collection round
#[derive(Debug)]
pub enum Collected {
    Proceed {
        config: DeploymentConfig,
        credentials: Credentials,
    },
    Cancelled,
}

/// Gathers a [`DeploymentConfig`] from the operator.
///
/// Nothing is written to disk here; the pipeline persists the result once it
/// has run successfully.
pub struct Collector<'a> {
    prompter: &'a mut dyn Prompter,
    app_port: u16,
}

impl<'a> Collector<'a> {
    pub fn new(prompter: &'a mut dyn Prompter, app_port: u16) -> Self {
        Self { prompter, app_port }
    }

    /// Collect a config, offering `existing` as a shortcut and as defaults
    pub async fn collect(
        &mut self,
        existing: Option<&DeploymentConfig>,
    ) -> Result<Collected, ProvisionError> {
        self.prompter.show(Tone::Heading, "ESC deployment configuration");

        if let Some(existing) = existing {
            let violations = existing.violations(self.app_port);
            if !violations.is_empty() {
                // a hand-edited record; its values still serve as defaults
                warn!("Stored configuration is incomplete: {}", violations.join("; "));
                self.prompter
                    .warn("The stored configuration is incomplete and needs review:");
                for violation in &violations {
                    self.prompter.warn(&format!("  {}", violation));
                }
            } else {
                self.prompter.info(&format!(
                    "Found an existing configuration for {}.",
                    existing.domain
                ));
                if confirm(self.prompter, "use_existing", "Use existing configuration?", true).await? {
                    let credentials = self.ask_registry_password().await?;
                    return self.finish(existing.clone(), credentials).await;
                }
            }
        }

        let defaults = existing.cloned().unwrap_or_default();
        let mut config = defaults.clone();

        config.domain = self.ask_domain(&defaults.domain).await?;
        config.registry_username = self
            .ask_required(
                Prompt::new("registry_username", "Container registry username")
                    .with_default(&defaults.registry_username),
            )
            .await?;
        let credentials = self.ask_registry_password().await?;
        config.app_dir = self.ask_app_dir(&defaults.app_dir).await?;
        config.source_repo = self.ask_source_repo(defaults.source_repo.as_deref()).await?;

        config.ssl_mode = self.ask_ssl_mode(defaults.ssl_mode).await?;
        if config.ssl_mode == SslMode::LetsEncrypt {
            config.ssl_email = self
                .ask_email("ssl_email", "Email for Let's Encrypt notices", &defaults.ssl_email)
                .await?;
        }

        config.security_enabled = confirm(
            self.prompter,
            "security_enabled",
            "Enable security hardening (rate limiting, Fail2Ban)?",
            defaults.security_enabled,
        )
        .await?;
        if config.security_enabled {
            let fallback = if defaults.admin_email.is_empty() {
                config.ssl_email.clone()
            } else {
                defaults.admin_email.clone()
            };
            config.admin_email = self
                .ask_email("admin_email", "Admin email for security alerts", &fallback)
                .await?;
            config.fail2ban_aggressive = confirm(
                self.prompter,
                "fail2ban_aggressive",
                "Use aggressive Fail2Ban policy (longer bans, fewer retries)?",
                defaults.fail2ban_aggressive,
            )
            .await?;
        }

        config.ssh_hardening = confirm(
            self.prompter,
            "ssh_hardening",
            "Harden the SSH daemon?",
            defaults.ssh_hardening,
        )
        .await?;
        if config.ssh_hardening {
            config.ssh_port = self.ask_ssh_port(defaults.ssh_port).await?;
            config.disable_root_login = confirm(
                self.prompter,
                "disable_root_login",
                "Disable root login over SSH?",
                defaults.disable_root_login,
            )
            .await?;
            config.password_auth = confirm(
                self.prompter,
                "password_auth",
                "Allow password authentication over SSH?",
                defaults.password_auth,
            )
            .await?;
            config.admin_ip_whitelist = self
                .ask_whitelist(&format_whitelist(&defaults.admin_ip_whitelist))
                .await?;
        }

        config.create_deployer_user = confirm(
            self.prompter,
            "create_deployer_user",
            "Create a dedicated deployer user?",
            defaults.create_deployer_user,
        )
        .await?;
        config.configure_firewall = confirm(
            self.prompter,
            "configure_firewall",
            "Configure the UFW firewall?",
            defaults.configure_firewall,
        )
        .await?;

        self.finish(config, credentials).await
    }

    async fn finish(
        &mut self,
        config: DeploymentConfig,
        credentials: Credentials,
    ) -> Result<Collected, ProvisionError> {
        config.check(self.app_port)?;

        self.prompter.show(Tone::Heading, "Configuration summary");
        for line in summary_lines(&config) {
            self.prompter.info(&line);
        }

        if confirm(self.prompter, "proceed", "Proceed with deployment?", false).await? {
            info!("Configuration confirmed for {}", config.domain);
            Ok(Collected::Proceed { config, credentials })
        } else {
            info!("Deployment cancelled at summary");
            Ok(Collected::Cancelled)
        }
    }

    /// Ask until a non-empty answer is given; an empty answer takes the default
    async fn ask_required(&mut self, prompt: Prompt) -> Result<String, ProvisionError> {
        loop {
            let answer = self.prompter.ask(&prompt).await?;
            let value = if answer.is_empty() {
                prompt.default.clone().unwrap_or_default()
            } else {
                answer
            };
            if !value.is_empty() {
                return Ok(value);
            }
            debug!("Empty answer for required prompt {}", prompt.key);
            self.prompter.warn("This value is required.");
        }
    }

    async fn ask_domain(&mut self, default: &str) -> Result<String, ProvisionError> {
        let prompt = Prompt::new("domain", "Domain name (e.g. example.com)").with_default(default);
        loop {
            let domain = self.ask_required(prompt.clone()).await?.to_lowercase();
            let domain = domain
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string();
            if domain.contains('.') && !domain.chars().any(|c| c.is_whitespace() || c == '/') {
                return Ok(domain);
            }
            self.prompter.warn(&format!("'{}' does not look like a domain name.", domain));
        }
    }

    async fn ask_registry_password(&mut self) -> Result<Credentials, ProvisionError> {
        let secret = self
            .ask_required(
                Prompt::new("registry_password", "Container registry password or token").secret(),
            )
            .await?;
        Ok(Credentials::new(secret))
    }

    async fn ask_app_dir(&mut self, default: &Path) -> Result<PathBuf, ProvisionError> {
        let prompt = Prompt::new("app_dir", "Application directory")
            .with_default(default.display().to_string());
        loop {
            let dir = PathBuf::from(self.ask_required(prompt.clone()).await?);
            if dir.is_absolute() {
                return Ok(dir);
            }
            self.prompter.warn("The application directory must be an absolute path.");
        }
    }

    async fn ask_source_repo(&mut self, default: Option<&str>) -> Result<Option<String>, ProvisionError> {
        let prompt = Prompt::new(
            "source_repo",
            "Git repository to fetch into the app dir ('none' to skip)",
        )
        .with_default(default.unwrap_or("none"));
        let answer = self.prompter.ask(&prompt).await?;
        let value = if answer.is_empty() {
            default.unwrap_or_default().to_string()
        } else {
            answer
        };
        Ok(Some(value).filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("none")))
    }

    async fn ask_ssl_mode(&mut self, default: SslMode) -> Result<SslMode, ProvisionError> {
        self.prompter.info("SSL options:");
        self.prompter.info("  1) Let's Encrypt (publicly trusted, needs DNS pointing here)");
        self.prompter.info("  2) Self-signed (behind Cloudflare or for testing)");
        self.prompter.info("  3) None (HTTP only)");
        let default_choice = match default {
            SslMode::LetsEncrypt => "1",
            SslMode::SelfSigned => "2",
            SslMode::None => "3",
        };
        let prompt = Prompt::new("ssl_mode", "SSL mode").with_default(default_choice);
        loop {
            let answer = self.ask_required(prompt.clone()).await?;
            match answer.parse::<SslMode>() {
                Ok(mode) => return Ok(mode),
                Err(e) => self.prompter.warn(&e),
            }
        }
    }

    async fn ask_email(
        &mut self,
        key: &'static str,
        question: &str,
        default: &str,
    ) -> Result<String, ProvisionError> {
        let prompt = Prompt::new(key, question).with_default(default);
        loop {
            let email = self.ask_required(prompt.clone()).await?;
            match email.split_once('@') {
                Some((user, host)) if !user.is_empty() && host.contains('.') => return Ok(email),
                _ => self.prompter.warn(&format!("'{}' is not a valid email address.", email)),
            }
        }
    }

    /// Port 22 needs an explicit override; ports the stack uses are refused
    async fn ask_ssh_port(&mut self, default: u16) -> Result<u16, ProvisionError> {
        let prompt = Prompt::new("ssh_port", "SSH port").with_default(default.to_string());
        let reserved = reserved_ports(self.app_port);
        loop {
            let answer = self.ask_required(prompt.clone()).await?;
            let port = match answer.parse::<u16>() {
                Ok(port) if port > 0 => port,
                _ => {
                    self.prompter.warn("Enter a port between 1 and 65535.");
                    continue;
                }
            };

            if reserved.contains(&port) {
                self.prompter.warn(&format!(
                    "Port {} is already used by the web stack. Choose another port.",
                    port
                ));
                continue;
            }

            if port == STOCK_SSH_PORT {
                self.prompter.warn(
                    "Port 22 is the target of most automated SSH attacks. A non-standard port is strongly recommended.",
                );
                let keep = confirm(
                    self.prompter,
                    "ssh_port_22_confirm",
                    "Keep SSH on port 22 anyway?",
                    false,
                )
                .await?;
                if !keep {
                    continue;
                }
            }

            return Ok(port);
        }
    }

    async fn ask_whitelist(&mut self, default: &str) -> Result<BTreeSet<IpNet>, ProvisionError> {
        let prompt = Prompt::new(
            "admin_ip_whitelist",
            "Admin IPs/CIDRs allowed to SSH, comma separated ('none' for any)",
        )
        .with_default(if default.is_empty() { "none" } else { default });
        loop {
            let answer = self.prompter.ask(&prompt).await?;
            let value = if answer.is_empty() { default.to_string() } else { answer };
            if value.eq_ignore_ascii_case("none") {
                return Ok(Default::default());
            }
            match parse_whitelist(&value) {
                Ok(whitelist) => return Ok(whitelist),
                Err(e) => self.prompter.warn(&e),
            }
        }
    }
}

/// Human readable summary; the registry secret is never included
pub fn summary_lines(config: &DeploymentConfig) -> Vec<String> {
    let on_off = |b: bool| if b { "enabled" } else { "disabled" };
    let mut lines = vec![
        format!("Domain:              {}", config.server_names().join(", ")),
        format!("Registry user:       {}", config.registry_username),
        "Registry password:   ********".to_string(),
        format!("App directory:       {}", config.app_dir.display()),
        format!(
            "Source repository:   {}",
            config.source_repo.as_deref().unwrap_or("(none, compose file expected in app dir)")
        ),
        format!("SSL:                 {}", config.ssl_mode),
    ];
    if config.ssl_mode == SslMode::LetsEncrypt {
        lines.push(format!("SSL email:           {}", config.ssl_email));
    }
    lines.push(format!("Security hardening:  {}", on_off(config.security_enabled)));
    if config.security_enabled {
        lines.push(format!("Admin email:         {}", config.admin_email));
        lines.push(format!(
            "Fail2Ban policy:     {}",
            if config.fail2ban_aggressive { "aggressive" } else { "standard" }
        ));
    }
    lines.push(format!("SSH hardening:       {}", on_off(config.ssh_hardening)));
    if config.ssh_hardening {
        lines.push(format!("SSH port:            {}", config.ssh_port));
        lines.push(format!(
            "Root login:          {}",
            if config.disable_root_login { "disabled" } else { "key only" }
        ));
        lines.push(format!("Password auth:       {}", on_off(config.password_auth)));
        let whitelist = format_whitelist(&config.admin_ip_whitelist);
        lines.push(format!(
            "Admin IP whitelist:  {}",
            if whitelist.is_empty() { "(any)".to_string() } else { whitelist }
        ));
    }
    lines.push(format!("Deployer user:       {}", if config.create_deployer_user { "create" } else { "skip" }));
    lines.push(format!("Firewall (UFW):      {}", on_off(config.configure_firewall)));
    lines
}
