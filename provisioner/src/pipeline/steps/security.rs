//! Fail2Ban, SSH hardening and UFW

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::model::display_admin_ip;
use crate::config::DeploymentConfig;
use crate::errors::ProvisionError;
use crate::host::{CommandSpec, Host};
use crate::pipeline::context::StepContext;
use crate::pipeline::step::{ProvisioningStep, StepKind, StepOutcome};
use crate::render::{ArtifactWriter, TemplateId};
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::validate::Validator;

pub struct IntrusionPrevention;

#[async_trait]
impl ProvisioningStep for IntrusionPrevention {
    fn name(&self) -> &'static str {
        "intrusion-prevention"
    }

    fn enabled(&self, config: &DeploymentConfig) -> bool {
        config.security_enabled
    }

    async fn is_installed(&self, ctx: &mut StepContext<'_>) -> Result<bool, ProvisionError> {
        Ok(ctx.host.packages_installed(&["fail2ban"]).await)
    }

    async fn install(&self, ctx: &mut StepContext<'_>) -> Result<(), ProvisionError> {
        ctx.host.apt_install(&["fail2ban"]).await
    }

    async fn configure(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, ProvisionError> {
        let mut artifact = ctx.renderer().render(TemplateId::Fail2banJail, &ctx.config);
        Validator.validate(&mut artifact).into_result(&artifact.path)?;
        ArtifactWriter::install(&artifact, artifact.template.mode(), true).await?;

        ctx.host.run(CommandSpec::new("fail2ban-client").arg("-t")).await?;
        ctx.host.systemctl(["enable", "fail2ban"]).await?;
        ctx.host.systemctl(["restart", "fail2ban"]).await?;
        Ok(StepOutcome::Done)
    }
}

/// Listener checks after an sshd restart, one second apart
const LISTEN_ATTEMPTS: u32 = 3;

/// Replaces the SSH daemon config. Reversible: a config sshd rejects, a
/// failed restart, or a port nothing listens on afterwards restores the
/// previous file byte-for-byte.
pub struct SshHardening;

impl SshHardening {
    /// Restart sshd so a new `Port` takes effect. Socket-activated sshd
    /// (Ubuntu 22.10 and later) binds through `ssh.socket`, whose port is
    /// regenerated from sshd_config on `daemon-reload`.
    async fn restart_sshd(host: &Host) -> Result<(), ProvisionError> {
        let socket = CommandSpec::new("systemctl").args(["is-enabled", "ssh.socket"]);
        if host.succeeds(socket).await {
            host.systemctl(["daemon-reload"]).await?;
            host.systemctl(["restart", "ssh.socket"]).await?;
        }
        host.systemctl(["restart", "ssh"]).await?;
        Ok(())
    }

    async fn wait_for_listener(host: &Host, port: u16) -> Result<(), ProvisionError> {
        for attempt in 1..=LISTEN_ATTEMPTS {
            let output = host.run(CommandSpec::new("ss").arg("-Hltn")).await?;
            if listening_on(&output.stdout, port) {
                return Ok(());
            }
            if attempt < LISTEN_ATTEMPTS {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
        Err(ProvisionError::ConfigError(format!(
            "nothing listens on port {} after restarting sshd",
            port
        )))
    }

    async fn any_authorized_keys(layout: &StorageLayout, settings: &Settings) -> bool {
        for file in layout.authorized_keys_candidates(settings) {
            if let Ok(text) = file.read_string().await {
                if text.lines().any(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#')) {
                    return true;
                }
            }
        }
        false
    }
}

#[async_trait]
impl ProvisioningStep for SshHardening {
    fn name(&self) -> &'static str {
        "ssh-hardening"
    }

    fn kind(&self) -> StepKind {
        StepKind::Reversible
    }

    fn enabled(&self, config: &DeploymentConfig) -> bool {
        config.ssh_hardening
    }

    async fn is_installed(&self, ctx: &mut StepContext<'_>) -> Result<bool, ProvisionError> {
        Ok(ctx.host.packages_installed(&["openssh-server"]).await)
    }

    async fn install(&self, ctx: &mut StepContext<'_>) -> Result<(), ProvisionError> {
        ctx.host.apt_install(&["openssh-server"]).await
    }

    async fn configure(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, ProvisionError> {
        if !ctx.config.password_auth && !Self::any_authorized_keys(&ctx.layout, &ctx.settings).await {
            return Err(ProvisionError::ConfigError(
                "refusing to disable password authentication: no authorized_keys file has a key".to_string(),
            ));
        }

        let mut artifact = ctx.renderer().render(TemplateId::SshdConfig, &ctx.config);
        Validator.validate(&mut artifact).into_result(&artifact.path)?;

        let target = artifact.file();
        let backup = ArtifactWriter::backup(&target).await?;
        ctx.backups.insert(self.name(), backup);
        target
            .write_atomic(artifact.contents.as_bytes(), Some(artifact.template.mode()))
            .await?;

        let path = target.path().display().to_string();
        ctx.host.run(CommandSpec::new("sshd").args(["-t", "-f", &path])).await?;

        let port = ctx.config.ssh_port;
        if ctx.config.configure_firewall && port != ctx.ssh_port {
            ctx.host.run(CommandSpec::new("ufw").args(["allow".to_string(), format!("{}/tcp", port)])).await?;
        }

        Self::restart_sshd(&ctx.host).await?;
        Self::wait_for_listener(&ctx.host, port).await?;
        ctx.ssh_port = port;
        info!("sshd now listens on port {}", port);
        ctx.prompter.warn(&format!(
            "SSH now listens on port {}. Test a new session before closing this one.",
            port
        ));
        Ok(StepOutcome::Done)
    }

    async fn rollback(&self, ctx: &mut StepContext<'_>) -> Result<(), ProvisionError> {
        let Some(previous) = ctx.backups.remove(self.name()) else {
            // configure failed before touching the file
            return Ok(());
        };
        let target = ctx.layout.sshd_config_file();
        match previous {
            Some(backup) => target.restore_from(&backup).await?,
            None => target.delete().await?,
        }
        Self::restart_sshd(&ctx.host).await?;
        info!("Restored the previous sshd config; port {} is unchanged", ctx.ssh_port);
        Ok(())
    }
}

/// Whether `ss -Hltn` output has a listener on `port`
pub fn listening_on(ss_output: &str, port: u16) -> bool {
    let suffix = format!(":{}", port);
    ss_output
        .lines()
        .filter_map(|line| line.split_whitespace().nth(3))
        .any(|local| local.ends_with(&suffix))
}

pub struct Firewall;

impl Firewall {
    /// ufw invocations for the configured policy
    pub fn rules(config: &DeploymentConfig, ssh_port: u16) -> Vec<Vec<String>> {
        let words = |s: &str| s.split_whitespace().map(str::to_string).collect::<Vec<_>>();
        let mut rules = vec![words("default deny incoming"), words("default allow outgoing")];

        let ssh = format!("{}/tcp", ssh_port);
        if config.admin_ip_whitelist.is_empty() {
            rules.push(vec!["allow".to_string(), ssh]);
        } else {
            for net in &config.admin_ip_whitelist {
                rules.push(words(&format!(
                    "allow from {} to any port {} proto tcp",
                    display_admin_ip(net),
                    ssh_port
                )));
            }
        }

        rules.push(words("allow 80/tcp"));
        rules.push(words("allow 443/tcp"));
        rules.push(words("--force enable"));
        rules
    }
}

#[async_trait]
impl ProvisioningStep for Firewall {
    fn name(&self) -> &'static str {
        "firewall"
    }

    fn enabled(&self, config: &DeploymentConfig) -> bool {
        config.configure_firewall
    }

    async fn is_installed(&self, ctx: &mut StepContext<'_>) -> Result<bool, ProvisionError> {
        Ok(ctx.host.packages_installed(&["ufw"]).await)
    }

    async fn install(&self, ctx: &mut StepContext<'_>) -> Result<(), ProvisionError> {
        ctx.host.apt_install(&["ufw"]).await
    }

    async fn configure(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, ProvisionError> {
        if !ctx.config.admin_ip_whitelist.is_empty() {
            // drop an open rule left by an earlier run or the SSH step
            let open = format!("{}/tcp", ctx.ssh_port);
            let delete = CommandSpec::new("ufw").args(["--force", "delete", "allow", open.as_str()]);
            if !ctx.host.succeeds(delete).await {
                debug!("No open rule for {} to delete", open);
            }
        }
        for rule in Self::rules(&ctx.config, ctx.ssh_port) {
            ctx.host.run(CommandSpec::new("ufw").args(rule)).await?;
        }
        Ok(StepOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::parse_whitelist;

    #[test]
    fn test_listening_on() {
        let ss = "LISTEN 0      128          0.0.0.0:2222      0.0.0.0:*\n\
                  LISTEN 0      128             [::]:2222         [::]:*\n\
                  LISTEN 0      4096       127.0.0.1:8000      0.0.0.0:*\n";
        assert!(listening_on(ss, 2222));
        assert!(listening_on(ss, 8000));
        assert!(!listening_on(ss, 22));
        assert!(!listening_on(ss, 222));
        assert!(!listening_on("", 2222));
    }

    #[test]
    fn test_firewall_rules_open_ssh_to_all_without_whitelist() {
        let rules = Firewall::rules(&DeploymentConfig::default(), 2222);
        assert!(rules.contains(&vec!["allow".to_string(), "2222/tcp".to_string()]));
        assert_eq!(rules.last().unwrap(), &vec!["--force".to_string(), "enable".to_string()]);
    }

    #[test]
    fn test_firewall_rules_restrict_ssh_to_whitelist() {
        let config = DeploymentConfig {
            admin_ip_whitelist: parse_whitelist("203.0.113.5").unwrap(),
            ..Default::default()
        };
        let rules: Vec<String> = Firewall::rules(&config, 22).iter().map(|r| r.join(" ")).collect();
        assert!(rules.contains(&"allow from 203.0.113.5 to any port 22 proto tcp".to_string()));
        assert!(!rules.contains(&"allow 22/tcp".to_string()));
    }
}
