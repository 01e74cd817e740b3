//! Nginx reverse proxy and TLS certificates

use async_trait::async_trait;
use tracing::info;

use crate::config::{DeploymentConfig, SslMode};
use crate::errors::ProvisionError;
use crate::filesys::file::{remove_entry, File};
use crate::host::CommandSpec;
use crate::pipeline::context::StepContext;
use crate::pipeline::step::{ProvisioningStep, StepOutcome};
use crate::render::{ArtifactWriter, TemplateId};
use crate::storage::layout::{self_signed_cert_path, self_signed_key_path};
use crate::validate::Validator;

pub struct ReverseProxy;

impl ReverseProxy {
    fn packages(config: &DeploymentConfig) -> Vec<&'static str> {
        match config.ssl_mode {
            SslMode::LetsEncrypt => vec!["nginx", "certbot"],
            _ => vec!["nginx"],
        }
    }

    async fn ensure_certificate(&self, ctx: &mut StepContext<'_>) -> Result<(), ProvisionError> {
        let names = ctx.config.server_names();
        match ctx.config.ssl_mode {
            SslMode::None => Ok(()),
            SslMode::LetsEncrypt => {
                if ctx.layout.letsencrypt_cert(&names[0]).exists().await {
                    info!("Certificate for {} already issued", names[0]);
                    return Ok(());
                }
                // --standalone binds port 80; the hooks are stored in the
                // renewal config so `certbot renew` frees the port too
                let mut spec = CommandSpec::new("certbot").args([
                    "certonly",
                    "--standalone",
                    "--non-interactive",
                    "--agree-tos",
                    "--email",
                    ctx.config.ssl_email.as_str(),
                    "--pre-hook",
                    "systemctl stop nginx",
                    "--post-hook",
                    "systemctl start nginx",
                ]);
                for name in &names {
                    spec = spec.args(["-d", name.as_str()]);
                }
                ctx.host.run(spec).await?;
                Ok(())
            }
            SslMode::SelfSigned => {
                let cert = File::new(ctx.layout.host_path(self_signed_cert_path(&names[0])));
                if cert.exists().await {
                    return Ok(());
                }
                let key = File::new(ctx.layout.host_path(self_signed_key_path(&names[0])));
                ctx.layout.self_signed_dir().create().await?;
                let san = names
                    .iter()
                    .map(|n| format!("DNS:{}", n))
                    .collect::<Vec<_>>()
                    .join(",");
                ctx.host.run(CommandSpec::new("openssl").args([
                    "req".to_string(),
                    "-x509".to_string(),
                    "-nodes".to_string(),
                    "-days".to_string(),
                    "365".to_string(),
                    "-newkey".to_string(),
                    "rsa:2048".to_string(),
                    "-keyout".to_string(),
                    key.path().display().to_string(),
                    "-out".to_string(),
                    cert.path().display().to_string(),
                    "-subj".to_string(),
                    format!("/CN={}", names[0]),
                    "-addext".to_string(),
                    format!("subjectAltName={}", san),
                ]))
                .await?;
                if key.exists().await {
                    key.set_mode(0o600).await?;
                }
                ctx.prompter
                    .warn("Using a self-signed certificate; browsers will show a warning");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ProvisioningStep for ReverseProxy {
    fn name(&self) -> &'static str {
        "reverse-proxy"
    }

    async fn is_installed(&self, ctx: &mut StepContext<'_>) -> Result<bool, ProvisionError> {
        Ok(ctx.host.packages_installed(&Self::packages(&ctx.config)).await)
    }

    async fn install(&self, ctx: &mut StepContext<'_>) -> Result<(), ProvisionError> {
        ctx.host.apt_install(&Self::packages(&ctx.config)).await
    }

    async fn configure(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, ProvisionError> {
        self.ensure_certificate(ctx).await?;

        let mut artifact = ctx.renderer().render(TemplateId::Nginx, &ctx.config);
        Validator.validate(&mut artifact).into_result(&artifact.path)?;

        let site = artifact.file();
        let enabled = ctx.layout.nginx_enabled_link(&ctx.settings);
        let backup = ArtifactWriter::install(&artifact, artifact.template.mode(), true).await?;
        site.symlink_at(&enabled).await?;

        let test = ctx.host.runner().run(&CommandSpec::new("nginx").arg("-t")).await?;
        if !test.success() {
            let undone = match &backup {
                Some(previous) => {
                    site.restore_from(previous).await?;
                    "the previous site was restored"
                }
                None => {
                    site.delete().await?;
                    remove_entry(&enabled).await?;
                    "the new site was removed"
                }
            };
            return Err(ProvisionError::StepError {
                step: self.name().to_string(),
                message: format!("nginx -t rejected the new site; {}", undone),
                output: Some(test.tail(20)),
            });
        }
        remove_entry(&ctx.layout.nginx_default_link()).await?;

        ctx.host.systemctl(["enable", "nginx"]).await?;
        ctx.host.systemctl(["reload-or-restart", "nginx"]).await?;
        Ok(StepOutcome::Done)
    }
}
