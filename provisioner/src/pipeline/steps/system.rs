//! Base system steps: distribution check, packages, Docker, deployer user

use async_trait::async_trait;
use tracing::info;

use crate::config::kv;
use crate::config::DeploymentConfig;
use crate::errors::ProvisionError;
use crate::host::CommandSpec;
use crate::pipeline::context::StepContext;
use crate::pipeline::step::{ProvisioningStep, StepOutcome};

const DOCKER_INSTALL_URL: &str = "https://get.docker.com";

pub struct OsCheck;

impl OsCheck {
    /// Distribution IDs from os-release: `ID` first, then each `ID_LIKE` entry
    pub fn distribution_ids(os_release: &str) -> Vec<String> {
        let entries = kv::parse(os_release);
        let mut ids = Vec::new();
        if let Some(id) = kv::get(&entries, "ID") {
            ids.push(id.to_lowercase());
        }
        if let Some(like) = kv::get(&entries, "ID_LIKE") {
            ids.extend(like.split_whitespace().map(str::to_lowercase));
        }
        ids
    }
}

#[async_trait]
impl ProvisioningStep for OsCheck {
    fn name(&self) -> &'static str {
        "os-check"
    }

    async fn configure(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, ProvisionError> {
        let file = ctx.layout.os_release_file();
        let ids = if file.exists().await {
            Self::distribution_ids(&file.read_string().await?)
        } else {
            vec![sysinfo::System::distribution_id().to_lowercase()]
        };

        let supported = &ctx.settings.supported_distributions;
        if ids.iter().any(|id| supported.contains(id)) {
            info!("Distribution {:?} is supported", ids);
            Ok(StepOutcome::Done)
        } else {
            Err(ProvisionError::UnsupportedOs(format!(
                "{} (supported: {})",
                ids.first().map(String::as_str).unwrap_or("unknown"),
                supported.join(", ")
            )))
        }
    }
}

pub struct Packages;

#[async_trait]
impl ProvisioningStep for Packages {
    fn name(&self) -> &'static str {
        "packages"
    }

    async fn is_installed(&self, ctx: &mut StepContext<'_>) -> Result<bool, ProvisionError> {
        Ok(ctx.host.packages_installed(&ctx.settings.base_packages).await)
    }

    async fn install(&self, ctx: &mut StepContext<'_>) -> Result<(), ProvisionError> {
        ctx.host.apt_install(&ctx.settings.base_packages).await
    }

    async fn configure(&self, _ctx: &mut StepContext<'_>) -> Result<StepOutcome, ProvisionError> {
        Ok(StepOutcome::Done)
    }
}

pub struct ContainerRuntime;

#[async_trait]
impl ProvisioningStep for ContainerRuntime {
    fn name(&self) -> &'static str {
        "container-runtime"
    }

    async fn is_installed(&self, ctx: &mut StepContext<'_>) -> Result<bool, ProvisionError> {
        Ok(ctx.host.succeeds(CommandSpec::new("docker").arg("--version")).await
            && ctx.host.succeeds(CommandSpec::new("docker").args(["compose", "version"])).await)
    }

    async fn install(&self, ctx: &mut StepContext<'_>) -> Result<(), ProvisionError> {
        let script = ctx.layout.host_path("/tmp/get-docker.sh");
        let script = script.display().to_string();
        ctx.host.run(CommandSpec::new("curl").args(["-fsSL", DOCKER_INSTALL_URL, "-o", &script])).await?;
        ctx.host.run(CommandSpec::new("sh").arg(&script)).await?;
        Ok(())
    }

    async fn configure(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, ProvisionError> {
        ctx.host.systemctl(["enable", "--now", "docker"]).await?;
        Ok(StepOutcome::Done)
    }
}

pub struct DeployerUser;

#[async_trait]
impl ProvisioningStep for DeployerUser {
    fn name(&self) -> &'static str {
        "deployer-user"
    }

    fn enabled(&self, config: &DeploymentConfig) -> bool {
        config.create_deployer_user
    }

    async fn is_installed(&self, ctx: &mut StepContext<'_>) -> Result<bool, ProvisionError> {
        let user = ctx.settings.deployer_user.clone();
        Ok(ctx.host.succeeds(CommandSpec::new("id").args(["-u", &user])).await)
    }

    async fn install(&self, ctx: &mut StepContext<'_>) -> Result<(), ProvisionError> {
        let user = ctx.settings.deployer_user.clone();
        ctx.host.run(CommandSpec::new("useradd").args(["--create-home", "--shell", "/bin/bash", &user])).await?;
        Ok(())
    }

    async fn configure(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, ProvisionError> {
        let user = ctx.settings.deployer_user.clone();
        ctx.host.run(CommandSpec::new("usermod").args(["-aG", "docker", &user])).await?;
        Ok(StepOutcome::Done)
    }
}
