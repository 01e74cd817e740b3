//! systemd unit, management scripts and the deployment record

use async_trait::async_trait;
use tracing::info;

use crate::errors::ProvisionError;
use crate::pipeline::context::StepContext;
use crate::pipeline::step::{ProvisioningStep, StepOutcome};
use crate::render::{ArtifactWriter, ScriptKind, TemplateId};
use crate::storage::record::save_record;
use crate::validate::Validator;

pub struct ServiceUnit;

#[async_trait]
impl ProvisioningStep for ServiceUnit {
    fn name(&self) -> &'static str {
        "service-unit"
    }

    async fn configure(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, ProvisionError> {
        let mut artifact = ctx.renderer().render(TemplateId::SystemdUnit, &ctx.config);
        Validator.validate(&mut artifact).into_result(&artifact.path)?;
        ArtifactWriter::install(&artifact, artifact.template.mode(), false).await?;

        let unit = format!("{}.service", ctx.settings.service_name);
        ctx.host.systemctl(["daemon-reload"]).await?;
        ctx.host.systemctl(["enable", unit.as_str()]).await?;
        Ok(StepOutcome::Done)
    }
}

pub struct ManagementScripts;

#[async_trait]
impl ProvisioningStep for ManagementScripts {
    fn name(&self) -> &'static str {
        "management-scripts"
    }

    async fn configure(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, ProvisionError> {
        let artifacts: Vec<_> = {
            let renderer = ctx.renderer();
            ScriptKind::ALL
                .into_iter()
                .map(|kind| renderer.render(TemplateId::Script(kind), &ctx.config))
                .collect()
        };

        for mut artifact in artifacts {
            Validator.validate(&mut artifact).into_result(&artifact.path)?;
            ArtifactWriter::install(&artifact, artifact.template.mode(), false).await?;
        }
        info!("Management scripts written to {:?}", ctx.config.app_dir);
        Ok(StepOutcome::Done)
    }
}

pub struct PersistConfig;

#[async_trait]
impl ProvisioningStep for PersistConfig {
    fn name(&self) -> &'static str {
        "persist-config"
    }

    async fn configure(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, ProvisionError> {
        save_record(&ctx.layout.record_file(), &ctx.config).await?;
        Ok(StepOutcome::Done)
    }
}
