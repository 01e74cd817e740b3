//! Application steps: source checkout, registry login, environment file

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::collect::{confirm, Tone};
use crate::config::kv;
use crate::errors::ProvisionError;
use crate::host::CommandSpec;
use crate::pipeline::context::StepContext;
use crate::pipeline::step::{ProvisioningStep, StepOutcome};
use crate::render::{placeholders, ArtifactWriter};
use crate::utils::generate_secret_key;
use crate::validate::Validator;

pub struct AppSource;

#[async_trait]
impl ProvisioningStep for AppSource {
    fn name(&self) -> &'static str {
        "app-source"
    }

    async fn is_installed(&self, ctx: &mut StepContext<'_>) -> Result<bool, ProvisionError> {
        let dir = ctx.layout.app_dir(&ctx.config);
        Ok(dir.exists().await && (ctx.config.source_repo.is_none() || dir.subdir(".git").exists().await))
    }

    async fn install(&self, ctx: &mut StepContext<'_>) -> Result<(), ProvisionError> {
        let dir = ctx.layout.app_dir(&ctx.config);
        match &ctx.config.source_repo {
            Some(repo) => {
                if let Some(parent) = dir.path().parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                info!("Cloning {} into {:?}", repo, dir.path());
                ctx.host.run(CommandSpec::new("git").args([
                    "clone".to_string(),
                    repo.clone(),
                    dir.path().display().to_string(),
                ]))
                .await?;
            }
            None => dir.create().await?,
        }
        Ok(())
    }

    async fn configure(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, ProvisionError> {
        let dir = ctx.layout.app_dir(&ctx.config);
        let path = dir.path().display().to_string();

        if ctx.config.source_repo.is_some() && dir.subdir(".git").exists().await {
            ctx.host.run(CommandSpec::new("git").args(["-C", &path, "pull", "--ff-only"])).await?;
        }

        let compose = ctx.layout.compose_file(&ctx.config, &ctx.settings);
        if !compose.exists().await {
            return Err(ProvisionError::NotFound(format!(
                "{:?}; place the compose file in the application directory or set a source repository",
                compose.path()
            )));
        }

        if ctx.config.create_deployer_user {
            let owner = format!("{0}:{0}", ctx.settings.deployer_user);
            ctx.host.run(CommandSpec::new("chown").args(["-R", &owner, &path])).await?;
        }
        Ok(StepOutcome::Done)
    }
}

pub struct RegistryAuth;

#[async_trait]
impl ProvisioningStep for RegistryAuth {
    fn name(&self) -> &'static str {
        "registry-auth"
    }

    async fn configure(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, ProvisionError> {
        let spec = CommandSpec::new("docker")
            .args([
                "login",
                ctx.settings.registry.as_str(),
                "-u",
                ctx.config.registry_username.as_str(),
                "--password-stdin",
            ])
            .stdin(ctx.credentials.registry_secret.clone());

        let output = ctx.host.runner().run(&spec).await?;
        if !output.success() {
            return Err(ProvisionError::CredentialError(format!(
                "docker login to {} as {} failed: {}",
                ctx.settings.registry,
                ctx.config.registry_username,
                output.tail(5)
            )));
        }
        info!("Logged in to {}", ctx.settings.registry);
        Ok(StepOutcome::Done)
    }
}

pub struct Environment;

/// Whether the carried values lack a usable `SECRET_KEY`
fn needs_secret_key(carried: &[(String, String)]) -> bool {
    match kv::get(carried, "SECRET_KEY") {
        None => true,
        Some(value) => value.is_empty() || value == placeholders::SECRET_KEY,
    }
}

#[async_trait]
impl ProvisioningStep for Environment {
    fn name(&self) -> &'static str {
        "environment"
    }

    async fn configure(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, ProvisionError> {
        let file = ctx.layout.env_file(&ctx.config);
        let mut carried = if file.exists().await {
            kv::parse(&file.read_string().await?)
        } else {
            Vec::new()
        };

        if ctx.settings.generate_secret_key && needs_secret_key(&carried) {
            carried.push(("SECRET_KEY".to_string(), generate_secret_key()));
            ctx.prompter.info("Generated a new SECRET_KEY");
        }

        let artifact = ctx.renderer().render_environment(&ctx.config, &carried);
        if let Some(backup) = ArtifactWriter::install(&artifact, artifact.template.mode(), true).await? {
            ctx.prompter
                .info(&format!("Previous environment saved to {}", backup.path().display()));
        }

        edit_until_valid(ctx, file.path()).await?;
        Ok(StepOutcome::Done)
    }
}

/// Validate an environment file, offering the editor until it passes.
///
/// Declining to edit an invalid file is an `InvalidConfiguration` error.
/// Warnings are reported once the file is valid.
pub async fn edit_until_valid(ctx: &mut StepContext<'_>, path: &Path) -> Result<(), ProvisionError> {
    let validator = Validator;
    loop {
        let report = validator.validate_file(path).await?;
        if report.is_valid() {
            for warning in &report.warnings {
                ctx.warn(format!("{}: {}", path.display(), warning));
            }
            return Ok(());
        }

        for finding in &report.errors {
            ctx.prompter.show(Tone::Error, &finding.to_string());
        }
        let question = format!("Open {} in {} to fix it?", path.display(), ctx.settings.editor);
        if !confirm(&mut *ctx.prompter, "edit_environment", &question, true).await? {
            return report.into_result(path).map(|_| ());
        }

        let mut words = ctx.settings.editor.split_whitespace();
        let program = words.next().unwrap_or("nano").to_string();
        let spec = CommandSpec::new(program)
            .args(words.map(str::to_string))
            .arg(path.display().to_string())
            .interactive();
        ctx.host.run(spec).await?;
    }
}
