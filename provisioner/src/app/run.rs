//! Top-level command handlers

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::activate::{ServiceActivator, ServiceStatus};
use crate::app::options::AppOptions;
use crate::collect::{Collected, Collector, Prompter, Tone};
use crate::config::kv;
use crate::config::DeploymentConfig;
use crate::errors::ProvisionError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::host::{CommandOutput, CommandRunner, DryRunRunner, Host, HostFacts, SystemRunner};
use crate::pipeline::{Pipeline, PipelineResult, StepContext};
use crate::render::{Renderer, TemplateId};
use crate::storage::layout::StorageLayout;
use crate::storage::record::load_record;
use crate::storage::settings::Settings;
use crate::validate::Validator;

/// Host files copied into a scratch root so a dry run sees the real state
const DRY_RUN_SEED: &[&str] = &[
    "/etc/os-release",
    "/etc/escprov/deployment.conf",
    "/etc/ssh/sshd_config",
];

/// Everything a command needs about the host
pub struct App {
    pub layout: StorageLayout,
    pub settings: Settings,
    pub host: Host,
    /// Set in dry-run mode so the recorded commands can be listed
    pub dry_run: Option<Arc<DryRunRunner>>,
}

impl App {
    pub fn new(layout: StorageLayout, settings: Settings, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            layout,
            settings,
            host: Host::new(runner),
            dry_run: None,
        }
    }

    /// Resolve root, runner and settings from the command line
    pub async fn from_options(options: &AppOptions) -> Result<Self, ProvisionError> {
        let root = match (&options.root, options.dry_run) {
            (Some(root), _) => root.clone(),
            (None, true) => {
                let scratch = Dir::create_temp_dir("escprov-dry-run").await?;
                seed_scratch_root(scratch.path()).await?;
                scratch.path().to_path_buf()
            }
            (None, false) => PathBuf::from("/"),
        };
        let layout = StorageLayout::new(root);

        let settings_file = match &options.settings_file {
            Some(path) => File::new(path),
            None => layout.settings_file(),
        };
        let settings = Settings::load(&settings_file).await?;

        if options.dry_run {
            let runner = Arc::new(DryRunRunner::announcing());
            let mut app = Self::new(layout, settings, runner.clone());
            app.dry_run = Some(runner);
            Ok(app)
        } else {
            Ok(Self::new(layout, settings, Arc::new(SystemRunner)))
        }
    }

    /// The saved record; day-2 commands cannot run without one
    pub async fn require_record(&self) -> Result<DeploymentConfig, ProvisionError> {
        let file = self.layout.record_file();
        load_record(&file).await?.ok_or_else(|| {
            ProvisionError::NotFound(format!(
                "no deployment record at {:?}; run `escprov install` first",
                file.path()
            ))
        })
    }

    fn activator(&self) -> ServiceActivator<'_> {
        ServiceActivator::new(&self.host, &self.settings)
    }

    fn app_dir(&self, config: &DeploymentConfig) -> PathBuf {
        self.layout.app_dir(config).path().to_path_buf()
    }
}

async fn seed_scratch_root(root: &Path) -> Result<(), ProvisionError> {
    let scratch = StorageLayout::new(root);
    for path in DRY_RUN_SEED {
        let source = File::new(*path);
        if source.exists().await {
            source.copy_to(&File::new(scratch.host_path(*path))).await?;
        }
    }
    Ok(())
}

/// Outcome of a successful install
#[derive(Debug)]
pub struct InstallReport {
    pub config: DeploymentConfig,
    pub pipeline: PipelineResult,
    pub status: ServiceStatus,
}

/// Collect, provision, then start the stack
pub async fn install(app: &App, prompter: &mut dyn Prompter) -> Result<InstallReport, ProvisionError> {
    let existing = match load_record(&app.layout.record_file()).await {
        Ok(existing) => existing,
        Err(e) => {
            warn!("Ignoring unreadable deployment record: {}", e);
            prompter.warn(&format!("Ignoring unreadable deployment record: {}", e));
            None
        }
    };

    let collected = Collector::new(&mut *prompter, app.settings.app_port)
        .collect(existing.as_ref())
        .await?;
    let (config, credentials) = match collected {
        Collected::Proceed { config, credentials } => (config, credentials),
        Collected::Cancelled => return Err(ProvisionError::Cancelled),
    };

    if let Some(runner) = &app.dry_run {
        // sshd comes up on the requested port
        runner.respond(
            "ss -Hltn",
            CommandOutput::ok(format!(
                "LISTEN 0 128 0.0.0.0:{} 0.0.0.0:*\n",
                config.effective_ssh_port()
            )),
        );
        let compose = File::new(config.app_dir.join(&app.settings.compose_file));
        if compose.exists().await {
            compose
                .copy_to(&app.layout.compose_file(&config, &app.settings))
                .await?;
        }
    } else if app.layout.root == Path::new("/") {
        let facts = HostFacts::collect();
        debug!("Host facts: {:?}", facts);
        for shortfall in facts.shortfalls() {
            prompter.warn(&shortfall);
        }
    }

    let mut ctx = StepContext::new(
        config.clone(),
        credentials,
        app.layout.clone(),
        app.settings.clone(),
        app.host.clone(),
        prompter,
    );
    let mut pipeline = Pipeline::standard().run(&mut ctx).await;
    if let Some(err) = pipeline.error.take() {
        return Err(err);
    }
    let prompter = ctx.prompter;

    prompter.show(Tone::Heading, "Starting the application");
    let status = app.activator().start(&app.app_dir(&config)).await?;
    for warning in &status.warnings {
        prompter.warn(warning);
    }
    pipeline.warnings.extend(status.warnings.iter().cloned());

    info!(
        "Install finished: {} steps completed, {} rolled back",
        pipeline.completed.len(),
        pipeline.rolled_back.len()
    );
    Ok(InstallReport {
        config,
        pipeline,
        status,
    })
}

/// Print the outcome of an install to the operator
pub fn report_install(app: &App, report: &InstallReport, prompter: &mut dyn Prompter) {
    prompter.show(Tone::Heading, "Summary");
    prompter.show(
        Tone::Success,
        &format!("{} steps completed", report.pipeline.completed.len()),
    );
    for step in &report.pipeline.rolled_back {
        prompter.warn(&format!("{} was rolled back", step));
    }
    if !report.pipeline.warnings.is_empty() {
        prompter.warn(&format!("{} warnings, see above", report.pipeline.warnings.len()));
    }
    let scheme = if report.config.ssl_mode.is_tls() { "https" } else { "http" };
    prompter.info(&format!("Site: {}://{}", scheme, report.config.domain));
    prompter.info(&format!(
        "Manage the stack with escprov start|stop|status|logs|deploy or the scripts in {}",
        report.config.app_dir.display()
    ));
    if report.status.running {
        prompter.show(Tone::Success, "All containers are up");
    }
    if let Some(runner) = &app.dry_run {
        prompter.info(&format!(
            "Dry run: {} commands recorded, files written under {}",
            runner.history().len(),
            app.layout.root.display()
        ));
    }
}

pub async fn start(app: &App) -> Result<ServiceStatus, ProvisionError> {
    let config = app.require_record().await?;
    app.activator().start(&app.app_dir(&config)).await
}

pub async fn stop(app: &App) -> Result<(), ProvisionError> {
    let config = app.require_record().await?;
    app.activator().stop(&app.app_dir(&config)).await
}

pub async fn status(app: &App) -> Result<ServiceStatus, ProvisionError> {
    let config = app.require_record().await?;
    app.activator().status(&app.app_dir(&config)).await
}

pub async fn logs(app: &App, service: Option<&str>) -> Result<(), ProvisionError> {
    let config = app.require_record().await?;
    app.activator().logs(&app.app_dir(&config), service).await
}

pub async fn deploy(app: &App) -> Result<ServiceStatus, ProvisionError> {
    let config = app.require_record().await?;
    app.activator().redeploy(&app.app_dir(&config)).await
}

/// Render one template against the saved record
pub async fn render(app: &App, template: &str) -> Result<String, ProvisionError> {
    let template: TemplateId = template.parse()?;
    let config = app.require_record().await?;
    let renderer = Renderer::new(&app.layout, &app.settings);

    let artifact = if template == TemplateId::Environment {
        let existing = app.layout.env_file(&config);
        let carried = if existing.exists().await {
            kv::parse(&existing.read_string().await?)
        } else {
            Vec::new()
        };
        renderer.render_environment(&config, &carried)
    } else {
        renderer.render(template, &config)
    };
    Ok(artifact.contents)
}

/// Validate an environment file, the deployed one unless `path` is given
pub async fn validate(app: &App, path: Option<&Path>, prompter: &mut dyn Prompter) -> Result<(), ProvisionError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let config = app.require_record().await?;
            app.layout.env_file(&config).path().to_path_buf()
        }
    };

    let report = Validator.validate_file(&path).await?;
    for finding in &report.errors {
        prompter.show(Tone::Error, &finding.to_string());
    }
    for finding in &report.warnings {
        prompter.warn(&finding.to_string());
    }
    if report.is_valid() {
        prompter.show(Tone::Success, &format!("{} is valid", path.display()));
    }
    report.into_result(&path).map(|_| ())
}

/// Show container status to the operator
pub fn report_status(status: &ServiceStatus, prompter: &mut dyn Prompter) {
    if status.per_container.is_empty() {
        prompter.warn("No containers found");
    }
    for container in &status.per_container {
        let tone = if container.is_up() { Tone::Success } else { Tone::Warning };
        prompter.show(tone, &format!("{}: {}", container.name, container.status));
    }
    for warning in &status.warnings {
        prompter.warn(warning);
    }
}
