//! Bringing the application stack up and day-2 container operations

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::errors::ProvisionError;
use crate::host::{CommandSpec, Host};
use crate::storage::settings::Settings;

/// `docker compose ps` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    pub name: String,
    pub status: String,
}

impl ContainerStatus {
    pub fn is_up(&self) -> bool {
        self.status.starts_with("Up")
    }
}

/// Result of polling the stack
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceStatus {
    /// Every container is up
    pub running: bool,
    pub per_container: Vec<ContainerStatus>,
    /// Best-effort problems, each with a remediation hint
    pub warnings: Vec<String>,
}

impl ServiceStatus {
    /// Parse `docker compose ps --format "{{.Name}}\t{{.Status}}"` output
    pub fn parse(output: &str) -> Self {
        let per_container: Vec<ContainerStatus> = output
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| {
                let (name, status) = line.split_once('\t').unwrap_or((line, ""));
                ContainerStatus {
                    name: name.trim().to_string(),
                    status: status.trim().to_string(),
                }
            })
            .collect();

        let warnings = per_container
            .iter()
            .filter(|c| !c.is_up())
            .map(|c| {
                format!(
                    "Container {} is not up ({}); inspect it with `escprov logs`",
                    c.name,
                    if c.status.is_empty() { "no status" } else { c.status.as_str() }
                )
            })
            .collect();

        Self {
            running: !per_container.is_empty() && per_container.iter().all(ContainerStatus::is_up),
            per_container,
            warnings,
        }
    }

    pub fn degraded(&self) -> Vec<&ContainerStatus> {
        self.per_container.iter().filter(|c| !c.is_up()).collect()
    }
}

/// Drives `docker compose` for the application directory
pub struct ServiceActivator<'a> {
    host: &'a Host,
    settings: &'a Settings,
}

impl<'a> ServiceActivator<'a> {
    pub fn new(host: &'a Host, settings: &'a Settings) -> Self {
        Self { host, settings }
    }

    fn compose(&self, app_dir: &Path) -> CommandSpec {
        CommandSpec::new("docker")
            .args([
                "compose".to_string(),
                "-f".to_string(),
                app_dir.join(&self.settings.compose_file).display().to_string(),
            ])
            .current_dir(app_dir)
    }

    /// Pull, start, wait for the settle interval, then poll once.
    ///
    /// A failed pull or a container that is not up is reported as a warning.
    pub async fn start(&self, app_dir: &Path) -> Result<ServiceStatus, ProvisionError> {
        let mut warnings = Vec::new();

        let pull = self.host.runner().run(&self.compose(app_dir).arg("pull")).await?;
        if !pull.success() {
            let message = format!(
                "Image pull failed, starting with cached images: {}",
                pull.tail(3)
            );
            warn!("{}", message);
            warnings.push(message);
        }

        self.host
            .run(self.compose(app_dir).args(["up", "-d", "--remove-orphans"]))
            .await?;
        info!("Waiting {}s for containers to settle", self.settings.settle_secs);
        tokio::time::sleep(Duration::from_secs(self.settings.settle_secs)).await;

        let mut status = self.status(app_dir).await?;
        warnings.append(&mut status.warnings);
        status.warnings = warnings;
        Ok(status)
    }

    pub async fn stop(&self, app_dir: &Path) -> Result<(), ProvisionError> {
        self.host.run(self.compose(app_dir).arg("down")).await?;
        Ok(())
    }

    /// Poll container state once
    pub async fn status(&self, app_dir: &Path) -> Result<ServiceStatus, ProvisionError> {
        let output = self
            .host
            .run(self.compose(app_dir).args(["ps", "--all", "--format", "{{.Name}}\t{{.Status}}"]))
            .await?;
        Ok(ServiceStatus::parse(&output.stdout))
    }

    /// Show recent logs on the terminal
    pub async fn logs(&self, app_dir: &Path, service: Option<&str>) -> Result<(), ProvisionError> {
        let mut spec = self.compose(app_dir).args(["logs", "--tail=200"]).interactive();
        if let Some(service) = service {
            spec = spec.arg(service);
        }
        self.host.run(spec).await?;
        Ok(())
    }

    /// Pull new images, recreate changed containers and prune old images
    pub async fn redeploy(&self, app_dir: &Path) -> Result<ServiceStatus, ProvisionError> {
        let mut status = self.start(app_dir).await?;
        let prune = self
            .host
            .runner()
            .run(&CommandSpec::new("docker").args(["image", "prune", "-f"]))
            .await?;
        if !prune.success() {
            status
                .warnings
                .push(format!("Pruning old images failed: {}", prune.tail(3)));
        }
        Ok(status)
    }
}
