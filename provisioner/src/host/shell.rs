//! Common host operations over a [`CommandRunner`]

use std::sync::Arc;

use tracing::debug;

use crate::errors::ProvisionError;
use crate::host::runner::{CommandOutput, CommandRunner, CommandSpec};

/// Shared handle for running host commands
#[derive(Clone)]
pub struct Host {
    runner: Arc<dyn CommandRunner>,
}

impl Host {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    /// Run a command, failing on a non-zero exit
    pub async fn run(&self, spec: CommandSpec) -> Result<CommandOutput, ProvisionError> {
        self.runner.run_checked(&spec).await
    }

    /// Run a command and report only whether it succeeded
    pub async fn succeeds(&self, spec: CommandSpec) -> bool {
        self.runner.succeeds(&spec).await
    }

    pub async fn systemctl<I, S>(&self, args: I) -> Result<CommandOutput, ProvisionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run(CommandSpec::new("systemctl").args(args)).await
    }

    /// Whether every package is installed according to dpkg
    pub async fn packages_installed<S: AsRef<str> + Sync>(&self, packages: &[S]) -> bool {
        for package in packages {
            if !self
                .succeeds(CommandSpec::new("dpkg").args(["-s", package.as_ref()]))
                .await
            {
                debug!("Package {} is not installed", package.as_ref());
                return false;
            }
        }
        true
    }

    pub async fn apt_install<S: AsRef<str> + Sync>(&self, packages: &[S]) -> Result<(), ProvisionError> {
        self.run(
            CommandSpec::new("apt-get")
                .arg("update")
                .env("DEBIAN_FRONTEND", "noninteractive"),
        )
        .await?;
        self.run(
            CommandSpec::new("apt-get")
                .args(["install", "-y", "--no-install-recommends"])
                .args(packages.iter().map(|p| p.as_ref().to_string()))
                .env("DEBIAN_FRONTEND", "noninteractive"),
        )
        .await?;
        Ok(())
    }
}
