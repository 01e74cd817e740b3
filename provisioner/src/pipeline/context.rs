//! State shared by the steps of one pipeline pass

use std::collections::HashMap;

use tracing::warn;

use crate::collect::Prompter;
use crate::config::model::STOCK_SSH_PORT;
use crate::config::{Credentials, DeploymentConfig};
use crate::filesys::file::File;
use crate::host::Host;
use crate::render::{sshd, Renderer};
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

pub struct StepContext<'a> {
    pub config: DeploymentConfig,
    pub credentials: Credentials,
    pub layout: StorageLayout,
    pub settings: Settings,
    pub host: Host,
    pub prompter: &'a mut dyn Prompter,
    /// Files a step overwrote, keyed by step name. `None` means the file
    /// did not exist before.
    pub backups: HashMap<&'static str, Option<File>>,
    /// Port sshd is listening on right now
    pub ssh_port: u16,
    pub warnings: Vec<String>,
}

impl<'a> StepContext<'a> {
    pub fn new(
        config: DeploymentConfig,
        credentials: Credentials,
        layout: StorageLayout,
        settings: Settings,
        host: Host,
        prompter: &'a mut dyn Prompter,
    ) -> Self {
        Self {
            config,
            credentials,
            layout,
            settings,
            host,
            prompter,
            backups: HashMap::new(),
            ssh_port: STOCK_SSH_PORT,
            warnings: Vec::new(),
        }
    }

    pub fn renderer(&self) -> Renderer<'_> {
        Renderer::new(&self.layout, &self.settings)
    }

    /// Record a warning and show it to the operator
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.prompter.warn(&message);
        self.warnings.push(message);
    }

    /// Read the port sshd is configured for from the live config
    pub async fn refresh_ssh_port(&mut self) {
        let file = self.layout.sshd_config_file();
        if let Ok(text) = file.read_string().await {
            self.ssh_port = sshd::configured_port(&text);
        }
    }
}
