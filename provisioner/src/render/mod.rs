//! Artifact rendering and installation

pub mod env;
pub mod fail2ban;
pub mod nginx;
pub mod placeholders;
pub mod scripts;
pub mod sshd;
pub mod systemd;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::DeploymentConfig;
use crate::errors::ProvisionError;
use crate::filesys::file::File;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::utils::{backup_stamp, sha256_hash};

pub use scripts::ScriptKind;

/// Which template an artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateId {
    Environment,
    Nginx,
    Fail2banJail,
    SshdConfig,
    SystemdUnit,
    Script(ScriptKind),
}

impl TemplateId {
    /// Permission bits the installed file gets
    pub fn mode(&self) -> u32 {
        match self {
            TemplateId::Environment => 0o600,
            TemplateId::Script(_) => 0o755,
            _ => 0o644,
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateId::Environment => f.write_str("env"),
            TemplateId::Nginx => f.write_str("nginx"),
            TemplateId::Fail2banJail => f.write_str("fail2ban"),
            TemplateId::SshdConfig => f.write_str("sshd"),
            TemplateId::SystemdUnit => f.write_str("systemd"),
            TemplateId::Script(kind) => write!(f, "{}.sh", kind),
        }
    }
}

impl FromStr for TemplateId {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "env" | "environment" => Ok(TemplateId::Environment),
            "nginx" => Ok(TemplateId::Nginx),
            "fail2ban" | "jail" => Ok(TemplateId::Fail2banJail),
            "sshd" | "ssh" => Ok(TemplateId::SshdConfig),
            "systemd" | "unit" => Ok(TemplateId::SystemdUnit),
            other => other.parse::<ScriptKind>().map(TemplateId::Script).map_err(|_| {
                ProvisionError::InputError(format!(
                    "Unknown template '{}' (expected env, nginx, fail2ban, sshd, systemd or a script name)",
                    other
                ))
            }),
        }
    }
}

/// Outcome of validating an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationState {
    #[default]
    Unvalidated,
    Valid,
    Invalid,
}

/// A rendered configuration file, not yet installed
#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub template: TemplateId,
    /// Host path (already resolved against the layout root)
    pub path: PathBuf,
    pub contents: String,
    pub rendered_at: DateTime<Utc>,
    /// sha256 of `contents`
    pub digest: String,
    pub validation: ValidationState,
}

impl RenderedArtifact {
    pub fn new(template: TemplateId, path: PathBuf, contents: String) -> Self {
        let digest = sha256_hash(contents.as_bytes());
        Self {
            template,
            path,
            contents,
            rendered_at: Utc::now(),
            digest,
            validation: ValidationState::Unvalidated,
        }
    }

    pub fn file(&self) -> File {
        File::new(&self.path)
    }
}

/// Renders artifacts for one host layout
pub struct Renderer<'a> {
    layout: &'a StorageLayout,
    settings: &'a Settings,
}

impl<'a> Renderer<'a> {
    pub fn new(layout: &'a StorageLayout, settings: &'a Settings) -> Self {
        Self { layout, settings }
    }

    /// Target path of a template's output
    pub fn target(&self, template: TemplateId, config: &DeploymentConfig) -> File {
        match template {
            TemplateId::Environment => self.layout.env_file(config),
            TemplateId::Nginx => self.layout.nginx_site_file(self.settings),
            TemplateId::Fail2banJail => self.layout.fail2ban_jail_file(),
            TemplateId::SshdConfig => self.layout.sshd_config_file(),
            TemplateId::SystemdUnit => self.layout.systemd_unit_file(self.settings),
            TemplateId::Script(kind) => self.layout.app_dir(config).file(&kind.file_name()),
        }
    }

    /// Render a template. The environment file renders without carried values.
    pub fn render(&self, template: TemplateId, config: &DeploymentConfig) -> RenderedArtifact {
        let contents = match template {
            TemplateId::Environment => env::render(config, self.settings, &[]),
            TemplateId::Nginx => nginx::render(config, self.settings),
            TemplateId::Fail2banJail => fail2ban::render(config),
            TemplateId::SshdConfig => sshd::render(config),
            TemplateId::SystemdUnit => systemd::render(config, self.settings),
            TemplateId::Script(kind) => scripts::render(kind, config, self.settings),
        };
        let path = self.target(template, config).path().to_path_buf();
        debug!("Rendered {} for {:?}", template, path);
        RenderedArtifact::new(template, path, contents)
    }

    /// Render the environment file over values carried from the previous one
    pub fn render_environment(&self, config: &DeploymentConfig, carried: &[(String, String)]) -> RenderedArtifact {
        let contents = env::render(config, self.settings, carried);
        let path = self.layout.env_file(config).path().to_path_buf();
        RenderedArtifact::new(TemplateId::Environment, path, contents)
    }
}

/// Installs artifacts onto the host
pub struct ArtifactWriter;

impl ArtifactWriter {
    /// Write `artifact` to its path with `mode`.
    ///
    /// When `backup` is set and the target exists, it is first copied next to
    /// itself; the backup file is returned.
    pub async fn install(
        artifact: &RenderedArtifact,
        mode: u32,
        backup: bool,
    ) -> Result<Option<File>, ProvisionError> {
        let target = artifact.file();
        let saved = if backup {
            Self::backup(&target).await?
        } else {
            None
        };
        target.write_atomic(artifact.contents.as_bytes(), Some(mode)).await?;
        info!("Installed {} at {:?}", artifact.template, artifact.path);
        Ok(saved)
    }

    /// Copy `file` to `<file>.backup.<stamp>`, if it exists
    pub async fn backup(file: &File) -> Result<Option<File>, ProvisionError> {
        if !file.exists().await {
            return Ok(None);
        }
        let base = format!("{}.backup.{}", file.path().display(), backup_stamp(Utc::now()));
        let mut candidate = File::new(&base);
        let mut n = 1;
        while candidate.exists().await {
            candidate = File::new(format!("{}.{}", base, n));
            n += 1;
        }
        file.copy_to(&candidate).await?;
        debug!("Backed up {:?} to {:?}", file.path(), candidate.path());
        Ok(Some(candidate))
    }
}
