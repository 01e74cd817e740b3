//! Host filesystem layout
//!
//! Every path the provisioner touches is resolved against a root so a whole
//! run can be pointed at a scratch directory instead of `/`.

use std::path::{Path, PathBuf};

use crate::config::DeploymentConfig;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::storage::settings::Settings;

/// Storage layout for the provisioner
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Filesystem root all host paths are resolved against
    pub root: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve an absolute host path under the root
    pub fn host_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        let relative = path.strip_prefix("/").unwrap_or(path);
        self.root.join(relative)
    }

    fn file(&self, path: impl AsRef<Path>) -> File {
        File::new(self.host_path(path))
    }

    /// Persisted deployment record
    pub fn record_file(&self) -> File {
        self.file("/etc/escprov/deployment.conf")
    }

    /// Default settings file
    pub fn settings_file(&self) -> File {
        self.file("/etc/escprov/settings.json")
    }

    /// Distribution identification file
    pub fn os_release_file(&self) -> File {
        self.file("/etc/os-release")
    }

    /// Application directory
    pub fn app_dir(&self, config: &DeploymentConfig) -> Dir {
        Dir::new(self.host_path(&config.app_dir))
    }

    /// Environment file consumed by the application containers
    pub fn env_file(&self, config: &DeploymentConfig) -> File {
        self.app_dir(config).file(".env")
    }

    /// Compose file inside the application directory
    pub fn compose_file(&self, config: &DeploymentConfig, settings: &Settings) -> File {
        self.app_dir(config).file(&settings.compose_file)
    }

    /// Nginx site definition
    pub fn nginx_site_file(&self, settings: &Settings) -> File {
        self.file(Path::new("/etc/nginx/sites-available").join(&settings.service_name))
    }

    /// Symlink enabling the Nginx site
    pub fn nginx_enabled_link(&self, settings: &Settings) -> PathBuf {
        self.host_path(Path::new("/etc/nginx/sites-enabled").join(&settings.service_name))
    }

    /// Distribution default site, removed once ours is enabled
    pub fn nginx_default_link(&self) -> PathBuf {
        self.host_path("/etc/nginx/sites-enabled/default")
    }

    /// Fail2Ban local jail overrides
    pub fn fail2ban_jail_file(&self) -> File {
        self.file("/etc/fail2ban/jail.local")
    }

    /// SSH daemon configuration
    pub fn sshd_config_file(&self) -> File {
        self.file("/etc/ssh/sshd_config")
    }

    /// systemd unit for the application stack
    pub fn systemd_unit_file(&self, settings: &Settings) -> File {
        self.file(Path::new("/etc/systemd/system").join(format!("{}.service", settings.service_name)))
    }

    /// Directory holding self-signed certificates
    pub fn self_signed_dir(&self) -> Dir {
        Dir::new(self.host_path(SELF_SIGNED_DIR))
    }

    /// Certificate chain for `domain` as issued by certbot
    pub fn letsencrypt_cert(&self, domain: &str) -> File {
        self.file(letsencrypt_cert_path(domain))
    }

    /// Every `authorized_keys` file a login could use
    pub fn authorized_keys_candidates(&self, settings: &Settings) -> Vec<File> {
        let mut candidates = vec![self.file("/root/.ssh/authorized_keys")];
        let home = self.host_path("/home");
        if let Ok(entries) = std::fs::read_dir(&home) {
            let mut homes: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            homes.sort();
            candidates.extend(homes.into_iter().map(|h| File::new(h.join(".ssh/authorized_keys"))));
        }
        let deployer = File::new(home.join(&settings.deployer_user).join(".ssh/authorized_keys"));
        if !candidates.contains(&deployer) {
            candidates.push(deployer);
        }
        candidates
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("/")
    }
}

/// Where self-signed certificates live on the host
pub const SELF_SIGNED_DIR: &str = "/etc/ssl/esc";

/// Host path of the Let's Encrypt certificate chain
pub fn letsencrypt_cert_path(domain: &str) -> PathBuf {
    PathBuf::from(format!("/etc/letsencrypt/live/{}/fullchain.pem", domain))
}

/// Host path of the Let's Encrypt private key
pub fn letsencrypt_key_path(domain: &str) -> PathBuf {
    PathBuf::from(format!("/etc/letsencrypt/live/{}/privkey.pem", domain))
}

/// Host path of the self-signed certificate
pub fn self_signed_cert_path(domain: &str) -> PathBuf {
    Path::new(SELF_SIGNED_DIR).join(format!("{}.crt", domain))
}

/// Host path of the self-signed private key
pub fn self_signed_key_path(domain: &str) -> PathBuf {
    Path::new(SELF_SIGNED_DIR).join(format!("{}.key", domain))
}
