//! Shared scratch hosts and configs

use std::sync::Arc;

use escprov::collect::ScriptedPrompter;
use escprov::config::{Credentials, DeploymentConfig, SslMode};
use escprov::filesys::dir::Dir;
use escprov::filesys::file::File;
use escprov::host::{CommandOutput, DryRunRunner, Host};
use escprov::pipeline::{Pipeline, PipelineResult, StepContext};
use escprov::storage::layout::StorageLayout;
use escprov::storage::settings::Settings;

pub const REGISTRY_SECRET: &str = "ghp_s3cr3t-registry-token";

pub const UBUNTU_OS_RELEASE: &str = "NAME=\"Ubuntu\"\nVERSION_ID=\"24.04\"\nID=ubuntu\nID_LIKE=debian\n";

pub const STOCK_SSHD_CONFIG: &str = "Include /etc/ssh/sshd_config.d/*.conf\nPort 22\nPermitRootLogin yes\nPasswordAuthentication yes\n";

/// `ss -Hltn` lines for listeners on `ports`
pub fn ss_listening(ports: &[u16]) -> String {
    ports
        .iter()
        .map(|port| format!("LISTEN 0      128          0.0.0.0:{}      0.0.0.0:*\n", port))
        .collect()
}

/// A dry-run host where sshd comes up on both the stock and the hardened port
pub fn host_runner() -> Arc<DryRunRunner> {
    let runner = Arc::new(DryRunRunner::new());
    runner.respond("ss -Hltn", CommandOutput::ok(ss_listening(&[22, 2222])));
    runner
}

pub fn example_config() -> DeploymentConfig {
    DeploymentConfig {
        domain: "example.com".into(),
        registry_username: "esc-bot".into(),
        ssl_mode: SslMode::SelfSigned,
        admin_email: "admin@example.com".into(),
        ssh_hardening: true,
        ssh_port: 2222,
        disable_root_login: true,
        password_auth: false,
        ..Default::default()
    }
}

pub fn test_settings() -> Settings {
    Settings {
        settle_secs: 0,
        editor: "true".into(),
        ..Default::default()
    }
}

/// A scratch root that looks like a fresh Ubuntu host with the compose file
/// in place and an operator key installed for root
pub async fn scratch_host(config: &DeploymentConfig) -> (Dir, StorageLayout) {
    let root = Dir::create_temp_dir("escprov-test-host").await.unwrap();
    let layout = StorageLayout::new(root.path());
    let settings = test_settings();

    layout
        .os_release_file()
        .write_atomic(UBUNTU_OS_RELEASE.as_bytes(), None)
        .await
        .unwrap();
    layout
        .sshd_config_file()
        .write_atomic(STOCK_SSHD_CONFIG.as_bytes(), Some(0o644))
        .await
        .unwrap();
    layout
        .compose_file(config, &settings)
        .write_atomic(b"services:\n  web:\n    image: ghcr.io/esc/web:latest\n", None)
        .await
        .unwrap();
    File::new(layout.host_path("/root/.ssh/authorized_keys"))
        .write_atomic(b"ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOperatorKey operator@laptop\n", Some(0o600))
        .await
        .unwrap();

    (root, layout)
}

pub async fn run_pipeline(
    layout: &StorageLayout,
    config: &DeploymentConfig,
    runner: Arc<DryRunRunner>,
    prompter: &mut ScriptedPrompter,
) -> PipelineResult {
    run_pipeline_with(layout, config, test_settings(), runner, prompter).await
}

pub async fn run_pipeline_with(
    layout: &StorageLayout,
    config: &DeploymentConfig,
    settings: Settings,
    runner: Arc<DryRunRunner>,
    prompter: &mut ScriptedPrompter,
) -> PipelineResult {
    let mut ctx = StepContext::new(
        config.clone(),
        Credentials::new(REGISTRY_SECRET),
        layout.clone(),
        settings,
        Host::new(runner),
        prompter,
    );
    Pipeline::standard().run(&mut ctx).await
}
