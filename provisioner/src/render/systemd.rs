//! systemd unit for the compose stack

use crate::config::DeploymentConfig;
use crate::storage::settings::Settings;

/// Render the unit file
pub fn render(config: &DeploymentConfig, settings: &Settings) -> String {
    let app_dir = config.app_dir.display();
    let compose = format!("/usr/bin/docker compose -f {}/{}", app_dir, settings.compose_file);
    format!(
        "# Managed by escprov. Local changes are overwritten on the next run.\n\
         [Unit]\n\
         Description={} application stack\n\
         Requires=docker.service\n\
         After=docker.service network-online.target\n\
         Wants=network-online.target\n\n\
         [Service]\n\
         Type=oneshot\n\
         RemainAfterExit=yes\n\
         WorkingDirectory={}\n\
         ExecStart={} up -d --remove-orphans\n\
         ExecStop={} down\n\
         ExecReload={} up -d --remove-orphans\n\
         TimeoutStartSec=0\n\n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        settings.site_name, app_dir, compose, compose, compose
    )
}
