//! Day-2 management scripts written into the application directory

use std::fmt;
use std::str::FromStr;

use crate::config::DeploymentConfig;
use crate::errors::ProvisionError;
use crate::storage::settings::Settings;

/// Which management script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    Deploy,
    Start,
    Stop,
    Status,
    Logs,
}

impl ScriptKind {
    pub const ALL: [ScriptKind; 5] = [
        ScriptKind::Deploy,
        ScriptKind::Start,
        ScriptKind::Stop,
        ScriptKind::Status,
        ScriptKind::Logs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptKind::Deploy => "deploy",
            ScriptKind::Start => "start",
            ScriptKind::Stop => "stop",
            ScriptKind::Status => "status",
            ScriptKind::Logs => "logs",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.sh", self.as_str())
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScriptKind {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_suffix(".sh").unwrap_or(s);
        ScriptKind::ALL
            .into_iter()
            .find(|k| k.as_str() == name)
            .ok_or_else(|| ProvisionError::InputError(format!("Unknown script: {}", s)))
    }
}

/// Render one script
pub fn render(kind: ScriptKind, config: &DeploymentConfig, settings: &Settings) -> String {
    let header = format!(
        "#!/usr/bin/env bash\n\
         # Managed by escprov. Local changes are overwritten on the next run.\n\
         set -euo pipefail\n\
         cd \"{}\"\n\
         COMPOSE=\"docker compose -f {}\"\n\n",
        config.app_dir.display(),
        settings.compose_file
    );

    let body = match kind {
        ScriptKind::Deploy => {
            let mut body = String::new();
            if config.source_repo.is_some() {
                body.push_str("git pull --ff-only\n");
            }
            body.push_str(
                "$COMPOSE pull\n\
                 $COMPOSE up -d --remove-orphans\n\
                 docker image prune -f\n\
                 $COMPOSE ps\n",
            );
            body
        }
        ScriptKind::Start => format!("systemctl start {}\n$COMPOSE ps\n", settings.service_name),
        ScriptKind::Stop => format!("systemctl stop {}\n", settings.service_name),
        ScriptKind::Status => format!(
            "systemctl --no-pager status {} || true\n$COMPOSE ps\n",
            settings.service_name
        ),
        ScriptKind::Logs => "$COMPOSE logs --tail=200 -f ${1:-}\n".to_string(),
    };

    header + &body
}
