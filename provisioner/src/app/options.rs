//! Command line options

use std::collections::HashMap;
use std::path::PathBuf;

use crate::errors::ProvisionError;
use crate::logs::LogLevel;

/// What the invocation should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Collect configuration and run the provisioning pipeline
    Install,
    Start,
    Stop,
    Status,
    /// Show container logs, optionally for one compose service
    Logs(Option<String>),
    /// Pull new images and recreate containers
    Deploy,
    /// Print a rendered template to stdout
    Render(String),
    /// Check an environment file; defaults to the deployed one
    Validate(Option<PathBuf>),
    Version,
}

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppOptions {
    pub command: Command,

    /// Batch answers instead of the terminal
    pub answers: Option<PathBuf>,

    /// Settings file, `/etc/escprov/settings.json` under the root when absent
    pub settings_file: Option<PathBuf>,

    /// Filesystem root for every host path
    pub root: Option<PathBuf>,

    /// Record commands instead of running them
    pub dry_run: bool,

    /// Console log level override
    pub log_level: Option<LogLevel>,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            command: Command::Install,
            answers: None,
            settings_file: None,
            root: None,
            dry_run: false,
            log_level: None,
        }
    }
}

impl AppOptions {
    /// Parse arguments (without the program name).
    ///
    /// Flags use `--key=value` or bare `--flag`; the first positional word is
    /// the subcommand.
    pub fn parse<I, S>(args: I) -> Result<Self, ProvisionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut flags: HashMap<String, String> = HashMap::new();
        let mut positional: Vec<String> = Vec::new();

        for arg in args {
            let arg = arg.as_ref();
            if let Some(flag) = arg.strip_prefix("--") {
                match flag.split_once('=') {
                    Some((key, value)) => flags.insert(key.to_string(), value.to_string()),
                    None => flags.insert(flag.to_string(), "true".to_string()),
                };
            } else {
                positional.push(arg.to_string());
            }
        }

        let known = ["answers", "settings", "root", "dry-run", "version", "log-level", "file"];
        if let Some(unknown) = flags.keys().find(|k| !known.contains(&k.as_str())) {
            return Err(ProvisionError::InputError(format!("Unknown option --{}", unknown)));
        }

        let mut words = positional.into_iter();
        let command = if flags.contains_key("version") {
            Command::Version
        } else {
            match words.next().as_deref() {
                None | Some("install") => Command::Install,
                Some("start") => Command::Start,
                Some("stop") => Command::Stop,
                Some("status") => Command::Status,
                Some("logs") => Command::Logs(words.next()),
                Some("deploy") => Command::Deploy,
                Some("render") => Command::Render(words.next().ok_or_else(|| {
                    ProvisionError::InputError("render needs a template name".to_string())
                })?),
                Some("validate") => Command::Validate(
                    flags.get("file").map(PathBuf::from).or_else(|| words.next().map(PathBuf::from)),
                ),
                Some(other) => {
                    return Err(ProvisionError::InputError(format!("Unknown command '{}'", other)))
                }
            }
        };

        if let Some(extra) = words.next() {
            return Err(ProvisionError::InputError(format!("Unexpected argument '{}'", extra)));
        }

        let log_level = flags
            .get("log-level")
            .map(|l| l.parse::<LogLevel>())
            .transpose()
            .map_err(ProvisionError::InputError)?;

        Ok(Self {
            command,
            answers: flags.get("answers").map(PathBuf::from),
            settings_file: flags.get("settings").map(PathBuf::from),
            root: flags.get("root").map(PathBuf::from),
            dry_run: flags.contains_key("dry-run"),
            log_level,
        })
    }
}

pub const USAGE: &str = "\
Usage: escprov [COMMAND] [OPTIONS]

Commands:
  install              Collect configuration and provision this host (default)
  start | stop         Start or stop the application stack
  status               Show container status
  logs [SERVICE]       Show recent container logs
  deploy               Pull new images and recreate containers
  render TEMPLATE      Print a rendered template (env, nginx, fail2ban, sshd, systemd, deploy.sh, ...)
  validate [--file=F]  Check an environment file for placeholder values

Options:
  --answers=FILE       Read answers from a KEY=value file instead of the terminal
  --settings=FILE      Settings file (default /etc/escprov/settings.json)
  --root=DIR           Resolve every host path under DIR
  --dry-run            Print commands instead of running them
  --log-level=LEVEL    trace, debug, info, warn or error
  --version            Print version information
";
