//! Recording runner used for `--dry-run` and tests

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::errors::ProvisionError;
use crate::host::runner::{CommandOutput, CommandRunner, CommandSpec};

struct Rule {
    prefix: String,
    responses: VecDeque<CommandOutput>,
    sticky: CommandOutput,
}

/// Records every command instead of running it.
///
/// Commands whose command line starts with a registered prefix get the
/// scripted output; everything else succeeds with empty output. The most
/// recently registered matching prefix wins.
#[derive(Default)]
pub struct DryRunRunner {
    rules: Mutex<Vec<Rule>>,
    history: Mutex<Vec<String>>,
    default_output: CommandOutput,
    announce: bool,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print each command at info level as it is recorded
    pub fn announcing() -> Self {
        Self {
            announce: true,
            ..Self::default()
        }
    }

    /// Output returned for commands no rule matches
    pub fn with_default(mut self, output: CommandOutput) -> Self {
        self.default_output = output;
        self
    }

    /// Always answer commands starting with `prefix` with `output`
    pub fn respond(&self, prefix: &str, output: CommandOutput) {
        self.lock_rules().push(Rule {
            prefix: prefix.to_string(),
            responses: VecDeque::new(),
            sticky: output,
        });
    }

    /// Answer the next matching command with `first`, later ones with `then`
    pub fn respond_once(&self, prefix: &str, first: CommandOutput, then: CommandOutput) {
        self.lock_rules().push(Rule {
            prefix: prefix.to_string(),
            responses: VecDeque::from([first]),
            sticky: then,
        });
    }

    /// Every recorded command line, in order
    pub fn history(&self) -> Vec<String> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Recorded command lines starting with `prefix`
    pub fn commands_starting_with(&self, prefix: &str) -> Vec<String> {
        self.history()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    fn lock_rules(&self) -> std::sync::MutexGuard<'_, Vec<Rule>> {
        match self.rules.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl CommandRunner for DryRunRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProvisionError> {
        let line = spec.command_line();
        if self.announce {
            info!("[dry-run] {}", line);
        }
        if let Ok(mut history) = self.history.lock() {
            history.push(line.clone());
        }

        let mut rules = self.lock_rules();
        let output = rules
            .iter_mut()
            .rev()
            .find(|rule| line.starts_with(&rule.prefix))
            .map(|rule| rule.responses.pop_front().unwrap_or_else(|| rule.sticky.clone()))
            .unwrap_or_else(|| self.default_output.clone());
        Ok(output)
    }
}
