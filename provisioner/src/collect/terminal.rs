//! Interactive prompter on the controlling terminal

use std::io::Write;

use async_trait::async_trait;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::collect::prompt::{Prompt, Prompter, Tone};
use crate::errors::ProvisionError;

/// Reads answers from stdin and prints to stdout
pub struct TerminalPrompter {
    lines: Lines<BufReader<Stdin>>,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn ask(&mut self, prompt: &Prompt) -> Result<String, ProvisionError> {
        print!("{}", prompt.render().cyan());
        std::io::stdout().flush()?;

        if prompt.secret {
            set_echo(false);
        }
        let line = self.lines.next_line().await;
        if prompt.secret {
            set_echo(true);
            println!();
        }

        match line? {
            Some(line) => Ok(line.trim().to_string()),
            None => Err(ProvisionError::InputError(format!(
                "stdin closed while waiting for '{}'",
                prompt.key
            ))),
        }
    }

    fn show(&mut self, tone: Tone, message: &str) {
        match tone {
            Tone::Heading => println!("\n{}\n{}", message.bold(), "=".repeat(message.len()).bold()),
            Tone::Info => println!("{}", message),
            Tone::Success => println!("{} {}", "[OK]".green().bold(), message),
            Tone::Warning => println!("{} {}", "[WARN]".yellow().bold(), message),
            Tone::Error => eprintln!("{} {}", "[ERROR]".red().bold(), message),
        }
    }
}

/// Toggle terminal echo for secret input. Best effort: without a tty the
/// answer is simply read as typed.
fn set_echo(on: bool) {
    #[cfg(unix)]
    {
        let _ = std::process::Command::new("stty")
            .arg(if on { "echo" } else { "-echo" })
            .stdin(std::process::Stdio::inherit())
            .status();
    }
    #[cfg(not(unix))]
    {
        let _ = on;
    }
}
