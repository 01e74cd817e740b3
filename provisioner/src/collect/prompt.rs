//! Operator input and output

use async_trait::async_trait;

use crate::errors::ProvisionError;

/// A single question put to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Stable identifier, also the key used in answer files
    pub key: &'static str,
    pub question: String,
    pub default: Option<String>,
    /// Do not echo the answer
    pub secret: bool,
}

impl Prompt {
    pub fn new(key: &'static str, question: impl Into<String>) -> Self {
        Self {
            key,
            question: question.into(),
            default: None,
            secret: false,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        let default = default.into();
        self.default = Some(default).filter(|d| !d.is_empty());
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    /// Question text with the default in brackets
    pub fn render(&self) -> String {
        match &self.default {
            Some(default) if !self.secret => format!("{} [{}]: ", self.question, default),
            _ => format!("{}: ", self.question),
        }
    }
}

/// How a message is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Heading,
    Info,
    Success,
    Warning,
    Error,
}

/// Source of operator answers and sink for operator-facing messages
#[async_trait]
pub trait Prompter: Send {
    /// Ask a question and return the trimmed answer, which may be empty.
    /// Defaults are applied by the caller.
    async fn ask(&mut self, prompt: &Prompt) -> Result<String, ProvisionError>;

    /// Show a message to the operator
    fn show(&mut self, tone: Tone, message: &str);

    fn info(&mut self, message: &str) {
        self.show(Tone::Info, message);
    }

    fn warn(&mut self, message: &str) {
        self.show(Tone::Warning, message);
    }
}

/// Parse a yes/no answer
pub fn parse_yes_no(answer: &str) -> Option<bool> {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" | "true" | "1" => Some(true),
        "n" | "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// Ask a yes/no question until the answer parses
pub async fn confirm(
    prompter: &mut dyn Prompter,
    key: &'static str,
    question: &str,
    default: bool,
) -> Result<bool, ProvisionError> {
    let prompt = Prompt::new(key, format!("{} (y/n)", question))
        .with_default(if default { "y" } else { "n" });
    loop {
        let answer = prompter.ask(&prompt).await?;
        if answer.is_empty() {
            return Ok(default);
        }
        match parse_yes_no(&answer) {
            Some(value) => return Ok(value),
            None => prompter.warn("Please answer y or n."),
        }
    }
}
