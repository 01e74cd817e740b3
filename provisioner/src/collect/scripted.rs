//! Non-interactive prompters: answer files and scripted answers

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use colored::Colorize;

use crate::collect::prompt::{Prompt, Prompter, Tone};
use crate::config::kv;
use crate::errors::ProvisionError;
use crate::filesys::file::File;

/// Environment variable consulted for the registry password in batch mode
pub const REGISTRY_PASSWORD_ENV: &str = "ESCPROV_REGISTRY_PASSWORD";

/// Answers prompts from a `key=value` batch file.
///
/// A key with no entry answers empty, so the prompt's default applies. A
/// prompt asked a second time means the first answer was rejected; since a
/// file cannot change its mind, that is an input error rather than a loop.
pub struct AnswerFilePrompter {
    answers: HashMap<String, String>,
    asked: HashSet<&'static str>,
}

impl AnswerFilePrompter {
    pub fn new(answers: HashMap<String, String>) -> Self {
        Self {
            answers,
            asked: HashSet::new(),
        }
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(kv::parse(text).into_iter().collect())
    }

    pub async fn load(file: &File) -> Result<Self, ProvisionError> {
        let text = file.read_string().await.map_err(|e| {
            ProvisionError::InputError(format!("cannot read answer file {:?}: {}", file.path(), e))
        })?;
        Ok(Self::from_text(&text))
    }
}

#[async_trait]
impl Prompter for AnswerFilePrompter {
    async fn ask(&mut self, prompt: &Prompt) -> Result<String, ProvisionError> {
        if !self.asked.insert(prompt.key) {
            return Err(ProvisionError::InputError(format!(
                "answer for '{}' is missing or was rejected",
                prompt.key
            )));
        }

        let answer = self.answers.get(prompt.key).cloned().or_else(|| {
            if prompt.secret {
                std::env::var(REGISTRY_PASSWORD_ENV).ok()
            } else {
                None
            }
        });
        let answer = answer.unwrap_or_default().trim().to_string();

        let shown = if prompt.secret && !answer.is_empty() {
            "********"
        } else {
            answer.as_str()
        };
        println!("{}{}", prompt.render().cyan(), shown);
        Ok(answer)
    }

    fn show(&mut self, tone: Tone, message: &str) {
        match tone {
            Tone::Heading => println!("\n{}", message.bold()),
            Tone::Info => println!("{}", message),
            Tone::Success => println!("{} {}", "[OK]".green().bold(), message),
            Tone::Warning => println!("{} {}", "[WARN]".yellow().bold(), message),
            Tone::Error => eprintln!("{} {}", "[ERROR]".red().bold(), message),
        }
    }
}

/// Answers prompts from an ordered list and keeps a transcript
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    asked: Vec<&'static str>,
    transcript: Vec<(Tone, String)>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Queue more answers
    pub fn push<S: Into<String>>(&mut self, answer: S) {
        self.answers.push_back(answer.into());
    }

    /// Keys of every prompt asked, in order
    pub fn asked(&self) -> &[&'static str] {
        &self.asked
    }

    /// Number of times the prompt with `key` was asked
    pub fn times_asked(&self, key: &str) -> usize {
        self.asked.iter().filter(|k| **k == key).count()
    }

    /// Every message shown, in order
    pub fn transcript(&self) -> &[(Tone, String)] {
        &self.transcript
    }

    /// Messages shown with the given tone
    pub fn messages(&self, tone: Tone) -> Vec<&str> {
        self.transcript
            .iter()
            .filter(|(t, _)| *t == tone)
            .map(|(_, m)| m.as_str())
            .collect()
    }

    /// Answers not consumed
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn ask(&mut self, prompt: &Prompt) -> Result<String, ProvisionError> {
        self.asked.push(prompt.key);
        self.answers
            .pop_front()
            .map(|a| a.trim().to_string())
            .ok_or_else(|| ProvisionError::InputError(format!("no scripted answer for '{}'", prompt.key)))
    }

    fn show(&mut self, tone: Tone, message: &str) {
        self.transcript.push((tone, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_answer_file_rejects_second_ask() {
        let mut prompter = AnswerFilePrompter::from_text("domain=example.com\n");
        let prompt = Prompt::new("domain", "Domain");
        assert_eq!(prompter.ask(&prompt).await.unwrap(), "example.com");
        assert!(prompter.ask(&prompt).await.is_err());
    }

    #[tokio::test]
    async fn test_answer_file_missing_key_is_empty() {
        let mut prompter = AnswerFilePrompter::from_text("");
        let prompt = Prompt::new("ssh_port", "SSH port").with_default("2222");
        assert_eq!(prompter.ask(&prompt).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_scripted_runs_out() {
        let mut prompter = ScriptedPrompter::new(["a"]);
        let prompt = Prompt::new("k", "Question");
        assert_eq!(prompter.ask(&prompt).await.unwrap(), "a");
        assert!(prompter.ask(&prompt).await.is_err());
        assert_eq!(prompter.times_asked("k"), 2);
    }
}
