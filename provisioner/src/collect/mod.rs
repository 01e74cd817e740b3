//! Configuration collection from the operator

pub mod collector;
pub mod prompt;
pub mod scripted;
pub mod terminal;

pub use collector::{Collected, Collector};
pub use prompt::{confirm, Prompt, Prompter, Tone};
pub use scripted::{AnswerFilePrompter, ScriptedPrompter};
pub use terminal::TerminalPrompter;
