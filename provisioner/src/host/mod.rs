//! Host command execution and facts

pub mod dry_run;
pub mod facts;
pub mod runner;
pub mod shell;

pub use dry_run::DryRunRunner;
pub use facts::HostFacts;
pub use runner::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use shell::Host;
