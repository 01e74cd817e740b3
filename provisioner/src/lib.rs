//! escprov
//!
//! Interactive provisioning for a containerised Django stack on a single
//! Debian or Ubuntu host: collects the deployment configuration, runs an
//! idempotent pipeline of provisioning steps, then starts the application.

pub mod activate;
pub mod app;
pub mod collect;
pub mod config;
pub mod errors;
pub mod filesys;
pub mod host;
pub mod logs;
pub mod pipeline;
pub mod render;
pub mod storage;
pub mod utils;
pub mod validate;
