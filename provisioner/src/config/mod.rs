//! Deployment configuration

pub mod kv;
pub mod model;

pub use model::{Credentials, DeploymentConfig, SslMode};
