//! Error types for the provisioner

use thiserror::Error;

/// Main error type for the provisioner
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The operator declined a confirmation. Not a failure.
    #[error("Cancelled by operator")]
    Cancelled,

    #[error("Unsupported operating system: {0}")]
    UnsupportedOs(String),

    #[error("Registry authentication failed: {0}")]
    CredentialError(String),

    #[error("Cannot proceed with invalid configuration in {artifact}: {}", .errors.join("; "))]
    InvalidConfiguration {
        artifact: String,
        errors: Vec<String>,
    },

    #[error("Step '{step}' failed: {message}")]
    StepError {
        step: String,
        message: String,
        output: Option<String>,
    },

    #[error("Command `{command}` exited with status {status}")]
    CommandError {
        command: String,
        status: i32,
        output: String,
    },

    #[error("Input error: {0}")]
    InputError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProvisionError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ProvisionError::Cancelled => 0,
            ProvisionError::UnsupportedOs(_) => 2,
            ProvisionError::CredentialError(_) => 3,
            ProvisionError::InvalidConfiguration { .. } => 4,
            ProvisionError::StepError { .. } => 1,
            _ => 1,
        }
    }

    /// Captured command output attached to this error, if any
    pub fn output(&self) -> Option<&str> {
        match self {
            ProvisionError::StepError { output, .. } => output.as_deref(),
            ProvisionError::CommandError { output, .. } if !output.is_empty() => Some(output),
            _ => None,
        }
    }

    /// Wrap this error with the name of the step it occurred in.
    ///
    /// Categories with their own exit code are kept as they are.
    pub fn in_step(self, step: &str) -> ProvisionError {
        match self {
            ProvisionError::Cancelled
            | ProvisionError::UnsupportedOs(_)
            | ProvisionError::CredentialError(_)
            | ProvisionError::InvalidConfiguration { .. }
            | ProvisionError::StepError { .. } => self,
            other => {
                let output = other.output().map(str::to_string);
                ProvisionError::StepError {
                    step: step.to_string(),
                    message: other.to_string(),
                    output,
                }
            }
        }
    }
}
