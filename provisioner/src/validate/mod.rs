//! Placeholder and safety checks for rendered artifacts

use std::fmt;
use std::path::Path;

use crate::config::kv;
use crate::errors::ProvisionError;
use crate::filesys::file::File;
use crate::render::{placeholders, RenderedArtifact, TemplateId, ValidationState};

/// One problem found in an artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Offending key, or `-` for whole-file problems
    pub key: String,
    pub message: String,
}

impl Finding {
    fn new(key: &str, message: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

impl ValidationReport {
    pub fn state(&self) -> ValidationState {
        if self.errors.is_empty() {
            ValidationState::Valid
        } else {
            ValidationState::Invalid
        }
    }

    pub fn is_valid(&self) -> bool {
        self.state() == ValidationState::Valid
    }

    /// Turn an invalid report into the error that aborts the pipeline
    pub fn into_result(self, artifact: &Path) -> Result<Vec<Finding>, ProvisionError> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(ProvisionError::InvalidConfiguration {
                artifact: artifact.display().to_string(),
                errors: self.errors.iter().map(ToString::to_string).collect(),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    /// Check an artifact and record the result on it
    pub fn validate(&self, artifact: &mut RenderedArtifact) -> ValidationReport {
        let report = match artifact.template {
            TemplateId::Environment => self.check_environment(&artifact.contents),
            _ => self.check_non_empty(&artifact.contents),
        };
        artifact.validation = report.state();
        report
    }

    /// Check an environment file on disk
    pub async fn validate_file(&self, path: &Path) -> Result<ValidationReport, ProvisionError> {
        let file = File::new(path);
        if !file.exists().await {
            return Ok(ValidationReport {
                errors: vec![Finding::new("-", format!("{} does not exist", path.display()))],
                warnings: Vec::new(),
            });
        }
        let text = file.read_string().await?;
        Ok(self.check_environment(&text))
    }

    /// Environment file rules
    pub fn check_environment(&self, text: &str) -> ValidationReport {
        let entries = kv::parse(text);
        let mut report = ValidationReport::default();

        match kv::get(&entries, "SECRET_KEY") {
            None | Some("") => report
                .errors
                .push(Finding::new("SECRET_KEY", "is missing or empty")),
            Some(v) if v == placeholders::SECRET_KEY => report
                .errors
                .push(Finding::new("SECRET_KEY", "still has the placeholder value")),
            _ => {}
        }

        if let Some(hosts) = kv::get(&entries, "ALLOWED_HOSTS") {
            if hosts.contains(placeholders::DOMAIN_TOKEN) {
                report.errors.push(Finding::new(
                    "ALLOWED_HOSTS",
                    format!("contains the placeholder host '{}'", placeholders::DOMAIN_TOKEN),
                ));
            }
        }

        if let Some(url) = kv::get(&entries, "DATABASE_URL") {
            if url.contains(placeholders::DATABASE_CREDENTIALS) {
                report.warnings.push(Finding::new(
                    "DATABASE_URL",
                    "uses placeholder credentials",
                ));
            }
        }

        if kv::get(&entries, "EMAIL_HOST_PASSWORD") == Some(placeholders::EMAIL_PASSWORD) {
            report.warnings.push(Finding::new(
                "EMAIL_HOST_PASSWORD",
                "still has the placeholder value; outgoing mail will fail",
            ));
        }

        report
    }

    fn check_non_empty(&self, text: &str) -> ValidationReport {
        let mut report = ValidationReport::default();
        if text.trim().is_empty() {
            report.errors.push(Finding::new("-", "rendered file is empty"));
        }
        report
    }
}
