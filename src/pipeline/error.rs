use super::layer::{LayerError, StepKind};
use crate::backend::BackendError;
use crate::installer::InstallerError;
use crate::recipe::ReferenceError;
use crate::validation::ValidationError;
use thiserror::Error;

/// Failure inside a single build step
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Base image {reference} is unavailable: {message}")]
    PullFailed { reference: String, message: String },

    #[error("Command `{command}` failed with exit code {exit_code}")]
    CommandFailed { command: String, exit_code: i64 },

    #[error("Installer could not be fetched: {0}")]
    InstallerFetch(String),

    #[error("Installer checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Dependency manifest '{manifest}' not found in the materialized source")]
    ManifestMissing { manifest: String },

    #[error("Source could not be materialized: {0}")]
    Materialize(String),

    #[error("No parent layer for step '{0}'")]
    MissingParent(StepKind),

    #[error(transparent)]
    Backend(BackendError),
}

impl From<BackendError> for StepError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Pull { reference, message } => {
                StepError::PullFailed { reference, message }
            }
            BackendError::CommandFailed { command, exit_code } => {
                StepError::CommandFailed { command, exit_code }
            }
            other => StepError::Backend(other),
        }
    }
}

impl From<InstallerError> for StepError {
    fn from(err: InstallerError) -> Self {
        match err {
            InstallerError::Fetch { url, message } => {
                StepError::InstallerFetch(format!("{}: {}", url, message))
            }
            InstallerError::ChecksumMismatch { expected, actual } => {
                StepError::ChecksumMismatch { expected, actual }
            }
        }
    }
}

/// Failure of a whole build; no final image exists when this is returned
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Invalid recipe: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Build context error: {0}")]
    Context(String),

    #[error("Invalid image tag '{tag}': {source}")]
    InvalidTag {
        tag: String,
        #[source]
        source: ReferenceError,
    },

    #[error("Step '{step}' failed: {source}")]
    Step {
        step: StepKind,
        #[source]
        source: StepError,
    },

    #[error(transparent)]
    Layer(#[from] LayerError),

    #[error("Failed to tag final image: {0}")]
    Tag(#[source] BackendError),
}

impl BuildError {
    /// Step that failed, if the failure happened inside one
    pub fn step(&self) -> Option<StepKind> {
        match self {
            BuildError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }
}
