//! Container engine abstraction
//!
//! The pipeline only needs a handful of engine primitives: pull a base image,
//! derive a new image from an existing one (optionally uploading files and
//! running one command), tag, remove, and launch. [`DockerBackend`] implements
//! them against the Docker Engine API; [`mock::RecordingBackend`] records them
//! in memory for tests.

pub mod docker;
pub mod mock;

use crate::recipe::ImageReference;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use docker::DockerBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Container engine unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to pull {reference}: {message}")]
    Pull { reference: String, message: String },

    #[error("Command `{command}` exited with status {exit_code}")]
    CommandFailed { command: String, exit_code: i64 },

    #[error("Image {0} not found")]
    ImageNotFound(String),

    #[error("Container engine error: {0}")]
    Engine(String),
}

/// Image configuration written with every derived layer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageSettings {
    pub working_dir: Option<String>,
    /// `KEY=value` entries
    pub env: Vec<String>,
    pub cmd: Option<Vec<String>>,
}

/// A tar archive extracted at `dest` before the command runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub archive: Vec<u8>,
    pub dest: String,
}

/// Everything needed to derive one layer from its parent image
#[derive(Debug, Clone)]
pub struct LayerSpec {
    /// Reference (`repository:tag`) the new image is committed under
    pub target: String,
    /// Command to run; `None` commits uploads and settings only
    pub command: Option<Vec<String>>,
    pub upload: Option<Upload>,
    pub settings: ImageSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledImage {
    pub id: String,
    /// Environment declared by the image config
    pub env: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub name: Option<String>,
    /// Remove the container after it exits
    pub remove: bool,
    /// Grace period when stopping on interrupt
    pub stop_timeout: Duration,
}

impl Default for LaunchSpec {
    fn default() -> Self {
        Self {
            name: None,
            remove: true,
            stop_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInfo {
    pub version: String,
    pub api_version: String,
}

#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn info(&self) -> Result<EngineInfo, BackendError>;

    async fn pull(&self, reference: &ImageReference) -> Result<PulledImage, BackendError>;

    /// Derives `spec.target` from `from` and returns the new image id.
    async fn apply(&self, from: &str, spec: &LayerSpec) -> Result<String, BackendError>;

    async fn tag(&self, image: &str, repository: &str, tag: &str) -> Result<(), BackendError>;

    async fn remove_image(&self, reference: &str) -> Result<(), BackendError>;

    async fn image_exists(&self, reference: &str) -> Result<bool, BackendError>;

    /// Runs the image's declared command once and returns its exit code.
    async fn launch(&self, image: &str, spec: &LaunchSpec) -> Result<i64, BackendError>;
}

/// Splits a `repository:tag` reference built by the pipeline.
pub(crate) fn split_target(target: &str) -> Result<(String, String), BackendError> {
    let reference: ImageReference = target
        .parse()
        .map_err(|e| BackendError::Engine(format!("invalid target '{}': {}", target, e)))?;
    let tag = reference
        .tag
        .ok_or_else(|| BackendError::Engine(format!("target '{}' has no tag", target)))?;
    Ok((reference.repository, tag))
}
