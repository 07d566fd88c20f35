//! Runs a built image's declared entry command

use crate::backend::{BackendError, ImageBackend, LaunchSpec};
use crate::progress::{ProgressEvent, ProgressHandler};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Image {0} does not exist; build it first")]
    ImageNotFound(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub image: String,
    pub exit_code: i64,
}

impl LaunchOutcome {
    /// Container exit status as a process exit code
    pub fn process_exit_code(&self) -> i32 {
        i32::try_from(self.exit_code).unwrap_or(1)
    }
}

pub struct Launcher {
    backend: Arc<dyn ImageBackend>,
    progress_handler: Option<Arc<dyn ProgressHandler>>,
}

impl Launcher {
    pub fn new(
        backend: Arc<dyn ImageBackend>,
        progress_handler: Option<Arc<dyn ProgressHandler>>,
    ) -> Self {
        Self {
            backend,
            progress_handler,
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(handler) = &self.progress_handler {
            handler.on_progress(&event);
        }
    }

    /// Starts one container with the image's command, unmodified, and waits for it.
    ///
    /// The exit code is passed through as-is; restarts are left to the caller.
    pub async fn launch(
        &self,
        image: &str,
        spec: &LaunchSpec,
    ) -> Result<LaunchOutcome, LaunchError> {
        if !self.backend.image_exists(image).await? {
            return Err(LaunchError::ImageNotFound(image.to_string()));
        }

        self.emit(ProgressEvent::LaunchStarted {
            image: image.to_string(),
        });
        let exit_code = self.backend.launch(image, spec).await?;
        info!(image, exit_code, "Entry command finished");
        self.emit(ProgressEvent::ContainerExited {
            image: image.to_string(),
            exit_code,
        });

        Ok(LaunchOutcome {
            image: image.to_string(),
            exit_code,
        })
    }
}
