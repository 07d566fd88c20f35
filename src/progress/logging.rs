//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, error, info};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::BuildStarted {
                build_id,
                context,
                steps,
            } => {
                info!(build_id = %build_id, context = %context, steps, "Starting build");
            }
            ProgressEvent::StepStarted { step, index, total } => {
                info!(
                    step = %step,
                    "Step {}/{}: {}",
                    index + 1,
                    total,
                    step.title()
                );
            }
            ProgressEvent::StepComplete {
                step,
                image_id,
                duration,
            } => {
                debug!(
                    step = %step,
                    image_id = %image_id,
                    duration_ms = duration.as_millis(),
                    "Step complete"
                );
            }
            ProgressEvent::StepFailed { step, error } => {
                error!(step = %step, "Step failed: {}", error);
            }
            ProgressEvent::CleanupComplete { removed } => {
                debug!(removed, "Removed intermediate layers");
            }
            ProgressEvent::BuildComplete {
                image,
                layers,
                total_time,
            } => {
                info!(
                    image = %image,
                    layers,
                    total_time_ms = total_time.as_millis(),
                    "Build complete"
                );
            }
            ProgressEvent::LaunchStarted { image } => {
                info!(image = %image, "Launching container");
            }
            ProgressEvent::ContainerExited { image, exit_code } => {
                info!(image = %image, exit_code, "Container exited");
            }
        }
    }
}
