//! Progress handler trait and events

use crate::pipeline::StepKind;
use std::time::Duration;

/// Events emitted while building and launching an image
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Build started
    BuildStarted {
        build_id: String,
        context: String,
        steps: usize,
    },

    StepStarted {
        step: StepKind,
        index: usize,
        total: usize,
    },

    StepComplete {
        step: StepKind,
        image_id: String,
        duration: Duration,
    },

    StepFailed {
        step: StepKind,
        error: String,
    },

    /// Intermediate layers removed after success or failure
    CleanupComplete { removed: usize },

    /// Build finished and the final image is tagged
    BuildComplete {
        image: String,
        layers: usize,
        total_time: Duration,
    },

    LaunchStarted { image: String },

    ContainerExited {
        image: String,
        exit_code: i64,
    },
}

/// Trait for handling progress events
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {
        // Intentionally empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    impl ProgressHandler for CountingHandler {
        fn on_progress(&self, _event: &ProgressEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_noop_handler() {
        let handler = NoOpHandler;
        handler.on_progress(&ProgressEvent::LaunchStarted {
            image: "webagent:abc".to_string(),
        });
    }

    #[test]
    fn test_progress_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler {
            count: count.clone(),
        };

        handler.on_progress(&ProgressEvent::BuildStarted {
            build_id: "b1".to_string(),
            context: "/src".to_string(),
            steps: 7,
        });
        handler.on_progress(&ProgressEvent::StepStarted {
            step: StepKind::BaseRuntime,
            index: 0,
            total: 7,
        });
        handler.on_progress(&ProgressEvent::BuildComplete {
            image: "webagent:abc".to_string(),
            layers: 7,
            total_time: Duration::from_secs(5),
        });

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_event_debug() {
        let event = ProgressEvent::StepFailed {
            step: StepKind::Dependencies,
            error: "boom".to_string(),
        };
        let debug_str = format!("{:?}", event);
        assert!(debug_str.contains("StepFailed"));
        assert!(debug_str.contains("Dependencies"));
    }
}
