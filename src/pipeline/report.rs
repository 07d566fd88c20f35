use super::layer::ImageLayer;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Result of a successful build
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub build_id: String,
    pub recipe: String,
    pub fingerprint: String,
    /// Primary reference, `<name>:<fingerprint>`
    pub image: String,
    pub image_id: String,
    /// Every reference the final image was tagged with, primary first
    pub tags: Vec<String>,
    pub layers: Vec<ImageLayer>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Built {} ({})", self.image, self.image_id)?;
        for tag in self.tags.iter().skip(1) {
            writeln!(f, "  also tagged {}", tag)?;
        }
        writeln!(f)?;
        for layer in &self.layers {
            writeln!(
                f,
                "  {}. {:<30} {:>7}ms{}",
                layer.index + 1,
                layer.step.title(),
                layer.duration_ms,
                if layer.changes_filesystem { "" } else { "  (config)" }
            )?;
        }
        writeln!(f)?;
        write!(
            f,
            "Build {} finished in {:.1}s",
            self.build_id,
            self.duration_ms as f64 / 1000.0
        )
    }
}
