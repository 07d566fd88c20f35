use super::context::BuildContext;
use super::error::BuildError;
use super::layer::{ImageLayer, StepKind};
use super::phase_trait::BuildStep;
use super::phases::default_steps;
use super::report::BuildReport;
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::recipe::{ImageReference, ReferenceError};
use crate::validation::Validator;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Require a checksum-pinned installer
    pub strict: bool,
    /// Leave intermediate layer references in place after success
    pub keep_intermediate: bool,
    /// Additional tags: `tag` (applied to the recipe name) or `repository:tag`
    pub extra_tags: Vec<String>,
}

pub struct PipelineOrchestrator {
    progress_handler: Option<Arc<dyn ProgressHandler>>,
    steps: Vec<Box<dyn BuildStep>>,
}

impl PipelineOrchestrator {
    pub fn new(progress_handler: Option<Arc<dyn ProgressHandler>>) -> Self {
        Self {
            progress_handler,
            steps: default_steps(),
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(handler) = &self.progress_handler {
            handler.on_progress(&event);
        }
    }

    /// Runs every step in order and tags the result.
    ///
    /// Stops at the first failing step. On any error the intermediate layers
    /// are removed and no final reference is created.
    pub async fn execute(
        &self,
        context: &mut BuildContext,
        options: &BuildOptions,
    ) -> Result<BuildReport, BuildError> {
        let start = Instant::now();
        let started_at = Utc::now();

        let validator = if options.strict {
            Validator::strict()
        } else {
            Validator::new()
        };
        validator.validate(&context.recipe)?;

        let fingerprint = context
            .fingerprint()
            .map_err(|e| BuildError::Context(format!("{:#}", e)))?;

        // Every tag is resolved before the engine is touched
        let mut tags = vec![(context.recipe.name.clone(), fingerprint.clone())];
        for value in &options.extra_tags {
            let resolved = resolve_tag(&context.recipe.name, &fingerprint, value).map_err(
                |source| BuildError::InvalidTag {
                    tag: value.clone(),
                    source,
                },
            )?;
            if !tags.contains(&resolved) {
                tags.push(resolved);
            }
        }

        info!(
            "Starting build {} of '{}' from {}",
            context.build_id,
            context.recipe.name,
            context.context_dir.display()
        );
        self.emit(ProgressEvent::BuildStarted {
            build_id: context.build_id.clone(),
            context: context.context_dir.display().to_string(),
            steps: self.steps.len(),
        });

        let total = self.steps.len();
        for (index, step) in self.steps.iter().enumerate() {
            let kind = step.kind();
            self.emit(ProgressEvent::StepStarted {
                step: kind,
                index,
                total,
            });

            let step_start = Instant::now();
            let output = match step.execute(context).await {
                Ok(output) => output,
                Err(source) => {
                    self.emit(ProgressEvent::StepFailed {
                        step: kind,
                        error: source.to_string(),
                    });
                    self.cleanup(context).await;
                    return Err(BuildError::Step { step: kind, source });
                }
            };

            let duration = step_start.elapsed();
            let layer = ImageLayer {
                index,
                step: kind,
                reference: output.reference,
                image_id: output.image_id.clone(),
                changes_filesystem: output.changes_filesystem,
                duration_ms: duration.as_millis() as u64,
            };
            if let Err(e) = context.layers.push(layer) {
                self.cleanup(context).await;
                return Err(e.into());
            }

            self.emit(ProgressEvent::StepComplete {
                step: kind,
                image_id: output.image_id,
                duration,
            });
            debug!("Step {} complete", kind);
        }

        let top = match context.layers.top() {
            Some(top) if context.layers.is_complete() => top.clone(),
            _ => {
                self.cleanup(context).await;
                return Err(BuildError::Context(
                    "pipeline finished without a complete layer stack".to_string(),
                ));
            }
        };

        let mut references = Vec::with_capacity(tags.len());
        for (repository, tag) in &tags {
            if let Err(e) = context.backend.tag(&top.reference, repository, tag).await {
                self.untag(context, &references).await;
                self.cleanup(context).await;
                return Err(BuildError::Tag(e));
            }
            references.push(format!("{}:{}", repository, tag));
        }

        if !options.keep_intermediate {
            self.cleanup(context).await;
        }

        let image = references[0].clone();
        info!(image = %image, id = %top.image_id, "Build complete");
        self.emit(ProgressEvent::BuildComplete {
            image: image.clone(),
            layers: context.layers.len(),
            total_time: start.elapsed(),
        });

        Ok(BuildReport {
            build_id: context.build_id.clone(),
            recipe: context.recipe.name.clone(),
            fingerprint,
            image,
            image_id: top.image_id,
            tags: references,
            layers: context.layers.layers().to_vec(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Removes final references created before a later tag failed.
    async fn untag(&self, context: &BuildContext, references: &[String]) {
        for reference in references {
            if let Err(e) = context.backend.remove_image(reference).await {
                warn!(reference = %reference, "Failed to remove partial tag: {}", e);
            }
        }
    }

    /// Removes every intermediate reference; the base image is left alone.
    async fn cleanup(&self, context: &BuildContext) {
        let mut removed = 0;
        for layer in context
            .layers
            .layers()
            .iter()
            .filter(|l| l.step != StepKind::BaseRuntime)
        {
            match context.backend.remove_image(&layer.reference).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(reference = %layer.reference, "Failed to remove layer: {}", e),
            }
        }
        self.emit(ProgressEvent::CleanupComplete { removed });
    }
}

/// Resolves an extra tag into `(repository, tag)`.
///
/// A bare value is a tag on `default_repository`. Anything with a `/` or `:`
/// is a full reference; one without a tag gets the build fingerprint.
fn resolve_tag(
    default_repository: &str,
    fingerprint: &str,
    value: &str,
) -> Result<(String, String), ReferenceError> {
    let value = value.trim();
    let reference: ImageReference = if value.contains('/') || value.contains(':') {
        value.parse()?
    } else {
        format!("{}:{}", default_repository, value).parse()?
    };
    if let Some(digest) = reference.digest {
        return Err(ReferenceError::InvalidTag(digest));
    }
    let tag = reference.tag.unwrap_or_else(|| fingerprint.to_string());
    Ok((reference.repository, tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::LoggingHandler;

    #[test]
    fn test_orchestrator_creation() {
        let orchestrator = PipelineOrchestrator::new(None);
        assert!(orchestrator.progress_handler.is_none());
        assert_eq!(orchestrator.steps.len(), StepKind::ORDER.len());
    }

    #[test]
    fn test_steps_follow_build_order() {
        let orchestrator = PipelineOrchestrator::new(Some(Arc::new(LoggingHandler)));
        let kinds: Vec<StepKind> = orchestrator.steps.iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, StepKind::ORDER.to_vec());
    }

    fn resolved(repository: &str, tag: &str) -> (String, String) {
        (repository.to_string(), tag.to_string())
    }

    #[test]
    fn test_resolve_bare_tag() {
        assert_eq!(
            resolve_tag("webagent", "0123456789ab", "dev").unwrap(),
            resolved("webagent", "dev")
        );
    }

    #[test]
    fn test_resolve_full_reference() {
        assert_eq!(
            resolve_tag("webagent", "0123456789ab", "registry.local:5000/agent:1.2").unwrap(),
            resolved("registry.local:5000/agent", "1.2")
        );
        assert_eq!(
            resolve_tag("webagent", "0123456789ab", "agent:stable").unwrap(),
            resolved("agent", "stable")
        );
    }

    #[test]
    fn test_resolve_repository_gets_fingerprint() {
        assert_eq!(
            resolve_tag("webagent", "0123456789ab", "registry.local:5000/agent").unwrap(),
            resolved("registry.local:5000/agent", "0123456789ab")
        );
    }

    #[test]
    fn test_resolve_rejects_invalid_values() {
        assert!(matches!(
            resolve_tag("webagent", "0123456789ab", "not a tag"),
            Err(ReferenceError::InvalidTag(_))
        ));
        assert!(matches!(
            resolve_tag("webagent", "0123456789ab", "Registry/Agent:1"),
            Err(ReferenceError::InvalidRepository(_))
        ));
        let digest = format!("agent@sha256:{}", "a".repeat(64));
        assert!(matches!(
            resolve_tag("webagent", "0123456789ab", &digest),
            Err(ReferenceError::InvalidTag(_))
        ));
        assert!(resolve_tag("webagent", "0123456789ab", "").is_err());
    }
}
