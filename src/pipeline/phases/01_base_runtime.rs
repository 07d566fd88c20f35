use crate::environment::BuildEnvironment;
use crate::pipeline::context::BuildContext;
use crate::pipeline::error::StepError;
use crate::pipeline::layer::StepKind;
use crate::pipeline::phase_trait::{BuildStep, StepOutput};
use async_trait::async_trait;
use tracing::{info, warn};

/// Pulls the pinned base image; its environment seeds the build environment.
pub struct BaseRuntimeStep;

#[async_trait]
impl BuildStep for BaseRuntimeStep {
    fn kind(&self) -> StepKind {
        StepKind::BaseRuntime
    }

    async fn execute(&self, context: &mut BuildContext) -> Result<StepOutput, StepError> {
        let reference = context
            .recipe
            .base_reference()
            .map_err(|e| StepError::PullFailed {
                reference: context.recipe.base.clone(),
                message: e.to_string(),
            })?;

        if !reference.is_pinned() {
            warn!(image = %reference, "Base image is not pinned; builds may not be reproducible");
        }

        let pulled = context.backend.pull(&reference).await?;
        context.environment = BuildEnvironment::from_image_env(&pulled.env);

        info!(image = %reference, path = context.environment.path(), "Base runtime ready");
        Ok(StepOutput {
            reference: reference.to_string(),
            image_id: pulled.id,
            changes_filesystem: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{Operation, RecordingBackend};
    use crate::installer::StaticInstallerFetcher;
    use crate::recipe::ImageRecipe;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_pulls_base_and_seeds_environment() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(RecordingBackend::new());
        let mut context = BuildContext::new(
            backend.clone(),
            Arc::new(StaticInstallerFetcher::new(Vec::new())),
            ImageRecipe::webagent(),
            dir.path(),
        )
        .unwrap();

        let output = BaseRuntimeStep.execute(&mut context).await.unwrap();
        assert_eq!(output.reference, "python:3.11");
        assert!(context.environment.path().contains("/usr/local/bin"));
        assert_eq!(context.environment.get("LANG"), Some("C.UTF-8"));
        assert_eq!(
            backend.operations(),
            vec![Operation::Pull {
                reference: "python:3.11".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_unreachable_registry() {
        let dir = TempDir::new().unwrap();
        let mut context = BuildContext::new(
            Arc::new(RecordingBackend::new().failing_pull()),
            Arc::new(StaticInstallerFetcher::new(Vec::new())),
            ImageRecipe::webagent(),
            dir.path(),
        )
        .unwrap();

        let result = BaseRuntimeStep.execute(&mut context).await;
        assert!(matches!(result, Err(StepError::PullFailed { .. })));
        assert!(context.environment.is_empty());
    }
}
