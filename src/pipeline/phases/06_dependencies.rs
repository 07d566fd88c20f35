use crate::pipeline::context::BuildContext;
use crate::pipeline::error::StepError;
use crate::pipeline::layer::StepKind;
use crate::pipeline::phase_trait::{BuildStep, StepOutput};
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use super::derive_layer;

/// Runs the install command against the manifest copied by the source step.
pub struct DependenciesStep;

#[async_trait]
impl BuildStep for DependenciesStep {
    fn kind(&self) -> StepKind {
        StepKind::Dependencies
    }

    async fn execute(&self, context: &mut BuildContext) -> Result<StepOutput, StepError> {
        let manifest = context.recipe.dependencies.manifest.clone();
        if !context.source_materialized {
            return Err(StepError::Materialize(
                "source has not been copied into the image".to_string(),
            ));
        }
        if !context.source.contains_file(Path::new(&manifest)) {
            return Err(StepError::ManifestMissing { manifest });
        }

        let command = context.recipe.dependencies.command.clone();
        info!(manifest = %manifest, command = %command.join(" "), "Installing dependencies");

        let settings = context.image_settings(None);
        derive_layer(context, self.kind(), Some(command), None, settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{Operation, RecordingBackend};
    use crate::pipeline::phases::test_support::{
        apply_count, create_project, last_apply, new_context, run_steps,
    };
    use crate::recipe::ImageRecipe;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_requires_materialized_source() {
        let dir = TempDir::new().unwrap();
        create_project(dir.path());
        let backend = Arc::new(RecordingBackend::new());
        let mut context = new_context(backend.clone(), ImageRecipe::webagent(), dir.path());
        run_steps(&mut context, 4).await;
        let applied = apply_count(&backend);

        let result = DependenciesStep.execute(&mut context).await;
        assert!(matches!(result, Err(StepError::Materialize(_))));
        assert_eq!(apply_count(&backend), applied);
    }

    #[tokio::test]
    async fn test_missing_manifest() {
        let dir = TempDir::new().unwrap();
        create_project(dir.path());
        let backend = Arc::new(RecordingBackend::new());
        let mut recipe = ImageRecipe::webagent();
        recipe.dependencies.manifest = "poetry.lock".to_string();
        let mut context = new_context(backend.clone(), recipe, dir.path());
        run_steps(&mut context, 5).await;
        let applied = apply_count(&backend);

        match DependenciesStep.execute(&mut context).await {
            Err(StepError::ManifestMissing { manifest }) => assert_eq!(manifest, "poetry.lock"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(apply_count(&backend), applied);
    }

    #[tokio::test]
    async fn test_runs_install_command_on_source_layer() {
        let dir = TempDir::new().unwrap();
        create_project(dir.path());
        let backend = Arc::new(RecordingBackend::new());
        let mut context = new_context(backend.clone(), ImageRecipe::webagent(), dir.path());
        run_steps(&mut context, 5).await;

        let output = DependenciesStep.execute(&mut context).await.unwrap();
        assert!(output.changes_filesystem);
        match last_apply(&backend) {
            Operation::Apply { from, command, .. } => {
                assert_eq!(from, context.layer_target(StepKind::Source));
                assert_eq!(command, Some(vec!["poetry".into(), "install".into()]));
            }
            other => panic!("unexpected operation: {other:?}"),
        }
    }
}
