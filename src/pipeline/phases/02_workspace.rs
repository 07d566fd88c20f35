use crate::pipeline::context::BuildContext;
use crate::pipeline::error::StepError;
use crate::pipeline::layer::StepKind;
use crate::pipeline::phase_trait::{BuildStep, StepOutput};
use async_trait::async_trait;
use tracing::info;

use super::derive_layer;

/// Creates the workspace directory and makes it the working directory.
pub struct WorkspaceStep;

#[async_trait]
impl BuildStep for WorkspaceStep {
    fn kind(&self) -> StepKind {
        StepKind::Workspace
    }

    async fn execute(&self, context: &mut BuildContext) -> Result<StepOutput, StepError> {
        let workspace = context.recipe.workspace.clone();
        let command = vec!["mkdir".to_string(), "-p".to_string(), workspace.clone()];

        let mut settings = context.image_settings(None);
        settings.working_dir = Some(workspace.clone());

        let output = derive_layer(context, self.kind(), Some(command), None, settings).await?;
        context.working_dir = Some(workspace);

        info!(workspace = ?context.working_dir, "Workspace initialized");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{Operation, RecordingBackend};
    use crate::pipeline::phases::test_support::{last_apply, new_context, run_steps};
    use crate::recipe::ImageRecipe;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_creates_workspace_and_sets_working_dir() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(RecordingBackend::new());
        let mut context = new_context(backend.clone(), ImageRecipe::webagent(), dir.path());
        run_steps(&mut context, 1).await;

        let output = WorkspaceStep.execute(&mut context).await.unwrap();
        assert!(output.changes_filesystem);
        assert_eq!(context.working_dir.as_deref(), Some("/app"));

        match last_apply(&backend) {
            Operation::Apply {
                from,
                command,
                settings,
                ..
            } => {
                assert_eq!(from, "python:3.11");
                assert_eq!(command, Some(vec!["mkdir".into(), "-p".into(), "/app".into()]));
                assert_eq!(settings.working_dir.as_deref(), Some("/app"));
            }
            other => panic!("unexpected operation: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_custom_workspace() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(RecordingBackend::new());
        let mut recipe = ImageRecipe::webagent();
        recipe.workspace = "/srv/agent".to_string();
        let mut context = new_context(backend.clone(), recipe, dir.path());
        run_steps(&mut context, 1).await;

        WorkspaceStep.execute(&mut context).await.unwrap();
        assert_eq!(context.working_dir.as_deref(), Some("/srv/agent"));
        let image = backend.image(&context.layer_target(StepKind::Workspace)).unwrap();
        assert_eq!(image.settings.working_dir.as_deref(), Some("/srv/agent"));
    }

    #[tokio::test]
    async fn test_requires_base_layer() {
        let dir = TempDir::new().unwrap();
        let mut context = new_context(
            Arc::new(RecordingBackend::new()),
            ImageRecipe::webagent(),
            dir.path(),
        );

        let result = WorkspaceStep.execute(&mut context).await;
        assert!(matches!(result, Err(StepError::MissingParent(StepKind::Workspace))));
        assert!(context.working_dir.is_none());
    }
}
