use crate::backend::Upload;
use crate::pipeline::context::BuildContext;
use crate::pipeline::error::StepError;
use crate::pipeline::layer::StepKind;
use crate::pipeline::phase_trait::{BuildStep, StepOutput};
use async_trait::async_trait;
use tracing::info;

use super::derive_layer;

/// Copies the entire build context into the workspace, unfiltered.
pub struct SourceStep;

#[async_trait]
impl BuildStep for SourceStep {
    fn kind(&self) -> StepKind {
        StepKind::Source
    }

    async fn execute(&self, context: &mut BuildContext) -> Result<StepOutput, StepError> {
        let archive = context
            .source
            .to_archive()
            .map_err(|e| StepError::Materialize(format!("{:#}", e)))?;
        let dest = context
            .working_dir
            .clone()
            .unwrap_or_else(|| context.recipe.workspace.clone());

        info!(
            files = context.source.file_count(),
            bytes = context.source.total_bytes(),
            dest = %dest,
            "Materializing source"
        );

        let upload = Upload { archive, dest };
        let settings = context.image_settings(None);
        let output = derive_layer(context, self.kind(), None, Some(upload), settings).await?;
        context.source_materialized = true;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{Operation, RecordingBackend};
    use crate::pipeline::phases::test_support::{create_project, last_apply, new_context, run_steps};
    use crate::recipe::ImageRecipe;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_copies_whole_tree_into_workspace() {
        let dir = TempDir::new().unwrap();
        create_project(dir.path());
        let backend = Arc::new(RecordingBackend::new());
        let mut context = new_context(backend.clone(), ImageRecipe::webagent(), dir.path());
        run_steps(&mut context, 4).await;
        assert!(!context.source_materialized);

        let output = SourceStep.execute(&mut context).await.unwrap();
        assert!(output.changes_filesystem);
        assert!(context.source_materialized);

        match last_apply(&backend) {
            Operation::Apply {
                command,
                upload_dest,
                ..
            } => {
                assert_eq!(command, None);
                assert_eq!(upload_dest.as_deref(), Some("/app"));
            }
            other => panic!("unexpected operation: {other:?}"),
        }

        let image = backend.image(&output.reference).unwrap();
        assert!(image.files.contains("/app/pyproject.toml"));
        assert!(image.files.contains("/app/.env"));
        assert!(image.files.contains("/app/src/oai_agent/oai_agent.py"));
    }
}
