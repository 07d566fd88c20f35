use crate::pipeline::context::BuildContext;
use crate::pipeline::error::StepError;
use crate::pipeline::layer::StepKind;
use crate::pipeline::phase_trait::{BuildStep, StepOutput};
use async_trait::async_trait;
use tracing::info;

use super::derive_layer;

/// Declares the entry command; a configuration-only layer.
pub struct EntrypointStep;

#[async_trait]
impl BuildStep for EntrypointStep {
    fn kind(&self) -> StepKind {
        StepKind::Entrypoint
    }

    async fn execute(&self, context: &mut BuildContext) -> Result<StepOutput, StepError> {
        let entrypoint = context.recipe.entrypoint.clone();
        info!(command = %entrypoint.join(" "), "Declaring entry command");

        let settings = context.image_settings(Some(entrypoint));
        derive_layer(context, self.kind(), None, None, settings).await
    }
}
