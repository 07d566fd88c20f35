use super::context::BuildContext;
use super::error::StepError;
use super::layer::StepKind;
use async_trait::async_trait;

/// What a step produced; the orchestrator turns it into an
/// [`ImageLayer`](super::layer::ImageLayer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    pub reference: String,
    pub image_id: String,
    pub changes_filesystem: bool,
}

#[async_trait]
pub trait BuildStep: Send + Sync {
    fn kind(&self) -> StepKind;

    async fn execute(&self, context: &mut BuildContext) -> Result<StepOutput, StepError>;
}
