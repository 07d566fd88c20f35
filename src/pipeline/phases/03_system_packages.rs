use crate::pipeline::context::BuildContext;
use crate::pipeline::error::StepError;
use crate::pipeline::layer::StepKind;
use crate::pipeline::phase_trait::{BuildStep, StepOutput};
use async_trait::async_trait;
use tracing::info;

use super::{derive_layer, shell};

/// Refreshes the package index, installs, and purges the index cache in one layer.
pub struct SystemPackagesStep;

#[async_trait]
impl BuildStep for SystemPackagesStep {
    fn kind(&self) -> StepKind {
        StepKind::SystemPackages
    }

    async fn execute(&self, context: &mut BuildContext) -> Result<StepOutput, StepError> {
        let packages = &context.recipe.system_packages;
        let command = packages.install_script().map(shell);

        match &command {
            Some(_) => info!(
                manager = %packages.manager,
                packages = %packages.packages.join(" "),
                "Installing system packages"
            ),
            None => info!("No system packages requested"),
        }

        let settings = context.image_settings(None);
        derive_layer(context, self.kind(), command, None, settings).await
    }
}
