// Build steps, one image layer each, in execution order.
//
// Steps 2-7 derive their layer from the previous step's image through
// `derive_layer`; only the base step talks to a registry.

#[path = "01_base_runtime.rs"]
pub mod base_runtime;
#[path = "02_workspace.rs"]
pub mod workspace;
#[path = "03_system_packages.rs"]
pub mod system_packages;
#[path = "04_dependency_manager.rs"]
pub mod dependency_manager;
#[path = "05_source.rs"]
pub mod source;
#[path = "06_dependencies.rs"]
pub mod dependencies;
#[path = "07_entrypoint.rs"]
pub mod entrypoint;

use super::context::BuildContext;
use super::error::StepError;
use super::layer::StepKind;
use super::phase_trait::{BuildStep, StepOutput};
use crate::backend::{ImageSettings, LayerSpec, Upload};
use tracing::debug;

pub use base_runtime::BaseRuntimeStep;
pub use dependencies::DependenciesStep;
pub use dependency_manager::DependencyManagerStep;
pub use entrypoint::EntrypointStep;
pub use source::SourceStep;
pub use system_packages::SystemPackagesStep;
pub use workspace::WorkspaceStep;

/// All steps in build order
pub fn default_steps() -> Vec<Box<dyn BuildStep>> {
    vec![
        Box::new(BaseRuntimeStep),
        Box::new(WorkspaceStep),
        Box::new(SystemPackagesStep),
        Box::new(DependencyManagerStep),
        Box::new(SourceStep),
        Box::new(DependenciesStep),
        Box::new(EntrypointStep),
    ]
}

pub(crate) fn shell(script: String) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), script]
}

/// Commits one layer on top of the current top of the stack.
pub(crate) async fn derive_layer(
    context: &BuildContext,
    step: StepKind,
    command: Option<Vec<String>>,
    upload: Option<Upload>,
    settings: ImageSettings,
) -> Result<StepOutput, StepError> {
    let parent = context.parent_image(step)?;
    let changes_filesystem = command.is_some() || upload.is_some();
    let spec = LayerSpec {
        target: context.layer_target(step),
        command,
        upload,
        settings,
    };

    debug!(step = %step, from = %parent, target = %spec.target, "Deriving layer");
    let image_id = context.backend.apply(&parent, &spec).await?;

    Ok(StepOutput {
        reference: spec.target,
        image_id,
        changes_filesystem,
    })
}
