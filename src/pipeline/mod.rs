pub mod context;
pub mod error;
pub mod layer;
pub mod orchestrator;
pub mod phase_trait;
pub mod phases;
pub mod report;

pub use context::BuildContext;
pub use error::{BuildError, StepError};
pub use layer::{ImageLayer, LayerError, LayerStack, StepKind};
pub use orchestrator::{BuildOptions, PipelineOrchestrator};
pub use phase_trait::{BuildStep, StepOutput};
pub use report::BuildReport;
