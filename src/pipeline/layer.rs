//! Ordered image layers
//!
//! Each build step contributes exactly one layer on top of the previous one.
//! [`LayerStack`] refuses anything that would break that ordering, so a stack
//! is always a prefix of [`StepKind::ORDER`].

use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    BaseRuntime,
    Workspace,
    SystemPackages,
    DependencyManager,
    Source,
    Dependencies,
    Entrypoint,
}

impl StepKind {
    pub const ORDER: [StepKind; 7] = [
        StepKind::BaseRuntime,
        StepKind::Workspace,
        StepKind::SystemPackages,
        StepKind::DependencyManager,
        StepKind::Source,
        StepKind::Dependencies,
        StepKind::Entrypoint,
    ];

    /// Zero-based position in the build order
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<StepKind> {
        Self::ORDER.get(self.index() + 1).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            StepKind::BaseRuntime => "base-runtime",
            StepKind::Workspace => "workspace",
            StepKind::SystemPackages => "system-packages",
            StepKind::DependencyManager => "dependency-manager",
            StepKind::Source => "source",
            StepKind::Dependencies => "dependencies",
            StepKind::Entrypoint => "entrypoint",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            StepKind::BaseRuntime => "Base Runtime Provisioner",
            StepKind::Workspace => "Workspace Initializer",
            StepKind::SystemPackages => "System Package Installer",
            StepKind::DependencyManager => "Dependency Manager Installer",
            StepKind::Source => "Source Materializer",
            StepKind::Dependencies => "Dependency Resolver/Installer",
            StepKind::Entrypoint => "Entrypoint Launcher",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageLayer {
    pub index: usize,
    pub step: StepKind,
    /// Reference the layer is addressable by during the build
    pub reference: String,
    pub image_id: String,
    /// False for layers that only change image configuration
    pub changes_filesystem: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayerError {
    #[error("Layer for step '{got}' is out of order (expected {expected})")]
    OutOfOrder { expected: String, got: StepKind },

    #[error("Layer index {got} does not match stack position {expected}")]
    IndexMismatch { expected: usize, got: usize },
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct LayerStack {
    layers: Vec<ImageLayer>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step whose layer must be pushed next, `None` once complete.
    pub fn expected_step(&self) -> Option<StepKind> {
        StepKind::ORDER.get(self.layers.len()).copied()
    }

    pub fn push(&mut self, layer: ImageLayer) -> Result<(), LayerError> {
        let expected = self.expected_step();
        if expected != Some(layer.step) {
            return Err(LayerError::OutOfOrder {
                expected: expected
                    .map(|s| s.name().to_string())
                    .unwrap_or_else(|| "no further layers".to_string()),
                got: layer.step,
            });
        }
        if layer.index != self.layers.len() {
            return Err(LayerError::IndexMismatch {
                expected: self.layers.len(),
                got: layer.index,
            });
        }
        self.layers.push(layer);
        Ok(())
    }

    pub fn top(&self) -> Option<&ImageLayer> {
        self.layers.last()
    }

    pub fn layers(&self) -> &[ImageLayer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.layers.len() == StepKind::ORDER.len()
    }

    pub fn into_layers(self) -> Vec<ImageLayer> {
        self.layers
    }
}
