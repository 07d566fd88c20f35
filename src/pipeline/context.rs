//! Mutable state threaded through the build steps

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::backend::{ImageBackend, ImageSettings};
use crate::environment::BuildEnvironment;
use crate::installer::InstallerFetcher;
use crate::recipe::ImageRecipe;
use crate::source::SourceTree;

use super::error::StepError;
use super::layer::{LayerStack, StepKind};

/// Hex characters of the build fingerprint used as the final tag
pub const FINGERPRINT_LEN: usize = 12;

/// Repository prefix of intermediate layer references
pub const INTERMEDIATE_PREFIX: &str = "webagent-image-build";

pub struct BuildContext {
    pub backend: Arc<dyn ImageBackend>,
    pub fetcher: Arc<dyn InstallerFetcher>,
    pub recipe: ImageRecipe,
    pub context_dir: PathBuf,
    pub build_id: String,

    /// Scanned once up front; the same snapshot is fingerprinted and copied
    pub source: SourceTree,

    /// Set by the base step, replaced (never edited) by later steps
    pub environment: BuildEnvironment,

    /// Set by the workspace step
    pub working_dir: Option<String>,

    /// Set by the source step once the tree is inside the image
    pub source_materialized: bool,

    pub layers: LayerStack,
}

impl BuildContext {
    /// Scans the build context directory and prepares an empty layer stack.
    pub fn new(
        backend: Arc<dyn ImageBackend>,
        fetcher: Arc<dyn InstallerFetcher>,
        recipe: ImageRecipe,
        context_dir: &Path,
    ) -> Result<Self> {
        let source = SourceTree::scan(context_dir)?;
        Ok(Self {
            backend,
            fetcher,
            recipe,
            context_dir: context_dir.to_path_buf(),
            build_id: Uuid::new_v4().simple().to_string(),
            source,
            environment: BuildEnvironment::default(),
            working_dir: None,
            source_materialized: false,
            layers: LayerStack::new(),
        })
    }

    pub fn with_build_id(mut self, build_id: impl Into<String>) -> Self {
        self.build_id = build_id.into();
        self
    }

    /// Reference the given step's layer is committed under.
    pub fn layer_target(&self, step: StepKind) -> String {
        format!(
            "{}-{}:{:02}-{}",
            INTERMEDIATE_PREFIX,
            self.build_id,
            step.index() + 1,
            step.name()
        )
    }

    /// Reference of the most recent layer, the parent of the next one.
    pub fn parent_image(&self, step: StepKind) -> Result<String, StepError> {
        self.layers
            .top()
            .map(|layer| layer.reference.clone())
            .ok_or(StepError::MissingParent(step))
    }

    /// Image settings carrying the current environment and workspace.
    pub fn image_settings(&self, cmd: Option<Vec<String>>) -> ImageSettings {
        ImageSettings {
            working_dir: self.working_dir.clone(),
            env: self.environment.to_env_list(),
            cmd,
        }
    }

    pub fn fingerprint(&self) -> Result<String> {
        fingerprint(&self.recipe, &self.source)
    }
}

/// Content fingerprint of recipe plus source; equal inputs give equal tags.
pub fn fingerprint(recipe: &ImageRecipe, source: &SourceTree) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(recipe.canonical_json()?.as_bytes());
    hasher.update(b"\n");
    hasher.update(source.content_hash()?.as_bytes());
    let digest = hex::encode(hasher.finalize());
    Ok(digest[..FINGERPRINT_LEN].to_string())
}

/// Reference a build of `recipe` over `source` is tagged with.
pub fn final_reference(recipe: &ImageRecipe, source: &SourceTree) -> Result<String> {
    Ok(format!("{}:{}", recipe.name, fingerprint(recipe, source)?))
}
