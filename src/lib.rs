//! webagent-image - build and launch pipeline for the webagent service image
//!
//! The image is produced by seven ordered steps, each committing exactly one
//! layer on top of the previous one:
//!
//! 1. Base runtime: pull the pinned base image
//! 2. Workspace: create the working directory and make it current
//! 3. System packages: install OS packages in one transaction
//! 4. Dependency manager: install the project's dependency manager
//! 5. Source: copy the build context into the workspace
//! 6. Dependencies: resolve and install project dependencies
//! 7. Entrypoint: declare the service's start command
//!
//! A failing step aborts the build; no final image is tagged and intermediate
//! layers are removed. Launching runs the declared entry command unmodified.
//!
//! # Example Usage
//!
//! ```ignore
//! use std::path::Path;
//! use std::sync::Arc;
//! use webagent_image::backend::DockerBackend;
//! use webagent_image::installer::HttpInstallerFetcher;
//! use webagent_image::pipeline::{BuildContext, BuildOptions, PipelineOrchestrator};
//! use webagent_image::recipe::ImageRecipe;
//!
//! async fn build() -> anyhow::Result<()> {
//!     let backend = Arc::new(DockerBackend::connect()?);
//!     let fetcher = Arc::new(HttpInstallerFetcher::new(std::time::Duration::from_secs(60))?);
//!     let mut context =
//!         BuildContext::new(backend, fetcher, ImageRecipe::webagent(), Path::new("."))?;
//!
//!     let report = PipelineOrchestrator::new(None)
//!         .execute(&mut context, &BuildOptions::default())
//!         .await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cli;
pub mod config;
pub mod environment;
pub mod installer;
pub mod launch;
pub mod pipeline;
pub mod plan;
pub mod progress;
pub mod recipe;
pub mod source;
pub mod util;
pub mod validation;

pub use backend::{BackendError, DockerBackend, ImageBackend};
pub use config::{ConfigError, ImageConfig};
pub use launch::{LaunchError, LaunchOutcome, Launcher};
pub use pipeline::{BuildContext, BuildError, BuildOptions, BuildReport, PipelineOrchestrator};
pub use recipe::{ImageRecipe, ImageReference};
pub use util::{init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
