//! Command handlers; each returns the process exit code.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, error, info};

use super::commands::{BuildArgs, HealthArgs, PlanArgs, RecipeArgs, RunArgs, ValidateArgs};
use super::output::{HealthStatus, OutputFormat, OutputFormatter, ValidationSummary};
use crate::backend::{DockerBackend, ImageBackend, LaunchSpec};
use crate::config::ImageConfig;
use crate::installer::HttpInstallerFetcher;
use crate::launch::{LaunchError, Launcher};
use crate::pipeline::context::final_reference;
use crate::pipeline::{BuildContext, BuildError, BuildOptions, PipelineOrchestrator};
use crate::progress::{LoggingHandler, ProgressHandler};
use crate::recipe::{resolve_recipe, ImageRecipe, RecipeSource};
use crate::source::SourceTree;
use crate::validation::Validator;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INVALID: i32 = 2;

fn load_config() -> Result<ImageConfig, i32> {
    let config = ImageConfig::from_env().map_err(|e| {
        eprintln!("Error: {}", e);
        EXIT_INVALID
    })?;
    config.validate().map_err(|e| {
        eprintln!("Error: {}", e);
        EXIT_INVALID
    })?;
    debug!("{}", config);
    Ok(config)
}

fn load_recipe(
    args: &RecipeArgs,
    config: &ImageConfig,
) -> Result<(ImageRecipe, RecipeSource), i32> {
    let explicit = args.recipe.as_deref().or(config.recipe_path.as_deref());
    resolve_recipe(explicit, &args.context_dir()).map_err(|e| {
        eprintln!("Error: {:#}", e);
        EXIT_INVALID
    })
}

fn write_output(output: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, output)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Wrote output");
        }
        None => print!("{}", output),
    }
    Ok(())
}

fn connect_backend() -> Result<Arc<dyn ImageBackend>, i32> {
    match DockerBackend::connect() {
        Ok(backend) => Ok(Arc::new(backend)),
        Err(e) => {
            eprintln!("Error: {}", e);
            Err(EXIT_FAILURE)
        }
    }
}

pub async fn handle_plan(args: &PlanArgs) -> i32 {
    let config = match load_config() {
        Ok(config) => config,
        Err(code) => return code,
    };
    let (recipe, source) = match load_recipe(&args.recipe, &config) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    debug!(source = %source, "Planning");

    let formatter = OutputFormatter::new(args.format.into());
    let result = formatter
        .format_plan(&recipe)
        .and_then(|output| write_output(&output, args.output.as_deref()));

    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_FAILURE
        }
    }
}

pub async fn handle_validate(args: &ValidateArgs) -> i32 {
    let config = match load_config() {
        Ok(config) => config,
        Err(code) => return code,
    };
    let (recipe, source) = match load_recipe(&args.recipe, &config) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    let strict = args.strict || config.strict_installer;
    let validator = if strict {
        Validator::strict()
    } else {
        Validator::new()
    };
    let errors = validator.validate_all(&recipe);
    let summary = ValidationSummary {
        recipe: recipe.name.clone(),
        source: source.to_string(),
        strict,
        valid: errors.is_empty(),
        errors,
    };

    let formatter = OutputFormatter::new(args.format.into());
    match formatter.format_validation(&summary) {
        Ok(output) => print!("{}", output),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return EXIT_FAILURE;
        }
    }

    if summary.valid {
        EXIT_SUCCESS
    } else {
        EXIT_INVALID
    }
}

pub async fn handle_build(args: &BuildArgs) -> i32 {
    let config = match load_config() {
        Ok(config) => config,
        Err(code) => return code,
    };
    let (recipe, source) = match load_recipe(&args.recipe, &config) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    info!(recipe = %recipe.name, source = %source, "Loaded recipe");

    let backend = match connect_backend() {
        Ok(backend) => backend,
        Err(code) => return code,
    };
    let fetcher = match HttpInstallerFetcher::new(config.fetch_timeout()) {
        Ok(fetcher) => Arc::new(fetcher),
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_FAILURE;
        }
    };

    let context_dir = args.recipe.context_dir();
    let mut context = match BuildContext::new(backend, fetcher, recipe, &context_dir) {
        Ok(context) => context,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return EXIT_FAILURE;
        }
    };

    let options = BuildOptions {
        strict: args.strict || config.strict_installer,
        keep_intermediate: args.keep_intermediate || config.keep_intermediate,
        extra_tags: args.tags.clone(),
    };
    let progress: Arc<dyn ProgressHandler> = Arc::new(LoggingHandler);
    let orchestrator = PipelineOrchestrator::new(Some(progress));

    match orchestrator.execute(&mut context, &options).await {
        Ok(report) => {
            let formatter = OutputFormatter::new(args.format.into());
            match formatter.format_report(&report) {
                Ok(output) => {
                    print!("{}", output);
                    EXIT_SUCCESS
                }
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    EXIT_FAILURE
                }
            }
        }
        Err(e) => {
            error!("Build failed: {}", e);
            eprintln!("Error: {}", e);
            match e {
                BuildError::Invalid(_) | BuildError::InvalidTag { .. } => EXIT_INVALID,
                _ => EXIT_FAILURE,
            }
        }
    }
}

fn default_image(args: &RunArgs, config: &ImageConfig) -> Result<String, i32> {
    let (recipe, _) = load_recipe(&args.recipe, config)?;
    SourceTree::scan(&args.recipe.context_dir())
        .and_then(|tree| final_reference(&recipe, &tree))
        .map_err(|e| {
            eprintln!("Error: {:#}", e);
            EXIT_FAILURE
        })
}

pub async fn handle_run(args: &RunArgs) -> i32 {
    let config = match load_config() {
        Ok(config) => config,
        Err(code) => return code,
    };
    let image = match &args.image {
        Some(image) => image.clone(),
        None => match default_image(args, &config) {
            Ok(image) => image,
            Err(code) => return code,
        },
    };

    let backend = match connect_backend() {
        Ok(backend) => backend,
        Err(code) => return code,
    };
    let progress: Arc<dyn ProgressHandler> = Arc::new(LoggingHandler);
    let launcher = Launcher::new(backend, Some(progress));
    let spec = LaunchSpec {
        name: args.name.clone(),
        remove: !args.keep,
        stop_timeout: config.stop_timeout(),
    };

    match launcher.launch(&image, &spec).await {
        Ok(outcome) => outcome.process_exit_code(),
        Err(e @ LaunchError::ImageNotFound(_)) => {
            eprintln!("Error: {}", e);
            EXIT_FAILURE
        }
        Err(e) => {
            error!("Launch failed: {}", e);
            eprintln!("Error: {}", e);
            EXIT_FAILURE
        }
    }
}

pub async fn handle_health(args: &HealthArgs) -> i32 {
    let status = match DockerBackend::connect() {
        Ok(backend) => match backend.info().await {
            Ok(info) => HealthStatus::available(format!("Docker {}", info.version))
                .with_details(format!("API version {}", info.api_version)),
            Err(e) => HealthStatus::unavailable("Docker daemon did not respond".to_string())
                .with_details(e.to_string()),
        },
        Err(e) => HealthStatus::unavailable("Cannot connect to Docker".to_string())
            .with_details(e.to_string()),
    };

    let format: OutputFormat = args.format.into();
    match OutputFormatter::new(format).format_health(&status) {
        Ok(output) => print!("{}", output),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return EXIT_FAILURE;
        }
    }

    if status.available {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    }
}
