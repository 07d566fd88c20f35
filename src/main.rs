use webagent_image::cli::commands::{CliArgs, Commands};
use webagent_image::cli::handlers::{
    handle_build, handle_health, handle_plan, handle_run, handle_validate,
};
use webagent_image::util::{init_logging, parse_level, LoggingConfig};
use webagent_image::VERSION;

use clap::Parser;
use std::env;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("webagent-image v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Plan(plan_args) => handle_plan(plan_args).await,
        Commands::Validate(validate_args) => handle_validate(validate_args).await,
        Commands::Build(build_args) => handle_build(build_args).await,
        Commands::Run(run_args) => handle_run(run_args).await,
        Commands::Health(health_args) => handle_health(health_args).await,
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level_str) = &args.log_level {
        parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        let level_str =
            env::var("WEBAGENT_IMAGE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        parse_level(&level_str)
    };

    let use_json = env::var("WEBAGENT_IMAGE_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    init_logging(LoggingConfig {
        level,
        use_json,
        include_target: true,
        ..Default::default()
    });
}
