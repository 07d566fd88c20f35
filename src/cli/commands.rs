use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Builds and launches the webagent service image, one layer per step
#[derive(Parser, Debug)]
#[command(
    name = "webagent-image",
    about = "Builds and launches the webagent service image",
    version,
    long_about = "webagent-image turns a project directory and a declarative recipe into a \
                  container image through seven ordered steps (base runtime, workspace, system \
                  packages, dependency manager, source, dependencies, entry command), then \
                  launches it. Any failing step aborts the build and no image is produced."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Show the build steps for a recipe",
        long_about = "Prints the ordered build steps without contacting the container engine, \
                      or renders an equivalent Dockerfile.\n\n\
                      Examples:\n  \
                      webagent-image plan\n  \
                      webagent-image plan --format dockerfile -o Dockerfile"
    )]
    Plan(PlanArgs),

    #[command(
        about = "Validate a recipe",
        long_about = "Runs every validation rule and reports all failures.\n\n\
                      Examples:\n  \
                      webagent-image validate\n  \
                      webagent-image validate --recipe recipe.yaml --strict"
    )]
    Validate(ValidateArgs),

    #[command(
        about = "Build the image",
        long_about = "Runs the seven build steps against the container engine and tags the \
                      result as <name>:<fingerprint>.\n\n\
                      Examples:\n  \
                      webagent-image build\n  \
                      webagent-image build ./webagent --tag dev --format json"
    )]
    Build(BuildArgs),

    #[command(
        about = "Launch the built image",
        long_about = "Starts one container running the image's entry command, unmodified, and \
                      exits with the container's exit code.\n\n\
                      Examples:\n  \
                      webagent-image run\n  \
                      webagent-image run --image webagent:dev"
    )]
    Run(RunArgs),

    #[command(about = "Check that the container engine is reachable")]
    Health(HealthArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct RecipeArgs {
    #[arg(
        value_name = "CONTEXT",
        help = "Project directory (defaults to current directory)"
    )]
    pub context: Option<PathBuf>,

    #[arg(
        short = 'r',
        long,
        value_name = "FILE",
        help = "Recipe file (.yaml, .yml, .json or .toml)"
    )]
    pub recipe: Option<PathBuf>,
}

impl RecipeArgs {
    pub fn context_dir(&self) -> PathBuf {
        self.context.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub recipe: RecipeArgs,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub recipe: RecipeArgs,

    #[arg(long, help = "Require a checksum-pinned installer")]
    pub strict: bool,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: ReportFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    #[command(flatten)]
    pub recipe: RecipeArgs,

    #[arg(
        short = 't',
        long = "tag",
        value_name = "TAG",
        help = "Additional tag, either TAG or REPOSITORY:TAG (repeatable)"
    )]
    pub tags: Vec<String>,

    #[arg(long, help = "Keep intermediate layer tags after a successful build")]
    pub keep_intermediate: bool,

    #[arg(long, help = "Require a checksum-pinned installer")]
    pub strict: bool,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: ReportFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub recipe: RecipeArgs,

    #[arg(
        short = 'i',
        long,
        value_name = "REF",
        help = "Image to run (defaults to <name>:<fingerprint> of the context)"
    )]
    pub image: Option<String>,

    #[arg(long, value_name = "NAME", help = "Container name")]
    pub name: Option<String>,

    #[arg(long, help = "Keep the container after it exits")]
    pub keep: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct HealthArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: ReportFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
    Dockerfile,
}

/// Formats for commands that have no Dockerfile rendering
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
            OutputFormatArg::Dockerfile => super::output::OutputFormat::Dockerfile,
        }
    }
}

impl From<ReportFormatArg> for super::output::OutputFormat {
    fn from(arg: ReportFormatArg) -> Self {
        match arg {
            ReportFormatArg::Json => super::output::OutputFormat::Json,
            ReportFormatArg::Yaml => super::output::OutputFormat::Yaml,
            ReportFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}
