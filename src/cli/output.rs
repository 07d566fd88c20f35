//! Output formatting for plans, validation results, build reports and health checks
//!
//! JSON and YAML serialize the underlying structures as-is; human output is
//! meant for terminals. Dockerfile output exists only for plans.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::pipeline::BuildReport;
use crate::plan::{render_dockerfile, BuildPlan};
use crate::recipe::ImageRecipe;
use crate::validation::ValidationError;

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Human,
    /// Equivalent Dockerfile (plans only)
    Dockerfile,
}

/// Outcome of running every validation rule over one recipe
#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub recipe: String,
    pub source: String,
    pub strict: bool,
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

/// Container engine reachability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub available: bool,
    pub message: String,
    pub details: Option<String>,
}

impl HealthStatus {
    pub fn available(message: String) -> Self {
        Self {
            available: true,
            message,
            details: None,
        }
    }

    pub fn unavailable(message: String) -> Self {
        Self {
            available: false,
            message,
            details: None,
        }
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn serialize<T: Serialize>(&self, value: &T, what: &str) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(value)
                .with_context(|| format!("Failed to serialize {} to JSON", what)),
            OutputFormat::Yaml => serde_yaml::to_string(value)
                .with_context(|| format!("Failed to serialize {} to YAML", what)),
            OutputFormat::Human | OutputFormat::Dockerfile => {
                bail!("{} has no structured form for this format", what)
            }
        }
    }

    pub fn format_plan(&self, recipe: &ImageRecipe) -> Result<String> {
        let plan = BuildPlan::from_recipe(recipe);
        match self.format {
            OutputFormat::Human => Ok(plan.to_string()),
            OutputFormat::Dockerfile => Ok(render_dockerfile(recipe)),
            _ => self.serialize(&plan, "build plan"),
        }
    }

    pub fn format_validation(&self, summary: &ValidationSummary) -> Result<String> {
        match self.format {
            OutputFormat::Human => Ok(format_validation_human(summary)),
            OutputFormat::Dockerfile => bail!("Dockerfile output is only available for plans"),
            _ => self.serialize(summary, "validation result"),
        }
    }

    pub fn format_report(&self, report: &BuildReport) -> Result<String> {
        match self.format {
            OutputFormat::Human => Ok(format!("{}\n", report)),
            OutputFormat::Dockerfile => bail!("Dockerfile output is only available for plans"),
            _ => self.serialize(report, "build report"),
        }
    }

    pub fn format_health(&self, status: &HealthStatus) -> Result<String> {
        match self.format {
            OutputFormat::Human => Ok(format_health_human(status)),
            OutputFormat::Dockerfile => bail!("Dockerfile output is only available for plans"),
            _ => self.serialize(status, "health status"),
        }
    }
}

fn format_validation_human(summary: &ValidationSummary) -> String {
    let mut output = String::new();
    output.push_str(&format!("Recipe '{}' ({})\n", summary.recipe, summary.source));
    output.push_str(RULE);
    output.push_str("\n\n");

    if summary.valid {
        output.push_str("\u{2713} All rules passed");
        if summary.strict {
            output.push_str(" (strict)");
        }
        output.push('\n');
    } else {
        for error in &summary.errors {
            output.push_str(&format!("\u{2717} {}\n", error));
        }
        output.push_str(&format!("\n{} problem(s) found\n", summary.errors.len()));
    }
    output
}

fn format_health_human(status: &HealthStatus) -> String {
    let mut output = String::new();
    output.push_str("Container Engine Health\n");
    output.push_str(RULE);
    output.push_str("\n\n");

    let symbol = if status.available { "\u{2713}" } else { "\u{2717}" };
    output.push_str(&format!(
        "{} {}\n",
        symbol,
        if status.available {
            "Available"
        } else {
            "Unavailable"
        }
    ));
    output.push_str(&format!("  Message: {}\n", status.message));
    if let Some(ref details) = status.details {
        output.push_str(&format!("  Details: {}\n", details));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(errors: Vec<ValidationError>) -> ValidationSummary {
        ValidationSummary {
            recipe: "webagent".to_string(),
            source: "built-in".to_string(),
            strict: false,
            valid: errors.is_empty(),
            errors,
        }
    }

    #[test]
    fn test_plan_json() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format_plan(&ImageRecipe::webagent()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["recipe"], "webagent");
        assert_eq!(value["steps"].as_array().unwrap().len(), 7);
        assert_eq!(value["steps"][0]["step"], "base-runtime");
    }

    #[test]
    fn test_plan_yaml() {
        let formatter = OutputFormatter::new(OutputFormat::Yaml);
        let output = formatter.format_plan(&ImageRecipe::webagent()).unwrap();
        assert!(output.contains("recipe: webagent"));
        assert!(output.contains("step: dependency-manager"));
    }

    #[test]
    fn test_plan_dockerfile() {
        let formatter = OutputFormatter::new(OutputFormat::Dockerfile);
        let output = formatter.format_plan(&ImageRecipe::webagent()).unwrap();
        assert!(output.contains("FROM python:3.11"));
    }

    #[test]
    fn test_validation_human() {
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let ok = formatter.format_validation(&summary(Vec::new())).unwrap();
        assert!(ok.contains("All rules passed"));

        let failed = formatter
            .format_validation(&summary(vec![ValidationError {
                rule: "PinnedBaseImage",
                message: "floating tag 'latest'".to_string(),
            }]))
            .unwrap();
        assert!(failed.contains("[PinnedBaseImage] floating tag 'latest'"));
        assert!(failed.contains("1 problem(s) found"));
    }

    #[test]
    fn test_validation_json() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format_validation(&summary(Vec::new())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["valid"], true);
    }

    #[test]
    fn test_dockerfile_only_for_plans() {
        let formatter = OutputFormatter::new(OutputFormat::Dockerfile);
        assert!(formatter
            .format_health(&HealthStatus::available("ok".to_string()))
            .is_err());
    }

    #[test]
    fn test_health_status() {
        let status = HealthStatus::unavailable("Cannot connect".to_string())
            .with_details("Docker socket not found".to_string());
        assert!(!status.available);

        let output = OutputFormatter::new(OutputFormat::Human)
            .format_health(&status)
            .unwrap();
        assert!(output.contains("\u{2717} Unavailable"));
        assert!(output.contains("Details: Docker socket not found"));
    }
}
