//! Static view of what a build will do
//!
//! A plan is derived from the recipe alone; nothing is pulled or executed.
//! It can be shown to a person, serialized, or rendered as an equivalent
//! Dockerfile for use with other tooling.

use crate::pipeline::StepKind;
use crate::recipe::ImageRecipe;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    /// One-based position
    pub number: usize,
    pub step: StepKind,
    pub title: String,
    pub action: String,
    /// Commands run inside the build container, if any
    pub commands: Vec<String>,
    pub changes_filesystem: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
    pub recipe: String,
    pub base: String,
    pub workspace: String,
    pub steps: Vec<PlannedStep>,
}

impl BuildPlan {
    pub fn from_recipe(recipe: &ImageRecipe) -> Self {
        let steps = StepKind::ORDER
            .iter()
            .map(|&step| {
                let (action, commands, changes_filesystem) = describe(recipe, step);
                PlannedStep {
                    number: step.index() + 1,
                    step,
                    title: step.title().to_string(),
                    action,
                    commands,
                    changes_filesystem,
                }
            })
            .collect();

        Self {
            recipe: recipe.name.clone(),
            base: recipe.base.clone(),
            workspace: recipe.workspace.clone(),
            steps,
        }
    }
}

fn describe(recipe: &ImageRecipe, step: StepKind) -> (String, Vec<String>, bool) {
    match step {
        StepKind::BaseRuntime => (format!("pull {}", recipe.base), Vec::new(), true),
        StepKind::Workspace => (
            format!("create and enter {}", recipe.workspace),
            vec![format!("mkdir -p {}", recipe.workspace)],
            true,
        ),
        StepKind::SystemPackages => match recipe.system_packages.install_script() {
            Some(script) => (
                format!(
                    "install {} package(s) with {}",
                    recipe.system_packages.packages.len(),
                    recipe.system_packages.manager
                ),
                vec![script],
                true,
            ),
            None => ("no packages requested".to_string(), Vec::new(), false),
        },
        StepKind::DependencyManager => {
            let manager = &recipe.dependency_manager;
            let (action, script) = match &manager.installer_sha256 {
                Some(sha) => (
                    format!(
                        "install {} from verified installer (sha256 {}), PATH += {}",
                        manager.name, sha, manager.install_dir
                    ),
                    manager.install_from_file_script(),
                ),
                None => (
                    format!(
                        "install {} from {} (unverified), PATH += {}",
                        manager.name, manager.installer_url, manager.install_dir
                    ),
                    manager.fetch_and_install_script(),
                ),
            };
            (action, vec![script], true)
        }
        StepKind::Source => (
            format!("copy build context into {}", recipe.workspace),
            Vec::new(),
            true,
        ),
        StepKind::Dependencies => (
            format!("resolve {}", recipe.dependencies.manifest),
            vec![recipe.dependencies.command.join(" ")],
            true,
        ),
        StepKind::Entrypoint => (
            format!("declare command: {}", recipe.entrypoint.join(" ")),
            Vec::new(),
            false,
        ),
    }
}

impl fmt::Display for BuildPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Build plan for {} (base {})", self.recipe, self.base)?;
        writeln!(f)?;
        for step in &self.steps {
            writeln!(f, "{}. {}", step.number, step.title)?;
            writeln!(f, "   {}", step.action)?;
            for command in &step.commands {
                writeln!(f, "   $ {}", command)?;
            }
        }
        Ok(())
    }
}

fn exec_form(argv: &[String]) -> String {
    serde_json::to_string(argv).unwrap_or_else(|_| "[]".to_string())
}

/// Dockerfile producing the same image as the pipeline.
pub fn render_dockerfile(recipe: &ImageRecipe) -> String {
    let mut lines = vec![
        "# syntax=docker/dockerfile:1".to_string(),
        format!("FROM {}", recipe.base),
        String::new(),
        format!("WORKDIR {}", recipe.workspace),
        String::new(),
    ];

    if let Some(script) = recipe.system_packages.install_script() {
        lines.push(format!("RUN {}", script));
        lines.push(String::new());
    }

    let manager = &recipe.dependency_manager;
    match &manager.installer_sha256 {
        Some(sha) => {
            lines.push(format!(
                "ADD --checksum=sha256:{} {} {}",
                sha,
                manager.installer_url,
                manager.installer_path()
            ));
            lines.push(format!("RUN {}", manager.install_from_file_script()));
        }
        None => lines.push(format!("RUN {}", manager.fetch_and_install_script())),
    }
    lines.push(format!("ENV PATH=\"{}:${{PATH}}\"", manager.install_dir));
    lines.push(String::new());

    lines.push("COPY . .".to_string());
    lines.push(format!("RUN {}", exec_form(&recipe.dependencies.command)));
    lines.push(String::new());
    lines.push(format!("CMD {}", exec_form(&recipe.entrypoint)));

    let mut dockerfile = lines.join("\n");
    dockerfile.push('\n');
    dockerfile
}
