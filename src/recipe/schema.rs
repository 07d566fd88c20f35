//! ImageRecipe schema data structures
//!
//! The recipe is the declarative description of the webagent image: which
//! runtime it starts from, which system packages and dependency manager it
//! provisions, how the application's dependencies are installed and which
//! command the container runs. Every provisioning command the pipeline executes
//! or renders is formed here, so the build and the rendered Dockerfile can
//! never disagree.

use super::reference::{ImageReference, ReferenceError};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

fn deserialize_null_default_version<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_else(default_version))
}

fn default_version() -> String {
    "1.0".to_string()
}

pub const DEFAULT_NAME: &str = "webagent";
pub const DEFAULT_BASE_IMAGE: &str = "python:3.11";
pub const DEFAULT_WORKSPACE: &str = "/app";
pub const DEFAULT_INSTALLER_URL: &str = "https://install.python-poetry.org";

/// Root of the recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecipe {
    /// Schema version (e.g., "1.0")
    #[serde(default = "default_version", deserialize_with = "deserialize_null_default_version")]
    pub version: String,
    /// Repository name of the produced image
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub name: String,
    /// Base runtime image; must be pinned to a version or digest
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub base: String,
    /// Absolute working directory for every step from the workspace step onward
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub workspace: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub system_packages: SystemPackages,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub dependency_manager: DependencyManager,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub dependencies: Dependencies,
    /// Entry command, invoked once per container start
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub entrypoint: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    #[default]
    Apt,
    Apk,
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageManager::Apt => write!(f, "apt"),
            PackageManager::Apk => write!(f, "apk"),
        }
    }
}

/// OS-level packages installed in a single layer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemPackages {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub manager: PackageManager,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub packages: Vec<String>,
}

impl SystemPackages {
    /// Index refresh, install and cache purge as one shell script.
    ///
    /// Returns `None` when there is nothing to install.
    pub fn install_script(&self) -> Option<String> {
        if self.packages.is_empty() {
            return None;
        }
        let packages = self.packages.join(" ");
        let script = match self.manager {
            PackageManager::Apt => format!(
                "apt-get update && DEBIAN_FRONTEND=noninteractive apt-get install -y --no-install-recommends {} && rm -rf /var/lib/apt/lists/*",
                packages
            ),
            PackageManager::Apk => format!(
                "apk update && apk add --no-cache {} && rm -rf /var/cache/apk/*",
                packages
            ),
        };
        Some(script)
    }
}

/// The project-level dependency manager and where its installer comes from
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DependencyManager {
    /// Tool name, also the prefix of the installer's temporary path
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub installer_url: String,
    /// Expected SHA-256 of the installer; when set, the installer is fetched and
    /// verified on the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installer_sha256: Option<String>,
    /// Program (and arguments) that runs the installer script
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub interpreter: Vec<String>,
    /// Directory the installer places the tool in; prepended to PATH
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub install_dir: String,
}

impl DependencyManager {
    pub fn installer_path(&self) -> String {
        format!("/tmp/{}-installer", self.name)
    }

    pub fn is_checksum_pinned(&self) -> bool {
        self.installer_sha256.is_some()
    }

    fn run_installer(&self) -> String {
        let path = shell_quote(&self.installer_path());
        let interpreter: Vec<String> = self.interpreter.iter().map(|a| shell_quote(a)).collect();
        format!("{} {} && rm -f {}", interpreter.join(" "), path, path)
    }

    /// Fetches the installer inside the build container, runs it and removes it.
    pub fn fetch_and_install_script(&self) -> String {
        format!(
            "curl -fsSL {} -o {} && {}",
            shell_quote(&self.installer_url),
            shell_quote(&self.installer_path()),
            self.run_installer()
        )
    }

    /// Runs an installer that was already placed at [`installer_path`](Self::installer_path).
    pub fn install_from_file_script(&self) -> String {
        self.run_installer()
    }
}

/// How the application's declared dependencies are resolved
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dependencies {
    /// Manifest file that must exist at the workspace root (e.g., "pyproject.toml")
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub manifest: String,
    /// Install command, run without additional flags
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub command: Vec<String>,
}

impl ImageRecipe {
    /// Recipe for the webagent service
    pub fn webagent() -> Self {
        Self {
            version: default_version(),
            name: DEFAULT_NAME.to_string(),
            base: DEFAULT_BASE_IMAGE.to_string(),
            workspace: DEFAULT_WORKSPACE.to_string(),
            system_packages: SystemPackages {
                manager: PackageManager::Apt,
                packages: vec![
                    "postgresql-client".to_string(),
                    "libpq-dev".to_string(),
                    "curl".to_string(),
                ],
            },
            dependency_manager: DependencyManager {
                name: "poetry".to_string(),
                installer_url: DEFAULT_INSTALLER_URL.to_string(),
                installer_sha256: None,
                interpreter: vec!["python3".to_string()],
                install_dir: "/root/.local/bin".to_string(),
            },
            dependencies: Dependencies {
                manifest: "pyproject.toml".to_string(),
                command: vec!["poetry".to_string(), "install".to_string()],
            },
            entrypoint: vec![
                "poetry".to_string(),
                "run".to_string(),
                "python".to_string(),
                "-m".to_string(),
                "src.oai_agent.oai_agent".to_string(),
            ],
        }
    }

    pub fn base_reference(&self) -> Result<ImageReference, ReferenceError> {
        self.base.parse()
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize ImageRecipe to YAML")
    }

    /// Stable JSON encoding used for fingerprinting
    pub fn canonical_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize ImageRecipe to JSON")
    }
}

impl Default for ImageRecipe {
    fn default() -> Self {
        Self::webagent()
    }
}

/// Single-quotes a word for `sh -c` unless it only holds safe characters.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+@%,".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

impl fmt::Display for ImageRecipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Image Recipe: {}", self.name)?;
        writeln!(f, "================================")?;
        writeln!(f, "Base Image: {}", self.base)?;
        writeln!(f, "Workspace:  {}", self.workspace)?;
        if self.system_packages.packages.is_empty() {
            writeln!(f, "Packages:   (none)")?;
        } else {
            writeln!(
                f,
                "Packages:   {} ({})",
                self.system_packages.packages.join(", "),
                self.system_packages.manager
            )?;
        }
        writeln!(
            f,
            "Manager:    {} from {}{}",
            self.dependency_manager.name,
            self.dependency_manager.installer_url,
            if self.dependency_manager.is_checksum_pinned() {
                " (checksum pinned)"
            } else {
                ""
            }
        )?;
        writeln!(f, "Manifest:   {}", self.dependencies.manifest)?;
        writeln!(f, "Install:    {}", self.dependencies.command.join(" "))?;
        writeln!(f, "Command:    {}", self.entrypoint.join(" "))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webagent_defaults() {
        let recipe = ImageRecipe::default();
        assert_eq!(recipe.name, "webagent");
        assert_eq!(recipe.base, "python:3.11");
        assert_eq!(recipe.workspace, "/app");
        assert_eq!(recipe.dependencies.manifest, "pyproject.toml");
        assert_eq!(recipe.dependencies.command, vec!["poetry", "install"]);
        assert!(recipe.base_reference().unwrap().is_pinned());
    }

    #[test]
    fn test_apt_script_refreshes_and_purges_in_one_command() {
        let packages = SystemPackages {
            manager: PackageManager::Apt,
            packages: vec!["curl".to_string(), "libpq-dev".to_string()],
        };
        let script = packages.install_script().unwrap();
        let update = script.find("apt-get update").unwrap();
        let install = script.find("apt-get install").unwrap();
        let purge = script.find("rm -rf /var/lib/apt/lists/*").unwrap();
        assert!(update < install && install < purge);
        assert!(script.contains("--no-install-recommends curl libpq-dev"));
    }

    #[test]
    fn test_apk_script() {
        let packages = SystemPackages {
            manager: PackageManager::Apk,
            packages: vec!["curl".to_string()],
        };
        assert_eq!(
            packages.install_script().unwrap(),
            "apk update && apk add --no-cache curl && rm -rf /var/cache/apk/*"
        );
    }

    #[test]
    fn test_empty_package_list_has_no_script() {
        assert!(SystemPackages::default().install_script().is_none());
    }

    #[test]
    fn test_fetch_and_install_script() {
        let manager = ImageRecipe::webagent().dependency_manager;
        assert_eq!(
            manager.fetch_and_install_script(),
            "curl -fsSL https://install.python-poetry.org -o /tmp/poetry-installer \
             && python3 /tmp/poetry-installer && rm -f /tmp/poetry-installer"
        );
    }

    #[test]
    fn test_install_from_file_script() {
        let manager = ImageRecipe::webagent().dependency_manager;
        assert_eq!(
            manager.install_from_file_script(),
            "python3 /tmp/poetry-installer && rm -f /tmp/poetry-installer"
        );
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("python3"), "python3");
        assert_eq!(shell_quote("https://example.com/a?b=c"), "'https://example.com/a?b=c'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_deserialize_partial_yaml() {
        let yaml = r#"
name: agent
base: python:3.12-slim
workspace: /srv
system_packages:
  packages: [curl]
entrypoint: ["python", "main.py"]
"#;
        let recipe: ImageRecipe = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(recipe.version, "1.0");
        assert_eq!(recipe.system_packages.manager, PackageManager::Apt);
        assert_eq!(recipe.system_packages.packages, vec!["curl"]);
        assert!(recipe.dependency_manager.name.is_empty());
        assert!(recipe.dependency_manager.installer_sha256.is_none());
    }

    #[test]
    fn test_deserialize_with_null_values() {
        let json = r#"{
            "version": null,
            "name": null,
            "system_packages": null,
            "entrypoint": null
        }"#;
        let recipe: ImageRecipe = serde_json::from_str(json).unwrap();
        assert_eq!(recipe.version, "1.0");
        assert!(recipe.name.is_empty());
        assert!(recipe.system_packages.packages.is_empty());
        assert!(recipe.entrypoint.is_empty());
    }

    #[test]
    fn test_yaml_round_trip_preserves_recipe() {
        let recipe = ImageRecipe::webagent();
        let yaml = recipe.to_yaml().unwrap();
        let parsed: ImageRecipe = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, recipe);
    }

    #[test]
    fn test_canonical_json_is_stable() {
        let a = ImageRecipe::webagent().canonical_json().unwrap();
        let b = ImageRecipe::webagent().canonical_json().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_display() {
        let display = format!("{}", ImageRecipe::webagent());
        assert!(display.contains("Image Recipe: webagent"));
        assert!(display.contains("Base Image: python:3.11"));
        assert!(display.contains("postgresql-client, libpq-dev, curl (apt)"));
        assert!(display.contains("Command:    poetry run python -m src.oai_agent.oai_agent"));
    }
}
