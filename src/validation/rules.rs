use crate::recipe::{ImageRecipe, ImageReference, FLOATING_TAG};
use anyhow::Result;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Component, Path};
use std::sync::OnceLock;

pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, recipe: &ImageRecipe) -> Result<()>;
}

pub struct RequiredFieldsRule;

impl ValidationRule for RequiredFieldsRule {
    fn name(&self) -> &'static str {
        "RequiredFields"
    }

    fn validate(&self, recipe: &ImageRecipe) -> Result<()> {
        if recipe.version.is_empty() {
            anyhow::bail!("Version cannot be empty");
        }
        if recipe.name.is_empty() {
            anyhow::bail!("Image name cannot be empty");
        }
        if recipe.base.is_empty() {
            anyhow::bail!("Base image cannot be empty");
        }
        if recipe.workspace.is_empty() {
            anyhow::bail!("Workspace cannot be empty");
        }
        let manager = &recipe.dependency_manager;
        if manager.name.is_empty() {
            anyhow::bail!("Dependency manager name cannot be empty");
        }
        if manager.installer_url.is_empty() {
            anyhow::bail!("Dependency manager installer_url cannot be empty");
        }
        if manager.interpreter.is_empty() {
            anyhow::bail!("Dependency manager interpreter cannot be empty");
        }
        if manager.install_dir.is_empty() {
            anyhow::bail!("Dependency manager install_dir cannot be empty");
        }
        if recipe.dependencies.manifest.is_empty() {
            anyhow::bail!("Dependency manifest cannot be empty");
        }
        if recipe.dependencies.command.is_empty() {
            anyhow::bail!("Dependency install command cannot be empty");
        }
        Ok(())
    }
}

/// Rejects floating base images; rebuilds must start from the same runtime.
pub struct PinnedBaseImageRule;

impl ValidationRule for PinnedBaseImageRule {
    fn name(&self) -> &'static str {
        "PinnedBaseImage"
    }

    fn validate(&self, recipe: &ImageRecipe) -> Result<()> {
        let reference = recipe
            .base_reference()
            .map_err(|e| anyhow::anyhow!("Base image '{}': {}", recipe.base, e))?;
        if !reference.is_pinned() {
            let tag = reference.tag.as_deref().unwrap_or(FLOATING_TAG);
            anyhow::bail!(
                "Base image '{}' resolves to the floating tag '{}'; pin a version or digest",
                recipe.base,
                tag
            );
        }
        Ok(())
    }
}

pub struct ImageNameRule;

impl ValidationRule for ImageNameRule {
    fn name(&self) -> &'static str {
        "ImageName"
    }

    fn validate(&self, recipe: &ImageRecipe) -> Result<()> {
        let reference: ImageReference = recipe
            .name
            .parse()
            .map_err(|e| anyhow::anyhow!("Image name '{}': {}", recipe.name, e))?;
        if reference.tag.is_some() || reference.digest.is_some() {
            anyhow::bail!(
                "Image name '{}' must be a bare repository; tags are derived from the build fingerprint",
                recipe.name
            );
        }
        Ok(())
    }
}

pub struct AbsolutePathsRule;

fn is_normalized_absolute(path: &str) -> bool {
    let path = Path::new(path);
    path.is_absolute() && !path.components().any(|c| matches!(c, Component::ParentDir))
}

impl ValidationRule for AbsolutePathsRule {
    fn name(&self) -> &'static str {
        "AbsolutePaths"
    }

    fn validate(&self, recipe: &ImageRecipe) -> Result<()> {
        if !is_normalized_absolute(&recipe.workspace) {
            anyhow::bail!(
                "Workspace '{}' must be an absolute path without '..'",
                recipe.workspace
            );
        }
        if !is_normalized_absolute(&recipe.dependency_manager.install_dir) {
            anyhow::bail!(
                "install_dir '{}' must be an absolute path without '..'",
                recipe.dependency_manager.install_dir
            );
        }
        Ok(())
    }
}

fn package_regex() -> &'static Regex {
    static PACKAGE_REGEX: OnceLock<Regex> = OnceLock::new();
    PACKAGE_REGEX
        .get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9.+\-:=~]*$").expect("Invalid package regex"))
}

pub struct PackageNamesRule;

impl ValidationRule for PackageNamesRule {
    fn name(&self) -> &'static str {
        "PackageNames"
    }

    fn validate(&self, recipe: &ImageRecipe) -> Result<()> {
        let mut seen = HashSet::new();
        for package in &recipe.system_packages.packages {
            if !package_regex().is_match(package) {
                anyhow::bail!("Invalid package name '{}'", package);
            }
            if !seen.insert(package.as_str()) {
                anyhow::bail!("Package '{}' is listed more than once", package);
            }
        }
        Ok(())
    }
}

pub struct InstallerSourceRule;

impl ValidationRule for InstallerSourceRule {
    fn name(&self) -> &'static str {
        "InstallerSource"
    }

    fn validate(&self, recipe: &ImageRecipe) -> Result<()> {
        let manager = &recipe.dependency_manager;
        if !manager.installer_url.starts_with("https://") {
            anyhow::bail!(
                "Installer URL '{}' must use https",
                manager.installer_url
            );
        }
        if let Some(ref checksum) = manager.installer_sha256 {
            if checksum.len() != 64 || !checksum.chars().all(|c| c.is_ascii_hexdigit()) {
                anyhow::bail!(
                    "installer_sha256 '{}' must be 64 hexadecimal characters",
                    checksum
                );
            }
        }
        if manager.name.contains('/') || manager.name.contains(char::is_whitespace) {
            anyhow::bail!(
                "Dependency manager name '{}' must be a single word",
                manager.name
            );
        }
        Ok(())
    }
}

/// Only enabled in strict mode: the installer must be verified before it runs.
pub struct ChecksumPinnedInstallerRule;

impl ValidationRule for ChecksumPinnedInstallerRule {
    fn name(&self) -> &'static str {
        "ChecksumPinnedInstaller"
    }

    fn validate(&self, recipe: &ImageRecipe) -> Result<()> {
        if !recipe.dependency_manager.is_checksum_pinned() {
            anyhow::bail!(
                "Installer '{}' has no installer_sha256",
                recipe.dependency_manager.installer_url
            );
        }
        Ok(())
    }
}

pub struct ManifestPathRule;

impl ValidationRule for ManifestPathRule {
    fn name(&self) -> &'static str {
        "ManifestPath"
    }

    fn validate(&self, recipe: &ImageRecipe) -> Result<()> {
        let manifest = Path::new(&recipe.dependencies.manifest);
        let relative_and_contained = manifest
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !relative_and_contained {
            anyhow::bail!(
                "Manifest '{}' must be a relative path inside the workspace",
                recipe.dependencies.manifest
            );
        }
        Ok(())
    }
}

pub struct EntrypointRule;

impl ValidationRule for EntrypointRule {
    fn name(&self) -> &'static str {
        "Entrypoint"
    }

    fn validate(&self, recipe: &ImageRecipe) -> Result<()> {
        if recipe.entrypoint.is_empty() {
            anyhow::bail!("Entrypoint cannot be empty");
        }
        if recipe.entrypoint.iter().any(|arg| arg.is_empty()) {
            anyhow::bail!("Entrypoint arguments cannot be empty strings");
        }
        Ok(())
    }
}
