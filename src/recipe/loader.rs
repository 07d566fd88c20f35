//! Recipe loading from YAML, JSON or TOML files

use super::schema::ImageRecipe;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Recipe file looked up in the build context when none is given explicitly
pub const CONTEXT_RECIPE_FILE: &str = "webagent-image.yaml";

/// Where a recipe came from, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeSource {
    File(PathBuf),
    BuiltIn,
}

impl std::fmt::Display for RecipeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipeSource::File(path) => write!(f, "{}", path.display()),
            RecipeSource::BuiltIn => write!(f, "built-in webagent recipe"),
        }
    }
}

/// Parses a recipe file, choosing the format from its extension.
pub fn load_recipe_file(path: &Path) -> Result<ImageRecipe> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read recipe file {}", path.display()))?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let recipe = match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML recipe {}", path.display()))?,
        "json" => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON recipe {}", path.display()))?,
        "toml" => toml::from_str(&content)
            .with_context(|| format!("Invalid TOML recipe {}", path.display()))?,
        other => bail!(
            "Unsupported recipe format '{}' for {} (expected .yaml, .yml, .json or .toml)",
            other,
            path.display()
        ),
    };

    debug!(path = %path.display(), "Loaded recipe file");
    Ok(recipe)
}

/// Resolves the recipe for a build context.
///
/// Precedence: explicit path, then `webagent-image.yaml` in the context, then the built-in recipe.
pub fn resolve_recipe(
    explicit: Option<&Path>,
    context_dir: &Path,
) -> Result<(ImageRecipe, RecipeSource)> {
    if let Some(path) = explicit {
        let recipe = load_recipe_file(path)?;
        return Ok((recipe, RecipeSource::File(path.to_path_buf())));
    }

    let in_context = context_dir.join(CONTEXT_RECIPE_FILE);
    if in_context.is_file() {
        let recipe = load_recipe_file(&in_context)?;
        info!(path = %in_context.display(), "Using recipe from build context");
        return Ok((recipe, RecipeSource::File(in_context)));
    }

    Ok((ImageRecipe::webagent(), RecipeSource::BuiltIn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("recipe.yaml");
        fs::write(&path, "name: agent\nbase: python:3.12\n").unwrap();

        let recipe = load_recipe_file(&path).unwrap();
        assert_eq!(recipe.name, "agent");
        assert_eq!(recipe.base, "python:3.12");
    }

    #[test]
    fn test_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("recipe.json");
        fs::write(&path, r#"{"name": "agent", "entrypoint": ["python", "app.py"]}"#).unwrap();

        let recipe = load_recipe_file(&path).unwrap();
        assert_eq!(recipe.entrypoint, vec!["python", "app.py"]);
    }

    #[test]
    fn test_load_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("recipe.toml");
        fs::write(
            &path,
            r#"
name = "agent"
base = "python:3.12"

[system_packages]
manager = "apk"
packages = ["curl"]
"#,
        )
        .unwrap();

        let recipe = load_recipe_file(&path).unwrap();
        assert_eq!(recipe.system_packages.packages, vec!["curl"]);
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("recipe.ini");
        fs::write(&path, "name=agent").unwrap();

        let err = load_recipe_file(&path).unwrap_err();
        assert!(err.to_string().contains("Unsupported recipe format"));
    }

    #[test]
    fn test_resolve_prefers_explicit_path() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONTEXT_RECIPE_FILE), "name: from-context\n").unwrap();
        let explicit = dir.path().join("other.yaml");
        fs::write(&explicit, "name: explicit\n").unwrap();

        let (recipe, source) = resolve_recipe(Some(&explicit), dir.path()).unwrap();
        assert_eq!(recipe.name, "explicit");
        assert_eq!(source, RecipeSource::File(explicit));
    }

    #[test]
    fn test_resolve_uses_context_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONTEXT_RECIPE_FILE), "name: from-context\n").unwrap();

        let (recipe, _) = resolve_recipe(None, dir.path()).unwrap();
        assert_eq!(recipe.name, "from-context");
    }

    #[test]
    fn test_resolve_falls_back_to_builtin() {
        let dir = TempDir::new().unwrap();
        let (recipe, source) = resolve_recipe(None, dir.path()).unwrap();
        assert_eq!(recipe, ImageRecipe::webagent());
        assert_eq!(source, RecipeSource::BuiltIn);
    }
}
