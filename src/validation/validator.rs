use crate::recipe::ImageRecipe;
use crate::validation::rules::{
    AbsolutePathsRule, ChecksumPinnedInstallerRule, EntrypointRule, ImageNameRule,
    InstallerSourceRule, ManifestPathRule, PackageNamesRule, PinnedBaseImageRule,
    RequiredFieldsRule, ValidationRule,
};
use serde::Serialize;
use thiserror::Error;

/// A rule violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("[{rule}] {message}")]
pub struct ValidationError {
    pub rule: &'static str,
    pub message: String,
}

pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default rules plus the requirement that the installer is checksum pinned
    pub fn strict() -> Self {
        let mut validator = Self::default();
        validator.rules.push(Box::new(ChecksumPinnedInstallerRule));
        validator
    }

    pub fn with_rules(rules: Vec<Box<dyn ValidationRule>>) -> Self {
        Self { rules }
    }

    /// Stops at the first violated rule.
    pub fn validate(&self, recipe: &ImageRecipe) -> Result<(), ValidationError> {
        for rule in &self.rules {
            if let Err(e) = rule.validate(recipe) {
                return Err(ValidationError {
                    rule: rule.name(),
                    message: e.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Runs every rule and returns all violations.
    pub fn validate_all(&self, recipe: &ImageRecipe) -> Vec<ValidationError> {
        self.rules
            .iter()
            .filter_map(|rule| {
                rule.validate(recipe).err().map(|e| ValidationError {
                    rule: rule.name(),
                    message: e.to_string(),
                })
            })
            .collect()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            rules: vec![
                Box::new(RequiredFieldsRule),
                Box::new(PinnedBaseImageRule),
                Box::new(ImageNameRule),
                Box::new(AbsolutePathsRule),
                Box::new(PackageNamesRule),
                Box::new(InstallerSourceRule),
                Box::new(ManifestPathRule),
                Box::new(EntrypointRule),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validator_valid_recipe() {
        let validator = Validator::new();
        assert!(validator.validate(&ImageRecipe::webagent()).is_ok());
    }

    #[test]
    fn test_validator_reports_rule_name() {
        let mut recipe = ImageRecipe::webagent();
        recipe.base = "python:latest".to_string();
        let err = Validator::new().validate(&recipe).unwrap_err();
        assert_eq!(err.rule, "PinnedBaseImage");
        assert!(err.to_string().starts_with("[PinnedBaseImage]"));
    }

    #[test]
    fn test_validator_stops_at_first_failure() {
        let mut recipe = ImageRecipe::webagent();
        recipe.version = String::new();
        recipe.base = "python".to_string();
        let err = Validator::new().validate(&recipe).unwrap_err();
        assert_eq!(err.rule, "RequiredFields");
    }

    #[test]
    fn test_validate_all_collects_every_violation() {
        let mut recipe = ImageRecipe::webagent();
        recipe.base = "python".to_string();
        recipe.workspace = "app".to_string();
        recipe.entrypoint = vec![];

        let errors = Validator::new().validate_all(&recipe);
        let rules: Vec<&str> = errors.iter().map(|e| e.rule).collect();
        assert_eq!(rules, vec!["PinnedBaseImage", "AbsolutePaths", "Entrypoint"]);
    }

    #[test]
    fn test_strict_requires_installer_checksum() {
        let recipe = ImageRecipe::webagent();
        let err = Validator::strict().validate(&recipe).unwrap_err();
        assert_eq!(err.rule, "ChecksumPinnedInstaller");

        let mut pinned = recipe;
        pinned.dependency_manager.installer_sha256 = Some("c".repeat(64));
        assert!(Validator::strict().validate(&pinned).is_ok());
    }

    #[test]
    fn test_with_rules() {
        let validator = Validator::with_rules(vec![Box::new(EntrypointRule)]);
        let mut recipe = ImageRecipe::webagent();
        recipe.base = "python".to_string();
        assert!(validator.validate(&recipe).is_ok());
    }
}
