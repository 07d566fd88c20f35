//! Declarative image recipe: schema, image references and loading

pub mod loader;
pub mod reference;
pub mod schema;

pub use loader::{load_recipe_file, resolve_recipe, RecipeSource, CONTEXT_RECIPE_FILE};
pub use reference::{ImageReference, ReferenceError, FLOATING_TAG};
pub use schema::{
    shell_quote, Dependencies, DependencyManager, ImageRecipe, PackageManager, SystemPackages,
};
