//! Recipe domain module (event-sourced).
//!
//! A recipe is a bill of materials: raw material quantities per batch and
//! the number of finished units one batch yields. Cost rollup and
//! production consumption are pure derivations over a recipe.

pub mod consumption;
pub mod recipe;
pub mod rollup;

pub use consumption::Consumption;
pub use recipe::{
    AddRecipeLine, CreateRecipe, DeleteRecipe, Recipe, RecipeCommand, RecipeCreated,
    RecipeDeleted, RecipeEvent, RecipeId, RecipeLine, RecipeLineAdded, RecipeLineId,
    RecipeLineRemoved, RecipeLineUpdated, RecipeLinesReplaced, RecipeUpdated, RemoveRecipeLine,
    ReplaceRecipeLines, UpdateRecipe, UpdateRecipeLine,
};
pub use rollup::{LineCost, RecipeCost, rollup};
