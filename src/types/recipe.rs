use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ValidPreparation;

/// A recipe with its ordered steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub source: String,
    pub description: String,
    pub created_by_user: String,
    pub min_estimated_portions: f32,
    pub max_estimated_portions: Option<f32>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub steps: Vec<RecipeStep>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecipeStep {
    pub id: String,
    pub index: u32,
    pub preparation: ValidPreparation,
    pub notes: String,
    pub explicit_instructions: String,
    pub optional: bool,
    pub ingredients: Vec<RecipeStepIngredient>,
    pub instruments: Vec<RecipeStepInstrument>,
    pub vessels: Vec<RecipeStepVessel>,
    pub belongs_to_recipe: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecipeStepIngredient {
    pub id: String,
    pub name: String,
    /// The catalog ingredient, absent for products of earlier steps.
    pub ingredient_id: Option<String>,
    pub quantity_notes: String,
    pub ingredient_notes: String,
    pub optional: bool,
    pub belongs_to_recipe_step: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecipeStepInstrument {
    pub id: String,
    pub name: String,
    pub instrument_id: Option<String>,
    pub notes: String,
    pub optional: bool,
    pub belongs_to_recipe_step: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecipeStepVessel {
    pub id: String,
    pub name: String,
    pub vessel_id: Option<String>,
    pub notes: String,
    pub belongs_to_recipe_step: String,
}
