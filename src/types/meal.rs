use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Recipe;

/// A meal built from one or more recipes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Meal {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_by_user: String,
    pub min_estimated_portions: f32,
    pub max_estimated_portions: Option<f32>,
    pub eligible_for_meal_plans: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub components: Vec<MealComponent>,
}

/// One recipe within a meal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MealComponent {
    pub recipe: Recipe,
    /// "main", "side", "dessert", ...
    pub component_type: String,
    pub recipe_scale: f32,
}
