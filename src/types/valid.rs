//! Catalog ("valid_*") entities and the join rows between them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidIngredient {
    pub id: String,
    pub name: String,
    pub plural_name: String,
    pub description: String,
    pub warning: String,
    pub icon_path: String,
    pub slug: String,
    pub shopping_suggestions: String,
    pub storage_instructions: String,
    pub maximum_ideal_storage_temperature_in_celsius: Option<f32>,
    pub minimum_ideal_storage_temperature_in_celsius: Option<f32>,
    pub contains_dairy: bool,
    pub contains_peanut: bool,
    pub contains_tree_nut: bool,
    pub contains_egg: bool,
    pub contains_wheat: bool,
    pub contains_shellfish: bool,
    pub contains_sesame: bool,
    pub contains_fish: bool,
    pub contains_gluten: bool,
    pub contains_soy: bool,
    pub contains_alcohol: bool,
    pub animal_flesh: bool,
    pub animal_derived: bool,
    pub is_measured_volumetrically: bool,
    pub is_liquid: bool,
    pub restrict_to_preparations: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidInstrument {
    pub id: String,
    pub name: String,
    pub plural_name: String,
    pub description: String,
    pub icon_path: String,
    pub slug: String,
    pub usable_for_storage: bool,
    pub display_in_summary_lists: bool,
    pub include_in_generated_instructions: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidPreparation {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon_path: String,
    pub past_tense: String,
    pub slug: String,
    pub yields_nothing: bool,
    pub restrict_to_ingredients: bool,
    pub minimum_ingredient_count: i32,
    pub maximum_ingredient_count: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidMeasurementUnit {
    pub id: String,
    pub name: String,
    pub plural_name: String,
    pub description: String,
    pub icon_path: String,
    pub slug: String,
    pub volumetric: bool,
    pub universal: bool,
    pub metric: bool,
    pub imperial: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidIngredientState {
    pub id: String,
    pub name: String,
    pub plural_name: String,
    pub past_tense: String,
    pub description: String,
    pub icon_path: String,
    pub slug: String,
    pub attribute_type: String,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidVessel {
    pub id: String,
    pub name: String,
    pub plural_name: String,
    pub description: String,
    pub icon_path: String,
    pub slug: String,
    pub shape: String,
    pub capacity: f32,
    pub width_in_millimeters: Option<f32>,
    pub length_in_millimeters: Option<f32>,
    pub height_in_millimeters: Option<f32>,
    pub usable_for_storage: bool,
    pub display_in_summary_lists: bool,
    pub include_in_generated_instructions: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// Which measurement units make sense for an ingredient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidIngredientMeasurementUnit {
    pub id: String,
    pub notes: String,
    pub ingredient: ValidIngredient,
    pub measurement_unit: ValidMeasurementUnit,
    pub minimum_allowable_quantity: f32,
    pub maximum_allowable_quantity: Option<f32>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// Conversion factor between two units, optionally scoped to one ingredient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidMeasurementUnitConversion {
    pub id: String,
    pub notes: String,
    pub from: ValidMeasurementUnit,
    pub to: ValidMeasurementUnit,
    pub only_for_ingredient: Option<ValidIngredient>,
    pub modifier: f32,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidPreparationInstrument {
    pub id: String,
    pub notes: String,
    pub preparation: ValidPreparation,
    pub instrument: ValidInstrument,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidIngredientPreparation {
    pub id: String,
    pub notes: String,
    pub ingredient: ValidIngredient,
    pub preparation: ValidPreparation,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}
