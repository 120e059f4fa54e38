//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

use crate::indexing::IndexType;

/// Tables read by the data manager.
#[derive(Iden, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Table {
    #[iden = "recipes"]
    Recipes,
    #[iden = "recipe_steps"]
    RecipeSteps,
    #[iden = "recipe_step_ingredients"]
    RecipeStepIngredients,
    #[iden = "recipe_step_instruments"]
    RecipeStepInstruments,
    #[iden = "recipe_step_vessels"]
    RecipeStepVessels,
    #[iden = "meals"]
    Meals,
    #[iden = "meal_components"]
    MealComponents,
    #[iden = "valid_ingredients"]
    ValidIngredients,
    #[iden = "valid_instruments"]
    ValidInstruments,
    #[iden = "valid_preparations"]
    ValidPreparations,
    #[iden = "valid_measurement_units"]
    ValidMeasurementUnits,
    #[iden = "valid_ingredient_states"]
    ValidIngredientStates,
    #[iden = "valid_vessels"]
    ValidVessels,
    #[iden = "users"]
    Users,
    #[iden = "valid_ingredient_measurement_units"]
    ValidIngredientMeasurementUnits,
    #[iden = "valid_measurement_unit_conversions"]
    ValidMeasurementUnitConversions,
    #[iden = "valid_preparation_instruments"]
    ValidPreparationInstruments,
    #[iden = "valid_ingredient_preparations"]
    ValidIngredientPreparations,
}

impl Table {
    /// Table holding the rows reconciled into `index_type`.
    pub fn for_index(index_type: IndexType) -> Self {
        match index_type {
            IndexType::Recipes => Self::Recipes,
            IndexType::Meals => Self::Meals,
            IndexType::ValidIngredients => Self::ValidIngredients,
            IndexType::ValidInstruments => Self::ValidInstruments,
            IndexType::ValidPreparations => Self::ValidPreparations,
            IndexType::ValidMeasurementUnits => Self::ValidMeasurementUnits,
            IndexType::ValidIngredientStates => Self::ValidIngredientStates,
            IndexType::ValidVessels => Self::ValidVessels,
            IndexType::Users => Self::Users,
            IndexType::ValidIngredientMeasurementUnits => Self::ValidIngredientMeasurementUnits,
            IndexType::ValidMeasurementUnitConversions => Self::ValidMeasurementUnitConversions,
            IndexType::ValidPreparationInstruments => Self::ValidPreparationInstruments,
            IndexType::ValidIngredientPreparations => Self::ValidIngredientPreparations,
        }
    }
}

/// Columns every indexable table carries.
#[derive(Iden, Clone, Copy, Debug)]
pub enum Searchable {
    #[iden = "id"]
    Id,
    #[iden = "archived_at"]
    ArchivedAt,
    #[iden = "last_updated_at"]
    LastUpdatedAt,
    #[iden = "last_indexed_at"]
    LastIndexedAt,
}

/// Child-row foreign keys.
#[derive(Iden, Clone, Copy, Debug)]
pub enum Children {
    #[iden = "belongs_to_recipe_step"]
    BelongsToRecipeStep,
}

/// Household webhooks.
#[derive(Iden, Clone, Copy, Debug)]
pub enum Webhooks {
    Table,
    Id,
    Name,
    ContentType,
    Url,
    Method,
    CreatedAt,
    LastUpdatedAt,
    ArchivedAt,
    BelongsToHousehold,
}

/// Events a webhook fires on, one row per event type.
#[derive(Iden, Clone, Copy, Debug)]
pub enum WebhookTriggerEvents {
    Table,
    TriggerEvent,
    BelongsToWebhook,
    ArchivedAt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_index_type_has_its_own_table() {
        let tables: std::collections::HashSet<String> = IndexType::ALL
            .into_iter()
            .map(|t| Table::for_index(t).to_string())
            .collect();
        assert_eq!(tables.len(), IndexType::ALL.len());
    }

    #[test]
    fn test_table_names_match_index_names() {
        for index_type in IndexType::ALL {
            assert_eq!(Table::for_index(index_type).to_string(), index_type.as_str());
        }
    }
}
