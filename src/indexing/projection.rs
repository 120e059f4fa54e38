//! Search-subset projections.
//!
//! Each projection reduces a stored entity to the fields used for text
//! search and display. Composite entities embed their children's names so
//! an index document is self-contained. Catalog primitives are indexed
//! as-is and have no projection here.

use serde::{Deserialize, Serialize};

use crate::types::{
    Meal, Recipe, RecipeStep, User, ValidIngredient, ValidIngredientMeasurementUnit,
    ValidIngredientPreparation, ValidInstrument, ValidMeasurementUnit,
    ValidMeasurementUnitConversion, ValidPreparation, ValidPreparationInstrument,
};

/// An `{id, name}` reference to another entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: String,
    pub name: String,
}

impl NamedRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

macro_rules! named_ref_from {
    ($($entity:ty),+) => {
        $(
            impl From<&$entity> for NamedRef {
                fn from(entity: &$entity) -> Self {
                    Self::new(&entity.id, &entity.name)
                }
            }
        )+
    };
}

named_ref_from!(ValidIngredient, ValidInstrument, ValidPreparation, ValidMeasurementUnit);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeStepSearchSubset {
    /// Preparation name, e.g. "boil".
    pub preparation: String,
    pub ingredients: Vec<NamedRef>,
    pub instruments: Vec<NamedRef>,
    pub vessels: Vec<NamedRef>,
}

impl From<&RecipeStep> for RecipeStepSearchSubset {
    fn from(step: &RecipeStep) -> Self {
        Self {
            preparation: step.preparation.name.clone(),
            ingredients: step
                .ingredients
                .iter()
                .map(|i| NamedRef::new(&i.id, &i.name))
                .collect(),
            instruments: step
                .instruments
                .iter()
                .map(|i| NamedRef::new(&i.id, &i.name))
                .collect(),
            vessels: step
                .vessels
                .iter()
                .map(|v| NamedRef::new(&v.id, &v.name))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeSearchSubset {
    pub id: String,
    pub name: String,
    pub description: String,
    pub steps: Vec<RecipeStepSearchSubset>,
}

impl From<&Recipe> for RecipeSearchSubset {
    fn from(recipe: &Recipe) -> Self {
        Self {
            id: recipe.id.clone(),
            name: recipe.name.clone(),
            description: recipe.description.clone(),
            steps: recipe.steps.iter().map(RecipeStepSearchSubset::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealSearchSubset {
    pub id: String,
    pub name: String,
    pub description: String,
    /// One entry per meal component.
    pub recipes: Vec<NamedRef>,
}

impl From<&Meal> for MealSearchSubset {
    fn from(meal: &Meal) -> Self {
        Self {
            id: meal.id.clone(),
            name: meal.name.clone(),
            description: meal.description.clone(),
            recipes: meal
                .components
                .iter()
                .map(|c| NamedRef::new(&c.recipe.id, &c.recipe.name))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchSubset {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&User> for UserSearchSubset {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidIngredientMeasurementUnitSearchSubset {
    pub id: String,
    pub notes: String,
    pub ingredient: NamedRef,
    pub measurement_unit: NamedRef,
}

impl From<&ValidIngredientMeasurementUnit> for ValidIngredientMeasurementUnitSearchSubset {
    fn from(row: &ValidIngredientMeasurementUnit) -> Self {
        Self {
            id: row.id.clone(),
            notes: row.notes.clone(),
            ingredient: NamedRef::from(&row.ingredient),
            measurement_unit: NamedRef::from(&row.measurement_unit),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidMeasurementUnitConversionSearchSubset {
    pub id: String,
    pub notes: String,
    pub from: NamedRef,
    pub to: NamedRef,
}

impl From<&ValidMeasurementUnitConversion> for ValidMeasurementUnitConversionSearchSubset {
    fn from(row: &ValidMeasurementUnitConversion) -> Self {
        Self {
            id: row.id.clone(),
            notes: row.notes.clone(),
            from: NamedRef::from(&row.from),
            to: NamedRef::from(&row.to),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidPreparationInstrumentSearchSubset {
    pub id: String,
    pub notes: String,
    pub preparation: NamedRef,
    pub instrument: NamedRef,
}

impl From<&ValidPreparationInstrument> for ValidPreparationInstrumentSearchSubset {
    fn from(row: &ValidPreparationInstrument) -> Self {
        Self {
            id: row.id.clone(),
            notes: row.notes.clone(),
            preparation: NamedRef::from(&row.preparation),
            instrument: NamedRef::from(&row.instrument),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidIngredientPreparationSearchSubset {
    pub id: String,
    pub notes: String,
    pub ingredient: NamedRef,
    pub preparation: NamedRef,
}

impl From<&ValidIngredientPreparation> for ValidIngredientPreparationSearchSubset {
    fn from(row: &ValidIngredientPreparation) -> Self {
        Self {
            id: row.id.clone(),
            notes: row.notes.clone(),
            ingredient: NamedRef::from(&row.ingredient),
            preparation: NamedRef::from(&row.preparation),
        }
    }
}
