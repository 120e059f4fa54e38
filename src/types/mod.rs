//! Domain entities carried by data change messages and read by the indexer.
//!
//! These are the system-of-record shapes. Search projections live in
//! `crate::indexing::projection`.

mod event;
mod meal;
mod recipe;
mod user;
mod valid;
mod webhook;

pub use event::{DataChangeMessage, ServiceEventType};
pub use meal::{Meal, MealComponent};
pub use recipe::{Recipe, RecipeStep, RecipeStepIngredient, RecipeStepInstrument, RecipeStepVessel};
pub use user::User;
pub use valid::{
    ValidIngredient, ValidIngredientMeasurementUnit, ValidIngredientPreparation,
    ValidIngredientState, ValidInstrument, ValidMeasurementUnit, ValidMeasurementUnitConversion,
    ValidPreparation, ValidPreparationInstrument, ValidVessel,
};
pub use webhook::{Webhook, WebhookExecutionRequest};
