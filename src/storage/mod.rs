//! System-of-record access for search reconciliation.
//!
//! The indexer and scheduler only need three capabilities per entity class:
//! read one row, list the rows whose search representation is stale, and
//! mark a row as indexed. The data-change router additionally looks up the
//! webhooks a change should fire.

use async_trait::async_trait;

use crate::indexing::IndexType;
use crate::types::{
    Meal, Recipe, User, ValidIngredient, ValidIngredientMeasurementUnit,
    ValidIngredientPreparation, ValidIngredientState, ValidInstrument, ValidMeasurementUnit,
    ValidMeasurementUnitConversion, ValidPreparation, ValidPreparationInstrument, ValidVessel,
    Webhook,
};

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "postgres")]
pub mod schema;

#[cfg(feature = "postgres")]
pub use postgres::PostgresDataManager;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors from the data manager.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{entity} not found: id={id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Timed out connecting to database after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to decode {entity} row: {message}")]
    Decode {
        entity: &'static str,
        message: String,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Read and bookkeeping capabilities consumed by the indexing pipeline.
///
/// Implementations:
/// - `PostgresDataManager`: the production store
/// - `test_utils::MockDataManager`: in-memory rows with a call journal
#[async_trait]
pub trait SearchDataManager: Send + Sync {
    async fn get_recipe(&self, id: &str) -> Result<Recipe>;
    async fn get_meal(&self, id: &str) -> Result<Meal>;
    async fn get_valid_ingredient(&self, id: &str) -> Result<ValidIngredient>;
    async fn get_valid_instrument(&self, id: &str) -> Result<ValidInstrument>;
    async fn get_valid_preparation(&self, id: &str) -> Result<ValidPreparation>;
    async fn get_valid_measurement_unit(&self, id: &str) -> Result<ValidMeasurementUnit>;
    async fn get_valid_ingredient_state(&self, id: &str) -> Result<ValidIngredientState>;
    async fn get_valid_vessel(&self, id: &str) -> Result<ValidVessel>;
    async fn get_user(&self, id: &str) -> Result<User>;
    async fn get_valid_ingredient_measurement_unit(
        &self,
        id: &str,
    ) -> Result<ValidIngredientMeasurementUnit>;
    async fn get_valid_measurement_unit_conversion(
        &self,
        id: &str,
    ) -> Result<ValidMeasurementUnitConversion>;
    async fn get_valid_preparation_instrument(&self, id: &str)
        -> Result<ValidPreparationInstrument>;
    async fn get_valid_ingredient_preparation(&self, id: &str)
        -> Result<ValidIngredientPreparation>;

    /// Row IDs of `index_type` whose index entry is missing or stale.
    ///
    /// Bounded by the implementation's batch size. An empty table may be
    /// reported either as an empty list or as `NotFound`.
    async fn get_ids_that_need_search_indexing(&self, index_type: IndexType)
        -> Result<Vec<String>>;

    /// Clear the needs-indexing marker for one row.
    async fn mark_as_indexed(&self, index_type: IndexType, id: &str) -> Result<()>;
}

/// Webhook lookups for data-change fan-out.
#[async_trait]
pub trait WebhookDataManager: Send + Sync {
    /// Live webhooks of `household_id` with a live trigger on `event_type`.
    async fn get_webhooks_for_household_and_event(
        &self,
        household_id: &str,
        event_type: &str,
    ) -> Result<Vec<Webhook>>;
}
