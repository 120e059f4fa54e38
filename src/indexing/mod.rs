//! Search indexing pipeline.
//!
//! - `scheduler`: finds stale rows and publishes index requests
//! - `indexer`: consumes index requests and reconciles the search index
//! - `router`: turns data-change events into index requests
//! - `webhooks`: fans data-change events out to household webhooks
//! - `projection`: search subsets of domain entities

pub mod indexer;
pub mod projection;
pub mod request;
pub mod router;
pub mod scheduler;
pub mod webhooks;

pub use indexer::{IndexOutcome, Indexer, IndexerError};
pub use projection::{
    MealSearchSubset, NamedRef, RecipeSearchSubset, RecipeStepSearchSubset, UserSearchSubset,
    ValidIngredientMeasurementUnitSearchSubset, ValidIngredientPreparationSearchSubset,
    ValidMeasurementUnitConversionSearchSubset, ValidPreparationInstrumentSearchSubset,
};
pub use request::{IndexRequest, IndexType, UnknownIndexType};
pub use router::{index_request_for, ChangeNotifier, DataChangeRouter, RouterError};
pub use scheduler::{Scheduler, SchedulerError, SchedulerReport};
pub use webhooks::{WebhookError, WebhookFanout};
