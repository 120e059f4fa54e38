//! Index request consumer.
//!
//! Reconciles one row per request: upserts load the row and write its
//! search subset, deletes remove the document. A row that no longer exists
//! is deleted from the index. The row is marked as indexed only after the
//! index call succeeds.

use std::future::Future;
use std::sync::Arc;

use backon::Retryable;
use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};

use super::projection::{
    MealSearchSubset, RecipeSearchSubset, UserSearchSubset,
    ValidIngredientMeasurementUnitSearchSubset, ValidIngredientPreparationSearchSubset,
    ValidMeasurementUnitConversionSearchSubset, ValidPreparationInstrumentSearchSubset,
};
use super::{IndexRequest, IndexType};
use crate::bus::{BusError, JsonHandler, MessageHandler};
use crate::search::{self, IndexManager, IndexProvider, SearchDocument, SearchError};
use crate::storage::{SearchDataManager, StorageError};
use crate::utils::retry::index_backoff;

/// Errors from handling one index request.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("Index request is missing or has no row ID")]
    NilIndexRequest,

    #[error("Failed to load {index_type} row {row_id}: {source}")]
    Fetch {
        index_type: IndexType,
        row_id: String,
        #[source]
        source: StorageError,
    },

    #[error("Search index {index_type} failed for row {row_id}: {source}")]
    Index {
        index_type: IndexType,
        row_id: String,
        #[source]
        source: SearchError,
    },

    #[error("Failed to mark {index_type} row {row_id} as indexed: {source}")]
    Mark {
        index_type: IndexType,
        row_id: String,
        #[source]
        source: StorageError,
    },
}

impl IndexerError {
    /// Requests that fail this way fail again on every redelivery.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::NilIndexRequest)
    }
}

impl From<IndexerError> for BusError {
    fn from(e: IndexerError) -> Self {
        if e.is_permanent() {
            BusError::Rejected(e.to_string())
        } else {
            BusError::Handler(e.to_string())
        }
    }
}

/// What the indexer did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Upserted,
    Deleted,
}

/// Loads a row, projects it when a subset type is given, and writes it to
/// its index.
macro_rules! reconcile {
    ($indexer:expr, $request:expr, $get:ident $(=> $subset:ty)?) => {{
        match $indexer.data_manager.$get(&$request.row_id).await {
            Ok(entity) => {
                $(let entity = <$subset>::from(&entity);)?
                $indexer.upsert_document($request, &entity).await?;
                IndexOutcome::Upserted
            }
            Err(e) if e.is_not_found() => {
                debug!("Row not found, removing from index");
                $indexer.delete_document($request).await?;
                IndexOutcome::Deleted
            }
            Err(source) => {
                return Err(IndexerError::Fetch {
                    index_type: $request.index_type,
                    row_id: $request.row_id.clone(),
                    source,
                })
            }
        }
    }};
}

/// Consumes index requests and reconciles the search index.
pub struct Indexer {
    data_manager: Arc<dyn SearchDataManager>,
    indexes: IndexProvider,
    max_attempts: usize,
}

impl Indexer {
    /// `max_attempts` bounds inline retries of transient index failures.
    pub fn new(
        data_manager: Arc<dyn SearchDataManager>,
        indexes: IndexProvider,
        max_attempts: usize,
    ) -> Self {
        Self {
            data_manager,
            indexes,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Reconcile one request.
    pub async fn handle(
        &self,
        request: Option<IndexRequest>,
    ) -> Result<IndexOutcome, IndexerError> {
        let request = match request {
            Some(request) if !request.row_id.is_empty() => request,
            _ => return Err(IndexerError::NilIndexRequest),
        };

        let span = info_span!(
            "index_request",
            index_type = %request.index_type,
            row_id = %request.row_id,
            delete = request.delete
        );

        async {
            let outcome = if request.delete {
                self.delete_document(&request).await?;
                IndexOutcome::Deleted
            } else {
                self.upsert_row(&request).await?
            };

            self.data_manager
                .mark_as_indexed(request.index_type, &request.row_id)
                .await
                .map_err(|source| IndexerError::Mark {
                    index_type: request.index_type,
                    row_id: request.row_id.clone(),
                    source,
                })?;

            info!(?outcome, "Index request reconciled");
            Ok::<_, IndexerError>(outcome)
        }
        .instrument(span)
        .await
    }

    /// Wrap this indexer as a bus handler for JSON-encoded index requests.
    pub fn handler(self: Arc<Self>) -> Arc<dyn MessageHandler> {
        Arc::new(JsonHandler::<Option<IndexRequest>, _>::new(
            move |request: Option<IndexRequest>| {
                let indexer = self.clone();
                async move {
                    indexer
                        .handle(request)
                        .await
                        .map(|_| ())
                        .map_err(BusError::from)
                }
            },
        ))
    }

    async fn upsert_row(&self, request: &IndexRequest) -> Result<IndexOutcome, IndexerError> {
        let outcome = match request.index_type {
            IndexType::Recipes => reconcile!(self, request, get_recipe => RecipeSearchSubset),
            IndexType::Meals => reconcile!(self, request, get_meal => MealSearchSubset),
            IndexType::ValidIngredients => reconcile!(self, request, get_valid_ingredient),
            IndexType::ValidInstruments => reconcile!(self, request, get_valid_instrument),
            IndexType::ValidPreparations => reconcile!(self, request, get_valid_preparation),
            IndexType::ValidMeasurementUnits => {
                reconcile!(self, request, get_valid_measurement_unit)
            }
            IndexType::ValidIngredientStates => {
                reconcile!(self, request, get_valid_ingredient_state)
            }
            IndexType::ValidVessels => reconcile!(self, request, get_valid_vessel),
            IndexType::Users => reconcile!(self, request, get_user => UserSearchSubset),
            IndexType::ValidIngredientMeasurementUnits => reconcile!(
                self,
                request,
                get_valid_ingredient_measurement_unit => ValidIngredientMeasurementUnitSearchSubset
            ),
            IndexType::ValidMeasurementUnitConversions => reconcile!(
                self,
                request,
                get_valid_measurement_unit_conversion => ValidMeasurementUnitConversionSearchSubset
            ),
            IndexType::ValidPreparationInstruments => reconcile!(
                self,
                request,
                get_valid_preparation_instrument => ValidPreparationInstrumentSearchSubset
            ),
            IndexType::ValidIngredientPreparations => reconcile!(
                self,
                request,
                get_valid_ingredient_preparation => ValidIngredientPreparationSearchSubset
            ),
        };
        Ok(outcome)
    }

    async fn upsert_document<T: SearchDocument>(
        &self,
        request: &IndexRequest,
        document: &T,
    ) -> Result<(), IndexerError> {
        let index = self.indexes.provide::<T>(request.index_type);
        self.with_retries(request, || index.upsert(&request.row_id, document))
            .await
    }

    async fn delete_document(&self, request: &IndexRequest) -> Result<(), IndexerError> {
        let index = self.indexes.provide::<Value>(request.index_type);
        self.with_retries(request, || index.delete(&request.row_id))
            .await
    }

    async fn with_retries<F, Fut>(&self, request: &IndexRequest, op: F) -> Result<(), IndexerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = search::Result<()>>,
    {
        op.retry(index_backoff(self.max_attempts))
            .when(SearchError::is_transient)
            .notify(|e, delay| {
                warn!(error = %e, ?delay, "Transient search index failure, retrying");
            })
            .await
            .map_err(|source| IndexerError::Index {
                index_type: request.index_type,
                row_id: request.row_id.clone(),
                source,
            })
    }
}
