//! Search indexing scheduler.
//!
//! Each run picks one enabled index type at random, asks the data manager
//! which of its rows need indexing, and publishes one upsert request per
//! row. Rows whose request fails to publish stay flagged and are picked up
//! by a later run.

use std::fmt;
use std::sync::Arc;

use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::{debug, info, info_span, warn, Instrument};

use super::{IndexRequest, IndexType};
use crate::bus::{BusError, Publisher};
use crate::storage::{SearchDataManager, StorageError};

/// Errors from one scheduler run.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("No index types enabled")]
    NoIndexTypes,

    #[error("Failed to list {index_type} rows needing indexing: {source}")]
    Storage {
        index_type: IndexType,
        #[source]
        source: StorageError,
    },

    #[error("{} of {attempted} {index_type} index requests failed to publish", .errors.len())]
    Publish {
        index_type: IndexType,
        attempted: usize,
        /// `(row_id, error)` per failed publish.
        errors: Vec<(String, BusError)>,
    },
}

/// Outcome of a clean run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerReport {
    pub index_type: IndexType,
    pub published: usize,
}

impl fmt::Display for SchedulerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} index requests", self.published, self.index_type)
    }
}

/// Publishes index requests for rows that need indexing.
pub struct Scheduler {
    data_manager: Arc<dyn SearchDataManager>,
    publisher: Arc<Publisher>,
    enabled: Vec<IndexType>,
}

impl Scheduler {
    pub fn new(
        data_manager: Arc<dyn SearchDataManager>,
        publisher: Arc<Publisher>,
        enabled: Vec<IndexType>,
    ) -> Self {
        Self {
            data_manager,
            publisher,
            enabled,
        }
    }

    /// Uniform choice over the enabled index types.
    pub fn choose_index_type<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<IndexType> {
        self.enabled.choose(rng).copied()
    }

    /// One scheduler tick with a randomly chosen index type.
    pub async fn run_once(&self) -> Result<SchedulerReport, SchedulerError> {
        let index_type = {
            let mut rng = rand::rng();
            self.choose_index_type(&mut rng)
        }
        .ok_or(SchedulerError::NoIndexTypes)?;

        self.schedule(index_type).await
    }

    /// Publish an upsert request for every row of `index_type` that needs
    /// indexing. A missing table or empty result is a clean run.
    pub async fn schedule(&self, index_type: IndexType) -> Result<SchedulerReport, SchedulerError> {
        let span = info_span!("schedule", index_type = %index_type);

        async {
            let ids = match self
                .data_manager
                .get_ids_that_need_search_indexing(index_type)
                .await
            {
                Ok(ids) => ids,
                Err(e) if e.is_not_found() => Vec::new(),
                Err(source) => return Err(SchedulerError::Storage { index_type, source }),
            };

            if ids.is_empty() {
                debug!("No rows need indexing");
                return Ok(SchedulerReport {
                    index_type,
                    published: 0,
                });
            }

            let mut errors = Vec::new();
            for id in &ids {
                let request = IndexRequest::upsert(id.clone(), index_type);
                if let Err(e) = self.publisher.publish(&request).await {
                    warn!(row_id = %id, error = %e, "Failed to publish index request");
                    errors.push((id.clone(), e));
                }
            }

            if !errors.is_empty() {
                return Err(SchedulerError::Publish {
                    index_type,
                    attempted: ids.len(),
                    errors,
                });
            }

            info!(published = ids.len(), "Index requests published");
            Ok(SchedulerReport {
                index_type,
                published: ids.len(),
            })
        }
        .instrument(span)
        .await
    }
}
