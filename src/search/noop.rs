//! Search backend that discards writes.

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use super::{Result, SearchBackend};

/// Accepts every write and returns no results.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSearch;

#[async_trait]
impl SearchBackend for NoopSearch {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn upsert(&self, index: &str, id: &str, _document: Value) -> Result<()> {
        trace!(index, id, "noop upsert");
        Ok(())
    }

    async fn delete(&self, index: &str, id: &str) -> Result<()> {
        trace!(index, id, "noop delete");
        Ok(())
    }

    async fn search(&self, _index: &str, _query: &str) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn wipe(&self, _index: &str) -> Result<()> {
        Ok(())
    }
}
