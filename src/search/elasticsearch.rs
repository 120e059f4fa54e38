//! Elasticsearch backend over the REST API.
//!
//! Index names are prefixed with `index_prefix`. Deleting a missing
//! document or searching a missing index is not an error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{ElasticsearchConfig, Result, SearchBackend, SearchError};

/// Elasticsearch REST client.
pub struct ElasticsearchBackend {
    client: Client,
    base_url: Url,
    index_prefix: String,
    credentials: Option<(String, Option<String>)>,
    refresh: bool,
}

impl ElasticsearchBackend {
    pub fn new(config: &ElasticsearchConfig, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| SearchError::Config(format!("invalid elasticsearch url: {e}")))?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            index_prefix: config.index_prefix.clone(),
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
            refresh: config.refresh,
        })
    }

    fn index_name(&self, index: &str) -> String {
        format!("{}{}", self.index_prefix, index)
    }

    fn endpoint(&self, index: &str, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SearchError::Config("elasticsearch url cannot be a base".to_string()))?
            .pop_if_empty()
            .push(&self.index_name(index))
            .extend(segments);
        if self.refresh {
            url.query_pairs_mut().append_pair("refresh", "true");
        }
        Ok(url)
    }

    /// Send `request`, passing through success and any status in `tolerated`.
    async fn send(
        &self,
        request: RequestBuilder,
        tolerated: Option<StatusCode>,
    ) -> Result<reqwest::Response> {
        let request = match &self.credentials {
            Some((user, password)) => request.basic_auth(user, password.as_ref()),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() || Some(status) == tolerated {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, body = %body, "Elasticsearch request failed");
        Err(SearchError::status(status, body))
    }
}

fn search_body(query: &str) -> Value {
    if query.trim().is_empty() {
        return json!({ "query": { "match_all": {} } });
    }
    json!({
        "query": {
            "multi_match": {
                "query": query,
                "fields": ["*"],
                "lenient": true
            }
        }
    })
}

fn hit_sources(mut body: Value) -> Vec<Value> {
    match body.pointer_mut("/hits/hits").map(Value::take) {
        Some(Value::Array(hits)) => hits
            .into_iter()
            .filter_map(|mut hit| hit.get_mut("_source").map(Value::take))
            .collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn upsert(&self, index: &str, id: &str, document: Value) -> Result<()> {
        let url = self.endpoint(index, &["_doc", id])?;
        self.send(self.client.put(url).json(&document), None).await?;
        debug!(index, id, "Elasticsearch document indexed");
        Ok(())
    }

    async fn delete(&self, index: &str, id: &str) -> Result<()> {
        let url = self.endpoint(index, &["_doc", id])?;
        self.send(self.client.delete(url), Some(StatusCode::NOT_FOUND))
            .await?;
        debug!(index, id, "Elasticsearch document deleted");
        Ok(())
    }

    async fn search(&self, index: &str, query: &str) -> Result<Vec<Value>> {
        let mut url = self.endpoint(index, &["_search"])?;
        url.set_query(None);

        let response = self
            .send(
                self.client.post(url).json(&search_body(query)),
                Some(StatusCode::NOT_FOUND),
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        Ok(hit_sources(response.json().await?))
    }

    async fn wipe(&self, index: &str) -> Result<()> {
        let url = self.endpoint(index, &["_delete_by_query"])?;
        self.send(
            self.client
                .post(url)
                .json(&json!({ "query": { "match_all": {} } })),
            Some(StatusCode::NOT_FOUND),
        )
        .await?;
        Ok(())
    }
}
