//! Algolia hosted search backend.
//!
//! Uses the REST API directly:
//! - `PUT /1/indexes/{index}/{id}` replaces an object
//! - `DELETE /1/indexes/{index}/{id}` removes it
//! - `POST /1/indexes/{index}/query` searches
//! - `POST /1/indexes/{index}/clear` empties the index

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{AlgoliaConfig, Result, SearchBackend, SearchError};

const APP_ID_HEADER: &str = "X-Algolia-Application-Id";
const API_KEY_HEADER: &str = "X-Algolia-API-Key";

/// Algolia REST client.
pub struct AlgoliaBackend {
    client: Client,
    base_url: Url,
    app_id: String,
    api_key: String,
}

impl AlgoliaBackend {
    pub fn new(config: &AlgoliaConfig, timeout: Duration) -> Result<Self> {
        if config.app_id.is_empty() || config.api_key.is_empty() {
            return Err(SearchError::Config(
                "algolia requires app_id and api_key".to_string(),
            ));
        }

        let base_url = match &config.base_url {
            Some(url) => url.clone(),
            None => format!("https://{}.algolia.net", config.app_id),
        };
        let base_url = Url::parse(&base_url)
            .map_err(|e| SearchError::Config(format!("invalid algolia base_url: {e}")))?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            app_id: config.app_id.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SearchError::Config("algolia base_url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["1", "indexes"])
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(APP_ID_HEADER, &self.app_id)
            .header(API_KEY_HEADER, &self.api_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, body = %body, "Algolia request failed");
        Err(SearchError::status(status, body))
    }
}

/// Strip Algolia's per-hit metadata, leaving the stored object.
fn stored_object(mut hit: Value) -> Value {
    if let Value::Object(fields) = &mut hit {
        fields.retain(|key, _| !key.starts_with('_'));
        fields.remove("objectID");
    }
    hit
}

#[async_trait]
impl SearchBackend for AlgoliaBackend {
    fn name(&self) -> &'static str {
        "algolia"
    }

    async fn upsert(&self, index: &str, id: &str, document: Value) -> Result<()> {
        let url = self.endpoint(&[index, id])?;
        self.send(self.client.put(url).json(&document)).await?;
        debug!(index, id, "Algolia object saved");
        Ok(())
    }

    async fn delete(&self, index: &str, id: &str) -> Result<()> {
        let url = self.endpoint(&[index, id])?;
        self.send(self.client.delete(url)).await?;
        debug!(index, id, "Algolia object deleted");
        Ok(())
    }

    async fn search(&self, index: &str, query: &str) -> Result<Vec<Value>> {
        let url = self.endpoint(&[index, "query"])?;
        let response = self
            .send(self.client.post(url).json(&json!({ "query": query })))
            .await?;

        let mut body: Value = response.json().await?;
        let hits = match body.get_mut("hits").map(Value::take) {
            Some(Value::Array(hits)) => hits,
            _ => Vec::new(),
        };
        Ok(hits.into_iter().map(stored_object).collect())
    }

    async fn wipe(&self, index: &str) -> Result<()> {
        let url = self.endpoint(&[index, "clear"])?;
        self.send(self.client.post(url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base_url: Option<&str>) -> AlgoliaBackend {
        AlgoliaBackend::new(
            &AlgoliaConfig {
                app_id: "APP".to_string(),
                api_key: "KEY".to_string(),
                base_url: base_url.map(str::to_string),
            },
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn test_default_base_url_uses_app_id() {
        let url = backend(None).endpoint(&["recipes", "r1"]).unwrap();
        assert_eq!(url.as_str(), "https://app.algolia.net/1/indexes/recipes/r1");
    }

    #[test]
    fn test_endpoint_escapes_ids() {
        let url = backend(Some("http://localhost:8080/"))
            .endpoint(&["recipes", "a b/c"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/1/indexes/recipes/a%20b%2Fc"
        );
    }

    #[test]
    fn test_stored_object_strips_metadata() {
        let hit = json!({
            "objectID": "r1",
            "name": "Soup",
            "_highlightResult": {"name": {"value": "<em>Soup</em>"}}
        });
        assert_eq!(stored_object(hit), json!({"name": "Soup"}));
    }
}
