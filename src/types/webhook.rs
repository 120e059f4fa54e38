use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DataChangeMessage;

/// A household's outbound HTTP hook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Webhook {
    pub id: String,
    pub name: String,
    pub url: String,
    pub method: String,
    pub content_type: String,
    /// Event type names this webhook fires on.
    pub events: Vec<String>,
    pub belongs_to_household: String,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// Asks the webhook executor to deliver one data change to one webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookExecutionRequest {
    #[serde(rename = "webhookID")]
    pub webhook_id: String,
    #[serde(rename = "householdID")]
    pub household_id: String,
    pub payload: DataChangeMessage,
}
