use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user account. Credentials never leave the data manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email_address: String,
    pub account_status: String,
    #[serde(rename = "avatar")]
    pub avatar_src: Option<String>,
    #[serde(rename = "serviceRoles")]
    pub service_role: String,
    pub email_address_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}
