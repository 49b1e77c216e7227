use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shown for voters and authors that never set a display name.
pub const ANONYMOUS_NAME: &str = "Anonymous";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub neighborhood: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Author metadata attached to poll summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,
}
