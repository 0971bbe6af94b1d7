use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LinkRow {
    pub id: Uuid,
    pub short_code: String,
    pub target_url: String,
    pub owner_id: Option<Uuid>,
    pub custom_alias: Option<String>,
    pub is_public: bool,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub click_count: i64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LinkRow {
    /// A link with an expiry strictly in the past no longer redirects.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() > expires_at,
            None => false,
        }
    }
}

/// Fields under the caller's control when inserting a link; everything else
/// (activity flag, counters, timestamps) starts from its column default.
#[derive(Debug, Clone)]
pub struct NewLink {
    pub short_code: String,
    pub target_url: String,
    pub owner_id: Option<Uuid>,
    pub custom_alias: Option<String>,
    pub is_public: bool,
    pub expires_at: Option<DateTime<Utc>>,
}
