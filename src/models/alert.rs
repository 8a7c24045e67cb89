use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A driver broadcast. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Alert {
    pub alert_id: Uuid,
    pub shuttle_id: String,
    pub message: String,
    pub shuttle_name: String, // snapshot of the display name at send time
    pub created_at: DateTime<Utc>,
}
