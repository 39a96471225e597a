//! The bucket that holds every user's namespace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A storage bucket. The service runs against exactly one, named in the
/// configuration and created on first start.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    pub id: Uuid,

    /// Bucket name (S3 naming rules).
    pub name: String,

    pub created_at: DateTime<Utc>,
}
