use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

/// The fields of a marketplace post a conversation copies at creation time.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PostSnapshot {
    pub id: Uuid,
    pub title: String,
    pub post_type: String,
    pub author_id: Uuid,
}
