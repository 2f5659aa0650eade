use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

/// Public profile used to decorate conversations. Owned by the account service.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: String,
    pub username: String,
    pub profile_picture: Option<String>,
}

impl UserProfile {
    /// Placeholder for a participant whose account no longer resolves.
    pub fn unavailable(id: Uuid) -> Self {
        UserProfile {
            id,
            display_name: "Deleted user".to_string(),
            username: String::new(),
            profile_picture: None,
        }
    }
}
