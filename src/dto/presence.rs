use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{dao::models::PresenceEntity, dto::format_system_time};

/// Body of `POST /matches/{id}/presence`: claim the scorer role.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PresenceRequest {
    /// Device claiming the scorer role.
    #[validate(length(min = 1, max = 128))]
    pub device_id: String,
    /// User claiming the scorer role.
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
    /// Take the role over from another device, if one holds it.
    #[serde(default)]
    pub takeover: bool,
}

/// Current scorer registration for a match.
#[derive(Debug, Serialize, ToSchema)]
pub struct PresenceResponse {
    /// The live match.
    pub match_id: Uuid,
    /// Device holding the scorer role.
    pub device_id: String,
    /// User holding the scorer role.
    pub user_id: String,
    /// When the registration was made, RFC 3339.
    pub since: String,
}

impl From<&PresenceEntity> for PresenceResponse {
    fn from(entity: &PresenceEntity) -> Self {
        Self {
            match_id: entity.match_id,
            device_id: entity.device_id.clone(),
            user_id: entity.user_id.clone(),
            since: format_system_time(entity.since),
        }
    }
}
