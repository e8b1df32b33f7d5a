use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{GroupRole, UserRole};

// -- JWT Claims --

/// JWT claims carried by every authenticated request. Canonical definition
/// lives here so the REST middleware and handlers share one type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: UserRole,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<UserRole>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub role: UserRole,
    pub token: String,
}

// -- Groups --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct GroupResponse {
    pub id: Uuid,
    pub name: String,
    pub invite_code: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinGroupRequest {
    pub invite_code: String,
}

#[derive(Debug, Serialize)]
pub struct JoinGroupResponse {
    pub message: String,
}

/// One entry of `GET /groups/my`: a group plus the caller's role in it.
#[derive(Debug, Serialize)]
pub struct MyGroupResponse {
    pub id: Uuid,
    pub name: String,
    pub role: GroupRole,
    pub invite_code: String,
}

// -- Announcements --

#[derive(Debug, Serialize)]
pub struct PollOptionResponse {
    pub id: Uuid,
    pub text: String,
    pub votes: u64,
}

#[derive(Debug, Serialize)]
pub struct AnnouncementResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: crate::models::AnnouncementKind,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub tags: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Aggregated across all users: emoji -> number of reactions.
    pub reactions: HashMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_options: Option<Vec<PollOptionResponse>>,
}

// -- Reactions & votes --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactRequest {
    pub announcement_id: Uuid,
    pub emoji: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoteRequest {
    pub option_id: Uuid,
}
