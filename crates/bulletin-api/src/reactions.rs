use std::sync::Arc;

use anyhow::anyhow;
use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::error;
use uuid::Uuid;

use bulletin_types::api::{Claims, ReactRequest};

use crate::auth::AppStateInner;
use crate::error::ApiError;

/// Upsert the caller's single reaction slot on an announcement: a second
/// react replaces the stored emoji. There is no membership or existence
/// check on the target announcement.
pub async fn react(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.emoji.is_empty() {
        return Err(ApiError::Validation("emoji is required".into()));
    }

    let db = state.clone();
    let reaction_id = Uuid::new_v4().to_string();
    let announcement_id = req.announcement_id.to_string();
    let user_id = claims.sub.to_string();
    let emoji = req.emoji;

    tokio::task::spawn_blocking(move || {
        db.db.upsert_reaction(&reaction_id, &announcement_id, &user_id, &emoji)
    })
    .await
    .map_err(|e| { error!("spawn_blocking join error: {}", e); anyhow!("task join error") })??;

    Ok(Json(serde_json::json!({ "status": "Reacted" })))
}
