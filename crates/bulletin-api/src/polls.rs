use std::sync::Arc;

use anyhow::anyhow;
use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::error;
use uuid::Uuid;

use bulletin_types::api::{Claims, VoteRequest};

use crate::auth::AppStateInner;
use crate::error::ApiError;

/// Record a vote for a poll option. Votes are append-only and nothing stops
/// the same user voting again for the same poll.
pub async fn vote(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<VoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let vote_id = Uuid::new_v4().to_string();
    let option_id = req.option_id.to_string();
    let user_id = claims.sub.to_string();

    let found = tokio::task::spawn_blocking(move || {
        if db.db.get_poll_option(&option_id)?.is_none() {
            return Ok(false);
        }
        db.db.insert_poll_vote(&vote_id, &option_id, &user_id)?;
        Ok::<_, anyhow::Error>(true)
    })
    .await
    .map_err(|e| { error!("spawn_blocking join error: {}", e); anyhow!("task join error") })??;

    if !found {
        return Err(ApiError::NotFound("Poll option not found".into()));
    }

    Ok(Json(serde_json::json!({ "status": "Voted" })))
}
