use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use bulletin_db::queries::{JoinOutcome, is_invite_code_collision};
use bulletin_types::api::{
    Claims, CreateGroupRequest, GroupResponse, JoinGroupRequest, JoinGroupResponse,
    MyGroupResponse,
};
use bulletin_types::models::{DEFAULT_TAGS, GroupRole};

use crate::auth::AppStateInner;
use crate::error::ApiError;
use crate::invite::{generate_invite_code, parse_invite};
use crate::timestamps::parse_sqlite_timestamp;

/// Invite-code regeneration attempts before giving up. Collisions in an
/// 8-character alphanumeric space are already vanishingly rare.
const MAX_CODE_ATTEMPTS: u32 = 8;

pub async fn create_group(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !claims.role.is_staff() {
        return Err(ApiError::Permission(
            "Only staff can create announcement groups.".into(),
        ));
    }
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("Group name is required".into()));
    }

    let db = state.clone();
    let admin_id = claims.sub.to_string();
    let name = req.name.clone();

    // Group + ADMIN membership + seeded tags land in one transaction; a lost
    // race on the invite_code UNIQUE constraint is retried with a fresh code.
    let group = tokio::task::spawn_blocking(move || {
        for attempt in 0..MAX_CODE_ATTEMPTS {
            let code = generate_invite_code();
            if db.db.invite_code_taken(&code)? {
                continue;
            }
            match db.db.create_group(&Uuid::new_v4().to_string(), &name, &admin_id, &code, &DEFAULT_TAGS) {
                Ok(group) => return Ok(group),
                // A lost race on the invite_code UNIQUE constraint gets a
                // fresh code; any other failure propagates.
                Err(e) if is_invite_code_collision(&e) => {
                    warn!("invite code collision (attempt {}): {:#}", attempt + 1, e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(anyhow!("could not allocate a unique invite code"))
    })
    .await
    .map_err(|e| { error!("spawn_blocking join error: {}", e); anyhow!("task join error") })??;

    info!("Group '{}' created with invite code {}", group.name, group.invite_code);

    Ok((
        StatusCode::CREATED,
        Json(GroupResponse {
            id: group.id.parse().map_err(|e| anyhow!("corrupt group id: {}", e))?,
            name: group.name,
            invite_code: group.invite_code,
            created_at: parse_sqlite_timestamp(&group.created_at),
        }),
    ))
}

pub async fn join_group(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<JoinGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // The prefix on the submitted string decides the requested role; lookup
    // happens against the bare code.
    let (code, requested_role) = parse_invite(&req.invite_code);

    let db = state.clone();
    let user_id = claims.sub.to_string();

    let result = tokio::task::spawn_blocking(move || {
        let Some(group) = db.db.find_group_by_code(&code)? else {
            return Ok::<_, anyhow::Error>(None);
        };
        let outcome = db.db.apply_join(&group.id, &user_id, &requested_role.to_string())?;
        Ok(Some((group.name, outcome)))
    })
    .await
    .map_err(|e| { error!("spawn_blocking join error: {}", e); anyhow!("task join error") })??;

    let (group_name, outcome) =
        result.ok_or_else(|| ApiError::NotFound("Invalid Invite Link".into()))?;

    let message = match outcome {
        JoinOutcome::Joined { role } => format!("Successfully joined {} as {}", group_name, role),
        JoinOutcome::Upgraded => format!("Successfully upgraded to Admin in {}", group_name),
        JoinOutcome::AlreadyMember => "You are already in this group".to_string(),
    };

    Ok(Json(JoinGroupResponse { message }))
}

pub async fn my_groups(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let user_id = claims.sub.to_string();

    let rows = tokio::task::spawn_blocking(move || db.db.list_my_groups(&user_id))
        .await
        .map_err(|e| { error!("spawn_blocking join error: {}", e); anyhow!("task join error") })??;

    let groups: Vec<MyGroupResponse> = rows
        .into_iter()
        .map(|row| MyGroupResponse {
            id: row.group_id.parse().unwrap_or_else(|e| {
                warn!("Corrupt group id '{}': {}", row.group_id, e);
                Uuid::default()
            }),
            name: row.name,
            role: row.role.parse().unwrap_or_else(|e| {
                warn!("Corrupt membership role: {}", e);
                GroupRole::Member
            }),
            invite_code: row.invite_code,
        })
        .collect();

    Ok(Json(groups))
}
