use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use bulletin_db::models::{MembershipRow, PollOptionRow, ReactionRow};
use bulletin_types::api::{AnnouncementResponse, Claims, PollOptionResponse};
use bulletin_types::models::AnnouncementKind;

use crate::auth::AppStateInner;
use crate::error::ApiError;
use crate::timestamps::parse_sqlite_timestamp;

/// Multipart form fields for `POST /groups/{group_id}/announcements`.
/// `tags` and `poll_options` arrive as JSON array strings, the file as a
/// binary part with its original filename.
#[derive(Default)]
struct AnnouncementForm {
    message_type: Option<String>,
    content: Option<String>,
    tags: Option<String>,
    poll_options: Option<String>,
    file_name: Option<String>,
    file_bytes: Option<Vec<u8>>,
}

async fn read_form(mut multipart: Multipart) -> Result<AnnouncementForm, ApiError> {
    let mut form = AnnouncementForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::Validation("Malformed multipart form".into()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match name.as_str() {
            "message_type" => form.message_type = Some(read_text(field).await?),
            "content" => form.content = Some(read_text(field).await?),
            "tags" => form.tags = Some(read_text(field).await?),
            "poll_options" => form.poll_options = Some(read_text(field).await?),
            "file" => {
                form.file_name = field.file_name().map(str::to_string);
                form.file_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|_| ApiError::Validation("Malformed file part".into()))?
                        .to_vec(),
                );
            }
            other => {
                warn!("Ignoring unknown form field '{}'", other);
            }
        }
    }

    Ok(form)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|_| ApiError::Validation("Malformed multipart form".into()))
}

pub async fn create_announcement(
    State(state): State<Arc<AppStateInner>>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_form(multipart).await?;

    // Only an ADMIN member of the group may post.
    let db = state.clone();
    let gid = group_id.to_string();
    let uid = claims.sub.to_string();
    let membership = tokio::task::spawn_blocking(move || db.db.get_membership(&gid, &uid))
        .await
        .map_err(|e| { error!("spawn_blocking join error: {}", e); anyhow!("task join error") })??;

    require_admin(membership.as_ref())?;

    let (kind, tags, poll_options) = validate_form(&form)?;

    // Attachment bytes go to disk first; only the URL path reaches the row.
    let file_url = match form.file_bytes {
        Some(bytes) => Some(
            state
                .storage
                .save_attachment(form.file_name.as_deref(), &bytes)
                .await?,
        ),
        None => None,
    };

    let db = state.clone();
    let announcement_id = Uuid::new_v4().to_string();
    let gid = group_id.to_string();
    let uid = claims.sub.to_string();
    let content = form.content;
    tokio::task::spawn_blocking(move || {
        db.db.create_announcement(
            &announcement_id,
            &gid,
            &uid,
            &kind.to_string(),
            content.as_deref(),
            file_url.as_deref(),
            &tags,
            &poll_options,
        )
    })
    .await
    .map_err(|e| { error!("spawn_blocking join error: {}", e); anyhow!("task join error") })??;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "message": "Announcement created" })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub tag: Option<String>,
}

pub async fn list_announcements(
    State(state): State<Arc<AppStateInner>>,
    Path(group_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let gid = group_id.to_string();
    let uid = claims.sub.to_string();

    let (rows, reaction_rows, option_rows) = tokio::task::spawn_blocking(move || {
        if db.db.get_membership(&gid, &uid)?.is_none() {
            return Ok(None);
        }

        let rows = db.db.list_announcements(&gid)?;
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let reaction_rows = db.db.get_reactions_for_announcements(&ids)?;
        let option_rows = db.db.get_poll_options_for_announcements(&ids)?;

        Ok::<_, anyhow::Error>(Some((rows, reaction_rows, option_rows)))
    })
    .await
    .map_err(|e| { error!("spawn_blocking join error: {}", e); anyhow!("task join error") })??
    .ok_or_else(|| ApiError::Permission("Not a member".into()))?;

    let reactions_by_announcement = reaction_counts(&reaction_rows);
    let mut options_by_announcement = poll_options_by_announcement(option_rows);

    let announcements: Vec<AnnouncementResponse> = rows
        .into_iter()
        .filter_map(|row| {
            let tags: Vec<String> = serde_json::from_str(&row.tags).unwrap_or_else(|e| {
                warn!("Corrupt tag list on announcement '{}': {}", row.id, e);
                vec![]
            });

            if !matches_tag_filter(&tags, query.tag.as_deref()) {
                return None;
            }

            let kind: AnnouncementKind = row.kind.parse().unwrap_or_else(|e| {
                warn!("Corrupt kind on announcement '{}': {}", row.id, e);
                AnnouncementKind::Text
            });

            let poll_options = (kind == AnnouncementKind::Poll)
                .then(|| options_by_announcement.remove(&row.id).unwrap_or_default());

            Some(AnnouncementResponse {
                id: row.id.parse().unwrap_or_else(|e| {
                    warn!("Corrupt announcement id '{}': {}", row.id, e);
                    Uuid::default()
                }),
                kind,
                content: row.content,
                file_url: row.file_url,
                tags,
                created_at: parse_sqlite_timestamp(&row.created_at),
                reactions: reactions_by_announcement.get(&row.id).cloned().unwrap_or_default(),
                poll_options,
            })
        })
        .collect();

    Ok(Json(announcements))
}

/// Only an ADMIN member of the group may post.
fn require_admin(membership: Option<&MembershipRow>) -> Result<(), ApiError> {
    if membership.is_some_and(|m| m.role == "ADMIN") {
        Ok(())
    } else {
        Err(ApiError::Permission("Only admins can send announcements.".into()))
    }
}

/// Check the submitted fields and decode the JSON-array parts. An empty or
/// missing tag list fails here, before anything touches the store.
fn validate_form(form: &AnnouncementForm) -> Result<(AnnouncementKind, Vec<String>, Vec<String>), ApiError> {
    let kind: AnnouncementKind = form
        .message_type
        .as_deref()
        .ok_or_else(|| ApiError::Validation("message_type is required".into()))?
        .parse()
        .map_err(|_| ApiError::Validation("Unknown message type".into()))?;

    let tags: Vec<String> = form
        .tags
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|_| ApiError::Validation("tags must be a JSON array of strings".into()))?
        .unwrap_or_default();
    if tags.is_empty() {
        return Err(ApiError::Validation("At least one tag is required.".into()));
    }

    // Options only apply to polls; anything sent alongside TEXT/FILE is dropped.
    let poll_options: Vec<String> = if kind == AnnouncementKind::Poll {
        form.poll_options
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|_| ApiError::Validation("poll_options must be a JSON array of strings".into()))?
            .unwrap_or_default()
    } else {
        vec![]
    };

    Ok((kind, tags, poll_options))
}

/// Exact, case-sensitive membership test; no filter matches everything.
fn matches_tag_filter(tags: &[String], filter: Option<&str>) -> bool {
    match filter {
        Some(filter) => tags.iter().any(|t| t == filter),
        None => true,
    }
}

/// Group reactions by announcement, then aggregate per emoji.
fn reaction_counts(rows: &[ReactionRow]) -> HashMap<String, HashMap<String, u64>> {
    let mut map: HashMap<String, HashMap<String, u64>> = HashMap::new();
    for r in rows {
        *map.entry(r.announcement_id.clone())
            .or_default()
            .entry(r.emoji.clone())
            .or_insert(0) += 1;
    }
    map
}

fn poll_options_by_announcement(rows: Vec<PollOptionRow>) -> HashMap<String, Vec<PollOptionResponse>> {
    let mut map: HashMap<String, Vec<PollOptionResponse>> = HashMap::new();
    for row in rows {
        map.entry(row.announcement_id).or_default().push(PollOptionResponse {
            id: row.id.parse().unwrap_or_else(|e| {
                warn!("Corrupt poll option id: {}", e);
                Uuid::default()
            }),
            text: row.option_text,
            votes: row.votes.max(0) as u64,
        });
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn membership(role: &str) -> MembershipRow {
        MembershipRow {
            id: Uuid::new_v4().to_string(),
            group_id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            role: role.to_string(),
            joined_at: "2026-08-25 09:30:00".to_string(),
        }
    }

    fn form(message_type: &str, tags: Option<&str>, poll_options: Option<&str>) -> AnnouncementForm {
        AnnouncementForm {
            message_type: Some(message_type.to_string()),
            tags: tags.map(str::to_string),
            poll_options: poll_options.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn only_admin_members_may_post() {
        assert!(matches!(
            require_admin(None),
            Err(ApiError::Permission(_))
        ));
        assert!(matches!(
            require_admin(Some(&membership("MEMBER"))),
            Err(ApiError::Permission(_))
        ));
        assert!(require_admin(Some(&membership("ADMIN"))).is_ok());
    }

    #[test]
    fn empty_tag_list_is_rejected_before_persisting() {
        // validate_form runs before any store call, so a Validation error
        // here means no announcement row is ever written.
        assert!(matches!(
            validate_form(&form("TEXT", Some("[]"), None)),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            validate_form(&form("TEXT", None, None)),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn valid_form_decodes_tags_and_poll_options() {
        let (kind, tags, options) =
            validate_form(&form("POLL", Some(r#"["Notice"]"#), Some(r#"["Mon","Fri"]"#))).unwrap();
        assert_eq!(kind, AnnouncementKind::Poll);
        assert_eq!(tags, ["Notice"]);
        assert_eq!(options, ["Mon", "Fri"]);

        // Options sent alongside a non-poll kind are dropped.
        let (_, _, options) =
            validate_form(&form("TEXT", Some(r#"["Notice"]"#), Some(r#"["Mon"]"#))).unwrap();
        assert!(options.is_empty());
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        assert!(matches!(
            validate_form(&form("VIDEO", Some(r#"["Notice"]"#), None)),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn tag_filter_is_exact_and_case_sensitive() {
        let tags = vec!["Notice".to_string(), "Time Table".to_string()];
        assert!(matches_tag_filter(&tags, Some("Notice")));
        assert!(!matches_tag_filter(&tags, Some("notice")));
        assert!(!matches_tag_filter(&tags, Some("Not")));
        assert!(!matches_tag_filter(&tags, Some("NOTICE")));
        assert!(matches_tag_filter(&tags, None));
        assert!(!matches_tag_filter(&[], Some("Notice")));
    }

    fn reaction(announcement_id: &str, user_id: &str, emoji: &str) -> ReactionRow {
        ReactionRow {
            id: Uuid::new_v4().to_string(),
            announcement_id: announcement_id.to_string(),
            user_id: user_id.to_string(),
            emoji: emoji.to_string(),
            created_at: "2026-08-25 09:30:00".to_string(),
        }
    }

    #[test]
    fn reactions_aggregate_per_emoji() {
        let rows = vec![
            reaction("a1", "u1", "👍"),
            reaction("a1", "u2", "👍"),
            reaction("a1", "u3", "❤️"),
            reaction("a2", "u1", "🎉"),
        ];

        let counts = reaction_counts(&rows);
        assert_eq!(counts["a1"]["👍"], 2);
        assert_eq!(counts["a1"]["❤️"], 1);
        assert_eq!(counts["a2"]["🎉"], 1);
        assert!(!counts.contains_key("a3"));
    }

    #[test]
    fn poll_options_keep_arrival_order() {
        let rows = vec![
            PollOptionRow {
                id: Uuid::new_v4().to_string(),
                announcement_id: "a1".to_string(),
                option_text: "Monday".to_string(),
                votes: 3,
            },
            PollOptionRow {
                id: Uuid::new_v4().to_string(),
                announcement_id: "a1".to_string(),
                option_text: "Friday".to_string(),
                votes: 0,
            },
        ];

        let map = poll_options_by_announcement(rows);
        let options = &map["a1"];
        assert_eq!(options[0].text, "Monday");
        assert_eq!(options[0].votes, 3);
        assert_eq!(options[1].text, "Friday");
    }
}
