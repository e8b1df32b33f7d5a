use crate::Database;
use crate::models::{
    AnnouncementRow, GroupRow, MembershipRow, MyGroupRow, PollOptionRow, ReactionRow, TagRow,
    UserRow,
};
use anyhow::Result;
use rusqlite::Connection;
use uuid::Uuid;

/// What happened when a user presented an invite code for a group.
#[derive(Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A new membership was created with the given role.
    Joined { role: String },
    /// An existing MEMBER was upgraded to ADMIN.
    Upgraded,
    /// Already a member, nothing changed.
    AlreadyMember,
}

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str, role: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, role) VALUES (?1, ?2, ?3, ?4)",
                (id, username, password_hash, role),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    // -- Groups & memberships --

    /// Whether any group already uses this invite code. Used to regenerate
    /// before insert; the UNIQUE constraint is the real guarantee.
    pub fn invite_code_taken(&self, code: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM groups WHERE invite_code = ?1",
                [code],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Create a group, make the creator an ADMIN member and seed the default
    /// tag set, all in one transaction.
    pub fn create_group(
        &self,
        group_id: &str,
        name: &str,
        admin_id: &str,
        invite_code: &str,
        default_tags: &[&str],
    ) -> Result<GroupRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO groups (id, name, admin_id, invite_code) VALUES (?1, ?2, ?3, ?4)",
                (group_id, name, admin_id, invite_code),
            )?;
            tx.execute(
                "INSERT INTO memberships (id, group_id, user_id, role) VALUES (?1, ?2, ?3, 'ADMIN')",
                (Uuid::new_v4().to_string(), group_id, admin_id),
            )?;
            for tag in default_tags {
                tx.execute(
                    "INSERT INTO tags (id, group_id, name, usage_count) VALUES (?1, ?2, ?3, 0)",
                    (Uuid::new_v4().to_string(), group_id, tag),
                )?;
            }

            let group = tx.query_row(
                "SELECT id, name, admin_id, invite_code, created_at FROM groups WHERE id = ?1",
                [group_id],
                map_group_row,
            )?;

            tx.commit()?;
            Ok(group)
        })
    }

    pub fn find_group_by_code(&self, invite_code: &str) -> Result<Option<GroupRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, admin_id, invite_code, created_at FROM groups WHERE invite_code = ?1",
                    [invite_code],
                    map_group_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_membership(&self, group_id: &str, user_id: &str) -> Result<Option<MembershipRow>> {
        self.with_conn(|conn| query_membership(conn, group_id, user_id))
    }

    /// Apply a join request against existing membership state. Upgrades a
    /// non-admin in place when ADMIN was requested; never downgrades.
    pub fn apply_join(&self, group_id: &str, user_id: &str, requested_role: &str) -> Result<JoinOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing = tx
                .query_row(
                    "SELECT id, group_id, user_id, role, joined_at FROM memberships
                     WHERE group_id = ?1 AND user_id = ?2",
                    (group_id, user_id),
                    map_membership_row,
                )
                .optional()?;

            let outcome = match existing {
                Some(membership) => {
                    if membership.role != "ADMIN" && requested_role == "ADMIN" {
                        tx.execute(
                            "UPDATE memberships SET role = 'ADMIN' WHERE id = ?1",
                            [&membership.id],
                        )?;
                        JoinOutcome::Upgraded
                    } else {
                        JoinOutcome::AlreadyMember
                    }
                }
                None => {
                    tx.execute(
                        "INSERT INTO memberships (id, group_id, user_id, role) VALUES (?1, ?2, ?3, ?4)",
                        (Uuid::new_v4().to_string(), group_id, user_id, requested_role),
                    )?;
                    JoinOutcome::Joined {
                        role: requested_role.to_string(),
                    }
                }
            };

            tx.commit()?;
            Ok(outcome)
        })
    }

    pub fn list_my_groups(&self, user_id: &str) -> Result<Vec<MyGroupRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.name, g.invite_code, m.role
                 FROM memberships m
                 JOIN groups g ON g.id = m.group_id
                 WHERE m.user_id = ?1",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(MyGroupRow {
                        group_id: row.get(0)?,
                        name: row.get(1)?,
                        invite_code: row.get(2)?,
                        role: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Announcements --

    /// Persist an announcement plus its poll options and tag-counter updates
    /// as one transaction. Tags already known to the group are incremented,
    /// unknown ones are created with usage_count = 1.
    pub fn create_announcement(
        &self,
        id: &str,
        group_id: &str,
        author_id: &str,
        kind: &str,
        content: Option<&str>,
        file_url: Option<&str>,
        tags: &[String],
        poll_options: &[String],
    ) -> Result<()> {
        let tags_json = serde_json::to_string(tags)?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO announcements (id, group_id, author_id, kind, content, file_url, tags)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                (id, group_id, author_id, kind, content, file_url, &tags_json),
            )?;

            for option in poll_options {
                tx.execute(
                    "INSERT INTO poll_options (id, announcement_id, option_text) VALUES (?1, ?2, ?3)",
                    (Uuid::new_v4().to_string(), id, option),
                )?;
            }

            for tag in tags {
                let updated = tx.execute(
                    "UPDATE tags SET usage_count = usage_count + 1 WHERE group_id = ?1 AND name = ?2",
                    (group_id, tag),
                )?;
                if updated == 0 {
                    tx.execute(
                        "INSERT INTO tags (id, group_id, name, usage_count) VALUES (?1, ?2, ?3, 1)",
                        (Uuid::new_v4().to_string(), group_id, tag),
                    )?;
                }
            }

            tx.commit()?;
            Ok(())
        })
    }

    pub fn list_announcements(&self, group_id: &str) -> Result<Vec<AnnouncementRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, group_id, author_id, kind, content, file_url, tags, created_at
                 FROM announcements
                 WHERE group_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;

            let rows = stmt
                .query_map([group_id], |row| {
                    Ok(AnnouncementRow {
                        id: row.get(0)?,
                        group_id: row.get(1)?,
                        author_id: row.get(2)?,
                        kind: row.get(3)?,
                        content: row.get(4)?,
                        file_url: row.get(5)?,
                        tags: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Batch-fetch reactions for a set of announcement IDs.
    pub fn get_reactions_for_announcements(&self, announcement_ids: &[String]) -> Result<Vec<ReactionRow>> {
        if announcement_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=announcement_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, announcement_id, user_id, emoji, created_at FROM reactions WHERE announcement_id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = announcement_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(ReactionRow {
                        id: row.get(0)?,
                        announcement_id: row.get(1)?,
                        user_id: row.get(2)?,
                        emoji: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Batch-fetch poll options (with vote counts) for a set of announcement IDs.
    pub fn get_poll_options_for_announcements(&self, announcement_ids: &[String]) -> Result<Vec<PollOptionRow>> {
        if announcement_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=announcement_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT o.id, o.announcement_id, o.option_text, COUNT(v.id)
                 FROM poll_options o
                 LEFT JOIN poll_votes v ON v.option_id = o.id
                 WHERE o.announcement_id IN ({})
                 GROUP BY o.id
                 ORDER BY o.rowid ASC",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = announcement_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(PollOptionRow {
                        id: row.get(0)?,
                        announcement_id: row.get(1)?,
                        option_text: row.get(2)?,
                        votes: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Reactions --

    /// One reaction slot per (announcement, user): inserting over an existing
    /// reaction replaces its emoji.
    pub fn upsert_reaction(&self, id: &str, announcement_id: &str, user_id: &str, emoji: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO reactions (id, announcement_id, user_id, emoji)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(announcement_id, user_id) DO UPDATE SET emoji = excluded.emoji",
                (id, announcement_id, user_id, emoji),
            )?;
            Ok(())
        })
    }

    // -- Poll votes --

    pub fn get_poll_option(&self, option_id: &str) -> Result<Option<PollOptionRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT o.id, o.announcement_id, o.option_text, COUNT(v.id)
                     FROM poll_options o
                     LEFT JOIN poll_votes v ON v.option_id = o.id
                     WHERE o.id = ?1
                     GROUP BY o.id",
                    [option_id],
                    |row| {
                        Ok(PollOptionRow {
                            id: row.get(0)?,
                            announcement_id: row.get(1)?,
                            option_text: row.get(2)?,
                            votes: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// No dedup: a user voting twice produces two rows. See migrations.rs.
    pub fn insert_poll_vote(&self, id: &str, option_id: &str, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO poll_votes (id, option_id, user_id) VALUES (?1, ?2, ?3)",
                (id, option_id, user_id),
            )?;
            Ok(())
        })
    }

    // -- Tags --

    pub fn list_tags(&self, group_id: &str) -> Result<Vec<TagRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, group_id, name, usage_count FROM tags WHERE group_id = ?1 ORDER BY rowid ASC",
            )?;

            let rows = stmt
                .query_map([group_id], |row| {
                    Ok(TagRow {
                        id: row.get(0)?,
                        group_id: row.get(1)?,
                        name: row.get(2)?,
                        usage_count: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password, role, created_at FROM users WHERE username = ?1")?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                role: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_membership(conn: &Connection, group_id: &str, user_id: &str) -> Result<Option<MembershipRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, group_id, user_id, role, joined_at FROM memberships
         WHERE group_id = ?1 AND user_id = ?2",
    )?;

    let row = stmt
        .query_row((group_id, user_id), map_membership_row)
        .optional()?;

    Ok(row)
}

fn map_group_row(row: &rusqlite::Row<'_>) -> std::result::Result<GroupRow, rusqlite::Error> {
    Ok(GroupRow {
        id: row.get(0)?,
        name: row.get(1)?,
        admin_id: row.get(2)?,
        invite_code: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn map_membership_row(row: &rusqlite::Row<'_>) -> std::result::Result<MembershipRow, rusqlite::Error> {
    Ok(MembershipRow {
        id: row.get(0)?,
        group_id: row.get(1)?,
        user_id: row.get(2)?,
        role: row.get(3)?,
        joined_at: row.get(4)?,
    })
}

/// Whether an error is the `groups.invite_code` UNIQUE violation — the one
/// `create_group` failure callers may retry with a fresh code. Anything else
/// (foreign keys, I/O) must propagate.
pub fn is_invite_code_collision(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<rusqlite::Error>() {
        Some(rusqlite::Error::SqliteFailure(e, Some(msg))) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains("groups.invite_code")
        }
        _ => false,
    }
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulletin_types::models::DEFAULT_TAGS;
    use std::path::Path;

    fn test_db() -> Database {
        Database::open(Path::new(":memory:")).unwrap()
    }

    fn add_user(db: &Database, username: &str, role: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_user(&id, username, "hash", role).unwrap();
        id
    }

    fn make_group(db: &Database, admin_id: &str, code: &str) -> GroupRow {
        db.create_group(
            &Uuid::new_v4().to_string(),
            "CS101",
            admin_id,
            code,
            &DEFAULT_TAGS,
        )
        .unwrap()
    }

    #[test]
    fn create_group_seeds_admin_and_default_tags() {
        let db = test_db();
        let staff = add_user(&db, "prof", "TEACHER");
        let group = make_group(&db, &staff, "XYZ123");

        let membership = db.get_membership(&group.id, &staff).unwrap().unwrap();
        assert_eq!(membership.role, "ADMIN");

        let tags = db.list_tags(&group.id).unwrap();
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, DEFAULT_TAGS);
        assert!(tags.iter().all(|t| t.usage_count == 0));
    }

    #[test]
    fn duplicate_invite_code_is_rejected() {
        let db = test_db();
        let staff = add_user(&db, "prof", "TEACHER");
        make_group(&db, &staff, "SAME01");

        let result = db.create_group(
            &Uuid::new_v4().to_string(),
            "CS102",
            &staff,
            "SAME01",
            &DEFAULT_TAGS,
        );
        let err = result.unwrap_err();
        assert!(is_invite_code_collision(&err));
        assert!(db.invite_code_taken("SAME01").unwrap());
        assert!(!db.invite_code_taken("OTHER1").unwrap());
    }

    #[test]
    fn non_collision_errors_are_not_classified_as_collisions() {
        let db = test_db();
        // Unknown admin trips the foreign key, not the invite_code UNIQUE.
        let result = db.create_group(
            &Uuid::new_v4().to_string(),
            "CS101",
            "no-such-user",
            "XYZ123",
            &DEFAULT_TAGS,
        );
        let err = result.unwrap_err();
        assert!(!is_invite_code_collision(&err));
    }

    #[test]
    fn join_creates_upgrades_and_never_duplicates() {
        let db = test_db();
        let staff = add_user(&db, "prof", "TEACHER");
        let student = add_user(&db, "alice", "STUDENT");
        let group = make_group(&db, &staff, "XYZ123");

        let outcome = db.apply_join(&group.id, &student, "MEMBER").unwrap();
        assert_eq!(outcome, JoinOutcome::Joined { role: "MEMBER".into() });

        // Same code, same role: no-op.
        let outcome = db.apply_join(&group.id, &student, "MEMBER").unwrap();
        assert_eq!(outcome, JoinOutcome::AlreadyMember);

        // Admin link upgrades in place.
        let outcome = db.apply_join(&group.id, &student, "ADMIN").unwrap();
        assert_eq!(outcome, JoinOutcome::Upgraded);
        let membership = db.get_membership(&group.id, &student).unwrap().unwrap();
        assert_eq!(membership.role, "ADMIN");

        // Standard link never downgrades an admin.
        let outcome = db.apply_join(&group.id, &student, "MEMBER").unwrap();
        assert_eq!(outcome, JoinOutcome::AlreadyMember);
        let membership = db.get_membership(&group.id, &student).unwrap().unwrap();
        assert_eq!(membership.role, "ADMIN");

        let my_groups = db.list_my_groups(&student).unwrap();
        assert_eq!(my_groups.len(), 1);
        assert_eq!(my_groups[0].invite_code, "XYZ123");
    }

    #[test]
    fn announcement_updates_tag_counters() {
        let db = test_db();
        let staff = add_user(&db, "prof", "TEACHER");
        let group = make_group(&db, &staff, "XYZ123");

        db.create_announcement(
            &Uuid::new_v4().to_string(),
            &group.id,
            &staff,
            "TEXT",
            Some("Exam on Friday"),
            None,
            &["Notice".to_string(), "Exams".to_string()],
            &[],
        )
        .unwrap();

        let tags = db.list_tags(&group.id).unwrap();
        let notice = tags.iter().find(|t| t.name == "Notice").unwrap();
        assert_eq!(notice.usage_count, 1);
        // Unknown tag created lazily with count 1.
        let exams = tags.iter().find(|t| t.name == "Exams").unwrap();
        assert_eq!(exams.usage_count, 1);
        let placement = tags.iter().find(|t| t.name == "Placement").unwrap();
        assert_eq!(placement.usage_count, 0);
    }

    #[test]
    fn announcements_list_in_creation_order() {
        let db = test_db();
        let staff = add_user(&db, "prof", "TEACHER");
        let group = make_group(&db, &staff, "XYZ123");

        for content in ["first", "second", "third"] {
            db.create_announcement(
                &Uuid::new_v4().to_string(),
                &group.id,
                &staff,
                "TEXT",
                Some(content),
                None,
                &["Notice".to_string()],
                &[],
            )
            .unwrap();
        }

        let rows = db.list_announcements(&group.id).unwrap();
        let contents: Vec<&str> = rows.iter().filter_map(|r| r.content.as_deref()).collect();
        assert_eq!(contents, ["first", "second", "third"]);
    }

    #[test]
    fn poll_options_persist_with_vote_counts() {
        let db = test_db();
        let staff = add_user(&db, "prof", "TEACHER");
        let voter = add_user(&db, "bob", "STUDENT");
        let group = make_group(&db, &staff, "XYZ123");
        let ann_id = Uuid::new_v4().to_string();

        db.create_announcement(
            &ann_id,
            &group.id,
            &staff,
            "POLL",
            Some("Best day for the seminar?"),
            None,
            &["Notice".to_string()],
            &["Monday".to_string(), "Friday".to_string()],
        )
        .unwrap();

        let options = db.get_poll_options_for_announcements(&[ann_id.clone()]).unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].option_text, "Monday");
        assert_eq!(options[0].votes, 0);

        db.insert_poll_vote(&Uuid::new_v4().to_string(), &options[1].id, &voter).unwrap();
        let option = db.get_poll_option(&options[1].id).unwrap().unwrap();
        assert_eq!(option.votes, 1);
    }

    #[test]
    fn duplicate_poll_votes_are_not_rejected() {
        // Known gap: nothing stops a user voting twice for the same option.
        let db = test_db();
        let staff = add_user(&db, "prof", "TEACHER");
        let voter = add_user(&db, "bob", "STUDENT");
        let group = make_group(&db, &staff, "XYZ123");
        let ann_id = Uuid::new_v4().to_string();

        db.create_announcement(
            &ann_id,
            &group.id,
            &staff,
            "POLL",
            Some("Quorum?"),
            None,
            &["Notice".to_string()],
            &["Yes".to_string()],
        )
        .unwrap();

        let options = db.get_poll_options_for_announcements(&[ann_id]).unwrap();
        db.insert_poll_vote(&Uuid::new_v4().to_string(), &options[0].id, &voter).unwrap();
        db.insert_poll_vote(&Uuid::new_v4().to_string(), &options[0].id, &voter).unwrap();

        let option = db.get_poll_option(&options[0].id).unwrap().unwrap();
        assert_eq!(option.votes, 2);
    }

    #[test]
    fn second_reaction_replaces_the_first() {
        let db = test_db();
        let user = add_user(&db, "alice", "STUDENT");
        let ann_id = Uuid::new_v4().to_string();

        db.upsert_reaction(&Uuid::new_v4().to_string(), &ann_id, &user, "👍").unwrap();
        db.upsert_reaction(&Uuid::new_v4().to_string(), &ann_id, &user, "❤️").unwrap();

        let rows = db.get_reactions_for_announcements(&[ann_id]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].emoji, "❤️");
    }
}
