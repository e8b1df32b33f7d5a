/// Database row types — these map directly to SQLite rows.
/// Distinct from bulletin-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub role: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct GroupRow {
    pub id: String,
    pub name: String,
    pub admin_id: String,
    pub invite_code: String,
    pub created_at: String,
}

pub struct MembershipRow {
    pub id: String,
    pub group_id: String,
    pub user_id: String,
    pub role: String,
    pub joined_at: String,
}

/// One row of the "my groups" listing: membership joined against its group.
pub struct MyGroupRow {
    pub group_id: String,
    pub name: String,
    pub invite_code: String,
    pub role: String,
}

pub struct TagRow {
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub usage_count: i64,
}

pub struct AnnouncementRow {
    pub id: String,
    pub group_id: String,
    pub author_id: String,
    pub kind: String,
    pub content: Option<String>,
    pub file_url: Option<String>,
    /// JSON array of tag names, stored denormalized.
    pub tags: String,
    pub created_at: String,
}

pub struct PollOptionRow {
    pub id: String,
    pub announcement_id: String,
    pub option_text: String,
    pub votes: i64,
}

pub struct ReactionRow {
    pub id: String,
    pub announcement_id: String,
    pub user_id: String,
    pub emoji: String,
    pub created_at: String,
}
