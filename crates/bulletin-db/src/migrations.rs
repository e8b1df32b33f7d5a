use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            role        TEXT NOT NULL DEFAULT 'STUDENT',
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS groups (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            admin_id    TEXT NOT NULL REFERENCES users(id),
            invite_code TEXT NOT NULL UNIQUE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS memberships (
            id          TEXT PRIMARY KEY,
            group_id    TEXT NOT NULL REFERENCES groups(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            role        TEXT NOT NULL DEFAULT 'MEMBER',
            joined_at   TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(group_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_memberships_user
            ON memberships(user_id);

        CREATE TABLE IF NOT EXISTS tags (
            id          TEXT PRIMARY KEY,
            group_id    TEXT NOT NULL REFERENCES groups(id),
            name        TEXT NOT NULL,
            usage_count INTEGER NOT NULL DEFAULT 0,
            UNIQUE(group_id, name)
        );

        CREATE TABLE IF NOT EXISTS announcements (
            id          TEXT PRIMARY KEY,
            group_id    TEXT NOT NULL REFERENCES groups(id),
            author_id   TEXT NOT NULL REFERENCES users(id),
            kind        TEXT NOT NULL,
            content     TEXT,
            file_url    TEXT,
            tags        TEXT NOT NULL DEFAULT '[]',
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_announcements_group
            ON announcements(group_id, created_at);

        CREATE TABLE IF NOT EXISTS poll_options (
            id              TEXT PRIMARY KEY,
            announcement_id TEXT NOT NULL REFERENCES announcements(id),
            option_text     TEXT NOT NULL
        );

        -- No uniqueness on (option, user): the same user can vote more than
        -- once per poll. Matches the deployed behavior.
        CREATE TABLE IF NOT EXISTS poll_votes (
            id          TEXT PRIMARY KEY,
            option_id   TEXT NOT NULL REFERENCES poll_options(id),
            user_id     TEXT NOT NULL REFERENCES users(id)
        );

        CREATE TABLE IF NOT EXISTS reactions (
            id              TEXT PRIMARY KEY,
            announcement_id TEXT NOT NULL,
            user_id         TEXT NOT NULL REFERENCES users(id),
            emoji           TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(announcement_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_announcement
            ON reactions(announcement_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
