use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, confessions)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                role        TEXT NOT NULL DEFAULT 'user',
                created_at  TEXT NOT NULL,
                last_login  TEXT
            );

            CREATE TABLE confessions (
                id              TEXT PRIMARY KEY,
                content         TEXT NOT NULL,
                audio_content   TEXT,
                content_type    TEXT NOT NULL DEFAULT 'text',
                emotions        TEXT NOT NULL DEFAULT '[]',
                anonymity_level TEXT NOT NULL DEFAULT 'full',
                is_public       INTEGER NOT NULL DEFAULT 1,
                longitude       REAL,
                latitude        REAL,
                tags            TEXT NOT NULL DEFAULT '[]',
                empathy         INTEGER NOT NULL DEFAULT 0,
                support         INTEGER NOT NULL DEFAULT 0,
                relate          INTEGER NOT NULL DEFAULT 0,
                author_id       TEXT REFERENCES users(id) ON DELETE SET NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                CHECK ((longitude IS NULL) = (latitude IS NULL))
            );

            CREATE INDEX idx_confessions_created
                ON confessions(created_at);

            CREATE INDEX idx_confessions_public_created
                ON confessions(is_public, created_at);

            CREATE INDEX idx_confessions_location
                ON confessions(latitude, longitude)
                WHERE latitude IS NOT NULL;

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
