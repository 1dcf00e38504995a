use anyhow::Result;
use libsql::Connection;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 2;

/// Run database migrations
///
/// This is the single source of truth for database schema.
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    // Create schema_migrations table first (tracks applied migrations)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    // Check current schema version
    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Initial targets table").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Latest probe result per target").await?;
    }

    tracing::info!("Database migrations completed successfully (now at version {})", SCHEMA_VERSION);
    Ok(())
}

/// Get current schema version from database
async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

/// Record that a migration was applied
async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp_millis();
    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;
    Ok(())
}

/// Migration v1: targets
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    tracing::info!("Running migration v1: targets table");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS targets (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_targets_created_at ON targets(created_at)", ())
        .await?;

    Ok(())
}

/// Migration v2: one probe result row per target
///
/// `probed_at`, `response_time_ms` and `status_code` describe the last
/// successful probe; `attempted_at` and `last_error` the most recent attempt.
async fn run_migration_v2(conn: &Connection) -> Result<()> {
    tracing::info!("Running migration v2: probe_results table");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS probe_results (
            target_id TEXT PRIMARY KEY REFERENCES targets(id) ON DELETE CASCADE,
            probed_at INTEGER,
            response_time_ms INTEGER,
            status_code INTEGER,
            attempted_at INTEGER NOT NULL,
            last_error TEXT
        )",
        (),
    )
    .await?;

    Ok(())
}
