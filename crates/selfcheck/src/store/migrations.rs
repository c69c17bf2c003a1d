use libsql::Connection;
use tracing::info;

use super::StoreError;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 1;

/// Bring the schema up to date. Safe to run from several instances at once.
pub async fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Instances, checks, errors and measurements").await?;
    }

    Ok(())
}

async fn get_current_version(conn: &Connection) -> Result<i32, StoreError> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<(), StoreError> {
    let now = chrono::Utc::now().timestamp();

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Timestamps are microseconds since the Unix epoch.
async fn run_migration_v1(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS instances (
            uuid TEXT PRIMARY KEY,
            hostname TEXT NOT NULL,
            app_id TEXT,
            public_ipv4 TEXT,
            started_at INTEGER NOT NULL,
            stopped_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_instances_app_id ON instances(app_id);

        CREATE TABLE IF NOT EXISTS instance_labels (
            instance_uuid TEXT NOT NULL,
            k TEXT NOT NULL,
            v TEXT NOT NULL,
            PRIMARY KEY (instance_uuid, k)
        );

        CREATE TABLE IF NOT EXISTS checks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            instance_uuid TEXT NOT NULL,
            app_id TEXT,
            ts INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_checks_app_ts ON checks(app_id, ts);
        CREATE INDEX IF NOT EXISTS idx_checks_ts ON checks(ts);

        CREATE TABLE IF NOT EXISTS check_errors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            check_id INTEGER NOT NULL REFERENCES checks(id) ON DELETE CASCADE,
            check_name TEXT NOT NULL,
            error TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_check_errors_name ON check_errors(check_name);

        CREATE TABLE IF NOT EXISTS check_measurements (
            check_id INTEGER NOT NULL REFERENCES checks(id) ON DELETE CASCADE,
            measurement TEXT NOT NULL,
            value REAL NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_check_measurements_name ON check_measurements(measurement);",
    )
    .await?;
    Ok(())
}
