use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Database, params};
use tracing::debug;

use super::migrations::run_migrations;
use super::pool::{LibsqlManager, LibsqlPool};
use super::{Store, StoreError};
use crate::context::RunContext;
use crate::gap::{GapAnalyzer, GapQuery, GapRecord};
use crate::types::{CheckResult, Instance};

/// Longest error text kept per row.
const MAX_ERROR_LEN: usize = 512;

/// Open a libsql database: remote for `libsql://` and `http(s)://` URLs,
/// a local file otherwise.
pub async fn open_database(url: &str, auth_token: Option<&str>) -> Result<Database, libsql::Error> {
    if url.starts_with("libsql://") || url.starts_with("http://") || url.starts_with("https://") {
        return Builder::new_remote(url.to_string(), auth_token.unwrap_or_default().to_string())
            .build()
            .await;
    }
    let path = url.strip_prefix("file://").or_else(|| url.strip_prefix("file:")).unwrap_or(url);
    Builder::new_local(path).build().await
}

/// libsql-backed store with pooled connections.
pub struct LibsqlStore {
    pool: LibsqlPool,
}

impl LibsqlStore {
    /// Connect, validate with a round trip and run migrations.
    pub async fn open(url: &str, auth_token: Option<&str>) -> Result<Self, StoreError> {
        let database = open_database(url, auth_token).await?;
        let pool = LibsqlPool::builder(LibsqlManager::new(database)).build()?;
        let conn = pool.get().await?;
        run_migrations(&conn).await?;
        drop(conn);
        Ok(Self { pool })
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>, StoreError> {
        Ok(self.pool.get().await?)
    }
}

fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn from_micros(us: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(us)
        .ok_or_else(|| StoreError::InvalidData(format!("timestamp {us} out of range")))
}

/// Cut `s` to at most [`MAX_ERROR_LEN`] bytes on a char boundary.
fn truncate_error(s: &str) -> &str {
    if s.len() <= MAX_ERROR_LEN {
        return s;
    }
    let mut end = MAX_ERROR_LEN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

async fn insert_check_result(conn: &Connection, result: &CheckResult) -> Result<(), StoreError> {
    let tx = conn.transaction().await?;
    tx.execute(
        "INSERT INTO checks (instance_uuid, app_id, ts) VALUES (?, ?, ?)",
        params![result.instance_id.to_string(), result.app_id.clone(), to_micros(result.timestamp)],
    )
    .await?;
    let check_id = tx.last_insert_rowid();

    for e in &result.errors {
        tx.execute(
            "INSERT INTO check_errors (check_id, check_name, error) VALUES (?, ?, ?)",
            params![check_id, e.check.clone(), truncate_error(&e.error).to_string()],
        )
        .await?;
    }
    for m in &result.measurements {
        tx.execute(
            "INSERT INTO check_measurements (check_id, measurement, value) VALUES (?, ?, ?)",
            params![check_id, m.check.clone(), m.value],
        )
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

async fn upsert_instance(conn: &Connection, instance: &Instance) -> Result<(), StoreError> {
    let uuid = instance.uuid.to_string();
    conn.execute(
        "INSERT INTO instances (uuid, hostname, app_id, public_ipv4, started_at, stopped_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(uuid) DO UPDATE SET
            hostname = excluded.hostname,
            app_id = excluded.app_id,
            public_ipv4 = COALESCE(excluded.public_ipv4, instances.public_ipv4),
            started_at = excluded.started_at,
            stopped_at = excluded.stopped_at",
        params![
            uuid.clone(),
            instance.hostname.clone(),
            instance.app_id.clone(),
            instance.public_ipv4.clone(),
            to_micros(instance.started_at),
            instance.stopped_at.map(to_micros)
        ],
    )
    .await?;

    // Removed labels are left in place.
    for (k, v) in &instance.labels {
        conn.execute(
            "INSERT INTO instance_labels (instance_uuid, k, v) VALUES (?, ?, ?)
             ON CONFLICT(instance_uuid, k) DO UPDATE SET v = excluded.v",
            params![uuid.clone(), k.clone(), v.clone()],
        )
        .await?;
    }
    Ok(())
}

async fn scan_gaps(
    conn: &Connection,
    query: &GapQuery,
    output: &mut (dyn FnMut(GapRecord) + Send),
) -> Result<(), StoreError> {
    let mut sql = String::from(
        "SELECT app_id, ts FROM checks WHERE ts >= ? AND ts <= ? AND app_id IS NOT NULL",
    );
    let mut values = vec![
        libsql::Value::Integer(to_micros(query.start)),
        libsql::Value::Integer(to_micros(query.end)),
    ];
    if !query.apps.is_empty() {
        let placeholders = vec!["?"; query.apps.len()].join(", ");
        sql.push_str(&format!(" AND app_id IN ({placeholders})"));
        values.extend(query.apps.iter().cloned().map(libsql::Value::Text));
    }
    sql.push_str(" ORDER BY app_id, ts ASC");

    let mut rows = conn.query(&sql, values).await?;
    let mut analyzer = GapAnalyzer::new();
    let mut scanned = 0usize;
    while let Some(row) = rows.next().await? {
        let app_id: String = row.get(0)?;
        let ts = from_micros(row.get::<i64>(1)?)?;
        scanned += 1;
        if let Some(record) = analyzer.observe(&app_id, ts) {
            output(record);
        }
    }
    if let Some(record) = analyzer.finish() {
        output(record);
    }
    debug!(rows = scanned, "gap scan finished");
    Ok(())
}

#[async_trait]
impl Store for LibsqlStore {
    async fn save_check_result(&self, ctx: &RunContext, result: &CheckResult) -> Result<(), StoreError> {
        let conn = ctx.run(self.get_conn()).await??;
        ctx.run(insert_check_result(&conn, result)).await?
    }

    async fn update_instance(&self, ctx: &RunContext, instance: &Instance) -> Result<(), StoreError> {
        let conn = ctx.run(self.get_conn()).await??;
        ctx.run(upsert_instance(&conn, instance)).await?
    }

    async fn analyze_longest_gap_per_app(
        &self,
        ctx: &RunContext,
        query: &GapQuery,
        output: &mut (dyn FnMut(GapRecord) + Send),
    ) -> Result<(), StoreError> {
        let conn = ctx.run(self.get_conn()).await??;
        ctx.run(scan_gaps(&conn, query, output)).await?
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close();
        Ok(())
    }
}
