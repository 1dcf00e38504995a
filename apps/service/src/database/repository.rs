use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params;
use thiserror::Error;
use uuid::Uuid;

use super::models::Target;
use crate::monitoring::types::{ProbeErrorKind, ProbeOutcome};
use crate::pool::{LibsqlManager, LibsqlPool};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database query failed: {0}")]
    Query(#[from] libsql::Error),

    #[error("Failed to get a database connection: {0}")]
    Pool(#[from] deadpool::managed::PoolError<libsql::Error>),

    #[error("Corrupt row in {table}: {reason}")]
    InvalidRow { table: &'static str, reason: String },
}

/// Target store - persistence for targets and their latest probe result
///
/// The probe core only needs `list_targets` and `upsert_probe_result`; the
/// rest is used by the HTTP handlers.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Snapshot of every target with its last result
    async fn list_targets(&self) -> Result<Vec<Target>, StoreError>;

    /// Get a target by ID
    async fn get_target(&self, id: Uuid) -> Result<Option<Target>, StoreError>;

    /// Insert a new target
    async fn create_target(&self, url: &str) -> Result<Target, StoreError>;

    /// Delete a target and its result. Returns false if it did not exist.
    async fn delete_target(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Record a probe outcome, creating the result row if absent
    ///
    /// Returns the updated target, or `None` if the target was deleted in the
    /// meantime (no orphan result is written in that case).
    async fn upsert_probe_result(
        &self,
        outcome: &ProbeOutcome,
        at: DateTime<Utc>,
    ) -> Result<Option<Target>, StoreError>;
}

const SELECT_TARGETS: &str = "SELECT t.id, t.url, t.created_at, r.probed_at, r.response_time_ms, \
     r.status_code, r.attempted_at, r.last_error \
     FROM targets t LEFT JOIN probe_results r ON r.target_id = t.id";

/// Single statement upsert keyed by target id
///
/// A failed attempt passes NULL for the result columns so the last known
/// result survives. Results older than the stored attempt are ignored, which
/// matters when two cycles overlap.
const UPSERT_PROBE_RESULT: &str = "INSERT INTO probe_results \
     (target_id, probed_at, response_time_ms, status_code, attempted_at, last_error) \
     SELECT ?1, ?2, ?3, ?4, ?5, ?6 WHERE EXISTS (SELECT 1 FROM targets WHERE id = ?1) \
     ON CONFLICT(target_id) DO UPDATE SET \
         probed_at = COALESCE(excluded.probed_at, probe_results.probed_at), \
         response_time_ms = COALESCE(excluded.response_time_ms, probe_results.response_time_ms), \
         status_code = CASE WHEN excluded.probed_at IS NULL \
             THEN probe_results.status_code ELSE excluded.status_code END, \
         attempted_at = excluded.attempted_at, \
         last_error = excluded.last_error \
     WHERE excluded.attempted_at >= probe_results.attempted_at";

/// LibSQL target store
pub struct LibsqlTargetStore {
    pool: LibsqlPool,
}

impl LibsqlTargetStore {
    /// Create a new store from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    pub(crate) async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>, StoreError> {
        Ok(self.pool.get().await?)
    }

    fn row_to_target(row: &libsql::Row) -> Result<Target, StoreError> {
        let id_str: String = row.get(0)?;
        let id = Uuid::parse_str(&id_str).map_err(|e| StoreError::InvalidRow {
            table: "targets",
            reason: format!("bad id '{id_str}': {e}"),
        })?;

        Ok(Target {
            id,
            url: row.get(1)?,
            created_at: Target::i64_to_timestamp(row.get(2)?),
            last_probe_at: row.get::<Option<i64>>(3)?.map(Target::i64_to_timestamp),
            last_response_time_ms: row.get::<Option<i64>>(4)?.map(|v| v.max(0) as u64),
            last_status_code: row.get::<Option<i64>>(5)?.map(|v| v as u16),
            last_attempt_at: row.get::<Option<i64>>(6)?.map(Target::i64_to_timestamp),
            last_error: row.get::<Option<String>>(7)?.map(|e| ProbeErrorKind::from_db(&e)),
        })
    }
}

#[async_trait]
impl TargetStore for LibsqlTargetStore {
    async fn list_targets(&self) -> Result<Vec<Target>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(&format!("{SELECT_TARGETS} ORDER BY t.created_at"), ()).await?;

        let mut targets = Vec::new();
        while let Some(row) = rows.next().await? {
            targets.push(Self::row_to_target(&row)?);
        }

        Ok(targets)
    }

    async fn get_target(&self, id: Uuid) -> Result<Option<Target>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("{SELECT_TARGETS} WHERE t.id = ?"), params![id.to_string()])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_target(&row)?)),
            None => Ok(None),
        }
    }

    async fn create_target(&self, url: &str) -> Result<Target, StoreError> {
        let conn = self.get_conn().await?;
        let target = Target::new(url.to_string());

        conn.execute(
            "INSERT INTO targets (id, url, created_at) VALUES (?, ?, ?)",
            params![
                target.id.to_string(),
                target.url.clone(),
                Target::timestamp_to_i64(target.created_at)
            ],
        )
        .await?;

        Ok(target)
    }

    async fn delete_target(&self, id: Uuid) -> Result<bool, StoreError> {
        let conn = self.get_conn().await?;

        // Removed explicitly so the result row goes even where the cascade is not enforced
        conn.execute("DELETE FROM probe_results WHERE target_id = ?", params![id.to_string()])
            .await?;
        let deleted =
            conn.execute("DELETE FROM targets WHERE id = ?", params![id.to_string()]).await?;

        Ok(deleted > 0)
    }

    async fn upsert_probe_result(
        &self,
        outcome: &ProbeOutcome,
        at: DateTime<Utc>,
    ) -> Result<Option<Target>, StoreError> {
        let conn = self.get_conn().await?;
        let at = Target::timestamp_to_i64(at);

        let (probed_at, response_time_ms, status_code, last_error) = if outcome.success {
            (
                Some(at),
                Some(outcome.response_time_ms as i64),
                outcome.http_status.map(|s| s as i64),
                None,
            )
        } else {
            (None, None, None, Some(outcome.error.as_str().to_string()))
        };

        conn.execute(
            UPSERT_PROBE_RESULT,
            params![
                outcome.target_id.to_string(),
                probed_at,
                response_time_ms,
                status_code,
                at,
                last_error
            ],
        )
        .await?;

        drop(conn);
        self.get_target(outcome.target_id).await
    }
}
