/// Database abstraction layer
///
/// Targets and their latest probe result live in a local libsql (SQLite)
/// database reached through a deadpool connection pool.

pub mod migrations;
pub mod models;
pub mod repository;


pub use models::Target;
pub use repository::{LibsqlTargetStore, StoreError, TargetStore};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
