//! Database migration system
//!
//! Brings a connection's database up to the current schema version, one
//! transaction per version.

use crate::{Error, Result, error::InternalError};
use sqlx::{Connection, SqliteConnection};

use super::models::time_utils;
use super::schema::SCHEMA_V1;

/// Run all necessary migrations
pub async fn run_migrations(conn: &mut SqliteConnection) -> Result<()> {
    let current_version = get_current_version(conn).await?;

    if current_version < 1 {
        apply_migration(conn, 1, SCHEMA_V1).await?;
    }

    Ok(())
}

/// Get the current schema version from the database
pub async fn get_current_version(conn: &mut SqliteConnection) -> Result<i32> {
    let table_exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
    )
    .fetch_one(&mut *conn)
    .await?;

    if table_exists == 0 {
        return Ok(0);
    }

    let version = sqlx::query_scalar::<_, Option<i32>>("SELECT MAX(version) FROM schema_version")
        .fetch_one(&mut *conn)
        .await?;

    Ok(version.unwrap_or(0))
}

/// Apply a single migration
async fn apply_migration(conn: &mut SqliteConnection, version: i32, sql: &str) -> Result<()> {
    let mut tx = conn.begin().await.map_err(|e| {
        Error::Internal(InternalError::database(format!(
            "Failed to start migration transaction: {e}"
        )))
    })?;

    sqlx::raw_sql(sql).execute(&mut *tx).await.map_err(|e| {
        Error::Internal(InternalError::database(format!(
            "Failed to apply migration {version}: {e}"
        )))
    })?;

    sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
        .bind(version)
        .bind(time_utils::now_millis())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Internal(InternalError::database(format!(
                "Failed to record migration {version}: {e}"
            )))
        })?;

    tx.commit().await.map_err(|e| {
        Error::Internal(InternalError::database(format!(
            "Failed to commit migration {version}: {e}"
        )))
    })?;

    Ok(())
}
