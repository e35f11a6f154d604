//! Database module for SQLite-based persistence
//!
//! [`Database`] only knows where the file lives and how to open it. Every
//! thread or task that needs storage opens its own [`Store`], which owns a
//! single connection; connections are never shared.

pub mod migrations;
pub mod models;
pub mod repositories;
pub mod schema;

use crate::{
    Error, Result,
    error::{InternalError, IoError},
};
use log::debug;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection, SqliteConnection};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub use models::{FileStatus, LocalFile, LocalFlags, PacketCounts, PacketRecord, TIMEOUT_REPLY};
pub use repositories::{
    LocalFileRepository, MetadataRepository, NotificationRepository, PacketRepository,
    SettingsRepository,
};

/// Location and connection options of the database file
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    options: SqliteConnectOptions,
}

impl Database {
    /// Create the database file if needed and bring its schema up to date
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Io(IoError::from_std(e).at(db_path)))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let db = Self {
            path: db_path.to_path_buf(),
            options,
        };

        let mut store = db.connect().await?;
        migrations::run_migrations(store.conn()).await?;
        debug!("Database ready at {}", db_path.display());
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new connection for the calling thread or task
    pub async fn connect(&self) -> Result<Store> {
        let conn = self.options.connect().await.map_err(|e| {
            Error::Internal(InternalError::database(format!(
                "Failed to connect to database: {e}"
            )))
        })?;
        Ok(Store { conn })
    }
}

/// One owned connection with typed repositories over it
#[derive(Debug)]
pub struct Store {
    conn: SqliteConnection,
}

impl Store {
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    pub fn packets(&mut self) -> PacketRepository<'_> {
        PacketRepository::new(&mut self.conn)
    }

    pub fn local_files(&mut self) -> LocalFileRepository<'_> {
        LocalFileRepository::new(&mut self.conn)
    }

    pub fn metadata(&mut self) -> MetadataRepository<'_> {
        MetadataRepository::new(&mut self.conn)
    }

    pub fn settings(&mut self) -> SettingsRepository<'_> {
        SettingsRepository::new(&mut self.conn)
    }

    pub fn notifications(&mut self) -> NotificationRepository<'_> {
        NotificationRepository::new(&mut self.conn)
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_nested_directories() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("anidb.sqlite");
        let db = Database::open(&db_path).await.unwrap();
        assert!(db_path.exists());
        assert_eq!(db.path(), db_path.as_path());
    }

    #[tokio::test]
    async fn test_each_store_owns_its_connection() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(&temp_dir.path().join("test.db")).await.unwrap();

        let mut writer = db.connect().await.unwrap();
        let mut reader = db.connect().await.unwrap();
        writer.settings().set("last_session", "abc").await.unwrap();
        assert_eq!(
            reader.settings().get("last_session").await.unwrap().as_deref(),
            Some("abc")
        );
        writer.close().await.unwrap();
        reader.close().await.unwrap();
    }
}
