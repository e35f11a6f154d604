//! Local file repository

use crate::Result;
use crate::database::models::{FileStatus, LocalFile, time_utils};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

const LOCAL_FILE_COLUMNS: &str = "id, path, filename, size, hash, status";

fn local_file_from_row(row: &SqliteRow) -> Result<LocalFile> {
    Ok(LocalFile {
        id: row.try_get("id")?,
        path: row.try_get("path")?,
        filename: row.try_get("filename")?,
        size: row.try_get("size")?,
        hash: row.try_get("hash")?,
        status: row.try_get("status")?,
    })
}

pub struct LocalFileRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> LocalFileRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Record a file found on disk
    ///
    /// A known path keeps its hash and status unless its size changed, in
    /// which case the old hash no longer describes the content. A deleted
    /// file that shows up again starts over from its hash.
    pub async fn upsert_discovered(
        &mut self,
        path: &str,
        filename: &str,
        size: i64,
    ) -> Result<LocalFile> {
        sqlx::query(
            r#"
            INSERT INTO local_files (path, filename, size, hash, status, updated_at)
            VALUES (?, ?, ?, NULL, 'unhashed', ?)
            ON CONFLICT(path) DO UPDATE SET
                filename = excluded.filename,
                hash = CASE WHEN local_files.size = excluded.size
                            THEN local_files.hash ELSE NULL END,
                status = CASE
                    WHEN local_files.size != excluded.size THEN 'unhashed'
                    WHEN local_files.status != 'deleted' THEN local_files.status
                    WHEN local_files.hash IS NULL THEN 'unhashed'
                    ELSE 'hashed'
                END,
                size = excluded.size,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(path)
        .bind(filename)
        .bind(size)
        .bind(time_utils::now_millis())
        .execute(&mut *self.conn)
        .await?;

        self.find_by_path(path).await?.ok_or_else(|| {
            crate::Error::Internal(crate::error::InternalError::database(format!(
                "local file vanished after upsert: {path}"
            )))
        })
    }

    pub async fn find_by_path(&mut self, path: &str) -> Result<Option<LocalFile>> {
        let row = sqlx::query(&format!(
            "SELECT {LOCAL_FILE_COLUMNS} FROM local_files WHERE path = ?"
        ))
        .bind(path)
        .fetch_optional(&mut *self.conn)
        .await?;

        row.as_ref().map(local_file_from_row).transpose()
    }

    pub async fn find_by_status(&mut self, status: FileStatus) -> Result<Vec<LocalFile>> {
        let rows = sqlx::query(&format!(
            "SELECT {LOCAL_FILE_COLUMNS} FROM local_files WHERE status = ? ORDER BY id"
        ))
        .bind(status)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.iter().map(local_file_from_row).collect()
    }

    /// A hash already computed for another file of exactly `size` bytes
    pub async fn reusable_hash(&mut self, size: i64, path: &str) -> Result<Option<String>> {
        let hash = sqlx::query_scalar::<_, String>(
            r#"
            SELECT hash FROM local_files
            WHERE size = ? AND path != ? AND hash IS NOT NULL AND hash != ''
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(size)
        .bind(path)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(hash)
    }

    /// Attach a content hash; the file becomes `hashed` unless already further along
    pub async fn set_hash(&mut self, path: &str, hash: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE local_files
            SET hash = ?,
                status = CASE WHEN status = 'unhashed' THEN 'hashed' ELSE status END,
                updated_at = ?
            WHERE path = ?
            "#,
        )
        .bind(hash.to_ascii_lowercase())
        .bind(time_utils::now_millis())
        .bind(path)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    /// Update every local file with this identity; returns how many matched
    pub async fn set_status_by_identity(
        &mut self,
        size: i64,
        hash: &str,
        status: FileStatus,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE local_files SET status = ?, updated_at = ? WHERE size = ? AND hash = ?",
        )
        .bind(status)
        .bind(time_utils::now_millis())
        .bind(size)
        .bind(hash.to_ascii_lowercase())
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn set_status(&mut self, path: &str, status: FileStatus) -> Result<()> {
        sqlx::query("UPDATE local_files SET status = ?, updated_at = ? WHERE path = ?")
            .bind(status)
            .bind(time_utils::now_millis())
            .bind(path)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    /// Number of files per status, every status present
    pub async fn status_counts(&mut self) -> Result<Vec<(FileStatus, u64)>> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM local_files GROUP BY status")
            .fetch_all(&mut *self.conn)
            .await?;

        let mut counts: Vec<(FileStatus, u64)> =
            FileStatus::ALL.iter().map(|status| (*status, 0)).collect();
        for row in rows {
            let status: FileStatus = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            if let Some(slot) = counts.iter_mut().find(|(s, _)| *s == status) {
                slot.1 = count.max(0) as u64;
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Database, Store};
    use tempfile::TempDir;

    const HASH: &str = "31d6cfe0d16ae931b73c59d7e0c089c0";

    async fn store() -> (TempDir, Store) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(&temp_dir.path().join("test.db")).await.unwrap();
        let store = db.connect().await.unwrap();
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_discovery_and_hashing() {
        let (_dir, mut store) = store().await;
        let mut files = store.local_files();

        let file = files.upsert_discovered("/a/ep1.mkv", "ep1.mkv", 1024).await.unwrap();
        assert_eq!(file.status, FileStatus::Unhashed);
        assert!(file.hash.is_none());

        files.set_hash("/a/ep1.mkv", &HASH.to_uppercase()).await.unwrap();
        let hashed = files.find_by_path("/a/ep1.mkv").await.unwrap().unwrap();
        assert_eq!(hashed.hash.as_deref(), Some(HASH));
        assert_eq!(hashed.status, FileStatus::Hashed);

        // Rediscovery at the same size keeps the hash
        let again = files.upsert_discovered("/a/ep1.mkv", "ep1.mkv", 1024).await.unwrap();
        assert_eq!(again.hash.as_deref(), Some(HASH));

        // A size change invalidates it
        let changed = files.upsert_discovered("/a/ep1.mkv", "ep1.mkv", 2048).await.unwrap();
        assert!(changed.hash.is_none());
        assert_eq!(changed.status, FileStatus::Unhashed);
    }

    #[tokio::test]
    async fn test_reusable_hash_by_size() {
        let (_dir, mut store) = store().await;
        let mut files = store.local_files();

        files.upsert_discovered("/a/ep1.mkv", "ep1.mkv", 1024).await.unwrap();
        files.upsert_discovered("/b/ep1.mkv", "ep1.mkv", 1024).await.unwrap();
        assert_eq!(files.reusable_hash(1024, "/b/ep1.mkv").await.unwrap(), None);

        files.set_hash("/a/ep1.mkv", HASH).await.unwrap();
        assert_eq!(
            files.reusable_hash(1024, "/b/ep1.mkv").await.unwrap().as_deref(),
            Some(HASH)
        );
        assert_eq!(files.reusable_hash(1024, "/a/ep1.mkv").await.unwrap(), None);
        assert_eq!(files.reusable_hash(999, "/b/ep1.mkv").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_status_by_identity_and_counts() {
        let (_dir, mut store) = store().await;
        let mut files = store.local_files();

        files.upsert_discovered("/a/ep1.mkv", "ep1.mkv", 1024).await.unwrap();
        files.upsert_discovered("/a/ep2.mkv", "ep2.mkv", 4096).await.unwrap();
        files.set_hash("/a/ep1.mkv", HASH).await.unwrap();

        let updated = files
            .set_status_by_identity(1024, HASH, FileStatus::NotFound)
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let counts = files.status_counts().await.unwrap();
        assert!(counts.contains(&(FileStatus::NotFound, 1)));
        assert!(counts.contains(&(FileStatus::Unhashed, 1)));
        assert!(counts.contains(&(FileStatus::Confirmed, 0)));

        let not_found = files.find_by_status(FileStatus::NotFound).await.unwrap();
        assert_eq!(not_found.len(), 1);
        assert_eq!(not_found[0].path, "/a/ep1.mkv");
    }

    #[tokio::test]
    async fn test_deleted_file_returns_with_its_hash() {
        let (_dir, mut store) = store().await;
        let mut files = store.local_files();

        files.upsert_discovered("/a/ep1.mkv", "ep1.mkv", 1024).await.unwrap();
        files.set_hash("/a/ep1.mkv", HASH).await.unwrap();
        files.set_status("/a/ep1.mkv", FileStatus::Deleted).await.unwrap();
        files.upsert_discovered("/a/ep2.mkv", "ep2.mkv", 2048).await.unwrap();
        files.set_status("/a/ep2.mkv", FileStatus::Deleted).await.unwrap();

        let back = files.upsert_discovered("/a/ep1.mkv", "ep1.mkv", 1024).await.unwrap();
        assert_eq!(back.status, FileStatus::Hashed);
        assert_eq!(back.hash.as_deref(), Some(HASH));
        let unhashed = files.upsert_discovered("/a/ep2.mkv", "ep2.mkv", 2048).await.unwrap();
        assert_eq!(unhashed.status, FileStatus::Unhashed);
    }
}
