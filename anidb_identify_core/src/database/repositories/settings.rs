//! Key/value settings

use crate::Result;
use sqlx::SqliteConnection;

pub struct SettingsRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SettingsRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    pub async fn get(&mut self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(value)
    }

    pub async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    /// Returns whether the key existed
    pub async fn delete(&mut self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::database::Database;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_set_overwrite_delete() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(&temp_dir.path().join("test.db")).await.unwrap();
        let mut store = db.connect().await.unwrap();
        let mut settings = store.settings();

        assert_eq!(settings.get("username").await.unwrap(), None);
        settings.set("username", "first").await.unwrap();
        settings.set("username", "second").await.unwrap();
        assert_eq!(settings.get("username").await.unwrap().as_deref(), Some("second"));
        assert!(settings.delete("username").await.unwrap());
        assert!(!settings.delete("username").await.unwrap());
        assert_eq!(settings.get("username").await.unwrap(), None);
    }
}
