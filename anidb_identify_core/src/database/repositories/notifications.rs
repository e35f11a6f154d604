//! Stored notifications and messages

use crate::Result;
use crate::database::models::time_utils;
use crate::protocol::messages::{NotificationRecord, NotificationSource};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

fn notification_from_row(row: &SqliteRow) -> Result<NotificationRecord> {
    let source: String = row.try_get("source")?;
    Ok(NotificationRecord {
        nid: row.try_get("nid")?,
        source: NotificationSource::parse(&source).unwrap_or(NotificationSource::Push),
        from_user_id: row.try_get("from_user_id")?,
        from_user_name: row.try_get("from_user_name")?,
        date: row.try_get("date")?,
        message_type: row.try_get("message_type")?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        acknowledged: row.try_get("acknowledged")?,
    })
}

pub struct NotificationRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> NotificationRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Store a notification; a repeat delivery refreshes the payload but
    /// never clears an acknowledgement
    pub async fn upsert(&mut self, record: &NotificationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications
                (nid, source, from_user_id, from_user_name, date, message_type, title, body,
                 received_at, acknowledged)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(nid, source) DO UPDATE SET
                from_user_id = excluded.from_user_id,
                from_user_name = excluded.from_user_name,
                date = excluded.date,
                message_type = excluded.message_type,
                title = excluded.title,
                body = excluded.body,
                acknowledged = MAX(notifications.acknowledged, excluded.acknowledged)
            "#,
        )
        .bind(record.nid)
        .bind(record.source.as_str())
        .bind(record.from_user_id)
        .bind(&record.from_user_name)
        .bind(record.date)
        .bind(record.message_type)
        .bind(&record.title)
        .bind(&record.body)
        .bind(time_utils::now_millis())
        .bind(record.acknowledged)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    pub async fn exists(&mut self, nid: i64, source: NotificationSource) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE nid = ? AND source = ?",
        )
        .bind(nid)
        .bind(source.as_str())
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(count > 0)
    }

    pub async fn acknowledge(&mut self, nid: i64, source: NotificationSource) -> Result<()> {
        sqlx::query("UPDATE notifications SET acknowledged = 1 WHERE nid = ? AND source = ?")
            .bind(nid)
            .bind(source.as_str())
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    /// Most recent first
    pub async fn recent(&mut self, limit: u32) -> Result<Vec<NotificationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT nid, source, from_user_id, from_user_name, date, message_type, title, body,
                   acknowledged
            FROM notifications
            ORDER BY received_at DESC, nid DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&mut *self.conn)
        .await?;

        rows.iter().map(notification_from_row).collect()
    }
}
