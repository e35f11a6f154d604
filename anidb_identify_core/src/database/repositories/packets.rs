//! Packet log repository
//!
//! Every command ever issued gets a row keyed by its tag. Rows move from
//! unsent to in flight to replied (or timed out) and are never deleted.

use crate::Result;
use crate::database::models::{PacketCounts, PacketRecord, TIMEOUT_REPLY, time_utils};
use crate::protocol::Tag;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::to_db_int;

const PACKET_COLUMNS: &str =
    "tag, command, processed, got_reply, retry_count, reply, sent_at";

fn packet_from_row(row: &SqliteRow) -> Result<PacketRecord> {
    Ok(PacketRecord {
        tag: row.try_get("tag")?,
        command: row.try_get("command")?,
        processed: row.try_get("processed")?,
        got_reply: row.try_get("got_reply")?,
        retry_count: row.try_get("retry_count")?,
        reply: row.try_get("reply")?,
        sent_at: row.try_get("sent_at")?,
    })
}

pub struct PacketRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> PacketRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Log a freshly queued command
    pub async fn insert(&mut self, tag: Tag, command: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO packets (tag, command, processed, got_reply, retry_count, created_at)
            VALUES (?, ?, 0, 0, 0, ?)
            "#,
        )
        .bind(to_db_int(tag))
        .bind(command)
        .bind(time_utils::now_millis())
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    /// The datagram left the socket
    pub async fn mark_sent(&mut self, tag: Tag, sent_at: i64) -> Result<()> {
        sqlx::query("UPDATE packets SET processed = 1, sent_at = ? WHERE tag = ?")
            .bind(sent_at)
            .bind(to_db_int(tag))
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    /// The deadline passed; resend on a later tick
    pub async fn mark_retry(&mut self, tag: Tag, retry_count: u32) -> Result<()> {
        sqlx::query("UPDATE packets SET processed = 0, retry_count = ? WHERE tag = ?")
            .bind(i64::from(retry_count))
            .bind(to_db_int(tag))
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    /// Store the reply; terminal
    pub async fn record_reply(&mut self, tag: Tag, reply: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE packets SET processed = 1, got_reply = 1, reply = ? WHERE tag = ?",
        )
        .bind(reply)
        .bind(to_db_int(tag))
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Out of retries; terminal
    pub async fn mark_timed_out(&mut self, tag: Tag) -> Result<()> {
        self.record_reply(tag, TIMEOUT_REPLY).await?;
        Ok(())
    }

    /// Resend the same tag with a different command text
    pub async fn replace_command(&mut self, tag: Tag, command: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE packets
            SET command = ?, processed = 0, got_reply = 0, reply = NULL, retry_count = 0
            WHERE tag = ?
            "#,
        )
        .bind(command)
        .bind(to_db_int(tag))
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    pub async fn find(&mut self, tag: Tag) -> Result<Option<PacketRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {PACKET_COLUMNS} FROM packets WHERE tag = ?"
        ))
        .bind(to_db_int(tag))
        .fetch_optional(&mut *self.conn)
        .await?;

        row.as_ref().map(packet_from_row).transpose()
    }

    /// Packets without a reply, lowest tag first
    pub async fn open_packets(&mut self) -> Result<Vec<PacketRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {PACKET_COLUMNS} FROM packets WHERE got_reply = 0 ORDER BY tag"
        ))
        .fetch_all(&mut *self.conn)
        .await?;

        rows.iter().map(packet_from_row).collect()
    }

    pub async fn max_tag(&mut self) -> Result<Tag> {
        let max = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(tag) FROM packets")
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(max.and_then(|tag| Tag::try_from(tag).ok()).unwrap_or(0))
    }

    pub async fn counts(&mut self) -> Result<PacketCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN got_reply = 0 AND processed = 0 THEN 1 ELSE 0 END), 0) AS waiting,
                COALESCE(SUM(CASE WHEN got_reply = 0 AND processed = 1 THEN 1 ELSE 0 END), 0) AS in_flight,
                COALESCE(SUM(CASE WHEN got_reply = 1 AND reply != ? THEN 1 ELSE 0 END), 0) AS replied,
                COALESCE(SUM(CASE WHEN got_reply = 1 AND reply = ? THEN 1 ELSE 0 END), 0) AS timed_out
            FROM packets
            "#,
        )
        .bind(TIMEOUT_REPLY)
        .bind(TIMEOUT_REPLY)
        .fetch_one(&mut *self.conn)
        .await?;

        let count = |column: &str| -> Result<u64> {
            let value: i64 = row.try_get(column)?;
            Ok(value.max(0) as u64)
        };
        Ok(PacketCounts {
            waiting: count("waiting")?,
            in_flight: count("in_flight")?,
            replied: count("replied")?,
            timed_out: count("timed_out")?,
        })
    }
}
