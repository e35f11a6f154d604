//! `status`: what the database knows, without touching the network

use super::LAST_IDENTIFY_KEY;
use anidb_identify_core::Database;
use anidb_identify_core::database::PacketCounts;
use anidb_identify_core::protocol::messages::NotificationRecord;
use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;
use std::path::Path;

/// Notifications listed by `status`
const RECENT_NOTIFICATIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub packets: PacketCounts,
    /// Every file status with its count, zeros included
    pub files: Vec<(&'static str, u64)>,
    /// Milliseconds since the epoch
    pub last_identify_at: Option<i64>,
    pub notifications: Vec<NotificationRecord>,
}

pub async fn collect_status(database_path: &Path) -> Result<StatusReport> {
    let database = Database::open(database_path)
        .await
        .with_context(|| format!("Failed to open database {}", database_path.display()))?;
    let mut store = database.connect().await?;

    let packets = store.packets().counts().await?;
    let files = store
        .local_files()
        .status_counts()
        .await?
        .into_iter()
        .map(|(status, count)| (status.as_str(), count))
        .collect();
    let last_identify_at = store
        .settings()
        .get(LAST_IDENTIFY_KEY)
        .await?
        .and_then(|value| value.parse().ok());
    let notifications = store.notifications().recent(RECENT_NOTIFICATIONS).await?;
    store.close().await?;

    Ok(StatusReport {
        packets,
        files,
        last_identify_at,
        notifications,
    })
}

pub fn print_status(report: &StatusReport, as_json: bool) -> Result<()> {
    if as_json {
        let files: serde_json::Map<String, serde_json::Value> = report
            .files
            .iter()
            .map(|(status, count)| (status.to_string(), json!(count)))
            .collect();
        let notifications: Vec<_> = report
            .notifications
            .iter()
            .map(|n| {
                json!({
                    "nid": n.nid,
                    "source": n.source.as_str(),
                    "from": n.from_user_name,
                    "title": n.title,
                    "acknowledged": n.acknowledged,
                })
            })
            .collect();
        let value = json!({
            "packets": report.packets,
            "files": files,
            "last_identify_at": report.last_identify_at,
            "notifications": notifications,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let packets = &report.packets;
    println!("{}", "Packet queue".bold());
    println!("  waiting    {}", packets.waiting);
    println!("  in flight  {}", packets.in_flight);
    println!("  replied    {}", packets.replied);
    println!("  timed out  {}", packets.timed_out);
    println!("{}", "Local files".bold());
    for (status, count) in &report.files {
        println!("  {status:<10} {count}");
    }
    match report.last_identify_at {
        Some(at) => println!("Last identify run at {at} (ms since epoch)"),
        None => println!("No identify run recorded"),
    }
    if !report.notifications.is_empty() {
        println!("{}", "Recent notifications".bold());
        for n in &report.notifications {
            let marker = if n.acknowledged { " " } else { "*" };
            println!("  {marker} {} ({})", n.title, n.from_user_name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anidb_identify_core::FileStatus;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fresh_database_reports_zeros() {
        let dir = TempDir::new().unwrap();
        let report = collect_status(&dir.path().join("status.db")).await.unwrap();
        assert_eq!(report.packets, PacketCounts::default());
        assert_eq!(report.files.len(), FileStatus::ALL.len());
        assert!(report.files.iter().all(|(_, count)| *count == 0));
        assert_eq!(report.last_identify_at, None);
        print_status(&report, true).unwrap();
    }

    #[tokio::test]
    async fn test_counts_reflect_stored_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.db");
        let database = Database::open(&path).await.unwrap();
        let mut store = database.connect().await.unwrap();
        store
            .local_files()
            .upsert_discovered("/media/a.mkv", "a.mkv", 10)
            .await
            .unwrap();
        store.packets().insert(1, "FILE size=10&ed2k=aa").await.unwrap();
        store.settings().set(LAST_IDENTIFY_KEY, "1700000000000").await.unwrap();
        store.close().await.unwrap();

        let report = collect_status(&path).await.unwrap();
        assert_eq!(report.packets.waiting, 1);
        assert!(report.files.contains(&("unhashed", 1)));
        assert_eq!(report.last_identify_at, Some(1_700_000_000_000));
        print_status(&report, false).unwrap();
    }
}
