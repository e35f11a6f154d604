//! File, anime, episode, group and mylist metadata
//!
//! Partial records are written column by column: an upsert only touches the
//! columns the record carries, so a later reply with a smaller mask never
//! blanks out what an earlier one stored.

use crate::Result;
use crate::database::models::{LocalFlags, time_utils};
use crate::database::schema::is_integer_column;
use crate::protocol::mask::{AnimeField, EpisodeField, FileField};
use crate::protocol::messages::{AnimeInfo, EpisodeInfo, FileInfo, GroupInfo, MylistEntry};
use log::trace;
use sqlx::{Row, SqliteConnection};
use std::collections::HashMap;

/// Pairs per batch identify statement, well below SQLite's variable limit
const IDENTIFY_CHUNK: usize = 400;

pub struct MetadataRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> MetadataRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    async fn upsert_columns(
        &mut self,
        table: &'static str,
        key_column: &'static str,
        key: i64,
        values: Vec<(&'static str, &str)>,
    ) -> Result<()> {
        let mut columns = vec![key_column];
        columns.extend(values.iter().map(|(column, _)| *column));
        columns.push("updated_at");

        let placeholders = vec!["?"; columns.len()].join(", ");
        let updates = columns[1..]
            .iter()
            .map(|column| format!("{column} = excluded.{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders}) \
             ON CONFLICT({key_column}) DO UPDATE SET {updates}",
            columns.join(", ")
        );

        let mut query = sqlx::query(&sql).bind(key);
        for (column, value) in &values {
            query = if is_integer_column(table, column) {
                query.bind(value.trim().parse::<i64>().ok())
            } else {
                query.bind(value.to_string())
            };
        }
        query
            .bind(time_utils::now_millis())
            .execute(&mut *self.conn)
            .await?;
        trace!("Upserted {table} {key} ({} columns)", values.len());
        Ok(())
    }

    async fn load_columns(
        &mut self,
        table: &'static str,
        key_column: &'static str,
        key: i64,
        columns: &[&'static str],
    ) -> Result<Option<Vec<Option<String>>>> {
        let select = columns
            .iter()
            .map(|column| format!("CAST({column} AS TEXT) AS {column}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {select} FROM {table} WHERE {key_column} = ?");

        let Some(row) = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&mut *self.conn)
            .await?
        else {
            return Ok(None);
        };

        let mut values = Vec::with_capacity(columns.len());
        for column in columns {
            values.push(row.try_get::<Option<String>, _>(*column)?);
        }
        Ok(Some(values))
    }

    pub async fn upsert_anime(&mut self, anime: &AnimeInfo) -> Result<()> {
        let values = anime
            .fields
            .iter()
            .map(|(field, value)| (field.column(), value.as_str()))
            .collect();
        self.upsert_columns("anime", "aid", anime.aid, values).await
    }

    pub async fn load_anime(&mut self, aid: i64) -> Result<Option<AnimeInfo>> {
        let columns: Vec<_> = AnimeField::ALL.iter().map(|f| f.column()).collect();
        let Some(values) = self.load_columns("anime", "aid", aid, &columns).await? else {
            return Ok(None);
        };
        let mut anime = AnimeInfo::new(aid);
        for (field, value) in AnimeField::ALL.iter().zip(values) {
            if let Some(value) = value {
                anime.set(*field, value);
            }
        }
        Ok(Some(anime))
    }

    pub async fn upsert_file(&mut self, file: &FileInfo) -> Result<()> {
        let values = file
            .fields
            .iter()
            .map(|(field, value)| (field.column(), value.as_str()))
            .collect::<Vec<_>>();
        // ed2k is an identity key and must match what the hasher produces
        let ed2k = file.ed2k().map(str::to_ascii_lowercase);
        let values = values
            .into_iter()
            .map(|(column, value)| match (&ed2k, column) {
                (Some(hash), "ed2k") => (column, hash.as_str()),
                _ => (column, value),
            })
            .collect();
        self.upsert_columns("file", "fid", file.fid, values).await
    }

    pub async fn load_file(&mut self, fid: i64) -> Result<Option<FileInfo>> {
        let columns: Vec<_> = FileField::ALL.iter().map(|f| f.column()).collect();
        let Some(values) = self.load_columns("file", "fid", fid, &columns).await? else {
            return Ok(None);
        };
        let mut file = FileInfo::new(fid);
        for (field, value) in FileField::ALL.iter().zip(values) {
            if let Some(value) = value {
                file.set(*field, value);
            }
        }
        Ok(Some(file))
    }

    /// The stored file with this identity, if the server ever returned it
    pub async fn find_file_by_identity(&mut self, size: i64, ed2k: &str) -> Result<Option<FileInfo>> {
        let fid = sqlx::query_scalar::<_, i64>(
            "SELECT fid FROM file WHERE size = ? AND ed2k = ? AND fid > 0 LIMIT 1",
        )
        .bind(size)
        .bind(ed2k.to_ascii_lowercase())
        .fetch_optional(&mut *self.conn)
        .await?;

        match fid {
            Some(fid) => self.load_file(fid).await,
            None => Ok(None),
        }
    }

    pub async fn upsert_episode(&mut self, episode: &EpisodeInfo) -> Result<()> {
        let values = episode
            .fields
            .iter()
            .map(|(field, value)| (field.column(), value.as_str()))
            .collect();
        self.upsert_columns("episode", "eid", episode.eid, values).await
    }

    pub async fn load_episode(&mut self, eid: i64) -> Result<Option<EpisodeInfo>> {
        let columns: Vec<_> = EpisodeField::ALL.iter().map(|f| f.column()).collect();
        let Some(values) = self.load_columns("episode", "eid", eid, &columns).await? else {
            return Ok(None);
        };
        let mut episode = EpisodeInfo::new(eid);
        for (field, value) in EpisodeField::ALL.iter().zip(values) {
            if let Some(value) = value {
                episode.set(*field, value);
            }
        }
        Ok(Some(episode))
    }

    pub async fn upsert_group(&mut self, group: &GroupInfo) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO grp (gid, name, short_name, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(gid) DO UPDATE SET
                name = COALESCE(excluded.name, grp.name),
                short_name = COALESCE(excluded.short_name, grp.short_name),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(group.gid)
        .bind(&group.name)
        .bind(&group.short_name)
        .bind(time_utils::now_millis())
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    pub async fn load_group(&mut self, gid: i64) -> Result<Option<GroupInfo>> {
        let row = sqlx::query("SELECT gid, name, short_name FROM grp WHERE gid = ?")
            .bind(gid)
            .fetch_optional(&mut *self.conn)
            .await?;

        row.map(|row| -> Result<GroupInfo> {
            Ok(GroupInfo {
                gid: row.try_get("gid")?,
                name: row.try_get("name")?,
                short_name: row.try_get("short_name")?,
            })
        })
        .transpose()
    }

    pub async fn upsert_mylist(&mut self, entry: &MylistEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO mylist (lid, fid, eid, aid, gid, date, state, viewdate, storage, source, other, filestate)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(lid) DO UPDATE SET
                fid = excluded.fid,
                eid = excluded.eid,
                aid = excluded.aid,
                gid = excluded.gid,
                date = excluded.date,
                state = excluded.state,
                viewdate = excluded.viewdate,
                storage = excluded.storage,
                source = excluded.source,
                other = excluded.other,
                filestate = excluded.filestate
            "#,
        )
        .bind(entry.lid)
        .bind(entry.fid)
        .bind(entry.eid)
        .bind(entry.aid)
        .bind(entry.gid)
        .bind(entry.date)
        .bind(entry.state)
        .bind(entry.viewdate)
        .bind(&entry.storage)
        .bind(&entry.source)
        .bind(&entry.other)
        .bind(entry.filestate)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    /// Link a lid to a file without touching the entry's other columns
    pub async fn link_mylist(&mut self, lid: i64, file: &FileInfo) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO mylist (lid, fid, eid, aid, gid)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(lid) DO UPDATE SET
                fid = excluded.fid,
                eid = excluded.eid,
                aid = excluded.aid,
                gid = excluded.gid
            "#,
        )
        .bind(lid)
        .bind(file.fid)
        .bind(file.eid().unwrap_or(0))
        .bind(file.aid().unwrap_or(0))
        .bind(file.gid().unwrap_or(0))
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    pub async fn find_mylist_by_fid(&mut self, fid: i64) -> Result<Option<MylistEntry>> {
        let row = sqlx::query(
            r#"
            SELECT lid, fid, eid, aid, gid, date, state, viewdate, storage, source, other, filestate
            FROM mylist
            WHERE fid = ? AND lid > 0
            ORDER BY lid DESC
            LIMIT 1
            "#,
        )
        .bind(fid)
        .fetch_optional(&mut *self.conn)
        .await?;

        row.map(|row| -> Result<MylistEntry> {
            Ok(MylistEntry {
                lid: row.try_get("lid")?,
                fid: row.try_get("fid")?,
                eid: row.try_get("eid")?,
                aid: row.try_get("aid")?,
                gid: row.try_get("gid")?,
                date: row.try_get("date")?,
                state: row.try_get("state")?,
                viewdate: row.try_get("viewdate")?,
                storage: row.try_get("storage")?,
                source: row.try_get("source")?,
                other: row.try_get("other")?,
                filestate: row.try_get("filestate")?,
            })
        })
        .transpose()
    }

    /// What local storage knows about one (size, hash) pair
    pub async fn identify(&mut self, size: i64, hash: &str) -> Result<LocalFlags> {
        let row = sqlx::query(
            r#"
            SELECT f.fid AS fid,
                   (SELECT MAX(m.lid) FROM mylist m WHERE m.fid = f.fid AND m.lid > 0) AS lid
            FROM file f
            WHERE f.size = ? AND f.ed2k = ? AND f.fid > 0
            ORDER BY lid DESC
            LIMIT 1
            "#,
        )
        .bind(size)
        .bind(hash.to_ascii_lowercase())
        .fetch_optional(&mut *self.conn)
        .await?;

        let Some(row) = row else {
            return Ok(LocalFlags::empty());
        };
        let lid: Option<i64> = row.try_get("lid")?;
        let mut flags = LocalFlags::IN_LOCAL_STORE;
        if lid.is_some_and(|lid| lid > 0) {
            flags.insert(LocalFlags::IN_MYLIST);
        }
        Ok(flags)
    }

    /// [`identify`](Self::identify) for many pairs at once
    ///
    /// Every input pair is present in the result, keyed with the hash in
    /// lowercase; pairs unknown locally map to empty flags.
    pub async fn identify_batch(
        &mut self,
        pairs: &[(i64, String)],
    ) -> Result<HashMap<(i64, String), LocalFlags>> {
        let mut result: HashMap<(i64, String), LocalFlags> = pairs
            .iter()
            .map(|(size, hash)| ((*size, hash.to_ascii_lowercase()), LocalFlags::empty()))
            .collect();

        for chunk in pairs.chunks(IDENTIFY_CHUNK) {
            let values = vec!["(?, ?)"; chunk.len()].join(", ");
            let sql = format!(
                r#"
                WITH wanted(size, ed2k) AS (VALUES {values})
                SELECT f.size AS size, f.ed2k AS ed2k,
                       (SELECT MAX(m.lid) FROM mylist m WHERE m.fid = f.fid AND m.lid > 0) AS lid
                FROM wanted w
                JOIN file f ON f.size = w.size AND f.ed2k = w.ed2k
                WHERE f.fid > 0
                "#
            );

            let mut query = sqlx::query(&sql);
            for (size, hash) in chunk {
                query = query.bind(*size).bind(hash.to_ascii_lowercase());
            }
            let rows = query.fetch_all(&mut *self.conn).await?;

            for row in rows {
                let size: i64 = row.try_get("size")?;
                let ed2k: String = row.try_get("ed2k")?;
                let lid: Option<i64> = row.try_get("lid")?;
                let flags = result.entry((size, ed2k)).or_default();
                flags.insert(LocalFlags::IN_LOCAL_STORE);
                if lid.is_some_and(|lid| lid > 0) {
                    flags.insert(LocalFlags::IN_MYLIST);
                }
            }
        }

        Ok(result)
    }
}
