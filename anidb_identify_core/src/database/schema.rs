//! Database schema definitions
//!
//! Metadata tables are columnar: one nullable TEXT column per mask field,
//! so a record can be filled in over several replies and a NULL column
//! means "not fetched yet".

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Initial schema creation SQL
pub const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- Append-only packet log
CREATE TABLE IF NOT EXISTS packets (
    tag INTEGER PRIMARY KEY,
    command TEXT NOT NULL,
    processed INTEGER NOT NULL DEFAULT 0,
    got_reply INTEGER NOT NULL DEFAULT 0,
    retry_count INTEGER NOT NULL DEFAULT 0,
    reply TEXT,
    sent_at INTEGER,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_packets_open ON packets(got_reply, processed);

-- Files seen on disk
CREATE TABLE IF NOT EXISTS local_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    filename TEXT NOT NULL,
    size INTEGER NOT NULL,
    hash TEXT,
    status TEXT NOT NULL DEFAULT 'unhashed',
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_local_files_identity ON local_files(size, hash);

CREATE TABLE IF NOT EXISTS file (
    fid INTEGER PRIMARY KEY,
    aid INTEGER,
    eid INTEGER,
    gid INTEGER,
    lid INTEGER,
    other_episodes TEXT,
    is_deprecated TEXT,
    state TEXT,
    size INTEGER,
    ed2k TEXT,
    md5 TEXT,
    sha1 TEXT,
    crc32 TEXT,
    colour_depth TEXT,
    quality TEXT,
    source TEXT,
    audio_codec TEXT,
    audio_bitrate TEXT,
    video_codec TEXT,
    video_bitrate TEXT,
    resolution TEXT,
    file_type TEXT,
    dub_language TEXT,
    sub_language TEXT,
    length TEXT,
    description TEXT,
    aired_date TEXT,
    anidb_filename TEXT,
    mylist_state TEXT,
    mylist_filestate TEXT,
    mylist_viewed TEXT,
    mylist_viewdate TEXT,
    mylist_storage TEXT,
    mylist_source TEXT,
    mylist_other TEXT,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_file_identity ON file(size, ed2k);

CREATE TABLE IF NOT EXISTS anime (
    aid INTEGER PRIMARY KEY,
    date_flags TEXT,
    year TEXT,
    type TEXT,
    related_aid_list TEXT,
    related_aid_type TEXT,
    name_romaji TEXT,
    name_kanji TEXT,
    name_english TEXT,
    name_other TEXT,
    name_short TEXT,
    synonyms TEXT,
    episodes TEXT,
    highest_episode TEXT,
    special_ep_count TEXT,
    air_date TEXT,
    end_date TEXT,
    url TEXT,
    picname TEXT,
    rating TEXT,
    vote_count TEXT,
    temp_rating TEXT,
    temp_vote_count TEXT,
    avg_review_rating TEXT,
    review_count TEXT,
    award_list TEXT,
    is_18_restricted TEXT,
    ann_id TEXT,
    allcinema_id TEXT,
    animenfo_id TEXT,
    tag_name_list TEXT,
    tag_id_list TEXT,
    tag_weight_list TEXT,
    date_record_updated TEXT,
    character_id_list TEXT,
    specials_count TEXT,
    credits_count TEXT,
    other_count TEXT,
    trailer_count TEXT,
    parody_count TEXT,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS episode (
    eid INTEGER PRIMARY KEY,
    aid INTEGER,
    length TEXT,
    rating TEXT,
    vote_count TEXT,
    epno TEXT,
    name_english TEXT,
    name_romaji TEXT,
    name_kanji TEXT,
    aired TEXT,
    type TEXT,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS grp (
    gid INTEGER PRIMARY KEY,
    name TEXT,
    short_name TEXT,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS mylist (
    lid INTEGER PRIMARY KEY,
    fid INTEGER NOT NULL,
    eid INTEGER NOT NULL DEFAULT 0,
    aid INTEGER NOT NULL DEFAULT 0,
    gid INTEGER NOT NULL DEFAULT 0,
    date INTEGER NOT NULL DEFAULT 0,
    state INTEGER NOT NULL DEFAULT 0,
    viewdate INTEGER NOT NULL DEFAULT 0,
    storage TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL DEFAULT '',
    other TEXT NOT NULL DEFAULT '',
    filestate INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_mylist_fid ON mylist(fid);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notifications (
    nid INTEGER NOT NULL,
    source TEXT NOT NULL,
    from_user_id INTEGER NOT NULL DEFAULT 0,
    from_user_name TEXT NOT NULL DEFAULT '',
    date INTEGER NOT NULL DEFAULT 0,
    message_type INTEGER NOT NULL DEFAULT 0,
    title TEXT NOT NULL DEFAULT '',
    body TEXT NOT NULL DEFAULT '',
    received_at INTEGER NOT NULL,
    acknowledged INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (nid, source)
);
"#;

/// Columns stored as INTEGER; every other metadata column is TEXT
pub const INTEGER_COLUMNS: &[(&str, &str)] = &[
    ("file", "aid"),
    ("file", "eid"),
    ("file", "gid"),
    ("file", "lid"),
    ("file", "size"),
    ("episode", "aid"),
];

pub fn is_integer_column(table: &str, column: &str) -> bool {
    INTEGER_COLUMNS
        .iter()
        .any(|(t, c)| *t == table && *c == column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mask::{AnimeField, EpisodeField, FileField};

    fn table_body(table: &str) -> &'static str {
        let start = SCHEMA_V1
            .find(&format!("CREATE TABLE IF NOT EXISTS {table} ("))
            .unwrap();
        let rest = &SCHEMA_V1[start..];
        &rest[..rest.find(");").unwrap()]
    }

    fn has_column(table: &str, column: &str) -> bool {
        table_body(table)
            .lines()
            .any(|line| line.trim_start().starts_with(&format!("{column} ")))
    }

    #[test]
    fn test_every_mask_field_has_a_column() {
        for field in AnimeField::ALL {
            assert!(has_column("anime", field.column()), "anime.{}", field.column());
        }
        for field in FileField::ALL {
            assert!(has_column("file", field.column()), "file.{}", field.column());
        }
        for field in EpisodeField::ALL {
            assert!(has_column("episode", field.column()), "episode.{}", field.column());
        }
    }

    #[test]
    fn test_integer_columns_exist() {
        for (table, column) in INTEGER_COLUMNS {
            assert!(has_column(table, column));
        }
        assert!(is_integer_column("file", "size"));
        assert!(!is_integer_column("anime", "year"));
    }
}
