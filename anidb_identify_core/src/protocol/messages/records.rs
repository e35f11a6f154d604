//! Records populated from replies
//!
//! Anime, file and episode records are partial: they hold exactly the
//! fields some reply has delivered so far, keyed by the mask field that
//! selected them. Merging a later reply fills in what the earlier one left
//! out without clobbering anything with blanks.

use crate::protocol::mask::{AnimeField, EpisodeField, FileField};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn parse_id(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

macro_rules! partial_record {
    ($(#[$meta:meta])* $name:ident, $id:ident, $field:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            pub $id: i64,
            pub fields: BTreeMap<$field, String>,
        }

        impl $name {
            pub fn new($id: i64) -> Self {
                Self {
                    $id,
                    fields: BTreeMap::new(),
                }
            }

            pub fn set(&mut self, field: $field, value: impl Into<String>) {
                self.fields.insert(field, value.into());
            }

            pub fn get(&self, field: $field) -> Option<&str> {
                self.fields.get(&field).map(String::as_str)
            }

            pub fn has(&self, field: $field) -> bool {
                self.fields.contains_key(&field)
            }

            /// Take every field `other` carries
            pub fn merge(&mut self, other: &Self) {
                for (field, value) in &other.fields {
                    self.fields.insert(*field, value.clone());
                }
            }
        }
    };
}

partial_record! {
    /// Anime metadata keyed by aid
    AnimeInfo, aid, AnimeField
}

partial_record! {
    /// File metadata keyed by fid
    FileInfo, fid, FileField
}

partial_record! {
    /// Episode metadata keyed by eid
    EpisodeInfo, eid, EpisodeField
}

impl AnimeInfo {
    pub fn date_flags(&self) -> Option<&str> {
        self.get(AnimeField::DateFlags)
    }

    pub fn year(&self) -> Option<&str> {
        self.get(AnimeField::Year)
    }

    pub fn kind(&self) -> Option<&str> {
        self.get(AnimeField::Type)
    }

    pub fn romaji_name(&self) -> Option<&str> {
        self.get(AnimeField::RomajiName)
    }

    pub fn english_name(&self) -> Option<&str> {
        self.get(AnimeField::EnglishName)
    }

    pub fn episodes(&self) -> Option<i64> {
        parse_id(self.get(AnimeField::Episodes))
    }

    /// Title to show, preferring romaji
    pub fn display_name(&self) -> Option<&str> {
        self.romaji_name()
            .filter(|name| !name.is_empty())
            .or_else(|| self.english_name().filter(|name| !name.is_empty()))
    }
}

impl FileInfo {
    pub fn aid(&self) -> Option<i64> {
        parse_id(self.get(FileField::Aid))
    }

    pub fn eid(&self) -> Option<i64> {
        parse_id(self.get(FileField::Eid))
    }

    pub fn gid(&self) -> Option<i64> {
        parse_id(self.get(FileField::Gid))
    }

    pub fn lid(&self) -> Option<i64> {
        parse_id(self.get(FileField::Lid))
    }

    pub fn size(&self) -> Option<i64> {
        parse_id(self.get(FileField::Size))
    }

    pub fn ed2k(&self) -> Option<&str> {
        self.get(FileField::Ed2k)
    }

    pub fn anidb_filename(&self) -> Option<&str> {
        self.get(FileField::AnidbFilename)
    }
}

impl EpisodeInfo {
    pub fn aid(&self) -> Option<i64> {
        parse_id(self.get(EpisodeField::Aid))
    }

    pub fn episode_number(&self) -> Option<&str> {
        self.get(EpisodeField::EpisodeNumber)
    }

    pub fn english_name(&self) -> Option<&str> {
        self.get(EpisodeField::EnglishName)
    }
}

/// Release group names carried by a FILE amask
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub gid: i64,
    pub name: Option<String>,
    pub short_name: Option<String>,
}

/// One MYLIST entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MylistEntry {
    pub lid: i64,
    pub fid: i64,
    pub eid: i64,
    pub aid: i64,
    pub gid: i64,
    pub date: i64,
    pub state: i64,
    pub viewdate: i64,
    pub storage: String,
    pub source: String,
    pub other: String,
    pub filestate: i64,
}

impl MylistEntry {
    /// Parse `fid|eid|aid|gid|date|state|viewdate|storage|source|other|filestate`
    pub fn from_fields<T: AsRef<str>>(lid: i64, fields: &[T]) -> Option<Self> {
        if fields.len() < 11 {
            return None;
        }
        let text = |index: usize| fields[index].as_ref().to_string();
        let num = |index: usize| parse_id(Some(fields[index].as_ref())).unwrap_or(0);
        Some(Self {
            lid,
            fid: num(0),
            eid: num(1),
            aid: num(2),
            gid: num(3),
            date: num(4),
            state: num(5),
            viewdate: num(6),
            storage: text(7),
            source: text(8),
            other: text(9),
            filestate: num(10),
        })
    }

    pub fn is_watched(&self) -> bool {
        self.viewdate > 0
    }
}

/// MYLISTSTATS counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MylistStats {
    pub animes: i64,
    pub episodes: i64,
    pub files: i64,
    pub size_of_files: i64,
    /// Counters after the first four, in reply order
    pub other: Vec<i64>,
}

impl MylistStats {
    pub fn from_fields(fields: &[&str]) -> Self {
        let mut values = fields
            .iter()
            .map(|field| field.trim().parse::<i64>().unwrap_or(0));
        Self {
            animes: values.next().unwrap_or(0),
            episodes: values.next().unwrap_or(0),
            files: values.next().unwrap_or(0),
            size_of_files: values.next().unwrap_or(0),
            other: values.collect(),
        }
    }
}

/// How a notification reached us
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationSource {
    /// Pushed by the server (270), must be acknowledged
    Push,
    /// Private message fetched with NOTIFYGET type=M (292)
    Message,
    /// New-file notification fetched with NOTIFYGET type=N (293)
    File,
}

impl NotificationSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "PUSH",
            Self::Message => "FETCHED",
            Self::File => "FILE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PUSH" => Some(Self::Push),
            "FETCHED" => Some(Self::Message),
            "FILE" => Some(Self::File),
            _ => None,
        }
    }
}

/// A stored notification or message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub nid: i64,
    pub source: NotificationSource,
    pub from_user_id: i64,
    pub from_user_name: String,
    pub date: i64,
    pub message_type: i64,
    pub title: String,
    pub body: String,
    pub acknowledged: bool,
}

impl NotificationRecord {
    /// 270: `nid|type|fromuid|date|title|body`
    pub fn from_push<T: AsRef<str>>(fields: &[T]) -> Option<Self> {
        if fields.len() < 6 {
            return None;
        }
        let field = |index: usize| fields[index].as_ref();
        Some(Self {
            nid: parse_id(Some(field(0)))?,
            source: NotificationSource::Push,
            from_user_id: parse_id(Some(field(2))).unwrap_or(0),
            from_user_name: String::new(),
            date: parse_id(Some(field(3))).unwrap_or(0),
            message_type: parse_id(Some(field(1))).unwrap_or(0),
            title: field(4).to_string(),
            body: field(5).to_string(),
            acknowledged: false,
        })
    }

    /// 292: `id|from_user_id|from_user_name|date|type|title|body`
    pub fn from_message<T: AsRef<str>>(fields: &[T]) -> Option<Self> {
        if fields.len() < 7 {
            return None;
        }
        let field = |index: usize| fields[index].as_ref();
        Some(Self {
            nid: parse_id(Some(field(0)))?,
            source: NotificationSource::Message,
            from_user_id: parse_id(Some(field(1))).unwrap_or(0),
            from_user_name: field(2).to_string(),
            date: parse_id(Some(field(3))).unwrap_or(0),
            message_type: parse_id(Some(field(4))).unwrap_or(0),
            title: field(5).to_string(),
            body: field(6).to_string(),
            acknowledged: false,
        })
    }

    /// 293: `relid|type|count|date|relidname|fids`
    pub fn from_file_notice<T: AsRef<str>>(fields: &[T]) -> Option<Self> {
        if fields.len() < 6 {
            return None;
        }
        let field = |index: usize| fields[index].as_ref();
        let relid = parse_id(Some(field(0)))?;
        Some(Self {
            nid: relid,
            source: NotificationSource::File,
            from_user_id: 0,
            from_user_name: String::new(),
            date: parse_id(Some(field(3))).unwrap_or(0),
            message_type: parse_id(Some(field(1))).unwrap_or(0),
            title: "File Notification".to_string(),
            body: format!(
                "relid {relid}, count {}, name {}, fids {}",
                field(2),
                field(4),
                field(5)
            ),
            acknowledged: false,
        })
    }
}
