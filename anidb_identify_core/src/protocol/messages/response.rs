//! Reply parsing
//!
//! A reply is interpreted against the command it answers: the masks and ids
//! in the logged request decide how many fields the body carries and what
//! they mean.

use super::command::{CommandLine, NotifyKind};
use super::records::{
    AnimeInfo, EpisodeInfo, FileInfo, GroupInfo, MylistEntry, MylistStats, NotificationRecord,
};
use super::{FIELD_SEPARATOR, decode_value};
use crate::protocol::codec::RawReply;
use crate::protocol::error::{ProtocolError, ResponseCode, Result};
use crate::protocol::mask::{
    ANIME_AMASK, EpisodeField, FILE_AMASK, FILE_FMASK, FileAnimeTarget, Mask, demanded_tokens,
    split_fields, walk,
};
use log::{debug, warn};

/// A reply, typed by its code
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    LoggedIn {
        session: String,
        new_version: bool,
    },
    LoggedOut,
    LoginFailed,
    MylistAdded {
        lid: i64,
        size: Option<u64>,
        ed2k: Option<String>,
    },
    FileAlreadyInMylist {
        lid: Option<i64>,
    },
    MylistEdited,
    File {
        file: FileInfo,
        anime: Option<AnimeInfo>,
        episode: Option<EpisodeInfo>,
        group: Option<GroupInfo>,
    },
    NoSuchFile {
        size: Option<u64>,
        ed2k: Option<String>,
    },
    Mylist(MylistEntry),
    MylistStats(MylistStats),
    Anime(AnimeInfo),
    Episode(EpisodeInfo),
    /// 270 pushed, or 292/293 fetched
    Notification(NotificationRecord),
    /// 271 or 272
    NotificationAcknowledged(ResponseCode),
    NotifyList(Vec<(NotifyKind, i64)>),
    /// 403, 501 or 506: the session must be renewed
    SessionInvalid(ResponseCode),
    Banned {
        reason: String,
    },
    UnknownCommand,
    Other {
        code: ResponseCode,
        text: String,
    },
}

/// Turns a [`RawReply`] into a [`Reply`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplyParser;

impl ReplyParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse `raw`, using `sent` (the logged request) for masks and ids
    pub fn parse(&self, raw: &RawReply, sent: Option<&CommandLine>) -> Result<Reply> {
        let reply = match raw.code.0 {
            200 | 201 => {
                let session = raw
                    .first_word()
                    .ok_or_else(|| ProtocolError::decoding("LOGIN ACCEPTED without session"))?;
                Reply::LoggedIn {
                    session: session.to_string(),
                    new_version: raw.code == ResponseCode::LOGIN_ACCEPTED_NEW_VERSION,
                }
            }
            203 => Reply::LoggedOut,
            500 => Reply::LoginFailed,
            210 => {
                let lid = raw
                    .lines()
                    .next()
                    .and_then(|line| line.trim().parse().ok())
                    .ok_or_else(|| ProtocolError::decoding("MYLIST ENTRY ADDED without lid"))?;
                Reply::MylistAdded {
                    lid,
                    size: sent.and_then(|line| line.param_u64("size")),
                    ed2k: sent_param(sent, "ed2k").map(str::to_string),
                }
            }
            310 => Reply::FileAlreadyInMylist {
                lid: raw
                    .lines()
                    .next()
                    .and_then(|line| line.split(FIELD_SEPARATOR).next())
                    .and_then(|lid| lid.trim().parse().ok()),
            },
            311 => Reply::MylistEdited,
            220 => self.parse_file(raw, sent)?,
            320 => Reply::NoSuchFile {
                size: sent.and_then(|line| line.param_u64("size")),
                ed2k: sent_param(sent, "ed2k").map(str::to_string),
            },
            221 => {
                let lid = sent_param(sent, "lid")
                    .and_then(|lid| lid.parse().ok())
                    .ok_or_else(|| ProtocolError::decoding("MYLIST reply without a sent lid"))?;
                let fields = decoded(&split_fields(&raw.body, 11));
                let entry = MylistEntry::from_fields(lid, &fields).ok_or_else(|| {
                    ProtocolError::decoding(format!("MYLIST reply has {} fields", fields.len()))
                })?;
                Reply::Mylist(entry)
            }
            222 => {
                let fields: Vec<&str> = raw
                    .lines()
                    .next()
                    .map(|line| line.split(FIELD_SEPARATOR).collect())
                    .unwrap_or_default();
                Reply::MylistStats(MylistStats::from_fields(&fields))
            }
            230 => self.parse_anime(raw, sent)?,
            240 => self.parse_episode(raw)?,
            270 => {
                let fields = split_fields(&raw.body, 6);
                Reply::Notification(
                    NotificationRecord::from_push(&decoded(&fields))
                        .ok_or_else(|| ProtocolError::decoding("Malformed NOTIFICATION"))?,
                )
            }
            292 => {
                let fields = split_fields(&raw.body, 7);
                Reply::Notification(
                    NotificationRecord::from_message(&decoded(&fields))
                        .ok_or_else(|| ProtocolError::decoding("Malformed NOTIFYGET message"))?,
                )
            }
            293 => {
                let fields = split_fields(&raw.body, 6);
                Reply::Notification(
                    NotificationRecord::from_file_notice(&decoded(&fields))
                        .ok_or_else(|| ProtocolError::decoding("Malformed NOTIFYGET notice"))?,
                )
            }
            271 | 272 => Reply::NotificationAcknowledged(raw.code),
            290 | 291 => Reply::NotifyList(parse_notify_list(raw)),
            _ if raw.code.requires_reauth() => Reply::SessionInvalid(raw.code),
            555 => Reply::Banned {
                reason: raw.reason(),
            },
            598 => Reply::UnknownCommand,
            _ => Reply::Other {
                code: raw.code,
                text: raw.text.clone(),
            },
        };
        Ok(reply)
    }

    fn parse_file(&self, raw: &RawReply, sent: Option<&CommandLine>) -> Result<Reply> {
        let fmask = sent_mask(sent, "fmask", FILE_FMASK.width())?;
        let amask = sent_mask(sent, "amask", FILE_AMASK.width())?;
        let demanded = 1 + demanded_tokens(&FILE_FMASK, &fmask) + demanded_tokens(&FILE_AMASK, &amask);
        let tokens = tokens_for(raw, demanded)?;

        let fid = leading_id(&tokens, "FILE")?;
        let mut file = FileInfo::new(fid);
        let end = walk(&FILE_FMASK, &fmask, &tokens, 1, |field, value| {
            file.set(field, value);
        });

        let mut anime = AnimeInfo::new(file.aid().unwrap_or(0));
        let mut episode = EpisodeInfo::new(file.eid().unwrap_or(0));
        let mut group = GroupInfo {
            gid: file.gid().unwrap_or(0),
            ..GroupInfo::default()
        };
        walk(&FILE_AMASK, &amask, &tokens, end, |field, value| {
            match field.target() {
                FileAnimeTarget::Anime(field) => anime.set(field, value),
                FileAnimeTarget::Episode(field) => episode.set(field, value),
                FileAnimeTarget::GroupName => group.name = Some(value.to_string()),
                FileAnimeTarget::GroupShortName => group.short_name = Some(value.to_string()),
            }
        });
        if anime.aid > 0 && episode.eid > 0 {
            episode.set(EpisodeField::Aid, anime.aid.to_string());
        }

        Ok(Reply::File {
            file,
            anime: (anime.aid > 0).then_some(anime),
            episode: (episode.eid > 0).then_some(episode),
            group: (group.gid > 0).then_some(group),
        })
    }

    fn parse_anime(&self, raw: &RawReply, sent: Option<&CommandLine>) -> Result<Reply> {
        let amask = sent_mask(sent, "amask", ANIME_AMASK.width())?;
        // The aid bit decides whether the body leads with the aid
        let leading = amask.is_set(0, 7);
        let demanded = usize::from(leading) + demanded_tokens(&ANIME_AMASK, &amask);
        let tokens = tokens_for(raw, demanded)?;

        let aid = if leading {
            leading_id(&tokens, "ANIME")?
        } else {
            sent_param(sent, "aid")
                .and_then(|aid| aid.parse().ok())
                .ok_or_else(|| ProtocolError::decoding("ANIME reply without aid"))?
        };

        let mut anime = AnimeInfo::new(aid);
        walk(&ANIME_AMASK, &amask, &tokens, usize::from(leading), |field, value| {
            anime.set(field, value);
        });
        Ok(Reply::Anime(anime))
    }

    fn parse_episode(&self, raw: &RawReply) -> Result<Reply> {
        const EPISODE_FIELDS: [EpisodeField; 10] = [
            EpisodeField::Aid,
            EpisodeField::Length,
            EpisodeField::Rating,
            EpisodeField::VoteCount,
            EpisodeField::EpisodeNumber,
            EpisodeField::EnglishName,
            EpisodeField::RomajiName,
            EpisodeField::KanjiName,
            EpisodeField::Aired,
            EpisodeField::Type,
        ];
        let tokens = tokens_for(raw, EPISODE_FIELDS.len() + 1)?;
        let eid = leading_id(&tokens, "EPISODE")?;
        let mut episode = EpisodeInfo::new(eid);
        for (field, value) in EPISODE_FIELDS.iter().zip(tokens.iter().skip(1)) {
            episode.set(*field, value.as_str());
        }
        Ok(Reply::Episode(episode))
    }
}

fn decoded(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|field| decode_value(field)).collect()
}

fn sent_param<'a>(sent: Option<&'a CommandLine>, key: &str) -> Option<&'a str> {
    sent.and_then(|line| line.param(key))
}

fn sent_mask(sent: Option<&CommandLine>, key: &str, width: usize) -> Result<Mask> {
    let hex = sent_param(sent, key).ok_or_else(|| ProtocolError::decoding(format!("Reply needs the sent {key}")))?;
    Mask::from_hex(hex, width).map_err(|e| ProtocolError::decoding(e.to_string()))
}

/// Split the body into `demanded` decoded tokens, enforcing the count
///
/// A truncated reply loses its last, possibly partial, token and is
/// accepted short. A complete reply with fewer tokens than demanded is
/// rejected so nothing misaligned is stored.
fn tokens_for(raw: &RawReply, demanded: usize) -> Result<Vec<String>> {
    let mut tokens = split_fields(&raw.body, demanded);
    if raw.truncated {
        let dropped = tokens.pop();
        debug!(
            "Reply {} truncated, dropped partial token {:?}",
            raw.tag, dropped
        );
    } else if tokens.len() < demanded {
        warn!(
            "Reply {} ({}) carries {} of {demanded} fields",
            raw.tag,
            raw.code,
            tokens.len()
        );
        return Err(ProtocolError::mask_mismatch(demanded, tokens.len()));
    }
    Ok(tokens.into_iter().map(decode_value).collect())
}

fn leading_id(tokens: &[String], what: &str) -> Result<i64> {
    tokens
        .first()
        .and_then(|id| id.trim().parse().ok())
        .ok_or_else(|| ProtocolError::decoding(format!("{what} reply without a leading id")))
}

fn parse_notify_list(raw: &RawReply) -> Vec<(NotifyKind, i64)> {
    raw.lines()
        .filter_map(|line| {
            let (kind, id) = line.split_once(FIELD_SEPARATOR)?;
            let kind = match kind {
                "M" => NotifyKind::Message,
                "N" => NotifyKind::Notification,
                _ => return None,
            };
            Some((kind, id.trim().parse().ok()?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::Codec;
    use crate::protocol::mask::{AnimeField, FileAnimeField, FileField};

    fn raw(text: &str) -> RawReply {
        Codec::new().decode(text.as_bytes()).unwrap()
    }

    fn parse(text: &str, sent: &str) -> Result<Reply> {
        ReplyParser::new().parse(&raw(text), Some(&CommandLine::parse(sent)))
    }

    #[test]
    fn test_login_reply_carries_session() {
        let reply = parse("1 200 s3ss1 LOGIN ACCEPTED", "AUTH user=u&pass=p").unwrap();
        assert_eq!(
            reply,
            Reply::LoggedIn {
                session: "s3ss1".to_string(),
                new_version: false
            }
        );
    }

    #[test]
    fn test_anime_reply_with_leading_aid() {
        let text = "4 230 ANIME\n18989|0|2025-2025|TV Series|||Romaji|Kanji|English|Other|Short|Synonym";
        let reply = parse(text, "ANIME aid=18989&amask=FCFC0000000000").unwrap();
        let Reply::Anime(anime) = reply else {
            panic!("expected anime");
        };
        assert_eq!(anime.aid, 18989);
        assert_eq!(anime.date_flags(), Some("0"));
        assert_eq!(anime.year(), Some("2025-2025"));
        assert_eq!(anime.kind(), Some("TV Series"));
        assert_eq!(anime.get(AnimeField::SynonymList), Some("Synonym"));
    }

    #[test]
    fn test_anime_reply_without_aid_bit_uses_sent_aid() {
        let reply = parse("4 230 ANIME\n2025-2025", "ANIME aid=77&amask=20000000000000").unwrap();
        let Reply::Anime(anime) = reply else {
            panic!("expected anime");
        };
        assert_eq!(anime.aid, 77);
        assert_eq!(anime.year(), Some("2025-2025"));
    }

    #[test]
    fn test_last_field_absorbs_embedded_pipes() {
        let reply = parse(
            "4 230 ANIME\n5|2021|Shin Evangelion Gekijouban:||",
            "ANIME aid=5&amask=A0800000000000",
        )
        .unwrap();
        let Reply::Anime(anime) = reply else {
            panic!("expected anime");
        };
        assert_eq!(anime.romaji_name(), Some("Shin Evangelion Gekijouban:||"));
    }

    #[test]
    fn test_short_reply_fails_closed() {
        let result = parse(
            "4 230 ANIME\n18989|0|2025-2025",
            "ANIME aid=18989&amask=FC000000000000",
        );
        assert!(matches!(
            result,
            Err(ProtocolError::MaskMismatch {
                expected: 6,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_truncated_reply_drops_partial_token() {
        let mut text = String::from("4 230 ANIME\n18989|0|2025-2025|TV Series|||Romaji|");
        text.push_str(&"K".repeat(crate::protocol::MAX_PACKET_SIZE));
        let raw = Codec::new().decode(text.as_bytes()).unwrap();
        assert!(raw.truncated);

        let sent = CommandLine::parse("ANIME aid=18989&amask=FCFCFEFF7F80F8");
        let Reply::Anime(anime) = ReplyParser::new().parse(&raw, Some(&sent)).unwrap() else {
            panic!("expected anime");
        };
        assert_eq!(anime.romaji_name(), Some("Romaji"));
        assert_eq!(anime.get(AnimeField::KanjiName), None);
    }

    #[test]
    fn test_file_reply_fills_file_anime_episode_and_group() {
        let sent = "FILE size=100&ed2k=ff&fmask=7000000000&amask=80008080";
        let Reply::File {
            file,
            anime,
            episode,
            group,
        } = parse("6 220 FILE\n312498|4|30|6|12|01|Group", sent).unwrap()
        else {
            panic!("expected file");
        };
        assert_eq!(file.fid, 312498);
        assert_eq!(file.get(FileField::Eid), Some("30"));
        let anime = anime.unwrap();
        assert_eq!(anime.aid, 4);
        assert_eq!(anime.episodes(), Some(12));
        let episode = episode.unwrap();
        assert_eq!(episode.eid, 30);
        assert_eq!(episode.episode_number(), Some("01"));
        assert_eq!(episode.aid(), Some(4));
        let group = group.unwrap();
        assert_eq!(group.gid, 6);
        assert_eq!(group.name.as_deref(), Some("Group"));
        assert_eq!(FileAnimeField::GroupName.target(), FileAnimeTarget::GroupName);
    }

    #[test]
    fn test_file_reply_requires_sent_masks() {
        assert!(parse("6 220 FILE\n1|2", "FILE size=1&ed2k=ff").is_err());
    }

    #[test]
    fn test_mylist_replies_take_ids_from_the_request() {
        let reply = parse("8 210 MYLIST ENTRY ADDED\n555", "MYLISTADD size=10&ed2k=ab&state=1").unwrap();
        assert_eq!(
            reply,
            Reply::MylistAdded {
                lid: 555,
                size: Some(10),
                ed2k: Some("ab".to_string())
            }
        );

        let reply = parse(
            "9 221 MYLIST\n312498|30|4|6|1700000000|1|0|HDD||note|0",
            "MYLIST lid=555",
        )
        .unwrap();
        let Reply::Mylist(entry) = reply else {
            panic!("expected mylist");
        };
        assert_eq!(entry.lid, 555);
        assert_eq!(entry.other, "note");

        let reply = parse("10 320 NO SUCH FILE", "FILE size=10&ed2k=ab").unwrap();
        assert_eq!(
            reply,
            Reply::NoSuchFile {
                size: Some(10),
                ed2k: Some("ab".to_string())
            }
        );
    }

    #[test]
    fn test_episode_reply() {
        let reply = parse(
            "11 240 EPISODE\n30|4|24|800|10|01|Start|Hajimari|始まり|1700000000|1",
            "EPISODE eid=30",
        )
        .unwrap();
        let Reply::Episode(episode) = reply else {
            panic!("expected episode");
        };
        assert_eq!(episode.eid, 30);
        assert_eq!(episode.aid(), Some(4));
        assert_eq!(episode.english_name(), Some("Start"));
        assert_eq!(episode.get(EpisodeField::Type), Some("1"));
    }

    #[test]
    fn test_notify_list_and_ban() {
        let reply = parse("12 291 NOTIFYLIST\nM|100\nN|7\nM|101\n", "NOTIFYLIST ").unwrap();
        assert_eq!(
            reply,
            Reply::NotifyList(vec![
                (NotifyKind::Message, 100),
                (NotifyKind::Notification, 7),
                (NotifyKind::Message, 101)
            ])
        );

        let reply = parse("13 555 BANNED - flooding", "FILE size=1").unwrap();
        assert_eq!(
            reply,
            Reply::Banned {
                reason: "flooding".to_string()
            }
        );
    }

    #[test]
    fn test_session_and_unknown_codes() {
        assert_eq!(
            parse("5 506 INVALID SESSION", "FILE size=1").unwrap(),
            Reply::SessionInvalid(ResponseCode::INVALID_SESSION)
        );
        let tagless = ReplyParser::new().parse(&raw("598 UNKNOWN COMMAND"), None).unwrap();
        assert_eq!(tagless, Reply::UnknownCommand);
    }
}
