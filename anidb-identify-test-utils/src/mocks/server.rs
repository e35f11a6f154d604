//! A scripted AniDB that answers from a table of known files
//!
//! Plug it into [`MockTransport::respond_with`](super::MockTransport::respond_with)
//! through [`FakeAnidb::responder`]. FILE replies are built field by field
//! from the masks in the request, so any mask the client picks gets a reply
//! of the right shape.

use super::tag_of;
use anidb_identify_core::protocol::mask::{
    FILE_AMASK, FILE_FMASK, FileAnimeField, FileField, Mask, MaskLayout, Slot,
};
use anidb_identify_core::protocol::messages::CommandLine;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Session key handed out on every login
pub const FAKE_SESSION: &str = "abcde";

/// Ids the fake server reports for a known file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownFile {
    pub fid: i64,
    pub aid: i64,
    pub eid: i64,
    pub gid: i64,
}

impl KnownFile {
    /// Ids derived from `fid` so tests can predict them
    pub fn numbered(fid: i64) -> Self {
        Self {
            fid,
            aid: fid * 10,
            eid: fid * 100,
            gid: fid * 1000,
        }
    }
}

#[derive(Default)]
struct State {
    files: HashMap<(u64, String), KnownFile>,
    mylist: HashMap<i64, i64>,
    next_lid: i64,
    ban: Option<String>,
    commands: Vec<String>,
}

/// Shared fake server; clones see the same state
#[derive(Clone, Default)]
pub struct FakeAnidb {
    state: Arc<Mutex<State>>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FakeAnidb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `size`/`ed2k` a file the server knows
    pub fn with_file(self, size: u64, ed2k: &str, file: KnownFile) -> Self {
        lock(&self.state)
            .files
            .insert((size, ed2k.to_ascii_lowercase()), file);
        self
    }

    /// Put a known file's fid in the mylist under `lid`
    pub fn with_mylist_entry(self, fid: i64, lid: i64) -> Self {
        lock(&self.state).mylist.insert(fid, lid);
        self
    }

    /// Answer everything but AUTH and LOGOUT with 555
    pub fn banning(self, reason: &str) -> Self {
        lock(&self.state).ban = Some(reason.to_string());
        self
    }

    /// Names of the commands answered so far, in order
    pub fn commands(&self) -> Vec<String> {
        lock(&self.state).commands.clone()
    }

    /// Lid assigned to `fid`, if it is in the mylist
    pub fn lid_of(&self, fid: i64) -> Option<i64> {
        lock(&self.state).mylist.get(&fid).copied()
    }

    pub fn responder(&self) -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
        let server = self.clone();
        move |sent| server.reply_to(sent)
    }

    /// The reply to one sent datagram; `None` for commands it ignores
    pub fn reply_to(&self, sent: &str) -> Option<String> {
        let tag = tag_of(sent)?;
        let line = CommandLine::parse(sent.trim_end());
        let mut state = lock(&self.state);
        state.commands.push(line.name.clone());

        let body = match line.name.as_str() {
            "AUTH" => format!("200 {FAKE_SESSION} LOGIN ACCEPTED"),
            "LOGOUT" => "203 LOGGED OUT".to_string(),
            _ if state.ban.is_some() => {
                format!("555 BANNED - {}", state.ban.as_deref().unwrap_or_default())
            }
            "FILE" => match state.lookup(&line) {
                Some((file, size, ed2k)) => {
                    let lid = state.mylist.get(&file.fid).copied().unwrap_or(0);
                    format!("220 FILE\n{}", file_body(&line, &file, lid, size, &ed2k)?)
                }
                None => "320 NO SUCH FILE".to_string(),
            },
            "MYLISTADD" => match state.lookup(&line) {
                Some((file, _, _)) => match state.mylist.get(&file.fid).copied() {
                    Some(_) if line.param("edit") == Some("1") => {
                        "311 MYLIST ENTRY EDITED".to_string()
                    }
                    Some(lid) => format!(
                        "310 FILE ALREADY IN MYLIST\n{lid}|{}|{}|{}|{}",
                        file.fid, file.eid, file.aid, file.gid
                    ),
                    None => {
                        state.next_lid += 1;
                        let lid = 9000 + state.next_lid;
                        state.mylist.insert(file.fid, lid);
                        format!("210 MYLIST ENTRY ADDED\n{lid}")
                    }
                },
                None => "320 NO SUCH FILE".to_string(),
            },
            _ => return None,
        };
        Some(format!("{tag} {body}"))
    }
}

impl State {
    fn lookup(&self, line: &CommandLine) -> Option<(KnownFile, u64, String)> {
        let size = line.param_u64("size")?;
        let ed2k = line.param("ed2k")?.to_ascii_lowercase();
        let file = *self.files.get(&(size, ed2k.clone()))?;
        Some((file, size, ed2k))
    }
}

/// `fid|fmask fields|amask fields`, one token per set bit
fn file_body(
    line: &CommandLine,
    file: &KnownFile,
    lid: i64,
    size: u64,
    ed2k: &str,
) -> Option<String> {
    let fmask = Mask::from_hex(line.param("fmask")?, FILE_FMASK.width()).ok()?;
    let amask = Mask::from_hex(line.param("amask")?, FILE_AMASK.width()).ok()?;

    let mut tokens = vec![file.fid.to_string()];
    tokens.extend(tokens_for(&FILE_FMASK, &fmask, |field| match field {
        FileField::Aid => file.aid.to_string(),
        FileField::Eid => file.eid.to_string(),
        FileField::Gid => file.gid.to_string(),
        FileField::Lid => lid.to_string(),
        FileField::Size => size.to_string(),
        FileField::Ed2k => ed2k.to_string(),
        FileField::IsDeprecated => "0".to_string(),
        FileField::AnidbFilename => format!("file-{}.mkv", file.fid),
        _ => "1".to_string(),
    }));
    tokens.extend(tokens_for(&FILE_AMASK, &amask, |field| match field {
        FileAnimeField::RomajiName => format!("Anime {}", file.aid),
        FileAnimeField::EpisodeName => format!("Episode {}", file.eid),
        FileAnimeField::EpisodeNumber => "01".to_string(),
        FileAnimeField::GroupName => format!("Group {}", file.gid),
        FileAnimeField::GroupShortName => format!("G{}", file.gid),
        _ => "1".to_string(),
    }));
    Some(tokens.join("|"))
}

fn tokens_for<F: Copy + PartialEq>(
    layout: &MaskLayout<F>,
    mask: &Mask,
    value: impl Fn(F) -> String,
) -> Vec<String> {
    mask.set_bits()
        .filter_map(|(byte, bit)| match layout.slot(byte, bit) {
            Slot::Leading => None,
            Slot::Field(field) => Some(value(field)),
            Slot::Retired | Slot::Unused => Some(String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anidb_identify_core::protocol::messages::Command;

    const ED2K: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_auth_and_logout() {
        let server = FakeAnidb::new();
        assert_eq!(
            server.reply_to("AUTH user=u&pass=p&tag=1").as_deref(),
            Some("1 200 abcde LOGIN ACCEPTED")
        );
        assert_eq!(
            server.reply_to("LOGOUT s=abcde&tag=2").as_deref(),
            Some("2 203 LOGGED OUT")
        );
        assert_eq!(server.commands(), ["AUTH", "LOGOUT"]);
    }

    #[test]
    fn test_file_reply_follows_masks() {
        let server = FakeAnidb::new().with_file(1024, ED2K, KnownFile::numbered(7));
        let fmask = FILE_FMASK.mask_for(&[FileField::Aid, FileField::Gid, FileField::Size]);
        let amask = FILE_AMASK.mask_for(&[FileAnimeField::GroupName]);
        let sent = format!("{}&s=abcde&tag=4", Command::file(1024, ED2K, fmask, amask).encode());

        let reply = server.reply_to(&sent).unwrap();
        assert_eq!(reply, "4 220 FILE\n7|70|7000|1024|Group 7000");
    }

    #[test]
    fn test_unknown_file_and_mylist_add() {
        let server = FakeAnidb::new().with_file(1024, ED2K, KnownFile::numbered(7));
        assert_eq!(
            server
                .reply_to("FILE size=5&ed2k=aa&fmask=7000000000&amask=00000000&tag=3")
                .as_deref(),
            Some("3 320 NO SUCH FILE")
        );

        let add = format!("MYLISTADD size=1024&ed2k={ED2K}&state=1&tag=5");
        assert_eq!(server.reply_to(&add).as_deref(), Some("5 210 MYLIST ENTRY ADDED\n9001"));
        assert_eq!(server.lid_of(7), Some(9001));
        assert!(server.reply_to(&add).unwrap().starts_with("5 310 9001|7|"));
        let edit = format!("MYLISTADD size=1024&ed2k={ED2K}&state=1&edit=1&tag=6");
        assert_eq!(server.reply_to(&edit).as_deref(), Some("6 311 MYLIST ENTRY EDITED"));
    }

    #[test]
    fn test_ban_spares_login() {
        let server = FakeAnidb::new().banning("flooding");
        assert!(server.reply_to("AUTH user=u&tag=1").unwrap().contains(" 200 "));
        assert_eq!(
            server.reply_to("FILE size=1&ed2k=aa&tag=2").as_deref(),
            Some("2 555 BANNED - flooding")
        );
    }
}
