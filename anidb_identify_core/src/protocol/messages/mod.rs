//! Typed commands, reply parsing, and the records replies populate

pub mod command;
pub mod records;
pub mod response;

pub use command::{Command, CommandLine, MylistAdd, NotifyKind, Viewed};
pub use records::{
    AnimeInfo, EpisodeInfo, FileInfo, GroupInfo, MylistEntry, MylistStats, NotificationRecord,
    NotificationSource,
};
pub use response::{Reply, ReplyParser};

/// Field separator inside reply bodies
pub const FIELD_SEPARATOR: char = '|';

/// Newline encoding for multiline values
pub const ENCODED_NEWLINE: &str = "<br />";

/// Escape an option value for transmission
///
/// AniDB expects html form encoding for `&` and `<br />` for newlines; every
/// other character is sent as UTF-8 unchanged.
pub fn encode_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '\n' => out.push_str(ENCODED_NEWLINE),
            '\r' => {}
            _ => out.push(ch),
        }
    }
    out
}

/// Reverse [`encode_value`] on a value received from the server
pub fn decode_value(value: &str) -> String {
    if !value.contains('&') && !value.contains('<') {
        return value.to_string();
    }
    value.replace(ENCODED_NEWLINE, "\n").replace("&amp;", "&")
}
