//! Datagram framing
//!
//! Requests go out as `<CMD> params&s=<session>&tag=<tag>`. Replies come
//! back as `[<tag> ]<code> <text>\n<body>`, optionally DEFLATE-compressed.

mod compression;

pub use compression::{compress, decompress_if_needed};

use crate::protocol::MAX_PACKET_SIZE;
use crate::protocol::error::{ProtocolError, ResponseCode, Result};
use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, trace};

/// Reply header and body, before any command-specific parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReply {
    /// Echoed request tag; 0 when the server sent none
    pub tag: u64,
    pub code: ResponseCode,
    /// Header text after the code, e.g. the session id and "LOGIN ACCEPTED"
    pub text: String,
    /// Everything after the first line
    pub body: String,
    /// The datagram filled the whole packet and was probably cut short
    pub truncated: bool,
}

impl RawReply {
    /// Body lines, skipping blank ones
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.body.lines().filter(|line| !line.is_empty())
    }

    /// First whitespace-separated word of the header text
    pub fn first_word(&self) -> Option<&str> {
        self.text.split_whitespace().next()
    }

    /// Header text after the first `"- "`, as used by BANNED replies
    pub fn reason(&self) -> String {
        let full = if self.body.is_empty() {
            self.text.clone()
        } else {
            format!("{}\n{}", self.text, self.body)
        };
        match full.find("- ") {
            Some(index) => full[index + 2..].trim().to_string(),
            None => String::new(),
        }
    }
}

/// Encodes requests and decodes replies
#[derive(Debug, Clone, Default)]
pub struct Codec;

impl Codec {
    pub fn new() -> Self {
        Self
    }

    /// Append session and tag to `command` and check the packet size
    pub fn encode(&self, command: &str, session: Option<&str>, tag: u64) -> Result<Bytes> {
        let mut buffer = BytesMut::with_capacity(MAX_PACKET_SIZE);
        buffer.put(command.as_bytes());

        // Parameterless commands end in a space and take no leading '&'
        let mut separator = if command.ends_with(' ') { "" } else { "&" };
        if let Some(session) = session.filter(|s| !s.is_empty()) {
            buffer.put(separator.as_bytes());
            buffer.put(format!("s={session}").as_bytes());
            separator = "&";
        }
        buffer.put(separator.as_bytes());
        buffer.put(format!("tag={tag}").as_bytes());

        if buffer.len() > MAX_PACKET_SIZE {
            debug!(
                "Command too large: {} bytes (max: {MAX_PACKET_SIZE})",
                buffer.len()
            );
            return Err(ProtocolError::packet_too_large(buffer.len(), MAX_PACKET_SIZE));
        }
        Ok(buffer.freeze())
    }

    /// Decode one received datagram
    pub fn decode(&self, datagram: &[u8]) -> Result<RawReply> {
        let truncated = datagram.len() >= MAX_PACKET_SIZE;
        let payload = decompress_if_needed(datagram);

        let text = match std::str::from_utf8(&payload) {
            Ok(text) => text.to_string(),
            // A cut datagram may end inside a multibyte character
            Err(_) if truncated => String::from_utf8_lossy(&payload).into_owned(),
            Err(e) => return Err(ProtocolError::decoding(format!("Invalid UTF-8: {e}"))),
        };
        trace!("Decoded reply: {text}");

        let (header, body) = match text.split_once('\n') {
            Some((header, body)) => (header.trim_end_matches('\r'), body.trim_end_matches('\n')),
            None => (text.as_str(), ""),
        };

        let mut words = header.splitn(3, ' ');
        let first = words.next().unwrap_or_default();
        let second = words.next().unwrap_or_default();
        let rest = words.next().unwrap_or_default();

        let parse_code = |word: &str| -> Option<ResponseCode> {
            (word.len() == 3 && word.bytes().all(|b| b.is_ascii_digit()))
                .then(|| word.parse().ok().map(ResponseCode))
                .flatten()
        };

        let (tag, code, text) = match (first.parse::<u64>(), parse_code(second)) {
            (Ok(tag), Some(code)) => (tag, code, rest.to_string()),
            _ => match parse_code(first) {
                Some(code) => {
                    let text = if rest.is_empty() {
                        second.to_string()
                    } else {
                        format!("{second} {rest}")
                    };
                    (0, code, text)
                }
                None => {
                    return Err(ProtocolError::decoding(format!(
                        "Reply header has no code: {header}"
                    )));
                }
            },
        };

        Ok(RawReply {
            tag,
            code,
            text,
            body: body.to_string(),
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_appends_session_and_tag() {
        let codec = Codec::new();
        let bytes = codec
            .encode("FILE size=1&ed2k=ff", Some("abc12"), 7)
            .unwrap();
        assert_eq!(&bytes[..], b"FILE size=1&ed2k=ff&s=abc12&tag=7");

        let bytes = codec.encode("LOGOUT ", Some("abc12"), 8).unwrap();
        assert_eq!(&bytes[..], b"LOGOUT s=abc12&tag=8");

        let bytes = codec.encode("AUTH user=u&pass=p", None, 1).unwrap();
        assert_eq!(&bytes[..], b"AUTH user=u&pass=p&tag=1");
    }

    #[test]
    fn test_encode_rejects_oversized_packets() {
        let codec = Codec::new();
        let command = format!("FILE x={}", "a".repeat(MAX_PACKET_SIZE));
        assert!(matches!(
            codec.encode(&command, None, 1),
            Err(ProtocolError::PacketTooLarge { .. })
        ));
    }

    #[test]
    fn test_decode_tagged_reply() {
        let reply = Codec::new()
            .decode(b"12 200 abcde LOGIN ACCEPTED\n")
            .unwrap();
        assert_eq!(reply.tag, 12);
        assert_eq!(reply.code, ResponseCode::LOGIN_ACCEPTED);
        assert_eq!(reply.first_word(), Some("abcde"));
        assert!(reply.body.is_empty());
        assert!(!reply.truncated);
    }

    #[test]
    fn test_decode_tagless_reply_uses_tag_zero() {
        let reply = Codec::new().decode(b"598 UNKNOWN COMMAND").unwrap();
        assert_eq!(reply.tag, 0);
        assert_eq!(reply.code, ResponseCode::UNKNOWN_COMMAND);
        assert_eq!(reply.text, "UNKNOWN COMMAND");
    }

    #[test]
    fn test_decode_body_and_ban_reason() {
        let reply = Codec::new()
            .decode(b"3 555 BANNED\nLeech - too many requests\n")
            .unwrap();
        assert_eq!(reply.code, ResponseCode::BANNED);
        assert_eq!(reply.lines().collect::<Vec<_>>(), vec!["Leech - too many requests"]);
        assert_eq!(reply.reason(), "too many requests");
    }

    #[test]
    fn test_decode_compressed_reply() {
        let framed = compress(b"9 230 ANIME\n18989|0").unwrap();
        let reply = Codec::new().decode(&framed).unwrap();
        assert_eq!(reply.tag, 9);
        assert_eq!(reply.body, "18989|0");
    }

    #[test]
    fn test_decode_flags_full_packets_as_truncated() {
        let mut datagram = b"4 220 FILE\n".to_vec();
        datagram.resize(MAX_PACKET_SIZE, b'x');
        let reply = Codec::new().decode(&datagram).unwrap();
        assert!(reply.truncated);
    }

    #[test]
    fn test_decode_rejects_headerless_garbage() {
        assert!(Codec::new().decode(b"hello world").is_err());
        assert!(Codec::new().decode(&[0xFF, 0xFE, 0x20]).is_err());
    }
}
