//! Command builders
//!
//! Every builder is a pure function of its inputs. Parameters keep the order
//! in which they are pushed so the wire text is stable and testable.

use super::encode_value;
use crate::protocol::PROTOCOL_VERSION;
use crate::protocol::mask::Mask;
use std::fmt;

/// Watched state for MYLISTADD, given 1-based by callers
///
/// `0` means "leave the server's value alone", `1` unwatched, `2` watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Viewed {
    #[default]
    NoChange,
    Unwatched,
    Watched,
}

impl Viewed {
    /// Map the 1-based UI value; anything outside 1..=2 is treated as no change
    pub fn from_one_based(value: u8) -> Self {
        match value {
            1 => Self::Unwatched,
            2 => Self::Watched,
            _ => Self::NoChange,
        }
    }

    /// Value placed in `viewed=`; `None` omits the parameter
    pub fn wire_value(self) -> Option<u8> {
        match self {
            Self::NoChange => None,
            Self::Unwatched => Some(0),
            Self::Watched => Some(1),
        }
    }
}

/// Parameters of a MYLISTADD request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MylistAdd {
    pub size: u64,
    pub ed2k: String,
    pub viewed: Viewed,
    pub storage: String,
    pub edit: bool,
    /// 0 unknown, 1 internal storage, 2 external storage, 3 deleted, 4 remote
    pub state: u8,
}

impl MylistAdd {
    pub fn new(size: u64, ed2k: impl Into<String>) -> Self {
        Self {
            size,
            ed2k: ed2k.into(),
            viewed: Viewed::NoChange,
            storage: String::new(),
            edit: false,
            state: 1,
        }
    }

    pub fn viewed(mut self, viewed: Viewed) -> Self {
        self.viewed = viewed;
        self
    }

    pub fn storage(mut self, storage: impl Into<String>) -> Self {
        self.storage = storage.into();
        self
    }

    pub fn state(mut self, state: u8) -> Self {
        self.state = state;
        self
    }

    pub fn edit(mut self, edit: bool) -> Self {
        self.edit = edit;
        self
    }
}

/// Which NOTIFYGET variant to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    /// Private message
    Message,
    /// New-file notification
    Notification,
}

impl NotifyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "M",
            Self::Notification => "N",
        }
    }
}

/// Every command this client sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Auth {
        user: String,
        pass: String,
        client: String,
        client_version: u32,
        compression: bool,
    },
    Logout,
    File {
        size: u64,
        ed2k: String,
        fmask: Mask,
        amask: Mask,
    },
    MylistAdd(MylistAdd),
    /// MYLIST for a positive lid, MYLISTSTATS otherwise
    Mylist {
        lid: i64,
    },
    Anime {
        aid: u64,
        amask: Mask,
    },
    Episode {
        eid: u64,
    },
    NotifyList,
    NotifyGet {
        kind: NotifyKind,
        id: u64,
    },
    PushAck {
        nid: u64,
    },
}

impl Command {
    pub fn auth(
        user: impl Into<String>,
        pass: impl Into<String>,
        client: impl Into<String>,
        client_version: u32,
    ) -> Self {
        Self::Auth {
            user: user.into(),
            pass: pass.into(),
            client: client.into(),
            client_version,
            compression: true,
        }
    }

    pub fn file(size: u64, ed2k: impl Into<String>, fmask: Mask, amask: Mask) -> Self {
        Self::File {
            size,
            ed2k: ed2k.into(),
            fmask,
            amask,
        }
    }

    pub fn mylist(lid: i64) -> Self {
        Self::Mylist { lid }
    }

    pub fn anime(aid: u64, amask: Mask) -> Self {
        Self::Anime { aid, amask }
    }

    /// Command name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "AUTH",
            Self::Logout => "LOGOUT",
            Self::File { .. } => "FILE",
            Self::MylistAdd(_) => "MYLISTADD",
            Self::Mylist { lid } if *lid > 0 => "MYLIST",
            Self::Mylist { .. } => "MYLISTSTATS",
            Self::Anime { .. } => "ANIME",
            Self::Episode { .. } => "EPISODE",
            Self::NotifyList => "NOTIFYLIST",
            Self::NotifyGet { .. } => "NOTIFYGET",
            Self::PushAck { .. } => "PUSHACK",
        }
    }

    /// Ordered parameters, values not yet escaped
    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Auth {
                user,
                pass,
                client,
                client_version,
                compression,
            } => {
                let mut params = vec![
                    ("user", user.clone()),
                    ("pass", pass.clone()),
                    ("protover", PROTOCOL_VERSION.to_string()),
                    ("client", client.clone()),
                    ("clientver", client_version.to_string()),
                    ("enc", "utf8".to_string()),
                ];
                if *compression {
                    params.push(("comp", "1".to_string()));
                }
                params
            }
            Self::Logout | Self::NotifyList => Vec::new(),
            Self::File {
                size,
                ed2k,
                fmask,
                amask,
            } => vec![
                ("size", size.to_string()),
                ("ed2k", ed2k.clone()),
                ("fmask", fmask.to_string()),
                ("amask", amask.to_string()),
            ],
            Self::MylistAdd(add) => {
                let mut params = vec![("size", add.size.to_string()), ("ed2k", add.ed2k.clone())];
                if let Some(viewed) = add.viewed.wire_value() {
                    params.push(("viewed", viewed.to_string()));
                }
                if !add.storage.is_empty() {
                    params.push(("storage", add.storage.clone()));
                }
                if add.edit {
                    params.push(("edit", "1".to_string()));
                }
                params.push(("state", add.state.to_string()));
                params
            }
            Self::Mylist { lid } if *lid > 0 => vec![("lid", lid.to_string())],
            Self::Mylist { .. } => Vec::new(),
            Self::Anime { aid, amask } => {
                vec![("aid", aid.to_string()), ("amask", amask.to_string())]
            }
            Self::Episode { eid } => vec![("eid", eid.to_string())],
            Self::NotifyGet { kind, id } => {
                vec![("type", kind.as_str().to_string()), ("id", id.to_string())]
            }
            Self::PushAck { nid } => vec![("nid", nid.to_string())],
        }
    }

    /// Wire text without session or tag
    pub fn encode(&self) -> String {
        let params = self
            .params()
            .into_iter()
            .map(|(key, value)| format!("{key}={}", encode_value(&value)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{} {params}", self.name())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// A stored command text split back into name and parameters
///
/// Reply handlers use this to recover what was asked (lid, size, ed2k, masks)
/// from the packet log instead of keeping a second copy of each request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub name: String,
    pub params: Vec<(String, String)>,
}

impl CommandLine {
    pub fn parse(text: &str) -> Self {
        let (name, rest) = text.split_once(' ').unwrap_or((text, ""));
        let params = rest
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter_map(|pair| pair.split_once('='))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        Self {
            name: name.to_string(),
            params,
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.param(key).and_then(|value| value.parse().ok())
    }

    pub fn is_auth(&self) -> bool {
        self.name == "AUTH"
    }

    /// Text with the password replaced, for logging
    pub fn redacted(text: &str) -> String {
        let line = Self::parse(text);
        if line.param("pass").is_none() {
            return text.to_string();
        }
        let params = line
            .params
            .iter()
            .map(|(key, value)| {
                if key == "pass" {
                    format!("{key}=***")
                } else {
                    format!("{key}={value}")
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        format!("{} {params}", line.name)
    }
}
