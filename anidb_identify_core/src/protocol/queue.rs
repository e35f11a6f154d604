//! Retrying packet queue
//!
//! Pure in-memory state: which tags wait to be sent, which are in flight
//! and when they expire. The client mirrors every transition into the
//! packet log so the queue can be rebuilt after a restart.

use log::{debug, warn};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Request correlation id; 0 is reserved for tagless replies
pub type Tag = u64;

/// A command waiting for its reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPacket {
    pub tag: Tag,
    pub command: String,
    pub retries: u32,
    deadline: Option<Instant>,
}

impl PendingPacket {
    pub fn is_auth(&self) -> bool {
        self.command.starts_with("AUTH ")
    }
}

/// What happened to an expired packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expiry {
    /// Back in the send queue; `retries` now counts this resend
    Retry { tag: Tag, retries: u32 },
    /// Out of retries; terminal
    Exhausted { tag: Tag, command: String },
}

/// Tag-keyed send queue with bounded retries
#[derive(Debug)]
pub struct PacketQueue {
    last_tag: Tag,
    waiting: BTreeMap<Tag, PendingPacket>,
    in_flight: BTreeMap<Tag, PendingPacket>,
    max_retries: u32,
    reply_timeout: Duration,
}

impl PacketQueue {
    pub fn new(max_retries: u32, reply_timeout: Duration) -> Self {
        Self {
            last_tag: 0,
            waiting: BTreeMap::new(),
            in_flight: BTreeMap::new(),
            max_retries,
            reply_timeout,
        }
    }

    /// Never hand out a tag at or below `tag`
    pub fn seed_tag(&mut self, tag: Tag) {
        self.last_tag = self.last_tag.max(tag);
    }

    /// Queue `command` under a fresh tag
    pub fn enqueue(&mut self, command: impl Into<String>) -> Tag {
        self.last_tag += 1;
        let tag = self.last_tag;
        self.waiting.insert(
            tag,
            PendingPacket {
                tag,
                command: command.into(),
                retries: 0,
                deadline: None,
            },
        );
        tag
    }

    /// Put a logged packet back as unsent, keeping its retry budget
    pub fn restore(&mut self, tag: Tag, command: impl Into<String>, retries: u32) {
        self.seed_tag(tag);
        self.in_flight.remove(&tag);
        self.waiting.insert(
            tag,
            PendingPacket {
                tag,
                command: command.into(),
                retries,
                deadline: None,
            },
        );
    }

    /// Lowest waiting tag
    pub fn peek(&self) -> Option<&PendingPacket> {
        self.waiting.values().next()
    }

    /// `tag` if it is waiting to be sent
    pub fn waiting(&self, tag: Tag) -> Option<&PendingPacket> {
        self.waiting.get(&tag)
    }

    /// A waiting or in-flight AUTH, if any
    pub fn pending_auth(&self) -> Option<Tag> {
        self.waiting
            .values()
            .chain(self.in_flight.values())
            .find(|packet| packet.is_auth())
            .map(|packet| packet.tag)
    }

    /// Move `tag` in flight and start its reply deadline
    pub fn mark_sent(&mut self, tag: Tag, now: Instant) -> Option<&PendingPacket> {
        let mut packet = self.waiting.remove(&tag)?;
        packet.deadline = Some(now + self.reply_timeout);
        self.in_flight.insert(tag, packet);
        self.in_flight.get(&tag)
    }

    /// Handle expired deadlines
    pub fn poll_timeouts(&mut self, now: Instant) -> Vec<Expiry> {
        let expired: Vec<Tag> = self
            .in_flight
            .values()
            .filter(|packet| packet.deadline.is_some_and(|deadline| deadline <= now))
            .map(|packet| packet.tag)
            .collect();

        let mut events = Vec::with_capacity(expired.len());
        for tag in expired {
            let Some(mut packet) = self.in_flight.remove(&tag) else {
                continue;
            };
            if packet.retries < self.max_retries {
                packet.retries += 1;
                packet.deadline = None;
                debug!("Tag {tag} timed out, retry {}", packet.retries);
                events.push(Expiry::Retry {
                    tag,
                    retries: packet.retries,
                });
                self.waiting.insert(tag, packet);
            } else {
                warn!("Tag {tag} exhausted {} retries", self.max_retries);
                events.push(Expiry::Exhausted {
                    tag,
                    command: packet.command,
                });
            }
        }
        events
    }

    /// Restart every running reply deadline from `now`
    pub fn hold_deadlines(&mut self, now: Instant) {
        for packet in self.in_flight.values_mut() {
            if packet.deadline.is_some() {
                packet.deadline = Some(now + self.reply_timeout);
            }
        }
    }

    /// Remove and return every packet not yet sent, lowest tag first
    pub fn drain_waiting(&mut self) -> Vec<PendingPacket> {
        std::mem::take(&mut self.waiting).into_values().collect()
    }

    /// A reply arrived for `tag`
    ///
    /// Late replies to a packet already requeued for retry still count.
    pub fn complete(&mut self, tag: Tag) -> Option<PendingPacket> {
        self.in_flight
            .remove(&tag)
            .or_else(|| self.waiting.remove(&tag))
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        self.waiting.is_empty() && self.in_flight.is_empty()
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.waiting.contains_key(&tag) || self.in_flight.contains_key(&tag)
    }

    /// When the earliest in-flight deadline expires
    pub fn next_deadline(&self) -> Option<Instant> {
        self.in_flight.values().filter_map(|packet| packet.deadline).min()
    }
}
