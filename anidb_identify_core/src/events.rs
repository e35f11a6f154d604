//! Event bus shared by the client, the hasher pool and their consumers
//!
//! Publishers call [`EventBus::publish`] from any thread. Consumers either
//! register a handler for one [`EventKind`] or take a channel that receives
//! every event in publish order. Handlers run on the publishing thread and
//! must not block.

use crate::hashing::HashOutcome;
use crate::protocol::Tag;
use crate::protocol::messages::NotificationRecord;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Discriminant used to subscribe to one kind of [`Event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PacketReply,
    FileHashed,
    Progress,
    Banned,
    PoolFinished,
    Notification,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A packet reached a terminal state
    PacketReply {
        tag: Tag,
        /// Command name, e.g. `FILE`
        command: String,
        /// `None` when the packet ran out of retries
        code: Option<u16>,
        text: String,
    },
    FileHashed {
        worker: usize,
        path: PathBuf,
        outcome: HashOutcome,
    },
    Progress {
        worker: usize,
        path: PathBuf,
        parts_done: u64,
        parts_total: u64,
    },
    Banned {
        reason: String,
    },
    /// Every hasher worker has exited
    PoolFinished,
    Notification(NotificationRecord),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PacketReply { .. } => EventKind::PacketReply,
            Self::FileHashed { .. } => EventKind::FileHashed,
            Self::Progress { .. } => EventKind::Progress,
            Self::Banned { .. } => EventKind::Banned,
            Self::PoolFinished => EventKind::PoolFinished,
            Self::Notification(_) => EventKind::Notification,
        }
    }
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Returned by [`EventBus::subscribe`]; pass to [`EventBus::unsubscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    handlers: Vec<(SubscriptionId, EventKind, Handler)>,
    channels: Vec<mpsc::UnboundedSender<Event>>,
}

/// Cloneable handle; all clones publish to the same subscribers
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Subscribers>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subscribers = self.lock();
        f.debug_struct("EventBus")
            .field("handlers", &subscribers.handlers.len())
            .field("channels", &subscribers.channels.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Call `handler` for every event of `kind`
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut subscribers = self.lock();
        subscribers.next_id += 1;
        let id = SubscriptionId(subscribers.next_id);
        subscribers.handlers.push((id, kind, Arc::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.lock().handlers.retain(|(handler_id, _, _)| *handler_id != id);
    }

    /// Receive every event published from now on
    ///
    /// Dropping the receiver unsubscribes it on the next publish.
    pub fn channel(&self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().channels.push(tx);
        rx
    }

    pub fn publish(&self, event: Event) {
        let kind = event.kind();
        let handlers: Vec<Handler> = {
            let mut subscribers = self.lock();
            subscribers
                .channels
                .retain(|channel| channel.send(event.clone()).is_ok());
            subscribers
                .handlers
                .iter()
                .filter(|(_, handler_kind, _)| *handler_kind == kind)
                .map(|(_, _, handler)| Arc::clone(handler))
                .collect()
        };
        // Handlers run unlocked so they may publish or subscribe themselves
        for handler in handlers {
            handler(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_handlers_only_see_their_kind() {
        let bus = EventBus::new();
        let banned = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&banned);
        bus.subscribe(EventKind::Banned, move |event| {
            assert!(matches!(event, Event::Banned { .. }));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(Event::PoolFinished);
        bus.publish(Event::Banned {
            reason: "flood".into(),
        });
        assert_eq!(banned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let id = bus.subscribe(EventKind::PoolFinished, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(Event::PoolFinished);
        bus.unsubscribe(id);
        bus.publish(Event::PoolFinished);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_channel_receives_everything_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.channel();
        let publisher = bus.clone();

        std::thread::spawn(move || {
            publisher.publish(Event::Progress {
                worker: 0,
                path: PathBuf::from("a.mkv"),
                parts_done: 1,
                parts_total: 3,
            });
            publisher.publish(Event::PoolFinished);
        })
        .join()
        .unwrap();

        assert_eq!(rx.recv().await.unwrap().kind(), EventKind::Progress);
        assert_eq!(rx.recv().await.unwrap(), Event::PoolFinished);
    }

    #[test]
    fn test_dropped_channel_is_pruned() {
        let bus = EventBus::new();
        drop(bus.channel());
        bus.publish(Event::PoolFinished);
        assert_eq!(bus.lock().channels.len(), 0);
    }
}
