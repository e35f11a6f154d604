//! In-memory stand-in for the UDP socket

use anidb_identify_core::protocol::Transport;
use anidb_identify_core::protocol::error::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

type Responder = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

struct Inner {
    sent: Mutex<Vec<Vec<u8>>>,
    responder: Mutex<Option<Responder>>,
    replies_tx: mpsc::UnboundedSender<Vec<u8>>,
    replies_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

/// Records every datagram sent and hands out injected replies in order
///
/// Clones share state, so a test keeps one clone and gives the other to the
/// client.
///
/// ```rust
/// use anidb_identify_test_utils::{MockTransport, tag_of};
///
/// let transport = MockTransport::new();
/// transport.respond_with(|sent| {
///     let tag = tag_of(sent)?;
///     sent.starts_with("AUTH ").then(|| format!("{tag} 200 abcde LOGIN ACCEPTED"))
/// });
/// ```
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    pub fn new() -> Self {
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                sent: Mutex::new(Vec::new()),
                responder: Mutex::new(None),
                replies_tx,
                replies_rx: tokio::sync::Mutex::new(replies_rx),
            }),
        }
    }

    /// Queue raw reply bytes for the next `recv`
    pub fn inject(&self, datagram: impl Into<Vec<u8>>) {
        let _ = self.inner.replies_tx.send(datagram.into());
    }

    pub fn inject_reply(&self, text: &str) {
        self.inject(text.as_bytes().to_vec());
    }

    /// Answer every sent datagram with whatever `responder` returns
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        *lock(&self.inner.responder) = Some(Box::new(responder));
    }

    /// Everything sent so far, decoded lossily
    pub fn sent(&self) -> Vec<String> {
        lock(&self.inner.sent)
            .iter()
            .map(|datagram| String::from_utf8_lossy(datagram).into_owned())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        lock(&self.inner.sent).len()
    }

    /// Poll until `count` datagrams were sent or `timeout` passes
    pub async fn wait_for_sends(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.sent_count() < count {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("sent", &self.sent_count())
            .finish()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, datagram: &[u8]) -> Result<()> {
        lock(&self.inner.sent).push(datagram.to_vec());
        let text = String::from_utf8_lossy(datagram);
        let reply = lock(&self.inner.responder)
            .as_ref()
            .and_then(|responder| responder(&text));
        if let Some(reply) = reply {
            self.inject_reply(&reply);
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>> {
        let mut replies = self.inner.replies_rx.lock().await;
        match replies.recv().await {
            Some(datagram) => Ok(datagram),
            // The sender lives in `inner`, so the channel never closes
            None => std::future::pending().await,
        }
    }
}

/// The `tag=` value of a sent command
pub fn tag_of(datagram: &str) -> Option<u64> {
    datagram
        .split(['&', ' '])
        .find_map(|part| part.strip_prefix("tag="))
        .and_then(|tag| tag.trim().parse().ok())
}
