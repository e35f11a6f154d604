//! Periodic send/receive loop
//!
//! [`ApiClient`] owns the transport, the packet queue and a storage
//! connection. It wakes on a fixed interval to send at most one datagram
//! and whenever a datagram arrives. Every queue transition is written
//! through to the packet log before the next suspension point, and every
//! terminal packet is announced on the event bus.
//!
//! [`ApiClient::spawn`] moves the client onto a tokio task and hands back a
//! [`ClientHandle`] for issuing commands.

use crate::database::Store;
use crate::database::models::{FileStatus, PacketRecord, TIMEOUT_REPLY, time_utils};
use crate::events::{Event, EventBus};
use crate::protocol::codec::{Codec, RawReply};
use crate::protocol::error::{ProtocolError, ResponseCode};
use crate::protocol::messages::{
    Command, CommandLine, FileInfo, NotificationRecord, NotificationSource, NotifyKind, Reply,
    ReplyParser,
};
use crate::protocol::queue::{Expiry, PacketQueue, PendingPacket, Tag};
use crate::protocol::session::SessionHandle;
use crate::protocol::transport::Transport;
use crate::protocol::{
    DEFAULT_PORT, DEFAULT_SERVER, MAX_RETRIES, REPLY_TIMEOUT_MS, SEND_INTERVAL_MS,
};
use crate::protocol::mask::FileField;
use crate::{Error, Result, error::InternalError};
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Reply stored for an AUTH found open at startup; credentials are never
/// persisted, so it cannot be resent
const ABANDONED_REPLY: &str = "ABANDONED";

/// NOTIFYGET requests issued per NOTIFYLIST reply
const MAX_NOTIFY_FETCH: usize = 10;

/// Protocol client configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub host: String,
    pub port: u16,
    /// Local UDP port; 0 picks an ephemeral one
    pub local_port: u16,
    /// Registered client name sent with AUTH
    pub client_name: String,
    pub client_version: u32,
    pub username: String,
    pub password: String,
    pub send_interval_ms: u64,
    pub reply_timeout_ms: u64,
    pub max_retries: u32,
    /// Advertise DEFLATE support in AUTH
    pub compression: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER.to_string(),
            port: DEFAULT_PORT,
            local_port: 0,
            client_name: "anidbidentify".to_string(),
            client_version: 1,
            username: String::new(),
            password: String::new(),
            send_interval_ms: SEND_INTERVAL_MS,
            reply_timeout_ms: REPLY_TIMEOUT_MS,
            max_retries: MAX_RETRIES,
            compression: true,
        }
    }
}

impl fmt::Debug for ProtocolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("local_port", &self.local_port)
            .field("client_name", &self.client_name)
            .field("client_version", &self.client_version)
            .field("username", &self.username)
            .field("password", &"***")
            .field("send_interval_ms", &self.send_interval_ms)
            .field("reply_timeout_ms", &self.reply_timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("compression", &self.compression)
            .finish()
    }
}

impl ProtocolConfig {
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    fn auth_command(&self) -> Command {
        let mut auth = Command::auth(
            self.username.clone(),
            self.password.clone(),
            self.client_name.clone(),
            self.client_version,
        );
        if let Command::Auth { compression, .. } = &mut auth {
            *compression = self.compression;
        }
        auth
    }
}

/// Snapshot of the loop's state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStatus {
    pub waiting: usize,
    pub in_flight: usize,
    pub logged_in: bool,
    pub banned: bool,
    /// Why the client cannot log in, if it gave up
    pub stalled: Option<String>,
}

impl ClientStatus {
    pub fn is_idle(&self) -> bool {
        self.waiting == 0 && self.in_flight == 0
    }
}

/// The protocol state machine over one transport and one storage connection
pub struct ApiClient<T: Transport> {
    config: ProtocolConfig,
    transport: Arc<T>,
    store: Store,
    queue: PacketQueue,
    session: SessionHandle,
    events: EventBus,
    codec: Codec,
    parser: ReplyParser,
    stalled: Option<String>,
}

impl<T: Transport + 'static> ApiClient<T> {
    /// Build a client and rebuild its queue from the packet log
    pub async fn new(
        config: ProtocolConfig,
        transport: T,
        store: Store,
        session: SessionHandle,
        events: EventBus,
    ) -> Result<Self> {
        let queue = PacketQueue::new(config.max_retries, config.reply_timeout());
        let mut client = Self {
            config,
            transport: Arc::new(transport),
            store,
            queue,
            session,
            events,
            codec: Codec::new(),
            parser: ReplyParser::new(),
            stalled: None,
        };
        client.restore().await?;
        Ok(client)
    }

    async fn restore(&mut self) -> Result<()> {
        let max_tag = self.store.packets().max_tag().await?;
        self.queue.seed_tag(max_tag);

        let open: Vec<PacketRecord> = self.store.packets().open_packets().await?;
        let mut restored = 0usize;
        for packet in open {
            let Ok(tag) = Tag::try_from(packet.tag) else {
                continue;
            };
            if CommandLine::parse(&packet.command).is_auth() {
                self.store.packets().record_reply(tag, ABANDONED_REPLY).await?;
                continue;
            }
            let retries = u32::try_from(packet.retry_count).unwrap_or(0);
            self.queue.restore(tag, packet.command, retries);
            restored += 1;
        }
        if restored > 0 {
            info!("Restored {restored} unanswered packets from the packet log");
        }
        debug!("Packet tags continue after {max_tag}");
        Ok(())
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn status(&self) -> ClientStatus {
        ClientStatus {
            waiting: self.queue.waiting_len(),
            in_flight: self.queue.in_flight_len(),
            logged_in: self.session.is_logged_in(),
            banned: self.session.is_banned(),
            stalled: self.stalled.clone(),
        }
    }

    /// Queue `command` and log it; returns its tag
    pub async fn submit(&mut self, command: &Command) -> Result<Tag> {
        self.submit_text(command.encode()).await
    }

    async fn submit_text(&mut self, text: String) -> Result<Tag> {
        let stored = CommandLine::redacted(&text);
        let tag = self.queue.enqueue(text);
        if let Err(e) = self.store.packets().insert(tag, &stored).await {
            self.queue.complete(tag);
            return Err(e);
        }
        trace!("Queued tag {tag}: {stored}");
        Ok(tag)
    }

    /// One scheduler step: expire deadlines, then send at most one datagram
    ///
    /// While banned nothing is sent and in-flight deadlines are held, so no
    /// packet spends its retries on a server that will not answer.
    pub async fn tick(&mut self, now: Instant) -> Result<()> {
        if self.session.is_banned() {
            self.queue.hold_deadlines(now);
            trace!("Banned, not sending");
            return Ok(());
        }

        for expiry in self.queue.poll_timeouts(now) {
            match expiry {
                Expiry::Retry { tag, retries } => {
                    warn!("Tag {tag} timed out, resending (retry {retries})");
                    self.store.packets().mark_retry(tag, retries).await?;
                }
                Expiry::Exhausted { tag, command } => {
                    let sent = CommandLine::parse(&command);
                    warn!("Tag {tag} ({}) timed out after all retries", sent.name);
                    self.time_out(tag, sent.name.clone()).await?;
                    if sent.is_auth() {
                        error!("Login timed out, the server does not answer");
                        self.stalled = Some("login timed out".to_string());
                    }
                }
            }
        }

        if self.stalled.is_some() && !self.session.is_logged_in() {
            self.fail_waiting().await?;
        }

        let Some(packet) = self.next_to_send().await? else {
            return Ok(());
        };
        self.send_packet(packet, now).await
    }

    /// Mark `tag` terminal without a reply
    async fn time_out(&mut self, tag: Tag, command: String) -> Result<()> {
        self.store.packets().mark_timed_out(tag).await?;
        self.events.publish(Event::PacketReply {
            tag,
            command,
            code: None,
            text: TIMEOUT_REPLY.to_string(),
        });
        Ok(())
    }

    /// Without a login nothing queued can go out; end every waiting packet
    async fn fail_waiting(&mut self) -> Result<()> {
        let reason = self.stalled.clone().unwrap_or_default();
        for packet in self.queue.drain_waiting() {
            let name = CommandLine::parse(&packet.command).name;
            warn!("Tag {} ({name}) dropped: {reason}", packet.tag);
            self.time_out(packet.tag, name).await?;
        }
        Ok(())
    }

    /// The packet to send this tick, logging in first if needed
    async fn next_to_send(&mut self) -> Result<Option<PendingPacket>> {
        let Some(next) = self.queue.peek().cloned() else {
            return Ok(None);
        };
        let is_logout = CommandLine::parse(&next.command).name == "LOGOUT";
        if self.session.is_logged_in() || next.is_auth() || is_logout {
            return Ok(Some(next));
        }

        if self.stalled.is_some() {
            return Ok(None);
        }
        // AUTH may sit behind lower tags; while it is in flight nothing goes out
        match self.queue.pending_auth() {
            Some(tag) => Ok(self.queue.waiting(tag).cloned()),
            None => {
                if !self.config.has_credentials() {
                    error!("Login required but no credentials are configured");
                    self.stalled = Some("no credentials configured".to_string());
                    return Ok(None);
                }
                let auth = self.config.auth_command();
                let tag = self.submit(&auth).await?;
                debug!("Not logged in, queued AUTH as tag {tag}");
                Ok(self.queue.waiting(tag).cloned())
            }
        }
    }

    async fn send_packet(&mut self, packet: PendingPacket, now: Instant) -> Result<()> {
        let tag = packet.tag;
        let session = if packet.is_auth() {
            None
        } else {
            self.session.session_id()
        };

        let datagram = match self.codec.encode(&packet.command, session.as_deref(), tag) {
            Ok(datagram) => datagram,
            Err(e) => {
                error!("Tag {tag} cannot be sent: {e}");
                self.queue.complete(tag);
                let text = e.to_string();
                self.store.packets().record_reply(tag, &text).await?;
                self.events.publish(Event::PacketReply {
                    tag,
                    command: CommandLine::parse(&packet.command).name,
                    code: None,
                    text,
                });
                return Ok(());
            }
        };

        debug!(
            "Sending tag {tag}: {}",
            CommandLine::redacted(&packet.command)
        );
        if let Err(e) = self.transport.send(&datagram).await {
            // Counts as sent; the reply deadline drives the retry
            warn!("Send of tag {tag} failed: {e}");
        }
        self.queue.mark_sent(tag, now);
        self.store
            .packets()
            .mark_sent(tag, time_utils::now_millis())
            .await?;
        Ok(())
    }

    /// Handle one received datagram
    pub async fn handle_datagram(&mut self, datagram: &[u8]) -> Result<()> {
        let raw = match self.codec.decode(datagram) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Dropping undecodable datagram ({} bytes): {e}", datagram.len());
                return Ok(());
            }
        };
        debug!("Received tag {} code {}", raw.tag, raw.code.0);

        if raw.tag == 0 {
            return self.handle_tagless(&raw).await;
        }
        let Some(packet) = self.queue.complete(raw.tag) else {
            debug!("Dropping reply: {}", ProtocolError::UnknownTag { tag: raw.tag });
            return Ok(());
        };

        let sent = CommandLine::parse(&packet.command);
        match self.parser.parse(&raw, Some(&sent)) {
            Ok(reply) => self.apply_reply(packet, sent, &raw, reply).await,
            Err(e) => {
                // Malformed data is terminal for the tag and never stored as metadata
                error!("Tag {} ({}) reply rejected: {e}", raw.tag, sent.name);
                self.finish(&packet, &sent, &raw).await
            }
        }
    }

    /// Replies without a tag: server pushes and complaints about garbage
    async fn handle_tagless(&mut self, raw: &RawReply) -> Result<()> {
        match self.parser.parse(raw, None) {
            Ok(Reply::Banned { reason }) => self.apply_ban(reason),
            Ok(Reply::Notification(record)) => self.store_notification(record).await?,
            Ok(Reply::UnknownCommand) => warn!("Server did not understand a command: {}", raw.text),
            Ok(other) => debug!("Tagless reply {}: {other:?}", raw.code.0),
            Err(e) => debug!("Tagless reply {} unparsed: {e}", raw.code.0),
        }
        Ok(())
    }

    async fn store_notification(&mut self, record: NotificationRecord) -> Result<()> {
        self.store.notifications().upsert(&record).await?;
        if record.source == NotificationSource::Push
            && let Ok(nid) = u64::try_from(record.nid)
        {
            self.submit(&Command::PushAck { nid }).await?;
        }
        self.events.publish(Event::Notification(record));
        Ok(())
    }

    fn apply_ban(&mut self, reason: String) {
        error!("Banned by server: {reason}");
        self.session.ban(reason.clone());
        self.events.publish(Event::Banned { reason });
    }

    async fn apply_reply(
        &mut self,
        packet: PendingPacket,
        sent: CommandLine,
        raw: &RawReply,
        reply: Reply,
    ) -> Result<()> {
        match reply {
            Reply::LoggedIn {
                session,
                new_version,
            } => {
                info!("Logged in");
                if new_version {
                    info!("Server reports a newer client version is available");
                }
                self.session.login(session);
            }
            Reply::LoggedOut => {
                info!("Logged out");
                self.session.logout();
            }
            Reply::LoginFailed => {
                error!("Login failed: check username and password");
                self.session.logout();
                self.stalled = Some("login failed".to_string());
            }
            Reply::MylistAdded { lid, size, ed2k } => {
                debug!("Mylist entry {lid} added");
                self.confirm_in_mylist(Some(lid), size, ed2k.as_deref()).await?;
            }
            Reply::FileAlreadyInMylist { lid } => {
                self.confirm_in_mylist(lid, sent.param_u64("size"), sent.param("ed2k"))
                    .await?;
                if sent.param("edit").is_none() {
                    let command = format!("{}&edit=1", packet.command);
                    debug!("Tag {} already in mylist, resending as edit", packet.tag);
                    self.store
                        .packets()
                        .replace_command(packet.tag, &command)
                        .await?;
                    self.queue.restore(packet.tag, command, 0);
                    return Ok(());
                }
            }
            Reply::MylistEdited => {
                self.confirm_in_mylist(None, sent.param_u64("size"), sent.param("ed2k"))
                    .await?;
            }
            Reply::File {
                mut file,
                anime,
                episode,
                group,
            } => {
                fill_identity(&mut file, &sent);
                self.store_file(&file).await?;
                if let Some(anime) = anime {
                    self.store.metadata().upsert_anime(&anime).await?;
                }
                if let Some(episode) = episode {
                    self.store.metadata().upsert_episode(&episode).await?;
                }
                if let Some(group) = group {
                    self.store.metadata().upsert_group(&group).await?;
                }
            }
            Reply::NoSuchFile { size, ed2k } => {
                if let (Some(size), Some(ed2k)) = (size, ed2k) {
                    self.store
                        .local_files()
                        .set_status_by_identity(to_i64(size), &ed2k, FileStatus::NotFound)
                        .await?;
                }
            }
            Reply::Mylist(entry) => self.store.metadata().upsert_mylist(&entry).await?,
            Reply::MylistStats(stats) => info!(
                "Mylist: {} anime, {} episodes, {} files",
                stats.animes, stats.episodes, stats.files
            ),
            Reply::Anime(anime) => self.store.metadata().upsert_anime(&anime).await?,
            Reply::Episode(episode) => self.store.metadata().upsert_episode(&episode).await?,
            Reply::Notification(record) => self.store_notification(record).await?,
            Reply::NotificationAcknowledged(code) => {
                if let Some(nid) = sent.param("nid").and_then(|nid| nid.parse().ok()) {
                    self.store
                        .notifications()
                        .acknowledge(nid, NotificationSource::Push)
                        .await?;
                }
                trace!("PUSHACK answered with {}", code.0);
            }
            Reply::NotifyList(entries) => self.fetch_unseen(&entries).await?,
            Reply::SessionInvalid(code) => {
                if self.requeue_after_failure(&packet, &sent, code, &raw.text).await? {
                    return Ok(());
                }
            }
            Reply::Banned { reason } => self.apply_ban(reason),
            Reply::UnknownCommand => warn!("Server did not understand {}", sent.name),
            Reply::Other { code, text } if code.is_error() => {
                if self.requeue_after_failure(&packet, &sent, code, &text).await? {
                    return Ok(());
                }
            }
            Reply::Other { code, text } => {
                debug!("Tag {} answered {} {text}", packet.tag, code.0);
            }
        }

        self.finish(&packet, &sent, raw).await
    }

    /// Put `packet` back after a lost session or a busy server
    ///
    /// Returns false when the failure is final for the tag.
    async fn requeue_after_failure(
        &mut self,
        packet: &PendingPacket,
        sent: &CommandLine,
        code: ResponseCode,
        text: &str,
    ) -> Result<bool> {
        let failure = ProtocolError::server_error(code.0, text);
        if failure.requires_reauth() {
            warn!("Session rejected with {} ({})", code.0, code.description());
            self.session.logout();
            if sent.name == "LOGOUT" || sent.is_auth() {
                return Ok(false);
            }
        } else if failure.is_transient() {
            warn!("Tag {} deferred: {failure}", packet.tag);
        } else {
            warn!("Tag {} ({}) failed: {failure}", packet.tag, sent.name);
            return Ok(false);
        }

        if packet.retries >= self.config.max_retries {
            warn!("Tag {} keeps failing: {failure}", packet.tag);
            return Ok(false);
        }
        // Resent on a later tick, after the next login if the session went away
        let retries = packet.retries + 1;
        self.store.packets().mark_retry(packet.tag, retries).await?;
        self.queue.restore(packet.tag, packet.command.clone(), retries);
        Ok(true)
    }

    /// Record the reply and announce the packet as terminal
    async fn finish(
        &mut self,
        packet: &PendingPacket,
        sent: &CommandLine,
        raw: &RawReply,
    ) -> Result<()> {
        let mut stored = format!("{} {}", raw.code.0, raw.text);
        if !raw.body.is_empty() {
            stored.push('\n');
            stored.push_str(&raw.body);
        }
        self.store.packets().record_reply(packet.tag, &stored).await?;
        self.events.publish(Event::PacketReply {
            tag: packet.tag,
            command: sent.name.clone(),
            code: Some(raw.code.0),
            text: raw.text.clone(),
        });
        Ok(())
    }

    async fn store_file(&mut self, file: &FileInfo) -> Result<()> {
        self.store.metadata().upsert_file(file).await?;
        if let (Some(size), Some(ed2k)) = (file.size(), file.ed2k()) {
            self.store
                .local_files()
                .set_status_by_identity(size, ed2k, FileStatus::Confirmed)
                .await?;
        }
        if let Some(lid) = file.lid().filter(|lid| *lid > 0) {
            self.store.metadata().link_mylist(lid, file).await?;
        }
        Ok(())
    }

    async fn confirm_in_mylist(
        &mut self,
        lid: Option<i64>,
        size: Option<u64>,
        ed2k: Option<&str>,
    ) -> Result<()> {
        let (Some(size), Some(ed2k)) = (size, ed2k) else {
            return Ok(());
        };
        let size = to_i64(size);
        self.store
            .local_files()
            .set_status_by_identity(size, ed2k, FileStatus::Confirmed)
            .await?;
        let Some(lid) = lid.filter(|lid| *lid > 0) else {
            return Ok(());
        };
        if let Some(file) = self.store.metadata().find_file_by_identity(size, ed2k).await? {
            self.store.metadata().link_mylist(lid, &file).await?;
        }
        Ok(())
    }

    /// Fetch the most recent unseen entries of a NOTIFYLIST reply
    async fn fetch_unseen(&mut self, entries: &[(NotifyKind, i64)]) -> Result<()> {
        let mut fetched = 0usize;
        for (kind, nid) in entries.iter().rev() {
            if fetched == MAX_NOTIFY_FETCH {
                break;
            }
            let source = match kind {
                NotifyKind::Message => NotificationSource::Message,
                NotifyKind::Notification => NotificationSource::File,
            };
            if self.store.notifications().exists(*nid, source).await? {
                continue;
            }
            let Ok(id) = u64::try_from(*nid) else {
                continue;
            };
            self.submit(&Command::NotifyGet { kind: *kind, id }).await?;
            fetched += 1;
        }
        if fetched > 0 {
            debug!("Fetching {fetched} unseen notifications");
        }
        Ok(())
    }

    /// Move the client onto its own task
    pub fn spawn(self) -> ClientHandle {
        let (requests, rx) = mpsc::unbounded_channel();
        let session = self.session.clone();
        let task = tokio::spawn(self.run(rx));
        ClientHandle {
            requests,
            session,
            task: Some(task),
        }
    }

    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<ClientRequest>) -> Result<()> {
        let transport = Arc::clone(&self.transport);
        let mut ticker = tokio::time::interval(self.config.send_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(
            "Client loop started, one send every {:?}",
            self.config.send_interval()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(Instant::now()).await {
                        error!("Send tick failed: {e}");
                    }
                }
                datagram = transport.recv() => match datagram {
                    Ok(datagram) => {
                        if let Err(e) = self.handle_datagram(&datagram).await {
                            error!("Reply handling failed: {e}");
                        }
                    }
                    Err(e) => {
                        if e.is_transient() {
                            warn!("Receive failed: {e}");
                        } else {
                            error!("Receive failed: {e}");
                        }
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                request = requests.recv() => match request {
                    Some(ClientRequest::Send { command, reply }) => {
                        let _ = reply.send(self.submit_text(command).await);
                    }
                    Some(ClientRequest::Status { reply }) => {
                        let _ = reply.send(self.status());
                    }
                    Some(ClientRequest::ClearStall) => self.stalled = None,
                    None | Some(ClientRequest::Shutdown) => break,
                },
            }
        }

        debug!("Client loop stopped");
        self.store.close().await
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// FILE replies only carry size and ed2k when the fmask asked for them
fn fill_identity(file: &mut FileInfo, sent: &CommandLine) {
    if !file.has(FileField::Size)
        && let Some(size) = sent.param("size")
    {
        file.set(FileField::Size, size);
    }
    if !file.has(FileField::Ed2k)
        && let Some(ed2k) = sent.param("ed2k")
    {
        file.set(FileField::Ed2k, ed2k.to_ascii_lowercase());
    }
}

enum ClientRequest {
    Send {
        command: String,
        reply: oneshot::Sender<Result<Tag>>,
    },
    Status {
        reply: oneshot::Sender<ClientStatus>,
    },
    ClearStall,
    Shutdown,
}

/// Handle to a spawned [`ApiClient`]
#[derive(Debug)]
pub struct ClientHandle {
    requests: mpsc::UnboundedSender<ClientRequest>,
    session: SessionHandle,
    task: Option<JoinHandle<Result<()>>>,
}

impl fmt::Debug for ClientRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send { command, .. } => write!(f, "Send({})", CommandLine::redacted(command)),
            Self::Status { .. } => f.write_str("Status"),
            Self::ClearStall => f.write_str("ClearStall"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl ClientHandle {
    fn stopped() -> Error {
        Error::Internal(InternalError::ClientStopped)
    }

    /// Queue `command`; the returned tag identifies its [`Event::PacketReply`]
    pub async fn send(&self, command: &Command) -> Result<Tag> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(ClientRequest::Send {
                command: command.encode(),
                reply,
            })
            .map_err(|_| Self::stopped())?;
        rx.await.map_err(|_| Self::stopped())?
    }

    pub async fn status(&self) -> Result<ClientStatus> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(ClientRequest::Status { reply })
            .map_err(|_| Self::stopped())?;
        rx.await.map_err(|_| Self::stopped())
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Operator action: lift the ban and allow another login attempt
    pub fn clear_ban(&self) {
        self.session.clear_ban();
        let _ = self.requests.send(ClientRequest::ClearStall);
    }

    /// Queue LOGOUT if a session is open
    pub async fn logout(&self) -> Result<Option<Tag>> {
        if !self.session.is_logged_in() {
            return Ok(None);
        }
        self.send(&Command::Logout).await.map(Some)
    }

    /// Stop the loop after the current step and wait for it to exit
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.requests.send(ClientRequest::Shutdown);
        match self.task.take() {
            Some(task) => task.await.map_err(|e| {
                Error::Internal(InternalError::assertion(format!("client task panicked: {e}")))
            })?,
            None => Ok(()),
        }
    }
}
