//! One identify run from paths on disk to settled requests

use super::local::{FileLookup, LocalIdentify};
use crate::database::repositories::to_db_int;
use crate::database::{Database, FileStatus, LocalFlags, Store};
use crate::error::{InternalError, ProtocolError};
use crate::events::{Event, EventBus};
use crate::hashing::{HashOutcome, HasherPool, PoolConfig};
use crate::protocol::mask::AnimeField;
use crate::protocol::messages::{Command, MylistAdd, Viewed};
use crate::protocol::{ClientHandle, Tag};
use crate::{Error, Result};
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// How often a wait checks whether the client gave up
const STALL_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Anime fields fetched with ANIME when details are requested; FILE
/// replies never carry these
const ANIME_DETAIL_FIELDS: &[AnimeField] = &[
    AnimeField::DateFlags,
    AnimeField::Episodes,
    AnimeField::AirDate,
    AnimeField::EndDate,
    AnimeField::Url,
    AnimeField::PictureName,
    AnimeField::Rating,
    AnimeField::VoteCount,
    AnimeField::TagNameList,
];

#[derive(Debug, Clone, Default)]
pub struct IdentifyOptions {
    /// Add files the mylist does not hold yet
    pub add_to_mylist: bool,
    pub viewed: Viewed,
    pub storage: Option<String>,
    pub state: Option<u8>,
    /// Follow confirmed files with ANIME and EPISODE requests for
    /// whatever storage still lacks
    pub fetch_details: bool,
}

/// A file with a known ed2k digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedFile {
    pub path: PathBuf,
    pub size: u64,
    pub ed2k: String,
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifySummary {
    pub files: usize,
    /// Hash already stored for this path
    pub cached: usize,
    /// Hash copied from another file of the same size
    pub reused: usize,
    pub hashed: usize,
    pub hash_failed: usize,
    /// Skipped because storage knew everything
    pub already_known: usize,
    pub requested: usize,
    pub confirmed: usize,
    pub not_found: usize,
    pub mylist_added: usize,
    pub details_requested: usize,
    /// Timed out or answered with something unexpected
    pub failed_requests: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    File,
    MylistAdd,
    Detail,
    Logout,
}

/// Wires hashing results into local identify and the packet queue
pub struct IdentifyCoordinator {
    database: Database,
    events: EventBus,
    pool: PoolConfig,
}

impl IdentifyCoordinator {
    pub fn new(database: Database, events: EventBus, pool: PoolConfig) -> Self {
        Self {
            database,
            events,
            pool,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Hash, look up locally, then ask the server about the rest
    pub async fn run(
        &self,
        paths: &[PathBuf],
        client: &ClientHandle,
        options: &IdentifyOptions,
    ) -> Result<IdentifySummary> {
        let mut summary = IdentifySummary::default();
        let files = self.hash_files(paths, &mut summary).await?;
        self.identify(&files, client, options, &mut summary).await?;
        Ok(summary)
    }

    /// Record every path and produce its digest
    ///
    /// Paths whose stored hash is still valid, or whose size matches an
    /// already hashed file, are never read.
    pub async fn hash_files(
        &self,
        paths: &[PathBuf],
        summary: &mut IdentifySummary,
    ) -> Result<Vec<HashedFile>> {
        let mut store = self.database.connect().await?;
        let mut files = Vec::with_capacity(paths.len());
        let mut to_hash: HashMap<PathBuf, u64> = HashMap::new();
        let unique: BTreeSet<&PathBuf> = paths.iter().collect();
        summary.files += unique.len();

        for path in unique {
            let key = path_key(path);
            let size = match tokio::fs::metadata(path).await {
                Ok(meta) => meta.len(),
                Err(e) => {
                    warn!("Skipping {}: {e}", path.display());
                    if e.kind() == std::io::ErrorKind::NotFound {
                        store.local_files().set_status(&key, FileStatus::Deleted).await?;
                    }
                    summary.hash_failed += 1;
                    continue;
                }
            };
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let local = store
                .local_files()
                .upsert_discovered(&key, &filename, to_db_int(size))
                .await?;

            if let Some(hash) = local.hash.filter(|hash| !hash.is_empty()) {
                summary.cached += 1;
                files.push(HashedFile {
                    path: path.clone(),
                    size,
                    ed2k: hash,
                });
            } else if let Some(hash) = store
                .local_files()
                .reusable_hash(to_db_int(size), &key)
                .await?
            {
                debug!("Reusing hash of an equal-sized file for {}", path.display());
                store.local_files().set_hash(&key, &hash).await?;
                summary.reused += 1;
                files.push(HashedFile {
                    path: path.clone(),
                    size,
                    ed2k: hash,
                });
            } else {
                to_hash.insert(path.clone(), size);
            }
        }

        if !to_hash.is_empty() {
            info!("Hashing {} files", to_hash.len());
        }
        let mut events = self.events.channel();
        let mut pool = HasherPool::new(&self.pool, self.events.clone());
        pool.start(to_hash.len())?;
        for path in to_hash.keys() {
            pool.add_file(path.clone());
        }
        pool.finish_input();

        let collected = collect_hashes(&mut events, &mut store, &mut to_hash, &mut files, summary).await;
        if collected.is_err() {
            pool.broadcast_stop_hasher();
        }
        collected?;
        store.close().await?;
        Ok(files)
    }

    /// Batch local identify, then FILE and MYLISTADD for what is missing
    ///
    /// Returns once every issued tag is terminal and the session is logged
    /// out. A ban ends the run with [`ProtocolError::Banned`].
    pub async fn identify(
        &self,
        files: &[HashedFile],
        client: &ClientHandle,
        options: &IdentifyOptions,
        summary: &mut IdentifySummary,
    ) -> Result<()> {
        let mut store = self.database.connect().await?;
        let mut events = self.events.channel();
        let mut pending: HashMap<Tag, Pending> = HashMap::new();

        let pairs: Vec<(i64, String)> = files
            .iter()
            .map(|file| (to_db_int(file.size), file.ed2k.to_ascii_lowercase()))
            .collect();
        let known = LocalIdentify::new(store.metadata())
            .identify_batch(&pairs)
            .await?;

        for (file, pair) in files.iter().zip(&pairs) {
            let flags = known.get(pair).copied().unwrap_or_default();
            let (size, ed2k) = (pair.0, pair.1.as_str());

            let lookup = LocalIdentify::new(store.metadata())
                .plan_file(size, ed2k, flags)
                .await?;
            match lookup {
                FileLookup::Skip => {
                    store
                        .local_files()
                        .set_status_by_identity(size, ed2k, FileStatus::Confirmed)
                        .await?;
                    summary.already_known += 1;
                }
                FileLookup::Request { fmask, amask } => {
                    let tag = client
                        .send(&Command::file(file.size, ed2k, fmask, amask))
                        .await?;
                    debug!("FILE for {} is tag {tag}", file.path.display());
                    pending.insert(tag, Pending::File);
                    summary.requested += 1;
                }
            }

            if options.add_to_mylist && !flags.contains(LocalFlags::IN_MYLIST) {
                let mut add = MylistAdd::new(file.size, ed2k).viewed(options.viewed);
                if let Some(storage) = &options.storage {
                    add = add.storage(storage.clone());
                }
                if let Some(state) = options.state {
                    add = add.state(state);
                }
                let tag = client.send(&Command::MylistAdd(add)).await?;
                pending.insert(tag, Pending::MylistAdd);
            }
        }

        let settled = self.settle(&mut events, client, &mut pending, summary).await;
        let settled = match settled {
            Ok(()) if options.fetch_details => {
                self.request_details(&mut store, files, client, &mut pending, summary)
                    .await?;
                self.settle(&mut events, client, &mut pending, summary).await
            }
            other => other,
        };
        store.close().await?;
        settled?;

        if let Some(tag) = client.logout().await? {
            pending.insert(tag, Pending::Logout);
            self.settle(&mut events, client, &mut pending, summary).await?;
        }
        info!(
            "Identify finished: {} confirmed, {} not found, {} known locally, {} failed",
            summary.confirmed, summary.not_found, summary.already_known, summary.failed_requests
        );
        Ok(())
    }

    async fn request_details(
        &self,
        store: &mut Store,
        files: &[HashedFile],
        client: &ClientHandle,
        pending: &mut HashMap<Tag, Pending>,
        summary: &mut IdentifySummary,
    ) -> Result<()> {
        let mut aids = BTreeSet::new();
        let mut eids = BTreeSet::new();
        for file in files {
            if let Some(info) = store
                .metadata()
                .find_file_by_identity(to_db_int(file.size), &file.ed2k)
                .await?
            {
                aids.extend(info.aid().filter(|aid| *aid > 0));
                eids.extend(info.eid().filter(|eid| *eid > 0));
            }
        }

        for aid in aids {
            let mask = LocalIdentify::new(store.metadata())
                .plan_anime(aid, ANIME_DETAIL_FIELDS)
                .await?;
            if let (Some(amask), Ok(aid)) = (mask, u64::try_from(aid)) {
                let tag = client.send(&Command::anime(aid, amask)).await?;
                pending.insert(tag, Pending::Detail);
                summary.details_requested += 1;
            }
        }
        for eid in eids {
            let needed = LocalIdentify::new(store.metadata()).needs_episode(eid).await?;
            if needed && let Ok(eid) = u64::try_from(eid) {
                let tag = client.send(&Command::Episode { eid }).await?;
                pending.insert(tag, Pending::Detail);
                summary.details_requested += 1;
            }
        }
        Ok(())
    }

    /// Wait until every pending tag is terminal
    async fn settle(
        &self,
        events: &mut UnboundedReceiver<Event>,
        client: &ClientHandle,
        pending: &mut HashMap<Tag, Pending>,
        summary: &mut IdentifySummary,
    ) -> Result<()> {
        let mut check = tokio::time::interval(STALL_CHECK_INTERVAL);
        while !pending.is_empty() {
            tokio::select! {
                event = events.recv() => match event {
                    Some(Event::PacketReply { tag, code, text, .. }) => {
                        if let Some(kind) = pending.remove(&tag) {
                            record_reply(summary, kind, code, &text);
                        }
                    }
                    Some(Event::Banned { reason }) => {
                        return Err(Error::Protocol(ProtocolError::Banned { reason }));
                    }
                    Some(_) => {}
                    None => return Err(Error::Internal(InternalError::ClientStopped)),
                },
                _ = check.tick() => {
                    let status = client.status().await?;
                    if status.banned {
                        let reason = client.session().ban_reason().unwrap_or_default();
                        return Err(Error::Protocol(ProtocolError::Banned { reason }));
                    }
                    if let Some(reason) = status.stalled {
                        return Err(Error::Protocol(ProtocolError::other(format!(
                            "client stopped sending: {reason}"
                        ))));
                    }
                }
            }
        }
        Ok(())
    }
}

async fn collect_hashes(
    events: &mut UnboundedReceiver<Event>,
    store: &mut Store,
    outstanding: &mut HashMap<PathBuf, u64>,
    files: &mut Vec<HashedFile>,
    summary: &mut IdentifySummary,
) -> Result<()> {
    while let Some(event) = events.recv().await {
        match event {
            Event::FileHashed { path, outcome, .. } => {
                let Some(size) = outstanding.remove(&path) else {
                    continue;
                };
                match outcome {
                    HashOutcome::Hashed(hash) => {
                        let ed2k = hash.hex();
                        store.local_files().set_hash(&path_key(&path), &ed2k).await?;
                        summary.hashed += 1;
                        files.push(HashedFile { path, size, ed2k });
                    }
                    HashOutcome::Stopped => summary.hash_failed += 1,
                    HashOutcome::Failed(message) => {
                        warn!("{message}");
                        summary.hash_failed += 1;
                    }
                }
            }
            Event::PoolFinished => return Ok(()),
            _ => {}
        }
    }
    Err(Error::Internal(InternalError::assertion(
        "event bus closed before the hashers finished",
    )))
}

fn record_reply(summary: &mut IdentifySummary, kind: Pending, code: Option<u16>, text: &str) {
    match (kind, code) {
        (Pending::File, Some(220)) => summary.confirmed += 1,
        (Pending::File, Some(320)) => summary.not_found += 1,
        (Pending::MylistAdd, Some(210 | 311)) => summary.mylist_added += 1,
        (Pending::Detail, Some(230 | 240)) | (Pending::Logout, _) => {}
        (_, Some(code)) => {
            warn!("Request ended with {code} {text}");
            summary.failed_requests += 1;
        }
        (_, None) => summary.failed_requests += 1,
    }
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
