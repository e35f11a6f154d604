//! Worker threads that pull files from a shared queue and hash them
//!
//! Idle workers register a request in a FIFO. Whenever both a request and a
//! file are waiting, the dispatcher hands the oldest file to the oldest
//! request through that worker's mailbox. A worker that finishes a small
//! file asks again right away and never waits behind a slower one.

use super::{Ed2kEngine, HashOutcome, IoGate};
use crate::error::InternalError;
use crate::events::{Event, EventBus};
use crate::progress::{DEFAULT_PROGRESS_INTERVAL, ProgressThrottle};
use crate::{Error, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound on hasher threads
pub const MAX_WORKERS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// 0 uses the number of logical CPUs
    pub max_threads: usize,
    pub serialize_io: bool,
    pub progress_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_threads: 0,
            serialize_io: false,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL.as_millis() as u64,
        }
    }
}

impl PoolConfig {
    pub fn thread_count(&self) -> usize {
        let wanted = match self.max_threads {
            0 => thread::available_parallelism().map_or(1, |count| count.get()),
            count => count,
        };
        wanted.clamp(1, MAX_WORKERS)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

enum Assignment {
    File(PathBuf),
    Exit,
}

#[derive(Default)]
struct Dispatch {
    requests: VecDeque<usize>,
    files: VecDeque<PathBuf>,
    mailboxes: Vec<Sender<Assignment>>,
    cancels: Vec<Arc<AtomicBool>>,
    input_done: bool,
    stopping: bool,
    live_workers: usize,
}

impl Dispatch {
    /// Pair waiting requests with queued files; release requesters once
    /// there is nothing left for them
    fn run(&mut self) {
        while !self.stopping && !self.requests.is_empty() && !self.files.is_empty() {
            let (Some(worker), Some(path)) = (self.requests.pop_front(), self.files.pop_front())
            else {
                break;
            };
            debug!("Assigning {} to hasher {worker}", path.display());
            if let Some(mailbox) = self.mailboxes.get(worker)
                && let Err(mpsc::SendError(Assignment::File(path))) =
                    mailbox.send(Assignment::File(path))
            {
                warn!("Hasher {worker} is gone, requeueing {}", path.display());
                self.files.push_front(path);
            }
        }

        if self.stopping || (self.input_done && self.files.is_empty()) {
            for worker in self.requests.drain(..) {
                if let Some(mailbox) = self.mailboxes.get(worker) {
                    let _ = mailbox.send(Assignment::Exit);
                }
            }
        }
    }
}

struct Shared {
    dispatch: Mutex<Dispatch>,
    events: EventBus,
    gate: IoGate,
    progress_interval: Duration,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Dispatch> {
        self.dispatch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn worker_exited(&self, worker: usize) {
        let last = {
            let mut dispatch = self.lock();
            dispatch.live_workers = dispatch.live_workers.saturating_sub(1);
            dispatch.live_workers == 0
        };
        debug!("Hasher {worker} exited");
        if last {
            info!("All hashers finished");
            self.events.publish(Event::PoolFinished);
        }
    }
}

/// Pool of ed2k hasher threads
///
/// Nothing here blocks the caller: results and completion arrive as
/// [`Event::FileHashed`], [`Event::Progress`] and [`Event::PoolFinished`].
///
/// Dropping the pool aborts whatever is still being hashed and waits for
/// the workers to exit.
pub struct HasherPool {
    shared: Arc<Shared>,
    max_workers: usize,
    started: bool,
    workers: Vec<thread::JoinHandle<()>>,
}

impl HasherPool {
    pub fn new(config: &PoolConfig, events: EventBus) -> Self {
        Self {
            shared: Arc::new(Shared {
                dispatch: Mutex::new(Dispatch::default()),
                events,
                gate: IoGate::new(config.serialize_io),
                progress_interval: config.progress_interval(),
            }),
            max_workers: config.thread_count(),
            started: false,
            workers: Vec::new(),
        }
    }

    /// Shared read gate; toggling it affects running workers immediately
    pub fn io_gate(&self) -> &IoGate {
        &self.shared.gate
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Spawn workers for `file_count` files and return how many started
    ///
    /// With no files the pool reports completion right away.
    pub fn start(&mut self, file_count: usize) -> Result<usize> {
        if self.started {
            return Err(Error::Internal(InternalError::assertion(
                "hasher pool already started",
            )));
        }
        self.started = true;

        let count = file_count.min(self.max_workers);
        if count == 0 {
            info!("No files to hash");
            self.shared.events.publish(Event::PoolFinished);
            return Ok(0);
        }

        let mut receivers = Vec::with_capacity(count);
        {
            let mut dispatch = self.shared.lock();
            dispatch.live_workers = count;
            for _ in 0..count {
                let (tx, rx) = mpsc::channel();
                dispatch.mailboxes.push(tx);
                receivers.push(rx);
            }
        }

        info!("Starting {count} hashers for {file_count} files");
        for (worker, mailbox) in receivers.into_iter().enumerate() {
            let mut engine = Ed2kEngine::new(self.shared.gate.clone());
            self.shared.lock().cancels.push(engine.cancel_flag());
            let shared = Arc::clone(&self.shared);

            let spawned = thread::Builder::new()
                .name(format!("hasher-{worker}"))
                .spawn(move || {
                    run_worker(worker, &mut engine, &mailbox, &shared);
                    shared.worker_exited(worker);
                });
            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(err) => {
                    // Workers already running still count down to completion
                    for missing in worker..count {
                        self.shared.worker_exited(missing);
                    }
                    return Err(Error::Internal(InternalError::worker(
                        worker,
                        format!("failed to spawn: {err}"),
                    )));
                }
            }
        }
        Ok(count)
    }

    pub fn add_file(&self, path: impl Into<PathBuf>) {
        let mut dispatch = self.shared.lock();
        dispatch.files.push_back(path.into());
        dispatch.run();
    }

    /// No more files will be added; idle workers exit once the queue drains
    pub fn finish_input(&self) {
        let mut dispatch = self.shared.lock();
        dispatch.input_done = true;
        dispatch.run();
    }

    /// Decline further assignments; files already being hashed complete
    pub fn stop(&self) {
        let mut dispatch = self.shared.lock();
        if !dispatch.stopping {
            info!("Stopping hashers, {} files left unassigned", dispatch.files.len());
        }
        dispatch.stopping = true;
        dispatch.run();
    }

    /// Stop, and abort files in progress at their next chunk
    pub fn broadcast_stop_hasher(&self) {
        self.stop();
        for cancel in &self.shared.lock().cancels {
            cancel.store(true, Ordering::Relaxed);
        }
    }

    /// Queued files not yet handed to a worker
    pub fn pending_files(&self) -> usize {
        self.shared.lock().files.len()
    }
}

impl Drop for HasherPool {
    fn drop(&mut self) {
        if self.shared.lock().live_workers > 0 {
            self.broadcast_stop_hasher();
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("A hasher thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for HasherPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dispatch = self.shared.lock();
        f.debug_struct("HasherPool")
            .field("max_workers", &self.max_workers)
            .field("live_workers", &dispatch.live_workers)
            .field("pending_files", &dispatch.files.len())
            .field("stopping", &dispatch.stopping)
            .finish()
    }
}

fn request_file(worker: usize, shared: &Shared) {
    let mut dispatch = shared.lock();
    dispatch.requests.push_back(worker);
    dispatch.run();
}

fn run_worker(worker: usize, engine: &mut Ed2kEngine, mailbox: &Receiver<Assignment>, shared: &Shared) {
    loop {
        request_file(worker, shared);
        let path = match mailbox.recv() {
            Ok(Assignment::File(path)) => path,
            Ok(Assignment::Exit) | Err(_) => return,
        };

        let mut throttle = ProgressThrottle::new(shared.progress_interval);
        let outcome = engine.hash_file(&path, &mut |parts_done, parts_total| {
            if throttle.should_emit(Instant::now(), parts_done, parts_total) {
                shared.events.publish(Event::Progress {
                    worker,
                    path: path.clone(),
                    parts_done,
                    parts_total,
                });
            }
        });

        match &outcome {
            HashOutcome::Hashed(hash) => debug!("Hasher {worker}: {}", hash.link()),
            HashOutcome::Stopped => debug!("Hasher {worker} stopped on {}", path.display()),
            HashOutcome::Failed(message) => warn!("Hasher {worker}: {message}"),
        }
        let stopped = outcome == HashOutcome::Stopped;
        shared.events.publish(Event::FileHashed {
            worker,
            path,
            outcome,
        });
        if stopped {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use std::collections::HashSet;
    use tempfile::TempDir;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    fn config(threads: usize) -> PoolConfig {
        PoolConfig {
            max_threads: threads,
            ..PoolConfig::default()
        }
    }

    fn write_files(dir: &TempDir, sizes: &[usize]) -> Vec<PathBuf> {
        sizes
            .iter()
            .enumerate()
            .map(|(index, size)| {
                let path = dir.path().join(format!("file{index}.bin"));
                std::fs::write(&path, vec![index as u8; *size]).unwrap();
                path
            })
            .collect()
    }

    async fn collect_until_finished(rx: &mut UnboundedReceiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            let event = timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("pool did not finish")
                .expect("bus closed");
            if event == Event::PoolFinished {
                return events;
            }
            events.push(event);
        }
    }

    #[test]
    fn test_thread_count_is_clamped() {
        assert_eq!(config(64).thread_count(), MAX_WORKERS);
        assert_eq!(config(3).thread_count(), 3);
        assert!((1..=MAX_WORKERS).contains(&config(0).thread_count()));
    }

    #[tokio::test]
    async fn test_zero_files_finishes_immediately() {
        let bus = EventBus::new();
        let mut rx = bus.channel();
        let mut pool = HasherPool::new(&config(4), bus);
        assert_eq!(pool.start(0).unwrap(), 0);
        assert_eq!(rx.try_recv().unwrap(), Event::PoolFinished);
    }

    #[tokio::test]
    async fn test_every_file_is_hashed_once() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, &[1, 250_000, 0, 102_400, 5_000, 300_000]);
        let bus = EventBus::new();
        let mut rx = bus.channel();
        let mut pool = HasherPool::new(&config(3), bus);

        assert_eq!(pool.start(files.len()).unwrap(), 3);
        for file in &files {
            pool.add_file(file);
        }
        pool.finish_input();

        let events = collect_until_finished(&mut rx).await;
        let hashed: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                Event::FileHashed { path, outcome, .. } => Some((path.clone(), outcome.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(hashed.len(), files.len());
        let unique: HashSet<_> = hashed.iter().map(|(path, _)| path.clone()).collect();
        assert_eq!(unique.len(), files.len());
        assert!(hashed.iter().all(|(_, outcome)| outcome.hash().is_some()));
        assert!(rx.try_recv().is_err(), "completion is reported once");
    }

    #[tokio::test]
    async fn test_final_progress_is_emitted_once_per_file() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, &[900_000]);
        let bus = EventBus::new();
        let mut rx = bus.channel();
        let mut pool = HasherPool::new(
            &PoolConfig {
                max_threads: 1,
                progress_interval_ms: 60_000,
                ..PoolConfig::default()
            },
            bus,
        );
        pool.start(1).unwrap();
        pool.add_file(&files[0]);
        pool.finish_input();

        let progress: Vec<_> = collect_until_finished(&mut rx)
            .await
            .into_iter()
            .filter_map(|event| match event {
                Event::Progress {
                    parts_done,
                    parts_total,
                    ..
                } => Some((parts_done, parts_total)),
                _ => None,
            })
            .collect();
        // First part passes, the rest fall inside the interval, completion always passes
        assert_eq!(progress, vec![(1, 9), (9, 9)]);
    }

    #[tokio::test]
    async fn test_stop_leaves_queued_files_and_still_finishes() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, &[10, 10, 10, 10]);
        let bus = EventBus::new();
        let mut rx = bus.channel();
        let mut pool = HasherPool::new(&config(2), bus);

        pool.stop();
        pool.start(files.len()).unwrap();
        for file in &files {
            pool.add_file(file);
        }

        let events = collect_until_finished(&mut rx).await;
        assert!(events.iter().all(|event| event.kind() != EventKind::FileHashed));
        assert_eq!(pool.pending_files(), files.len());
    }

    #[tokio::test]
    async fn test_broadcast_stop_aborts_file_in_progress() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, &[10 * 102_400]);
        let bus = EventBus::new();
        let mut rx = bus.channel();
        let mut pool = HasherPool::new(&config(1), bus.clone());

        // Park the worker inside its first progress callback until the stop is sent
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let started_tx = Mutex::new(started_tx);
        let release_rx = Mutex::new(release_rx);
        bus.subscribe(EventKind::Progress, move |event| {
            if let Event::Progress { parts_done: 1, .. } = event {
                let _ = started_tx.lock().unwrap().send(());
                let _ = release_rx.lock().unwrap().recv();
            }
        });

        pool.start(1).unwrap();
        pool.add_file(&files[0]);
        pool.finish_input();
        started_rx.recv().unwrap();
        pool.broadcast_stop_hasher();
        release_tx.send(()).unwrap();

        let events = collect_until_finished(&mut rx).await;
        let outcomes: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                Event::FileHashed { outcome, .. } => Some(outcome.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(outcomes, vec![HashOutcome::Stopped]);
    }

    #[test]
    fn test_dropping_the_pool_stops_its_workers() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, &[20 * 102_400]);
        let bus = EventBus::new();
        let mut rx = bus.channel();
        let mut pool = HasherPool::new(&config(1), bus.clone());

        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let started_tx = Mutex::new(started_tx);
        let release_rx = Mutex::new(release_rx);
        bus.subscribe(EventKind::Progress, move |event| {
            if let Event::Progress { parts_done: 1, .. } = event {
                let _ = started_tx.lock().unwrap().send(());
                let _ = release_rx.lock().unwrap().recv();
            }
        });

        pool.start(1).unwrap();
        pool.add_file(&files[0]);
        pool.finish_input();
        started_rx.recv().unwrap();

        // The drop blocks until the worker exits, so release it from here
        let dropper = thread::spawn(move || drop(pool));
        thread::sleep(Duration::from_millis(50));
        release_tx.send(()).unwrap();
        dropper.join().unwrap();

        let events: Vec<Event> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(events.iter().any(|event| matches!(
            event,
            Event::FileHashed {
                outcome: HashOutcome::Stopped,
                ..
            }
        )));
        assert_eq!(events.last(), Some(&Event::PoolFinished));
    }

    #[tokio::test]
    async fn test_small_files_are_not_held_behind_a_large_one() {
        let dir = TempDir::new().unwrap();
        let large = write_files(&dir, &[30 * 102_400]).remove(0);
        let small: Vec<PathBuf> = (0..5)
            .map(|index| {
                let path = dir.path().join(format!("small{index}.bin"));
                std::fs::write(&path, vec![index as u8; 1_000]).unwrap();
                path
            })
            .collect();
        let bus = EventBus::new();
        let mut rx = bus.channel();
        let mut pool = HasherPool::new(&config(2), bus.clone());

        // The large file's hasher waits at its first part until every small file is done
        let (smalls_done_tx, smalls_done_rx) = mpsc::channel::<()>();
        let smalls_done_rx = Mutex::new(smalls_done_rx);
        let parked = large.clone();
        bus.subscribe(EventKind::Progress, move |event| {
            if let Event::Progress {
                path,
                parts_done: 1,
                ..
            } = event
                && *path == parked
            {
                let _ = smalls_done_rx
                    .lock()
                    .unwrap()
                    .recv_timeout(Duration::from_secs(10));
            }
        });
        let smalls_done_tx = Mutex::new(smalls_done_tx);
        let hashed_small = Mutex::new(0usize);
        let large_path = large.clone();
        bus.subscribe(EventKind::FileHashed, move |event| {
            if let Event::FileHashed { path, .. } = event
                && *path != large_path
            {
                let mut count = hashed_small.lock().unwrap();
                *count += 1;
                if *count == 5 {
                    let _ = smalls_done_tx.lock().unwrap().send(());
                }
            }
        });

        pool.start(6).unwrap();
        pool.add_file(&large);
        for path in &small {
            pool.add_file(path);
        }
        pool.finish_input();

        let mut started = Vec::new();
        let mut finished = Vec::new();
        for event in collect_until_finished(&mut rx).await {
            match event {
                Event::Progress {
                    path, parts_done: 1, ..
                } => started.push(path),
                Event::FileHashed { worker, path, .. } => finished.push((worker, path)),
                _ => {}
            }
        }

        let small_started: Vec<_> = started.iter().filter(|path| **path != large).cloned().collect();
        assert_eq!(small_started, small, "small files start in queue order");
        assert!(started.contains(&large));

        let order: Vec<_> = finished.iter().map(|(_, path)| path.clone()).collect();
        assert_eq!(order.last(), Some(&large));
        assert_eq!(&order[..5], small.as_slice());
        let large_worker = finished[5].0;
        assert!(finished[..5].iter().all(|(worker, _)| *worker != large_worker));
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let mut pool = HasherPool::new(&config(1), EventBus::new());
        pool.start(0).unwrap();
        assert!(pool.start(0).is_err());
    }
}
