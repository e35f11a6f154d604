use super::{CHUNK_SIZE, CHUNKS_PER_BLOCK, Ed2kHash, HashOutcome, parts_total};
use crate::error::IoError;
use log::{debug, trace};
use md4::{Digest, Md4};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

const BLOCK_SIZE: u64 = CHUNK_SIZE as u64 * CHUNKS_PER_BLOCK;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared switch that serializes chunk reads across engines
///
/// Every engine built from clones of one gate shares the flag. While it is
/// set, each chunk read holds a common mutex, so reads from different
/// workers interleave one at a time. That keeps a spinning disk from
/// seeking between files.
#[derive(Debug, Clone, Default)]
pub struct IoGate {
    serialize: Arc<Mutex<bool>>,
    io: Arc<Mutex<()>>,
}

impl IoGate {
    pub fn new(serialize: bool) -> Self {
        Self {
            serialize: Arc::new(Mutex::new(serialize)),
            io: Arc::default(),
        }
    }

    pub fn set_serialized(&self, serialize: bool) {
        *lock(&self.serialize) = serialize;
        debug!("Serialized chunk reads {}", if serialize { "on" } else { "off" });
    }

    pub fn is_serialized(&self) -> bool {
        *lock(&self.serialize)
    }

    /// Run one chunk read, holding the shared mutex when serialized
    pub fn read<R>(&self, read: impl FnOnce() -> R) -> R {
        if self.is_serialized() {
            let _guard = lock(&self.io);
            read()
        } else {
            read()
        }
    }
}

/// Streaming ed2k state
///
/// Context A (`block`) digests the current block of up to 95 chunks. When a
/// block fills, its digest is folded into context B (`root`). At the end:
///
/// - no block ever filled: the digest of A
/// - A is empty: the digest of B
/// - otherwise: the digest of B after folding in A's digest
pub struct Ed2kEngine {
    block: Md4,
    root: Md4,
    block_bytes: u64,
    blocks: u64,
    cancel: Arc<AtomicBool>,
    gate: IoGate,
}

impl Ed2kEngine {
    pub fn new(gate: IoGate) -> Self {
        Self {
            block: Md4::new(),
            root: Md4::new(),
            block_bytes: 0,
            blocks: 0,
            cancel: Arc::new(AtomicBool::new(false)),
            gate,
        }
    }

    /// Flag checked before every chunk read; setting it stops the engine
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn reset(&mut self) {
        self.block = Md4::new();
        self.root = Md4::new();
        self.block_bytes = 0;
        self.blocks = 0;
    }

    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let room = (BLOCK_SIZE - self.block_bytes) as usize;
            let (head, rest) = data.split_at(room.min(data.len()));
            self.block.update(head);
            self.block_bytes += head.len() as u64;
            data = rest;

            if self.block_bytes == BLOCK_SIZE {
                let digest = std::mem::take(&mut self.block).finalize();
                self.root.update(digest);
                self.block_bytes = 0;
                self.blocks += 1;
            }
        }
    }

    /// Produce the digest and reset for the next file
    pub fn finalize(&mut self) -> [u8; 16] {
        let digest = if self.blocks == 0 {
            std::mem::take(&mut self.block).finalize()
        } else if self.block_bytes == 0 {
            std::mem::take(&mut self.root).finalize()
        } else {
            let tail = std::mem::take(&mut self.block).finalize();
            self.root.update(tail);
            std::mem::take(&mut self.root).finalize()
        };
        self.reset();
        digest.into()
    }

    /// Hash `path`, calling `progress(parts_done, parts_total)` after every
    /// chunk
    pub fn hash_file(&mut self, path: &Path, progress: &mut dyn FnMut(u64, u64)) -> HashOutcome {
        let failed = |err: io::Error| HashOutcome::Failed(IoError::from_std(err).at(path).to_string());

        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(err) => return failed(err),
        };
        let expected = file.metadata().map(|meta| meta.len()).unwrap_or(0);
        let mut total = parts_total(expected);
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut done = 0u64;
        let mut size = 0u64;

        self.reset();
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                debug!("Stopped hashing {} after {done} parts", path.display());
                self.reset();
                return HashOutcome::Stopped;
            }

            let read = match self.gate.read(|| read_chunk(&mut file, &mut buffer)) {
                Ok(read) => read,
                Err(err) => {
                    self.reset();
                    return failed(err);
                }
            };
            // A file that ends on a chunk boundary has nothing left to add
            if read == 0 && done > 0 {
                break;
            }

            self.update(&buffer[..read]);
            done += 1;
            size += read as u64;
            total = total.max(done);
            trace!("{}: part {done}/{total}", path.display());
            progress(done, total);

            if read < CHUNK_SIZE {
                break;
            }
        }
        // Shrunk since it was opened: the last part still completes the file
        if done < total {
            debug!("{} ended after {done} of {total} parts", path.display());
            progress(done, done);
        }

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        HashOutcome::Hashed(Ed2kHash {
            filename,
            size,
            digest: self.finalize(),
        })
    }
}

impl std::fmt::Debug for Ed2kEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed2kEngine")
            .field("block_bytes", &self.block_bytes)
            .field("blocks", &self.blocks)
            .field("cancelled", &self.cancel.load(Ordering::Relaxed))
            .field("gate", &self.gate)
            .finish()
    }
}

/// Fill `buffer` unless the file ends first
fn read_chunk(file: &mut File, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match file.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
