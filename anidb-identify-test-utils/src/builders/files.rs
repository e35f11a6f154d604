//! Deterministic test files

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const WRITE_BLOCK: usize = 64 * 1024;

/// `size` bytes of a repeating pattern that differs per `seed`
///
/// The period (251) is prime so the pattern never lines up with chunk or
/// block boundaries.
pub fn pattern_bytes(size: usize, seed: u8) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(size);
    fill_pattern(&mut bytes, 0, size, seed);
    bytes
}

fn fill_pattern(out: &mut Vec<u8>, offset: u64, len: usize, seed: u8) {
    out.extend((0..len as u64).map(|i| (((offset + i) % 251) as u8).wrapping_add(seed)));
}

/// Describes one file; nothing touches the disk until [`write_to`](Self::write_to)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFileBuilder {
    name: String,
    size: u64,
    seed: u8,
}

impl TestFileBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            seed: 0,
        }
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Files with the same size but different seeds hash differently
    pub fn seed(mut self, seed: u8) -> Self {
        self.seed = seed;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The whole content in memory; prefer `write_to` for large sizes
    pub fn content(&self) -> Vec<u8> {
        pattern_bytes(self.size as usize, self.seed)
    }

    /// Write the file into `dir`, streaming in blocks
    pub fn write_to(&self, dir: &Path) -> io::Result<PathBuf> {
        let path = dir.join(&self.name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(&path)?);
        let mut block = Vec::with_capacity(WRITE_BLOCK);
        let mut written = 0u64;
        while written < self.size {
            let len = (self.size - written).min(WRITE_BLOCK as u64) as usize;
            block.clear();
            fill_pattern(&mut block, written, len, self.seed);
            writer.write_all(&block)?;
            written += len as u64;
        }
        writer.flush()?;
        Ok(path)
    }
}

/// Temporary directory of test files, removed on drop
#[derive(Debug)]
pub struct TestFiles {
    dir: TempDir,
}

impl TestFiles {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn add(&self, file: &TestFileBuilder) -> io::Result<PathBuf> {
        file.write_to(self.dir.path())
    }
}
