//! Streaming walk of one directory

use super::{DiscoveredFile, DiscoveryOptions, Result, extensions::MediaKind, filter::FileFilter};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Files under `root` accepted by the filter, in walk order
pub struct DirectoryWalker {
    root: PathBuf,
    entries: walkdir::IntoIter,
    filter: FileFilter,
}

impl DirectoryWalker {
    pub fn new(root: &Path, options: &DiscoveryOptions, filter: FileFilter) -> Self {
        let mut walk = WalkDir::new(root)
            .follow_links(options.follow_links)
            .sort_by_file_name();
        if !options.recursive {
            walk = walk.max_depth(1);
        }
        Self {
            root: root.to_path_buf(),
            entries: walk.into_iter(),
            filter,
        }
    }
}

impl Iterator for DirectoryWalker {
    type Item = Result<DiscoveredFile>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            if !self.filter.accepts(relative) {
                log::trace!("Filtered out {}", entry.path().display());
                continue;
            }
            match entry.metadata() {
                Ok(metadata) => {
                    return Some(Ok(DiscoveredFile {
                        kind: MediaKind::of(entry.path()),
                        path: entry.into_path(),
                        size: metadata.len(),
                    }));
                }
                Err(e) => log::warn!("Failed to read metadata for {}: {e}", entry.path().display()),
            }
        }
    }
}
