//! Turn command line paths into the list of files to process
//!
//! Files named directly are always taken. Directories are walked with
//! `walkdir` and filtered by include/exclude globs, defaulting to known
//! media extensions.

mod extensions;
mod filter;
mod walker;

pub use extensions::{AUDIO_EXTENSIONS, MediaKind, SUBTITLE_EXTENSIONS, VIDEO_EXTENSIONS};
pub use filter::FileFilter;
pub use walker::DirectoryWalker;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub size: u64,
    pub kind: Option<MediaKind>,
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid glob pattern: {0}")]
    InvalidPattern(String),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// Fall back to media extensions when no include pattern is given
    pub use_defaults: bool,
    pub recursive: bool,
    pub follow_links: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            use_defaults: true,
            recursive: true,
            follow_links: false,
        }
    }
}

impl DiscoveryOptions {
    fn filter(&self) -> Result<FileFilter> {
        let include = if self.include_patterns.is_empty() && self.use_defaults {
            extensions::default_patterns()
        } else {
            self.include_patterns.clone()
        };
        FileFilter::new(&include, &self.exclude_patterns)
    }
}

fn explicit_file(path: &Path) -> Result<DiscoveredFile> {
    let metadata = std::fs::metadata(path).map_err(|source| DiscoveryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(DiscoveredFile {
        path: path.to_path_buf(),
        size: metadata.len(),
        kind: MediaKind::of(path),
    })
}

/// Every file under `paths`, each listed once, sorted by path
pub fn discover(paths: &[PathBuf], options: &DiscoveryOptions) -> Result<Vec<DiscoveredFile>> {
    let filter = options.filter()?;
    let mut found = BTreeMap::new();

    for path in paths {
        if path.is_file() {
            let file = explicit_file(path)?;
            found.insert(file.path.clone(), file);
        } else if path.is_dir() {
            for file in DirectoryWalker::new(path, options, filter.clone()) {
                let file = file?;
                found.insert(file.path.clone(), file);
            }
        } else {
            return Err(DiscoveryError::PathNotFound(path.clone()));
        }
    }

    Ok(found.into_values().collect())
}

/// Count of discovered files per media kind, unknown extensions last
pub fn kind_counts(files: &[DiscoveredFile]) -> Vec<(Option<MediaKind>, usize)> {
    let kinds = [
        Some(MediaKind::Video),
        Some(MediaKind::Subtitle),
        Some(MediaKind::Audio),
        None,
    ];
    kinds
        .into_iter()
        .map(|kind| (kind, files.iter().filter(|f| f.kind == kind).count()))
        .filter(|(_, count)| *count > 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn library() -> TempDir {
        let dir = TempDir::new().unwrap();
        let base = dir.path();
        fs::write(base.join("ep01.mkv"), b"video").unwrap();
        fs::write(base.join("ep01.ass"), b"subs").unwrap();
        fs::write(base.join("notes.txt"), b"text").unwrap();
        fs::create_dir(base.join("extras")).unwrap();
        fs::write(base.join("extras/ncop.MP4"), b"video").unwrap();
        fs::write(base.join("extras/ep02.mkv.part"), b"partial").unwrap();
        dir
    }

    fn names(files: &[DiscoveredFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_defaults_pick_media_recursively() {
        let dir = library();
        let files = discover(&[dir.path().to_path_buf()], &DiscoveryOptions::default()).unwrap();
        assert_eq!(names(&files), ["ep01.ass", "ep01.mkv", "ncop.MP4"]);
        assert_eq!(files[1].size, 5);
        assert_eq!(
            kind_counts(&files),
            vec![(Some(MediaKind::Video), 2), (Some(MediaKind::Subtitle), 1)]
        );
    }

    #[test]
    fn test_non_recursive_and_excludes() {
        let dir = library();
        let options = DiscoveryOptions {
            recursive: false,
            ..Default::default()
        };
        let files = discover(&[dir.path().to_path_buf()], &options).unwrap();
        assert_eq!(names(&files), ["ep01.ass", "ep01.mkv"]);

        let options = DiscoveryOptions {
            exclude_patterns: vec!["extras/*".to_string(), "*.ass".to_string()],
            ..Default::default()
        };
        let files = discover(&[dir.path().to_path_buf()], &options).unwrap();
        assert_eq!(names(&files), ["ep01.mkv"]);
    }

    #[test]
    fn test_explicit_files_bypass_filters_and_dedupe() {
        let dir = library();
        let notes = dir.path().join("notes.txt");
        let files = discover(
            &[notes.clone(), dir.path().to_path_buf(), notes.clone()],
            &DiscoveryOptions::default(),
        )
        .unwrap();
        assert_eq!(files.len(), 4);
        assert!(files.iter().any(|f| f.path == notes && f.kind.is_none()));
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = discover(&[dir.path().join("gone")], &DiscoveryOptions::default()).unwrap_err();
        assert!(matches!(err, DiscoveryError::PathNotFound(_)));
    }
}
