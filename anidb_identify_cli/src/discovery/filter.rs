//! Include/exclude glob matching
//!
//! Patterns are matched case-insensitively against the path relative to
//! the directory being walked. Excludes always win.

use super::{DiscoveryError, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;

fn build_set(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| DiscoveryError::InvalidPattern(format!("{pattern}: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| DiscoveryError::InvalidPattern(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct FileFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl FileFilter {
    /// No include patterns means every file is included
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_set(include)?,
            exclude: build_set(exclude)?,
        })
    }

    pub fn accepts(&self, path: &Path) -> bool {
        if let Some(exclude) = &self.exclude
            && exclude.is_match(path)
        {
            return false;
        }
        self.include
            .as_ref()
            .is_none_or(|include| include.is_match(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_include_is_case_insensitive() {
        let filter = FileFilter::new(&patterns(&["*.mkv"]), &[]).unwrap();
        assert!(filter.accepts(Path::new("ep01.mkv")));
        assert!(filter.accepts(Path::new("Show/EP01.MKV")));
        assert!(!filter.accepts(Path::new("ep01.mp4")));
    }

    #[test]
    fn test_exclude_wins() {
        let filter = FileFilter::new(&patterns(&["*.mkv"]), &patterns(&["extras/*"])).unwrap();
        assert!(filter.accepts(Path::new("ep01.mkv")));
        assert!(!filter.accepts(Path::new("extras/ncop.mkv")));
    }

    #[test]
    fn test_no_patterns_accepts_everything() {
        let filter = FileFilter::new(&[], &[]).unwrap();
        assert!(filter.accepts(Path::new("anything.bin")));

        let filter = FileFilter::new(&[], &patterns(&["*.part"])).unwrap();
        assert!(filter.accepts(Path::new("ep01.mkv")));
        assert!(!filter.accepts(Path::new("ep02.mkv.part")));
    }

    #[test]
    fn test_bad_pattern_is_reported() {
        let err = FileFilter::new(&patterns(&["[unclosed"]), &[]).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidPattern(p) if p.contains("[unclosed")));
    }
}
