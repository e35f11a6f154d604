//! Media extensions picked up when no include pattern is given

use std::path::Path;

pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "ts", "m2ts", "ogm",
    "rmvb",
];

pub const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "sub", "idx", "vtt"];

pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "aac", "ogg", "m4a", "wma", "opus"];

/// What a media file holds, judged by its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Subtitle,
    Audio,
}

impl MediaKind {
    pub fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let ext = ext.as_str();
        if VIDEO_EXTENSIONS.contains(&ext) {
            Some(Self::Video)
        } else if SUBTITLE_EXTENSIONS.contains(&ext) {
            Some(Self::Subtitle)
        } else if AUDIO_EXTENSIONS.contains(&ext) {
            Some(Self::Audio)
        } else {
            None
        }
    }
}

/// `*.ext` for every known media extension; matched case-insensitively
pub fn default_patterns() -> Vec<String> {
    VIDEO_EXTENSIONS
        .iter()
        .chain(SUBTITLE_EXTENSIONS)
        .chain(AUDIO_EXTENSIONS)
        .map(|ext| format!("*.{ext}"))
        .collect()
}
