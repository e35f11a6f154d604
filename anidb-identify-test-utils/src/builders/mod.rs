//! Builders for test inputs

mod files;

pub use files::{TestFileBuilder, TestFiles, pattern_bytes};
