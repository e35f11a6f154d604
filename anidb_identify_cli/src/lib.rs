//! Library half of the `anidb-identify` binary
//!
//! Everything the subcommands do lives here so integration tests can drive
//! it without spawning the binary.

pub mod commands;
pub mod config;
pub mod discovery;
pub mod paths;
pub mod progress;
pub mod terminal;
