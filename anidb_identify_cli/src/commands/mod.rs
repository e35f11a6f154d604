//! Subcommand implementations

pub mod hash;
pub mod identify;
pub mod status;

pub use hash::{HashRun, OutputFormat, hash_files, print_hash_run};
pub use identify::{identify, identify_with, print_summary};
pub use status::{StatusReport, collect_status, print_status};

/// Settings key holding the time of the last finished identify run
pub const LAST_IDENTIFY_KEY: &str = "last_identify_at";
