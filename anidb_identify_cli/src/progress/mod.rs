//! Progress display for the CLI

mod format;
pub mod renderer;

pub use format::{format_bytes, format_throughput};
pub use renderer::{ProgressRenderer, render_events};
