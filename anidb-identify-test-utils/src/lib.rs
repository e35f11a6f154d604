//! Test utilities for the identification pipeline
//!
//! - [`MockTransport`]: in-memory datagram transport that records what the
//!   client sends and plays back canned or computed replies
//! - [`FakeAnidb`]: a responder that knows a table of files and a mylist
//! - [`TestFileBuilder`] and [`TestFiles`]: deterministic file contents of
//!   any size in a throwaway directory

pub mod builders;
pub mod mocks;

pub use builders::{TestFileBuilder, TestFiles, pattern_bytes};
pub use mocks::{FAKE_SESSION, FakeAnidb, KnownFile, MockTransport, tag_of};
