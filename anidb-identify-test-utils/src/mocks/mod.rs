//! Mock implementations for testing

mod server;
mod transport;

pub use server::{FAKE_SESSION, FakeAnidb, KnownFile};
pub use transport::{MockTransport, tag_of};
