//! AniDB file identification pipeline
//!
//! Hashes local files with a pool of ed2k workers, answers what it can from
//! a local SQLite store, and asks the AniDB UDP API for the rest through a
//! durable, rate-limited packet queue.
//!
//! - [`hashing`]: ed2k engine and hasher thread pool
//! - [`protocol`]: commands, reply parsing, packet queue and client loop
//! - [`database`]: packet log, local files and metadata storage
//! - [`identification`]: local identify and the identify coordinator
//! - [`events`]: the event bus everything above publishes to

pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod hashing;
pub mod identification;
pub mod progress;
pub mod protocol;

pub use config::{PipelineConfig, StorageConfig};
pub use database::{Database, FileStatus, LocalFlags, Store};
pub use error::{Error, Result};
pub use events::{Event, EventBus, EventKind, SubscriptionId};
pub use hashing::{Ed2kEngine, Ed2kHash, HashOutcome, HasherPool, IoGate, PoolConfig};
pub use identification::{
    HashedFile, IdentifyCoordinator, IdentifyOptions, IdentifySummary, LocalIdentify,
};
pub use protocol::{ApiClient, ClientHandle, ClientStatus, ProtocolConfig, UdpTransport};
