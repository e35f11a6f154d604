//! Shared setup for the integration tests: a scratch database, a fast
//! client configuration and a client wired to a [`FakeAnidb`]

#![allow(dead_code)]

use anidb_identify_core::protocol::SessionHandle;
use anidb_identify_core::{
    ApiClient, ClientHandle, Database, Ed2kEngine, EventBus, HashOutcome, IoGate, PoolConfig,
    ProtocolConfig,
};
use anidb_identify_test_utils::{FakeAnidb, MockTransport, TestFileBuilder, TestFiles};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct Harness {
    pub dir: TempDir,
    pub database: Database,
    pub files: TestFiles,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let database = Database::open(&dir.path().join("identify.db")).await.unwrap();
        Self {
            dir,
            database,
            files: TestFiles::new().unwrap(),
        }
    }

    pub fn add_file(&self, name: &str, size: u64, seed: u8) -> PathBuf {
        self.files
            .add(&TestFileBuilder::new(name).size(size).seed(seed))
            .unwrap()
    }

    /// Spawn a client on `transport` that answers with `server`
    pub async fn client(
        &self,
        transport: MockTransport,
        server: &FakeAnidb,
        events: &EventBus,
    ) -> ClientHandle {
        transport.respond_with(server.responder());
        let store = self.database.connect().await.unwrap();
        ApiClient::new(protocol_config(), transport, store, SessionHandle::new(), events.clone())
            .await
            .unwrap()
            .spawn()
    }
}

/// Credentials set, sends every 10ms, no compression
pub fn protocol_config() -> ProtocolConfig {
    ProtocolConfig {
        username: "tester".to_string(),
        password: "secret".to_string(),
        send_interval_ms: 10,
        reply_timeout_ms: 2_000,
        compression: false,
        ..Default::default()
    }
}

pub fn pool_config() -> PoolConfig {
    PoolConfig {
        max_threads: 2,
        ..Default::default()
    }
}

/// Size and lowercase hex digest of a file on disk
pub fn ed2k_of(path: &Path) -> (u64, String) {
    let mut engine = Ed2kEngine::new(IoGate::new(false));
    match engine.hash_file(path, &mut |_, _| {}) {
        HashOutcome::Hashed(hash) => (hash.size, hash.hex()),
        other => panic!("hashing {} failed: {other:?}", path.display()),
    }
}

/// Size as stored in the database
pub fn db_size(size: u64) -> i64 {
    i64::try_from(size).unwrap()
}
