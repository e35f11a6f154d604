//! Unanswered packets survive a client restart

mod common;

use anidb_identify_core::protocol::SessionHandle;
use anidb_identify_core::protocol::mask::{FILE_AMASK, FILE_FMASK, FileField};
use anidb_identify_core::protocol::messages::Command;
use anidb_identify_core::{ApiClient, Event, EventBus};
use anidb_identify_test_utils::{FakeAnidb, KnownFile, MockTransport, tag_of};
use common::{Harness, db_size, ed2k_of, protocol_config};
use std::time::Duration;

#[tokio::test]
async fn test_restarted_client_resends_open_packets() {
    let harness = Harness::new().await;
    let path = harness.add_file("resumed.mkv", 30_000, 9);
    let (size, ed2k) = ed2k_of(&path);
    let command = Command::file(
        size,
        ed2k.clone(),
        FILE_FMASK.mask_for(&[FileField::Aid, FileField::Eid]),
        FILE_AMASK.mask_for(&[]),
    );

    // A server that never answers: only AUTH goes out
    let silent = MockTransport::new();
    let store = harness.database.connect().await.unwrap();
    let client = ApiClient::new(
        protocol_config(),
        silent.clone(),
        store,
        SessionHandle::new(),
        EventBus::new(),
    )
    .await
    .unwrap()
    .spawn();
    let file_tag = client.send(&command).await.unwrap();
    assert!(silent.wait_for_sends(1, Duration::from_secs(5)).await);
    client.shutdown().await.unwrap();
    assert!(silent.sent().iter().all(|line| !line.starts_with("FILE ")));

    let mut store = harness.database.connect().await.unwrap();
    assert_eq!(store.packets().counts().await.unwrap().replied, 0);
    store.close().await.unwrap();

    let server = FakeAnidb::new().with_file(size, &ed2k, KnownFile::numbered(5));
    let transport = MockTransport::new();
    let events = EventBus::new();
    let mut replies = events.channel();
    let client = harness.client(transport.clone(), &server, &events).await;

    let code = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(event) = replies.recv().await {
            if let Event::PacketReply { tag, code, .. } = event
                && tag == file_tag
            {
                return code;
            }
        }
        None
    })
    .await
    .unwrap();
    assert_eq!(code, Some(220));
    client.shutdown().await.unwrap();

    let sent = transport.sent();
    let auth_tag = sent
        .iter()
        .find(|line| line.starts_with("AUTH "))
        .and_then(|line| tag_of(line))
        .unwrap();
    assert!(auth_tag > file_tag, "tags continue after the logged ones");
    let resent = sent.iter().find(|line| line.starts_with("FILE ")).unwrap();
    assert_eq!(tag_of(resent), Some(file_tag));

    let mut store = harness.database.connect().await.unwrap();
    let file = store
        .metadata()
        .find_file_by_identity(db_size(size), &ed2k)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file.aid(), Some(50));
}
