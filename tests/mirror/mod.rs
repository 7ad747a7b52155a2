use std::time::Duration;

use bytes::Bytes;
use d_engine_treecache::Coordinator;
use d_engine_treecache::NodeEventKind;
use d_engine_treecache::NodeState;
use d_engine_treecache::RawEvent;
use d_engine_treecache::RawEventKind;

use crate::common::connect;
use crate::common::connect_deaf;
use crate::common::count;
use crate::common::settle;

#[tokio::test]
async fn test_data_updates_are_emitted_once_per_version() {
    let (service, client) = connect("/a").await;
    let (root, mut events) = client.watch("/a").unwrap();
    root.init().await.unwrap();

    let created = settle(&mut events).await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].kind, NodeEventKind::Created);

    service.set_data("/a", "v1").unwrap();
    let updates = settle(&mut events).await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].kind, NodeEventKind::Updated);
    assert_eq!(updates[0].data, Bytes::from("v1"));
    assert_eq!(updates[0].version(), Some(1));

    // a duplicate notification for version 1
    root.echo(RawEvent::new(RawEventKind::NodeDataChanged, "/a")).await;
    assert!(settle(&mut events).await.is_empty());

    service.set_data("/a", "v2").unwrap();
    let updates = settle(&mut events).await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].data, Bytes::from("v2"));
    assert_eq!(root.data_version(), 2);

    client.shutdown().await;
}

#[tokio::test]
async fn test_new_child_is_discovered() {
    let (service, client) = connect("/a").await;
    let (root, mut events) = client.watch("/a").unwrap();
    root.init().await.unwrap();
    settle(&mut events).await;

    service
        .create("/a/b", Bytes::from("hello"), &[])
        .await
        .unwrap();

    let events_seen = settle(&mut events).await;
    assert_eq!(events_seen.len(), 1);
    assert_eq!(events_seen[0].kind, NodeEventKind::Created);
    assert_eq!(events_seen[0].path, "/a/b");
    assert_eq!(events_seen[0].name, "b");
    assert_eq!(events_seen[0].data, Bytes::from("hello"));

    let b = root.child("/a/b").expect("b is tracked");
    assert_eq!(b.state(), NodeState::Live);
    assert!(std::sync::Arc::ptr_eq(&client.get("/a/b").unwrap(), &b));

    // the child's own watches are live
    service.set_data("/a/b", "again").unwrap();
    let updates = settle(&mut events).await;
    assert_eq!(count(&updates, NodeEventKind::Updated, "/a/b"), 1);

    client.shutdown().await;
}

#[tokio::test]
async fn test_existing_subtree_is_mirrored_on_init() {
    let (service, client) = connect("/a/b/c").await;
    service.create("/a/b/c/d", Bytes::new(), &[]).await.unwrap();
    service.create("/a/x", Bytes::new(), &[]).await.unwrap();

    let (root, mut events) = client.watch("/a").unwrap();
    root.init().await.unwrap();

    let seen = settle(&mut events).await;
    for p in ["/a", "/a/b", "/a/b/c", "/a/b/c/d", "/a/x"] {
        assert_eq!(count(&seen, NodeEventKind::Created, p), 1, "{p}");
    }
    assert_eq!(seen.len(), 5);
    assert_eq!(client.node_count(), 5);
    assert!(service.data_watch_count() >= 5);
    assert!(service.child_watch_count() >= 5);

    client.shutdown().await;
}

#[tokio::test]
async fn test_independent_roots_have_separate_streams() {
    let (service, client) = connect("/").await;
    service.create("/left", Bytes::new(), &[]).await.unwrap();
    service.create("/right", Bytes::new(), &[]).await.unwrap();

    let (left, mut left_events) = client.watch("/left").unwrap();
    let (right, mut right_events) = client.watch("/right").unwrap();
    left.init().await.unwrap();
    right.init().await.unwrap();
    settle(&mut left_events).await;
    settle(&mut right_events).await;

    service.create("/right/r1", Bytes::new(), &[]).await.unwrap();

    assert!(settle(&mut left_events).await.is_empty());
    let seen = settle(&mut right_events).await;
    assert_eq!(count(&seen, NodeEventKind::Created, "/right/r1"), 1);

    client.shutdown().await;
}

#[tokio::test]
async fn test_session_events_are_ignored() {
    let (service, client) = connect("/a").await;
    let (root, mut events) = client.watch("/a").unwrap();
    root.init().await.unwrap();
    settle(&mut events).await;

    service.session_event();
    assert!(settle(&mut events).await.is_empty());

    // routing keeps working afterwards
    service.set_data("/a", "v1").unwrap();
    assert_eq!(settle(&mut events).await.len(), 1);

    client.shutdown().await;
}

#[tokio::test]
async fn test_flush_recovers_lost_notifications() {
    let (service, client) = connect_deaf("/a", Duration::from_millis(100)).await;
    let (root, mut events) = client.watch("/a").unwrap();
    root.init().await.unwrap();
    settle(&mut events).await;

    service.set_data("/a", "missed").unwrap();
    service.create("/a/b", Bytes::new(), &[]).await.unwrap();

    let seen = settle(&mut events).await;
    assert_eq!(count(&seen, NodeEventKind::Updated, "/a"), 1);
    assert_eq!(count(&seen, NodeEventKind::Created, "/a/b"), 1);
    assert!(root.child("/a/b").is_some());

    service.delete("/a/b").unwrap();
    let seen = settle(&mut events).await;
    assert_eq!(count(&seen, NodeEventKind::Removed, "/a/b"), 1);
    assert!(root.child("/a/b").is_none());

    client.shutdown().await;
}
