use std::sync::Arc;

use bytes::Bytes;
use d_engine_treecache::Coordinator;
use d_engine_treecache::NodeEventKind;
use d_engine_treecache::NodeState;

use crate::common::connect;
use crate::common::count;
use crate::common::settle;

#[tokio::test]
async fn test_deleting_subtree_removes_every_node_once() {
    let (service, client) = connect("/a/b/c").await;
    let (root, mut events) = client.watch("/a").unwrap();
    root.init().await.unwrap();
    settle(&mut events).await;

    let b = root.child("/a/b").unwrap();
    let c = b.child("/a/b/c").unwrap();

    service.delete_all("/a/b").unwrap();

    let seen = settle(&mut events).await;
    assert_eq!(count(&seen, NodeEventKind::Removed, "/a/b/c"), 1);
    assert_eq!(count(&seen, NodeEventKind::Removed, "/a/b"), 1);
    assert_eq!(seen.len(), 2);
    // children go first
    let order: Vec<_> = seen.iter().map(|e| (e.kind, e.path.as_str())).collect();
    assert_eq!(
        order,
        vec![
            (NodeEventKind::Removed, "/a/b/c"),
            (NodeEventKind::Removed, "/a/b"),
        ]
    );

    assert!(root.child("/a/b").is_none());
    assert!(root.children().is_empty());
    assert!(client.get("/a/b").is_none());
    assert!(client.get("/a/b/c").is_none());
    assert_eq!(b.state(), NodeState::Cleared);
    assert_eq!(c.state(), NodeState::Cleared);
    assert_eq!(root.state(), NodeState::Live);

    client.shutdown().await;
}

#[tokio::test]
async fn test_recreated_node_gets_a_fresh_instance() {
    let (service, client) = connect("/a/b").await;
    let (root, mut events) = client.watch("/a").unwrap();
    root.init().await.unwrap();
    settle(&mut events).await;
    let old = root.child("/a/b").unwrap();

    service.delete("/a/b").unwrap();
    let seen = settle(&mut events).await;
    assert_eq!(count(&seen, NodeEventKind::Removed, "/a/b"), 1);

    service
        .create("/a/b", Bytes::from("second life"), &[])
        .await
        .unwrap();
    let seen = settle(&mut events).await;
    assert_eq!(count(&seen, NodeEventKind::Created, "/a/b"), 1);

    let fresh = root.child("/a/b").unwrap();
    assert!(!Arc::ptr_eq(&old, &fresh));
    assert_eq!(fresh.state(), NodeState::Live);
    assert!(Arc::ptr_eq(&client.get("/a/b").unwrap(), &fresh));

    client.shutdown().await;
}

#[tokio::test]
async fn test_deleting_watched_root_clears_it() {
    let (service, client) = connect("/a").await;
    let (root, mut events) = client.watch("/a").unwrap();
    root.init().await.unwrap();
    settle(&mut events).await;

    service.delete("/a").unwrap();

    let seen = settle(&mut events).await;
    assert_eq!(seen.len(), 1);
    assert_eq!(count(&seen, NodeEventKind::Removed, "/a"), 1);
    assert_eq!(root.state(), NodeState::Cleared);
    assert_eq!(client.node_count(), 0);

    // the path can be watched again once it exists
    service.create("/a", Bytes::new(), &[]).await.unwrap();
    let (again, mut events) = client.watch("/a").unwrap();
    again.init().await.unwrap();
    assert_eq!(count(&settle(&mut events).await, NodeEventKind::Created, "/a"), 1);

    client.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_tears_down_all_subtrees() {
    let (service, client) = connect("/a/b").await;
    service.create("/z", Bytes::new(), &[]).await.unwrap();
    let (a, mut a_events) = client.watch("/a").unwrap();
    let (z, mut z_events) = client.watch("/z").unwrap();
    a.init().await.unwrap();
    z.init().await.unwrap();
    settle(&mut a_events).await;
    settle(&mut z_events).await;

    client.shutdown().await;

    assert!(client.is_shutdown());
    assert_eq!(client.node_count(), 0);
    let seen = settle(&mut a_events).await;
    assert_eq!(count(&seen, NodeEventKind::Removed, "/a/b"), 1);
    assert_eq!(count(&seen, NodeEventKind::Removed, "/a"), 1);
    assert_eq!(count(&settle(&mut z_events).await, NodeEventKind::Removed, "/z"), 1);

    // nothing is routed any more
    service.set_data("/z", "late").unwrap();
    assert!(settle(&mut z_events).await.is_empty());
}
