use bytes::Bytes;
use d_engine_treecache::Acl;
use d_engine_treecache::Coordinator;
use d_engine_treecache::Error;
use d_engine_treecache::MemCoordinator;
use d_engine_treecache::TreeCacheConfig;
use d_engine_treecache::TreeClient;

#[tokio::test]
async fn test_connect_creates_missing_ancestors() {
    let (service, events) = MemCoordinator::new();
    service.create("/apps", Bytes::from("keep"), &[]).await.unwrap();

    let client = TreeClient::builder(service.clone(), events)
        .root_path("/apps/web/nodes")
        .connect()
        .await
        .unwrap();

    for p in ["/apps", "/apps/web", "/apps/web/nodes"] {
        assert!(service.contains(p), "{p}");
    }
    // existing segments are left alone
    let (data, _) = service.get("/apps").await.unwrap();
    assert_eq!(data, Bytes::from("keep"));
    let (data, _) = service.get("/apps/web").await.unwrap();
    assert!(data.is_empty());
    assert!(service.acl("/apps").unwrap().is_empty());
    assert_eq!(service.acl("/apps/web").unwrap(), vec![Acl::world_all()]);
    assert_eq!(service.acl("/apps/web/nodes").unwrap(), vec![Acl::world_all()]);

    // idempotent
    client.bootstrap().await.unwrap();
    client.shutdown().await;
}

#[tokio::test]
async fn test_connect_with_loaded_config() {
    let (service, events) = MemCoordinator::new();
    let mut config = TreeCacheConfig::default();
    config.session.root_path = "/cfg".to_string();
    config.session.auth = Some("ops:aGFzaA==".to_string());

    let client = TreeClient::builder(service.clone(), events)
        .config(config)
        .connect()
        .await
        .unwrap();

    assert!(service.contains("/cfg"));
    assert_eq!(
        service.acl("/cfg").unwrap(),
        vec![Acl::digest("ops:aGFzaA=="), Acl::world_read()]
    );
    assert_eq!(client.config().session.root_path, "/cfg");
    client.shutdown().await;
}

#[tokio::test]
async fn test_connect_rejects_invalid_config() {
    let (service, events) = MemCoordinator::new();

    let result = TreeClient::builder(service.clone(), events)
        .event_buffer_size(0)
        .connect()
        .await;

    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_ensure_path_rejects_relative_paths() {
    let (service, events) = MemCoordinator::new();
    let client = TreeClient::builder(service, events).connect().await.unwrap();

    assert!(client.ensure_path("relative/path").await.is_err());
    client.shutdown().await;
}
