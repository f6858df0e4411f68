//! Context creation, ownership and teardown

use crate::integration::test_utils::{harness, url, GET, PUT};
use cairn::config::{ConfigLoader, ContextConfig, ContextOverrides};
use cairn::context::ContextState;
use cairn::error::ContextError;
use cairn::params;
use serde_json::json;
use tempfile::TempDir;

#[tokio::test]
async fn test_missing_or_foreign_endpoint_fails_fast() {
    let h = harness("config");
    let err = h
        .factory
        .create(&ContextConfig::default(), &ContextOverrides::new())
        .unwrap_err();
    assert!(matches!(err, ContextError::Configuration(_)));

    let err = h
        .factory
        .create(&ContextConfig::with_url("neo4j://db.internal:7687"), &ContextOverrides::new())
        .unwrap_err();
    assert!(matches!(err, ContextError::Configuration(_)));
    assert_eq!(h.cluster.stats().sessions_opened, 0);
}

#[tokio::test]
async fn test_session_opens_lazily() {
    let h = harness("lazy");
    let ctx = h.writer();
    assert_eq!(ctx.state(), ContextState::Idle);
    assert_eq!(ctx.session_id(), None);
    assert_eq!(h.cluster.stats().sessions_opened, 0);
    ctx.verify_connectivity().await.unwrap();
}

#[tokio::test]
async fn test_read_is_idempotent() {
    let h = harness("idempotent");
    let mut ctx = h.writer();
    ctx.run(PUT, params! { "key" => "k", "value" => "v1" })
        .await
        .unwrap();

    let first = ctx.run(GET, params! { "key" => "k" }).await.unwrap();
    let second = ctx.run(GET, params! { "key" => "k" }).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_closed_session_reopens_with_staged_bookmarks() {
    let h = harness("reopen");
    let mut ctx = h.writer();
    ctx.run(PUT, params! { "key" => "k", "value" => "v1" })
        .await
        .unwrap();
    let first = ctx.session_id();
    ctx.close_session().await.unwrap();
    assert_eq!(ctx.state(), ContextState::Idle);

    let rows = ctx.run(GET, params! { "key" => "k" }).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_ne!(ctx.session_id(), first);
    assert!(ctx.session_config().bookmarks.contains("reopen:neo4j:1"));
}

#[tokio::test]
async fn test_shared_driver_is_only_closed_by_its_owner() {
    let h = harness("ownership");
    let mut root = h.writer();
    let mut child = h.factory.readonly(&root, &ContextOverrides::new()).unwrap();
    child.run(GET, params! { "key" => "k" }).await.unwrap();

    child.close().await.unwrap();
    assert!(!root.driver().is_closed());
    root.run(PUT, params! { "key" => "k", "value" => "v1" })
        .await
        .unwrap();

    root.close().await.unwrap();
    assert!(root.driver().is_closed());
    let err = child.run(GET, params! { "key" => "k" }).await.unwrap_err();
    assert!(matches!(err, ContextError::BackendQuery(_)));

    let stats = h.cluster.stats();
    assert_eq!(stats.sessions_opened, stats.sessions_closed);
}

#[tokio::test]
async fn test_failed_session_close_still_closes_owned_driver() {
    let h = harness("teardown");
    let mut ctx = h.writer();
    ctx.run(PUT, params! { "key" => "k", "value" => "v1" })
        .await
        .unwrap();

    h.cluster.fail_session_close(true);
    let err = ctx.close().await.unwrap_err();
    assert!(matches!(err, ContextError::BackendQuery(msg) if msg.contains("could not be closed")));
    assert!(ctx.driver().is_closed());
    assert_eq!(ctx.state(), ContextState::Idle);
}

#[tokio::test]
async fn test_hooks_capture_lifecycle_and_output() {
    let h = harness("hooks");
    let mut ctx = h.writer();
    ctx.run(PUT, params! { "key" => "k", "value" => "v1" })
        .await
        .unwrap();
    let rows = ctx.run(GET, params! { "key" => "k" }).await.unwrap();
    ctx.emit(&rows).unwrap();
    let _ = ctx.run("NOT A STATEMENT", params! {}).await;

    assert_eq!(h.sink.events("query_started").len(), 3);
    let completed = h.sink.events("query_completed");
    assert_eq!(completed.len(), 2);
    assert_eq!(completed[0].context, ctx.id());
    assert_eq!(
        completed[0].data["summary"]["counters"],
        json!({ "labelsAdded": 1, "nodesCreated": 1, "propertiesSet": 2 })
    );
    assert_eq!(h.sink.events("query_failed").len(), 1);
    assert_eq!(h.sink.outputs(), vec![json!([{ "value": "v1" }])]);
}

#[tokio::test]
async fn test_context_from_loaded_configuration() {
    let h = harness("loaded");
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("cairn.toml");
    std::fs::write(
        &path,
        format!(
            "url = \"{}\"\nwrite = true\n\n[transaction.metadata]\napp = \"loader\"\n",
            url("loaded")
        ),
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&path).unwrap();
    let mut ctx = h.factory.create(&config, &ContextOverrides::new()).unwrap();
    assert!(ctx.owns_driver());
    ctx.run(PUT, params! { "key" => "k", "value" => "v1" })
        .await
        .unwrap();
    assert_eq!(h.cluster.leader_seq(None), 1);
    assert_eq!(
        ctx.transaction_config().metadata["app"],
        cairn::value::Value::from("loader")
    );
}
