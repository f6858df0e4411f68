//! Causal visibility across derived contexts

use crate::integration::test_utils::{harness, GET, PUT};
use cairn::config::ContextOverrides;
use cairn::params;
use serde_json::json;

#[tokio::test]
async fn test_end_to_end_write_then_readonly_read() {
    let h = harness("e2e");
    let mut c1 = h.writer();
    c1.run(PUT, params! { "key" => "k", "value" => "v1" })
        .await
        .unwrap();

    let mut c2 = h.factory.readonly(&c1, &ContextOverrides::new()).unwrap();
    let rows = c2.run(GET, params! { "key" => "k" }).await.unwrap();
    assert_eq!(serde_json::to_value(&rows).unwrap(), json!([{ "value": "v1" }]));
}

#[tokio::test]
async fn test_derived_reader_observes_parent_write() {
    let h = harness("propagate");
    let mut writer = h.writer();
    writer
        .run(PUT, params! { "key" => "k", "value" => "v1" })
        .await
        .unwrap();
    assert_eq!(h.cluster.follower_seq(None), 0);

    let mut reader = h.factory.readonly(&writer, &ContextOverrides::new()).unwrap();
    assert_eq!(&reader.session_config().bookmarks, writer.last_bookmarks());
    let rows = reader.run(GET, params! { "key" => "k" }).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(h.cluster.follower_seq(None), 1);
}

#[tokio::test]
async fn test_reader_ignoring_bookmarks_may_miss_the_write() {
    let h = harness("ignore");
    let mut writer = h.writer();
    writer
        .run(PUT, params! { "key" => "k", "value" => "v1" })
        .await
        .unwrap();

    let mut reader = h
        .factory
        .readonly(&writer, &ContextOverrides::new().ignore_bookmarks(true))
        .unwrap();
    assert!(reader.session_config().bookmarks.is_empty());
    let rows = reader.run(GET, params! { "key" => "k" }).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_derivation_snapshots_bookmarks() {
    let h = harness("snapshot");
    let mut writer = h.writer();
    let mut early = h.factory.readonly(&writer, &ContextOverrides::new()).unwrap();

    writer
        .run(PUT, params! { "key" => "k", "value" => "v1" })
        .await
        .unwrap();
    assert!(early.session_config().bookmarks.is_empty());
    assert!(early.run(GET, params! { "key" => "k" }).await.unwrap().is_empty());

    let late = h.factory.readonly(&writer, &ContextOverrides::new()).unwrap();
    let mut grandchild = h.factory.derive(&late, &ContextOverrides::new()).unwrap();
    let rows = grandchild.run(GET, params! { "key" => "k" }).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_forget_bookmarks_starts_an_independent_chain() {
    let h = harness("forget");
    let mut writer = h.writer();
    writer
        .run(PUT, params! { "key" => "k", "value" => "v1" })
        .await
        .unwrap();
    writer.forget_bookmarks();
    assert!(writer.last_bookmarks().is_empty());

    let mut reader = h.factory.readonly(&writer, &ContextOverrides::new()).unwrap();
    assert!(reader.run(GET, params! { "key" => "k" }).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bookmarks_advance_with_each_write() {
    let h = harness("advance");
    let mut writer = h.writer();
    writer
        .run(PUT, params! { "key" => "a", "value" => "1" })
        .await
        .unwrap();
    writer
        .run(PUT, params! { "key" => "b", "value" => "2" })
        .await
        .unwrap();
    assert!(writer.last_bookmarks().contains("advance:neo4j:2"));
    assert_eq!(writer.last_bookmarks().len(), 1);
}
