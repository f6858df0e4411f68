//! Shared test utilities for integration tests
//!
//! Builds an in-memory cluster with a small key/value statement catalog, a factory that
//! connects to it, and a capturing sink so tests can inspect what contexts logged.

use cairn::config::{ContextConfig, ContextOverrides};
use cairn::context::{Context, ContextFactory};
use cairn::driver::memory::{MemoryCluster, MemoryConnector, Rows, StatementKind};
use cairn::error::DriverError;
use cairn::logging::{Hooks, MemorySink};
use cairn::value::Value;
use std::sync::Arc;

pub const PUT: &str = "MERGE (n:Entry {key: $key}) SET n.value = $value";
pub const GET: &str = "MATCH (n:Entry {key: $key}) RETURN n.value AS value";
pub const LIST: &str = "MATCH (n:Entry) RETURN n.key AS key, n.value AS value ORDER BY key";
pub const COUNT: &str = "MATCH (n:Entry) RETURN count(n) AS total";
pub const BULK_IMPORT: &str =
    "UNWIND $keys AS key CALL { WITH key MERGE (:Entry {key: key}) } IN TRANSACTIONS";
pub const BROKEN_WRITE: &str = "MERGE (n:Entry {key: $key}) SET n.value = 1 / 0";
pub const FLAKY_SCAN: &str = "MATCH (n:Entry) RETURN n.key AS key, 1 / 0 AS boom";

pub struct Harness {
    pub cluster: MemoryCluster,
    pub factory: ContextFactory,
    pub sink: Arc<MemorySink>,
}

impl Harness {
    pub fn config(&self) -> ContextConfig {
        ContextConfig::with_url(url(self.cluster.name()))
    }

    pub fn writer(&self) -> Context {
        self.factory
            .create(&self.config(), &ContextOverrides::new().write(true))
            .unwrap()
    }
}

pub fn url(cluster: &str) -> String {
    format!("memory://{}", cluster)
}

fn text(value: Option<&Value>) -> String {
    value.and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Cluster with the key/value catalog registered
pub fn cluster(name: &str) -> MemoryCluster {
    let cluster = MemoryCluster::new(name);
    cluster.register(PUT, StatementKind::Write, |store, params| {
        let key = params.get("key").cloned().unwrap_or_default();
        let id = store.merge_node("Entry", "key", key);
        store.set_property(id, "value", params.get("value").cloned().unwrap_or_default())?;
        Ok(Rows::empty())
    });
    cluster.register(GET, StatementKind::Read, |store, params| {
        let key = params.get("key").cloned().unwrap_or_default();
        let mut rows = Rows::new(&["value"]);
        for node in store.find_nodes("Entry", "key", &key) {
            rows = rows.row(vec![node.properties.get("value").cloned().unwrap_or_default()]);
        }
        Ok(rows)
    });
    cluster.register(LIST, StatementKind::Read, |store, _| {
        let mut nodes = store.nodes_with_label("Entry");
        nodes.sort_by_key(|n| text(n.properties.get("key")));
        let mut rows = Rows::new(&["key", "value"]);
        for node in nodes {
            rows = rows.row(vec![
                node.properties.get("key").cloned().unwrap_or_default(),
                node.properties.get("value").cloned().unwrap_or_default(),
            ]);
        }
        Ok(rows)
    });
    cluster.register(COUNT, StatementKind::Read, |store, _| {
        let total = store.nodes_with_label("Entry").len() as i64;
        Ok(Rows::new(&["total"]).row(vec![Value::Integer(total)]))
    });
    cluster.register(BULK_IMPORT, StatementKind::SelfTransactional, |store, params| {
        if let Some(Value::List(keys)) = params.get("keys") {
            for key in keys {
                store.merge_node("Entry", "key", key.clone());
            }
        }
        Ok(Rows::empty())
    });
    cluster.register(BROKEN_WRITE, StatementKind::Write, |_, _| {
        Err(DriverError::query(
            "Neo.ClientError.Statement.ArithmeticError",
            "/ by zero",
        ))
    });
    cluster.register(FLAKY_SCAN, StatementKind::Read, |store, _| {
        let mut rows = Rows::new(&["key", "boom"]);
        for node in store.nodes_with_label("Entry") {
            rows = rows.row(vec![
                node.properties.get("key").cloned().unwrap_or_default(),
                Value::Null,
            ]);
        }
        Ok(rows.fail_after(DriverError::query(
            "Neo.ClientError.Statement.ArithmeticError",
            "/ by zero",
        )))
    });
    cluster
}

/// Cluster, factory and capturing sink for one test
pub fn harness(name: &str) -> Harness {
    let cluster = cluster(name);
    let sink = MemorySink::new();
    let factory = ContextFactory::new(Arc::new(MemoryConnector::with_cluster(cluster.clone())))
        .with_hooks(Hooks::capturing(sink.clone()));
    Harness {
        cluster,
        factory,
        sink,
    }
}
