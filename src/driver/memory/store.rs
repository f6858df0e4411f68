//! Property graph held by the in-memory cluster.

use crate::driver::types::Counters;
use crate::error::{DriverError, DriverResult};
use crate::value::{Node, Relationship, Value};
use std::collections::BTreeMap;

/// Nodes and relationships of one database, plus the write counters of the current unit of work.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    nodes: BTreeMap<i64, Node>,
    relationships: BTreeMap<i64, Relationship>,
    next_id: i64,
    counters: Counters,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn create_node(&mut self, labels: &[&str], properties: BTreeMap<String, Value>) -> i64 {
        let identity = self.allocate_id();
        self.counters.nodes_created += 1;
        self.counters.labels_added += labels.len() as i64;
        self.counters.properties_set += properties.len() as i64;
        self.nodes.insert(
            identity,
            Node {
                identity,
                labels: labels.iter().map(|l| l.to_string()).collect(),
                properties,
            },
        );
        identity
    }

    /// Find the node with `label` whose `key` property equals `value`, creating it if absent.
    pub fn merge_node(&mut self, label: &str, key: &str, value: Value) -> i64 {
        if let Some(node) = self.find_nodes(label, key, &value).first() {
            return node.identity;
        }
        self.create_node(&[label], BTreeMap::from([(key.to_string(), value)]))
    }

    pub fn set_property(&mut self, identity: i64, name: &str, value: Value) -> DriverResult<()> {
        let node = self.nodes.get_mut(&identity).ok_or_else(|| {
            DriverError::query(
                "Neo.ClientError.Statement.EntityNotFound",
                format!("Node {} not found", identity),
            )
        })?;
        node.properties.insert(name.to_string(), value);
        self.counters.properties_set += 1;
        Ok(())
    }

    /// Delete a node and every relationship attached to it.
    pub fn detach_delete(&mut self, identity: i64) -> bool {
        if self.nodes.remove(&identity).is_none() {
            return false;
        }
        let attached: Vec<i64> = self
            .relationships
            .values()
            .filter(|r| r.start == identity || r.end == identity)
            .map(|r| r.identity)
            .collect();
        for rel in attached {
            self.relationships.remove(&rel);
            self.counters.relationships_deleted += 1;
        }
        self.counters.nodes_deleted += 1;
        true
    }

    pub fn create_relationship(
        &mut self,
        start: i64,
        end: i64,
        rel_type: &str,
        properties: BTreeMap<String, Value>,
    ) -> DriverResult<i64> {
        for endpoint in [start, end] {
            if !self.nodes.contains_key(&endpoint) {
                return Err(DriverError::query(
                    "Neo.ClientError.Statement.EntityNotFound",
                    format!("Node {} not found", endpoint),
                ));
            }
        }
        let identity = self.allocate_id();
        self.counters.relationships_created += 1;
        self.counters.properties_set += properties.len() as i64;
        self.relationships.insert(
            identity,
            Relationship {
                identity,
                start,
                end,
                rel_type: rel_type.to_string(),
                properties,
            },
        );
        Ok(identity)
    }

    pub fn node(&self, identity: i64) -> Option<&Node> {
        self.nodes.get(&identity)
    }

    pub fn find_nodes(&self, label: &str, key: &str, value: &Value) -> Vec<&Node> {
        self.nodes
            .values()
            .filter(|n| n.labels.iter().any(|l| l == label))
            .filter(|n| n.properties.get(key) == Some(value))
            .collect()
    }

    pub fn nodes_with_label(&self, label: &str) -> Vec<&Node> {
        self.nodes
            .values()
            .filter(|n| n.labels.iter().any(|l| l == label))
            .collect()
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Counters accumulated since the last call to [`GraphStore::take_counters`].
    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub(crate) fn take_counters(&mut self) -> Counters {
        std::mem::take(&mut self.counters)
    }
}
