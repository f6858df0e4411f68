//! Data types exchanged across the driver boundary.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Default access mode of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Read,
    Write,
}

impl AccessMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
        }
    }
}

/// Opaque, unordered set of causal-history tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bookmarks(BTreeSet<String>);

impl Bookmarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    pub fn insert(&mut self, token: impl Into<String>) {
        self.0.insert(token.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl<S: Into<String>> FromIterator<S> for Bookmarks {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Bookmarks(iter.into_iter().map(Into::into).collect())
    }
}

impl std::fmt::Display for Bookmarks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tokens: Vec<&str> = self.iter().collect();
        write!(f, "[{}]", tokens.join(", "))
    }
}

/// Driver-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Records fetched per network round trip
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,

    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

fn default_user_agent() -> String {
    format!("cairn/{}", env!("CARGO_PKG_VERSION"))
}

fn default_fetch_size() -> usize {
    1000
}

fn default_connection_timeout_ms() -> u64 {
    30_000
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            fetch_size: default_fetch_size(),
            connection_timeout_ms: default_connection_timeout_ms(),
        }
    }
}

/// Session-level settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionConfig {
    pub database: Option<String>,
    pub bookmarks: Bookmarks,
    /// `None` leaves the choice to the backend.
    pub default_access_mode: Option<AccessMode>,
    pub fetch_size: Option<usize>,
}

/// Transaction-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionConfig {
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// A raw record as produced by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    keys: Vec<String>,
    values: Vec<Value>,
}

impl Record {
    pub fn new(keys: Vec<String>, values: Vec<Value>) -> Self {
        Self { keys, values }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.keys
            .iter()
            .position(|k| k == key)
            .and_then(|idx| self.values.get(idx))
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Value>) {
        (self.keys, self.values)
    }
}

/// Write counters reported for one unit of work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub nodes_created: i64,
    pub nodes_deleted: i64,
    pub relationships_created: i64,
    pub relationships_deleted: i64,
    pub properties_set: i64,
    pub labels_added: i64,
    pub labels_removed: i64,
    pub indexes_added: i64,
    pub indexes_removed: i64,
    pub constraints_added: i64,
    pub constraints_removed: i64,
}

impl Counters {
    /// Every counter under its interchange name, in a stable order.
    pub fn stats(&self) -> [(&'static str, i64); 11] {
        [
            ("nodesCreated", self.nodes_created),
            ("nodesDeleted", self.nodes_deleted),
            ("relationshipsCreated", self.relationships_created),
            ("relationshipsDeleted", self.relationships_deleted),
            ("propertiesSet", self.properties_set),
            ("labelsAdded", self.labels_added),
            ("labelsRemoved", self.labels_removed),
            ("indexesAdded", self.indexes_added),
            ("indexesRemoved", self.indexes_removed),
            ("constraintsAdded", self.constraints_added),
            ("constraintsRemoved", self.constraints_removed),
        ]
    }

    pub fn contains_updates(&self) -> bool {
        self.stats().iter().any(|(_, v)| *v != 0)
    }

    pub fn accumulate(&mut self, other: &Counters) {
        self.nodes_created += other.nodes_created;
        self.nodes_deleted += other.nodes_deleted;
        self.relationships_created += other.relationships_created;
        self.relationships_deleted += other.relationships_deleted;
        self.properties_set += other.properties_set;
        self.labels_added += other.labels_added;
        self.labels_removed += other.labels_removed;
        self.indexes_added += other.indexes_added;
        self.indexes_removed += other.indexes_removed;
        self.constraints_added += other.constraints_added;
        self.constraints_removed += other.constraints_removed;
    }
}

/// Kind of statement as classified by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Read,
    Write,
    ReadWrite,
    Schema,
}

/// Summary as produced by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct RawSummary {
    pub statement: String,
    pub query_type: QueryType,
    pub counters: Counters,
    pub system_updates: i64,
    pub result_available_after_ms: i64,
    pub result_consumed_after_ms: i64,
    pub database: Option<String>,
}

impl RawSummary {
    pub fn new(statement: impl Into<String>, query_type: QueryType) -> Self {
        Self {
            statement: statement.into(),
            query_type,
            counters: Counters::default(),
            system_updates: 0,
            result_available_after_ms: 0,
            result_consumed_after_ms: 0,
            database: None,
        }
    }
}

/// Fully materialized result of an auto-commit or transactional run
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub keys: Vec<String>,
    pub records: Vec<Record>,
    pub summary: RawSummary,
}

/// One event of a streamed result, in protocol order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Keys(Vec<String>),
    Record(Record),
    Summary(RawSummary),
}
