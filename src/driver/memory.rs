//! In-Memory Causal Cluster
//!
//! A complete [`GraphDriver`] backend that models one leader and one lagging follower per
//! database. Writes commit on the leader and yield a bookmark; the follower applies committed
//! writes only when a read presents a bookmark it has not reached yet (or on an explicit
//! [`MemoryCluster::replicate`]). Read-mode sessions read the follower, so a read without the
//! right bookmark can legitimately miss an earlier write.
//!
//! Statements are registered ahead of time as procedures keyed by their text; query-language
//! parsing is out of scope here.

use crate::driver::types::{
    AccessMode, Bookmarks, DriverConfig, QueryResult, QueryType, RawSummary, Record,
    SessionConfig, StreamEvent, TransactionConfig,
};
use crate::driver::{Connector, GraphDriver, GraphSession, GraphTransaction, RecordStream};
use crate::error::{DriverError, DriverResult};
use crate::value::{Params, Value};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

pub mod store;

pub use store::GraphStore;

pub const DEFAULT_DATABASE: &str = "neo4j";

/// How a registered statement interacts with transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Read,
    Write,
    /// Manages its own inner transactions; only valid as an auto-commit run.
    SelfTransactional,
}

/// Rows produced by a registered statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    pub keys: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Failure raised after every row has been produced
    pub trailing_error: Option<DriverError>,
}

impl Rows {
    pub fn new(keys: &[&str]) -> Self {
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            rows: Vec::new(),
            trailing_error: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn fail_after(mut self, error: DriverError) -> Self {
        self.trailing_error = Some(error);
        self
    }
}

/// Rows produced one at a time, on demand, from a read snapshot
pub struct Cursor {
    keys: Vec<String>,
    rows: Box<dyn Iterator<Item = DriverResult<Vec<Value>>> + Send>,
}

impl Cursor {
    pub fn new<I>(keys: &[&str], rows: I) -> Self
    where
        I: IntoIterator<Item = DriverResult<Vec<Value>>>,
        I::IntoIter: Send + 'static,
    {
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            rows: Box::new(rows.into_iter()),
        }
    }

    /// Drain into [`Rows`]. The first error becomes the trailing error.
    fn drain(self) -> Rows {
        let mut rows = Rows {
            keys: self.keys,
            ..Rows::default()
        };
        for row in self.rows {
            match row {
                Ok(values) => rows.rows.push(values),
                Err(err) => {
                    rows.trailing_error = Some(err);
                    break;
                }
            }
        }
        rows
    }
}

/// Statement implementation registered on a cluster
pub type Handler = Arc<dyn Fn(&mut GraphStore, &Params) -> DriverResult<Rows> + Send + Sync>;

/// Read statement that opens a [`Cursor`] over its own copy of the graph
pub type CursorHandler = Arc<dyn Fn(GraphStore, &Params) -> DriverResult<Cursor> + Send + Sync>;

#[derive(Clone)]
enum Body {
    Rows(Handler),
    Cursor(CursorHandler),
}

#[derive(Clone)]
struct Procedure {
    kind: StatementKind,
    body: Body,
}

impl Procedure {
    fn rows(&self, store: &mut GraphStore, params: &Params) -> DriverResult<Rows> {
        match &self.body {
            Body::Rows(handler) => handler(store, params),
            Body::Cursor(open) => Ok(open(store.clone(), params)?.drain()),
        }
    }
}

/// Lifecycle counters, for asserting how the orchestration layer drove the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterStats {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub transactions_begun: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub auto_commit_runs: u64,
}

#[derive(Default)]
struct DatabaseState {
    leader: GraphStore,
    snapshots: Vec<GraphStore>,
    follower: GraphStore,
    follower_seq: u64,
}

impl DatabaseState {
    fn leader_seq(&self) -> u64 {
        self.snapshots.len() as u64
    }

    fn catch_up(&mut self, seq: u64) {
        if seq > self.follower_seq {
            if let Some(snapshot) = self.snapshots.get(seq as usize - 1) {
                self.follower = snapshot.clone();
                self.follower_seq = seq;
            }
        }
    }

    fn commit(&mut self, store: GraphStore) -> u64 {
        self.leader = store.clone();
        self.snapshots.push(store);
        self.leader_seq()
    }
}

#[derive(Default)]
struct ClusterState {
    databases: HashMap<String, DatabaseState>,
    procedures: HashMap<String, Procedure>,
    stats: ClusterStats,
    fail_session_close: bool,
}

struct ClusterInner {
    name: String,
    state: Mutex<ClusterState>,
    next_id: AtomicU64,
}

/// Handle to an in-memory cluster. Clones share the same data.
#[derive(Clone)]
pub struct MemoryCluster {
    inner: Arc<ClusterInner>,
}

fn normalize_statement(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl MemoryCluster {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ClusterInner {
                name: name.into(),
                state: Mutex::new(ClusterState::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Register a statement. Whitespace differences in the text are ignored on lookup.
    pub fn register<F>(&self, text: &str, kind: StatementKind, handler: F)
    where
        F: Fn(&mut GraphStore, &Params) -> DriverResult<Rows> + Send + Sync + 'static,
    {
        self.inner.state.lock().procedures.insert(
            normalize_statement(text),
            Procedure {
                kind,
                body: Body::Rows(Arc::new(handler)),
            },
        );
    }

    /// Register a read statement whose rows are produced lazily. Streaming it pulls one row
    /// from the cursor per record delivered; other runs drain it.
    pub fn register_cursor<F>(&self, text: &str, open: F)
    where
        F: Fn(GraphStore, &Params) -> DriverResult<Cursor> + Send + Sync + 'static,
    {
        self.inner.state.lock().procedures.insert(
            normalize_statement(text),
            Procedure {
                kind: StatementKind::Read,
                body: Body::Cursor(Arc::new(open)),
            },
        );
    }

    /// Make every session close fail until reset.
    pub fn fail_session_close(&self, fail: bool) {
        self.inner.state.lock().fail_session_close = fail;
    }

    pub fn stats(&self) -> ClusterStats {
        self.inner.state.lock().stats
    }

    pub fn leader_seq(&self, database: Option<&str>) -> u64 {
        let state = self.inner.state.lock();
        state
            .databases
            .get(database.unwrap_or(DEFAULT_DATABASE))
            .map(DatabaseState::leader_seq)
            .unwrap_or(0)
    }

    pub fn follower_seq(&self, database: Option<&str>) -> u64 {
        let state = self.inner.state.lock();
        state
            .databases
            .get(database.unwrap_or(DEFAULT_DATABASE))
            .map(|db| db.follower_seq)
            .unwrap_or(0)
    }

    /// Bring the follower fully up to date with the leader.
    pub fn replicate(&self, database: Option<&str>) {
        let mut state = self.inner.state.lock();
        if let Some(db) = state.databases.get_mut(database.unwrap_or(DEFAULT_DATABASE)) {
            let seq = db.leader_seq();
            db.catch_up(seq);
        }
    }

    /// Inspect the leader's committed graph.
    pub fn with_leader<R>(&self, database: Option<&str>, f: impl FnOnce(&GraphStore) -> R) -> R {
        let mut state = self.inner.state.lock();
        let db = state
            .databases
            .entry(database.unwrap_or(DEFAULT_DATABASE).to_string())
            .or_default();
        f(&db.leader)
    }

    pub fn bookmark(&self, database: &str, seq: u64) -> String {
        format!("{}:{}:{}", self.inner.name, database, seq)
    }

    pub fn driver(&self, address: impl Into<String>) -> MemoryDriver {
        MemoryDriver {
            cluster: self.clone(),
            address: address.into(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn procedure(&self, text: &str) -> DriverResult<Procedure> {
        self.inner
            .state
            .lock()
            .procedures
            .get(&normalize_statement(text))
            .cloned()
            .ok_or_else(|| {
                DriverError::query(
                    "Neo.ClientError.Statement.SyntaxError",
                    format!("Unknown statement: {}", text),
                )
            })
    }

    /// Highest sequence number any bookmark demands for `database`.
    fn required_seq(&self, database: &str, bookmarks: &Bookmarks) -> DriverResult<u64> {
        let prefix = format!("{}:{}", self.inner.name, database);
        let mut required = 0;
        for token in bookmarks.iter() {
            let (scope, seq) = token.rsplit_once(':').ok_or_else(|| invalid_bookmark(token))?;
            let seq: u64 = seq.parse().map_err(|_| invalid_bookmark(token))?;
            if scope == prefix {
                required = required.max(seq);
            }
        }
        Ok(required)
    }

    /// Snapshot the graph a unit of work starts from, honouring causal bookmarks.
    fn begin_unit(
        &self,
        state: &mut ClusterState,
        database: &str,
        mode: AccessMode,
        bookmarks: &Bookmarks,
    ) -> DriverResult<(GraphStore, u64)> {
        let required = self.required_seq(database, bookmarks)?;
        let db = state.databases.entry(database.to_string()).or_default();
        if required > db.leader_seq() {
            return Err(DriverError::query(
                "Neo.ClientError.Transaction.InvalidBookmark",
                format!("Bookmark sequence {} is ahead of the leader", required),
            ));
        }
        let (mut store, seq) = match mode {
            AccessMode::Read => {
                db.catch_up(required);
                (db.follower.clone(), db.follower_seq)
            }
            AccessMode::Write => (db.leader.clone(), db.leader_seq()),
        };
        store.take_counters();
        Ok((store, seq))
    }
}

fn invalid_bookmark(token: &str) -> DriverError {
    DriverError::query(
        "Neo.ClientError.Transaction.InvalidBookmark",
        format!("Malformed bookmark '{}'", token),
    )
}

fn query_type(kind: StatementKind, wrote: bool) -> QueryType {
    match (kind, wrote) {
        (StatementKind::Read, _) => QueryType::Read,
        (_, true) => QueryType::Write,
        (_, false) => QueryType::ReadWrite,
    }
}

fn build_result(text: &str, database: &str, kind: StatementKind, rows: Rows, store: &mut GraphStore) -> QueryResult {
    let counters = store.take_counters();
    let mut summary = RawSummary::new(text, query_type(kind, counters.contains_updates()));
    summary.counters = counters;
    summary.database = Some(database.to_string());
    let records = rows
        .rows
        .into_iter()
        .map(|values| Record::new(rows.keys.clone(), values))
        .collect();
    QueryResult {
        keys: rows.keys,
        records,
        summary,
    }
}

/// Resolves `memory://<cluster>` endpoints to in-memory clusters.
#[derive(Default)]
pub struct MemoryConnector {
    clusters: Mutex<HashMap<String, MemoryCluster>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster(cluster: MemoryCluster) -> Self {
        let connector = Self::new();
        connector.add_cluster(cluster);
        connector
    }

    pub fn add_cluster(&self, cluster: MemoryCluster) {
        self.clusters
            .lock()
            .insert(cluster.name().to_string(), cluster);
    }

    /// Cluster registered under `name`, created empty on first use.
    pub fn cluster(&self, name: &str) -> MemoryCluster {
        self.clusters
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| MemoryCluster::new(name))
            .clone()
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, url: &str, _config: &DriverConfig) -> DriverResult<Arc<dyn GraphDriver>> {
        let rest = url.strip_prefix("memory://").ok_or_else(|| {
            DriverError::Connection(format!(
                "Unsupported endpoint '{}': expected memory://<cluster>",
                url
            ))
        })?;
        let name = rest.split(['/', '?']).next().unwrap_or_default();
        if name.is_empty() {
            return Err(DriverError::Connection(format!(
                "Endpoint '{}' does not name a cluster",
                url
            )));
        }
        Ok(Arc::new(self.cluster(name).driver(url)))
    }
}

/// Driver over a [`MemoryCluster`]
pub struct MemoryDriver {
    cluster: MemoryCluster,
    address: String,
    closed: Arc<AtomicBool>,
}

impl MemoryDriver {
    pub fn cluster(&self) -> &MemoryCluster {
        &self.cluster
    }
}

#[async_trait]
impl GraphDriver for MemoryDriver {
    async fn session(&self, config: SessionConfig) -> DriverResult<Box<dyn GraphSession>> {
        if self.is_closed() {
            return Err(DriverError::Connection(format!(
                "Driver for {} is closed",
                self.address
            )));
        }
        self.cluster.inner.state.lock().stats.sessions_opened += 1;
        let session = MemorySession {
            id: self.cluster.next_id(),
            cluster: self.cluster.clone(),
            driver_closed: self.closed.clone(),
            database: config
                .database
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            mode: config.default_access_mode,
            shared: Arc::new(Mutex::new(SessionShared {
                bookmarks: config.bookmarks,
                tx_open: false,
                closed: false,
            })),
        };
        debug!(session = session.id, database = %session.database, "Memory session opened");
        Ok(Box::new(session))
    }

    async fn verify_connectivity(&self) -> DriverResult<()> {
        if self.is_closed() {
            return Err(DriverError::Connection(format!(
                "Driver for {} is closed",
                self.address
            )));
        }
        Ok(())
    }

    async fn close(&self) -> DriverResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn address(&self) -> &str {
        &self.address
    }
}

struct SessionShared {
    bookmarks: Bookmarks,
    tx_open: bool,
    closed: bool,
}

/// Session over a [`MemoryCluster`]
pub struct MemorySession {
    id: u64,
    cluster: MemoryCluster,
    driver_closed: Arc<AtomicBool>,
    database: String,
    mode: Option<AccessMode>,
    shared: Arc<Mutex<SessionShared>>,
}

impl MemorySession {
    fn check_usable(&self) -> DriverResult<Bookmarks> {
        if self.driver_closed.load(Ordering::SeqCst) {
            return Err(DriverError::Connection("Driver is closed".to_string()));
        }
        let shared = self.shared.lock();
        if shared.closed {
            return Err(DriverError::SessionClosed);
        }
        Ok(shared.bookmarks.clone())
    }

    fn check_auto_commit(&self) -> DriverResult<Bookmarks> {
        let bookmarks = self.check_usable()?;
        if self.shared.lock().tx_open {
            return Err(DriverError::TransactionConflict(format!(
                "Session {} has an open transaction; run the statement inside it or use another session",
                self.id
            )));
        }
        Ok(bookmarks)
    }

    /// Open an auto-commit read over a snapshot. The cluster lock is released before the
    /// first row is produced; the bookmark is recorded once the cursor is exhausted.
    fn open_cursor(&self, text: &str, params: &Params, open: &CursorHandler) -> DriverResult<RecordStream> {
        let bookmarks = self.check_auto_commit()?;
        let mode = self.mode.unwrap_or(AccessMode::Write);
        let (store, seq) = {
            let mut state = self.cluster.inner.state.lock();
            state.stats.auto_commit_runs += 1;
            self.cluster
                .begin_unit(&mut state, &self.database, mode, &bookmarks)?
        };
        let cursor = open(store, params)?;
        let mut summary = RawSummary::new(text, QueryType::Read);
        summary.database = Some(self.database.clone());
        let keys = cursor.keys.clone();
        let rows = cursor
            .rows
            .map(move |row| row.map(|values| Record::new(keys.clone(), values)));
        Ok(Feed {
            keys: Some(cursor.keys),
            rows: Box::new(rows),
            summary: Some(summary),
            bookmark: (seq > 0).then(|| self.cluster.bookmark(&self.database, seq)),
            shared: self.shared.clone(),
            done: false,
        }
        .into_stream())
    }

    fn record_bookmark(&self, seq: u64) {
        if seq > 0 {
            let token = self.cluster.bookmark(&self.database, seq);
            self.shared.lock().bookmarks = std::iter::once(token).collect();
        }
    }

    /// Execute an auto-commit unit of work. Nothing is committed when the statement fails,
    /// including a failure after its last row.
    fn auto_commit(&self, text: &str, params: &Params) -> DriverResult<(QueryResult, Option<DriverError>)> {
        let bookmarks = self.check_auto_commit()?;
        let procedure = self.cluster.procedure(text)?;
        let mode = self.mode.unwrap_or(AccessMode::Write);
        if mode == AccessMode::Read && procedure.kind != StatementKind::Read {
            return Err(DriverError::AccessMode(format!(
                "Writing in read access mode not allowed: {}",
                text
            )));
        }

        let (result, trailing_error, seq) = {
            let mut state = self.cluster.inner.state.lock();
            state.stats.auto_commit_runs += 1;
            let (mut store, base_seq) =
                self.cluster
                    .begin_unit(&mut state, &self.database, mode, &bookmarks)?;
            let mut rows = procedure.rows(&mut store, params)?;
            let trailing_error = rows.trailing_error.take();
            let wrote = store.counters().contains_updates();
            let result = build_result(text, &self.database, procedure.kind, rows, &mut store);
            let seq = if wrote && trailing_error.is_none() {
                state
                    .databases
                    .entry(self.database.clone())
                    .or_default()
                    .commit(store)
            } else {
                base_seq
            };
            (result, trailing_error, seq)
        };
        if trailing_error.is_none() {
            self.record_bookmark(seq);
        }
        Ok((result, trailing_error))
    }
}

#[async_trait]
impl GraphSession for MemorySession {
    fn id(&self) -> u64 {
        self.id
    }

    async fn run(
        &mut self,
        text: &str,
        params: &Params,
        _config: &TransactionConfig,
    ) -> DriverResult<QueryResult> {
        match self.auto_commit(text, params)? {
            (_, Some(err)) => Err(err),
            (result, None) => Ok(result),
        }
    }

    async fn run_stream(
        &mut self,
        text: &str,
        params: &Params,
        _config: &TransactionConfig,
    ) -> DriverResult<RecordStream> {
        if let Body::Cursor(open) = &self.cluster.procedure(text)?.body {
            return self.open_cursor(text, params, open);
        }
        let (result, trailing_error) = self.auto_commit(text, params)?;
        let rows = result
            .records
            .into_iter()
            .map(Ok)
            .chain(trailing_error.map(Err));
        Ok(Feed {
            keys: Some(result.keys),
            rows: Box::new(rows),
            summary: Some(result.summary),
            bookmark: None,
            shared: self.shared.clone(),
            done: false,
        }
        .into_stream())
    }

    async fn begin_transaction(
        &mut self,
        mode: AccessMode,
        _config: &TransactionConfig,
    ) -> DriverResult<Box<dyn GraphTransaction>> {
        let bookmarks = self.check_usable()?;
        {
            let mut shared = self.shared.lock();
            if shared.tx_open {
                return Err(DriverError::TransactionConflict(format!(
                    "A transaction is already open on session {}",
                    self.id
                )));
            }
            shared.tx_open = true;
        }

        let begun = {
            let mut state = self.cluster.inner.state.lock();
            let begun = self
                .cluster
                .begin_unit(&mut state, &self.database, mode, &bookmarks);
            if begun.is_ok() {
                state.stats.transactions_begun += 1;
            }
            begun
        };
        let (working, base_seq) = match begun {
            Ok(unit) => unit,
            Err(err) => {
                self.shared.lock().tx_open = false;
                return Err(err);
            }
        };

        let id = self.cluster.next_id();
        debug!(session = self.id, transaction = id, mode = mode.as_str(), "Memory transaction begun");
        Ok(Box::new(MemoryTransaction {
            id,
            cluster: self.cluster.clone(),
            database: self.database.clone(),
            mode,
            working,
            base_seq,
            wrote: false,
            failed: false,
            done: false,
            session_id: self.id,
            shared: self.shared.clone(),
        }))
    }

    fn last_bookmarks(&self) -> Bookmarks {
        self.shared.lock().bookmarks.clone()
    }

    async fn close(&mut self) -> DriverResult<()> {
        if self.cluster.inner.state.lock().fail_session_close {
            return Err(DriverError::Connection(format!(
                "Session {} could not be closed",
                self.id
            )));
        }
        let mut shared = self.shared.lock();
        if !shared.closed {
            shared.closed = true;
            self.cluster.inner.state.lock().stats.sessions_closed += 1;
        }
        Ok(())
    }
}

/// Source of a streamed result: keys, then one record per poll, then the summary.
struct Feed {
    keys: Option<Vec<String>>,
    rows: Box<dyn Iterator<Item = DriverResult<Record>> + Send>,
    summary: Option<RawSummary>,
    /// Recorded on the session when the rows run out without an error
    bookmark: Option<String>,
    shared: Arc<Mutex<SessionShared>>,
    done: bool,
}

impl Feed {
    fn into_stream(self) -> RecordStream {
        Box::pin(futures::stream::unfold(self, |mut feed| async move {
            if feed.done {
                return None;
            }
            if let Some(keys) = feed.keys.take() {
                return Some((Ok(StreamEvent::Keys(keys)), feed));
            }
            let event = match feed.rows.next() {
                Some(Ok(record)) => Ok(StreamEvent::Record(record)),
                Some(Err(err)) => {
                    feed.done = true;
                    Err(err)
                }
                None => {
                    feed.done = true;
                    if let Some(token) = feed.bookmark.take() {
                        feed.shared.lock().bookmarks = std::iter::once(token).collect();
                    }
                    match feed.summary.take() {
                        Some(summary) => Ok(StreamEvent::Summary(summary)),
                        None => return None,
                    }
                }
            };
            Some((event, feed))
        }))
    }
}

/// Explicit transaction over a working copy of the graph
pub struct MemoryTransaction {
    id: u64,
    cluster: MemoryCluster,
    database: String,
    mode: AccessMode,
    working: GraphStore,
    base_seq: u64,
    wrote: bool,
    failed: bool,
    done: bool,
    session_id: u64,
    shared: Arc<Mutex<SessionShared>>,
}

impl MemoryTransaction {
    fn finish(&mut self, seq: Option<u64>) {
        self.done = true;
        let mut shared = self.shared.lock();
        shared.tx_open = false;
        if let Some(seq) = seq.filter(|s| *s > 0) {
            shared.bookmarks = std::iter::once(self.cluster.bookmark(&self.database, seq)).collect();
        }
    }

    fn check_active(&self) -> DriverResult<()> {
        if self.done {
            return Err(DriverError::Protocol(format!(
                "Transaction {} is already closed",
                self.id
            )));
        }
        if self.failed {
            return Err(DriverError::Protocol(format!(
                "Transaction {} has failed and must be rolled back",
                self.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphTransaction for MemoryTransaction {
    fn id(&self) -> u64 {
        self.id
    }

    fn access_mode(&self) -> AccessMode {
        self.mode
    }

    async fn run(&mut self, text: &str, params: &Params) -> DriverResult<QueryResult> {
        self.check_active()?;
        let procedure = self.cluster.procedure(text)?;
        match (procedure.kind, self.mode) {
            (StatementKind::SelfTransactional, _) => {
                return Err(DriverError::TransactionConflict(format!(
                    "Statement manages its own transactions and cannot run inside transaction {} on session {}",
                    self.id, self.session_id
                )));
            }
            (StatementKind::Write, AccessMode::Read) => {
                return Err(DriverError::AccessMode(format!(
                    "Writing in read access mode not allowed: {}",
                    text
                )));
            }
            _ => {}
        }

        let mut rows = match procedure.rows(&mut self.working, params) {
            Ok(rows) => rows,
            Err(err) => {
                self.failed = true;
                return Err(err);
            }
        };
        if let Some(err) = rows.trailing_error.take() {
            self.failed = true;
            return Err(err);
        }
        if self.working.counters().contains_updates() {
            self.wrote = true;
        }
        Ok(build_result(
            text,
            &self.database,
            procedure.kind,
            rows,
            &mut self.working,
        ))
    }

    async fn commit(&mut self) -> DriverResult<()> {
        if let Err(err) = self.check_active() {
            if !self.done {
                self.rollback().await?;
            }
            return Err(err);
        }
        let committed = {
            let mut state = self.cluster.inner.state.lock();
            let db = state.databases.entry(self.database.clone()).or_default();
            let committed = if !self.wrote {
                Ok(self.base_seq)
            } else if db.leader_seq() != self.base_seq {
                Err(DriverError::query(
                    "Neo.TransientError.Transaction.Outdated",
                    format!(
                        "Transaction {} started at {} but the leader moved to {}",
                        self.id,
                        self.base_seq,
                        db.leader_seq()
                    ),
                ))
            } else {
                Ok(db.commit(std::mem::take(&mut self.working)))
            };
            match committed {
                Ok(_) => state.stats.commits += 1,
                Err(_) => state.stats.rollbacks += 1,
            }
            committed
        };
        match committed {
            Ok(seq) => {
                self.finish(Some(seq));
                Ok(())
            }
            Err(err) => {
                self.finish(None);
                Err(err)
            }
        }
    }

    async fn rollback(&mut self) -> DriverResult<()> {
        if self.done {
            return Ok(());
        }
        self.cluster.inner.state.lock().stats.rollbacks += 1;
        self.finish(None);
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.done {
            self.cluster.inner.state.lock().stats.rollbacks += 1;
            self.finish(None);
        }
    }
}
