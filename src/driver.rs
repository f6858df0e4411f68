//! Database Driver Boundary
//!
//! The underlying database client library is an external collaborator. This module defines
//! the contract it must satisfy: a connector that builds drivers from an endpoint, drivers that
//! hand out sessions, sessions that run auto-commit statements, stream results and begin
//! explicit transactions, and transactions that commit or roll back. Connection pooling,
//! routing, retries and authentication all live behind these traits.

use crate::error::DriverResult;
use crate::value::Params;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

pub mod memory;
pub mod types;

pub use types::{
    AccessMode, Bookmarks, Counters, DriverConfig, QueryResult, QueryType, RawSummary, Record,
    SessionConfig, StreamEvent, TransactionConfig,
};

/// Streamed result: keys first, then records in arrival order, then one summary.
pub type RecordStream = Pin<Box<dyn Stream<Item = DriverResult<StreamEvent>> + Send>>;

/// Builds drivers from a connection endpoint.
///
/// Connecting is lazy: implementations must not perform network I/O here, so an unreachable
/// endpoint only surfaces on the first query.
pub trait Connector: Send + Sync {
    fn connect(&self, url: &str, config: &DriverConfig) -> DriverResult<Arc<dyn GraphDriver>>;
}

/// A connection to a database cluster, shared between contexts.
#[async_trait]
pub trait GraphDriver: Send + Sync {
    /// Open a new session
    async fn session(&self, config: SessionConfig) -> DriverResult<Box<dyn GraphSession>>;

    async fn verify_connectivity(&self) -> DriverResult<()>;

    /// Close the driver. Every session opened from it becomes unusable.
    async fn close(&self) -> DriverResult<()>;

    fn is_closed(&self) -> bool;

    /// Endpoint this driver was created for
    fn address(&self) -> &str;
}

/// A logical session: a causal chain of units of work.
#[async_trait]
pub trait GraphSession: Send + Sync {
    fn id(&self) -> u64;

    /// Run a statement in its own implicit transaction
    async fn run(
        &mut self,
        text: &str,
        params: &Params,
        config: &TransactionConfig,
    ) -> DriverResult<QueryResult>;

    /// Run a statement in its own implicit transaction, streaming the result
    async fn run_stream(
        &mut self,
        text: &str,
        params: &Params,
        config: &TransactionConfig,
    ) -> DriverResult<RecordStream>;

    /// Begin an explicit transaction.
    ///
    /// Fails with [`DriverError::TransactionConflict`](crate::error::DriverError) while another
    /// transaction is open on this session.
    async fn begin_transaction(
        &mut self,
        mode: AccessMode,
        config: &TransactionConfig,
    ) -> DriverResult<Box<dyn GraphTransaction>>;

    /// Causal tokens for the most recent unit of work completed on this session
    fn last_bookmarks(&self) -> Bookmarks;

    async fn close(&mut self) -> DriverResult<()>;
}

/// An explicit transaction on a session
#[async_trait]
pub trait GraphTransaction: Send + Sync {
    fn id(&self) -> u64;

    fn access_mode(&self) -> AccessMode;

    async fn run(&mut self, text: &str, params: &Params) -> DriverResult<QueryResult>;

    async fn commit(&mut self) -> DriverResult<()>;

    async fn rollback(&mut self) -> DriverResult<()>;
}
