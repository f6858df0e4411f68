//! Query Executor
//!
//! The reentrant session/transaction state machine:
//!
//! - a literal statement with no active transaction runs as a single auto-commit unit of work
//!   on the session, bypassing the managed-transaction wrapper;
//! - a composed query with no active transaction runs inside a managed transaction that the
//!   executor begins, stores on the context, commits or rolls back, and always clears;
//! - anything executed while a transaction is active on the context runs against that
//!   transaction. A second transaction is never begun on the same context.
//!
//! Bookmarks are captured after every unit of work, whether it succeeded or failed.
//!
//! A managed unit whose future is dropped before its body finishes leaves no transaction on
//! the context: a drop guard parks the handle, and the next call into the context rolls
//! it back before doing anything else.

use crate::context::query::{ComposedQuery, Query, Statement};
use crate::context::state::Lifecycle;
use crate::context::{Context, ContextState};
use crate::driver::{AccessMode, QueryResult};
use crate::error::{ContextError, Result};
use crate::logging::LogLevel;
use crate::normalize::{normalize_summary, QueryOutput, Row};
use crate::value::Params;
use serde_json::json;
use tracing::{debug, warn};

impl Context {
    /// Execute a query and return its raw output.
    pub async fn execute(&mut self, query: impl Into<Query>, params: Params) -> Result<QueryOutput> {
        let query = query.into();
        let label = query.label();
        self.log(
            LogLevel::Debug,
            "query_started",
            json!({
                "statement": label,
                "params": params,
                "state": self.state().as_str(),
            }),
        );

        let outcome = self.dispatch(query, params).await;
        match &outcome {
            Ok(output) => {
                let rows = match output {
                    QueryOutput::Raw(result) => result.records.len(),
                    QueryOutput::Rows(rows) => rows.len(),
                };
                self.log(
                    LogLevel::Info,
                    "query_completed",
                    json!({
                        "statement": label,
                        "rows": rows,
                        "summary": output.raw_summary().map(normalize_summary),
                    }),
                );
            }
            Err(err) => self.log(
                LogLevel::Error,
                "query_failed",
                json!({ "statement": label, "error": err.to_string() }),
            ),
        }
        outcome
    }

    /// Execute a query and return normalized rows.
    pub async fn query(&mut self, query: impl Into<Query>, params: Params) -> Result<Vec<Row>> {
        Ok(self.execute(query, params).await?.into_rows(None))
    }

    /// Run literal statement text and return normalized rows.
    pub async fn run(&mut self, statement: &str, params: Params) -> Result<Vec<Row>> {
        self.query(Statement::new(statement), params).await
    }

    async fn dispatch(&mut self, query: Query, params: Params) -> Result<QueryOutput> {
        self.reclaim_abandoned().await;
        self.ensure_session().await?;
        match query {
            Query::Statement(statement) => {
                let params = statement.bind(params);
                let result = match &mut self.lifecycle {
                    Lifecycle::SessionOpen(session) => {
                        let run = session
                            .run(&statement.text, &params, &self.transaction_config)
                            .await;
                        self.capture_bookmarks();
                        run?
                    }
                    Lifecycle::InTransaction { transaction, .. } => {
                        transaction.run(&statement.text, &params).await?
                    }
                    Lifecycle::Idle => return Err(self.no_session()),
                };
                Ok(self.record_result(result))
            }
            Query::Composed(composed) => match self.state() {
                ContextState::SessionOpen => {
                    self.run_managed(composed, params).await
                }
                ContextState::InTransaction => {
                    composed.call(self, params).await
                }
                ContextState::Idle => Err(self.no_session()),
            },
        }
    }

    pub(crate) async fn ensure_session(&mut self) -> Result<()> {
        if let Lifecycle::Idle = self.lifecycle {
            let session = self.driver.session(self.session_config.clone()).await?;
            debug!(
                context = self.id,
                session = session.id(),
                bookmarks = %self.session_config.bookmarks,
                "Session opened"
            );
            self.lifecycle = Lifecycle::SessionOpen(session);
        }
        Ok(())
    }

    /// Begin a managed transaction, run `composed` inside it, then commit on success or roll
    /// back on failure. The transaction handle is cleared and bookmarks are captured on every
    /// path.
    async fn run_managed(&mut self, composed: ComposedQuery, params: Params) -> Result<QueryOutput> {
        let mode = self
            .session_config
            .default_access_mode
            .unwrap_or(AccessMode::Write);
        let mut session = match self.lifecycle.take() {
            Lifecycle::SessionOpen(session) => session,
            other => {
                self.lifecycle = other;
                return Err(ContextError::InvalidState(format!(
                    "Context {} cannot begin a managed transaction in state {}",
                    self.id,
                    self.state().as_str()
                )));
            }
        };

        let transaction = match session
            .begin_transaction(mode, &self.transaction_config)
            .await
        {
            Ok(transaction) => transaction,
            Err(err) => {
                self.lifecycle = Lifecycle::SessionOpen(session);
                self.capture_bookmarks();
                return Err(err.into());
            }
        };
        debug!(
            context = self.id,
            session = session.id(),
            transaction = transaction.id(),
            mode = mode.as_str(),
            "Managed transaction begun"
        );
        self.lifecycle = Lifecycle::InTransaction {
            session,
            transaction,
        };

        let mut guard = ManagedGuard {
            context: self,
            armed: true,
        };
        let body = composed.call(guard.context, params).await;
        guard.armed = false;
        guard.context.finish_managed(body).await
    }

    /// Roll back a transaction parked by a dropped managed unit.
    pub(crate) async fn reclaim_abandoned(&mut self) {
        if let Some(mut transaction) = self.abandoned.take() {
            let id = transaction.id();
            match transaction.rollback().await {
                Ok(()) => debug!(context = self.id, transaction = id, "Abandoned transaction rolled back"),
                Err(err) => warn!(context = self.id, transaction = id, error = %err, "Rollback of abandoned transaction failed"),
            }
            self.capture_bookmarks();
        }
    }

    async fn finish_managed(&mut self, body: Result<QueryOutput>) -> Result<QueryOutput> {
        let outcome = match self.lifecycle.take() {
            Lifecycle::InTransaction {
                session,
                mut transaction,
            } => {
                let id = transaction.id();
                let outcome = match body {
                    Ok(output) => match transaction.commit().await {
                        Ok(()) => {
                            debug!(context = self.id, transaction = id, "Managed transaction committed");
                            Ok(output)
                        }
                        Err(err) => Err(err.into()),
                    },
                    Err(err) => {
                        if let Err(rollback) = transaction.rollback().await {
                            warn!(context = self.id, transaction = id, error = %rollback, "Rollback failed");
                        }
                        debug!(context = self.id, transaction = id, error = %err, "Managed transaction rolled back");
                        Err(err)
                    }
                };
                drop(transaction);
                self.lifecycle = Lifecycle::SessionOpen(session);
                outcome
            }
            other => {
                // The body tore the context down from inside its own transaction.
                self.lifecycle = other;
                body.and_then(|_| {
                    Err(ContextError::InvalidState(format!(
                        "Context {} lost its transaction before it could commit",
                        self.id
                    )))
                })
            }
        };
        self.capture_bookmarks();
        outcome
    }

    fn record_result(&mut self, result: QueryResult) -> QueryOutput {
        self.last_summary = Some(normalize_summary(&result.summary));
        QueryOutput::Raw(result)
    }

    fn no_session(&self) -> ContextError {
        ContextError::InvalidState(format!("Context {} has no open session", self.id))
    }
}

/// Clears the context's transaction if the managed body never returns.
struct ManagedGuard<'a> {
    context: &'a mut Context,
    armed: bool,
}

impl Drop for ManagedGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.context.lifecycle.take() {
            Lifecycle::InTransaction {
                session,
                transaction,
            } => {
                warn!(
                    context = self.context.id,
                    transaction = transaction.id(),
                    "Managed transaction dropped before completion"
                );
                self.context.abandoned = Some(transaction);
                self.context.lifecycle = Lifecycle::SessionOpen(session);
            }
            other => self.context.lifecycle = other,
        }
    }
}
