//! Context Domain
//!
//! A [`Context`] bundles the configuration, driver handle, session, transaction and causal
//! bookmarks under which queries execute. Contexts are built by a [`ContextFactory`]; queries
//! run through the executor ([`Context::execute`]) or the stream executor ([`Context::stream`]).
//!
//! A context owns at most one live session and at most one live transaction. The driver may
//! be shared with derived contexts, but only the context that created it closes it.

use crate::config::ContextConfig;
use crate::driver::{Bookmarks, GraphDriver, GraphTransaction, SessionConfig, TransactionConfig};
use crate::error::{ContextError, Result};
use crate::logging::{Hooks, LogLevel, LogRecord};
use crate::normalize::{Row, Summary};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

pub mod access;
pub mod bookmarks;
pub mod executor;
pub mod factory;
pub mod query;
pub mod state;
pub mod stream;

pub use access::resolve_access_mode;
pub use factory::ContextFactory;
pub use query::{ComposedQuery, Query, Statement};
pub use state::ContextState;
pub use stream::{CollectingObserver, StreamCall, StreamObserver};

use state::Lifecycle;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Execution context
pub struct Context {
    id: u64,
    config: ContextConfig,
    session_config: SessionConfig,
    transaction_config: TransactionConfig,
    driver: Arc<dyn GraphDriver>,
    owns_driver: bool,
    lifecycle: Lifecycle,
    /// Transaction left behind by a managed unit whose future was dropped mid-body
    abandoned: Option<Box<dyn GraphTransaction>>,
    last_bookmarks: Bookmarks,
    last_summary: Option<Summary>,
    hooks: Hooks,
}

impl Context {
    /// Assemble a context. The session configuration is derived from `config` and the
    /// initial bookmark set; the access mode is always resolved here.
    pub(crate) fn assemble(
        config: ContextConfig,
        driver: Arc<dyn GraphDriver>,
        owns_driver: bool,
        bookmarks: Bookmarks,
        hooks: Hooks,
    ) -> Self {
        let session_config = SessionConfig {
            database: config.database.clone(),
            bookmarks,
            default_access_mode: resolve_access_mode(config.write, config.readonly),
            fetch_size: Some(config.driver.fetch_size),
        };
        let context = Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            transaction_config: config.transaction.clone(),
            config,
            session_config,
            driver,
            owns_driver,
            lifecycle: Lifecycle::Idle,
            abandoned: None,
            last_bookmarks: Bookmarks::new(),
            last_summary: None,
            hooks,
        };
        debug!(
            context = context.id,
            owns_driver = context.owns_driver,
            mode = context.session_config.default_access_mode.map(|m| m.as_str()).unwrap_or("default"),
            bookmarks = %context.session_config.bookmarks,
            "Context created"
        );
        context
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ContextState {
        self.lifecycle.state()
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }

    pub fn transaction_config(&self) -> &TransactionConfig {
        &self.transaction_config
    }

    /// Bookmarks captured after the most recent unit of work
    pub fn last_bookmarks(&self) -> &Bookmarks {
        &self.last_bookmarks
    }

    pub fn last_summary(&self) -> Option<&Summary> {
        self.last_summary.as_ref()
    }

    /// Id of the active managed transaction, if any
    pub fn transaction_id(&self) -> Option<u64> {
        self.lifecycle.transaction_id()
    }

    pub fn session_id(&self) -> Option<u64> {
        self.lifecycle.session_id()
    }

    /// Whether closing this context also closes the driver
    pub fn owns_driver(&self) -> bool {
        self.owns_driver
    }

    pub fn driver(&self) -> &Arc<dyn GraphDriver> {
        &self.driver
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub async fn verify_connectivity(&self) -> Result<()> {
        self.driver.verify_connectivity().await?;
        Ok(())
    }

    /// Close the session, if one is open. The next query opens a fresh one carrying the
    /// staged bookmarks. Refused while a managed transaction is active.
    pub async fn close_session(&mut self) -> Result<()> {
        match self.lifecycle.take() {
            Lifecycle::Idle => Ok(()),
            Lifecycle::SessionOpen(mut session) => {
                self.reclaim_abandoned().await;
                let id = session.id();
                session.close().await?;
                debug!(context = self.id, session = id, "Session closed");
                Ok(())
            }
            active @ Lifecycle::InTransaction { .. } => {
                self.lifecycle = active;
                Err(ContextError::InvalidState(format!(
                    "Context {} cannot close its session while a transaction is active",
                    self.id
                )))
            }
        }
    }

    /// Tear the context down: roll back a dangling transaction, close the session and, only
    /// when this context created it, the driver. Every step is attempted; the first failure
    /// is returned.
    pub async fn close(&mut self) -> Result<()> {
        self.reclaim_abandoned().await;
        let mut session = match self.lifecycle.take() {
            Lifecycle::Idle => None,
            Lifecycle::SessionOpen(session) => Some(session),
            Lifecycle::InTransaction {
                session,
                mut transaction,
            } => {
                warn!(
                    context = self.id,
                    transaction = transaction.id(),
                    "Closing context with an active transaction; rolling back"
                );
                if let Err(e) = transaction.rollback().await {
                    warn!(context = self.id, error = %e, "Rollback during close failed");
                }
                Some(session)
            }
        };
        let mut outcome = Ok(());
        if let Some(session) = session.as_mut() {
            if let Err(e) = session.close().await {
                warn!(context = self.id, session = session.id(), error = %e, "Session close failed");
                outcome = Err(e.into());
            }
        }
        if self.owns_driver && !self.driver.is_closed() {
            match self.driver.close().await {
                Ok(()) => debug!(context = self.id, address = self.driver.address(), "Driver closed"),
                Err(e) => {
                    warn!(context = self.id, address = self.driver.address(), error = %e, "Driver close failed");
                    outcome = outcome.and(Err(e.into()));
                }
            }
        }
        outcome
    }

    /// Publish rows through the output hook.
    pub fn emit(&self, rows: &[Row]) -> Result<()> {
        let value = serde_json::to_value(rows).map_err(|e| {
            ContextError::InvalidState(format!("Rows could not be serialized: {}", e))
        })?;
        self.hooks.output.emit(&value);
        Ok(())
    }

    pub(crate) fn log(&self, level: LogLevel, event: &str, data: serde_json::Value) {
        self.hooks
            .log
            .log(&LogRecord::with_now(level, self.id, event, data));
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("lifecycle", &self.lifecycle)
            .field("owns_driver", &self.owns_driver)
            .field("session_config", &self.session_config)
            .field("last_bookmarks", &self.last_bookmarks)
            .finish_non_exhaustive()
    }
}
