//! Per-context session/transaction state.

use crate::driver::{GraphSession, GraphTransaction};

/// Observable lifecycle state of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// No session
    Idle,
    /// Session open, no transaction
    SessionOpen,
    /// A managed transaction is active
    InTransaction,
}

impl ContextState {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextState::Idle => "idle",
            ContextState::SessionOpen => "session_open",
            ContextState::InTransaction => "in_transaction",
        }
    }
}

/// The handles a context owns in each state. A transaction without its session is not
/// representable.
pub(crate) enum Lifecycle {
    Idle,
    SessionOpen(Box<dyn GraphSession>),
    InTransaction {
        session: Box<dyn GraphSession>,
        transaction: Box<dyn GraphTransaction>,
    },
}

impl Lifecycle {
    pub(crate) fn state(&self) -> ContextState {
        match self {
            Lifecycle::Idle => ContextState::Idle,
            Lifecycle::SessionOpen(_) => ContextState::SessionOpen,
            Lifecycle::InTransaction { .. } => ContextState::InTransaction,
        }
    }

    pub(crate) fn session(&self) -> Option<&dyn GraphSession> {
        match self {
            Lifecycle::Idle => None,
            Lifecycle::SessionOpen(session) | Lifecycle::InTransaction { session, .. } => {
                Some(session.as_ref())
            }
        }
    }

    pub(crate) fn session_id(&self) -> Option<u64> {
        self.session().map(|s| s.id())
    }

    pub(crate) fn transaction_id(&self) -> Option<u64> {
        match self {
            Lifecycle::InTransaction { transaction, .. } => Some(transaction.id()),
            _ => None,
        }
    }

    /// Move the handles out, leaving `Idle` behind.
    pub(crate) fn take(&mut self) -> Lifecycle {
        std::mem::replace(self, Lifecycle::Idle)
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("state", &self.state())
            .field("session", &self.session_id())
            .field("transaction", &self.transaction_id())
            .finish()
    }
}
