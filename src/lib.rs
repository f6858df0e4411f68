//! Cairn: Causal Context Orchestration for Clustered Graph Databases
//!
//! A client-side layer that decides when to open sessions, when to begin a managed
//! transaction versus reuse the active one, and how causal bookmarks flow between derived
//! contexts, so independent callers can compose reads and writes across sessions and still
//! observe each other's writes.

pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod value;

pub use config::{ConfigLoader, ContextConfig, ContextOverrides};
pub use context::{
    resolve_access_mode, CollectingObserver, ComposedQuery, Context, ContextFactory,
    ContextState, Query, Statement, StreamObserver,
};
pub use driver::{AccessMode, Bookmarks};
pub use error::{ContextError, DriverError, Result};
pub use logging::{init_logging, Hooks};
pub use normalize::{QueryOutput, Row, Summary};
pub use value::{Params, Value};
