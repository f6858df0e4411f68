//! Query descriptors.
//!
//! A query is either a literal [`Statement`] or a [`ComposedQuery`]: a callable that receives
//! the context and parameters and may call back into the executor on that same context. The
//! executor resolves which one it was handed once, at entry.

use crate::context::Context;
use crate::error::Result;
use crate::normalize::QueryOutput;
use crate::value::{Params, Value};
use futures::future::BoxFuture;
use std::sync::Arc;

/// Literal statement text with embedded parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Params,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Params::new(),
        }
    }

    pub fn with_params(text: impl Into<String>, params: Params) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Embedded parameters overlaid with call-site parameters; call-site keys win.
    pub fn bind(&self, call_site: Params) -> Params {
        let mut bound = self.params.clone();
        bound.extend(call_site);
        bound
    }
}

impl From<&str> for Statement {
    fn from(text: &str) -> Self {
        Statement::new(text)
    }
}

impl From<String> for Statement {
    fn from(text: String) -> Self {
        Statement::new(text)
    }
}

type ComposedFn =
    dyn for<'a> Fn(&'a mut Context, Params) -> BoxFuture<'a, Result<QueryOutput>> + Send + Sync;

/// A composable query function.
///
/// ```ignore
/// let upsert = ComposedQuery::new(|ctx, params| {
///     Box::pin(async move {
///         ctx.execute(PUT, params.clone()).await?;
///         ctx.execute(GET, params).await
///     })
/// });
/// ```
#[derive(Clone)]
pub struct ComposedQuery {
    name: Option<String>,
    body: Arc<ComposedFn>,
}

impl ComposedQuery {
    pub fn new<F>(body: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context, Params) -> BoxFuture<'a, Result<QueryOutput>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: None,
            body: Arc::new(body),
        }
    }

    /// Name used in log records
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn call<'a>(
        &self,
        ctx: &'a mut Context,
        params: Params,
    ) -> BoxFuture<'a, Result<QueryOutput>> {
        (self.body)(ctx, params)
    }
}

impl std::fmt::Debug for ComposedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposedQuery")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Query descriptor accepted by [`Context::execute`]
#[derive(Debug, Clone)]
pub enum Query {
    Statement(Statement),
    Composed(ComposedQuery),
}

impl Query {
    pub fn is_composed(&self) -> bool {
        matches!(self, Query::Composed(_))
    }

    /// Statement text, or the composed query's name
    pub fn label(&self) -> String {
        match self {
            Query::Statement(statement) => statement.text.clone(),
            Query::Composed(composed) => composed.name().unwrap_or("<composed>").to_string(),
        }
    }
}

impl From<Statement> for Query {
    fn from(statement: Statement) -> Self {
        Query::Statement(statement)
    }
}

impl From<ComposedQuery> for Query {
    fn from(composed: ComposedQuery) -> Self {
        Query::Composed(composed)
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::Statement(Statement::new(text))
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::Statement(Statement::new(text))
    }
}
