//! Context construction and derivation.

use crate::config::{merge_policy, ContextConfig, ContextOverrides};
use crate::context::Context;
use crate::driver::{Bookmarks, Connector, GraphDriver};
use crate::error::{ContextError, Result};
use crate::logging::Hooks;
use std::sync::Arc;

/// Builds contexts from configuration, or from a parent context plus overrides.
#[derive(Clone)]
pub struct ContextFactory {
    connector: Arc<dyn Connector>,
    hooks: Hooks,
}

impl ContextFactory {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            hooks: Hooks::default(),
        }
    }

    /// Hooks handed to every context this factory creates
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Create a root context that owns a new driver.
    ///
    /// Fails with [`ContextError::Configuration`] when no valid endpoint is configured. The
    /// driver is not contacted until the first query.
    pub fn create(&self, config: &ContextConfig, overrides: &ContextOverrides) -> Result<Context> {
        let merged = merge_policy::apply(config, overrides);
        let driver = self.connect(&merged)?;
        Ok(Context::assemble(
            merged,
            driver,
            true,
            Bookmarks::new(),
            self.hooks.clone(),
        ))
    }

    /// Derive a context from `parent`.
    ///
    /// The parent's driver is shared unless the overrides point at a different endpoint, in
    /// which case the child creates and owns its own. The child starts from a snapshot of the
    /// parent's current bookmarks, or from none when it ignores bookmarks.
    pub fn derive(&self, parent: &Context, overrides: &ContextOverrides) -> Result<Context> {
        let merged = merge_policy::apply(&parent.config, overrides);
        let (driver, owns_driver) = if merged.url == parent.config.url {
            (parent.driver.clone(), false)
        } else {
            (self.connect(&merged)?, true)
        };
        let bookmarks = if merged.ignore_bookmarks {
            Bookmarks::new()
        } else {
            parent.session_config.bookmarks.clone()
        };
        Ok(Context::assemble(
            merged,
            driver,
            owns_driver,
            bookmarks,
            self.hooks.clone(),
        ))
    }

    /// Derive a context forced into read access mode.
    pub fn readonly(&self, parent: &Context, overrides: &ContextOverrides) -> Result<Context> {
        self.derive(parent, &overrides.clone().readonly(true))
    }

    /// Derive a context forced into write access mode.
    pub fn writable(&self, parent: &Context, overrides: &ContextOverrides) -> Result<Context> {
        self.derive(parent, &overrides.clone().readonly(false).write(true))
    }

    /// Same configuration, bookmarks and driver as `parent`, with its own session.
    pub fn sibling(&self, parent: &Context) -> Context {
        sibling_of(parent)
    }

    fn connect(&self, config: &ContextConfig) -> Result<Arc<dyn GraphDriver>> {
        config.validate()?;
        let endpoint = config.endpoint()?;
        self.connector
            .connect(endpoint, &config.driver)
            .map_err(|e| ContextError::Configuration(e.to_string()))
    }
}

pub(crate) fn sibling_of(parent: &Context) -> Context {
    let mut sibling = Context::assemble(
        parent.config.clone(),
        parent.driver.clone(),
        false,
        parent.session_config.bookmarks.clone(),
        parent.hooks.clone(),
    );
    sibling.session_config = parent.session_config.clone();
    sibling.transaction_config = parent.transaction_config.clone();
    sibling
}

impl std::fmt::Debug for ContextFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextFactory").finish_non_exhaustive()
    }
}
