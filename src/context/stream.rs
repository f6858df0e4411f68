//! Stream Executor
//!
//! Row-at-a-time execution with its own session lifecycle. A context that is inside a managed
//! transaction cannot stream on its transactional session, so the stream is hosted by a
//! sibling context that shares the driver, configuration and bookmarks; the sibling's
//! bookmarks and summary are copied back and its session closed once the stream ends.

use crate::context::factory::sibling_of;
use crate::context::query::Statement;
use crate::context::state::Lifecycle;
use crate::context::{Context, ContextState};
use crate::driver::StreamEvent;
use crate::error::ContextError;
use crate::logging::LogLevel;
use crate::normalize::{normalize_record, normalize_summary, Row, Summary};
use crate::value::Params;
use futures::StreamExt;
use serde_json::json;
use tracing::{debug, warn};

/// Receives a streamed result.
///
/// Calls arrive in order: `on_keys` at most once and before any record, `on_next` once per
/// record in arrival order, then exactly one of `on_completed` or `on_error`.
pub trait StreamObserver: Send {
    fn on_keys(&mut self, _keys: &[String]) {}

    fn on_next(&mut self, row: Row);

    fn on_completed(&mut self, _summary: Summary) {}

    fn on_error(&mut self, _error: ContextError) {}
}

/// Observer callback, as recorded by [`CollectingObserver`]
#[derive(Debug, Clone, PartialEq)]
pub enum StreamCall {
    Keys(Vec<String>),
    Next(Row),
    Completed(Summary),
    Error(ContextError),
}

/// Records every callback it receives.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    pub calls: Vec<StreamCall>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Option<&[String]> {
        self.calls.iter().find_map(|c| match c {
            StreamCall::Keys(keys) => Some(keys.as_slice()),
            _ => None,
        })
    }

    pub fn rows(&self) -> Vec<&Row> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                StreamCall::Next(row) => Some(row),
                _ => None,
            })
            .collect()
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.calls.iter().find_map(|c| match c {
            StreamCall::Completed(summary) => Some(summary),
            _ => None,
        })
    }

    pub fn error(&self) -> Option<&ContextError> {
        self.calls.iter().find_map(|c| match c {
            StreamCall::Error(err) => Some(err),
            _ => None,
        })
    }
}

impl StreamObserver for CollectingObserver {
    fn on_keys(&mut self, keys: &[String]) {
        self.calls.push(StreamCall::Keys(keys.to_vec()));
    }

    fn on_next(&mut self, row: Row) {
        self.calls.push(StreamCall::Next(row));
    }

    fn on_completed(&mut self, summary: Summary) {
        self.calls.push(StreamCall::Completed(summary));
    }

    fn on_error(&mut self, error: ContextError) {
        self.calls.push(StreamCall::Error(error));
    }
}

enum Terminal {
    Completed(Summary),
    Failed(ContextError),
}

impl Context {
    /// Stream a literal statement to `observer`.
    ///
    /// Failures are delivered only through [`StreamObserver::on_error`].
    pub async fn stream(
        &mut self,
        statement: impl Into<Statement>,
        params: Params,
        observer: &mut dyn StreamObserver,
    ) {
        let statement = statement.into();
        let params = statement.bind(params);
        self.reclaim_abandoned().await;
        if self.state() != ContextState::InTransaction {
            stream_on(self, &statement, &params, observer).await;
            return;
        }

        let mut sibling = sibling_of(self);
        debug!(context = self.id, sibling = sibling.id, "Streaming on a sibling context");
        stream_on(&mut sibling, &statement, &params, observer).await;
        self.adopt_bookmarks(sibling.last_bookmarks.clone());
        if let Some(summary) = sibling.last_summary.take() {
            self.last_summary = Some(summary);
        }
        if let Err(e) = sibling.close_session().await {
            warn!(context = self.id, sibling = sibling.id, error = %e, "Failed to close stream session");
        }
    }
}

async fn stream_on(
    host: &mut Context,
    statement: &Statement,
    params: &Params,
    observer: &mut dyn StreamObserver,
) {
    host.log(
        LogLevel::Debug,
        "stream_started",
        json!({ "statement": statement.text, "params": params }),
    );
    let terminal = pump(host, statement, params, observer).await;
    host.capture_bookmarks();
    match terminal {
        Terminal::Completed(summary) => {
            host.log(
                LogLevel::Info,
                "stream_completed",
                json!({ "statement": statement.text, "summary": summary }),
            );
            host.last_summary = Some(summary.clone());
            observer.on_completed(summary);
        }
        Terminal::Failed(err) => {
            host.log(
                LogLevel::Error,
                "stream_failed",
                json!({ "statement": statement.text, "error": err.to_string() }),
            );
            observer.on_error(err);
        }
    }
}

async fn pump(
    host: &mut Context,
    statement: &Statement,
    params: &Params,
    observer: &mut dyn StreamObserver,
) -> Terminal {
    if let Err(err) = host.ensure_session().await {
        return Terminal::Failed(ContextError::Stream(err.to_string()));
    }
    let opened = match &mut host.lifecycle {
        Lifecycle::SessionOpen(session) => {
            session
                .run_stream(&statement.text, params, &host.transaction_config)
                .await
        }
        _ => {
            return Terminal::Failed(ContextError::Stream(format!(
                "Context {} cannot stream in state {}",
                host.id,
                host.state().as_str()
            )))
        }
    };
    let mut events = match opened {
        Ok(events) => events,
        Err(err) => return Terminal::Failed(ContextError::Stream(err.to_string())),
    };

    let mut keys_seen = false;
    let mut records_seen = false;
    while let Some(event) = events.next().await {
        match event {
            Ok(StreamEvent::Keys(keys)) => {
                if !keys_seen && !records_seen {
                    observer.on_keys(&keys);
                }
                keys_seen = true;
            }
            Ok(StreamEvent::Record(record)) => {
                records_seen = true;
                observer.on_next(normalize_record(&record, None));
            }
            Ok(StreamEvent::Summary(summary)) => {
                return Terminal::Completed(normalize_summary(&summary));
            }
            Err(err) => return Terminal::Failed(ContextError::Stream(err.to_string())),
        }
    }
    Terminal::Failed(ContextError::Stream(
        "Stream ended without a summary".to_string(),
    ))
}
