//! Abstraction over the terminal-multiplexer backend.
//!
//! Defined here as a synchronous, object-safe trait so the coordinator can
//! hold an `Arc<dyn PaneDriver>` and tests can inject fakes. Async callers
//! wrap invocations in `spawn_blocking`; the real tmux implementation lives
//! in the backend crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::AgentKind;

/// A pane as enumerated by the backend: stable id, agent kind derived at
/// spawn time, optional model variant, index, and title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneHandle {
    pub id: String,
    pub kind: AgentKind,
    #[serde(default)]
    pub variant: Option<String>,
    pub index: u32,
    pub title: String,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("pane not found: {0}")]
    PaneNotFound(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Narrow interface the coordinator and pipeline runner consume. Delivery
/// via `send` is at-most-once: an ambiguous failure is reported, never
/// retried here.
pub trait PaneDriver: Send + Sync {
    /// Enumerate panes of a session.
    fn list(&self, session: &str) -> Result<Vec<PaneHandle>, DriverError>;

    /// Capture the last `lines` lines of visible scrollback as text.
    fn capture(&self, pane_id: &str, lines: u32) -> Result<String, DriverError>;

    /// Paste `text` into the pane, optionally submitting with Enter.
    fn send(&self, pane_id: &str, text: &str, submit: bool) -> Result<(), DriverError>;

    /// Tear down the whole session.
    fn kill(&self, session: &str) -> Result<(), DriverError>;
}

impl<T: PaneDriver + ?Sized> PaneDriver for &T {
    fn list(&self, session: &str) -> Result<Vec<PaneHandle>, DriverError> {
        (**self).list(session)
    }

    fn capture(&self, pane_id: &str, lines: u32) -> Result<String, DriverError> {
        (**self).capture(pane_id, lines)
    }

    fn send(&self, pane_id: &str, text: &str, submit: bool) -> Result<(), DriverError> {
        (**self).send(pane_id, text, submit)
    }

    fn kill(&self, session: &str) -> Result<(), DriverError> {
        (**self).kill(session)
    }
}
