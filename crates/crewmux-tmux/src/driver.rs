//! [`PaneDriver`] implementation over a tmux command runner.

use std::sync::Arc;

use crewmux_core::driver::{DriverError, PaneDriver, PaneHandle};

use crate::error::TmuxError;
use crate::executor::TmuxCommandRunner;
use crate::ops::{capture_pane, kill_session, send_text};
use crate::pane::list_panes;

/// tmux-backed pane driver. Holds the runner behind an `Arc` so the driver
/// itself stays cheap to clone into blocking tasks.
pub struct TmuxDriver {
    runner: Arc<dyn TmuxCommandRunner>,
}

impl TmuxDriver {
    pub fn new(runner: Arc<dyn TmuxCommandRunner>) -> Self {
        Self { runner }
    }
}

fn map_err(err: TmuxError) -> DriverError {
    match &err {
        TmuxError::CommandFailed(msg) if msg.contains("can't find pane") => {
            DriverError::PaneNotFound(msg.clone())
        }
        TmuxError::CommandFailed(msg) if msg.contains("can't find session") => {
            DriverError::SessionNotFound(msg.clone())
        }
        _ => DriverError::Backend(err.to_string()),
    }
}

impl PaneDriver for TmuxDriver {
    fn list(&self, session: &str) -> Result<Vec<PaneHandle>, DriverError> {
        let panes = list_panes(&self.runner.as_ref(), session).map_err(map_err)?;
        Ok(panes
            .into_iter()
            .map(|p| PaneHandle {
                id: p.pane_id,
                kind: p.kind,
                variant: p.variant,
                index: p.index,
                title: p.title,
            })
            .collect())
    }

    fn capture(&self, pane_id: &str, lines: u32) -> Result<String, DriverError> {
        capture_pane(&self.runner.as_ref(), pane_id, lines).map_err(map_err)
    }

    fn send(&self, pane_id: &str, text: &str, submit: bool) -> Result<(), DriverError> {
        send_text(&self.runner.as_ref(), pane_id, text, submit).map_err(map_err)
    }

    fn kill(&self, session: &str) -> Result<(), DriverError> {
        kill_session(&self.runner.as_ref(), session).map_err(map_err)
    }
}
