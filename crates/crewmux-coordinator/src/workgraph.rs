//! Interface to the external work-graph tool.
//!
//! The tool is out-of-process; the default implementation shells out to its
//! CLI and parses the JSON triage payload. Malformed items are dropped with
//! a logged reason rather than failing the whole triage.

use std::process::Command;

use crewmux_core::types::{TriageResponse, WorkItem};
use serde_json::Value;
use tracing::warn;

use crate::error::CoordinatorError;

/// Prioritized-work source. Implementations must be cheap to call once per
/// coordinator tick.
pub trait WorkGraph: Send + Sync {
    fn triage(&self, project_key: &str) -> Result<TriageResponse, CoordinatorError>;
}

/// Subprocess-backed work-graph client (`<bin> triage <key> --json`).
pub struct WorkGraphCli {
    bin: String,
}

impl WorkGraphCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

impl WorkGraph for WorkGraphCli {
    fn triage(&self, project_key: &str) -> Result<TriageResponse, CoordinatorError> {
        let output = Command::new(&self.bin)
            .args(["triage", project_key, "--json"])
            .output()
            .map_err(|e| CoordinatorError::UpstreamUnavailable(format!("{}: {e}", self.bin)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("unauthorized") || stderr.contains("authentication") {
                return Err(CoordinatorError::Unauthorized(stderr.trim().to_string()));
            }
            return Err(CoordinatorError::UpstreamUnavailable(format!(
                "{} exited {}: {}",
                self.bin,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let raw: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| CoordinatorError::MalformedInput(format!("triage payload: {e}")))?;
        Ok(parse_triage(&raw))
    }
}

/// Parse a triage payload, tolerating both the wrapped
/// (`{"triage": {"recommendations": [...]}}`) and flat shapes. Items that
/// fail schema checks are skipped.
pub fn parse_triage(raw: &Value) -> TriageResponse {
    let items = raw
        .pointer("/triage/recommendations")
        .or_else(|| raw.get("recommendations"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut recommendations: Vec<WorkItem> = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<WorkItem>(item) {
            Ok(work) => recommendations.push(work),
            Err(e) => {
                warn!(error = %e, "dropping malformed triage item");
            }
        }
    }
    TriageResponse { recommendations }
}
