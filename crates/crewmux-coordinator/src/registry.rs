//! In-memory registry of known agent panes.
//!
//! Records are keyed by stable pane id. The coordinator owns the registry
//! behind its single lock; readers get cloned snapshots, never references
//! into the map.

use chrono::{DateTime, Utc};
use crewmux_core::driver::PaneHandle;
use crewmux_core::types::{AgentKind, AgentSnapshot, AgentState, PersonaProfile};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub pane_id: String,
    pub kind: AgentKind,
    pub variant: Option<String>,
    pub title: String,
    pub state: AgentState,
    pub state_since: DateTime<Utc>,
    /// Context window usage percentage, 0-100. Updated by the quota
    /// collector when one is wired up.
    pub context_usage: f64,
    pub reservations: Vec<String>,
    pub profile: Option<PersonaProfile>,
    pub mail_name: Option<String>,
    pub healthy: bool,
}

impl AgentRecord {
    fn from_handle(pane: &PaneHandle, now: DateTime<Utc>) -> Self {
        Self {
            pane_id: pane.id.clone(),
            kind: pane.kind,
            variant: pane.variant.clone(),
            title: pane.title.clone(),
            state: AgentState::Unknown,
            state_since: now,
            context_usage: 0.0,
            reservations: Vec::new(),
            profile: None,
            mail_name: None,
            healthy: true,
        }
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            pane_id: self.pane_id.clone(),
            kind: self.kind,
            variant: self.variant.clone(),
            context_usage: self.context_usage,
            reservations: self.reservations.clone(),
            profile: self.profile.clone(),
            mail_name: self.mail_name.clone(),
        }
    }
}

/// Net effect of one reconcile pass.
#[derive(Debug, Default, Clone)]
pub struct ReconcileOutcome {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Default)]
pub struct Registry {
    agents: HashMap<String, AgentRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the registry in line with a fresh pane listing: add
    /// discovered panes, drop vanished ones, keep identity by pane id. A
    /// pane id reappearing with a different agent kind means the pane was
    /// recycled; the old record is evicted and a new one created.
    pub fn reconcile(&mut self, panes: &[PaneHandle], now: DateTime<Utc>) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        let current: HashMap<&str, &PaneHandle> =
            panes.iter().map(|p| (p.id.as_str(), p)).collect();

        let vanished: Vec<String> = self
            .agents
            .keys()
            .filter(|id| !current.contains_key(id.as_str()))
            .cloned()
            .collect();
        for id in vanished {
            self.agents.remove(&id);
            outcome.removed.push(id);
        }

        for pane in panes {
            let same_kind = self.agents.get(&pane.id).map(|r| r.kind == pane.kind);
            match same_kind {
                Some(true) => {
                    // Title and variant may drift; identity does not.
                    if let Some(record) = self.agents.get_mut(&pane.id) {
                        record.title = pane.title.clone();
                        record.variant = pane.variant.clone();
                    }
                }
                Some(false) => {
                    self.agents
                        .insert(pane.id.clone(), AgentRecord::from_handle(pane, now));
                    outcome.removed.push(pane.id.clone());
                    outcome.added.push(pane.id.clone());
                }
                None => {
                    self.agents
                        .insert(pane.id.clone(), AgentRecord::from_handle(pane, now));
                    outcome.added.push(pane.id.clone());
                }
            }
        }

        outcome
    }

    pub fn update_state(&mut self, pane_id: &str, state: AgentState, since: DateTime<Utc>) {
        if let Some(record) = self.agents.get_mut(pane_id) {
            record.state = state;
            record.state_since = since;
        }
    }

    pub fn set_mail_name(&mut self, pane_id: &str, name: impl Into<String>) {
        if let Some(record) = self.agents.get_mut(pane_id) {
            record.mail_name = Some(name.into());
        }
    }

    pub fn set_profile(&mut self, pane_id: &str, profile: PersonaProfile) {
        if let Some(record) = self.agents.get_mut(pane_id) {
            record.profile = Some(profile);
        }
    }

    pub fn set_context_usage(&mut self, pane_id: &str, usage: f64) {
        if let Some(record) = self.agents.get_mut(pane_id) {
            record.context_usage = usage.clamp(0.0, 100.0);
        }
    }

    pub fn add_reservations(&mut self, pane_id: &str, patterns: &[String]) {
        if let Some(record) = self.agents.get_mut(pane_id) {
            for p in patterns {
                if !record.reservations.contains(p) {
                    record.reservations.push(p.clone());
                }
            }
        }
    }

    pub fn get(&self, pane_id: &str) -> Option<&AgentRecord> {
        self.agents.get(pane_id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// All records, ordered by pane id for deterministic output.
    pub fn all(&self) -> Vec<AgentRecord> {
        let mut records: Vec<AgentRecord> = self.agents.values().cloned().collect();
        records.sort_by(|a, b| a.pane_id.cmp(&b.pane_id));
        records
    }

    /// Snapshots of AI agents currently able to take work, ordered by pane
    /// id so the scorer sees a stable input order.
    pub fn assignable_snapshots(&self) -> Vec<AgentSnapshot> {
        let mut idle: Vec<&AgentRecord> = self
            .agents
            .values()
            .filter(|r| r.kind.is_agent() && r.healthy && r.state.is_assignable())
            .collect();
        idle.sort_by(|a, b| a.pane_id.cmp(&b.pane_id));
        idle.iter().map(|r| r.snapshot()).collect()
    }
}
