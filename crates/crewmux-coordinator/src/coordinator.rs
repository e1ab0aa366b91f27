//! The per-session coordinator: one instance per tmux session, owning the
//! agent registry and the event bus.
//!
//! The tick loop refreshes the pane list, re-detects agent states, and
//! (when auto-assign is on) matches idle agents to triaged work. All
//! registry mutation happens under a single lock; collaborators are
//! injected trait objects.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use crewmux_core::detect::{StateDetector, StateTracker};
use crewmux_core::driver::{PaneDriver, PaneHandle};
use crewmux_core::policy::{Policy, PolicyAction};
use crewmux_core::redact::{RedactionMode, SecretScanner};
use crewmux_core::score::{score_and_select, Assignment, ScoredAssignment};
use crewmux_core::types::{AgentSnapshot, AgentState, TriageResponse};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;
use crate::events::{CoordinatorEvent, EventBus, EventKind};
use crate::mail::{assignment_commands, format_assignment_message, MailService, SendMessageOptions};
use crate::registry::{AgentRecord, Registry};
use crate::reserve::ReservationService;
use crate::workgraph::WorkGraph;

/// What happened to one selected assignment during a tick.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentOutcome {
    pub assignment: Assignment,
    pub delivered: bool,
    pub message_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Registry plus state tracker, guarded together: assignment decisions in
/// a tick see one consistent snapshot.
struct Inner {
    registry: Registry,
    tracker: StateTracker,
}

pub struct SessionCoordinator {
    config: CoordinatorConfig,
    driver: Arc<dyn PaneDriver>,
    workgraph: Option<Arc<dyn WorkGraph>>,
    mail: Option<Arc<dyn MailService>>,
    reservations: Option<Arc<dyn ReservationService>>,
    detector: StateDetector,
    scanner: SecretScanner,
    policy: Policy,
    events: EventBus,
    inner: Mutex<Inner>,
}

impl SessionCoordinator {
    pub fn new(config: CoordinatorConfig, driver: Arc<dyn PaneDriver>) -> Self {
        Self {
            config,
            driver,
            workgraph: None,
            mail: None,
            reservations: None,
            detector: StateDetector::new(),
            scanner: SecretScanner::new(),
            policy: Policy::default(),
            events: EventBus::default(),
            inner: Mutex::new(Inner {
                registry: Registry::new(),
                tracker: StateTracker::new(),
            }),
        }
    }

    #[must_use]
    pub fn with_workgraph(mut self, workgraph: Arc<dyn WorkGraph>) -> Self {
        self.workgraph = Some(workgraph);
        self
    }

    #[must_use]
    pub fn with_mail(mut self, mail: Arc<dyn MailService>) -> Self {
        self.mail = Some(mail);
        self
    }

    #[must_use]
    pub fn with_reservations(mut self, reservations: Arc<dyn ReservationService>) -> Self {
        self.reservations = Some(reservations);
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Drive ticks until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(session = %self.config.session, "coordinator started");
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("coordinator cancelled, shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        // Transient upstream failures retry next tick.
                        warn!(error = %e, kind = e.kind_id(), "tick failed");
                    }
                }
            }
        }
    }

    /// One coordinator pass: reconcile panes, refresh states, and (when
    /// enabled) assign work to idle agents.
    pub async fn tick(&self) -> Result<Vec<AssignmentOutcome>, CoordinatorError> {
        let panes = self.list_panes().await?;
        self.reconcile(&panes).await;
        self.refresh_states(&panes).await;

        if !self.config.auto_assign {
            return Ok(Vec::new());
        }
        let Some(workgraph) = &self.workgraph else {
            return Ok(Vec::new());
        };

        let idle = {
            let inner = self.inner.lock().await;
            inner.registry.assignable_snapshots()
        };
        if idle.is_empty() {
            return Ok(Vec::new());
        }

        let triage = self.fetch_triage(Arc::clone(workgraph)).await?;
        if triage.recommendations.is_empty() {
            return Ok(Vec::new());
        }

        let selected = self.select_assignments(&idle, &triage);
        let mut outcomes = Vec::with_capacity(selected.len());
        for scored in selected {
            outcomes.push(self.execute_assignment(scored).await);
        }
        Ok(outcomes)
    }

    /// All agents currently known, sorted by pane id.
    pub async fn agents(&self) -> Vec<AgentRecord> {
        self.inner.lock().await.registry.all()
    }

    /// Attach a mail identity to an agent; assignments to it are then
    /// announced over mail.
    pub async fn set_agent_mail_name(&self, pane_id: &str, name: impl Into<String>) {
        self.inner.lock().await.registry.set_mail_name(pane_id, name);
    }

    pub async fn set_agent_profile(&self, pane_id: &str, profile: crewmux_core::types::PersonaProfile) {
        self.inner.lock().await.registry.set_profile(pane_id, profile);
    }

    /// Context usage update from the quota collector, percentage 0-100.
    pub async fn set_context_usage(&self, pane_id: &str, usage: f64) {
        self.inner.lock().await.registry.set_context_usage(pane_id, usage);
    }

    async fn list_panes(&self) -> Result<Vec<PaneHandle>, CoordinatorError> {
        let driver = Arc::clone(&self.driver);
        let session = self.config.session.clone();
        let panes = tokio::task::spawn_blocking(move || driver.list(&session))
            .await
            .map_err(|e| CoordinatorError::UpstreamUnavailable(e.to_string()))??;
        Ok(panes)
    }

    async fn reconcile(&self, panes: &[PaneHandle]) {
        let now = Utc::now();
        let outcome = {
            let mut inner = self.inner.lock().await;
            let outcome = inner.registry.reconcile(panes, now);
            for id in &outcome.removed {
                inner.tracker.forget(id);
            }
            outcome
        };

        for id in &outcome.added {
            let kind = panes
                .iter()
                .find(|p| &p.id == id)
                .map(|p| p.kind.short())
                .unwrap_or("unknown");
            self.events.publish(
                CoordinatorEvent::new(EventKind::AgentDiscovered)
                    .pane(id.clone())
                    .detail("agent_type", kind),
            );
        }
    }

    /// Detect every known agent's state from a fresh capture; captures are
    /// issued sequentially to keep per-pane event ordering tractable.
    async fn refresh_states(&self, panes: &[PaneHandle]) {
        for pane in panes {
            if !pane.kind.is_agent() {
                continue;
            }
            let tail = match self.capture(&pane.id, self.config.capture_lines).await {
                Ok(tail) => tail,
                Err(e) => {
                    debug!(pane_id = %pane.id, error = %e, "state capture failed");
                    continue;
                }
            };
            let state = self.detector.detect(&tail, pane.kind);
            let now = Utc::now();

            let (reading, changed) = {
                let mut inner = self.inner.lock().await;
                let (reading, changed) = inner.tracker.observe(&pane.id, state, now);
                inner
                    .registry
                    .update_state(&pane.id, reading.state, reading.since);
                (reading, changed)
            };

            if changed {
                self.events.publish(
                    CoordinatorEvent::new(EventKind::StateChanged)
                        .pane(pane.id.clone())
                        .detail("state", reading.state.as_str()),
                );
            }
        }
    }

    async fn fetch_triage(
        &self,
        workgraph: Arc<dyn WorkGraph>,
    ) -> Result<TriageResponse, CoordinatorError> {
        let project_key = self.config.project_key.clone();
        tokio::task::spawn_blocking(move || workgraph.triage(&project_key))
            .await
            .map_err(|e| CoordinatorError::UpstreamUnavailable(e.to_string()))?
    }

    fn select_assignments(
        &self,
        idle: &[AgentSnapshot],
        triage: &TriageResponse,
    ) -> Vec<ScoredAssignment> {
        let reservations: HashMap<String, Vec<String>> = idle
            .iter()
            .map(|a| (a.pane_id.clone(), a.reservations.clone()))
            .collect();
        score_and_select(
            idle,
            &triage.recommendations,
            &self.config.strategy.score_config(),
            &reservations,
            Utc::now(),
        )
    }

    /// Carry out one selected assignment: policy preflight, reservation,
    /// mail announcement, then prompt injection. Failures surface as
    /// `delivery-failed` events and never abort the tick.
    async fn execute_assignment(&self, scored: ScoredAssignment) -> AssignmentOutcome {
        let assignment = scored.assignment.clone();
        let pane_id = assignment.pane_id.clone();

        // Policy preflight on the command strings the assignment asks the
        // agent to run.
        for command in assignment_commands(&assignment.work_id) {
            match self.policy.check(&command).map(|r| r.action) {
                Some(PolicyAction::Block) => {
                    return self.fail_assignment(
                        assignment,
                        CoordinatorError::PolicyBlock(command),
                        false,
                    );
                }
                Some(PolicyAction::Approval) if !self.config.pre_approved => {
                    return self.fail_assignment(
                        assignment,
                        CoordinatorError::PolicyApprovalRequired(command),
                        false,
                    );
                }
                _ => {}
            }
        }

        // Reserve files when the assignment names any.
        if !assignment.files_to_reserve.is_empty() {
            if let Some(reservations) = &self.reservations {
                if let Err(e) = reservations.reserve(&pane_id, &assignment.files_to_reserve) {
                    return self.fail_assignment(assignment, e, false);
                }
                let mut inner = self.inner.lock().await;
                inner
                    .registry
                    .add_reservations(&pane_id, &assignment.files_to_reserve);
            }
        }

        // Announce over mail when the agent has an identity there. Send
        // success is sufficient; no ack is awaited.
        let mut message_sent = false;
        let mail_target = self
            .mail
            .as_ref()
            .map(Arc::clone)
            .zip(assignment.mail_name.clone());
        if let Some((mail, mail_name)) = mail_target {
            let body_scan = self
                .scanner
                .scan_and_redact(&format_assignment_message(&scored), self.config.redaction_mode);
            if body_scan.blocked {
                return self.fail_assignment(
                    assignment,
                    CoordinatorError::PolicyBlock("assignment message contains secrets".into()),
                    false,
                );
            }
            let opts = SendMessageOptions {
                project_key: self.config.project_key.clone(),
                sender: self.config.agent_name.clone(),
                to: vec![mail_name],
                subject: format!("Work Assignment: {}", assignment.work_title),
                body_md: body_scan.output,
                importance: "normal".into(),
                ack_required: true,
            };
            let send = tokio::task::spawn_blocking(move || mail.send_message(&opts)).await;
            match send {
                Ok(Ok(_)) => message_sent = true,
                Ok(Err(e)) => return self.fail_assignment(assignment, e, false),
                Err(e) => {
                    return self.fail_assignment(
                        assignment,
                        CoordinatorError::UpstreamUnavailable(e.to_string()),
                        false,
                    )
                }
            }
        }

        // Scan the prompt before it leaves the process.
        let prompt = assignment_prompt(&assignment);
        let scan = self.scanner.scan_and_redact(&prompt, self.config.redaction_mode);
        if scan.blocked {
            return self.fail_assignment(
                assignment,
                CoordinatorError::PolicyBlock("prompt contains secrets".into()),
                message_sent,
            );
        }
        if self.config.redaction_mode == RedactionMode::Warn && !scan.findings.is_empty() {
            warn!(
                pane_id = %pane_id,
                findings = scan.findings.len(),
                "assignment prompt contains possible secrets"
            );
        }

        if let Err(e) = self.send(&pane_id, scan.output).await {
            return self.fail_assignment(assignment, e, message_sent);
        }

        // Mark the agent working locally so the next tick cannot re-select
        // it before the detector catches up.
        {
            let now = Utc::now();
            let mut inner = self.inner.lock().await;
            inner.tracker.hold_working(&pane_id, now);
            inner.registry.update_state(&pane_id, AgentState::Working, now);
        }

        // Titles flow to dashboards and logs; scrub them the same way as
        // prompts.
        let safe_title = self
            .scanner
            .scan_and_redact(&assignment.work_title, self.config.redaction_mode)
            .output;
        self.events.publish(
            CoordinatorEvent::new(EventKind::WorkAssigned)
                .pane(pane_id)
                .work(assignment.work_id.clone())
                .detail("title", safe_title)
                .detail("agent_type", assignment.agent_kind.short())
                .detail("score", assignment.score),
        );

        AssignmentOutcome {
            assignment,
            delivered: true,
            message_sent,
            error: None,
        }
    }

    fn fail_assignment(
        &self,
        assignment: Assignment,
        error: CoordinatorError,
        message_sent: bool,
    ) -> AssignmentOutcome {
        warn!(
            work_id = %assignment.work_id,
            pane_id = %assignment.pane_id,
            error = %error,
            "assignment not delivered"
        );
        self.events.publish(
            CoordinatorEvent::new(EventKind::DeliveryFailed)
                .pane(assignment.pane_id.clone())
                .work(assignment.work_id.clone())
                .detail("error", error.kind_id()),
        );
        AssignmentOutcome {
            assignment,
            delivered: false,
            message_sent,
            error: Some(error.kind_id().to_string()),
        }
    }

    async fn capture(&self, pane_id: &str, lines: u32) -> Result<String, CoordinatorError> {
        let driver = Arc::clone(&self.driver);
        let pane_id = pane_id.to_string();
        tokio::task::spawn_blocking(move || driver.capture(&pane_id, lines))
            .await
            .map_err(|e| CoordinatorError::UpstreamUnavailable(e.to_string()))?
            .map_err(Into::into)
    }

    async fn send(&self, pane_id: &str, text: String) -> Result<(), CoordinatorError> {
        let driver = Arc::clone(&self.driver);
        let pane_id = pane_id.to_string();
        tokio::task::spawn_blocking(move || driver.send(&pane_id, &text, true))
            .await
            .map_err(|e| CoordinatorError::UpstreamUnavailable(e.to_string()))?
            .map_err(Into::into)
    }
}

/// The prompt injected into the pane for an assignment.
pub fn assignment_prompt(assignment: &Assignment) -> String {
    format!(
        "Please work on bead {}: {}",
        assignment.work_id, assignment.work_title
    )
}
