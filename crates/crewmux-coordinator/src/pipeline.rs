//! Sequential prompt pipelines across heterogeneous agents.
//!
//! Each stage binds a pane, injects its prompt (carrying the previous
//! stage's output), waits for the agent to go idle, and extracts the new
//! text for the next stage. Stages run strictly in order; concurrent
//! pipelines over disjoint panes need no shared locks.

use std::sync::Arc;
use std::time::Duration;

use crewmux_core::detect::StateDetector;
use crewmux_core::driver::{DriverError, PaneDriver, PaneHandle};
use crewmux_core::extract::extract_new_output;
use crewmux_core::types::{AgentKind, AgentState};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{CoordinatorError, PipelineError};
use crate::events::{CoordinatorEvent, EventBus, EventKind};

/// One pipeline step: which agent family runs it, what to ask, and an
/// optional model preference.
#[derive(Debug, Clone)]
pub struct Stage {
    pub agent: AgentKind,
    pub prompt: String,
    pub model: Option<String>,
}

impl Stage {
    pub fn new(agent: AgentKind, prompt: impl Into<String>) -> Self {
        Self {
            agent,
            prompt: prompt.into(),
            model: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    pub session: String,
    pub stages: Vec<Stage>,
}

pub struct PipelineRunner {
    driver: Arc<dyn PaneDriver>,
    detector: StateDetector,
    config: PipelineConfig,
    events: Option<EventBus>,
}

impl PipelineRunner {
    pub fn new(driver: Arc<dyn PaneDriver>, config: PipelineConfig) -> Self {
        Self {
            driver,
            detector: StateDetector::new(),
            config,
            events: None,
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Run all stages. Returns each stage's extracted output; the first
    /// failing stage aborts the pipeline with its index and cause. No
    /// rollback is attempted on the agent.
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, PipelineError> {
        let mut outputs: Vec<String> = Vec::with_capacity(pipeline.stages.len());
        let mut previous_output = String::new();
        let mut previous_pane: Option<String> = None;

        for (index, stage) in pipeline.stages.iter().enumerate() {
            info!(
                stage = index,
                agent = ?stage.agent,
                "pipeline stage starting"
            );
            let output = self
                .run_stage(
                    &pipeline.session,
                    stage,
                    &previous_output,
                    previous_pane.as_deref(),
                    cancel,
                )
                .await
                .map_err(|source| PipelineError {
                    stage: index,
                    source,
                })?;

            if let Some(bus) = &self.events {
                bus.publish(
                    CoordinatorEvent::new(EventKind::PipelineStageDone)
                        .detail("stage", index as u64)
                        .detail("output_bytes", output.1.len() as u64),
                );
            }

            previous_pane = Some(output.0);
            previous_output = output.1.clone();
            outputs.push(output.1);
        }

        if let Some(bus) = &self.events {
            bus.publish(
                CoordinatorEvent::new(EventKind::PipelineDone)
                    .detail("stages", pipeline.stages.len() as u64),
            );
        }
        Ok(outputs)
    }

    /// Run one stage; returns (pane id, extracted output).
    async fn run_stage(
        &self,
        session: &str,
        stage: &Stage,
        previous_output: &str,
        previous_pane: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(String, String), CoordinatorError> {
        let pane = self.bind_pane(session, stage).await?;
        let pane_id = pane.id.clone();

        // Capture before the prompt goes in, so the response can be
        // isolated afterwards.
        let before = self
            .capture(&pane_id, self.config.capture_lines)
            .await
            .unwrap_or_default();

        let prompt = compose_prompt(
            &stage.prompt,
            previous_output,
            previous_pane == Some(pane_id.as_str()),
        );

        self.send(&pane_id, prompt).await?;

        // Give the agent's own thinking indicator time to appear, or the
        // next poll would see the still-idle prompt line.
        tokio::select! {
            _ = cancel.cancelled() => return Err(CoordinatorError::Cancelled),
            _ = sleep(self.config.debounce) => {}
        }

        self.await_idle(&pane_id, stage.agent, cancel).await?;

        let after = self.capture(&pane_id, self.config.capture_lines).await?;
        let output = extract_new_output(&before, &after);
        debug!(pane_id = %pane_id, bytes = output.len(), "stage output extracted");
        Ok((pane_id, output))
    }

    /// Find a pane for the stage: exact (kind, model) match preferred,
    /// any pane of the kind as fallback.
    async fn bind_pane(&self, session: &str, stage: &Stage) -> Result<PaneHandle, CoordinatorError> {
        let driver = Arc::clone(&self.driver);
        let session = session.to_string();
        let panes = tokio::task::spawn_blocking(move || driver.list(&session))
            .await
            .map_err(|e| CoordinatorError::UpstreamUnavailable(e.to_string()))??;

        let of_kind = || panes.iter().filter(|p| p.kind == stage.agent);

        if let Some(model) = &stage.model {
            if let Some(pane) = of_kind().find(|p| p.variant.as_deref() == Some(model.as_str())) {
                return Ok(pane.clone());
            }
        }
        of_kind()
            .next()
            .cloned()
            .ok_or_else(|| CoordinatorError::NoAgent {
                kind: stage.agent,
                model: stage.model.clone(),
            })
    }

    /// Poll the detector until the agent reads idle, subject to the stage
    /// timeout and the caller's cancellation token. A vanished pane
    /// surfaces as `PaneLost`.
    async fn await_idle(
        &self,
        pane_id: &str,
        kind: AgentKind,
        cancel: &CancellationToken,
    ) -> Result<(), CoordinatorError> {
        let deadline = Instant::now() + self.config.stage_timeout;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(CoordinatorError::Cancelled),
                _ = sleep(self.config.poll_interval) => {}
            }
            if Instant::now() >= deadline {
                return Err(CoordinatorError::Timeout(self.config.stage_timeout));
            }

            match self.capture(pane_id, self.config.detect_lines).await {
                Ok(tail) => {
                    // Only a real idle prompt completes a stage. An agent
                    // pausing with a clarifying question is still
                    // mid-stage; handing its partial output forward would
                    // corrupt the pipeline.
                    if self.detector.detect(&tail, kind) == AgentState::Idle {
                        return Ok(());
                    }
                }
                Err(CoordinatorError::Driver(DriverError::PaneNotFound(_))) => {
                    return Err(CoordinatorError::PaneLost(pane_id.to_string()));
                }
                // Transient capture failures: keep polling until timeout.
                Err(e) => debug!(pane_id = %pane_id, error = %e, "idle poll capture failed"),
            }
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

/// Compose the stage prompt. When the previous stage ran in the same pane
/// its output is already in the scrollback, so only a reference is added;
/// a different pane gets the output injected verbatim.
fn compose_prompt(base: &str, previous_output: &str, same_pane: bool) -> String {
    if previous_output.is_empty() {
        return base.to_string();
    }
    if same_pane {
        format!("{base}\n\n(See previous output above)")
    } else {
        format!("{base}\n\nResult from previous stage:\n{previous_output}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            debounce: Duration::from_millis(1),
            poll_interval: Duration::from_millis(1),
            stage_timeout: Duration::from_millis(500),
            capture_lines: 2000,
            detect_lines: 10,
        }
    }

    /// Scripted pane driver: panes plus per-pane capture sequences. Each
    /// capture pops the next snapshot; the last one repeats.
    struct FakeDriver {
        panes: Vec<PaneHandle>,
        captures: Mutex<HashMap<String, Vec<String>>>,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl FakeDriver {
        fn new(panes: Vec<PaneHandle>) -> Self {
            Self {
                panes,
                captures: Mutex::new(HashMap::new()),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn script(&self, pane_id: &str, snapshots: &[&str]) {
            self.captures.lock().expect("lock").insert(
                pane_id.to_string(),
                snapshots.iter().rev().map(|s| s.to_string()).collect(),
            );
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().expect("lock").clone()
        }
    }

    impl PaneDriver for FakeDriver {
        fn list(&self, _session: &str) -> Result<Vec<PaneHandle>, DriverError> {
            Ok(self.panes.clone())
        }

        fn capture(&self, pane_id: &str, _lines: u32) -> Result<String, DriverError> {
            let mut captures = self.captures.lock().expect("lock");
            let queue = captures
                .get_mut(pane_id)
                .ok_or_else(|| DriverError::PaneNotFound(pane_id.to_string()))?;
            if queue.len() > 1 {
                Ok(queue.pop().expect("non-empty"))
            } else {
                queue
                    .last()
                    .cloned()
                    .ok_or_else(|| DriverError::PaneNotFound(pane_id.to_string()))
            }
        }

        fn send(&self, pane_id: &str, text: &str, _submit: bool) -> Result<(), DriverError> {
            self.sent
                .lock()
                .expect("lock")
                .push((pane_id.to_string(), text.to_string()));
            Ok(())
        }

        fn kill(&self, _session: &str) -> Result<(), DriverError> {
            Ok(())
        }
    }

    fn pane(id: &str, kind: AgentKind, variant: Option<&str>) -> PaneHandle {
        PaneHandle {
            id: id.into(),
            kind,
            variant: variant.map(str::to_string),
            index: 0,
            title: format!("pane {id}"),
        }
    }

    #[tokio::test]
    async fn single_stage_extracts_new_output() {
        let driver = Arc::new(FakeDriver::new(vec![pane("%0", AgentKind::Claude, None)]));
        driver.script(
            "%0",
            &[
                "claude> ",                         // before snapshot
                "claude> working on the answer",    // first idle poll: working
                "claude> \nthe answer is 42\nclaude> ", // idle again, and after snapshot
            ],
        );

        let runner = PipelineRunner::new(driver.clone(), fast_config());
        let pipeline = Pipeline {
            session: "main".into(),
            stages: vec![Stage::new(AgentKind::Claude, "compute the answer")],
        };
        let outputs = runner
            .run(&pipeline, &CancellationToken::new())
            .await
            .expect("pipeline should pass");

        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].contains("the answer is 42"), "{:?}", outputs[0]);

        let sent = driver.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "%0");
        assert_eq!(sent[0].1, "compute the answer");
    }

    #[tokio::test]
    async fn second_stage_receives_previous_output() {
        let driver = Arc::new(FakeDriver::new(vec![
            pane("%0", AgentKind::Claude, None),
            pane("%1", AgentKind::Codex, None),
        ]));
        driver.script("%0", &["claude> ", "claude> \nDRAFT TEXT\nclaude> "]);
        driver.script("%1", &["codex> ", "codex> \nREVIEWED\ncodex> "]);

        let runner = PipelineRunner::new(driver.clone(), fast_config());
        let pipeline = Pipeline {
            session: "main".into(),
            stages: vec![
                Stage::new(AgentKind::Claude, "draft it"),
                Stage::new(AgentKind::Codex, "review it"),
            ],
        };
        runner
            .run(&pipeline, &CancellationToken::new())
            .await
            .expect("pipeline should pass");

        let sent = driver.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0, "%1");
        assert!(
            sent[1].1.contains("Result from previous stage:"),
            "cross-pane hand-off injects the output: {:?}",
            sent[1].1
        );
        assert!(sent[1].1.contains("DRAFT TEXT"));
    }

    #[tokio::test]
    async fn same_pane_reuse_references_scrollback() {
        let driver = Arc::new(FakeDriver::new(vec![pane("%0", AgentKind::Claude, None)]));
        driver.script(
            "%0",
            &[
                "claude> ",
                "claude> \nFIRST\nclaude> ",
                "claude> \nFIRST\nclaude> \nSECOND\nclaude> ",
            ],
        );

        let runner = PipelineRunner::new(driver.clone(), fast_config());
        let pipeline = Pipeline {
            session: "main".into(),
            stages: vec![
                Stage::new(AgentKind::Claude, "step one"),
                Stage::new(AgentKind::Claude, "step two"),
            ],
        };
        runner
            .run(&pipeline, &CancellationToken::new())
            .await
            .expect("pipeline should pass");

        let sent = driver.sent();
        assert!(sent[1].1.contains("(See previous output above)"));
        assert!(
            !sent[1].1.contains("FIRST"),
            "same-pane hand-off must not duplicate the output"
        );
    }

    #[tokio::test]
    async fn missing_agent_fails_with_stage_index() {
        let driver = Arc::new(FakeDriver::new(vec![pane("%0", AgentKind::Claude, None)]));
        driver.script("%0", &["claude> "]);

        let runner = PipelineRunner::new(driver, fast_config());
        let pipeline = Pipeline {
            session: "main".into(),
            stages: vec![
                Stage::new(AgentKind::Claude, "ok"),
                Stage::new(AgentKind::Gemini, "nobody home"),
            ],
        };
        let err = runner
            .run(&pipeline, &CancellationToken::new())
            .await
            .expect_err("should fail");
        assert_eq!(err.stage, 1);
        assert_eq!(err.source.kind_id(), "no-agent");
    }

    #[tokio::test]
    async fn model_hint_prefers_exact_variant() {
        let driver = Arc::new(FakeDriver::new(vec![
            pane("%0", AgentKind::Claude, Some("haiku")),
            pane("%1", AgentKind::Claude, Some("opus")),
        ]));
        driver.script("%1", &["claude> ", "claude> \ndone\nclaude> "]);

        let runner = PipelineRunner::new(driver.clone(), fast_config());
        let pipeline = Pipeline {
            session: "main".into(),
            stages: vec![Stage::new(AgentKind::Claude, "hard problem").with_model("opus")],
        };
        runner
            .run(&pipeline, &CancellationToken::new())
            .await
            .expect("pipeline should pass");
        assert_eq!(driver.sent()[0].0, "%1", "opus pane preferred");
    }

    #[tokio::test]
    async fn model_hint_falls_back_to_kind() {
        let driver = Arc::new(FakeDriver::new(vec![pane("%0", AgentKind::Claude, Some("haiku"))]));
        driver.script("%0", &["claude> ", "claude> \ndone\nclaude> "]);

        let runner = PipelineRunner::new(driver.clone(), fast_config());
        let pipeline = Pipeline {
            session: "main".into(),
            stages: vec![Stage::new(AgentKind::Claude, "go").with_model("opus")],
        };
        runner
            .run(&pipeline, &CancellationToken::new())
            .await
            .expect("pipeline should pass");
        assert_eq!(driver.sent()[0].0, "%0", "kind-only fallback");
    }

    #[tokio::test]
    async fn stage_times_out() {
        let driver = Arc::new(FakeDriver::new(vec![pane("%0", AgentKind::Claude, None)]));
        // Never goes idle.
        driver.script("%0", &["claude> ", "still thinking about it"]);

        let mut config = fast_config();
        config.stage_timeout = Duration::from_millis(30);
        let runner = PipelineRunner::new(driver, config);
        let pipeline = Pipeline {
            session: "main".into(),
            stages: vec![Stage::new(AgentKind::Claude, "forever")],
        };
        let err = runner
            .run(&pipeline, &CancellationToken::new())
            .await
            .expect_err("should time out");
        assert_eq!(err.stage, 0);
        assert_eq!(err.source.kind_id(), "timeout");
    }

    #[tokio::test]
    async fn awaiting_input_does_not_complete_stage() {
        let driver = Arc::new(FakeDriver::new(vec![pane("%0", AgentKind::Claude, None)]));
        // The agent pauses with a clarifying question; the stage must not
        // be treated as done.
        driver.script("%0", &["claude> ", "What would you like to do next?"]);

        let mut config = fast_config();
        config.stage_timeout = Duration::from_millis(30);
        let runner = PipelineRunner::new(driver, config);
        let pipeline = Pipeline {
            session: "main".into(),
            stages: vec![Stage::new(AgentKind::Claude, "go")],
        };
        let err = runner
            .run(&pipeline, &CancellationToken::new())
            .await
            .expect_err("stage should not complete on a clarifying question");
        assert_eq!(err.source.kind_id(), "timeout");
    }

    #[tokio::test]
    async fn cancellation_aborts_stage() {
        let driver = Arc::new(FakeDriver::new(vec![pane("%0", AgentKind::Claude, None)]));
        driver.script("%0", &["claude> ", "still thinking"]);

        let runner = PipelineRunner::new(driver, fast_config());
        let pipeline = Pipeline {
            session: "main".into(),
            stages: vec![Stage::new(AgentKind::Claude, "slow")],
        };
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            cancel_clone.cancel();
        });

        let err = runner
            .run(&pipeline, &cancel)
            .await
            .expect_err("should cancel");
        assert_eq!(err.source.kind_id(), "cancelled");
    }

    #[tokio::test]
    async fn vanished_pane_is_pane_lost() {
        struct VanishingDriver {
            calls: Mutex<u32>,
        }
        impl PaneDriver for VanishingDriver {
            fn list(&self, _session: &str) -> Result<Vec<PaneHandle>, DriverError> {
                Ok(vec![pane("%0", AgentKind::Claude, None)])
            }
            fn capture(&self, pane_id: &str, _lines: u32) -> Result<String, DriverError> {
                let mut calls = self.calls.lock().expect("lock");
                *calls += 1;
                if *calls == 1 {
                    Ok("claude> ".to_string())
                } else {
                    Err(DriverError::PaneNotFound(pane_id.to_string()))
                }
            }
            fn send(&self, _: &str, _: &str, _: bool) -> Result<(), DriverError> {
                Ok(())
            }
            fn kill(&self, _: &str) -> Result<(), DriverError> {
                Ok(())
            }
        }

        let runner = PipelineRunner::new(
            Arc::new(VanishingDriver {
                calls: Mutex::new(0),
            }),
            fast_config(),
        );
        let pipeline = Pipeline {
            session: "main".into(),
            stages: vec![Stage::new(AgentKind::Claude, "go")],
        };
        let err = runner
            .run(&pipeline, &CancellationToken::new())
            .await
            .expect_err("should fail");
        assert_eq!(err.source.kind_id(), "pane-lost");
    }

    #[tokio::test]
    async fn events_emitted_per_stage_and_on_completion() {
        let driver = Arc::new(FakeDriver::new(vec![pane("%0", AgentKind::Claude, None)]));
        driver.script("%0", &["claude> ", "claude> \nout\nclaude> "]);

        let bus = EventBus::default();
        let mut stream = bus.subscribe();
        let runner = PipelineRunner::new(driver, fast_config()).with_events(bus);
        let pipeline = Pipeline {
            session: "main".into(),
            stages: vec![Stage::new(AgentKind::Claude, "go")],
        };
        runner
            .run(&pipeline, &CancellationToken::new())
            .await
            .expect("pipeline should pass");

        let first = stream.recv().await.expect("stage event");
        assert_eq!(first.kind, EventKind::PipelineStageDone);
        let second = stream.recv().await.expect("done event");
        assert_eq!(second.kind, EventKind::PipelineDone);
    }

    #[test]
    fn compose_prompt_variants() {
        assert_eq!(compose_prompt("go", "", false), "go");
        assert_eq!(
            compose_prompt("go", "prev", true),
            "go\n\n(See previous output above)"
        );
        assert_eq!(
            compose_prompt("go", "prev", false),
            "go\n\nResult from previous stage:\nprev"
        );
    }
}
