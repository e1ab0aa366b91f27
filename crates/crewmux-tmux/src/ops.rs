//! Pane capture, text injection, and session teardown.

use crate::error::TmuxError;
use crate::executor::TmuxCommandRunner;

/// Capture the last `lines` lines of terminal output from a pane.
pub fn capture_pane(
    runner: &impl TmuxCommandRunner,
    pane_id: &str,
    lines: u32,
) -> Result<String, TmuxError> {
    let start_line = format!("-{lines}");
    runner.run(&["capture-pane", "-p", "-S", &start_line, "-t", pane_id])
}

/// Paste `text` into a pane, optionally pressing Enter.
///
/// The text goes through `load-buffer -` / `paste-buffer` so it reaches the
/// pane verbatim, including newlines and shell metacharacters. Delivery is
/// at-most-once: a failure after `paste-buffer` is reported, not retried.
pub fn send_text(
    runner: &impl TmuxCommandRunner,
    pane_id: &str,
    text: &str,
    submit: bool,
) -> Result<(), TmuxError> {
    runner.run_with_stdin(&["load-buffer", "-"], text)?;
    runner.run(&["paste-buffer", "-d", "-t", pane_id])?;
    if submit {
        runner.run(&["send-keys", "-t", pane_id, "Enter"])?;
    }
    Ok(())
}

/// Kill an entire tmux session.
pub fn kill_session(runner: &impl TmuxCommandRunner, session: &str) -> Result<(), TmuxError> {
    runner.run(&["kill-session", "-t", session])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every tmux invocation for assertion.
    struct RecordingRunner {
        calls: Mutex<Vec<(Vec<String>, Option<String>)>>,
    }

    impl RecordingRunner {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(Vec<String>, Option<String>)> {
            self.calls.lock().expect("lock").clone()
        }
    }

    impl TmuxCommandRunner for RecordingRunner {
        fn run(&self, args: &[&str]) -> Result<String, TmuxError> {
            self.calls
                .lock()
                .expect("lock")
                .push((args.iter().map(|s| s.to_string()).collect(), None));
            Ok("captured output\n".to_string())
        }

        fn run_with_stdin(&self, args: &[&str], stdin: &str) -> Result<String, TmuxError> {
            self.calls.lock().expect("lock").push((
                args.iter().map(|s| s.to_string()).collect(),
                Some(stdin.to_string()),
            ));
            Ok(String::new())
        }
    }

    #[test]
    fn capture_uses_negative_start_line() {
        let runner = RecordingRunner::new();
        let out = capture_pane(&runner, "%3", 2000).expect("should capture");
        assert_eq!(out, "captured output\n");

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.contains(&"-2000".to_string()));
        assert!(calls[0].0.contains(&"%3".to_string()));
    }

    #[test]
    fn send_text_pastes_then_submits() {
        let runner = RecordingRunner::new();
        send_text(&runner, "%1", "do the thing\nwith two lines", true).expect("should send");

        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].0[0], "load-buffer");
        assert_eq!(
            calls[0].1.as_deref(),
            Some("do the thing\nwith two lines"),
            "prompt goes through stdin verbatim"
        );
        assert_eq!(calls[1].0[0], "paste-buffer");
        assert_eq!(calls[2].0[0], "send-keys");
        assert!(calls[2].0.contains(&"Enter".to_string()));
    }

    #[test]
    fn send_text_without_submit() {
        let runner = RecordingRunner::new();
        send_text(&runner, "%1", "draft only", false).expect("should send");
        let calls = runner.calls();
        assert_eq!(calls.len(), 2, "no Enter keypress");
    }

    #[test]
    fn kill_session_targets_session() {
        let runner = RecordingRunner::new();
        kill_session(&runner, "workbench").expect("should kill");
        let calls = runner.calls();
        assert_eq!(calls[0].0[0], "kill-session");
        assert!(calls[0].0.contains(&"workbench".to_string()));
    }
}
