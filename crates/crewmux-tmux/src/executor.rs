//! TmuxCommandRunner trait and TmuxExecutor (sync subprocess wrapper).
//! The trait keeps every tmux interaction mock-injectable in tests.

use std::io::Write;
use std::process::{Command, Stdio};

use crate::error::TmuxError;

/// Trait for executing tmux commands.
pub trait TmuxCommandRunner: Send + Sync {
    fn run(&self, args: &[&str]) -> Result<String, TmuxError>;

    /// Run a tmux command with `stdin` piped in. Needed for `load-buffer -`
    /// so pasted prompts never pass through shell quoting.
    fn run_with_stdin(&self, args: &[&str], stdin: &str) -> Result<String, TmuxError>;
}

impl<T: TmuxCommandRunner + ?Sized> TmuxCommandRunner for &T {
    fn run(&self, args: &[&str]) -> Result<String, TmuxError> {
        (**self).run(args)
    }

    fn run_with_stdin(&self, args: &[&str], stdin: &str) -> Result<String, TmuxError> {
        (**self).run_with_stdin(args, stdin)
    }
}

/// Real tmux executor using `std::process::Command`.
pub struct TmuxExecutor {
    tmux_bin: String,
    socket_path: Option<String>,
    socket_name: Option<String>,
}

impl TmuxExecutor {
    pub fn new(tmux_bin: impl Into<String>) -> Self {
        Self {
            tmux_bin: tmux_bin.into(),
            socket_path: None,
            socket_name: None,
        }
    }

    #[must_use]
    pub fn with_socket_path(mut self, path: impl Into<String>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_socket_name(mut self, name: impl Into<String>) -> Self {
        self.socket_name = Some(name.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.tmux_bin);
        // Socket path takes precedence over socket name.
        if let Some(ref path) = self.socket_path {
            cmd.args(["-S", path]);
        } else if let Some(ref name) = self.socket_name {
            cmd.args(["-L", name]);
        }
        cmd
    }

    fn finish(output: std::process::Output) -> Result<String, TmuxError> {
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TmuxError::CommandFailed(format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for TmuxExecutor {
    fn default() -> Self {
        Self::new("tmux")
    }
}

impl TmuxCommandRunner for TmuxExecutor {
    fn run(&self, args: &[&str]) -> Result<String, TmuxError> {
        let mut cmd = self.command();
        cmd.args(args);
        let output = cmd.output().map_err(TmuxError::Io)?;
        Self::finish(output)
    }

    fn run_with_stdin(&self, args: &[&str], stdin: &str) -> Result<String, TmuxError> {
        let mut cmd = self.command();
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(TmuxError::Io)?;
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(stdin.as_bytes()).map_err(TmuxError::Io)?;
        }
        let output = child.wait_with_output().map_err(TmuxError::Io)?;
        Self::finish(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_executor() {
        let exec = TmuxExecutor::default();
        assert_eq!(exec.tmux_bin, "tmux");
        assert!(exec.socket_path.is_none());
        assert!(exec.socket_name.is_none());
    }

    #[test]
    fn with_socket_path() {
        let exec = TmuxExecutor::default().with_socket_path("/tmp/my.sock");
        assert_eq!(exec.socket_path, Some("/tmp/my.sock".to_string()));
    }

    #[test]
    fn with_socket_name() {
        let exec = TmuxExecutor::default().with_socket_name("myname");
        assert_eq!(exec.socket_name, Some("myname".to_string()));
    }

    #[test]
    fn blanket_ref_impl() {
        struct Mock;
        impl TmuxCommandRunner for Mock {
            fn run(&self, _args: &[&str]) -> Result<String, TmuxError> {
                Ok("ok".to_string())
            }
            fn run_with_stdin(&self, _args: &[&str], stdin: &str) -> Result<String, TmuxError> {
                Ok(stdin.to_string())
            }
        }
        let mock = Mock;
        let r: &Mock = &mock;
        assert_eq!(r.run(&[]).expect("ok"), "ok");
        assert_eq!(r.run_with_stdin(&[], "echo").expect("ok"), "echo");
    }
}
