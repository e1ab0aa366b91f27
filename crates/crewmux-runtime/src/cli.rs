//! CLI definition using clap derive.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "crewmux", about = "coordinate AI coding agents across tmux panes")]
pub struct Cli {
    /// tmux socket path (passed through to tmux -S)
    #[arg(long, global = true)]
    pub tmux_socket: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Recommend or execute work assignments for idle agents
    Assign(AssignOpts),
    /// Show per-pane agent states
    Status(StatusOpts),
    /// Run a prompt pipeline across agents
    Run(RunOpts),
    /// Run the coordinator loop (state tracking + optional auto-assign)
    Daemon(DaemonOpts),
}

#[derive(clap::Args)]
pub struct AssignOpts {
    /// tmux session (falls back to $CREWMUX_SESSION)
    pub session: Option<String>,

    /// Execute the assignments instead of only printing them
    #[arg(long)]
    pub auto: bool,

    /// Assignment strategy: balanced, speed, quality, dependency
    #[arg(long, default_value = "balanced")]
    pub strategy: String,

    /// Comma-separated bead ids to consider (default: all open beads)
    #[arg(long)]
    pub beads: Option<String>,

    /// Machine-readable output
    #[arg(long)]
    pub json: bool,

    /// Work-graph CLI binary
    #[arg(long, default_value = "bead")]
    pub graph_bin: String,

    /// Project key for triage (default: current directory)
    #[arg(long)]
    pub project: Option<String>,
}

#[derive(clap::Args)]
pub struct StatusOpts {
    /// tmux session (falls back to $CREWMUX_SESSION)
    pub session: Option<String>,

    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
pub struct RunOpts {
    /// tmux session (falls back to $CREWMUX_SESSION)
    pub session: Option<String>,

    /// Pipeline stage as "<agent>:<prompt>" or "<agent>/<model>:<prompt>";
    /// repeat for multiple stages, executed in order
    #[arg(long = "stage", required = true)]
    pub stages: Vec<String>,

    /// Per-stage timeout in minutes
    #[arg(long, default_value = "30")]
    pub timeout_mins: u64,

    /// Print every stage's extracted output, not just the last
    #[arg(long)]
    pub all_outputs: bool,
}

#[derive(clap::Args)]
pub struct DaemonOpts {
    /// tmux session (falls back to $CREWMUX_SESSION)
    pub session: Option<String>,

    /// Tick interval in milliseconds
    #[arg(long, default_value = "1000")]
    pub tick_interval_ms: u64,

    /// Assign triaged work to idle agents automatically
    #[arg(long)]
    pub auto_assign: bool,

    /// Assignment strategy used with --auto-assign
    #[arg(long, default_value = "balanced")]
    pub strategy: String,

    /// Work-graph CLI binary
    #[arg(long, default_value = "bead")]
    pub graph_bin: String,

    /// Project key for triage (default: current directory)
    #[arg(long)]
    pub project: Option<String>,
}

/// Session from the positional argument or $CREWMUX_SESSION.
pub fn resolve_session(arg: Option<&str>) -> Option<String> {
    arg.map(str::to_string)
        .or_else(|| std::env::var("CREWMUX_SESSION").ok())
}
