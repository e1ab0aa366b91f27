//! tmux backend: subprocess executor, pane listing, capture, and keystroke
//! injection. Implements [`crewmux_core::driver::PaneDriver`].

mod driver;
mod error;
mod executor;
mod ops;
mod pane;

pub use driver::TmuxDriver;
pub use error::TmuxError;
pub use executor::{TmuxCommandRunner, TmuxExecutor};
pub use ops::{capture_pane, kill_session, send_text};
pub use pane::{list_panes, parse_list_panes_output, TmuxPane, LIST_PANES_FORMAT};
