//! Session coordinator: discovers agents in panes, tracks their state,
//! matches idle agents to prioritized work, runs prompt pipelines, and
//! fans lifecycle events out to subscribers.
//!
//! External collaborators (pane driver, work-graph tool, mail service,
//! reservation service) are injected as narrow trait objects so every path
//! is testable with fakes.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod mail;
pub mod pipeline;
pub mod registry;
pub mod reserve;
pub mod session;
pub mod workgraph;

pub use config::{CoordinatorConfig, PipelineConfig};
pub use coordinator::{AssignmentOutcome, SessionCoordinator};
pub use error::{CoordinatorError, PipelineError};
pub use events::{CoordinatorEvent, EventBus, EventKind, EventStream};
pub use pipeline::{Pipeline, PipelineRunner, Stage};
