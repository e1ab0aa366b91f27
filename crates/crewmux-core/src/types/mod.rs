mod agent;
mod persona;
mod work;

pub use agent::{AgentKind, AgentSnapshot, AgentState, StateReading};
pub use persona::PersonaProfile;
pub use work::{ScoreBreakdown, TriageResponse, WorkItem, WorkKind};
