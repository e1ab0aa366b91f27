//! File-reservation interface.
//!
//! Recommendations carry no file hints, so reservations are empty at
//! assignment time and accrue as an agent claims files. The service is
//! external; `Conflict` means someone else holds an overlapping pattern.

use crate::error::CoordinatorError;

pub trait ReservationService: Send + Sync {
    fn reserve(&self, agent_id: &str, patterns: &[String]) -> Result<(), CoordinatorError>;

    fn release(&self, agent_id: &str, patterns: &[String]) -> Result<(), CoordinatorError>;
}

/// In-process reservation table. Useful on its own for single-host setups
/// and as the fake in tests.
#[derive(Default)]
pub struct LocalReservations {
    held: std::sync::Mutex<Vec<(String, String)>>,
}

impl LocalReservations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held_by(&self, agent_id: &str) -> Vec<String> {
        self.held
            .lock()
            .expect("reservation lock")
            .iter()
            .filter(|(agent, _)| agent == agent_id)
            .map(|(_, pattern)| pattern.clone())
            .collect()
    }
}

impl ReservationService for LocalReservations {
    fn reserve(&self, agent_id: &str, patterns: &[String]) -> Result<(), CoordinatorError> {
        let mut held = self.held.lock().expect("reservation lock");
        for pattern in patterns {
            if let Some((holder, _)) = held
                .iter()
                .find(|(agent, p)| agent != agent_id && p == pattern)
            {
                return Err(CoordinatorError::Conflict(format!(
                    "{pattern} already reserved by {holder}"
                )));
            }
        }
        for pattern in patterns {
            if !held
                .iter()
                .any(|(agent, p)| agent == agent_id && p == pattern)
            {
                held.push((agent_id.to_string(), pattern.clone()));
            }
        }
        Ok(())
    }

    fn release(&self, agent_id: &str, patterns: &[String]) -> Result<(), CoordinatorError> {
        let mut held = self.held.lock().expect("reservation lock");
        held.retain(|(agent, p)| !(agent == agent_id && patterns.contains(p)));
        Ok(())
    }
}
