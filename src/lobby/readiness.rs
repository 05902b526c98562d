//! Readiness aggregation over the participant registry

use serde::{Deserialize, Serialize};

use super::registry::ParticipantRegistry;

/// Derived readiness counts. Never mutated in place, always rebuilt from
/// the registry with [`aggregate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessSnapshot {
    pub ready_count: i32,
    pub total_count: i32,
}

impl ReadinessSnapshot {
    /// Consensus: at least one participant and every participant ready
    pub fn is_consensus(&self) -> bool {
        self.total_count > 0 && self.ready_count == self.total_count
    }
}

/// Count ready participants against the registry size
pub fn aggregate(registry: &ParticipantRegistry) -> ReadinessSnapshot {
    let ready_count = registry.iter().filter(|(_, ready)| *ready).count();
    ReadinessSnapshot {
        ready_count: ready_count as i32,
        total_count: registry.len() as i32,
    }
}
