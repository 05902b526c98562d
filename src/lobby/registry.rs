//! Connected participants and their readiness flags

use std::collections::HashMap;

use super::ParticipantId;

/// Set of currently connected participants, keyed by id.
///
/// Every mutator reports whether it actually changed anything so the
/// owner can decide whether a readiness republish is due. Unknown ids are
/// tolerated everywhere: a request that raced a disconnect simply becomes
/// a no-op.
#[derive(Debug, Default, Clone)]
pub struct ParticipantRegistry {
    ready: HashMap<ParticipantId, bool>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant with readiness `false`. No-op if already present.
    pub fn add(&mut self, id: ParticipantId) -> bool {
        if self.ready.contains_key(&id) {
            return false;
        }
        self.ready.insert(id, false);
        true
    }

    /// Remove a participant. No-op if absent.
    pub fn remove(&mut self, id: ParticipantId) -> bool {
        self.ready.remove(&id).is_some()
    }

    /// Set a participant's readiness. No-op if the participant is unknown.
    pub fn set_ready(&mut self, id: ParticipantId, ready: bool) -> bool {
        match self.ready.get_mut(&id) {
            Some(flag) => {
                *flag = ready;
                true
            }
            None => false,
        }
    }

    pub fn is_ready(&self, id: &ParticipantId) -> Option<bool> {
        self.ready.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    /// Iterate over `(id, ready)` pairs in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (ParticipantId, bool)> + '_ {
        self.ready.iter().map(|(id, ready)| (*id, *ready))
    }

    pub fn ids(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.ready.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn add_defaults_to_not_ready() {
        let mut registry = ParticipantRegistry::new();
        let id = Uuid::new_v4();
        assert!(registry.add(id));
        assert_eq!(registry.is_ready(&id), Some(false));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_add_keeps_existing_flag() {
        let mut registry = ParticipantRegistry::new();
        let id = Uuid::new_v4();
        registry.add(id);
        registry.set_ready(id, true);
        assert!(!registry.add(id));
        assert_eq!(registry.is_ready(&id), Some(true));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_ids_are_no_ops() {
        let mut registry = ParticipantRegistry::new();
        let ghost = Uuid::new_v4();
        assert!(!registry.set_ready(ghost, true));
        assert!(!registry.remove(ghost));
        assert!(registry.is_empty());
        assert_eq!(registry.is_ready(&ghost), None);
    }

    #[test]
    fn last_write_wins_per_key() {
        let mut registry = ParticipantRegistry::new();
        let id = Uuid::new_v4();
        registry.add(id);
        registry.set_ready(id, true);
        registry.set_ready(id, false);
        registry.set_ready(id, true);
        assert_eq!(registry.is_ready(&id), Some(true));
    }
}
