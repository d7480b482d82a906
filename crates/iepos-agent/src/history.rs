//! Bounded cross-phase history
//!
//! Maps phase timestamps to the finalized [`AgentPlans`] of that phase,
//! ordered by phase. Inserting past capacity evicts the oldest phase.

use std::collections::BTreeMap;

use iepos_common::{AgentPlans, ConfigError, Phase, Result};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HistoryStore {
    /// Maximum number of retained phases
    capacity: usize,
    entries: BTreeMap<Phase, AgentPlans>,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ConfigError::InvalidHistorySize.into());
        }
        Ok(Self {
            capacity,
            entries: BTreeMap::new(),
        })
    }

    /// Archive `plans` under `phase`, replacing any earlier entry for it
    pub fn insert(&mut self, phase: Phase, plans: AgentPlans) {
        self.entries.insert(phase, plans);
        self.evict_over_capacity();
    }

    /// Drop oldest phases until within capacity
    pub fn evict_over_capacity(&mut self) {
        while self.entries.len() > self.capacity {
            if let Some((phase, _)) = self.entries.pop_first() {
                debug!(%phase, "Evicted oldest history entry");
            }
        }
    }

    pub fn get(&self, phase: &Phase) -> Option<&AgentPlans> {
        self.entries.get(phase)
    }

    /// Most recent archived phase
    pub fn latest(&self) -> Option<(&Phase, &AgentPlans)> {
        self.entries.last_key_value()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
