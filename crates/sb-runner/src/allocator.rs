//! Device slot assignment.

use sb_types::{DeviceSlot, TrialSpec};

/// Slot for the trial at input position `index`: `index mod pool_size`.
///
/// Pure and deterministic; a pool size of zero is treated as one.
pub fn assign(index: usize, pool_size: usize) -> DeviceSlot {
    DeviceSlot(index % pool_size.max(1))
}

/// Up-front device plan for a batch of trials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAllocation {
    /// Number of workers actually started (never more than there are trials).
    pub num_workers: usize,

    pub pool_size: usize,

    /// `(trial name, slot)` in submission order.
    pub assignments: Vec<(String, DeviceSlot)>,
}

impl DeviceAllocation {
    pub fn round_robin(specs: &[TrialSpec], pool_size: usize) -> Self {
        let pool_size = pool_size.max(1);
        let assignments = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.name().to_string(), assign(i, pool_size)))
            .collect();
        Self {
            num_workers: pool_size.min(specs.len()),
            pool_size,
            assignments,
        }
    }

    pub fn slot_for(&self, trial_name: &str) -> Option<DeviceSlot> {
        self.assignments
            .iter()
            .find(|(name, _)| name == trial_name)
            .map(|(_, slot)| *slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(names: &[&str]) -> Vec<TrialSpec> {
        names
            .iter()
            .map(|n| TrialSpec::new(*n, "").unwrap())
            .collect()
    }

    #[test]
    fn assign_is_index_mod_pool() {
        for pool in 1..6 {
            for i in 0..20 {
                assert_eq!(assign(i, pool), DeviceSlot(i % pool));
            }
        }
        assert_eq!(assign(7, 0), DeviceSlot(0));
    }

    #[test]
    fn three_trials_two_slots() {
        let alloc = DeviceAllocation::round_robin(&specs(&["a", "b", "c"]), 2);
        assert_eq!(alloc.slot_for("a"), Some(DeviceSlot(0)));
        assert_eq!(alloc.slot_for("b"), Some(DeviceSlot(1)));
        assert_eq!(alloc.slot_for("c"), Some(DeviceSlot(0)));
        assert_eq!(alloc.slot_for("d"), None);
        assert_eq!(alloc.num_workers, 2);
    }

    #[test]
    fn workers_capped_at_trial_count() {
        let alloc = DeviceAllocation::round_robin(&specs(&["a", "b", "c"]), 10);
        assert_eq!(alloc.num_workers, 3);
        assert_eq!(alloc.pool_size, 10);
    }
}
