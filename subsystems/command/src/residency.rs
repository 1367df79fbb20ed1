//! Residency set
//!
//! Allocations that must be resident while a container's buffers execute.
//! Insertion order carries no meaning.

use alloc::vec::Vec;

use hashbrown::HashSet;

use forge_memory::AllocationId;

/// Deduplicated set of allocations
#[derive(Debug, Default)]
pub struct ResidencyContainer {
    allocations: HashSet<AllocationId>,
}

impl ResidencyContainer {
    /// Empty set with room for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            allocations: HashSet::with_capacity(capacity),
        }
    }

    /// Add an allocation. Returns false if it was already present.
    pub fn insert(&mut self, id: AllocationId) -> bool {
        self.allocations.insert(id)
    }

    /// Drop an allocation
    pub fn remove(&mut self, id: AllocationId) -> bool {
        self.allocations.remove(&id)
    }

    /// Membership test
    pub fn contains(&self, id: AllocationId) -> bool {
        self.allocations.contains(&id)
    }

    /// Number of allocations
    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.allocations.clear();
    }

    /// Iterate in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = AllocationId> + '_ {
        self.allocations.iter().copied()
    }

    /// Sorted snapshot for the submission layer
    pub fn to_vec(&self) -> Vec<AllocationId> {
        let mut ids: Vec<AllocationId> = self.iter().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_semantics() {
        let mut residency = ResidencyContainer::with_capacity(4);
        assert!(residency.insert(AllocationId::new(3)));
        assert!(residency.insert(AllocationId::new(1)));
        assert!(!residency.insert(AllocationId::new(3)));

        assert_eq!(residency.len(), 2);
        assert_eq!(residency.to_vec(), [AllocationId::new(1), AllocationId::new(3)]);
    }
}
