//! Ordered sets of tag nodes a command depends on or signals

use alloc::vec::Vec;

use forge_core::Result;

use crate::tag_allocator::{TagAllocator, TagNode};

// =============================================================================
// TIMESTAMP PACKET CONTAINER
// =============================================================================

/// Nodes held by one owner
///
/// Every node in the container carries one reference the container must
/// give back through [`release`](Self::release). Sharing nodes with another
/// container goes through
/// [`assign_and_increment_nodes_ref_counts`](Self::assign_and_increment_nodes_ref_counts).
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TimestampPacketContainer {
    nodes: Vec<TagNode>,
}

impl TimestampPacketContainer {
    /// Empty container
    pub const fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Adopt a node together with its reference
    pub fn add(&mut self, node: TagNode) {
        self.nodes.push(node);
    }

    /// Nodes in insertion order
    #[inline]
    pub fn peek_nodes(&self) -> &[TagNode] {
        &self.nodes
    }

    /// Number of nodes
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether there are no nodes
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Hand every node and its reference to `target`
    pub fn move_nodes_to_new_container(&mut self, target: &mut TimestampPacketContainer) {
        target.nodes.append(&mut self.nodes);
    }

    /// Share the nodes of `source`, taking a reference on each
    pub fn assign_and_increment_nodes_ref_counts(
        &mut self,
        source: &TimestampPacketContainer,
        pool: &mut TagAllocator,
    ) -> Result<()> {
        self.nodes.reserve(source.nodes.len());
        for node in &source.nodes {
            pool.increment_ref_count(node)?;
            self.nodes.push(node.clone());
        }
        Ok(())
    }

    /// Give every reference back to the pool
    pub fn release(&mut self, pool: &mut TagAllocator) -> Result<()> {
        for node in self.nodes.drain(..) {
            pool.return_tag(&node)?;
        }
        Ok(())
    }
}

// =============================================================================
// DEPENDENCIES OF ONE ENQUEUE
// =============================================================================

/// Nodes an enqueue has to order against, by reason
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TimestampPacketDependencies {
    /// Previous enqueue on the same queue
    pub previous_enqueue_nodes: TimestampPacketContainer,
    /// Barrier between enqueues
    pub barrier_nodes: TimestampPacketContainer,
    /// Blits translating auxiliary surfaces to plain ones
    pub aux_to_non_aux_nodes: TimestampPacketContainer,
    /// Blits translating plain surfaces back to auxiliary ones
    pub non_aux_to_aux_nodes: TimestampPacketContainer,
    /// Cache flush between the kernel and the translation back
    pub cache_flush_nodes: TimestampPacketContainer,
}

impl TimestampPacketDependencies {
    /// Release every container
    pub fn release(&mut self, pool: &mut TagAllocator) -> Result<()> {
        self.previous_enqueue_nodes.release(pool)?;
        self.barrier_nodes.release(pool)?;
        self.aux_to_non_aux_nodes.release(pool)?;
        self.non_aux_to_aux_nodes.release(pool)?;
        self.cache_flush_nodes.release(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::sync::Arc;
    use forge_core::hw_info::{HardwareInfo, ProductFamily, Stepping};
    use forge_core::RootDeviceEnvironment;
    use forge_memory::{Device, SystemMemoryManager};

    use crate::tag_allocator::{TagAllocatorConfig, TagState};

    fn pool() -> TagAllocator {
        let env = Arc::new(RootDeviceEnvironment::new(HardwareInfo::new(
            ProductFamily::Dg2,
            Stepping::B0,
        )));
        let device = Arc::new(Device::new(0, env, Box::new(SystemMemoryManager::new())));
        TagAllocator::new(device, TagAllocatorConfig::default())
    }

    #[test]
    fn test_move_transfers_without_new_references() {
        let mut pool = pool();
        let mut source = TimestampPacketContainer::new();
        source.add(pool.get_tag().unwrap());
        source.add(pool.get_tag().unwrap());

        let mut target = TimestampPacketContainer::new();
        source.move_nodes_to_new_container(&mut target);

        assert!(source.is_empty());
        assert_eq!(target.len(), 2);
        assert_eq!(pool.ref_count(&target.peek_nodes()[0]).unwrap(), 1);
    }

    #[test]
    fn test_assign_shares_nodes() {
        let mut pool = pool();
        let mut owner = TimestampPacketContainer::new();
        owner.add(pool.get_tag().unwrap());

        let mut consumer = TimestampPacketContainer::new();
        consumer
            .assign_and_increment_nodes_ref_counts(&owner, &mut pool)
            .unwrap();
        let node = consumer.peek_nodes()[0].clone();
        assert_eq!(pool.ref_count(&node).unwrap(), 2);

        owner.release(&mut pool).unwrap();
        assert_eq!(pool.state(&node).unwrap(), TagState::CheckedOut);
        consumer.release(&mut pool).unwrap();
        assert_eq!(pool.state(&node).unwrap(), TagState::Free);
    }

    #[test]
    fn test_dependencies_release_everything() {
        let mut pool = pool();
        let mut deps = TimestampPacketDependencies::default();
        deps.barrier_nodes.add(pool.get_tag().unwrap());
        deps.cache_flush_nodes.add(pool.get_tag().unwrap());
        let free_before = pool.free_count();

        deps.release(&mut pool).unwrap();
        assert!(deps.barrier_nodes.is_empty());
        assert!(deps.cache_flush_nodes.is_empty());
        assert_eq!(pool.free_count(), free_before + 2);
    }
}
