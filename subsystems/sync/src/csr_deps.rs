//! Dependencies a command stream receiver must wait on before running new work

use arrayvec::ArrayVec;

use forge_core::{Error, Result};

use crate::container::TimestampPacketContainer;

/// Containers tracked per submission before the list is full
pub const MAX_DEPENDENCY_CONTAINERS: usize = 32;

/// Borrowed view of every container a submission waits on
#[derive(Debug, Default)]
pub struct CsrDependencies<'a> {
    /// Same-device producers
    pub timestamp_packet_container: ArrayVec<&'a TimestampPacketContainer, MAX_DEPENDENCY_CONTAINERS>,
    /// Producers on other root devices
    pub multi_root_time_stamp_sync_container:
        ArrayVec<&'a TimestampPacketContainer, MAX_DEPENDENCY_CONTAINERS>,
}

impl<'a> CsrDependencies<'a> {
    /// Nothing to wait on
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait on a same-device container
    pub fn push_timestamp_packet_container(
        &mut self,
        container: &'a TimestampPacketContainer,
    ) -> Result<()> {
        self.timestamp_packet_container
            .try_push(container)
            .map_err(|_| Error::InvalidParameter)
    }

    /// Wait on a container signaled by another root device
    pub fn push_multi_root_sync_container(
        &mut self,
        container: &'a TimestampPacketContainer,
    ) -> Result<()> {
        self.multi_root_time_stamp_sync_container
            .try_push(container)
            .map_err(|_| Error::InvalidParameter)
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.timestamp_packet_container.is_empty()
            && self.multi_root_time_stamp_sync_container.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_bounded() {
        let container = TimestampPacketContainer::new();
        let mut deps = CsrDependencies::new();
        assert!(deps.is_empty());

        for _ in 0..MAX_DEPENDENCY_CONTAINERS {
            deps.push_timestamp_packet_container(&container).unwrap();
        }
        assert_eq!(
            deps.push_timestamp_packet_container(&container),
            Err(Error::InvalidParameter)
        );
        deps.push_multi_root_sync_container(&container).unwrap();
        assert_eq!(deps.multi_root_time_stamp_sync_container.len(), 1);
    }
}
