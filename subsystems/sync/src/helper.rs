//! # Dependency Programming
//!
//! Turns tag nodes into waits in a consumer's command stream. The consumer
//! engine blocks until each producer overwrites the sentinel in its
//! context end field; the CPU never waits.
//!
//! Every `program_*` function has a `get_required_cmd_stream_size*`
//! counterpart computed from the same node set. Callers reserve that many
//! bytes first; emission writes exactly that many.

use forge_command::LinearStream;
use forge_core::{unrecoverable_if, Result, RootDeviceEnvironment};

use crate::container::TimestampPacketDependencies;
use crate::csr_deps::CsrDependencies;
use crate::encoder::{CompareOperation, DependencyEncoder, PostSyncMode};
use crate::tag_allocator::TagNode;
use crate::timestamp_packet::INITIAL_VALUE;

/// Which way an auxiliary surface translation goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxTranslationDirection {
    /// No translation
    None,
    /// Compressed to plain, before the kernel
    AuxToNonAux,
    /// Plain back to compressed, after the kernel
    NonAuxToAux,
}

// =============================================================================
// EMISSION
// =============================================================================

/// One wait per packet the node uses
pub fn program_semaphore<E: DependencyEncoder>(
    stream: &mut LinearStream,
    node: &TagNode,
) -> Result<()> {
    let compare_address = node.context_end_gpu_address();

    for packet in 0..u64::from(node.packets_used()) {
        let offset = packet * node.single_packet_size() as u64;
        E::add_semaphore_wait(
            stream,
            compare_address.offset(offset),
            INITIAL_VALUE,
            CompareOperation::SadNotEqualSdd,
        )?;
    }
    Ok(())
}

/// Waits for every node of every same-device container
pub fn program_csr_dependencies_for_timestamp_packet_container<E: DependencyEncoder>(
    stream: &mut LinearStream,
    csr_dependencies: &CsrDependencies<'_>,
) -> Result<()> {
    for container in &csr_dependencies.timestamp_packet_container {
        for node in container.peek_nodes() {
            program_semaphore::<E>(stream, node)?;
        }
    }
    Ok(())
}

/// Waits for every node signaled by another root device
pub fn program_csr_dependencies_for_multi_root_device_sync_container<E: DependencyEncoder>(
    stream: &mut LinearStream,
    csr_dependencies: &CsrDependencies<'_>,
) -> Result<()> {
    for container in &csr_dependencies.multi_root_time_stamp_sync_container {
        for node in container.peek_nodes() {
            program_semaphore::<E>(stream, node)?;
        }
    }
    Ok(())
}

/// Waits for the translation blits of `direction`
///
/// Before translating back to auxiliary, the single cache flush node is
/// signaled through a flushing barrier so the kernel's writes are visible
/// to the blitter.
pub fn program_semaphore_for_aux_translation<E: DependencyEncoder>(
    stream: &mut LinearStream,
    dependencies: &TimestampPacketDependencies,
    direction: AuxTranslationDirection,
    env: &RootDeviceEnvironment,
) -> Result<()> {
    let container = match direction {
        AuxTranslationDirection::AuxToNonAux => &dependencies.aux_to_non_aux_nodes,
        _ => &dependencies.non_aux_to_aux_nodes,
    };

    let cache_flush_nodes = dependencies.cache_flush_nodes.peek_nodes();
    if direction == AuxTranslationDirection::NonAuxToAux && !cache_flush_nodes.is_empty() {
        unrecoverable_if(cache_flush_nodes.len() != 1, "more than one cache flush node");
        E::add_barrier_with_post_sync(
            stream,
            PostSyncMode::ImmediateData,
            cache_flush_nodes[0].context_end_gpu_address(),
            0,
            E::dc_flush_enable(env),
        )?;
    }

    for node in container.peek_nodes() {
        program_semaphore::<E>(stream, node)?;
    }
    Ok(())
}

// =============================================================================
// SIZES
// =============================================================================

/// Bytes [`program_semaphore`] writes for `node`
pub fn get_required_cmd_stream_size_for_node_dependency<E: DependencyEncoder>(node: &TagNode) -> usize {
    node.packets_used() as usize * E::SEMAPHORE_WAIT_SIZE
}

/// Bytes one blit-engine node costs. Blits always use a single packet.
pub fn get_required_cmd_stream_size_for_node_dependency_with_blit_enqueue<E: DependencyEncoder>() -> usize {
    E::SEMAPHORE_WAIT_SIZE
}

/// Bytes [`program_csr_dependencies_for_timestamp_packet_container`] writes
pub fn get_required_cmd_stream_size<E: DependencyEncoder>(csr_dependencies: &CsrDependencies<'_>) -> usize {
    csr_dependencies
        .timestamp_packet_container
        .iter()
        .flat_map(|container| container.peek_nodes())
        .map(get_required_cmd_stream_size_for_node_dependency::<E>)
        .sum()
}

/// Bytes [`program_csr_dependencies_for_multi_root_device_sync_container`] writes
pub fn get_required_cmd_stream_size_for_multi_root_device_sync_nodes_container<E: DependencyEncoder>(
    csr_dependencies: &CsrDependencies<'_>,
) -> usize {
    csr_dependencies
        .multi_root_time_stamp_sync_container
        .iter()
        .flat_map(|container| container.peek_nodes())
        .map(get_required_cmd_stream_size_for_node_dependency::<E>)
        .sum()
}

/// Bytes [`program_semaphore_for_aux_translation`] writes for `count`
/// single-packet blit nodes
pub fn get_required_cmd_stream_size_for_aux_translation_node_dependency<E: DependencyEncoder>(
    count: usize,
    direction: AuxTranslationDirection,
    cache_flush_required: bool,
) -> usize {
    let mut size = count * get_required_cmd_stream_size_for_node_dependency_with_blit_enqueue::<E>();

    if direction == AuxTranslationDirection::NonAuxToAux && cache_flush_required {
        size += E::BARRIER_WITH_POST_SYNC_SIZE;
    }
    size
}
