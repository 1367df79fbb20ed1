//! # State Base Address Properties
//!
//! Surface, dynamic and indirect base addresses are programmed on every
//! generation and are never gated. Binding table pool base and size are
//! gated together.

use forge_core::RootDeviceEnvironment;

use crate::stream_property::StreamProperty;

/// Inputs of [`StateBaseAddressProperties::set_properties_all`]
///
/// `None` leaves the tracked value as is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateBaseAddressValues {
    /// Global atomics
    pub global_atomics: bool,
    /// Stateless MOCS index
    pub stateless_mocs: Option<u32>,
    /// Binding table pool base
    pub binding_table_pool_base_address: Option<u64>,
    /// Binding table pool size
    pub binding_table_pool_size: Option<usize>,
    /// Surface state base
    pub surface_state_base_address: Option<u64>,
    /// Surface state size
    pub surface_state_size: Option<usize>,
    /// Dynamic state base
    pub dynamic_state_base_address: Option<u64>,
    /// Dynamic state size
    pub dynamic_state_size: Option<usize>,
    /// Indirect object base
    pub indirect_object_base_address: Option<u64>,
    /// Indirect object size
    pub indirect_object_size: Option<usize>,
}

/// STATE_BASE_ADDRESS fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateBaseAddressProperties {
    /// Global atomics
    pub global_atomics: StreamProperty<bool>,
    /// Stateless MOCS index
    pub stateless_mocs: StreamProperty<u32>,
    /// Binding table pool base
    pub binding_table_pool_base_address: StreamProperty<u64>,
    /// Binding table pool size
    pub binding_table_pool_size: StreamProperty<usize>,
    /// Surface state base
    pub surface_state_base_address: StreamProperty<u64>,
    /// Surface state size
    pub surface_state_size: StreamProperty<usize>,
    /// Dynamic state base
    pub dynamic_state_base_address: StreamProperty<u64>,
    /// Dynamic state size
    pub dynamic_state_size: StreamProperty<usize>,
    /// Indirect object base
    pub indirect_object_base_address: StreamProperty<u64>,
    /// Indirect object size
    pub indirect_object_size: StreamProperty<usize>,
    support_loaded: bool,
}

impl Default for StateBaseAddressProperties {
    fn default() -> Self {
        Self::new()
    }
}

impl StateBaseAddressProperties {
    /// Nothing programmed. Only the ungated bases are settable.
    pub const fn new() -> Self {
        Self {
            global_atomics: StreamProperty::gated(),
            stateless_mocs: StreamProperty::gated(),
            binding_table_pool_base_address: StreamProperty::gated(),
            binding_table_pool_size: StreamProperty::gated(),
            surface_state_base_address: StreamProperty::ungated(),
            surface_state_size: StreamProperty::ungated(),
            dynamic_state_base_address: StreamProperty::ungated(),
            dynamic_state_size: StreamProperty::ungated(),
            indirect_object_base_address: StreamProperty::ungated(),
            indirect_object_size: StreamProperty::ungated(),
            support_loaded: false,
        }
    }

    /// Load the supported flags. Runs once.
    pub fn init_support(&mut self, env: &RootDeviceEnvironment) {
        if self.support_loaded {
            return;
        }
        let support = env.state_base_address_properties_support();
        self.global_atomics.supported = support.global_atomics;
        self.stateless_mocs.supported = support.stateless_mocs;
        self.binding_table_pool_base_address.supported = support.binding_table_pool_base_address;
        self.binding_table_pool_size.supported = support.binding_table_pool_base_address;
        self.support_loaded = true;
    }

    /// Recompute every field
    pub fn set_properties_all(&mut self, values: &StateBaseAddressValues, env: &RootDeviceEnvironment) {
        self.init_support(env);
        self.clear_is_dirty();

        self.global_atomics.set(Some(values.global_atomics));
        self.stateless_mocs.set(values.stateless_mocs);
        self.binding_table_pool_base_address
            .set(values.binding_table_pool_base_address);
        self.binding_table_pool_size.set(values.binding_table_pool_size);

        self.surface_state_base_address
            .set(values.surface_state_base_address);
        self.surface_state_size.set(values.surface_state_size);
        self.dynamic_state_base_address
            .set(values.dynamic_state_base_address);
        self.dynamic_state_size.set(values.dynamic_state_size);
        self.indirect_object_base_address
            .set(values.indirect_object_base_address);
        self.indirect_object_size.set(values.indirect_object_size);
    }

    /// Binding table pool and surface state heap
    pub fn set_properties_surface_state(
        &mut self,
        binding_table_pool_base_address: u64,
        binding_table_pool_size: usize,
        surface_state_base_address: u64,
        surface_state_size: usize,
        env: &RootDeviceEnvironment,
    ) {
        self.init_support(env);

        self.binding_table_pool_base_address.clear_dirty();
        self.binding_table_pool_size.clear_dirty();
        self.surface_state_base_address.clear_dirty();
        self.surface_state_size.clear_dirty();

        self.binding_table_pool_base_address
            .set(Some(binding_table_pool_base_address));
        self.binding_table_pool_size.set(Some(binding_table_pool_size));
        self.surface_state_base_address
            .set(Some(surface_state_base_address));
        self.surface_state_size.set(Some(surface_state_size));
    }

    /// Dynamic state heap
    pub fn set_properties_dynamic_state(&mut self, base_address: u64, size: usize) {
        self.dynamic_state_base_address.clear_dirty();
        self.dynamic_state_size.clear_dirty();
        self.dynamic_state_base_address.set(Some(base_address));
        self.dynamic_state_size.set(Some(size));
    }

    /// Indirect object heap
    pub fn set_properties_indirect_state(&mut self, base_address: u64, size: usize) {
        self.indirect_object_base_address.clear_dirty();
        self.indirect_object_size.clear_dirty();
        self.indirect_object_base_address.set(Some(base_address));
        self.indirect_object_size.set(Some(size));
    }

    /// Only the stateless MOCS index
    pub fn set_property_stateless_mocs(&mut self, stateless_mocs: u32, env: &RootDeviceEnvironment) {
        self.init_support(env);

        self.stateless_mocs.clear_dirty();
        self.stateless_mocs.set(Some(stateless_mocs));
    }

    /// Only global atomics. With `clear_dirty_state` the value is tracked
    /// but no change is reported.
    pub fn set_property_global_atomics(
        &mut self,
        global_atomics: bool,
        env: &RootDeviceEnvironment,
        clear_dirty_state: bool,
    ) {
        self.init_support(env);

        if !clear_dirty_state {
            self.global_atomics.clear_dirty();
        }
        self.global_atomics.set(Some(global_atomics));
        if clear_dirty_state {
            self.global_atomics.clear_dirty();
        }
    }

    /// Copy another receiver's state
    pub fn set_properties(&mut self, other: &Self) {
        self.clear_is_dirty();

        self.global_atomics.copy_from(&other.global_atomics);
        self.stateless_mocs.copy_from(&other.stateless_mocs);
        self.binding_table_pool_base_address
            .copy_from(&other.binding_table_pool_base_address);
        self.binding_table_pool_size
            .copy_from(&other.binding_table_pool_size);

        self.surface_state_base_address
            .copy_from(&other.surface_state_base_address);
        self.surface_state_size.copy_from(&other.surface_state_size);
        self.dynamic_state_base_address
            .copy_from(&other.dynamic_state_base_address);
        self.dynamic_state_size.copy_from(&other.dynamic_state_size);
        self.indirect_object_base_address
            .copy_from(&other.indirect_object_base_address);
        self.indirect_object_size.copy_from(&other.indirect_object_size);
    }

    /// Whether any field must be re-emitted
    pub fn is_dirty(&self) -> bool {
        self.global_atomics.is_dirty
            || self.stateless_mocs.is_dirty
            || self.binding_table_pool_base_address.is_dirty
            || self.binding_table_pool_size.is_dirty
            || self.surface_state_base_address.is_dirty
            || self.surface_state_size.is_dirty
            || self.dynamic_state_base_address.is_dirty
            || self.dynamic_state_size.is_dirty
            || self.indirect_object_base_address.is_dirty
            || self.indirect_object_size.is_dirty
    }

    /// Forget every pending change
    pub fn clear_is_dirty(&mut self) {
        self.global_atomics.clear_dirty();
        self.stateless_mocs.clear_dirty();
        self.binding_table_pool_base_address.clear_dirty();
        self.binding_table_pool_size.clear_dirty();
        self.surface_state_base_address.clear_dirty();
        self.surface_state_size.clear_dirty();
        self.dynamic_state_base_address.clear_dirty();
        self.dynamic_state_size.clear_dirty();
        self.indirect_object_base_address.clear_dirty();
        self.indirect_object_size.clear_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::hw_info::{HardwareInfo, ProductFamily, Stepping};

    fn gen11() -> RootDeviceEnvironment {
        RootDeviceEnvironment::new(HardwareInfo::new(ProductFamily::Icelake, Stepping::A0))
    }

    #[test]
    fn test_ungated_bases_always_set() {
        let env = gen11();
        let mut props = StateBaseAddressProperties::new();
        props.set_properties_surface_state(0x2000, 0x100, 0x1_0000, 0x1000, &env);

        assert_eq!(props.surface_state_base_address.value, Some(0x1_0000));
        assert_eq!(props.surface_state_size.value, Some(0x1000));
        assert_eq!(props.binding_table_pool_base_address.value, None);
        assert_eq!(props.binding_table_pool_size.value, None);

        props.set_properties_dynamic_state(0x3_0000, 0x2000);
        props.set_properties_indirect_state(0x4_0000, 0x3000);
        assert!(props.dynamic_state_base_address.is_dirty);
        assert!(props.indirect_object_size.is_dirty);
    }

    #[test]
    fn test_binding_table_pool_gated_together() {
        let env = RootDeviceEnvironment::new(HardwareInfo::new(ProductFamily::Tigerlake, Stepping::A0));
        let mut props = StateBaseAddressProperties::new();
        props.set_properties_surface_state(0x2000, 0x100, 0x1_0000, 0x1000, &env);
        assert_eq!(props.binding_table_pool_base_address.value, Some(0x2000));
        assert_eq!(props.binding_table_pool_size.value, Some(0x100));
    }

    #[test]
    fn test_set_properties_all_honors_support() {
        let env = gen11();
        let mut props = StateBaseAddressProperties::new();
        let values = StateBaseAddressValues {
            global_atomics: true,
            stateless_mocs: Some(2),
            surface_state_base_address: Some(0x1_0000),
            ..StateBaseAddressValues::default()
        };
        props.set_properties_all(&values, &env);

        assert_eq!(props.global_atomics.value, None);
        assert!(!props.global_atomics.is_dirty);
        assert_eq!(props.stateless_mocs.value, Some(2));
        assert_eq!(props.dynamic_state_base_address.value, None);
        assert!(props.is_dirty());

        props.set_properties_all(&values, &env);
        assert!(!props.is_dirty());
    }

    #[test]
    fn test_global_atomics_clear_dirty_state() {
        let env = RootDeviceEnvironment::new(HardwareInfo::new(ProductFamily::PonteVecchio, Stepping::B0));
        let mut props = StateBaseAddressProperties::new();
        props.set_property_global_atomics(true, &env, true);
        assert_eq!(props.global_atomics.value, Some(true));
        assert!(!props.is_dirty());

        props.set_property_global_atomics(false, &env, false);
        assert!(props.global_atomics.is_dirty);

        props.set_property_stateless_mocs(1, &env);
        assert!(props.global_atomics.is_dirty);
        assert!(props.stateless_mocs.is_dirty);
    }
}
