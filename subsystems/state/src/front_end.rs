//! Front end state properties

use forge_core::RootDeviceEnvironment;

use crate::stream_property::StreamProperty;

/// Front end state fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontEndProperties {
    /// Compute dispatch all walker, set for cooperative kernels
    pub compute_dispatch_all_walker_enable: StreamProperty<bool>,
    /// Disable EU fusion
    pub disable_eu_fusion: StreamProperty<bool>,
    /// Disable overdispatch
    pub disable_overdispatch: StreamProperty<bool>,
    /// Engine instance for single slice dispatch
    pub single_slice_dispatch_ccs_mode: StreamProperty<i32>,
    support_loaded: bool,
}

impl Default for FrontEndProperties {
    fn default() -> Self {
        Self::new()
    }
}

impl FrontEndProperties {
    /// Nothing programmed, nothing supported yet
    pub const fn new() -> Self {
        Self {
            compute_dispatch_all_walker_enable: StreamProperty::gated(),
            disable_eu_fusion: StreamProperty::gated(),
            disable_overdispatch: StreamProperty::gated(),
            single_slice_dispatch_ccs_mode: StreamProperty::gated(),
            support_loaded: false,
        }
    }

    /// Load the supported flags. Runs once.
    pub fn init_support(&mut self, env: &RootDeviceEnvironment) {
        if self.support_loaded {
            return;
        }
        let support = env.front_end_properties_support();
        self.compute_dispatch_all_walker_enable.supported = support.compute_dispatch_all_walker;
        self.disable_eu_fusion.supported = support.disable_eu_fusion;
        self.disable_overdispatch.supported = support.disable_overdispatch;
        self.single_slice_dispatch_ccs_mode.supported = support.single_slice_dispatch_ccs_mode;
        self.support_loaded = true;
    }

    /// Recompute every field. `engine_instanced_device` is `None` for a
    /// device that is not engine instanced.
    pub fn set_properties_all(
        &mut self,
        is_cooperative_kernel: bool,
        disable_eu_fusion: bool,
        disable_overdispatch: bool,
        engine_instanced_device: Option<i32>,
        env: &RootDeviceEnvironment,
    ) {
        self.init_support(env);
        self.clear_is_dirty();

        self.compute_dispatch_all_walker_enable
            .set(Some(is_cooperative_kernel));
        self.disable_eu_fusion.set(Some(disable_eu_fusion));
        self.disable_overdispatch.set(Some(disable_overdispatch));
        self.single_slice_dispatch_ccs_mode.set(engine_instanced_device);
    }

    /// Only the single slice dispatch mode
    pub fn set_property_single_slice_dispatch_ccs_mode(
        &mut self,
        engine_instanced_device: Option<i32>,
        env: &RootDeviceEnvironment,
    ) {
        self.init_support(env);

        self.single_slice_dispatch_ccs_mode.clear_dirty();
        self.single_slice_dispatch_ccs_mode.set(engine_instanced_device);
    }

    /// Per-context fields. With `clear_dirty_state` the values are tracked
    /// but no change is reported.
    pub fn set_properties_disable_overdispatch_engine_instanced(
        &mut self,
        disable_overdispatch: bool,
        engine_instanced_device: Option<i32>,
        env: &RootDeviceEnvironment,
        clear_dirty_state: bool,
    ) {
        self.init_support(env);

        if !clear_dirty_state {
            self.disable_overdispatch.clear_dirty();
            self.single_slice_dispatch_ccs_mode.clear_dirty();
        }
        self.disable_overdispatch.set(Some(disable_overdispatch));
        self.single_slice_dispatch_ccs_mode.set(engine_instanced_device);
        if clear_dirty_state {
            self.disable_overdispatch.clear_dirty();
            self.single_slice_dispatch_ccs_mode.clear_dirty();
        }
    }

    /// Per-kernel fields
    pub fn set_properties_compute_dispatch_all_walker_enable_disable_eu_fusion(
        &mut self,
        is_cooperative_kernel: bool,
        disable_eu_fusion: bool,
        env: &RootDeviceEnvironment,
    ) {
        self.init_support(env);

        self.compute_dispatch_all_walker_enable.clear_dirty();
        self.disable_eu_fusion.clear_dirty();

        self.compute_dispatch_all_walker_enable
            .set(Some(is_cooperative_kernel));
        self.disable_eu_fusion.set(Some(disable_eu_fusion));
    }

    /// Copy another receiver's state
    pub fn set_properties(&mut self, other: &Self) {
        self.clear_is_dirty();

        self.disable_overdispatch.copy_from(&other.disable_overdispatch);
        self.disable_eu_fusion.copy_from(&other.disable_eu_fusion);
        self.single_slice_dispatch_ccs_mode
            .copy_from(&other.single_slice_dispatch_ccs_mode);
        self.compute_dispatch_all_walker_enable
            .copy_from(&other.compute_dispatch_all_walker_enable);
    }

    /// Whether any field must be re-emitted
    pub fn is_dirty(&self) -> bool {
        self.disable_overdispatch.is_dirty
            || self.disable_eu_fusion.is_dirty
            || self.single_slice_dispatch_ccs_mode.is_dirty
            || self.compute_dispatch_all_walker_enable.is_dirty
    }

    /// Forget every pending change
    pub fn clear_is_dirty(&mut self) {
        self.disable_eu_fusion.clear_dirty();
        self.disable_overdispatch.clear_dirty();
        self.single_slice_dispatch_ccs_mode.clear_dirty();
        self.compute_dispatch_all_walker_enable.clear_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::hw_info::{HardwareInfo, ProductFamily, Stepping};

    #[test]
    fn test_overdispatch_depends_on_stepping() {
        let a0 = RootDeviceEnvironment::new(HardwareInfo::new(ProductFamily::Dg2, Stepping::A0));
        let mut props = FrontEndProperties::new();
        props.set_properties_all(false, true, true, None, &a0);
        assert_eq!(props.disable_overdispatch.value, None);
        assert_eq!(props.disable_eu_fusion.value, Some(true));

        let b0 = RootDeviceEnvironment::new(HardwareInfo::new(ProductFamily::Dg2, Stepping::B0));
        let mut props = FrontEndProperties::new();
        props.set_properties_all(false, true, true, None, &b0);
        assert_eq!(props.disable_overdispatch.value, Some(true));
    }

    #[test]
    fn test_gen11_has_no_front_end_fields() {
        let env = RootDeviceEnvironment::new(HardwareInfo::new(ProductFamily::Icelake, Stepping::A0));
        let mut props = FrontEndProperties::new();
        props.set_properties_all(true, true, true, Some(0), &env);
        assert!(!props.is_dirty());
        assert_eq!(props, {
            let mut fresh = FrontEndProperties::new();
            fresh.init_support(&env);
            fresh
        });
    }

    #[test]
    fn test_engine_instance_not_present_is_ignored() {
        let env = RootDeviceEnvironment::new(HardwareInfo::new(ProductFamily::PonteVecchio, Stepping::B0));
        let mut props = FrontEndProperties::new();
        props.set_property_single_slice_dispatch_ccs_mode(Some(1), &env);
        assert!(props.single_slice_dispatch_ccs_mode.is_dirty);

        props.set_property_single_slice_dispatch_ccs_mode(None, &env);
        assert_eq!(props.single_slice_dispatch_ccs_mode.value, Some(1));
        assert!(!props.is_dirty());
    }

    #[test]
    fn test_per_kernel_setter_only_touches_its_fields() {
        let env = RootDeviceEnvironment::new(HardwareInfo::new(ProductFamily::PonteVecchio, Stepping::B0));
        let mut props = FrontEndProperties::new();
        props.set_properties_disable_overdispatch_engine_instanced(true, Some(0), &env, false);
        assert!(props.disable_overdispatch.is_dirty);

        props.set_properties_compute_dispatch_all_walker_enable_disable_eu_fusion(true, true, &env);
        assert!(props.compute_dispatch_all_walker_enable.is_dirty);
        // not programmed on this family
        assert_eq!(props.disable_eu_fusion.value, None);
        assert!(props.disable_overdispatch.is_dirty);

        props.set_properties_disable_overdispatch_engine_instanced(false, Some(0), &env, true);
        assert_eq!(props.disable_overdispatch.value, Some(false));
        assert!(!props.disable_overdispatch.is_dirty);
    }
}
