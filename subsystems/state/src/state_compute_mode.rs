//! # State Compute Mode Properties
//!
//! Coherency, register file size, async compute thread limits, thread
//! arbitration and preemption. Thread arbitration and GRF count go through
//! [`OverrideSources`] so debug knobs apply in a fixed order.

use forge_core::{
    GrfConfig, PreemptionMode, RootDeviceEnvironment, ThreadArbitrationPolicy,
};

use crate::precedence::OverrideSources;
use crate::stream_property::StreamProperty;

/// STATE_COMPUTE_MODE fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateComputeModeProperties {
    /// Coherency required
    pub is_coherency_required: StreamProperty<bool>,
    /// Large GRF mode
    pub large_grf_mode: StreamProperty<bool>,
    /// Z-pass async compute thread limit
    pub z_pass_async_compute_thread_limit: StreamProperty<i32>,
    /// Pixel async compute thread limit
    pub pixel_async_compute_thread_limit: StreamProperty<i32>,
    /// Thread arbitration policy
    pub thread_arbitration_policy: StreamProperty<ThreadArbitrationPolicy>,
    /// Device preemption mode
    pub device_preemption_mode: StreamProperty<PreemptionMode>,
    support_loaded: bool,
}

impl Default for StateComputeModeProperties {
    fn default() -> Self {
        Self::new()
    }
}

impl StateComputeModeProperties {
    /// Nothing programmed, nothing supported yet
    pub const fn new() -> Self {
        Self {
            is_coherency_required: StreamProperty::gated(),
            large_grf_mode: StreamProperty::gated(),
            z_pass_async_compute_thread_limit: StreamProperty::gated(),
            pixel_async_compute_thread_limit: StreamProperty::gated(),
            thread_arbitration_policy: StreamProperty::gated(),
            device_preemption_mode: StreamProperty::gated(),
            support_loaded: false,
        }
    }

    /// Load the supported flags. Runs once.
    pub fn init_support(&mut self, env: &RootDeviceEnvironment) {
        if self.support_loaded {
            return;
        }
        let support = env.scm_properties_support();
        self.is_coherency_required.supported = support.coherency_required;
        self.large_grf_mode.supported = support.large_grf_mode;
        self.z_pass_async_compute_thread_limit.supported = support.z_pass_async_compute_thread_limit;
        self.pixel_async_compute_thread_limit.supported = support.pixel_async_compute_thread_limit;
        self.thread_arbitration_policy.supported = support.thread_arbitration_policy;
        self.device_preemption_mode.supported = support.device_preemption_mode;
        self.support_loaded = true;
    }

    /// Recompute every field
    pub fn set_properties_all(
        &mut self,
        requires_coherency: bool,
        num_grf_required: u32,
        thread_arbitration_policy: Option<ThreadArbitrationPolicy>,
        device_preemption_mode: PreemptionMode,
        env: &RootDeviceEnvironment,
    ) {
        self.init_support(env);
        self.clear_is_dirty();

        self.set_coherency_property(requires_coherency);
        self.set_grf_number_property(num_grf_required, env);
        self.set_thread_arbitration_property(thread_arbitration_policy, env);

        let debug = env.debug_settings();
        self.z_pass_async_compute_thread_limit
            .set(debug.force_z_pass_async_compute_thread_limit);
        self.pixel_async_compute_thread_limit
            .set(debug.force_pixel_async_compute_thread_limit);

        self.set_device_preemption_property(device_preemption_mode);
    }

    /// Per-context fields. With `clear_dirty_state` the values are tracked
    /// but no change is reported.
    pub fn set_properties_coherency_device_preemption(
        &mut self,
        requires_coherency: bool,
        device_preemption_mode: PreemptionMode,
        env: &RootDeviceEnvironment,
        clear_dirty_state: bool,
    ) {
        self.init_support(env);

        if !clear_dirty_state {
            self.is_coherency_required.clear_dirty();
            self.device_preemption_mode.clear_dirty();
        }
        self.set_coherency_property(requires_coherency);
        self.set_device_preemption_property(device_preemption_mode);
        if clear_dirty_state {
            self.is_coherency_required.clear_dirty();
            self.device_preemption_mode.clear_dirty();
        }
    }

    /// Per-kernel fields
    pub fn set_properties_grf_number_thread_arbitration(
        &mut self,
        num_grf_required: u32,
        thread_arbitration_policy: Option<ThreadArbitrationPolicy>,
        env: &RootDeviceEnvironment,
    ) {
        self.init_support(env);

        self.thread_arbitration_policy.clear_dirty();
        self.large_grf_mode.clear_dirty();

        self.set_grf_number_property(num_grf_required, env);
        self.set_thread_arbitration_property(thread_arbitration_policy, env);
    }

    /// Copy another receiver's state
    pub fn set_properties(&mut self, other: &Self) {
        self.clear_is_dirty();

        self.is_coherency_required.copy_from(&other.is_coherency_required);
        self.large_grf_mode.copy_from(&other.large_grf_mode);
        self.z_pass_async_compute_thread_limit
            .copy_from(&other.z_pass_async_compute_thread_limit);
        self.pixel_async_compute_thread_limit
            .copy_from(&other.pixel_async_compute_thread_limit);
        self.thread_arbitration_policy
            .copy_from(&other.thread_arbitration_policy);
        self.device_preemption_mode.copy_from(&other.device_preemption_mode);
    }

    /// Whether any field must be re-emitted
    pub fn is_dirty(&self) -> bool {
        self.is_coherency_required.is_dirty
            || self.large_grf_mode.is_dirty
            || self.z_pass_async_compute_thread_limit.is_dirty
            || self.pixel_async_compute_thread_limit.is_dirty
            || self.thread_arbitration_policy.is_dirty
            || self.device_preemption_mode.is_dirty
    }

    /// Forget every pending change
    pub fn clear_is_dirty(&mut self) {
        self.is_coherency_required.clear_dirty();
        self.large_grf_mode.clear_dirty();
        self.z_pass_async_compute_thread_limit.clear_dirty();
        self.pixel_async_compute_thread_limit.clear_dirty();
        self.thread_arbitration_policy.clear_dirty();
        self.device_preemption_mode.clear_dirty();
    }

    fn set_coherency_property(&mut self, requires_coherency: bool) {
        self.is_coherency_required.set(Some(requires_coherency));
    }

    fn set_device_preemption_property(&mut self, mode: PreemptionMode) {
        self.device_preemption_mode.set(Some(mode));
    }

    fn set_grf_number_property(&mut self, num_grf_required: u32, env: &RootDeviceEnvironment) {
        let debug = env.debug_settings();
        let requested = (num_grf_required != GrfConfig::NOT_APPLICABLE).then_some(num_grf_required);
        let num_grf = OverrideSources {
            requested,
            previous: self.large_grf_mode.value.map(|large| {
                if large {
                    GrfConfig::LARGE_GRF_NUMBER
                } else {
                    GrfConfig::DEFAULT_GRF_NUMBER
                }
            }),
            force_default_if_not_specified: debug.force_default_grf_number_if_not_specified,
            override_value: debug.override_grf_number,
            hardware_default: GrfConfig::DEFAULT_GRF_NUMBER,
        }
        .resolve();

        self.large_grf_mode
            .set(num_grf.map(|num| num == GrfConfig::LARGE_GRF_NUMBER));
    }

    fn set_thread_arbitration_property(
        &mut self,
        requested: Option<ThreadArbitrationPolicy>,
        env: &RootDeviceEnvironment,
    ) {
        let debug = env.debug_settings();
        let policy = OverrideSources {
            requested,
            previous: self.thread_arbitration_policy.value,
            force_default_if_not_specified: debug
                .force_default_thread_arbitration_policy_if_not_specified,
            override_value: debug.override_thread_arbitration_policy,
            hardware_default: env.default_thread_arbitration_policy(),
        }
        .resolve();

        log::trace!("thread arbitration {:?} -> {:?}", requested, policy);
        self.thread_arbitration_policy.set(policy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::hw_info::{HardwareInfo, ProductFamily, Stepping};
    use forge_core::DebugSettings;

    fn env(product: ProductFamily) -> RootDeviceEnvironment {
        RootDeviceEnvironment::new(HardwareInfo::new(product, Stepping::B0))
    }

    fn env_with(product: ProductFamily, debug: DebugSettings) -> RootDeviceEnvironment {
        RootDeviceEnvironment::with_debug_settings(HardwareInfo::new(product, Stepping::B0), debug)
    }

    #[test]
    fn test_coherency_ignored_where_unsupported() {
        let env = env(ProductFamily::PonteVecchio);
        let mut props = StateComputeModeProperties::new();
        props.set_properties_all(true, GrfConfig::NOT_APPLICABLE, None, PreemptionMode::MidThread, &env);

        assert_eq!(props.is_coherency_required.value, None);
        assert!(!props.is_coherency_required.is_dirty);
    }

    #[test]
    fn test_coherency_dirty_only_on_change() {
        let env = env(ProductFamily::Tigerlake);
        let mut props = StateComputeModeProperties::new();
        props.set_properties_all(true, GrfConfig::NOT_APPLICABLE, None, PreemptionMode::MidThread, &env);
        assert!(props.is_coherency_required.is_dirty);

        props.set_properties_all(true, GrfConfig::NOT_APPLICABLE, None, PreemptionMode::MidThread, &env);
        assert!(!props.is_dirty());

        props.set_properties_all(false, GrfConfig::NOT_APPLICABLE, None, PreemptionMode::MidThread, &env);
        assert!(props.is_coherency_required.is_dirty);
        assert_eq!(props.is_coherency_required.value, Some(false));
    }

    #[test]
    fn test_clear_is_dirty_keeps_values() {
        let env = env(ProductFamily::Dg2);
        let mut props = StateComputeModeProperties::new();
        props.set_properties_all(true, 256, Some(ThreadArbitrationPolicy::RoundRobin), PreemptionMode::ThreadGroup, &env);
        assert!(props.is_dirty());

        props.clear_is_dirty();
        assert!(!props.is_dirty());
        assert!(!props.is_dirty());
        assert_eq!(props.large_grf_mode.value, Some(true));
        assert_eq!(
            props.thread_arbitration_policy.value,
            Some(ThreadArbitrationPolicy::RoundRobin)
        );
    }

    #[test]
    fn test_grf_not_applicable_keeps_mode() {
        let env = env(ProductFamily::Dg2);
        let mut props = StateComputeModeProperties::new();

        props.set_properties_grf_number_thread_arbitration(GrfConfig::NOT_APPLICABLE, None, &env);
        assert_eq!(props.large_grf_mode.value, Some(false));

        props.set_properties_grf_number_thread_arbitration(GrfConfig::LARGE_GRF_NUMBER, None, &env);
        assert_eq!(props.large_grf_mode.value, Some(true));
        assert!(props.large_grf_mode.is_dirty);

        props.set_properties_grf_number_thread_arbitration(GrfConfig::NOT_APPLICABLE, None, &env);
        assert_eq!(props.large_grf_mode.value, Some(true));
        assert!(!props.large_grf_mode.is_dirty);
    }

    #[test]
    fn test_grf_overrides() {
        let env = env_with(
            ProductFamily::Dg2,
            DebugSettings {
                override_grf_number: Some(GrfConfig::LARGE_GRF_NUMBER),
                ..DebugSettings::none()
            },
        );
        let mut props = StateComputeModeProperties::new();
        props.set_properties_grf_number_thread_arbitration(GrfConfig::DEFAULT_GRF_NUMBER, None, &env);
        assert_eq!(props.large_grf_mode.value, Some(true));

        let env = env_with(
            ProductFamily::Dg2,
            DebugSettings {
                force_default_grf_number_if_not_specified: true,
                ..DebugSettings::none()
            },
        );
        let mut props = StateComputeModeProperties::new();
        props.set_properties_grf_number_thread_arbitration(GrfConfig::LARGE_GRF_NUMBER, None, &env);
        props.set_properties_grf_number_thread_arbitration(GrfConfig::NOT_APPLICABLE, None, &env);
        assert_eq!(props.large_grf_mode.value, Some(false));
    }

    #[test]
    fn test_thread_arbitration_default_and_previous() {
        let env = env(ProductFamily::Tigerlake);
        let mut props = StateComputeModeProperties::new();

        props.set_properties_grf_number_thread_arbitration(GrfConfig::NOT_APPLICABLE, None, &env);
        assert_eq!(props.thread_arbitration_policy.value, Some(ThreadArbitrationPolicy::AgeBased));

        props.set_properties_grf_number_thread_arbitration(
            GrfConfig::NOT_APPLICABLE,
            Some(ThreadArbitrationPolicy::RoundRobin),
            &env,
        );
        props.set_properties_grf_number_thread_arbitration(GrfConfig::NOT_APPLICABLE, None, &env);
        assert_eq!(props.thread_arbitration_policy.value, Some(ThreadArbitrationPolicy::RoundRobin));
        assert!(!props.thread_arbitration_policy.is_dirty);
    }

    #[test]
    fn test_thread_arbitration_override_dominates_force_default() {
        let env = env_with(
            ProductFamily::Tigerlake,
            DebugSettings {
                override_thread_arbitration_policy: Some(ThreadArbitrationPolicy::RoundRobinAfterDependency),
                force_default_thread_arbitration_policy_if_not_specified: true,
                ..DebugSettings::none()
            },
        );
        let mut props = StateComputeModeProperties::new();
        props.set_properties_grf_number_thread_arbitration(GrfConfig::NOT_APPLICABLE, None, &env);
        assert_eq!(
            props.thread_arbitration_policy.value,
            Some(ThreadArbitrationPolicy::RoundRobinAfterDependency)
        );

        props.set_properties_grf_number_thread_arbitration(
            GrfConfig::NOT_APPLICABLE,
            Some(ThreadArbitrationPolicy::AgeBased),
            &env,
        );
        assert_eq!(
            props.thread_arbitration_policy.value,
            Some(ThreadArbitrationPolicy::RoundRobinAfterDependency)
        );
    }

    #[test]
    fn test_force_default_replaces_previous_policy() {
        let env = env_with(
            ProductFamily::Tigerlake,
            DebugSettings {
                force_default_thread_arbitration_policy_if_not_specified: true,
                ..DebugSettings::none()
            },
        );
        let mut props = StateComputeModeProperties::new();
        props.set_properties_grf_number_thread_arbitration(
            GrfConfig::NOT_APPLICABLE,
            Some(ThreadArbitrationPolicy::RoundRobin),
            &env,
        );
        props.set_properties_grf_number_thread_arbitration(GrfConfig::NOT_APPLICABLE, None, &env);
        assert_eq!(props.thread_arbitration_policy.value, Some(ThreadArbitrationPolicy::AgeBased));
        assert!(props.thread_arbitration_policy.is_dirty);
    }

    #[test]
    fn test_async_thread_limits_come_from_debug_settings() {
        let debug = DebugSettings {
            force_z_pass_async_compute_thread_limit: Some(2),
            force_pixel_async_compute_thread_limit: Some(3),
            ..DebugSettings::none()
        };

        let dg2 = env_with(ProductFamily::Dg2, debug);
        let mut props = StateComputeModeProperties::new();
        props.set_properties_all(false, GrfConfig::NOT_APPLICABLE, None, PreemptionMode::MidThread, &dg2);
        assert_eq!(props.z_pass_async_compute_thread_limit.value, Some(2));
        assert_eq!(props.pixel_async_compute_thread_limit.value, Some(3));

        let pvc = env_with(ProductFamily::PonteVecchio, debug);
        let mut props = StateComputeModeProperties::new();
        props.set_properties_all(false, GrfConfig::NOT_APPLICABLE, None, PreemptionMode::MidThread, &pvc);
        assert_eq!(props.z_pass_async_compute_thread_limit.value, None);

        let mut props = StateComputeModeProperties::new();
        props.set_properties_all(false, GrfConfig::NOT_APPLICABLE, None, PreemptionMode::MidThread, &env(ProductFamily::Dg2));
        assert_eq!(props.z_pass_async_compute_thread_limit.value, None);
    }

    #[test]
    fn test_clear_dirty_state_flag() {
        let env = env(ProductFamily::Tigerlake);
        let mut props = StateComputeModeProperties::new();

        props.set_properties_coherency_device_preemption(true, PreemptionMode::MidThread, &env, true);
        assert_eq!(props.is_coherency_required.value, Some(true));
        assert!(!props.is_dirty());

        props.set_properties_coherency_device_preemption(false, PreemptionMode::MidThread, &env, false);
        assert!(props.is_coherency_required.is_dirty);
    }

    #[test]
    fn test_narrow_setter_leaves_other_flags() {
        let env = env(ProductFamily::Dg2);
        let mut props = StateComputeModeProperties::new();
        props.set_properties_coherency_device_preemption(true, PreemptionMode::MidThread, &env, false);
        assert!(props.is_coherency_required.is_dirty);

        props.set_properties_grf_number_thread_arbitration(GrfConfig::NOT_APPLICABLE, None, &env);
        assert!(props.is_coherency_required.is_dirty);
    }
}
