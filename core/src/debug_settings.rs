//! # Debug Settings
//!
//! Developer overrides that take precedence over what callers request.
//! They are plain data owned by the [`RootDeviceEnvironment`]; nothing reads
//! them from global state.
//!
//! [`RootDeviceEnvironment`]: crate::RootDeviceEnvironment

use crate::modes::ThreadArbitrationPolicy;

/// Override knobs consulted by the state tracker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugSettings {
    /// Replace any requested thread arbitration policy
    pub override_thread_arbitration_policy: Option<ThreadArbitrationPolicy>,
    /// Use the hardware default policy whenever a kernel does not request one,
    /// even if a policy was already programmed
    pub force_default_thread_arbitration_policy_if_not_specified: bool,
    /// Replace any requested GRF count
    pub override_grf_number: Option<u32>,
    /// Use the default GRF count whenever a kernel carries no requirement,
    /// even if a mode was already programmed
    pub force_default_grf_number_if_not_specified: bool,
    /// Force the z-pass async compute thread limit
    pub force_z_pass_async_compute_thread_limit: Option<i32>,
    /// Force the pixel async compute thread limit
    pub force_pixel_async_compute_thread_limit: Option<i32>,
}

impl DebugSettings {
    /// No overrides
    pub const fn none() -> Self {
        Self {
            override_thread_arbitration_policy: None,
            force_default_thread_arbitration_policy_if_not_specified: false,
            override_grf_number: None,
            force_default_grf_number_if_not_specified: false,
            force_z_pass_async_compute_thread_limit: None,
            force_pixel_async_compute_thread_limit: None,
        }
    }

    /// Whether any knob differs from the default
    pub fn any_override_active(&self) -> bool {
        *self != Self::none()
    }
}
