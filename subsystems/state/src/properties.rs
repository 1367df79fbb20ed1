//! Aggregate of every property group a command stream carries

use forge_core::RootDeviceEnvironment;

use crate::front_end::FrontEndProperties;
use crate::pipeline_select::PipelineSelectProperties;
use crate::state_base_address::StateBaseAddressProperties;
use crate::state_compute_mode::StateComputeModeProperties;

/// Hardware state tracked for one command stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamProperties {
    /// STATE_COMPUTE_MODE
    pub state_compute_mode: StateComputeModeProperties,
    /// Front end state
    pub front_end_state: FrontEndProperties,
    /// PIPELINE_SELECT
    pub pipeline_select: PipelineSelectProperties,
    /// STATE_BASE_ADDRESS
    pub state_base_address: StateBaseAddressProperties,
}

impl StreamProperties {
    /// Empty, support not loaded
    pub const fn new() -> Self {
        Self {
            state_compute_mode: StateComputeModeProperties::new(),
            front_end_state: FrontEndProperties::new(),
            pipeline_select: PipelineSelectProperties::new(),
            state_base_address: StateBaseAddressProperties::new(),
        }
    }

    /// Load support for every group
    pub fn init_support(&mut self, env: &RootDeviceEnvironment) {
        self.state_compute_mode.init_support(env);
        self.front_end_state.init_support(env);
        self.pipeline_select.init_support(env);
        self.state_base_address.init_support(env);
    }

    /// Copy another stream's state, group by group
    pub fn set_properties(&mut self, other: &Self) {
        self.state_compute_mode.set_properties(&other.state_compute_mode);
        self.front_end_state.set_properties(&other.front_end_state);
        self.pipeline_select.set_properties(&other.pipeline_select);
        self.state_base_address.set_properties(&other.state_base_address);
    }

    /// Whether any group must be re-emitted
    pub fn is_dirty(&self) -> bool {
        self.state_compute_mode.is_dirty()
            || self.front_end_state.is_dirty()
            || self.pipeline_select.is_dirty()
            || self.state_base_address.is_dirty()
    }

    /// Forget every pending change
    pub fn clear_is_dirty(&mut self) {
        self.state_compute_mode.clear_is_dirty();
        self.front_end_state.clear_is_dirty();
        self.pipeline_select.clear_is_dirty();
        self.state_base_address.clear_is_dirty();
    }
}
