//! Pipeline select properties

use forge_core::RootDeviceEnvironment;

use crate::stream_property::StreamProperty;

/// PIPELINE_SELECT fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSelectProperties {
    /// Pipeline mode selection
    pub mode_selected: StreamProperty<bool>,
    /// Media sampler DOP clock gate
    pub media_sampler_dop_clock_gate: StreamProperty<bool>,
    /// Systolic (DPAS) mode
    pub systolic_mode: StreamProperty<bool>,
    support_loaded: bool,
}

impl Default for PipelineSelectProperties {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineSelectProperties {
    /// Nothing programmed, nothing supported yet
    pub const fn new() -> Self {
        Self {
            mode_selected: StreamProperty::gated(),
            media_sampler_dop_clock_gate: StreamProperty::gated(),
            systolic_mode: StreamProperty::gated(),
            support_loaded: false,
        }
    }

    /// Load the supported flags. Runs once.
    pub fn init_support(&mut self, env: &RootDeviceEnvironment) {
        if self.support_loaded {
            return;
        }
        let support = env.pipeline_select_properties_support();
        self.mode_selected.supported = support.mode_selected;
        self.media_sampler_dop_clock_gate.supported = support.media_sampler_dop_clock_gate;
        self.systolic_mode.supported = support.systolic_mode;
        self.support_loaded = true;
    }

    /// Recompute every field
    pub fn set_properties_all(
        &mut self,
        mode_selected: bool,
        media_sampler_dop_clock_gate: bool,
        systolic_mode: bool,
        env: &RootDeviceEnvironment,
    ) {
        self.init_support(env);
        self.clear_is_dirty();

        self.mode_selected.set(Some(mode_selected));
        self.media_sampler_dop_clock_gate
            .set(Some(media_sampler_dop_clock_gate));
        self.systolic_mode.set(Some(systolic_mode));
    }

    /// Per-context fields. With `clear_dirty_state` the values are tracked
    /// but no change is reported.
    pub fn set_properties_mode_selected_media_sampler_clock_gate(
        &mut self,
        mode_selected: bool,
        media_sampler_dop_clock_gate: bool,
        env: &RootDeviceEnvironment,
        clear_dirty_state: bool,
    ) {
        self.init_support(env);

        if !clear_dirty_state {
            self.mode_selected.clear_dirty();
            self.media_sampler_dop_clock_gate.clear_dirty();
        }
        self.mode_selected.set(Some(mode_selected));
        self.media_sampler_dop_clock_gate
            .set(Some(media_sampler_dop_clock_gate));
        if clear_dirty_state {
            self.mode_selected.clear_dirty();
            self.media_sampler_dop_clock_gate.clear_dirty();
        }
    }

    /// Only the systolic mode
    pub fn set_property_systolic_mode(&mut self, systolic_mode: bool, env: &RootDeviceEnvironment) {
        self.init_support(env);

        self.systolic_mode.clear_dirty();
        self.systolic_mode.set(Some(systolic_mode));
    }

    /// Copy another receiver's state
    pub fn set_properties(&mut self, other: &Self) {
        self.clear_is_dirty();

        self.mode_selected.copy_from(&other.mode_selected);
        self.media_sampler_dop_clock_gate
            .copy_from(&other.media_sampler_dop_clock_gate);
        self.systolic_mode.copy_from(&other.systolic_mode);
    }

    /// Whether any field must be re-emitted
    pub fn is_dirty(&self) -> bool {
        self.mode_selected.is_dirty
            || self.media_sampler_dop_clock_gate.is_dirty
            || self.systolic_mode.is_dirty
    }

    /// Forget every pending change
    pub fn clear_is_dirty(&mut self) {
        self.mode_selected.clear_dirty();
        self.media_sampler_dop_clock_gate.clear_dirty();
        self.systolic_mode.clear_dirty();
    }
}
