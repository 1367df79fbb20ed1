//! # Root Device Environment
//!
//! Per-device configuration object: hardware description, capability tables
//! and debug overrides. Each support table is queried from the product helper
//! at most once per device and is immutable afterwards.

use core::sync::atomic::{AtomicU32, Ordering};

use spin::Once;

use crate::debug_settings::DebugSettings;
use crate::hw_info::HardwareInfo;
use crate::modes::ThreadArbitrationPolicy;
use crate::product_helper::{
    product_helper_for, FrontEndPropertiesSupport, PipelineSelectPropertiesSupport, ProductHelper,
    ScmPropertiesSupport, StateBaseAddressPropertiesSupport,
};

/// Everything the state tracker needs to know about one device
#[derive(Debug)]
pub struct RootDeviceEnvironment {
    /// Hardware description
    hw_info: HardwareInfo,
    /// Capability tables
    product_helper: &'static dyn ProductHelper,
    /// Developer overrides
    debug_settings: DebugSettings,
    /// Memoized tables
    scm_support: Once<ScmPropertiesSupport>,
    front_end_support: Once<FrontEndPropertiesSupport>,
    pipeline_select_support: Once<PipelineSelectPropertiesSupport>,
    state_base_address_support: Once<StateBaseAddressPropertiesSupport>,
    /// Number of product helper queries issued
    support_queries: AtomicU32,
}

impl RootDeviceEnvironment {
    /// Environment with the family's capability tables and no overrides
    pub fn new(hw_info: HardwareInfo) -> Self {
        Self::with_debug_settings(hw_info, DebugSettings::none())
    }

    /// Environment with the family's capability tables and explicit overrides
    pub fn with_debug_settings(hw_info: HardwareInfo, debug_settings: DebugSettings) -> Self {
        let helper = product_helper_for(hw_info.core_family());
        Self::with_product_helper(hw_info, helper, debug_settings)
    }

    /// Environment with caller-provided capability tables
    pub fn with_product_helper(
        hw_info: HardwareInfo,
        product_helper: &'static dyn ProductHelper,
        debug_settings: DebugSettings,
    ) -> Self {
        if debug_settings.any_override_active() {
            log::debug!("device {:?}: debug overrides active {:?}", hw_info, debug_settings);
        }
        Self {
            hw_info,
            product_helper,
            debug_settings,
            scm_support: Once::new(),
            front_end_support: Once::new(),
            pipeline_select_support: Once::new(),
            state_base_address_support: Once::new(),
            support_queries: AtomicU32::new(0),
        }
    }

    /// Hardware description
    #[inline]
    pub fn hardware_info(&self) -> &HardwareInfo {
        &self.hw_info
    }

    /// Developer overrides
    #[inline]
    pub fn debug_settings(&self) -> &DebugSettings {
        &self.debug_settings
    }

    /// Capability tables
    #[inline]
    pub fn product_helper(&self) -> &dyn ProductHelper {
        self.product_helper
    }

    /// Hardware default thread arbitration policy
    pub fn default_thread_arbitration_policy(&self) -> ThreadArbitrationPolicy {
        self.product_helper.default_thread_arbitration_policy()
    }

    /// STATE_COMPUTE_MODE support, loaded on first use
    pub fn scm_properties_support(&self) -> &ScmPropertiesSupport {
        self.scm_support.call_once(|| {
            self.note_query("state compute mode");
            self.product_helper.scm_properties_support()
        })
    }

    /// Front end support, loaded on first use
    pub fn front_end_properties_support(&self) -> &FrontEndPropertiesSupport {
        self.front_end_support.call_once(|| {
            self.note_query("front end");
            self.product_helper.front_end_properties_support(&self.hw_info)
        })
    }

    /// PIPELINE_SELECT support, loaded on first use
    pub fn pipeline_select_properties_support(&self) -> &PipelineSelectPropertiesSupport {
        self.pipeline_select_support.call_once(|| {
            self.note_query("pipeline select");
            self.product_helper.pipeline_select_properties_support(&self.hw_info)
        })
    }

    /// STATE_BASE_ADDRESS support, loaded on first use
    pub fn state_base_address_properties_support(&self) -> &StateBaseAddressPropertiesSupport {
        self.state_base_address_support.call_once(|| {
            self.note_query("state base address");
            self.product_helper.state_base_address_properties_support()
        })
    }

    /// How many times a capability table was actually queried
    pub fn support_query_count(&self) -> u32 {
        self.support_queries.load(Ordering::Relaxed)
    }

    fn note_query(&self, table: &str) {
        self.support_queries.fetch_add(1, Ordering::Relaxed);
        log::debug!("{:?}: loaded {} support table", self.hw_info.product_family, table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw_info::{ProductFamily, Stepping};

    #[test]
    fn test_support_tables_are_memoized() {
        let env = RootDeviceEnvironment::new(HardwareInfo::new(ProductFamily::Dg2, Stepping::B0));
        assert_eq!(env.support_query_count(), 0);

        let first = *env.scm_properties_support();
        let second = *env.scm_properties_support();
        assert_eq!(first, second);
        assert_eq!(env.support_query_count(), 1);

        env.front_end_properties_support();
        env.front_end_properties_support();
        env.pipeline_select_properties_support();
        env.state_base_address_properties_support();
        assert_eq!(env.support_query_count(), 4);
    }

    #[test]
    fn test_default_policy_comes_from_family() {
        let env = RootDeviceEnvironment::new(HardwareInfo::new(ProductFamily::Tigerlake, Stepping::A0));
        assert_eq!(env.default_thread_arbitration_policy(), ThreadArbitrationPolicy::AgeBased);
    }
}
