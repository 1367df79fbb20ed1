//! # Product Capability Tables
//!
//! Which hardware state fields each core family actually programs. The state
//! tracker consults these tables to decide whether a caller request is
//! applied or silently dropped.
//!
//! ```text
//!                      SCM  FE   PS   SBA
//!   Gen11              ✓    -    ✓    ✓
//!   Gen12LP            ✓    ✓    ✓    ✓
//!   XeHPG (DG2, MTL)   ✓    ✓    ✓    ✓
//!   XeHPC (PVC)        ✓    ✓    ✓    ✓
//! ```
//!
//! The per-field breakdown lives in the `impl ProductHelper` blocks below.

use core::fmt;

use crate::hw_info::{CoreFamily, HardwareInfo, Stepping};
use crate::modes::ThreadArbitrationPolicy;

// =============================================================================
// SUPPORT TABLES
// =============================================================================

/// Fields of STATE_COMPUTE_MODE the hardware programs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScmPropertiesSupport {
    /// Coherency required
    pub coherency_required: bool,
    /// Large GRF mode
    pub large_grf_mode: bool,
    /// Z-pass async compute thread limit
    pub z_pass_async_compute_thread_limit: bool,
    /// Pixel async compute thread limit
    pub pixel_async_compute_thread_limit: bool,
    /// Thread arbitration policy
    pub thread_arbitration_policy: bool,
    /// Device preemption mode
    pub device_preemption_mode: bool,
}

/// Fields of the front end state command the hardware programs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontEndPropertiesSupport {
    /// Compute dispatch all walker (cooperative kernels)
    pub compute_dispatch_all_walker: bool,
    /// Disable EU fusion
    pub disable_eu_fusion: bool,
    /// Disable overdispatch
    pub disable_overdispatch: bool,
    /// Single slice dispatch CCS mode
    pub single_slice_dispatch_ccs_mode: bool,
}

/// Fields of PIPELINE_SELECT the hardware programs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSelectPropertiesSupport {
    /// Pipeline mode selection
    pub mode_selected: bool,
    /// Media sampler DOP clock gate
    pub media_sampler_dop_clock_gate: bool,
    /// Systolic mode
    pub systolic_mode: bool,
}

/// Fields of STATE_BASE_ADDRESS the hardware programs
///
/// Surface, dynamic and indirect base addresses are always programmed and
/// have no entry here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateBaseAddressPropertiesSupport {
    /// Global atomics
    pub global_atomics: bool,
    /// Stateless MOCS
    pub stateless_mocs: bool,
    /// Binding table pool base address and size
    pub binding_table_pool_base_address: bool,
}

// =============================================================================
// PRODUCT HELPER
// =============================================================================

/// Per-family capability queries
pub trait ProductHelper: Send + Sync + fmt::Debug {
    /// STATE_COMPUTE_MODE support
    fn scm_properties_support(&self) -> ScmPropertiesSupport;

    /// Front end support. May depend on stepping.
    fn front_end_properties_support(&self, hw_info: &HardwareInfo) -> FrontEndPropertiesSupport;

    /// PIPELINE_SELECT support. May depend on stepping.
    fn pipeline_select_properties_support(
        &self,
        hw_info: &HardwareInfo,
    ) -> PipelineSelectPropertiesSupport;

    /// STATE_BASE_ADDRESS support
    fn state_base_address_properties_support(&self) -> StateBaseAddressPropertiesSupport;

    /// Policy used when a kernel does not request one
    fn default_thread_arbitration_policy(&self) -> ThreadArbitrationPolicy;
}

/// Gen11 capability tables
#[derive(Debug)]
pub struct Gen11ProductHelper;

impl ProductHelper for Gen11ProductHelper {
    fn scm_properties_support(&self) -> ScmPropertiesSupport {
        ScmPropertiesSupport {
            coherency_required: true,
            thread_arbitration_policy: true,
            ..ScmPropertiesSupport::default()
        }
    }

    fn front_end_properties_support(&self, _hw_info: &HardwareInfo) -> FrontEndPropertiesSupport {
        FrontEndPropertiesSupport::default()
    }

    fn pipeline_select_properties_support(
        &self,
        _hw_info: &HardwareInfo,
    ) -> PipelineSelectPropertiesSupport {
        PipelineSelectPropertiesSupport {
            mode_selected: true,
            media_sampler_dop_clock_gate: true,
            systolic_mode: false,
        }
    }

    fn state_base_address_properties_support(&self) -> StateBaseAddressPropertiesSupport {
        StateBaseAddressPropertiesSupport {
            stateless_mocs: true,
            ..StateBaseAddressPropertiesSupport::default()
        }
    }

    fn default_thread_arbitration_policy(&self) -> ThreadArbitrationPolicy {
        ThreadArbitrationPolicy::RoundRobinAfterDependency
    }
}

/// Gen12LP capability tables
#[derive(Debug)]
pub struct Gen12LpProductHelper;

impl ProductHelper for Gen12LpProductHelper {
    fn scm_properties_support(&self) -> ScmPropertiesSupport {
        ScmPropertiesSupport {
            coherency_required: true,
            thread_arbitration_policy: true,
            ..ScmPropertiesSupport::default()
        }
    }

    fn front_end_properties_support(&self, _hw_info: &HardwareInfo) -> FrontEndPropertiesSupport {
        FrontEndPropertiesSupport {
            disable_eu_fusion: true,
            ..FrontEndPropertiesSupport::default()
        }
    }

    fn pipeline_select_properties_support(
        &self,
        _hw_info: &HardwareInfo,
    ) -> PipelineSelectPropertiesSupport {
        PipelineSelectPropertiesSupport {
            mode_selected: true,
            media_sampler_dop_clock_gate: true,
            systolic_mode: false,
        }
    }

    fn state_base_address_properties_support(&self) -> StateBaseAddressPropertiesSupport {
        StateBaseAddressPropertiesSupport {
            global_atomics: false,
            stateless_mocs: true,
            binding_table_pool_base_address: true,
        }
    }

    fn default_thread_arbitration_policy(&self) -> ThreadArbitrationPolicy {
        ThreadArbitrationPolicy::AgeBased
    }
}

/// XeHPG capability tables
#[derive(Debug)]
pub struct XeHpgProductHelper;

impl ProductHelper for XeHpgProductHelper {
    fn scm_properties_support(&self) -> ScmPropertiesSupport {
        ScmPropertiesSupport {
            coherency_required: true,
            large_grf_mode: true,
            z_pass_async_compute_thread_limit: true,
            pixel_async_compute_thread_limit: true,
            thread_arbitration_policy: true,
            device_preemption_mode: false,
        }
    }

    fn front_end_properties_support(&self, hw_info: &HardwareInfo) -> FrontEndPropertiesSupport {
        FrontEndPropertiesSupport {
            compute_dispatch_all_walker: false,
            disable_eu_fusion: true,
            // overdispatch control is broken on A-step silicon
            disable_overdispatch: hw_info.stepping >= Stepping::B0,
            single_slice_dispatch_ccs_mode: true,
        }
    }

    fn pipeline_select_properties_support(
        &self,
        _hw_info: &HardwareInfo,
    ) -> PipelineSelectPropertiesSupport {
        PipelineSelectPropertiesSupport {
            mode_selected: true,
            media_sampler_dop_clock_gate: false,
            systolic_mode: true,
        }
    }

    fn state_base_address_properties_support(&self) -> StateBaseAddressPropertiesSupport {
        StateBaseAddressPropertiesSupport {
            global_atomics: false,
            stateless_mocs: true,
            binding_table_pool_base_address: true,
        }
    }

    fn default_thread_arbitration_policy(&self) -> ThreadArbitrationPolicy {
        ThreadArbitrationPolicy::AgeBased
    }
}

/// XeHPC capability tables
#[derive(Debug)]
pub struct XeHpcProductHelper;

impl ProductHelper for XeHpcProductHelper {
    fn scm_properties_support(&self) -> ScmPropertiesSupport {
        ScmPropertiesSupport {
            coherency_required: false,
            large_grf_mode: true,
            z_pass_async_compute_thread_limit: false,
            pixel_async_compute_thread_limit: false,
            thread_arbitration_policy: true,
            device_preemption_mode: false,
        }
    }

    fn front_end_properties_support(&self, _hw_info: &HardwareInfo) -> FrontEndPropertiesSupport {
        FrontEndPropertiesSupport {
            compute_dispatch_all_walker: true,
            disable_eu_fusion: false,
            disable_overdispatch: true,
            single_slice_dispatch_ccs_mode: true,
        }
    }

    fn pipeline_select_properties_support(
        &self,
        _hw_info: &HardwareInfo,
    ) -> PipelineSelectPropertiesSupport {
        PipelineSelectPropertiesSupport {
            mode_selected: true,
            media_sampler_dop_clock_gate: false,
            systolic_mode: true,
        }
    }

    fn state_base_address_properties_support(&self) -> StateBaseAddressPropertiesSupport {
        StateBaseAddressPropertiesSupport {
            global_atomics: true,
            stateless_mocs: true,
            binding_table_pool_base_address: true,
        }
    }

    fn default_thread_arbitration_policy(&self) -> ThreadArbitrationPolicy {
        ThreadArbitrationPolicy::RoundRobinAfterDependency
    }
}

static GEN11: Gen11ProductHelper = Gen11ProductHelper;
static GEN12LP: Gen12LpProductHelper = Gen12LpProductHelper;
static XE_HPG: XeHpgProductHelper = XeHpgProductHelper;
static XE_HPC: XeHpcProductHelper = XeHpcProductHelper;

/// Capability tables for a core family
pub fn product_helper_for(core_family: CoreFamily) -> &'static dyn ProductHelper {
    match core_family {
        CoreFamily::Gen11 => &GEN11,
        CoreFamily::Gen12Lp => &GEN12LP,
        CoreFamily::XeHpgCore => &XE_HPG,
        CoreFamily::XeHpcCore => &XE_HPC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw_info::ProductFamily;

    #[test]
    fn test_dg2_overdispatch_depends_on_stepping() {
        let helper = product_helper_for(CoreFamily::XeHpgCore);
        let a0 = HardwareInfo::new(ProductFamily::Dg2, Stepping::A0);
        let b0 = HardwareInfo::new(ProductFamily::Dg2, Stepping::B0);
        assert!(!helper.front_end_properties_support(&a0).disable_overdispatch);
        assert!(helper.front_end_properties_support(&b0).disable_overdispatch);
    }

    #[test]
    fn test_pvc_has_no_coherency_field() {
        let helper = product_helper_for(CoreFamily::XeHpcCore);
        assert!(!helper.scm_properties_support().coherency_required);
        assert!(helper.scm_properties_support().large_grf_mode);
    }

    #[test]
    fn test_gen11_front_end_is_empty() {
        let helper = product_helper_for(CoreFamily::Gen11);
        let hw = HardwareInfo::new(ProductFamily::Icelake, Stepping::A0);
        assert_eq!(
            helper.front_end_properties_support(&hw),
            FrontEndPropertiesSupport::default()
        );
    }
}
