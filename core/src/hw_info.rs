//! # Hardware Info
//!
//! Static description of the device a root environment was created for.

use core::fmt;

// =============================================================================
// FAMILIES
// =============================================================================

/// Render core family. Selects the capability tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CoreFamily {
    /// Gen11 (Icelake, Elkhart Lake)
    Gen11,
    /// Gen12 low power (Tigerlake, DG1, Rocket Lake, Alder Lake)
    Gen12Lp,
    /// Xe HPG (DG2, Meteor Lake)
    XeHpgCore,
    /// Xe HPC (Ponte Vecchio)
    XeHpcCore,
}

/// Product within a core family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductFamily {
    /// Icelake LP
    Icelake,
    /// Elkhart Lake
    ElkhartLake,
    /// Tigerlake LP
    Tigerlake,
    /// DG1 discrete
    Dg1,
    /// Rocket Lake
    RocketLake,
    /// Alder Lake S
    AlderLakeS,
    /// Alder Lake N
    AlderLakeN,
    /// DG2 discrete
    Dg2,
    /// Meteor Lake
    MeteorLake,
    /// Ponte Vecchio
    PonteVecchio,
}

impl ProductFamily {
    /// Core family the product is built on
    pub const fn core_family(self) -> CoreFamily {
        match self {
            Self::Icelake | Self::ElkhartLake => CoreFamily::Gen11,
            Self::Tigerlake | Self::Dg1 | Self::RocketLake | Self::AlderLakeS | Self::AlderLakeN => {
                CoreFamily::Gen12Lp
            }
            Self::Dg2 | Self::MeteorLake => CoreFamily::XeHpgCore,
            Self::PonteVecchio => CoreFamily::XeHpcCore,
        }
    }
}

// =============================================================================
// STEPPING
// =============================================================================

/// Silicon stepping
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stepping {
    /// A0 stepping
    A0,
    /// A1 stepping
    A1,
    /// B0 stepping
    B0,
    /// C0 stepping
    C0,
}

// =============================================================================
// FEATURE TABLE
// =============================================================================

bitflags::bitflags! {
    /// Platform feature bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FeatureTable: u32 {
        /// Device has local (discrete) memory
        const LOCAL_MEMORY = 1 << 0;
        /// Device exposes compute command streamers
        const CCS_NODE = 1 << 1;
        /// Multiple tiles
        const MULTI_TILE_ARCH = 1 << 2;
        /// Render compression for buffers
        const AUX_TRANSLATION = 1 << 3;
        /// Blitter engine usable for copies
        const BLITTER = 1 << 4;
    }
}

// =============================================================================
// HARDWARE INFO
// =============================================================================

/// Device description the capability tables are evaluated against
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct HardwareInfo {
    /// Product
    pub product_family: ProductFamily,
    /// Silicon stepping
    pub stepping: Stepping,
    /// Feature bits
    pub feature_table: FeatureTable,
    /// Number of compute command streamers
    pub ccs_count: u32,
}

impl HardwareInfo {
    /// Create hardware info for a product with its usual feature set
    pub const fn new(product_family: ProductFamily, stepping: Stepping) -> Self {
        let (feature_table, ccs_count) = match product_family.core_family() {
            CoreFamily::Gen11 => (FeatureTable::BLITTER, 0),
            CoreFamily::Gen12Lp => (FeatureTable::BLITTER.union(FeatureTable::CCS_NODE), 1),
            CoreFamily::XeHpgCore => (
                FeatureTable::BLITTER
                    .union(FeatureTable::CCS_NODE)
                    .union(FeatureTable::AUX_TRANSLATION)
                    .union(FeatureTable::LOCAL_MEMORY),
                4,
            ),
            CoreFamily::XeHpcCore => (
                FeatureTable::BLITTER
                    .union(FeatureTable::CCS_NODE)
                    .union(FeatureTable::LOCAL_MEMORY)
                    .union(FeatureTable::MULTI_TILE_ARCH),
                4,
            ),
        };
        Self {
            product_family,
            stepping,
            feature_table,
            ccs_count,
        }
    }

    /// Core family shortcut
    #[inline]
    pub const fn core_family(&self) -> CoreFamily {
        self.product_family.core_family()
    }
}

impl fmt::Debug for HardwareInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HardwareInfo({:?} {:?}, {:?}, ccs={})",
            self.product_family, self.stepping, self.feature_table, self.ccs_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_family_mapping() {
        assert_eq!(ProductFamily::Dg1.core_family(), CoreFamily::Gen12Lp);
        assert_eq!(ProductFamily::MeteorLake.core_family(), CoreFamily::XeHpgCore);
        assert_eq!(ProductFamily::PonteVecchio.core_family(), CoreFamily::XeHpcCore);
    }

    #[test]
    fn test_discrete_products_have_local_memory() {
        let dg2 = HardwareInfo::new(ProductFamily::Dg2, Stepping::B0);
        assert!(dg2.feature_table.contains(FeatureTable::LOCAL_MEMORY));
        let tgl = HardwareInfo::new(ProductFamily::Tigerlake, Stepping::A0);
        assert!(!tgl.feature_table.contains(FeatureTable::LOCAL_MEMORY));
    }
}
