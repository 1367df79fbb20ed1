//! # FORGE Core
//!
//! Foundational types shared by every FORGE subsystem.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          forge-core                            │
//! │  ┌────────────┐  ┌────────────┐  ┌──────────────────────────┐  │
//! │  │   Types    │  │   Error    │  │  RootDeviceEnvironment   │  │
//! │  │ (GpuAddr,  │  │ (Result,   │  │  HardwareInfo            │  │
//! │  │  Handle)   │  │  fatal)    │  │  ProductHelper tables    │  │
//! │  └────────────┘  └────────────┘  │  DebugSettings           │  │
//! │                                  └──────────────────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing in this crate is global. Every capability table and debug knob
//! hangs off a [`RootDeviceEnvironment`] that the caller creates once per
//! device and shares with everything that encodes work for that device.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod debug_settings;
pub mod environment;
pub mod error;
pub mod hw_info;
pub mod modes;
pub mod product_helper;
pub mod types;

// Re-exports for convenience
pub use debug_settings::DebugSettings;
pub use environment::RootDeviceEnvironment;
pub use error::{unrecoverable_if, Error, Result};
pub use hw_info::{CoreFamily, HardwareInfo, ProductFamily};
pub use modes::{GrfConfig, PreemptionMode, ThreadArbitrationPolicy};
pub use product_helper::ProductHelper;
pub use types::*;
