//! # FORGE State Tracking
//!
//! Caches the hardware state last programmed into a command stream so the
//! encoder only re-emits what changed.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      StreamProperties                        │
//! │  ┌──────────────────┐ ┌──────────────┐ ┌──────────────────┐  │
//! │  │ StateComputeMode │ │  FrontEnd    │ │  PipelineSelect  │  │
//! │  └──────────────────┘ └──────────────┘ └──────────────────┘  │
//! │  ┌──────────────────────────────────────────────────────┐    │
//! │  │                StateBaseAddress                      │    │
//! │  └──────────────────────────────────────────────────────┘    │
//! │                                                              │
//! │  every field: StreamProperty<T> { value, is_dirty, supported}│
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ init_support (once)
//!                     ┌──────────▼──────────┐
//!                     │ RootDeviceEnvironment│
//!                     │  capability tables   │
//!                     │  debug settings      │
//!                     └─────────────────────┘
//! ```
//!
//! ## Rules
//!
//! - A field the product does not program is never set and never dirty
//! - `set` reports a change only when the value differs
//! - Copying from another stream reports every programmed field
//! - Thread arbitration and GRF count resolve through [`OverrideSources`]

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod front_end;
pub mod pipeline_select;
pub mod precedence;
pub mod properties;
pub mod state_base_address;
pub mod state_compute_mode;
pub mod stream_property;

// Re-exports
pub use front_end::FrontEndProperties;
pub use pipeline_select::PipelineSelectProperties;
pub use precedence::OverrideSources;
pub use properties::StreamProperties;
pub use state_base_address::{StateBaseAddressProperties, StateBaseAddressValues};
pub use state_compute_mode::StateComputeModeProperties;
pub use stream_property::StreamProperty;
