//! # Compute backends
//!
//! Two execution strategies share the planner and the synthetic containers:
//!
//! * [`native`] – time-ordered step orchestrator. Plans a global time grid, advances a
//!   [`MeshSystem`](crate::system::MeshSystem) once per step and fills every active container.
//!   Can be consumed step by step ([`NativeRun`] is an [`Iterator`]) or run to completion.
//! * [`legacy`] – adapter around a third-party engine that computes whole datasets per call.
//!   Writes the engine input file, then fills containers one dataset at a time.
pub(crate) mod fill;
pub mod legacy;
pub mod native;

#[cfg(feature = "progress")]
pub(crate) mod progress_bar;

pub use legacy::{run_legacy, LegacyEngine, LegacyOutput};
pub use native::{run_native, NativeRun, Services};
