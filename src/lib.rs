pub mod backends;
pub mod bundle;
pub mod compute;
pub mod constants;
pub mod dynamics;
pub mod observables;
pub mod pblum;
pub mod planning;
pub mod synth_errors;
pub mod synthetics;
pub mod system;

pub use backends::{run_legacy, run_native, NativeRun, Services};
pub use synth_errors::SynthError;
pub use synthetics::{Synthetic, SyntheticData, SyntheticFilter, SyntheticSet};
