//! # Passband luminosity calibration
//!
//! Before the time loop, every meshable component gets one absolute-to-relative intensity scale
//! per light-curve dataset. The system is placed at the reference epoch with effects ignored, its
//! light-curve observables are populated, then scales are resolved in two phases:
//!
//! 1. components whose reference is [`PblumRef::SelfScale`] compute their scale from the
//!    requested luminosity and limb darkening;
//! 2. components copying another component are resolved from a worklist, each one only once its
//!    source is resolved.
//!
//! Copies left over after phase 2 are fatal: a reference to a component that is not meshable is
//! [`SynthError::UnknownPblumReference`], anything else is a copy cycle
//! ([`SynthError::PblumReferenceCycle`]).
use std::collections::HashMap;

use ahash::RandomState;

use crate::bundle::{Bundle, PblumRef};
use crate::compute::ComputeOptions;
use crate::dynamics::DynamicsState;
use crate::observables::ObservableKind;
use crate::synth_errors::SynthError;
use crate::system::MeshSystem;

/// Resolved scales, keyed by `(component, dataset)`.
pub type PblumScales = HashMap<(String, String), f64, RandomState>;

/// Whether the description has any dataset whose intensities need a luminosity scale.
pub fn needs_calibration(bundle: &dyn Bundle) -> bool {
    bundle.datasets().iter().any(|d| {
        matches!(
            bundle.dataset_kind(d),
            Some(ObservableKind::Lc) | Some(ObservableKind::Rv)
        )
    })
}

/// Calibrate every (meshable component, enabled light-curve dataset) pair.
///
/// Arguments
/// -----------------
/// * `state0` – dynamics state at the reference epoch `bundle.t0()`.
///
/// Return
/// ----------
/// * The resolved scales, also stored in `system`. Empty if [`needs_calibration`] is false.
pub fn calibrate<S: MeshSystem + ?Sized>(
    bundle: &dyn Bundle,
    compute: &ComputeOptions,
    system: &mut S,
    state0: &DynamicsState,
) -> Result<PblumScales, SynthError> {
    let mut scales = PblumScales::default();
    if !needs_calibration(bundle) {
        return Ok(scales);
    }

    let t0 = bundle.t0();
    system.update_positions(t0, state0, None, true)?;

    let meshables = bundle.hierarchy().meshables();
    let lc_datasets = bundle.datasets().into_iter().filter(|d| {
        bundle.dataset_kind(d) == Some(ObservableKind::Lc) && compute.is_enabled(d)
    });

    for dataset in lc_datasets {
        system.populate_observables(t0, &[(ObservableKind::Lc, dataset.clone())], true)?;
        resolve_dataset(bundle, system, &dataset, &meshables, &mut scales)?;
    }

    Ok(scales)
}

fn resolve_dataset<S: MeshSystem + ?Sized>(
    bundle: &dyn Bundle,
    system: &mut S,
    dataset: &str,
    meshables: &[String],
    scales: &mut PblumScales,
) -> Result<(), SynthError> {
    // phase 1: self-computed scales
    let mut deferred: Vec<(String, String)> = Vec::new();
    for component in meshables {
        match bundle
            .pblum_ref(component, dataset)
            .unwrap_or(PblumRef::SelfScale)
        {
            PblumRef::SelfScale => {
                let pblum = bundle.pblum(component, dataset);
                let ld = bundle.limb_darkening(component, dataset);
                let scale = system.compute_pblum_scale(component, dataset, pblum, &ld)?;
                scales.insert((component.clone(), dataset.to_string()), scale);
            }
            PblumRef::Component(source) => deferred.push((component.clone(), source)),
        }
    }

    // phase 2: copies, each resolved once its source is
    while !deferred.is_empty() {
        let before = deferred.len();
        let mut pending = Vec::with_capacity(before);
        for (component, source) in deferred {
            let resolved = scales.get(&(source.clone(), dataset.to_string())).copied();
            match resolved {
                Some(scale) => {
                    system.set_pblum_scale(&component, dataset, scale);
                    scales.insert((component, dataset.to_string()), scale);
                }
                None => pending.push((component, source)),
            }
        }
        if pending.len() == before {
            return Err(unresolved_error(dataset, meshables, &pending));
        }
        deferred = pending;
    }

    Ok(())
}

/// Error describing why the remaining copies cannot be resolved.
fn unresolved_error(dataset: &str, meshables: &[String], pending: &[(String, String)]) -> SynthError {
    if let Some((component, source)) = pending
        .iter()
        .find(|(_, source)| !meshables.contains(source))
    {
        return SynthError::UnknownPblumReference {
            component: component.clone(),
            dataset: dataset.to_string(),
            reference: source.clone(),
        };
    }

    // every source is itself pending: follow the chain from the first entry until it loops
    let next_of = |c: &str| {
        pending
            .iter()
            .find(|(component, _)| component == c)
            .map(|(_, source)| source.clone())
    };
    let mut chain = vec![pending[0].0.clone()];
    let mut current = pending[0].1.clone();
    while !chain.contains(&current) {
        chain.push(current.clone());
        match next_of(&current) {
            Some(next) => current = next,
            None => break,
        }
    }
    chain.push(current);

    SynthError::PblumReferenceCycle {
        dataset: dataset.to_string(),
        components: chain,
    }
}
