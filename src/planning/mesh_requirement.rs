//! Mesh requirement resolution and virtual mesh datasets.
//!
//! [`needs_mesh`] decides whether a work item must be evaluated on the numerical mesh or can take
//! an analytic or dynamical shortcut. [`protomesh_items`] and [`pbmesh_items`] synthesize the two
//! virtual mesh datasets: the periastron reference snapshot and the per-time automesh.
use itertools::Itertools;
use ordered_float::OrderedFloat;

use crate::bundle::Bundle;
use crate::compute::{ComputeOptions, EngineKind, LcMethod, RvMethod};
use crate::constants::{PBMESH, PROTOMESH};
use crate::observables::ObservableKind;
use crate::planning::WorkItem;

/// Whether a (dataset, kind, component) must be computed on the numerical mesh.
///
/// Rules, in order:
/// * engines without numerical meshes never need one;
/// * only mesh, lc and rv can use a mesh;
/// * an analytical light curve on the native engine does not;
/// * an rv on the legacy engine, or with the dynamical method, does not.
pub fn needs_mesh(
    compute: &ComputeOptions,
    dataset: &str,
    kind: ObservableKind,
    component: Option<&str>,
) -> bool {
    if !compute.engine.supports_meshing() {
        return false;
    }
    let options = compute.dataset(dataset);
    match kind {
        ObservableKind::Mesh => true,
        ObservableKind::Lc => !(compute.engine == EngineKind::Native
            && options.is_some_and(|d| d.lc_method == LcMethod::Analytical)),
        ObservableKind::Rv => {
            compute.engine != EngineKind::Legacy
                && options.map_or(RvMethod::FluxWeighted, |d| d.rv_method_of(component))
                    != RvMethod::Dynamical
        }
        ObservableKind::Etv | ObservableKind::Ifm | ObservableKind::Orb | ObservableKind::Sp => {
            false
        }
    }
}

/// One periastron snapshot item per meshable component.
///
/// The protomesh is filled once before the time loop, so it never needs the per-step mesh.
pub fn protomesh_items(bundle: &dyn Bundle, compute: &ComputeOptions) -> Vec<WorkItem> {
    if !compute.engine.supports_protomesh() {
        return Vec::new();
    }
    let t0_perpass = bundle.t0_perpass();
    bundle
        .hierarchy()
        .meshables()
        .into_iter()
        .map(|component| WorkItem {
            dataset: PROTOMESH.to_string(),
            component: Some(component),
            kind: ObservableKind::Mesh,
            needs_mesh: false,
            times: vec![t0_perpass],
        })
        .collect()
}

/// Sorted, deduplicated union of the times of every mesh-requiring non-mesh item.
pub fn automesh_times(items: &[WorkItem]) -> Vec<f64> {
    items
        .iter()
        .filter(|item| item.needs_mesh && item.kind != ObservableKind::Mesh)
        .flat_map(|item| item.times.iter().copied())
        .map(OrderedFloat)
        .sorted()
        .dedup()
        .map(|t| t.into_inner())
        .collect()
}

/// One automesh item per meshable component, covering every mesh-requiring time.
///
/// Nothing is produced when no item requires the mesh.
pub fn pbmesh_items(
    bundle: &dyn Bundle,
    compute: &ComputeOptions,
    items: &[WorkItem],
) -> Vec<WorkItem> {
    if !compute.engine.supports_automesh() {
        return Vec::new();
    }
    let times = automesh_times(items);
    if times.is_empty() {
        return Vec::new();
    }
    bundle
        .hierarchy()
        .meshables()
        .into_iter()
        .map(|component| WorkItem {
            dataset: PBMESH.to_string(),
            component: Some(component),
            kind: ObservableKind::Mesh,
            needs_mesh: true,
            times: times.clone(),
        })
        .collect()
}
