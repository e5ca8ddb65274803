//! Per-kind fillers of the native step loop.
//!
//! Each active work item is dispatched once per step by [`fill_item`], a closed `match` over
//! [`ObservableKind`]. Scalar kinds append one value to their container; mesh items overwrite the
//! snapshot at the current time.
use nalgebra::Vector3;

use crate::backends::native::Services;
use crate::bundle::Bundle;
use crate::compute::ComputeOptions;
use crate::constants::{Day, KmPerSec, Meter, SolRadPerDay, SOLRAD_PER_DAY_TO_KM_PER_S};
use crate::dynamics::DynamicsState;
use crate::observables::ObservableKind;
use crate::planning::WorkItem;
use crate::synth_errors::SynthError;
use crate::synthetics::mesh::MeshSnapshot;
use crate::synthetics::{SyntheticData, SyntheticSet};
use crate::system::{
    scalar_observable, DistortionMethod, Horizons, MeshMethod, MeshReadout, MeshSystem,
    ObserveOptions,
};

/// Everything a filler may read at one time step.
pub(crate) struct StepContext<'a> {
    pub time: Day,
    pub state: &'a DynamicsState,
    pub horizons: Option<&'a Horizons>,
    /// Every item active at this step, including the one being filled.
    pub active: &'a [&'a WorkItem],
    pub bundle: &'a dyn Bundle,
    pub compute: &'a ComputeOptions,
    pub distance: Meter,
}

fn missing(item: &WorkItem, time: Option<Day>) -> SynthError {
    SynthError::MissingTarget {
        kind: item.kind,
        dataset: item.dataset.clone(),
        component: item.component.clone(),
        time,
    }
}

fn require_component(item: &WorkItem) -> Result<&str, SynthError> {
    item.component().ok_or_else(|| {
        SynthError::InvalidConfiguration(format!(
            "{} dataset '{}' must be attached to a component",
            item.kind, item.dataset
        ))
    })
}

/// Fill one work item at the current step.
pub(crate) fn fill_item<S: MeshSystem + ?Sized>(
    set: &mut SyntheticSet,
    system: &S,
    services: &Services<'_>,
    ctx: &StepContext<'_>,
    item: &WorkItem,
) -> Result<(), SynthError> {
    match item.kind {
        ObservableKind::Lc => fill_lc(set, system, ctx, item),
        ObservableKind::Rv => fill_rv(set, system, ctx, item),
        ObservableKind::Etv => fill_etv(set, services, ctx, item),
        ObservableKind::Ifm => fill_ifm(set, system, ctx, item),
        ObservableKind::Orb => fill_orb(set, ctx, item),
        ObservableKind::Mesh => fill_mesh(set, system, services, ctx, item),
        ObservableKind::Sp => Err(SynthError::UnsupportedKind(ObservableKind::Sp)),
    }
}

fn fill_lc<S: MeshSystem + ?Sized>(
    set: &mut SyntheticSet,
    system: &S,
    ctx: &StepContext<'_>,
    item: &WorkItem,
) -> Result<(), SynthError> {
    let options = ObserveOptions {
        distance: ctx.distance,
        l3: ctx.bundle.l3(&item.dataset),
    };
    let obs = system.observe(&item.dataset, item.kind, item.component(), &options)?;
    let flux = scalar_observable(&obs, "flux")?;

    let syn = set.get_unique_mut(item.kind, &item.dataset, item.component())?;
    let SyntheticData::Lc { fluxes, .. } = &mut syn.data else {
        return Err(missing(item, None));
    };
    fluxes.push(flux);
    Ok(())
}

fn fill_rv<S: MeshSystem + ?Sized>(
    set: &mut SyntheticSet,
    system: &S,
    ctx: &StepContext<'_>,
    item: &WorkItem,
) -> Result<(), SynthError> {
    let rv: SolRadPerDay = if item.needs_mesh {
        let options = ObserveOptions {
            distance: ctx.distance,
            l3: 0.0,
        };
        let obs = system.observe(&item.dataset, item.kind, item.component(), &options)?;
        scalar_observable(&obs, "rv")?
    } else {
        -ctx.state.velocity(require_component(item)?)?.z
    };

    let syn = set.get_unique_mut(item.kind, &item.dataset, item.component())?;
    let SyntheticData::Rv { rvs, .. } = &mut syn.data else {
        return Err(missing(item, None));
    };
    rvs.push(to_km_per_s(rv));
    Ok(())
}

/// Radial velocities are stored in km/s, with positive values moving away from the observer.
fn to_km_per_s(rv: SolRadPerDay) -> KmPerSec {
    rv * SOLRAD_PER_DAY_TO_KM_PER_S
}

fn fill_etv(
    set: &mut SyntheticSet,
    services: &Services<'_>,
    ctx: &StepContext<'_>,
    item: &WorkItem,
) -> Result<(), SynthError> {
    let component = require_component(item)?;
    let tol = ctx
        .compute
        .dataset(&item.dataset)
        .map(|d| d.etv_tol)
        .unwrap_or_else(|| crate::compute::DatasetCompute::default().etv_tol);

    let time_ecl = services.etv.crossing(
        component,
        ctx.time,
        ctx.compute.dynamics_method,
        ctx.compute.ltte,
        tol,
    )?;
    let n = ctx
        .bundle
        .cycle_number(&item.dataset, item.component(), ctx.time)?;

    let syn = set.get_unique_mut(item.kind, &item.dataset, item.component())?;
    let SyntheticData::Etv {
        time_ephems,
        time_ecls,
        etvs,
        ns,
    } = &mut syn.data
    else {
        return Err(missing(item, None));
    };
    time_ephems.push(ctx.time);
    time_ecls.push(time_ecl);
    etvs.push(time_ecl - ctx.time);
    ns.push(n);
    Ok(())
}

fn fill_ifm<S: MeshSystem + ?Sized>(
    set: &mut SyntheticSet,
    system: &S,
    ctx: &StepContext<'_>,
    item: &WorkItem,
) -> Result<(), SynthError> {
    let options = ObserveOptions {
        distance: ctx.distance,
        l3: 0.0,
    };
    let obs = system.observe(&item.dataset, item.kind, item.component(), &options)?;

    let syn = set.get_unique_mut(item.kind, &item.dataset, item.component())?;
    let SyntheticData::Ifm { columns, .. } = &mut syn.data else {
        return Err(missing(item, None));
    };
    for (key, values) in obs {
        columns.entry(key).or_default().extend(values);
    }
    Ok(())
}

fn fill_orb(
    set: &mut SyntheticSet,
    ctx: &StepContext<'_>,
    item: &WorkItem,
) -> Result<(), SynthError> {
    let component = require_component(item)?;
    let pos = ctx.state.position(component)?;
    let vel = ctx.state.velocity(component)?;

    let syn = set.get_unique_mut(item.kind, &item.dataset, item.component())?;
    let SyntheticData::Orb {
        xs,
        ys,
        zs,
        vxs,
        vys,
        vzs,
        ..
    } = &mut syn.data
    else {
        return Err(missing(item, None));
    };
    xs.push(pos.x);
    ys.push(pos.y);
    zs.push(pos.z);
    vxs.push(vel.x);
    vys.push(vel.y);
    vzs.push(vel.z);
    Ok(())
}

/// Weighted average of each triangle's vertices.
///
/// A triangle with all three weights zero is not visible and its centroid is undefined (NaN).
pub fn visible_centroids(
    vertices: &[[Vector3<f64>; 3]],
    weights: &[[f64; 3]],
) -> Vec<Vector3<f64>> {
    vertices
        .iter()
        .zip(weights)
        .map(|(tri, w)| {
            if w.iter().all(|&wi| wi == 0.0) {
                Vector3::repeat(f64::NAN)
            } else {
                tri[0] * w[0] + tri[1] * w[1] + tri[2] * w[2]
            }
        })
        .collect()
}

fn split_xyz(points: &[Vector3<f64>]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    (
        points.iter().map(|p| p.x).collect(),
        points.iter().map(|p| p.y).collect(),
        points.iter().map(|p| p.z).collect(),
    )
}

/// Copy the geometry shared by runtime meshes and the protomesh.
fn copy_geometry(snapshot: &mut MeshSnapshot, readout: &MeshReadout) {
    (snapshot.xs, snapshot.ys, snapshot.zs) = split_xyz(&readout.centers);
    (snapshot.nxs, snapshot.nys, snapshot.nzs) = split_xyz(&readout.normals);
    snapshot.vertices = readout.vertices.clone();
    snapshot.normals = readout.normals.clone();
    snapshot.areas = readout.areas.clone();
    snapshot.loggs = readout.loggs.clone();
    snapshot.teffs = readout.teffs.clone();
    snapshot.rs = readout.rs.clone();
    snapshot.cosbetas = readout.cosbetas.clone();
}

/// Fill the periastron reference snapshot. No line of sight exists, so there are no projected
/// radii, mus or visibilities.
pub(crate) fn fill_protomesh(snapshot: &mut MeshSnapshot, readout: &MeshReadout) {
    copy_geometry(snapshot, readout);
}

fn fill_mesh<S: MeshSystem + ?Sized>(
    set: &mut SyntheticSet,
    system: &S,
    services: &Services<'_>,
    ctx: &StepContext<'_>,
    item: &WorkItem,
) -> Result<(), SynthError> {
    let component = require_component(item)?;
    let readout = system.mesh_readout(component)?;

    let analytic_horizon = if ctx.compute.horizon {
        analytic_horizon(system, services, ctx, component)?
    } else {
        None
    };

    let snapshot = set.snapshot_mut(&item.dataset, Some(component), ctx.time)?;

    snapshot.pot = readout.pot;
    snapshot.rpole = readout.rpole;
    snapshot.volume = readout.volume;
    copy_geometry(snapshot, &readout);
    (snapshot.vxs, snapshot.vys, snapshot.vzs) = split_xyz(&readout.velocities);
    snapshot.mus = readout.mus.clone();
    snapshot.r_projs = readout.r_projs.clone();
    snapshot.visibilities = readout.visibilities.clone();
    snapshot.visible_centroids = visible_centroids(&readout.vertices, &readout.weights);

    if ctx.compute.horizon {
        if let Some(polyline) = ctx.horizons.and_then(|h| h.get(component)) {
            (snapshot.horizon_xs, snapshot.horizon_ys, snapshot.horizon_zs) = split_xyz(polyline);
        }
    }
    if let Some(polyline) = analytic_horizon {
        (
            snapshot.horizon_analytic_xs,
            snapshot.horizon_analytic_ys,
            snapshot.horizon_analytic_zs,
        ) = split_xyz(&polyline);
    }

    // dataset-dependent columns of every co-active item computed on the mesh
    for other in ctx
        .active
        .iter()
        .filter(|o| o.needs_mesh && o.kind != ObservableKind::Mesh)
    {
        let luminosity = system.compute_luminosity(component, &other.dataset)?;
        let dependent = snapshot.dependent.get_mut(&other.dataset).ok_or_else(|| {
            SynthError::MissingTarget {
                kind: ObservableKind::Mesh,
                dataset: other.dataset.clone(),
                component: Some(component.to_string()),
                time: Some(ctx.time),
            }
        })?;
        dependent.pblum = Some(luminosity);
        for column in other.kind.dependent_columns() {
            let values = system.mesh_column(component, column, &other.dataset)?;
            dependent.columns.insert(column.to_string(), values);
        }
    }

    Ok(())
}

/// Closed-form horizon of a body, `None` when its shape has none to offer.
///
/// Rotating single stars have no closed-form horizon and are rejected with
/// [`SynthError::UnsupportedHorizonMethod`] rather than skipped.
fn analytic_horizon<S: MeshSystem + ?Sized>(
    system: &S,
    services: &Services<'_>,
    ctx: &StepContext<'_>,
    component: &str,
) -> Result<Option<Vec<Vector3<f64>>>, SynthError> {
    let geometry = system.body_geometry(component)?;
    match (geometry.distortion, geometry.mesh_method) {
        (DistortionMethod::Roche, MeshMethod::Marching) => {
            let k = ctx.state.index_of(component)?;
            let horizon = services.horizons.marching(
                &geometry.mesh_args,
                geometry.scale,
                &ctx.state.euler[k],
                &ctx.state.positions[k],
            )?;
            Ok(Some(horizon))
        }
        (DistortionMethod::Roche, MeshMethod::Wd) => {
            let pos = ctx.state.position(component)?;
            let horizon = services.horizons.wd(ctx.time, geometry.scale, &pos)?;
            Ok(Some(horizon))
        }
        (DistortionMethod::Sphere | DistortionMethod::None, _) => Ok(None),
        (distortion, mesh_method) => Err(SynthError::UnsupportedHorizonMethod {
            distortion: distortion.to_string(),
            mesh_method: mesh_method.to_string(),
        }),
    }
}
