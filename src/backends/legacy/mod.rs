//! # Legacy engine adapter
//!
//! Drives a third-party engine that computes whole light curves and radial-velocity curves per
//! call. The engine is configured through an input file written from the description
//! ([`input_file`]), then queried dataset by dataset on a per-dataset plan
//! ([`plan_by_dataset`]).
//!
//! Scope
//! -----------------
//! * Detached binaries only: exactly two stars.
//! * Light curves and radial velocities. Mesh datasets are not filled; they are reported in
//!   [`LegacyOutput::unfilled_meshes`]. Any other kind is [`SynthError::UnsupportedKind`].
//! * Protomesh and automesh are translated from the engine's octant meshes
//!   ([`mesh_translation`]).
//!
//! Warnings are printed to stderr and collected in [`LegacyOutput::warnings`].
use std::sync::atomic::{AtomicUsize, Ordering};

use camino::{Utf8Path, Utf8PathBuf};

use crate::bundle::Bundle;
use crate::compute::{ComputeOptions, EngineKind, RvMethod};
use crate::constants::Day;
use crate::observables::ObservableKind;
use crate::planning::{plan_by_dataset, PlanOptions, WorkItem};
use crate::synth_errors::SynthError;
use crate::synthetics::{allocate, SyntheticData, SyntheticSet};

pub mod input_file;
pub mod mesh_translation;

pub use input_file::{LegacyInput, LegacyValue};
pub use mesh_translation::LegacyMesh;

/// Third-party engine API.
///
/// Curve indices are 0-based and address the curves declared in the input file, in order.
pub trait LegacyEngine {
    fn init(&mut self) -> Result<(), SynthError>;

    /// Load the engine's own configuration.
    fn configure(&mut self) -> Result<(), SynthError>;

    /// Load an input file.
    fn open(&mut self, path: &Utf8Path) -> Result<(), SynthError>;

    fn set_par(&mut self, name: &str, value: LegacyValue) -> Result<(), SynthError>;

    /// Value of an indexed parameter, strings unquoted.
    fn get_par(&self, name: &str, index: usize) -> Result<String, SynthError>;

    /// Fluxes of light curve `index` at `times`.
    fn lc(&mut self, times: &[Day], index: usize) -> Result<Vec<f64>, SynthError>;

    /// Fluxes of light curve `index` and the octant meshes at every time, concatenated.
    fn lc_with_mesh(
        &mut self,
        times: &[Day],
        index: usize,
    ) -> Result<(Vec<f64>, LegacyMesh), SynthError>;

    /// Primary radial velocities (km/s) of curve `index`.
    fn rv1(&mut self, times: &[Day], index: usize) -> Result<Vec<f64>, SynthError>;

    /// Secondary radial velocities (km/s) of curve `index`.
    fn rv2(&mut self, times: &[Day], index: usize) -> Result<Vec<f64>, SynthError>;
}

/// Result of a legacy run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LegacyOutput {
    pub synthetics: SyntheticSet,
    pub warnings: Vec<String>,
    /// (dataset, component) of mesh datasets the engine cannot fill.
    pub unfilled_meshes: Vec<(String, Option<String>)>,
}

impl LegacyOutput {
    fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }
}

static INPUT_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Unique input file path in the system temp directory.
fn temp_input_path() -> Result<Utf8PathBuf, SynthError> {
    let n = INPUT_COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "binsynth_legacy_{}_{n}.phoebe",
        std::process::id()
    ));
    Utf8PathBuf::from_path_buf(path)
        .map_err(|p| SynthError::Utf8PathError(p.display().to_string()))
}

fn trim_quotes(s: &str) -> &str {
    s.trim().trim_matches('"')
}

/// Role ("primary" or "secondary") announced by an rv dependent-variable label.
fn dep_role(dep: &str) -> String {
    dep.split(' ').next().unwrap_or_default().to_lowercase()
}

/// Index of the engine rv curve holding (dataset, star `star_index`).
///
/// The engine holds at most two rv curves. Among the curves whose id is `dataset`, the one whose
/// dependent variable names the star's role wins; otherwise the first id match.
fn rv_curve_index<E: LegacyEngine + ?Sized>(
    engine: &E,
    dataset: &str,
    star_index: usize,
) -> Result<usize, SynthError> {
    let role = if star_index == 0 { "primary" } else { "secondary" };
    let mut first_match = None;
    for index in 0..2 {
        let Ok(id) = engine.get_par("phoebe_rv_id", index) else {
            continue;
        };
        if trim_quotes(&id) != dataset {
            continue;
        }
        let dep = engine.get_par("phoebe_rv_dep", index).unwrap_or_default();
        if dep_role(trim_quotes(&dep)) == role {
            return Ok(index);
        }
        first_match.get_or_insert(index);
    }
    first_match.ok_or_else(|| {
        SynthError::InvalidConfiguration(format!(
            "rv dataset '{dataset}' is not declared in the legacy engine input"
        ))
    })
}

/// Index of the engine light curve whose id is `dataset`.
///
/// The engine numbers every enabled light curve, including those without times, so the index
/// is read back from the loaded input rather than counted.
fn lc_curve_index<E: LegacyEngine + ?Sized>(
    engine: &E,
    dataset: &str,
) -> Result<usize, SynthError> {
    (0..)
        .map_while(|index| engine.get_par("phoebe_lc_id", index).ok())
        .position(|id| trim_quotes(&id) == dataset)
        .ok_or_else(|| {
            SynthError::InvalidConfiguration(format!(
                "lc dataset '{dataset}' is not declared in the legacy engine input"
            ))
        })
}

/// Run the legacy engine over every enabled dataset.
///
/// Arguments
/// -----------------
/// * `engine` – the engine to drive. The run initializes and configures it, then loads the
///   generated input file.
/// * `times_override` – replaces every non-empty dataset time array.
///
/// Return
/// ----------
/// * The filled containers with warnings and the mesh datasets left unfilled.
pub fn run_legacy<E: LegacyEngine + ?Sized>(
    bundle: &dyn Bundle,
    compute: &ComputeOptions,
    engine: &mut E,
    times_override: Option<Vec<Day>>,
) -> Result<LegacyOutput, SynthError> {
    if compute.engine != EngineKind::Legacy {
        return Err(SynthError::InvalidConfiguration(format!(
            "legacy run requested with the '{}' engine",
            compute.engine
        )));
    }
    let stars = bundle.hierarchy().stars().to_vec();
    if stars.len() != 2 {
        return Err(SynthError::InvalidConfiguration(format!(
            "the legacy engine only handles binaries, got {} stars",
            stars.len()
        )));
    }

    let (input_path, is_temp) = match &compute.legacy_input {
        Some(path) => (path.clone(), false),
        None => (temp_input_path()?, true),
    };
    LegacyInput::from_bundle(bundle, compute).write(&input_path)?;

    let result = drive(bundle, compute, engine, &stars, &input_path, times_override);
    if is_temp {
        let _ = std::fs::remove_file(&input_path);
    }
    result
}

fn drive<E: LegacyEngine + ?Sized>(
    bundle: &dyn Bundle,
    compute: &ComputeOptions,
    engine: &mut E,
    stars: &[String],
    input_path: &Utf8Path,
    times_override: Option<Vec<Day>>,
) -> Result<LegacyOutput, SynthError> {
    engine
        .init()
        .map_err(|e| SynthError::LegacyEngine(format!("initialization failed: {e}")))?;
    engine.configure().map_err(|e| {
        SynthError::LegacyEngine(format!(
            "configuration failed, create the engine configuration file first: {e}"
        ))
    })?;
    engine.open(input_path).map_err(|e| {
        SynthError::LegacyEngine(format!("cannot open input file '{input_path}': {e}"))
    })?;

    let plan = plan_by_dataset(
        bundle,
        compute,
        &PlanOptions::from_compute(compute, times_override),
    );
    let mut output = LegacyOutput {
        synthetics: allocate(&plan.items),
        ..LegacyOutput::default()
    };

    if compute.protomesh {
        let t0_perpass = bundle.t0_perpass();
        engine.set_par("phoebe_lcno", LegacyValue::Int(1))?;
        let (_, mesh) = engine.lc_with_mesh(&[t0_perpass], 0)?;
        mesh_translation::translate_protomesh(
            &mesh,
            stars,
            t0_perpass,
            &mut output.synthetics,
            &mut output.warnings,
        )?;
    }

    for item in plan.groupings() {
        match item.kind {
            ObservableKind::Lc => {
                let index = lc_curve_index(engine, &item.dataset)?;
                let fluxes = if compute.pbmesh {
                    let (fluxes, mesh) = engine.lc_with_mesh(&item.times, index)?;
                    mesh_translation::translate_automesh(
                        &mesh,
                        stars,
                        &item.times,
                        &item.dataset,
                        &mut output.synthetics,
                        &mut output.warnings,
                    )?;
                    fluxes
                } else {
                    engine.lc(&item.times, index)?
                };
                store_lc(&mut output.synthetics, item, fluxes)?;
            }
            ObservableKind::Rv => {
                let rvs = compute_rv(compute, engine, stars, item)?;
                store_rv(&mut output.synthetics, item, rvs)?;
            }
            ObservableKind::Mesh => {
                output
                    .unfilled_meshes
                    .push((item.dataset.clone(), item.component.clone()));
                output.warn(format!(
                    "mesh dataset '{}' is not filled by the legacy engine",
                    item.dataset
                ));
            }
            kind => return Err(SynthError::UnsupportedKind(kind)),
        }
    }

    for warning in &output.warnings {
        eprintln!("Warning: {warning}");
    }

    Ok(output)
}

fn compute_rv<E: LegacyEngine + ?Sized>(
    compute: &ComputeOptions,
    engine: &mut E,
    stars: &[String],
    item: &WorkItem,
) -> Result<Vec<f64>, SynthError> {
    let component = item.component().unwrap_or_default();
    let star_index = stars.iter().position(|s| s == component).ok_or_else(|| {
        SynthError::InvalidConfiguration(format!(
            "'{component}' is not the primary or the secondary star"
        ))
    })?;
    let index = rv_curve_index(engine, &item.dataset, star_index)?;

    // proximity effects follow the primary's rv method
    let flux_weighted = compute
        .dataset(&item.dataset)
        .map_or(RvMethod::FluxWeighted, |d| d.rv_method_of(Some(&stars[0])))
        == RvMethod::FluxWeighted;
    let switch = LegacyValue::Int(i64::from(flux_weighted));

    if star_index == 0 {
        engine.set_par("phoebe_proximity_rv1_switch", switch)?;
        engine.rv1(&item.times, index)
    } else {
        engine.set_par("phoebe_proximity_rv2_switch", switch)?;
        engine.rv2(&item.times, index)
    }
}

fn store_lc(set: &mut SyntheticSet, item: &WorkItem, values: Vec<f64>) -> Result<(), SynthError> {
    let syn = set.get_unique_mut(item.kind, &item.dataset, item.component())?;
    let SyntheticData::Lc { times, fluxes } = &mut syn.data else {
        return Err(missing(item));
    };
    *times = item.times.clone();
    *fluxes = values;
    Ok(())
}

fn store_rv(set: &mut SyntheticSet, item: &WorkItem, values: Vec<f64>) -> Result<(), SynthError> {
    let syn = set.get_unique_mut(item.kind, &item.dataset, item.component())?;
    let SyntheticData::Rv { times, rvs } = &mut syn.data else {
        return Err(missing(item));
    };
    *times = item.times.clone();
    *rvs = values;
    Ok(())
}

fn missing(item: &WorkItem) -> SynthError {
    SynthError::MissingTarget {
        kind: item.kind,
        dataset: item.dataset.clone(),
        component: item.component.clone(),
        time: None,
    }
}
