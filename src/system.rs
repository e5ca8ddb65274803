//! # Mesh system boundary
//!
//! The stateful simulation object (bodies, meshes, eclipse detection, per-triangle observables)
//! lives outside this crate. The orchestration drives it through [`MeshSystem`], advancing it in
//! place once per time step and reading back owned [`MeshReadout`] copies.
//!
//! Two stateless geometric services complete the boundary:
//!
//! * [`EclipseTimingSolver`] – time of the eclipse crossing closest to an ephemeris time.
//! * [`HorizonSolver`] – closed-form horizon polylines for Roche bodies.
//!
//! Readout contract
//! -----------------
//! A [`MeshReadout`] is a copy of the body's current mesh. It stays valid as data after the next
//! [`MeshSystem::update_positions`] call; the system itself only keeps its current state.
use std::collections::BTreeMap;
use std::fmt;

use hifitime::Duration;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::bundle::LimbDarkening;
use crate::constants::{Day, Meter, SolRad};
use crate::dynamics::{DynamicsMethod, DynamicsState, EulerAngles, VolumeHints};
use crate::observables::ObservableKind;
use crate::synth_errors::SynthError;

/// Named arrays returned by [`MeshSystem::observe`].
///
/// Scalar observables (`flux`, `rv`) are single-element arrays.
pub type Observation = BTreeMap<String, Vec<f64>>;

/// Numerical horizon polyline of every meshable component, keyed by component label.
pub type Horizons = BTreeMap<String, Vec<Vector3<f64>>>;

/// Shape model of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistortionMethod {
    Roche,
    Rotstar,
    Sphere,
    None,
}

impl DistortionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistortionMethod::Roche => "roche",
            DistortionMethod::Rotstar => "rotstar",
            DistortionMethod::Sphere => "sphere",
            DistortionMethod::None => "none",
        }
    }
}

impl fmt::Display for DistortionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Surface discretization scheme of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshMethod {
    Marching,
    Wd,
}

impl fmt::Display for MeshMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshMethod::Marching => f.write_str("marching"),
            MeshMethod::Wd => f.write_str("wd"),
        }
    }
}

/// Roche potential parameters the mesh was built with.
///
/// * `q` – mass ratio.
/// * `f` – synchronicity parameter.
/// * `d` – instantaneous separation (units of semi-major axis).
/// * `phi` – surface potential.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RocheMeshArgs {
    pub q: f64,
    pub f: f64,
    pub d: f64,
    pub phi: f64,
}

/// Shape and discretization of a body, as needed by the analytic horizon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyGeometry {
    pub distortion: DistortionMethod,
    pub mesh_method: MeshMethod,
    pub mesh_args: RocheMeshArgs,
    /// Length scale of the mesh (solRad per unit of mesh coordinate).
    pub scale: SolRad,
}

/// Distance and third light applied to integrated observations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObserveOptions {
    pub distance: Meter,
    pub l3: f64,
}

/// Owned copy of a body's mesh.
///
/// Per-triangle arrays share one length: the triangle count. Protomesh readouts leave
/// `mus`, `r_projs`, `visibilities` and `weights` empty since the body is not placed in orbit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshReadout {
    pub pot: Option<f64>,
    pub rpole: Option<f64>,
    pub volume: Option<f64>,
    pub centers: Vec<Vector3<f64>>,
    pub velocities: Vec<Vector3<f64>>,
    pub vertices: Vec<[Vector3<f64>; 3]>,
    /// Per-vertex visibility weights.
    pub weights: Vec<[f64; 3]>,
    pub normals: Vec<Vector3<f64>>,
    pub areas: Vec<f64>,
    pub mus: Vec<f64>,
    pub loggs: Vec<f64>,
    pub teffs: Vec<f64>,
    pub rs: Vec<f64>,
    pub r_projs: Vec<f64>,
    pub visibilities: Vec<f64>,
    pub cosbetas: Vec<f64>,
}

impl MeshReadout {
    pub fn n_triangles(&self) -> usize {
        self.centers.len()
    }
}

/// Stateful simulation of every body in the system.
///
/// Methods taking `&mut self` advance or mutate the simulation; the orchestration never calls
/// them while holding a readout borrowed from it.
pub trait MeshSystem {
    /// Build every body's mesh at periastron.
    fn initialize_meshes(&mut self) -> Result<(), SynthError>;

    /// Place every body at `time`.
    ///
    /// Arguments
    /// -----------------
    /// * `state` – positions, velocities and orientations of every star.
    /// * `hints` – instantaneous separations and flux scales for volume-conserving remeshing,
    ///   `None` to derive them from the orbit.
    /// * `ignore_effects` – skip eclipses, boosting and other effects (calibration pass).
    fn update_positions(
        &mut self,
        time: Day,
        state: &DynamicsState,
        hints: Option<&VolumeHints>,
        ignore_effects: bool,
    ) -> Result<(), SynthError>;

    /// Resolve visibilities, returning the numerical horizons when `expose_horizon` is set.
    fn handle_eclipses(&mut self, expose_horizon: bool) -> Result<Option<Horizons>, SynthError>;

    /// Fill per-triangle observables for each `(kind, dataset)` pair.
    fn populate_observables(
        &mut self,
        time: Day,
        requests: &[(ObservableKind, String)],
        ignore_effects: bool,
    ) -> Result<(), SynthError>;

    /// Integrate an observable over the visible surface.
    fn observe(
        &self,
        dataset: &str,
        kind: ObservableKind,
        component: Option<&str>,
        options: &ObserveOptions,
    ) -> Result<Observation, SynthError>;

    /// Copy of a body's current mesh.
    fn mesh_readout(&self, component: &str) -> Result<MeshReadout, SynthError>;

    /// Copy of a body's unscaled standard mesh at periastron, with surface gravities and
    /// temperatures filled.
    fn protomesh_readout(&mut self, component: &str) -> Result<MeshReadout, SynthError>;

    /// Per-triangle dataset-dependent column (`intensities`, `rvs`, ...) of a body.
    fn mesh_column(
        &self,
        component: &str,
        column: &str,
        dataset: &str,
    ) -> Result<Vec<f64>, SynthError>;

    fn body_geometry(&self, component: &str) -> Result<BodyGeometry, SynthError>;

    /// Compute and store the passband luminosity scale of a body from its requested luminosity.
    fn compute_pblum_scale(
        &mut self,
        component: &str,
        dataset: &str,
        pblum: f64,
        ld: &LimbDarkening,
    ) -> Result<f64, SynthError>;

    fn pblum_scale(&self, component: &str, dataset: &str) -> Option<f64>;

    fn set_pblum_scale(&mut self, component: &str, dataset: &str, scale: f64);

    /// Current passband luminosity of a body for a dataset.
    fn compute_luminosity(&self, component: &str, dataset: &str) -> Result<f64, SynthError>;
}

/// Eclipse-crossing solver for eclipse timing variations.
pub trait EclipseTimingSolver {
    /// Observed time of the eclipse of `component` closest to the ephemeris time `time`.
    fn crossing(
        &self,
        component: &str,
        time: Day,
        method: DynamicsMethod,
        ltte: bool,
        tol: Duration,
    ) -> Result<Day, SynthError>;
}

/// Closed-form horizons of Roche bodies.
pub trait HorizonSolver {
    fn marching(
        &self,
        args: &RocheMeshArgs,
        scale: SolRad,
        euler: &EulerAngles,
        pos: &Vector3<f64>,
    ) -> Result<Vec<Vector3<f64>>, SynthError>;

    fn wd(&self, time: Day, scale: SolRad, pos: &Vector3<f64>)
        -> Result<Vec<Vector3<f64>>, SynthError>;
}

/// First element of a named observation array.
pub(crate) fn scalar_observable(obs: &Observation, key: &str) -> Result<f64, SynthError> {
    obs.get(key)
        .and_then(|v| v.first())
        .copied()
        .ok_or_else(|| SynthError::MissingObservable(key.to_string()))
}
