//! # Orbital dynamics boundary
//!
//! The crate does not integrate orbits. A [`DynamicsService`] returns, for a list of times, the
//! barycentric position, velocity and orientation of every star, packed in a
//! [`DynamicsTrajectory`] whose arrays are index-aligned with the requested times.
//!
//! The step orchestrator only indexes into the trajectory; [`DynamicsTrajectory::at`] extracts the
//! per-step [`DynamicsState`] it hands to the mesh system.
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::constants::{Day, Radian};
use crate::synth_errors::SynthError;

/// Orbital dynamics integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DynamicsMethod {
    /// Full n-body integration.
    NBody,
    /// Bulirsch–Stoer integration.
    Bs,
    /// Nested Keplerian orbits.
    Keplerian,
}

impl DynamicsMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DynamicsMethod::NBody => "nbody",
            DynamicsMethod::Bs => "bs",
            DynamicsMethod::Keplerian => "keplerian",
        }
    }

    /// Whether the integrator reports instantaneous separations and flux scales, which the mesh
    /// system uses to rescale volumes.
    pub fn provides_volume_hints(&self) -> bool {
        matches!(self, DynamicsMethod::NBody)
    }
}

/// Orientation of a star: argument of the ascending node direction, longitude of the node and
/// inclination.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EulerAngles {
    pub theta: Radian,
    pub long_an: Radian,
    pub incl: Radian,
}

/// Per-star dynamical quantities, index-aligned with the requested times.
///
/// Fields
/// -----------------
/// * `components` – star labels, in the same order as the outer vectors.
/// * `positions` / `velocities` – `[star][time]`, in solRad and solRad/d.
/// * `euler` – `[star][time]` orientations.
/// * `inst_separations` / `inst_flux_scales` – `[star][time]`, only for integrators that
///   provide volume hints.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DynamicsTrajectory {
    pub components: Vec<String>,
    pub times: Vec<Day>,
    pub positions: Vec<Vec<Vector3<f64>>>,
    pub velocities: Vec<Vec<Vector3<f64>>>,
    pub euler: Vec<Vec<EulerAngles>>,
    pub inst_separations: Option<Vec<Vec<f64>>>,
    pub inst_flux_scales: Option<Vec<Vec<f64>>>,
}

/// Snapshot of every star at one time step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DynamicsState {
    pub components: Vec<String>,
    pub positions: Vec<Vector3<f64>>,
    pub velocities: Vec<Vector3<f64>>,
    pub euler: Vec<EulerAngles>,
}

impl DynamicsState {
    /// Index of a star in the state arrays.
    pub fn index_of(&self, component: &str) -> Result<usize, SynthError> {
        self.components
            .iter()
            .position(|c| c == component)
            .ok_or_else(|| SynthError::MissingDynamics(component.to_string()))
    }

    pub fn position(&self, component: &str) -> Result<Vector3<f64>, SynthError> {
        Ok(self.positions[self.index_of(component)?])
    }

    pub fn velocity(&self, component: &str) -> Result<Vector3<f64>, SynthError> {
        Ok(self.velocities[self.index_of(component)?])
    }

    /// State of a single isolated star: at rest at the origin, seen at inclination `incl`.
    pub fn single_star(component: &str, incl: Radian) -> Self {
        DynamicsState {
            components: vec![component.to_string()],
            positions: vec![Vector3::zeros()],
            velocities: vec![Vector3::zeros()],
            euler: vec![EulerAngles {
                theta: 0.0,
                long_an: 0.0,
                incl,
            }],
        }
    }
}

/// Instantaneous separation and flux scale of every star at one time step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VolumeHints {
    pub separations: Vec<f64>,
    pub flux_scales: Vec<f64>,
}

impl DynamicsTrajectory {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Check that every per-star array holds one sample per time and one row per component.
    ///
    /// [`at`](Self::at) and [`volume_hints`](Self::volume_hints) index without bounds checks on
    /// a validated trajectory.
    pub fn validate(&self) -> Result<(), SynthError> {
        let n = self.len();
        let stars = self.components.len();
        let check = |name: &str, rows: Vec<usize>| -> Result<(), SynthError> {
            if rows.len() != stars {
                return Err(SynthError::External(format!(
                    "dynamics returned {name} for {} components, expected {stars}",
                    rows.len()
                )));
            }
            match rows.iter().zip(&self.components).find(|(len, _)| **len != n) {
                Some((len, component)) => Err(SynthError::External(format!(
                    "dynamics returned {len} {name} samples of '{component}' for {n} times"
                ))),
                None => Ok(()),
            }
        };
        check("positions", self.positions.iter().map(Vec::len).collect())?;
        check("velocities", self.velocities.iter().map(Vec::len).collect())?;
        check("orientations", self.euler.iter().map(Vec::len).collect())?;
        if let Some(seps) = &self.inst_separations {
            check("separations", seps.iter().map(Vec::len).collect())?;
        }
        if let Some(scales) = &self.inst_flux_scales {
            check("flux scales", scales.iter().map(Vec::len).collect())?;
        }
        Ok(())
    }

    /// State of every star at time index `i`.
    pub fn at(&self, i: usize) -> Result<DynamicsState, SynthError> {
        if i >= self.len() {
            return Err(SynthError::External(format!(
                "dynamics trajectory has {} samples, index {i} requested",
                self.len()
            )));
        }
        let pick = |v: &Vec<Vec<Vector3<f64>>>| v.iter().map(|s| s[i]).collect::<Vec<_>>();
        Ok(DynamicsState {
            components: self.components.clone(),
            positions: pick(&self.positions),
            velocities: pick(&self.velocities),
            euler: self.euler.iter().map(|s| s[i]).collect(),
        })
    }

    /// Volume hints at time index `i`, if the integrator provided them.
    pub fn volume_hints(&self, i: usize) -> Option<VolumeHints> {
        let seps = self.inst_separations.as_ref()?;
        let scales = self.inst_flux_scales.as_ref()?;
        Some(VolumeHints {
            separations: seps.iter().map(|s| s[i]).collect(),
            flux_scales: scales.iter().map(|s| s[i]).collect(),
        })
    }

    /// Single-sample trajectory made of the trivial state of one star, replicated over `times`.
    pub fn single_star(component: &str, incl: Radian, times: &[Day]) -> Self {
        let n = times.len();
        DynamicsTrajectory {
            components: vec![component.to_string()],
            times: times.to_vec(),
            positions: vec![vec![Vector3::zeros(); n]],
            velocities: vec![vec![Vector3::zeros(); n]],
            euler: vec![vec![
                EulerAngles {
                    theta: 0.0,
                    long_an: 0.0,
                    incl,
                };
                n
            ]],
            inst_separations: None,
            inst_flux_scales: None,
        }
    }
}

/// Orbital dynamics integrator consumed by the orchestration.
pub trait DynamicsService {
    /// Positions, velocities and orientations of every star at `times`.
    ///
    /// Implementations must return one sample per requested time, in the requested order.
    fn trajectory(
        &self,
        method: DynamicsMethod,
        ltte: bool,
        times: &[Day],
    ) -> Result<DynamicsTrajectory, SynthError>;
}
