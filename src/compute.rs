//! # Compute configuration
//!
//! [`ComputeOptions`] carries everything a run needs beyond the system description: which
//! engine is used, which datasets it handles and how, and which optional mesh products
//! (protomesh, automesh, horizons) are requested.
//!
//! Dataset support
//! -----------------
//! A dataset that does not appear in [`ComputeOptions::datasets`] is not supported by the chosen
//! engine and is skipped by the planner. A dataset that appears with `enabled = false` is skipped
//! as well.
//!
//! Construction
//! -----------------
//! Use [`ComputeOptions::builder`] and finish with [`ComputeOptionsBuilder::build`], which
//! validates numerical settings (see its documentation for the exact rules).
//!
//! ```rust,no_run
//! use binsynth::compute::{ComputeOptions, DatasetCompute, EngineKind, LcMethod};
//!
//! let compute = ComputeOptions::builder()
//!     .engine(EngineKind::Native)
//!     .dataset("lc01", DatasetCompute::default().lc_method(LcMethod::Analytical))
//!     .protomesh(true)
//!     .build()
//!     .unwrap();
//! println!("{compute:#}");
//! ```
use std::collections::HashMap;
use std::fmt;

use ahash::RandomState;
use camino::Utf8PathBuf;
use hifitime::{Duration, Unit};
use serde::{Deserialize, Serialize};

use crate::dynamics::DynamicsMethod;
use crate::synth_errors::SynthError;
use crate::system::DistortionMethod;

/// Compute engine requested by the options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// In-crate step orchestrator driving a [`MeshSystem`](crate::system::MeshSystem).
    Native,
    /// Third-party engine driven through [`LegacyEngine`](crate::backends::legacy::LegacyEngine).
    Legacy,
    /// Point-mass photodynamical engine, without any surface mesh.
    Photodynamical,
}

impl EngineKind {
    pub fn supports_meshing(&self) -> bool {
        matches!(self, EngineKind::Native | EngineKind::Legacy)
    }

    pub fn supports_protomesh(&self) -> bool {
        self.supports_meshing()
    }

    pub fn supports_automesh(&self) -> bool {
        self.supports_meshing()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Native => "native",
            EngineKind::Legacy => "legacy",
            EngineKind::Photodynamical => "photodynam",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a light curve is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LcMethod {
    #[default]
    Numerical,
    Analytical,
}

/// How a radial velocity is computed for one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RvMethod {
    /// Intensity-weighted mean over the visible mesh.
    #[default]
    FluxWeighted,
    /// Center-of-mass velocity, no mesh needed.
    Dynamical,
}

/// Finite-time integration over the exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FtiMethod {
    #[default]
    None,
    Oversample,
}

/// Per-dataset compute options.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetCompute {
    pub enabled: bool,
    pub lc_method: LcMethod,
    /// Per-component rv method; components not listed use [`RvMethod::FluxWeighted`].
    pub rv_methods: HashMap<String, RvMethod, RandomState>,
    pub fti_method: FtiMethod,
    /// Number of sub-exposures when oversampling.
    pub fti_oversample: usize,
    /// Convergence tolerance of the eclipse-crossing solver.
    pub etv_tol: Duration,
}

impl Default for DatasetCompute {
    fn default() -> Self {
        DatasetCompute {
            enabled: true,
            lc_method: LcMethod::Numerical,
            rv_methods: HashMap::default(),
            fti_method: FtiMethod::None,
            fti_oversample: 5,
            etv_tol: Unit::Second * 1e-4,
        }
    }
}

impl DatasetCompute {
    pub fn enabled(mut self, v: bool) -> Self {
        self.enabled = v;
        self
    }

    pub fn lc_method(mut self, v: LcMethod) -> Self {
        self.lc_method = v;
        self
    }

    pub fn rv_method(mut self, component: &str, v: RvMethod) -> Self {
        self.rv_methods.insert(component.to_string(), v);
        self
    }

    pub fn fti(mut self, method: FtiMethod, oversample: usize) -> Self {
        self.fti_method = method;
        self.fti_oversample = oversample;
        self
    }

    pub fn etv_tol(mut self, v: Duration) -> Self {
        self.etv_tol = v;
        self
    }

    /// Radial-velocity method of a component (flux-weighted unless overridden).
    pub fn rv_method_of(&self, component: Option<&str>) -> RvMethod {
        component
            .and_then(|c| self.rv_methods.get(c))
            .copied()
            .unwrap_or_default()
    }
}

/// Compute configuration of a run.
///
/// Fields
/// -----------------
/// * `engine` – which engine runs the computation.
/// * `protomesh` – expose the periastron reference mesh.
/// * `pbmesh` – expose mesh snapshots at every mesh-requiring time (automesh).
/// * `horizon` – expose the numerical horizon and compute the analytic one.
/// * `dynamics_method` – orbital dynamics integrator.
/// * `ltte` – light-travel-time effects in dynamics and eclipse timings.
/// * `datasets` – per-dataset options; absent datasets are unsupported by the engine.
/// * `distortions` – per-component distortion method (default [`DistortionMethod::Roche`]).
/// * `legacy_input` – where the legacy engine input file is written (temp file if `None`).
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeOptions {
    pub engine: EngineKind,
    pub protomesh: bool,
    pub pbmesh: bool,
    pub horizon: bool,
    pub dynamics_method: DynamicsMethod,
    pub ltte: bool,
    pub datasets: HashMap<String, DatasetCompute, RandomState>,
    pub distortions: HashMap<String, DistortionMethod, RandomState>,
    pub legacy_input: Option<Utf8PathBuf>,
}

impl Default for ComputeOptions {
    fn default() -> Self {
        ComputeOptions {
            engine: EngineKind::Native,
            protomesh: false,
            pbmesh: false,
            horizon: false,
            dynamics_method: DynamicsMethod::Keplerian,
            ltte: false,
            datasets: HashMap::default(),
            distortions: HashMap::default(),
            legacy_input: None,
        }
    }
}

impl ComputeOptions {
    pub fn builder() -> ComputeOptionsBuilder {
        ComputeOptionsBuilder::new()
    }

    /// Options of a dataset, `None` if the engine does not support it.
    pub fn dataset(&self, dataset: &str) -> Option<&DatasetCompute> {
        self.datasets.get(dataset)
    }

    /// Whether a dataset is supported by the engine and enabled.
    pub fn is_enabled(&self, dataset: &str) -> bool {
        self.dataset(dataset).is_some_and(|d| d.enabled)
    }

    pub fn distortion(&self, component: &str) -> DistortionMethod {
        self.distortions
            .get(component)
            .copied()
            .unwrap_or(DistortionMethod::Roche)
    }
}

/// Builder for [`ComputeOptions`], with validation.
#[derive(Debug, Clone, Default)]
pub struct ComputeOptionsBuilder {
    options: ComputeOptions,
}

impl ComputeOptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: ComputeOptions::default(),
        }
    }

    pub fn engine(mut self, v: EngineKind) -> Self {
        self.options.engine = v;
        self
    }

    pub fn protomesh(mut self, v: bool) -> Self {
        self.options.protomesh = v;
        self
    }

    pub fn pbmesh(mut self, v: bool) -> Self {
        self.options.pbmesh = v;
        self
    }

    pub fn horizon(mut self, v: bool) -> Self {
        self.options.horizon = v;
        self
    }

    pub fn dynamics_method(mut self, v: DynamicsMethod) -> Self {
        self.options.dynamics_method = v;
        self
    }

    pub fn ltte(mut self, v: bool) -> Self {
        self.options.ltte = v;
        self
    }

    pub fn dataset(mut self, label: &str, v: DatasetCompute) -> Self {
        self.options.datasets.insert(label.to_string(), v);
        self
    }

    pub fn distortion(mut self, component: &str, v: DistortionMethod) -> Self {
        self.options.distortions.insert(component.to_string(), v);
        self
    }

    pub fn legacy_input(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.options.legacy_input = Some(path.into());
        self
    }

    /// Return true iff x > 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(std::cmp::Ordering::Greater)
    }

    /// Finalize the builder.
    ///
    /// The following checks are performed for every dataset:
    ///
    /// * `fti_oversample ≥ 1` when `fti_method` is [`FtiMethod::Oversample`].
    /// * `etv_tol > 0`.
    ///
    /// Returns
    /// -----------------
    /// * `Ok(ComputeOptions)` if all values are valid.
    /// * `Err(SynthError::InvalidComputeParameter)` naming the first offending dataset otherwise.
    pub fn build(self) -> Result<ComputeOptions, SynthError> {
        let mut labels: Vec<&String> = self.options.datasets.keys().collect();
        labels.sort();

        for label in labels {
            let d = &self.options.datasets[label];
            if d.fti_method == FtiMethod::Oversample && d.fti_oversample == 0 {
                return Err(SynthError::InvalidComputeParameter(format!(
                    "fti_oversample of dataset '{label}' must be >= 1"
                )));
            }
            if !Self::gt0(d.etv_tol.to_unit(Unit::Second)) {
                return Err(SynthError::InvalidComputeParameter(format!(
                    "etv_tol of dataset '{label}' must be > 0"
                )));
            }
        }

        Ok(self.options)
    }
}

impl fmt::Display for ComputeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 40;
            writeln!(f, "Compute Options")?;
            writeln!(f, "---------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Engine]")?;
            line!("engine          = {}", self.engine, "Compute engine")?;
            line!(
                "dynamics_method = {:?}",
                self.dynamics_method,
                "Orbital dynamics integrator"
            )?;
            line!("ltte            = {}", self.ltte, "Light travel time effects")?;

            writeln!(f, "\n[Mesh products]")?;
            line!("protomesh       = {}", self.protomesh, "Periastron mesh")?;
            line!("pbmesh          = {}", self.pbmesh, "Per-time mesh snapshots")?;
            line!("horizon         = {}", self.horizon, "Expose horizons")?;

            writeln!(f, "\n[Datasets]")?;
            let mut labels: Vec<&String> = self.datasets.keys().collect();
            labels.sort();
            for label in labels {
                let d = &self.datasets[label];
                line!(
                    "{}",
                    format!(
                        "{label:<15} = {}",
                        if d.enabled { "enabled" } else { "disabled" }
                    ),
                    format!(
                        "lc={:?} fti={:?}x{} etv_tol={}",
                        d.lc_method, d.fti_method, d.fti_oversample, d.etv_tol
                    )
                )?;
            }

            Ok(())
        } else {
            write!(
                f,
                "ComputeOptions(engine={}, datasets={}, protomesh={}, pbmesh={}, horizon={}, dynamics={:?}, ltte={})",
                self.engine,
                self.datasets.len(),
                self.protomesh,
                self.pbmesh,
                self.horizon,
                self.dynamics_method,
                self.ltte,
            )
        }
    }
}
