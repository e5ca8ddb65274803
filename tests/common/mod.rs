#![allow(dead_code)]

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::{FRAC_PI_2, PI};

use camino::{Utf8Path, Utf8PathBuf};
use hifitime::Duration;
use nalgebra::Vector3;

use binsynth::backends::legacy::{LegacyEngine, LegacyInput, LegacyMesh, LegacyValue};
use binsynth::backends::Services;
use binsynth::bundle::description::SystemDescription;
use binsynth::bundle::{Hierarchy, LimbDarkening};
use binsynth::constants::Day;
use binsynth::dynamics::{
    DynamicsMethod, DynamicsService, DynamicsState, DynamicsTrajectory, EulerAngles, VolumeHints,
};
use binsynth::observables::ObservableKind;
use binsynth::synth_errors::SynthError;
use binsynth::system::{
    BodyGeometry, DistortionMethod, EclipseTimingSolver, HorizonSolver, Horizons, MeshMethod,
    MeshReadout, MeshSystem, Observation, ObserveOptions, RocheMeshArgs,
};

pub fn binary() -> SystemDescription {
    SystemDescription::new(Hierarchy::new(vec!["primary".into(), "secondary".into()]))
}

/// Mesh system with a fixed number of triangles per body.
///
/// Light curves read `1 + t + l3` at the current time; radial velocities are the negated
/// line-of-sight velocity of the current state.
pub struct MockSystem {
    pub components: Vec<String>,
    pub n_triangles: usize,
    pub geometry: BTreeMap<String, BodyGeometry>,
    pub time: Day,
    pub state: Option<DynamicsState>,
    pub scales: HashMap<(String, String), f64>,
    pub initialized: usize,
    /// (time, ignore_effects, had volume hints)
    pub updates: Vec<(Day, bool, bool)>,
    /// expose_horizon of every eclipse pass
    pub eclipses: Vec<bool>,
    pub populated: Vec<(Day, Vec<(ObservableKind, String)>, bool)>,
}

impl MockSystem {
    pub fn new(components: &[&str]) -> Self {
        MockSystem {
            components: components.iter().map(|c| c.to_string()).collect(),
            n_triangles: 4,
            geometry: BTreeMap::new(),
            time: 0.0,
            state: None,
            scales: HashMap::new(),
            initialized: 0,
            updates: Vec::new(),
            eclipses: Vec::new(),
            populated: Vec::new(),
        }
    }

    pub fn binary() -> Self {
        MockSystem::new(&["primary", "secondary"])
    }

    pub fn with_geometry(
        mut self,
        component: &str,
        distortion: DistortionMethod,
        mesh_method: MeshMethod,
    ) -> Self {
        self.geometry.insert(
            component.to_string(),
            BodyGeometry {
                distortion,
                mesh_method,
                mesh_args: RocheMeshArgs {
                    q: 1.0,
                    f: 1.0,
                    d: 1.0,
                    phi: 3.5,
                },
                scale: 1.0,
            },
        );
        self
    }

    /// Step updates only, calibration excluded.
    pub fn step_updates(&self) -> usize {
        self.updates.iter().filter(|(_, ignore, _)| !ignore).count()
    }

    fn check(&self, component: &str) -> Result<usize, SynthError> {
        self.components
            .iter()
            .position(|c| c == component)
            .ok_or_else(|| SynthError::External(format!("unknown body '{component}'")))
    }

    fn position(&self, component: &str) -> Vector3<f64> {
        self.state
            .as_ref()
            .and_then(|s| s.position(component).ok())
            .unwrap_or_else(Vector3::zeros)
    }

    fn readout(&self, center: Vector3<f64>, velocity: Vector3<f64>, placed: bool) -> MeshReadout {
        let n = self.n_triangles;
        let centers: Vec<Vector3<f64>> = (0..n)
            .map(|k| center + Vector3::new(k as f64, 0.0, 0.0))
            .collect();
        let vertices = centers
            .iter()
            .map(|c| [*c, c + Vector3::x(), c + Vector3::y()])
            .collect();
        let weights = (0..n)
            .map(|k| if k == 0 { [0.0; 3] } else { [1.0 / 3.0; 3] })
            .collect();
        let filled = |v: f64| if placed { vec![v; n] } else { Vec::new() };
        MeshReadout {
            pot: Some(3.5),
            rpole: Some(1.0),
            volume: Some(4.18),
            velocities: if placed { vec![velocity; n] } else { Vec::new() },
            vertices,
            weights: if placed { weights } else { Vec::new() },
            normals: vec![Vector3::z(); n],
            areas: vec![1.0; n],
            mus: filled(0.5),
            loggs: vec![4.4; n],
            teffs: vec![5800.0; n],
            rs: vec![1.0; n],
            r_projs: filled(1.0),
            visibilities: if placed {
                (0..n).map(|k| if k == 0 { 0.0 } else { 1.0 }).collect()
            } else {
                Vec::new()
            },
            cosbetas: vec![1.0; n],
            centers,
        }
    }
}

impl MeshSystem for MockSystem {
    fn initialize_meshes(&mut self) -> Result<(), SynthError> {
        self.initialized += 1;
        Ok(())
    }

    fn update_positions(
        &mut self,
        time: Day,
        state: &DynamicsState,
        hints: Option<&VolumeHints>,
        ignore_effects: bool,
    ) -> Result<(), SynthError> {
        self.time = time;
        self.state = Some(state.clone());
        self.updates.push((time, ignore_effects, hints.is_some()));
        Ok(())
    }

    fn handle_eclipses(&mut self, expose_horizon: bool) -> Result<Option<Horizons>, SynthError> {
        self.eclipses.push(expose_horizon);
        if !expose_horizon {
            return Ok(None);
        }
        Ok(Some(
            self.components
                .iter()
                .map(|c| (c.clone(), vec![Vector3::x(), Vector3::y()]))
                .collect(),
        ))
    }

    fn populate_observables(
        &mut self,
        time: Day,
        requests: &[(ObservableKind, String)],
        ignore_effects: bool,
    ) -> Result<(), SynthError> {
        self.populated
            .push((time, requests.to_vec(), ignore_effects));
        Ok(())
    }

    fn observe(
        &self,
        _dataset: &str,
        kind: ObservableKind,
        component: Option<&str>,
        options: &ObserveOptions,
    ) -> Result<Observation, SynthError> {
        let mut obs = Observation::new();
        match kind {
            ObservableKind::Lc => {
                obs.insert("flux".into(), vec![1.0 + self.time + options.l3]);
            }
            ObservableKind::Rv => {
                let component = component.unwrap_or_default();
                let state = self
                    .state
                    .as_ref()
                    .ok_or_else(|| SynthError::MissingDynamics(component.into()))?;
                obs.insert("rv".into(), vec![-state.velocity(component)?.z]);
            }
            ObservableKind::Ifm => {
                obs.insert("vis2".into(), vec![self.time]);
                obs.insert("u".into(), vec![1.0, 2.0]);
            }
            other => return Err(SynthError::UnsupportedKind(other)),
        }
        Ok(obs)
    }

    fn mesh_readout(&self, component: &str) -> Result<MeshReadout, SynthError> {
        self.check(component)?;
        let velocity = self
            .state
            .as_ref()
            .and_then(|s| s.velocity(component).ok())
            .unwrap_or_else(Vector3::zeros);
        Ok(self.readout(self.position(component), velocity, true))
    }

    fn protomesh_readout(&mut self, component: &str) -> Result<MeshReadout, SynthError> {
        self.check(component)?;
        Ok(self.readout(Vector3::zeros(), Vector3::zeros(), false))
    }

    fn mesh_column(
        &self,
        component: &str,
        column: &str,
        _dataset: &str,
    ) -> Result<Vec<f64>, SynthError> {
        let k = self.check(component)?;
        if column.is_empty() {
            return Err(SynthError::MissingMeshColumn(column.into()));
        }
        Ok(vec![1.0 + k as f64; self.n_triangles])
    }

    fn body_geometry(&self, component: &str) -> Result<BodyGeometry, SynthError> {
        self.check(component)?;
        Ok(self.geometry.get(component).copied().unwrap_or(BodyGeometry {
            distortion: DistortionMethod::Roche,
            mesh_method: MeshMethod::Marching,
            mesh_args: RocheMeshArgs::default(),
            scale: 1.0,
        }))
    }

    fn compute_pblum_scale(
        &mut self,
        component: &str,
        dataset: &str,
        pblum: f64,
        _ld: &LimbDarkening,
    ) -> Result<f64, SynthError> {
        let k = self.check(component)?;
        let scale = pblum / (4.0 * PI) * (1.0 + k as f64);
        self.scales
            .insert((component.to_string(), dataset.to_string()), scale);
        Ok(scale)
    }

    fn pblum_scale(&self, component: &str, dataset: &str) -> Option<f64> {
        self.scales
            .get(&(component.to_string(), dataset.to_string()))
            .copied()
    }

    fn set_pblum_scale(&mut self, component: &str, dataset: &str, scale: f64) {
        self.scales
            .insert((component.to_string(), dataset.to_string()), scale);
    }

    fn compute_luminosity(&self, component: &str, dataset: &str) -> Result<f64, SynthError> {
        Ok(self.pblum_scale(component, dataset).unwrap_or(1.0) * 4.0 * PI)
    }
}

/// Circular orbits of two stars around the barycenter, in the x–z plane (z towards the observer).
pub struct MockDynamics {
    pub components: Vec<String>,
    pub period: Day,
    pub radii: Vec<f64>,
    pub calls: Cell<usize>,
    /// Return one sample less than requested.
    pub truncate: bool,
    /// Drop the last position of the outermost star.
    pub short_star: bool,
}

impl MockDynamics {
    pub fn binary() -> Self {
        MockDynamics {
            components: vec!["primary".into(), "secondary".into()],
            period: 1.0,
            radii: vec![1.0, 2.0],
            calls: Cell::new(0),
            truncate: false,
            short_star: false,
        }
    }

    pub fn omega(&self) -> f64 {
        2.0 * PI / self.period
    }
}

impl DynamicsService for MockDynamics {
    fn trajectory(
        &self,
        method: DynamicsMethod,
        _ltte: bool,
        times: &[Day],
    ) -> Result<DynamicsTrajectory, SynthError> {
        self.calls.set(self.calls.get() + 1);
        let times = if self.truncate && !times.is_empty() {
            &times[..times.len() - 1]
        } else {
            times
        };
        let w = self.omega();
        let mut traj = DynamicsTrajectory {
            components: self.components.clone(),
            times: times.to_vec(),
            ..DynamicsTrajectory::default()
        };
        for (k, r) in self.radii.iter().enumerate() {
            let sign = if k == 0 { 1.0 } else { -1.0 };
            traj.positions.push(
                times
                    .iter()
                    .map(|t| sign * r * Vector3::new((w * t).cos(), 0.0, (w * t).sin()))
                    .collect(),
            );
            traj.velocities.push(
                times
                    .iter()
                    .map(|t| sign * r * w * Vector3::new(-(w * t).sin(), 0.0, (w * t).cos()))
                    .collect(),
            );
            traj.euler.push(
                times
                    .iter()
                    .map(|t| EulerAngles {
                        theta: w * t,
                        long_an: 0.0,
                        incl: FRAC_PI_2,
                    })
                    .collect(),
            );
        }
        if method == DynamicsMethod::NBody {
            let sep: f64 = self.radii.iter().sum();
            traj.inst_separations = Some(vec![vec![sep; times.len()]; self.radii.len()]);
            traj.inst_flux_scales = Some(vec![vec![1.0; times.len()]; self.radii.len()]);
        }
        if self.short_star {
            if let Some(positions) = traj.positions.last_mut() {
                positions.pop();
            }
        }
        Ok(traj)
    }
}

/// Eclipses happen a fixed delay after the ephemeris.
pub struct MockEtv {
    pub delay: Day,
}

impl EclipseTimingSolver for MockEtv {
    fn crossing(
        &self,
        _component: &str,
        time: Day,
        _method: DynamicsMethod,
        _ltte: bool,
        _tol: Duration,
    ) -> Result<Day, SynthError> {
        Ok(time + self.delay)
    }
}

pub struct MockHorizon;

impl HorizonSolver for MockHorizon {
    fn marching(
        &self,
        _args: &RocheMeshArgs,
        scale: f64,
        _euler: &EulerAngles,
        pos: &Vector3<f64>,
    ) -> Result<Vec<Vector3<f64>>, SynthError> {
        Ok(vec![*pos, pos + Vector3::x() * scale])
    }

    fn wd(
        &self,
        _time: Day,
        scale: f64,
        pos: &Vector3<f64>,
    ) -> Result<Vec<Vector3<f64>>, SynthError> {
        Ok(vec![pos + Vector3::y() * scale; 3])
    }
}

/// Owner of the mock services a native run borrows.
pub struct MockServices {
    pub dynamics: MockDynamics,
    pub etv: MockEtv,
    pub horizons: MockHorizon,
}

impl MockServices {
    pub fn new() -> Self {
        MockServices {
            dynamics: MockDynamics::binary(),
            etv: MockEtv { delay: 0.01 },
            horizons: MockHorizon,
        }
    }

    pub fn services(&self) -> Services<'_> {
        Services {
            dynamics: &self.dynamics,
            etv: &self.etv,
            horizons: &self.horizons,
        }
    }
}

/// Legacy engine reading back its input file.
///
/// `lc` returns `1 + index + t`, `rv1` returns `10 t` and `rv2` returns `-10 t`. Meshes hold
/// `triangles` values per star and time: `tloc` and `glog` are `1000 d + i`, `Inorm` is
/// `100 d + i` (`d` the star digit, `i` the time index), gradients are `(3, 0, 4)`.
#[derive(Default)]
pub struct MockLegacy {
    pub input: Option<LegacyInput>,
    pub opened: Option<Utf8PathBuf>,
    pub pars: Vec<(String, LegacyValue)>,
    pub calls: Vec<String>,
    pub overrides: HashMap<String, String>,
    pub fail_configure: bool,
    pub triangles: usize,
}

impl MockLegacy {
    pub fn new() -> Self {
        MockLegacy {
            triangles: 2,
            ..MockLegacy::default()
        }
    }

    fn mesh(&self, times: &[Day]) -> LegacyMesh {
        let mut mesh = LegacyMesh::new();
        for d in 1..=2 {
            let per_time = |f: &dyn Fn(usize) -> f64| -> Vec<f64> {
                (0..times.len())
                    .flat_map(|i| vec![f(i); self.triangles])
                    .collect()
            };
            let base = 1000.0 * d as f64;
            mesh.insert(format!("tloc{d}"), per_time(&|i| base + i as f64));
            mesh.insert(format!("glog{d}"), per_time(&|i| base + i as f64));
            mesh.insert(format!("Inorm{d}"), per_time(&|i| 100.0 * d as f64 + i as f64));
            mesh.insert(format!("grx{d}"), per_time(&|_| 3.0));
            mesh.insert(format!("gry{d}"), per_time(&|_| 0.0));
            mesh.insert(format!("grz{d}"), per_time(&|_| 4.0));
            mesh.insert(format!("vcx{d}"), per_time(&|_| 0.5));
        }
        mesh
    }
}

impl LegacyEngine for MockLegacy {
    fn init(&mut self) -> Result<(), SynthError> {
        self.calls.push("init".into());
        Ok(())
    }

    fn configure(&mut self) -> Result<(), SynthError> {
        if self.fail_configure {
            return Err(SynthError::External("no config file".into()));
        }
        self.calls.push("configure".into());
        Ok(())
    }

    fn open(&mut self, path: &Utf8Path) -> Result<(), SynthError> {
        let text = std::fs::read_to_string(path)?;
        self.input = Some(LegacyInput::parse(&text)?);
        self.opened = Some(path.to_path_buf());
        self.calls.push("open".into());
        Ok(())
    }

    fn set_par(&mut self, name: &str, value: LegacyValue) -> Result<(), SynthError> {
        self.pars.push((name.to_string(), value));
        Ok(())
    }

    fn get_par(&self, name: &str, index: usize) -> Result<String, SynthError> {
        let key = format!("{name}[{}]", index + 1);
        if let Some(v) = self.overrides.get(&key) {
            return Ok(v.clone());
        }
        self.input
            .as_ref()
            .and_then(|input| input.get_indexed(name, index))
            .map(LegacyValue::as_par)
            .ok_or_else(|| SynthError::LegacyEngine(format!("no parameter {key}")))
    }

    fn lc(&mut self, times: &[Day], index: usize) -> Result<Vec<f64>, SynthError> {
        self.calls.push(format!("lc:{index}"));
        Ok(times.iter().map(|t| 1.0 + index as f64 + t).collect())
    }

    fn lc_with_mesh(
        &mut self,
        times: &[Day],
        index: usize,
    ) -> Result<(Vec<f64>, LegacyMesh), SynthError> {
        self.calls.push(format!("lc_with_mesh:{index}"));
        let fluxes = times.iter().map(|t| 1.0 + index as f64 + t).collect();
        Ok((fluxes, self.mesh(times)))
    }

    fn rv1(&mut self, times: &[Day], index: usize) -> Result<Vec<f64>, SynthError> {
        self.calls.push(format!("rv1:{index}"));
        Ok(times.iter().map(|t| 10.0 * t).collect())
    }

    fn rv2(&mut self, times: &[Day], index: usize) -> Result<Vec<f64>, SynthError> {
        self.calls.push(format!("rv2:{index}"));
        Ok(times.iter().map(|t| -10.0 * t).collect())
    }
}
