//! # Native step orchestrator
//!
//! [`NativeRun`] drives the whole time-domain computation of the native engine:
//!
//! 1. plan a global, strictly ascending [`TimeGrid`] (exposure oversampling allowed) and allocate
//!    one container per work item;
//! 2. obtain the positions of every star at every grid time, either from the
//!    [`DynamicsService`] or, for a single isolated star, from the trivial state;
//! 3. build the meshes, fill the periastron protomesh and calibrate passband luminosities;
//! 4. for every step: place the bodies and resolve eclipses only if an active item needs the
//!    mesh, then fill every active container.
//!
//! Step 4 is exposed through [`Iterator`], yielding the time of each completed step so a caller
//! can inspect [`NativeRun::synthetics`] between steps. [`NativeRun::run_to_completion`] consumes
//! the run and returns the same containers the streaming consumption ends with.
//!
//! An error aborts the run: the iterator yields it once and then ends.
use std::ops::ControlFlow;

use itertools::Itertools;

use crate::backends::fill::{self, StepContext};
use crate::bundle::Bundle;
use crate::compute::{ComputeOptions, EngineKind};
use crate::constants::{Day, Meter, PROTOMESH};
use crate::dynamics::{DynamicsService, DynamicsState, DynamicsTrajectory, VolumeHints};
use crate::observables::ObservableKind;
use crate::pblum::{self, PblumScales};
use crate::planning::{plan_by_time, PlanOptions, TimeGrid, WorkItem};
use crate::synth_errors::SynthError;
use crate::synthetics::{allocate, SyntheticSet};
use crate::system::{DistortionMethod, EclipseTimingSolver, HorizonSolver, MeshSystem};

/// Stateless external services consumed by the native run.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub dynamics: &'a dyn DynamicsService,
    pub etv: &'a dyn EclipseTimingSolver,
    pub horizons: &'a dyn HorizonSolver,
}

/// Where per-step positions come from.
enum Positions {
    Integrated(DynamicsTrajectory),
    /// Single isolated star at rest at the origin.
    Trivial(DynamicsState),
}

impl Positions {
    fn state(&self, i: usize) -> Result<DynamicsState, SynthError> {
        match self {
            Positions::Integrated(traj) => traj.at(i),
            Positions::Trivial(state) => Ok(state.clone()),
        }
    }

    fn volume_hints(&self, i: usize) -> Option<VolumeHints> {
        match self {
            Positions::Integrated(traj) => traj.volume_hints(i),
            Positions::Trivial(_) => None,
        }
    }
}

/// One native-engine run over a planned time grid.
pub struct NativeRun<'a, S: MeshSystem> {
    bundle: &'a dyn Bundle,
    compute: &'a ComputeOptions,
    system: S,
    services: Services<'a>,
    grid: TimeGrid,
    synthetics: SyntheticSet,
    positions: Positions,
    pblum_scales: PblumScales,
    distance: Meter,
    next: usize,
}

impl<'a, S: MeshSystem> NativeRun<'a, S> {
    /// Plan the run and prepare the system for stepping.
    ///
    /// Arguments
    /// -----------------
    /// * `system` – the mesh system, owned by the run and advanced in place.
    /// * `times_override` – replaces every non-empty dataset time array.
    ///
    /// Return
    /// ----------
    /// * A run positioned before its first step, with the protomesh filled and passband
    ///   luminosities calibrated.
    /// * [`SynthError::InvalidConfiguration`] for a non-native engine, a system without meshable
    ///   component or a single star with Roche distortion.
    pub fn new(
        bundle: &'a dyn Bundle,
        compute: &'a ComputeOptions,
        mut system: S,
        services: Services<'a>,
        times_override: Option<Vec<Day>>,
    ) -> Result<Self, SynthError> {
        if compute.engine != EngineKind::Native {
            return Err(SynthError::InvalidConfiguration(format!(
                "native run requested with the '{}' engine",
                compute.engine
            )));
        }

        let options = PlanOptions {
            allow_oversample: true,
            ..PlanOptions::from_compute(compute, times_override)
        };
        let grid = plan_by_time(bundle, compute, &options);
        let mut synthetics = allocate(&grid.items);

        let hierarchy = bundle.hierarchy();
        let meshables = hierarchy.meshables();
        let Some(first) = meshables.first() else {
            return Err(SynthError::InvalidConfiguration(
                "system has no meshable component".into(),
            ));
        };
        if hierarchy.stars().len() == 1
            && hierarchy.envelopes.is_empty()
            && compute.distortion(first) == DistortionMethod::Roche
        {
            return Err(SynthError::InvalidConfiguration(format!(
                "single star '{first}' cannot use roche distortion, use rotstar instead"
            )));
        }

        let t0 = bundle.t0();
        let (positions, state0) = if hierarchy.requires_dynamics() {
            let reference = services
                .dynamics
                .trajectory(compute.dynamics_method, compute.ltte, &[t0])?;
            let times = grid.times();
            let traj = if times.is_empty() {
                DynamicsTrajectory::default()
            } else {
                services
                    .dynamics
                    .trajectory(compute.dynamics_method, compute.ltte, &times)?
            };
            if traj.len() != times.len() {
                return Err(SynthError::External(format!(
                    "dynamics returned {} samples for {} requested times",
                    traj.len(),
                    times.len()
                )));
            }
            reference.validate()?;
            traj.validate()?;
            (Positions::Integrated(traj), reference.at(0)?)
        } else {
            let state = DynamicsState::single_star(first, bundle.inclination(first));
            (Positions::Trivial(state.clone()), state)
        };

        system.initialize_meshes()?;

        for item in grid.items.iter().filter(|i| i.dataset == PROTOMESH) {
            let Some(component) = item.component() else {
                continue;
            };
            let readout = system.protomesh_readout(component)?;
            for &t in &item.times {
                let snapshot = synthetics.snapshot_mut(PROTOMESH, Some(component), t)?;
                fill::fill_protomesh(snapshot, &readout);
            }
        }

        let pblum_scales = pblum::calibrate(bundle, compute, &mut system, &state0)?;

        Ok(NativeRun {
            bundle,
            compute,
            system,
            services,
            grid,
            synthetics,
            positions,
            pblum_scales,
            distance: bundle.distance(),
            next: 0,
        })
    }

    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    /// Containers as filled so far.
    pub fn synthetics(&self) -> &SyntheticSet {
        &self.synthetics
    }

    pub fn into_synthetics(self) -> SyntheticSet {
        self.synthetics
    }

    pub fn pblum_scales(&self) -> &PblumScales {
        &self.pblum_scales
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    /// Number of steps not yet computed.
    pub fn remaining(&self) -> usize {
        self.grid.len().saturating_sub(self.next)
    }

    fn step(&mut self, i: usize) -> Result<Day, SynthError> {
        let time = self.grid.steps[i].time;
        let state = self.positions.state(i)?;
        let active: Vec<&WorkItem> = self.grid.active_items(i).collect();

        let mut horizons = None;
        if active.iter().any(|item| item.needs_mesh) {
            let hints = if self.compute.dynamics_method.provides_volume_hints() {
                self.positions.volume_hints(i)
            } else {
                None
            };
            self.system
                .update_positions(time, &state, hints.as_ref(), false)?;

            let expose_horizon = self.compute.horizon
                && active.iter().any(|item| item.kind == ObservableKind::Mesh);
            horizons = self.system.handle_eclipses(expose_horizon)?;

            let requests: Vec<(ObservableKind, String)> = active
                .iter()
                .filter(|item| item.needs_mesh)
                .map(|item| (item.kind, item.dataset.clone()))
                .unique()
                .collect();
            self.system.populate_observables(time, &requests, false)?;
        }

        let ctx = StepContext {
            time,
            state: &state,
            horizons: horizons.as_ref(),
            active: &active,
            bundle: self.bundle,
            compute: self.compute,
            distance: self.distance,
        };
        for item in &active {
            fill::fill_item(
                &mut self.synthetics,
                &self.system,
                &self.services,
                &ctx,
                item,
            )?;
        }

        Ok(time)
    }

    /// Step through the run, handing the containers to `inspect` after every step.
    ///
    /// Stops early, without error, when `inspect` breaks.
    pub fn for_each_step<F>(mut self, mut inspect: F) -> Result<SyntheticSet, SynthError>
    where
        F: FnMut(Day, &SyntheticSet) -> ControlFlow<()>,
    {
        while let Some(step) = self.next() {
            let time = step?;
            if inspect(time, &self.synthetics).is_break() {
                break;
            }
        }
        Ok(self.synthetics)
    }

    /// Compute every remaining step and return the filled containers.
    pub fn run_to_completion(mut self) -> Result<SyntheticSet, SynthError> {
        #[cfg(feature = "progress")]
        let mut progress = crate::backends::progress_bar::StepProgress::new(self.remaining());

        while let Some(step) = self.next() {
            let _time = step?;
            #[cfg(feature = "progress")]
            progress.tick(_time);
        }

        #[cfg(feature = "progress")]
        progress.finish();

        Ok(self.synthetics)
    }
}

impl<S: MeshSystem> Iterator for NativeRun<'_, S> {
    type Item = Result<Day, SynthError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.grid.len() {
            return None;
        }
        let i = self.next;
        self.next += 1;
        let result = self.step(i);
        if result.is_err() {
            self.next = self.grid.len();
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}

/// Run the native engine to completion.
pub fn run_native<S: MeshSystem>(
    bundle: &dyn Bundle,
    compute: &ComputeOptions,
    system: S,
    services: Services<'_>,
    times_override: Option<Vec<Day>>,
) -> Result<SyntheticSet, SynthError> {
    NativeRun::new(bundle, compute, system, services, times_override)?.run_to_completion()
}
