//! # Time grid planning
//!
//! Turns the enabled datasets of a description into [`WorkItem`]s, one per
//! (dataset, component, kind), each carrying its resolved time array, then aggregates them.
//!
//! Aggregation modes
//! -----------------
//! * [`plan_by_time`] – global, strictly ascending [`TimeGrid`]. Each [`TimeStep`] lists the
//!   items active at that time. Used by the native step orchestrator.
//! * [`plan_by_dataset`] – no merging. Each real item owns a singleton grouping, in encounter
//!   order ([`DatasetPlan`]). Used by engines that compute a whole dataset per call.
//!
//! Extraction rules
//! -----------------
//! * Datasets unknown to the compute options (unsupported by the engine) or disabled are skipped.
//! * Components are the stars, then the system level. The system level is accepted only for
//!   kinds that allow it (lc, mesh).
//! * A missing time qualifier is a silent skip; so is an empty time array.
//! * A non-empty time array is replaced wholesale by the override times, if any.
//! * Exposure oversampling (by-time only) replaces every time by a symmetric sub-grid across the
//!   exposure, assuming times are mid-exposure.
//! * A system-level mesh dataset expands to one item per meshable component.
//!
//! Example
//! -----------------
//! ```rust,no_run
//! use binsynth::bundle::description::{DatasetDescription, SystemDescription};
//! use binsynth::bundle::Hierarchy;
//! use binsynth::compute::{ComputeOptions, DatasetCompute};
//! use binsynth::observables::ObservableKind;
//! use binsynth::planning::{plan_by_time, PlanOptions};
//!
//! let bundle = SystemDescription::new(Hierarchy::new(vec!["primary".into(), "secondary".into()]))
//!     .with_dataset(DatasetDescription::new("lc01", ObservableKind::Lc).with_times(None, vec![0.0, 0.5]));
//! let compute = ComputeOptions::builder()
//!     .dataset("lc01", DatasetCompute::default())
//!     .build()
//!     .unwrap();
//!
//! let grid = plan_by_time(&bundle, &compute, &PlanOptions::default());
//! assert_eq!(grid.times(), vec![0.0, 0.5]);
//! ```
use std::collections::BTreeMap;

use hifitime::Unit;
use ordered_float::OrderedFloat;
use smallvec::SmallVec;

use crate::bundle::Bundle;
use crate::compute::{ComputeOptions, FtiMethod};
use crate::constants::{Day, DEFAULT_DATASET};
use crate::observables::ObservableKind;

pub mod mesh_requirement;

use mesh_requirement::{needs_mesh, pbmesh_items, protomesh_items};

/// Indices of the work items active at one time step.
pub type ActiveItems = SmallVec<[usize; 4]>;

/// One (dataset, component, kind) unit of requested observation.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub dataset: String,
    /// `None` for system-level datasets.
    pub component: Option<String>,
    pub kind: ObservableKind,
    pub needs_mesh: bool,
    /// Resolved times (days), not necessarily ascending.
    pub times: Vec<Day>,
}

impl WorkItem {
    pub fn component(&self) -> Option<&str> {
        self.component.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeStep {
    pub time: Day,
    /// Indices into [`TimeGrid::items`], in registration order. An item whose own times repeat a
    /// value appears once per repetition.
    pub active: ActiveItems,
}

/// Globally sorted plan.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeGrid {
    pub steps: Vec<TimeStep>,
    /// Every work item, including virtual mesh items. Protomesh items are never referenced by a
    /// step.
    pub items: Vec<WorkItem>,
}

impl TimeGrid {
    pub fn times(&self) -> Vec<Day> {
        self.steps.iter().map(|s| s.time).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Work items active at step `i`.
    pub fn active_items(&self, i: usize) -> impl Iterator<Item = &WorkItem> + '_ {
        self.steps[i].active.iter().map(move |&k| &self.items[k])
    }
}

/// Per-dataset plan: no cross-dataset merging.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DatasetPlan {
    pub items: Vec<WorkItem>,
    /// Indices into `items` of the real (non-virtual) groupings, in encounter order.
    pub groups: Vec<usize>,
}

impl DatasetPlan {
    pub fn groupings(&self) -> impl Iterator<Item = &WorkItem> + '_ {
        self.groups.iter().map(move |&k| &self.items[k])
    }
}

/// Planner switches.
///
/// * `times_override` – replaces every non-empty dataset time array.
/// * `allow_oversample` – honor exposure oversampling (by-time only).
/// * `protomesh` / `pbmesh` – add the virtual mesh items, if the engine supports them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanOptions {
    pub times_override: Option<Vec<Day>>,
    pub allow_oversample: bool,
    pub protomesh: bool,
    pub pbmesh: bool,
}

impl PlanOptions {
    /// Options derived from the compute configuration.
    pub fn from_compute(compute: &ComputeOptions, times_override: Option<Vec<Day>>) -> Self {
        PlanOptions {
            times_override,
            allow_oversample: false,
            protomesh: compute.protomesh,
            pbmesh: compute.pbmesh,
        }
    }
}

/// `n` evenly spaced times across an exposure centered on `t`.
///
/// A single sample is the mid-exposure time itself.
pub fn oversample(t: Day, exptime: Day, n: usize) -> Vec<Day> {
    match n {
        0 => Vec::new(),
        1 => vec![t],
        _ => {
            let start = t - exptime / 2.0;
            let step = exptime / (n - 1) as f64;
            (0..n).map(|k| start + step * k as f64).collect()
        }
    }
}

/// Resolved time array of one (dataset, component), or `None` if there is nothing to compute.
fn resolve_times(
    bundle: &dyn Bundle,
    compute: &ComputeOptions,
    dataset: &str,
    kind: ObservableKind,
    component: Option<&str>,
    options: &PlanOptions,
) -> Option<Vec<Day>> {
    let mut times = bundle.dataset_times(dataset, component, kind.time_qualifier())?;

    if !times.is_empty() {
        if let Some(overridden) = &options.times_override {
            times = overridden.clone();
        }
    }

    let exptime = bundle.exptime(dataset).to_unit(Unit::Day);
    let fti = compute.dataset(dataset).map(|d| (d.fti_method, d.fti_oversample));
    if options.allow_oversample && kind == ObservableKind::Lc && exptime > 0.0 {
        if let Some((FtiMethod::Oversample, n)) = fti {
            times = times
                .iter()
                .flat_map(|&t| oversample(t, exptime, n))
                .collect();
        }
    }

    (!times.is_empty()).then_some(times)
}

/// Real (non-virtual) work items of every enabled dataset, in encounter order.
pub fn extract_work_items(
    bundle: &dyn Bundle,
    compute: &ComputeOptions,
    options: &PlanOptions,
) -> Vec<WorkItem> {
    let hierarchy = bundle.hierarchy();
    let mut components: Vec<Option<&str>> =
        hierarchy.stars().iter().map(|s| Some(s.as_str())).collect();
    components.push(None);

    let mut items = Vec::new();
    for dataset in bundle.datasets() {
        if dataset == DEFAULT_DATASET || !compute.is_enabled(&dataset) {
            continue;
        }
        let Some(kind) = bundle.dataset_kind(&dataset) else {
            continue;
        };

        for &component in &components {
            if component.is_none() && !kind.accepts_system_level() {
                continue;
            }
            let Some(times) = resolve_times(bundle, compute, &dataset, kind, component, options)
            else {
                continue;
            };

            let targets: Vec<Option<String>> = match (component, kind) {
                (None, ObservableKind::Mesh) => {
                    hierarchy.meshables().into_iter().map(Some).collect()
                }
                _ => vec![component.map(str::to_string)],
            };

            for target in targets {
                items.push(WorkItem {
                    needs_mesh: needs_mesh(compute, &dataset, kind, target.as_deref()),
                    dataset: dataset.clone(),
                    component: target,
                    kind,
                    times: times.clone(),
                });
            }
        }
    }
    items
}

/// Plan a run on a global, strictly ascending time grid.
pub fn plan_by_time(
    bundle: &dyn Bundle,
    compute: &ComputeOptions,
    options: &PlanOptions,
) -> TimeGrid {
    let mut items = extract_work_items(bundle, compute, options);

    let mut grid: BTreeMap<OrderedFloat<Day>, ActiveItems> = BTreeMap::new();
    for (k, item) in items.iter().enumerate() {
        for &t in &item.times {
            grid.entry(OrderedFloat(t)).or_default().push(k);
        }
    }

    if options.protomesh {
        items.extend(protomesh_items(bundle, compute));
    }
    if options.pbmesh {
        let automesh = pbmesh_items(bundle, compute, &items);
        for item in automesh {
            let k = items.len();
            for &t in &item.times {
                if let Some(active) = grid.get_mut(&OrderedFloat(t)) {
                    active.push(k);
                }
            }
            items.push(item);
        }
    }

    let steps = grid
        .into_iter()
        .map(|(time, active)| TimeStep {
            time: time.into_inner(),
            active,
        })
        .collect();

    TimeGrid { steps, items }
}

/// Plan a run with one singleton grouping per real work item, in encounter order.
pub fn plan_by_dataset(
    bundle: &dyn Bundle,
    compute: &ComputeOptions,
    options: &PlanOptions,
) -> DatasetPlan {
    let options = PlanOptions {
        allow_oversample: false,
        ..options.clone()
    };
    let mut items = extract_work_items(bundle, compute, &options);
    let groups = (0..items.len()).collect();

    if options.protomesh {
        items.extend(protomesh_items(bundle, compute));
    }
    if options.pbmesh {
        let automesh = pbmesh_items(bundle, compute, &items);
        items.extend(automesh);
    }

    DatasetPlan { items, groups }
}

#[cfg(test)]
mod planning_test {
    use super::*;
    use crate::bundle::description::{DatasetDescription, SystemDescription};
    use crate::bundle::Hierarchy;
    use crate::compute::{DatasetCompute, EngineKind};
    use approx::assert_relative_eq;

    fn binary() -> SystemDescription {
        SystemDescription::new(Hierarchy::new(vec!["primary".into(), "secondary".into()]))
    }

    #[test]
    fn test_oversample_window() {
        let sub = oversample(5.0, 0.1, 3);
        assert_eq!(sub.len(), 3);
        assert_relative_eq!(sub[0], 4.95, epsilon = 1e-12);
        assert_relative_eq!(sub[1], 5.0, epsilon = 1e-12);
        assert_relative_eq!(sub[2], 5.05, epsilon = 1e-12);
        assert_eq!(oversample(5.0, 0.1, 1), vec![5.0]);
    }

    #[test]
    fn test_system_level_only_for_lc_and_mesh() {
        let bundle = binary()
            .with_dataset(
                DatasetDescription::new("rv01", ObservableKind::Rv)
                    .with_times(None, vec![1.0])
                    .with_times(Some("primary"), vec![2.0]),
            )
            .with_dataset(
                DatasetDescription::new("mesh01", ObservableKind::Mesh).with_times(None, vec![3.0]),
            );
        let compute = ComputeOptions::builder()
            .dataset("rv01", DatasetCompute::default())
            .dataset("mesh01", DatasetCompute::default())
            .build()
            .unwrap();

        let items = extract_work_items(&bundle, &compute, &PlanOptions::default());
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].component(), Some("primary"));
        assert_eq!(items[0].times, vec![2.0]);
        // system-level mesh expands to every meshable
        assert_eq!(items[1].component(), Some("primary"));
        assert_eq!(items[2].component(), Some("secondary"));
        assert!(items.iter().all(|i| i.needs_mesh));
    }

    #[test]
    fn test_disabled_unknown_and_empty_datasets_are_skipped() {
        let bundle = binary()
            .with_dataset(DatasetDescription::new("lc01", ObservableKind::Lc).with_times(None, vec![1.0]))
            .with_dataset(DatasetDescription::new("lc02", ObservableKind::Lc).with_times(None, vec![1.0]))
            .with_dataset(DatasetDescription::new("lc03", ObservableKind::Lc).with_times(None, vec![]));
        let compute = ComputeOptions::builder()
            .dataset("lc01", DatasetCompute::default().enabled(false))
            .dataset("lc03", DatasetCompute::default())
            .build()
            .unwrap();

        let grid = plan_by_time(&bundle, &compute, &PlanOptions::default());
        assert!(grid.is_empty());
        assert!(grid.items.is_empty());
    }

    #[test]
    fn test_override_only_replaces_non_empty_times() {
        let bundle = binary()
            .with_dataset(DatasetDescription::new("lc01", ObservableKind::Lc).with_times(None, vec![1.0]))
            .with_dataset(DatasetDescription::new("lc02", ObservableKind::Lc).with_times(None, vec![]));
        let compute = ComputeOptions::builder()
            .dataset("lc01", DatasetCompute::default())
            .dataset("lc02", DatasetCompute::default())
            .build()
            .unwrap();
        let options = PlanOptions {
            times_override: Some(vec![3.0, 4.0]),
            ..PlanOptions::default()
        };
        let items = extract_work_items(&bundle, &compute, &options);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].times, vec![3.0, 4.0]);
    }

    #[test]
    fn test_grid_is_strictly_ascending() {
        let bundle = binary()
            .with_dataset(
                DatasetDescription::new("lc01", ObservableKind::Lc).with_times(None, vec![2.0, 0.0, 1.0]),
            )
            .with_dataset(
                DatasetDescription::new("rv01", ObservableKind::Rv)
                    .with_times(Some("primary"), vec![1.0, 3.0])
                    .with_times(Some("secondary"), vec![0.0]),
            );
        let compute = ComputeOptions::builder()
            .dataset("lc01", DatasetCompute::default())
            .dataset("rv01", DatasetCompute::default())
            .build()
            .unwrap();

        let grid = plan_by_time(&bundle, &compute, &PlanOptions::default());
        assert_eq!(grid.times(), vec![0.0, 1.0, 2.0, 3.0]);
        assert!(grid.times().windows(2).all(|w| w[0] < w[1]));
        assert_eq!(grid.steps[0].active.as_slice(), &[0, 2]);
        assert_eq!(grid.steps[1].active.as_slice(), &[0, 1]);
    }

    #[test]
    fn test_repeated_time_registers_item_twice() {
        let bundle = binary().with_dataset(
            DatasetDescription::new("lc01", ObservableKind::Lc).with_times(None, vec![1.0, 1.0]),
        );
        let compute = ComputeOptions::builder()
            .dataset("lc01", DatasetCompute::default())
            .build()
            .unwrap();
        let grid = plan_by_time(&bundle, &compute, &PlanOptions::default());
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.steps[0].active.as_slice(), &[0, 0]);
    }

    #[test]
    fn test_virtual_mesh_items() {
        let bundle = binary()
            .with_epochs(0.0, 0.25)
            .with_dataset(DatasetDescription::new("lc01", ObservableKind::Lc).with_times(None, vec![1.0, 0.5]))
            .with_dataset(
                DatasetDescription::new("orb01", ObservableKind::Orb)
                    .with_times(Some("primary"), vec![0.75]),
            );
        let compute = ComputeOptions::builder()
            .dataset("lc01", DatasetCompute::default())
            .dataset("orb01", DatasetCompute::default())
            .protomesh(true)
            .pbmesh(true)
            .build()
            .unwrap();
        let options = PlanOptions::from_compute(&compute, None);

        let grid = plan_by_time(&bundle, &compute, &options);
        // lc01, orb01, 2 protomesh, 2 pbmesh
        assert_eq!(grid.items.len(), 6);
        assert_eq!(grid.items[2].times, vec![0.25]);
        assert!(!grid.items[2].needs_mesh);
        assert_eq!(grid.items[4].times, vec![0.5, 1.0]);
        // protomesh never stepped; pbmesh only where the mesh is needed
        assert!(grid.steps.iter().all(|s| !s.active.contains(&2)));
        let at_half: Vec<usize> = grid.steps[0].active.to_vec();
        assert_eq!(at_half, vec![0, 4, 5]);
        let at_075 = &grid.steps[1];
        assert_eq!(at_075.time, 0.75);
        assert_eq!(at_075.active.as_slice(), &[1]);

        let plan = plan_by_dataset(&bundle, &compute, &options);
        assert_eq!(plan.groups, vec![0, 1]);
        assert_eq!(plan.items.len(), 6);
    }

    #[test]
    fn test_non_meshing_engine_adds_no_virtual_items() {
        let bundle = binary()
            .with_dataset(DatasetDescription::new("lc01", ObservableKind::Lc).with_times(None, vec![1.0]));
        let compute = ComputeOptions::builder()
            .engine(EngineKind::Photodynamical)
            .dataset("lc01", DatasetCompute::default())
            .protomesh(true)
            .pbmesh(true)
            .build()
            .unwrap();
        let grid = plan_by_time(&bundle, &compute, &PlanOptions::from_compute(&compute, None));
        assert_eq!(grid.items.len(), 1);
        assert!(!grid.items[0].needs_mesh);
    }
}
