//! Mesh synthetics: one [`MeshSnapshot`] per requested time.
//!
//! Unlike scalar-per-time kinds, a mesh container is not a running series. Each snapshot is
//! overwritten in full when its own time is visited.
use std::collections::BTreeMap;

use nalgebra::Vector3;

use crate::constants::Day;
use crate::observables::ObservableKind;
use crate::synth_errors::SynthError;

/// Dataset-dependent per-triangle quantities declared for one mesh-requiring dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DependentColumns {
    pub kind: ObservableKind,
    /// Passband luminosity of the body for this dataset.
    pub pblum: Option<f64>,
    /// Pre-declared (empty) until filled, keyed by column name.
    pub columns: BTreeMap<String, Vec<f64>>,
}

impl DependentColumns {
    pub fn declare(kind: ObservableKind) -> Self {
        DependentColumns {
            kind,
            pblum: None,
            columns: kind
                .dependent_columns()
                .iter()
                .map(|c| (c.to_string(), Vec::new()))
                .collect(),
        }
    }
}

/// Mesh of one body at one time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshSnapshot {
    pub time: Day,
    pub pot: Option<f64>,
    pub rpole: Option<f64>,
    pub volume: Option<f64>,

    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub zs: Vec<f64>,
    pub vxs: Vec<f64>,
    pub vys: Vec<f64>,
    pub vzs: Vec<f64>,
    pub nxs: Vec<f64>,
    pub nys: Vec<f64>,
    pub nzs: Vec<f64>,
    pub areas: Vec<f64>,
    pub mus: Vec<f64>,
    pub loggs: Vec<f64>,
    pub teffs: Vec<f64>,
    pub rs: Vec<f64>,
    pub r_projs: Vec<f64>,
    pub visibilities: Vec<f64>,
    pub cosbetas: Vec<f64>,

    pub vertices: Vec<[Vector3<f64>; 3]>,
    pub normals: Vec<Vector3<f64>>,
    pub visible_centroids: Vec<Vector3<f64>>,

    pub horizon_xs: Vec<f64>,
    pub horizon_ys: Vec<f64>,
    pub horizon_zs: Vec<f64>,
    pub horizon_analytic_xs: Vec<f64>,
    pub horizon_analytic_ys: Vec<f64>,
    pub horizon_analytic_zs: Vec<f64>,

    /// Keyed by dataset label.
    pub dependent: BTreeMap<String, DependentColumns>,
}

/// Names of the per-triangle scalar columns, in export order.
pub const TRIANGLE_COLUMNS: [&str; 17] = [
    "xs",
    "ys",
    "zs",
    "vxs",
    "vys",
    "vzs",
    "nxs",
    "nys",
    "nzs",
    "areas",
    "mus",
    "loggs",
    "teffs",
    "rs",
    "r_projs",
    "visibilities",
    "cosbetas",
];

impl MeshSnapshot {
    pub fn new(time: Day, dataset_fields: &BTreeMap<String, ObservableKind>) -> Self {
        MeshSnapshot {
            time,
            dependent: dataset_fields
                .iter()
                .map(|(dataset, &kind)| (dataset.clone(), DependentColumns::declare(kind)))
                .collect(),
            ..MeshSnapshot::default()
        }
    }

    /// Per-triangle scalar column by name.
    pub fn column(&self, name: &str) -> Option<&Vec<f64>> {
        let col = match name {
            "xs" => &self.xs,
            "ys" => &self.ys,
            "zs" => &self.zs,
            "vxs" => &self.vxs,
            "vys" => &self.vys,
            "vzs" => &self.vzs,
            "nxs" => &self.nxs,
            "nys" => &self.nys,
            "nzs" => &self.nzs,
            "areas" => &self.areas,
            "mus" => &self.mus,
            "loggs" => &self.loggs,
            "teffs" => &self.teffs,
            "rs" => &self.rs,
            "r_projs" => &self.r_projs,
            "visibilities" => &self.visibilities,
            "cosbetas" => &self.cosbetas,
            _ => return None,
        };
        Some(col)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Vec<f64>> {
        let col = match name {
            "xs" => &mut self.xs,
            "ys" => &mut self.ys,
            "zs" => &mut self.zs,
            "vxs" => &mut self.vxs,
            "vys" => &mut self.vys,
            "vzs" => &mut self.vzs,
            "nxs" => &mut self.nxs,
            "nys" => &mut self.nys,
            "nzs" => &mut self.nzs,
            "areas" => &mut self.areas,
            "mus" => &mut self.mus,
            "loggs" => &mut self.loggs,
            "teffs" => &mut self.teffs,
            "rs" => &mut self.rs,
            "r_projs" => &mut self.r_projs,
            "visibilities" => &mut self.visibilities,
            "cosbetas" => &mut self.cosbetas,
            _ => return None,
        };
        Some(col)
    }

    /// Declared dependent column of a dataset.
    pub fn dependent_column_mut(&mut self, dataset: &str, name: &str) -> Option<&mut Vec<f64>> {
        self.dependent.get_mut(dataset)?.columns.get_mut(name)
    }

    pub fn n_triangles(&self) -> usize {
        self.xs.len()
    }

    /// Whether every filled per-triangle column has the triangle count of `xs`.
    pub fn has_consistent_rows(&self) -> bool {
        let n = self.n_triangles();
        let same = |len: usize| len == 0 || len == n;
        TRIANGLE_COLUMNS
            .iter()
            .filter_map(|name| self.column(name))
            .all(|c| same(c.len()))
            && same(self.vertices.len())
            && same(self.normals.len())
            && same(self.visible_centroids.len())
            && self
                .dependent
                .values()
                .flat_map(|d| d.columns.values())
                .all(|c| same(c.len()))
    }
}

/// Mesh container of one (dataset, component).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshSynthetic {
    /// Mesh-requiring datasets whose dependent columns every snapshot declares.
    pub dataset_fields: BTreeMap<String, ObservableKind>,
    /// Ascending by time, one per distinct time.
    pub snapshots: Vec<MeshSnapshot>,
}

impl MeshSynthetic {
    pub fn new(times: &[Day], dataset_fields: BTreeMap<String, ObservableKind>) -> Self {
        let mut times = times.to_vec();
        times.sort_by(f64::total_cmp);
        times.dedup();
        let snapshots = times
            .into_iter()
            .map(|t| MeshSnapshot::new(t, &dataset_fields))
            .collect();
        MeshSynthetic {
            dataset_fields,
            snapshots,
        }
    }

    pub fn times(&self) -> Vec<Day> {
        self.snapshots.iter().map(|s| s.time).collect()
    }

    /// Number of snapshots at exactly `time`.
    pub fn count_at(&self, time: Day) -> usize {
        self.snapshots.iter().filter(|s| s.time == time).count()
    }

    pub fn snapshot(&self, time: Day) -> Option<&MeshSnapshot> {
        self.snapshots.iter().find(|s| s.time == time)
    }

    /// The unique snapshot at `time`.
    ///
    /// Arguments
    /// -----------------
    /// * `target` – builds the error for a given match count (0 or >1), so the caller can name
    ///   the container.
    pub(crate) fn snapshot_mut(
        &mut self,
        time: Day,
        target: impl FnOnce(usize) -> SynthError,
    ) -> Result<&mut MeshSnapshot, SynthError> {
        match self.count_at(time) {
            1 => self
                .snapshots
                .iter_mut()
                .find(|s| s.time == time)
                .ok_or_else(|| target(0)),
            n => Err(target(n)),
        }
    }
}
