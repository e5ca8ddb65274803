//! # Synthetic containers
//!
//! One [`Synthetic`] per work item, holding a kind-specific [`SyntheticData`] record. The whole
//! run output is a [`SyntheticSet`], an insertion-ordered collection filterable by kind, dataset,
//! component and time.
//!
//! Write targets
//! -----------------
//! Filling code never writes through a filter that could match several containers. Every write
//! goes through [`SyntheticSet::get_unique_mut`] or [`SyntheticSet::snapshot_mut`], which fail
//! with [`SynthError::MissingTarget`] or [`SynthError::AmbiguousTarget`] instead of picking one.
//!
//! Modules
//! -----------------
//! * [`mesh`] – per-time mesh snapshots and their dependent columns.
//! * [`export`] – CSV export of a filled set.
use std::collections::BTreeMap;

use crate::constants::Day;
use crate::observables::ObservableKind;
use crate::planning::WorkItem;
use crate::synth_errors::SynthError;

pub mod export;
pub mod mesh;

use mesh::{MeshSnapshot, MeshSynthetic};

/// Kind-specific fields of a container.
///
/// Scalar-per-time kinds pre-fill `times` in ascending order, which is the order in which the
/// step loop appends values.
#[derive(Debug, Clone, PartialEq)]
pub enum SyntheticData {
    Lc {
        times: Vec<Day>,
        fluxes: Vec<f64>,
    },
    Rv {
        times: Vec<Day>,
        /// km/s
        rvs: Vec<f64>,
    },
    Etv {
        time_ephems: Vec<Day>,
        time_ecls: Vec<Day>,
        etvs: Vec<Day>,
        ns: Vec<f64>,
    },
    Ifm {
        times: Vec<Day>,
        columns: BTreeMap<String, Vec<f64>>,
    },
    Orb {
        times: Vec<Day>,
        xs: Vec<f64>,
        ys: Vec<f64>,
        zs: Vec<f64>,
        vxs: Vec<f64>,
        vys: Vec<f64>,
        vzs: Vec<f64>,
    },
    Sp {
        times: Vec<Day>,
    },
    Mesh(MeshSynthetic),
}

fn sorted(times: &[Day]) -> Vec<Day> {
    let mut times = times.to_vec();
    times.sort_by(f64::total_cmp);
    times
}

impl SyntheticData {
    /// Empty record for a kind.
    ///
    /// Arguments
    /// -----------------
    /// * `times` – the work item's times.
    /// * `dataset_fields` – mesh-requiring datasets (mesh kind only).
    pub fn empty(
        kind: ObservableKind,
        times: &[Day],
        dataset_fields: &BTreeMap<String, ObservableKind>,
    ) -> Self {
        match kind {
            ObservableKind::Lc => SyntheticData::Lc {
                times: sorted(times),
                fluxes: Vec::new(),
            },
            ObservableKind::Rv => SyntheticData::Rv {
                times: sorted(times),
                rvs: Vec::new(),
            },
            ObservableKind::Etv => SyntheticData::Etv {
                time_ephems: Vec::new(),
                time_ecls: Vec::new(),
                etvs: Vec::new(),
                ns: Vec::new(),
            },
            ObservableKind::Ifm => SyntheticData::Ifm {
                times: sorted(times),
                columns: BTreeMap::new(),
            },
            ObservableKind::Orb => SyntheticData::Orb {
                times: sorted(times),
                xs: Vec::new(),
                ys: Vec::new(),
                zs: Vec::new(),
                vxs: Vec::new(),
                vys: Vec::new(),
                vzs: Vec::new(),
            },
            ObservableKind::Sp => SyntheticData::Sp {
                times: sorted(times),
            },
            ObservableKind::Mesh => {
                SyntheticData::Mesh(MeshSynthetic::new(times, dataset_fields.clone()))
            }
        }
    }

    pub fn kind(&self) -> ObservableKind {
        match self {
            SyntheticData::Lc { .. } => ObservableKind::Lc,
            SyntheticData::Rv { .. } => ObservableKind::Rv,
            SyntheticData::Etv { .. } => ObservableKind::Etv,
            SyntheticData::Ifm { .. } => ObservableKind::Ifm,
            SyntheticData::Orb { .. } => ObservableKind::Orb,
            SyntheticData::Sp { .. } => ObservableKind::Sp,
            SyntheticData::Mesh(_) => ObservableKind::Mesh,
        }
    }

    /// Whether the container covers `time`.
    pub fn has_time(&self, time: Day) -> bool {
        match self {
            SyntheticData::Lc { times, .. }
            | SyntheticData::Rv { times, .. }
            | SyntheticData::Ifm { times, .. }
            | SyntheticData::Orb { times, .. }
            | SyntheticData::Sp { times } => times.contains(&time),
            SyntheticData::Etv { time_ephems, .. } => time_ephems.contains(&time),
            SyntheticData::Mesh(mesh) => mesh.count_at(time) > 0,
        }
    }
}

/// Output record of one work item.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthetic {
    pub dataset: String,
    pub component: Option<String>,
    pub data: SyntheticData,
}

impl Synthetic {
    pub fn kind(&self) -> ObservableKind {
        self.data.kind()
    }

    pub fn component(&self) -> Option<&str> {
        self.component.as_deref()
    }

    /// Scalar-per-time column by name (`times`, `fluxes`, `rvs`, `etvs`, `xs`, ...).
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        let col: &Vec<f64> = match (&self.data, name) {
            (SyntheticData::Lc { times, .. }, "times") => times,
            (SyntheticData::Lc { fluxes, .. }, "fluxes") => fluxes,
            (SyntheticData::Rv { times, .. }, "times") => times,
            (SyntheticData::Rv { rvs, .. }, "rvs") => rvs,
            (SyntheticData::Etv { time_ephems, .. }, "time_ephems") => time_ephems,
            (SyntheticData::Etv { time_ecls, .. }, "time_ecls") => time_ecls,
            (SyntheticData::Etv { etvs, .. }, "etvs") => etvs,
            (SyntheticData::Etv { ns, .. }, "Ns") => ns,
            (SyntheticData::Ifm { times, .. }, "times") => times,
            (SyntheticData::Ifm { columns, .. }, key) => columns.get(key)?,
            (SyntheticData::Orb { times, .. }, "times") => times,
            (SyntheticData::Orb { xs, .. }, "xs") => xs,
            (SyntheticData::Orb { ys, .. }, "ys") => ys,
            (SyntheticData::Orb { zs, .. }, "zs") => zs,
            (SyntheticData::Orb { vxs, .. }, "vxs") => vxs,
            (SyntheticData::Orb { vys, .. }, "vys") => vys,
            (SyntheticData::Orb { vzs, .. }, "vzs") => vzs,
            (SyntheticData::Sp { times }, "times") => times,
            _ => return None,
        };
        Some(col.as_slice())
    }

    pub fn as_mesh(&self) -> Option<&MeshSynthetic> {
        match &self.data {
            SyntheticData::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    fn matches(&self, kind: ObservableKind, dataset: &str, component: Option<&str>) -> bool {
        self.kind() == kind && self.dataset == dataset && self.component() == component
    }
}

/// Criteria for [`SyntheticSet::filter`]; `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyntheticFilter<'a> {
    pub kind: Option<ObservableKind>,
    pub dataset: Option<&'a str>,
    /// `Some(None)` selects system-level containers only.
    pub component: Option<Option<&'a str>>,
    pub time: Option<Day>,
}

impl<'a> SyntheticFilter<'a> {
    pub fn kind(mut self, kind: ObservableKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn dataset(mut self, dataset: &'a str) -> Self {
        self.dataset = Some(dataset);
        self
    }

    pub fn component(mut self, component: Option<&'a str>) -> Self {
        self.component = Some(component);
        self
    }

    pub fn time(mut self, time: Day) -> Self {
        self.time = Some(time);
        self
    }

    fn accepts(&self, syn: &Synthetic) -> bool {
        self.kind.is_none_or(|k| syn.kind() == k)
            && self.dataset.is_none_or(|d| syn.dataset == d)
            && self.component.is_none_or(|c| syn.component() == c)
            && self.time.is_none_or(|t| syn.data.has_time(t))
    }
}

/// Insertion-ordered collection of every container of a run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyntheticSet {
    synthetics: Vec<Synthetic>,
}

impl SyntheticSet {
    pub fn new() -> Self {
        SyntheticSet::default()
    }

    pub fn push(&mut self, synthetic: Synthetic) {
        self.synthetics.push(synthetic);
    }

    pub fn len(&self) -> usize {
        self.synthetics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.synthetics.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Synthetic> {
        self.synthetics.iter()
    }

    pub fn filter<'s>(
        &'s self,
        filter: &'s SyntheticFilter<'s>,
    ) -> impl Iterator<Item = &'s Synthetic> + 's {
        self.synthetics.iter().filter(move |s| filter.accepts(s))
    }

    /// First container matching (kind, dataset, component), for read access.
    pub fn get(
        &self,
        kind: ObservableKind,
        dataset: &str,
        component: Option<&str>,
    ) -> Option<&Synthetic> {
        self.synthetics
            .iter()
            .find(|s| s.matches(kind, dataset, component))
    }

    /// The unique container matching (kind, dataset, component).
    ///
    /// Return
    /// ----------
    /// * [`SynthError::MissingTarget`] if nothing matches.
    /// * [`SynthError::AmbiguousTarget`] if more than one container matches.
    pub fn get_unique_mut(
        &mut self,
        kind: ObservableKind,
        dataset: &str,
        component: Option<&str>,
    ) -> Result<&mut Synthetic, SynthError> {
        let mut matches = self
            .synthetics
            .iter_mut()
            .filter(|s| s.matches(kind, dataset, component));
        let first = matches.next();
        let rest = matches.count();
        match (first, rest) {
            (Some(syn), 0) => Ok(syn),
            (None, _) => Err(SynthError::MissingTarget {
                kind,
                dataset: dataset.to_string(),
                component: component.map(str::to_string),
                time: None,
            }),
            (Some(_), n) => Err(SynthError::AmbiguousTarget {
                kind,
                dataset: dataset.to_string(),
                component: component.map(str::to_string),
                time: None,
                count: n + 1,
            }),
        }
    }

    /// The unique mesh snapshot of (dataset, component) at `time`.
    pub fn snapshot_mut(
        &mut self,
        dataset: &str,
        component: Option<&str>,
        time: Day,
    ) -> Result<&mut MeshSnapshot, SynthError> {
        let syn = self.get_unique_mut(ObservableKind::Mesh, dataset, component)?;
        let SyntheticData::Mesh(mesh) = &mut syn.data else {
            return Err(SynthError::MissingTarget {
                kind: ObservableKind::Mesh,
                dataset: dataset.to_string(),
                component: component.map(str::to_string),
                time: Some(time),
            });
        };
        mesh.snapshot_mut(time, |count| {
            if count == 0 {
                SynthError::MissingTarget {
                    kind: ObservableKind::Mesh,
                    dataset: dataset.to_string(),
                    component: component.map(str::to_string),
                    time: Some(time),
                }
            } else {
                SynthError::AmbiguousTarget {
                    kind: ObservableKind::Mesh,
                    dataset: dataset.to_string(),
                    component: component.map(str::to_string),
                    time: Some(time),
                    count,
                }
            }
        })
    }
}

impl<'a> IntoIterator for &'a SyntheticSet {
    type Item = &'a Synthetic;
    type IntoIter = std::slice::Iter<'a, Synthetic>;

    fn into_iter(self) -> Self::IntoIter {
        self.synthetics.iter()
    }
}

impl IntoIterator for SyntheticSet {
    type Item = Synthetic;
    type IntoIter = std::vec::IntoIter<Synthetic>;

    fn into_iter(self) -> Self::IntoIter {
        self.synthetics.into_iter()
    }
}

/// Allocate one empty container per work item.
///
/// Mesh containers declare dependent columns for every mesh-requiring non-mesh dataset among
/// `items`.
pub fn allocate(items: &[WorkItem]) -> SyntheticSet {
    let dataset_fields: BTreeMap<String, ObservableKind> = items
        .iter()
        .filter(|item| item.needs_mesh && item.kind != ObservableKind::Mesh)
        .map(|item| (item.dataset.clone(), item.kind))
        .collect();

    let mut set = SyntheticSet::new();
    for item in items {
        set.push(Synthetic {
            dataset: item.dataset.clone(),
            component: item.component.clone(),
            data: SyntheticData::empty(item.kind, &item.times, &dataset_fields),
        });
    }
    set
}
