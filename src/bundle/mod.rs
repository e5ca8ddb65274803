//! # Declarative system description
//!
//! The orchestration core never owns the description of the system it simulates. It reads it
//! through the [`Bundle`] trait: dataset enumeration, per-dataset time and qualifier lookups,
//! system-level parameters and the component [`Hierarchy`].
//!
//! Modules
//! -----------------
//! * [`description`](crate::bundle::description) – [`SystemDescription`](crate::bundle::description::SystemDescription),
//!   an in-memory, serde-friendly implementation of [`Bundle`].
//!
//! Missing data
//! -----------------
//! Lookups that may legitimately have no answer (a dataset not attached to a component, a
//! dataset without a time array) return `Option`. The planner treats `None` as "nothing to
//! compute", never as an error.
use hifitime::Duration;
use serde::{Deserialize, Serialize};

use crate::constants::{Day, Meter, Radian};
use crate::observables::{ObservableKind, TimeQualifier};
use crate::synth_errors::SynthError;

pub mod description;

/// Role of a component in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Star,
    Envelope,
    Orbit,
}

/// Where a component takes its passband luminosity scale from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PblumRef {
    /// Compute the scale from the component's own requested luminosity.
    #[serde(rename = "self")]
    SelfScale,
    /// Copy the scale of another component once it is resolved.
    Component(String),
}

/// Limb-darkening configuration forwarded verbatim to the mesh service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimbDarkening {
    pub func: String,
    pub coeffs: Vec<f64>,
}

impl Default for LimbDarkening {
    fn default() -> Self {
        LimbDarkening {
            func: "logarithmic".to_string(),
            coeffs: vec![0.5, 0.5],
        }
    }
}

/// Component tree of the system, reduced to what the orchestration needs.
///
/// Fields
/// -----------------
/// * `stars` – star labels in hierarchy order (primary first).
/// * `envelopes` – common-envelope labels (contact systems).
/// * `orbits` – orbit labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hierarchy {
    pub stars: Vec<String>,
    #[serde(default)]
    pub envelopes: Vec<String>,
    #[serde(default)]
    pub orbits: Vec<String>,
}

impl Hierarchy {
    pub fn new(stars: Vec<String>) -> Self {
        Hierarchy {
            stars,
            envelopes: Vec::new(),
            orbits: Vec::new(),
        }
    }

    pub fn stars(&self) -> &[String] {
        &self.stars
    }

    /// Components that carry a surface mesh.
    ///
    /// A contact system is meshed as its envelope; detached systems mesh each star.
    pub fn meshables(&self) -> Vec<String> {
        if self.envelopes.is_empty() {
            self.stars.clone()
        } else {
            self.envelopes.clone()
        }
    }

    pub fn kind_of(&self, component: &str) -> Option<ComponentKind> {
        if self.stars.iter().any(|s| s == component) {
            Some(ComponentKind::Star)
        } else if self.envelopes.iter().any(|e| e == component) {
            Some(ComponentKind::Envelope)
        } else if self.orbits.iter().any(|o| o == component) {
            Some(ComponentKind::Orbit)
        } else {
            None
        }
    }

    /// Position of a star in [`Hierarchy::stars`], i.e. its index into dynamics arrays.
    pub fn star_index(&self, component: &str) -> Option<usize> {
        self.stars.iter().position(|s| s == component)
    }

    /// Whether positions must be integrated, as opposed to the trivial single-star case.
    pub fn requires_dynamics(&self) -> bool {
        let meshables = self.meshables();
        meshables.len() > 1
            || meshables
                .first()
                .is_some_and(|c| self.kind_of(c) == Some(ComponentKind::Envelope))
    }
}

/// Read-only access to the declarative system description.
///
/// Implementors are typically adapters over a parameter store; [`description::SystemDescription`]
/// is the in-memory reference implementation.
pub trait Bundle {
    /// Labels of all datasets, in declaration order.
    fn datasets(&self) -> Vec<String>;

    /// Observable kind of a dataset, if the dataset exists.
    fn dataset_kind(&self, dataset: &str) -> Option<ObservableKind>;

    /// Time array of a dataset for one component (`None` = system level).
    ///
    /// Return
    /// ----------
    /// * `None` if the dataset is not attached to this component or has no parameter for the
    ///   requested qualifier.
    /// * `Some(times)` otherwise, possibly empty, in days.
    fn dataset_times(
        &self,
        dataset: &str,
        component: Option<&str>,
        qualifier: TimeQualifier,
    ) -> Option<Vec<Day>>;

    /// Exposure time of a dataset (zero when not integrated over an exposure).
    fn exptime(&self, dataset: &str) -> Duration;

    /// Third light of a dataset, as a fraction of the total flux.
    fn l3(&self, dataset: &str) -> f64;

    /// Passband luminosity reference of a component for a dataset.
    fn pblum_ref(&self, component: &str, dataset: &str) -> Option<PblumRef>;

    /// Requested passband luminosity of a component for a dataset.
    fn pblum(&self, component: &str, dataset: &str) -> f64;

    fn limb_darkening(&self, component: &str, dataset: &str) -> LimbDarkening;

    /// Cycle number at an ephemeris time, interpolated from the dataset's `Ns` table.
    fn cycle_number(
        &self,
        dataset: &str,
        component: Option<&str>,
        time_ephem: Day,
    ) -> Result<f64, SynthError>;

    fn hierarchy(&self) -> &Hierarchy;

    /// Distance to the system.
    fn distance(&self) -> Meter;

    /// Reference epoch of the system.
    fn t0(&self) -> Day;

    /// Time of periastron passage, used for the protomesh.
    fn t0_perpass(&self) -> Day;

    fn inclination(&self, component: &str) -> Radian;
}
