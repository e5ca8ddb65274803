//! In-memory system description.
//!
//! [`SystemDescription`] is a plain, serde-derivable snapshot of everything the orchestration
//! reads from a bundle. It is what tests and simple callers build by hand; adapters over a
//! richer parameter store implement [`Bundle`] directly instead.
use std::collections::BTreeMap;
use std::f64::consts::FRAC_PI_2;

use hifitime::{Duration, Unit};
use serde::{Deserialize, Serialize};

use crate::bundle::{Bundle, Hierarchy, LimbDarkening, PblumRef};
use crate::constants::{Day, Meter, Radian};
use crate::observables::{ObservableKind, TimeQualifier};
use crate::synth_errors::SynthError;

/// Per-(dataset, component) parameters.
///
/// `component = None` is the system-level attachment. A `None` time array means the qualifier
/// does not exist for this attachment, which the planner treats as "nothing to compute".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub component: Option<String>,
    #[serde(default)]
    pub times: Option<Vec<Day>>,
    #[serde(default)]
    pub time_ephems: Option<Vec<Day>>,
    /// Cycle numbers, index-aligned with `time_ephems`.
    #[serde(default)]
    pub ns: Option<Vec<f64>>,
    #[serde(default)]
    pub pblum_ref: Option<PblumRef>,
    #[serde(default)]
    pub pblum: Option<f64>,
    #[serde(default)]
    pub ld: Option<LimbDarkening>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescription {
    pub label: String,
    pub kind: ObservableKind,
    /// Exposure time in seconds.
    #[serde(default)]
    pub exptime: f64,
    /// Third light, as a fraction of the total flux.
    #[serde(default)]
    pub l3: f64,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl DatasetDescription {
    pub fn new(label: impl Into<String>, kind: ObservableKind) -> Self {
        DatasetDescription {
            label: label.into(),
            kind,
            exptime: 0.0,
            l3: 0.0,
            attachments: Vec::new(),
        }
    }

    fn attachment_mut(&mut self, component: Option<&str>) -> &mut Attachment {
        let pos = self
            .attachments
            .iter()
            .position(|a| a.component.as_deref() == component);
        match pos {
            Some(i) => &mut self.attachments[i],
            None => {
                self.attachments.push(Attachment {
                    component: component.map(str::to_string),
                    ..Attachment::default()
                });
                let last = self.attachments.len() - 1;
                &mut self.attachments[last]
            }
        }
    }

    /// Attach a `times` array to a component (`None` = system level).
    pub fn with_times(mut self, component: Option<&str>, times: Vec<Day>) -> Self {
        self.attachment_mut(component).times = Some(times);
        self
    }

    /// Attach ephemeris times and the matching cycle numbers (eclipse timing datasets).
    pub fn with_time_ephems(mut self, component: &str, time_ephems: Vec<Day>, ns: Vec<f64>) -> Self {
        let attachment = self.attachment_mut(Some(component));
        attachment.time_ephems = Some(time_ephems);
        attachment.ns = Some(ns);
        self
    }

    pub fn with_pblum(mut self, component: &str, pblum_ref: PblumRef, pblum: f64) -> Self {
        let attachment = self.attachment_mut(Some(component));
        attachment.pblum_ref = Some(pblum_ref);
        attachment.pblum = Some(pblum);
        self
    }

    pub fn with_ld(mut self, component: &str, ld: LimbDarkening) -> Self {
        self.attachment_mut(Some(component)).ld = Some(ld);
        self
    }

    /// Exposure time in seconds.
    pub fn with_exptime(mut self, seconds: f64) -> Self {
        self.exptime = seconds;
        self
    }

    pub fn with_l3(mut self, l3: f64) -> Self {
        self.l3 = l3;
        self
    }

    fn attachment(&self, component: Option<&str>) -> Option<&Attachment> {
        self.attachments
            .iter()
            .find(|a| a.component.as_deref() == component)
    }
}

/// Serde-friendly description of a multiple-star system and its datasets.
///
/// Fields
/// -----------------
/// * `hierarchy` – star, envelope and orbit labels.
/// * `t0` – reference epoch (days).
/// * `t0_perpass` – time of periastron passage (days).
/// * `distance` – distance to the system (meters).
/// * `inclinations` – per-component inclination (radians), default π/2.
/// * `datasets` – dataset descriptions, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemDescription {
    pub hierarchy: Hierarchy,
    #[serde(default)]
    pub t0: Day,
    #[serde(default)]
    pub t0_perpass: Day,
    #[serde(default = "default_distance")]
    pub distance: Meter,
    #[serde(default)]
    pub inclinations: BTreeMap<String, Radian>,
    #[serde(default)]
    pub datasets: Vec<DatasetDescription>,
}

fn default_distance() -> Meter {
    1.0
}

impl SystemDescription {
    pub fn new(hierarchy: Hierarchy) -> Self {
        SystemDescription {
            hierarchy,
            t0: 0.0,
            t0_perpass: 0.0,
            distance: default_distance(),
            inclinations: BTreeMap::new(),
            datasets: Vec::new(),
        }
    }

    pub fn with_dataset(mut self, dataset: DatasetDescription) -> Self {
        self.datasets.push(dataset);
        self
    }

    pub fn with_epochs(mut self, t0: Day, t0_perpass: Day) -> Self {
        self.t0 = t0;
        self.t0_perpass = t0_perpass;
        self
    }

    pub fn with_distance(mut self, distance: Meter) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_inclination(mut self, component: &str, incl: Radian) -> Self {
        self.inclinations.insert(component.to_string(), incl);
        self
    }

    pub fn dataset(&self, label: &str) -> Option<&DatasetDescription> {
        self.datasets.iter().find(|d| d.label == label)
    }
}

/// Piecewise-linear interpolation of `fp(xp)` at `x`, clamped to the end values outside the
/// table. `xp` must be ascending.
pub(crate) fn interp(x: f64, xp: &[f64], fp: &[f64]) -> Option<f64> {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return None;
    }
    if x <= xp[0] {
        return Some(fp[0]);
    }
    if x >= xp[n - 1] {
        return Some(fp[n - 1]);
    }
    let hi = xp[..n].partition_point(|&v| v <= x);
    let lo = hi - 1;
    let span = xp[hi] - xp[lo];
    if span == 0.0 {
        return Some(fp[lo]);
    }
    let w = (x - xp[lo]) / span;
    Some(fp[lo] + w * (fp[hi] - fp[lo]))
}

impl Bundle for SystemDescription {
    fn datasets(&self) -> Vec<String> {
        self.datasets.iter().map(|d| d.label.clone()).collect()
    }

    fn dataset_kind(&self, dataset: &str) -> Option<ObservableKind> {
        self.dataset(dataset).map(|d| d.kind)
    }

    fn dataset_times(
        &self,
        dataset: &str,
        component: Option<&str>,
        qualifier: TimeQualifier,
    ) -> Option<Vec<Day>> {
        let attachment = self.dataset(dataset)?.attachment(component)?;
        match qualifier {
            TimeQualifier::Times => attachment.times.clone(),
            TimeQualifier::TimeEphems => attachment.time_ephems.clone(),
        }
    }

    fn exptime(&self, dataset: &str) -> Duration {
        let seconds = self.dataset(dataset).map_or(0.0, |d| d.exptime);
        Unit::Second * seconds
    }

    fn l3(&self, dataset: &str) -> f64 {
        self.dataset(dataset).map_or(0.0, |d| d.l3)
    }

    fn pblum_ref(&self, component: &str, dataset: &str) -> Option<PblumRef> {
        self.dataset(dataset)?
            .attachment(Some(component))?
            .pblum_ref
            .clone()
    }

    fn pblum(&self, component: &str, dataset: &str) -> f64 {
        self.dataset(dataset)
            .and_then(|d| d.attachment(Some(component)))
            .and_then(|a| a.pblum)
            .unwrap_or(4.0 * std::f64::consts::PI)
    }

    fn limb_darkening(&self, component: &str, dataset: &str) -> LimbDarkening {
        self.dataset(dataset)
            .and_then(|d| d.attachment(Some(component)))
            .and_then(|a| a.ld.clone())
            .unwrap_or_default()
    }

    fn cycle_number(
        &self,
        dataset: &str,
        component: Option<&str>,
        time_ephem: Day,
    ) -> Result<f64, SynthError> {
        let missing = || {
            SynthError::InvalidConfiguration(format!(
                "dataset '{dataset}' has no cycle-number table for component '{}'",
                component.unwrap_or("<system>")
            ))
        };
        let attachment = self
            .dataset(dataset)
            .and_then(|d| d.attachment(component))
            .ok_or_else(missing)?;
        match (&attachment.time_ephems, &attachment.ns) {
            (Some(xp), Some(fp)) => interp(time_ephem, xp, fp).ok_or_else(missing),
            _ => Err(missing()),
        }
    }

    fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    fn distance(&self) -> Meter {
        self.distance
    }

    fn t0(&self) -> Day {
        self.t0
    }

    fn t0_perpass(&self) -> Day {
        self.t0_perpass
    }

    fn inclination(&self, component: &str) -> Radian {
        self.inclinations
            .get(component)
            .copied()
            .unwrap_or(FRAC_PI_2)
    }
}
