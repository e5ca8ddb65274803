//! # Observable kinds
//!
//! The closed set of observables a dataset can request. Every per-kind decision in the crate
//! (time qualifier, system-level attachment, mesh dependency, container schema, step filler)
//! is a `match` over [`ObservableKind`], so adding a kind is a compile-time exercise rather than
//! a silent fallthrough.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::synth_errors::SynthError;

/// Kind of observable requested by a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservableKind {
    /// Discretized stellar surface snapshot
    Mesh,
    /// Light curve (integrated flux)
    Lc,
    /// Radial velocity
    Rv,
    /// Eclipse timing variation
    Etv,
    /// Interferometric quantities
    Ifm,
    /// Orbital position and velocity
    Orb,
    /// Spectra
    Sp,
}

/// Name of the parameter holding the time array of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeQualifier {
    /// `times`
    Times,
    /// `time_ephems` (ephemeris times at which eclipses are expected)
    TimeEphems,
}

impl ObservableKind {
    pub const ALL: [ObservableKind; 7] = [
        ObservableKind::Mesh,
        ObservableKind::Lc,
        ObservableKind::Rv,
        ObservableKind::Etv,
        ObservableKind::Ifm,
        ObservableKind::Orb,
        ObservableKind::Sp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObservableKind::Mesh => "mesh",
            ObservableKind::Lc => "lc",
            ObservableKind::Rv => "rv",
            ObservableKind::Etv => "etv",
            ObservableKind::Ifm => "ifm",
            ObservableKind::Orb => "orb",
            ObservableKind::Sp => "sp",
        }
    }

    /// The parameter carrying the time array for this kind.
    pub fn time_qualifier(&self) -> TimeQualifier {
        match self {
            ObservableKind::Etv => TimeQualifier::TimeEphems,
            _ => TimeQualifier::Times,
        }
    }

    /// Whether a dataset of this kind may be attached to the system as a whole
    /// (component `None`) rather than to a single star.
    pub fn accepts_system_level(&self) -> bool {
        matches!(self, ObservableKind::Lc | ObservableKind::Mesh)
    }

    /// Per-triangle columns a mesh snapshot must expose for a mesh-requiring dataset of this kind.
    ///
    /// Return
    /// ----------
    /// * The column names, in declaration order. The passband luminosity (`pblum`) is stored
    ///   separately as a scalar and is not listed here.
    pub fn dependent_columns(&self) -> &'static [&'static str] {
        match self {
            ObservableKind::Rv => &[
                "rvs",
                "intensities",
                "normal_intensities",
                "boost_factors",
                "abs_intensities",
                "abs_normal_intensities",
            ],
            ObservableKind::Lc => &[
                "intensities",
                "normal_intensities",
                "boost_factors",
                "abs_intensities",
                "abs_normal_intensities",
            ],
            _ => &[],
        }
    }
}

impl fmt::Display for ObservableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ObservableKind {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObservableKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SynthError::UnknownKind(s.to_string()))
    }
}
