//! Legacy engine input file.
//!
//! The legacy engine reads its whole configuration from a flat `name = value` file. Indexed
//! parameters are written `name[i]` with a 1-based `i`; the engine's `get_par` API addresses the
//! same entries with a 0-based index.
use std::fmt;

use camino::Utf8Path;

use crate::bundle::Bundle;
use crate::compute::ComputeOptions;
use crate::observables::{ObservableKind, TimeQualifier};
use crate::synth_errors::SynthError;

#[derive(Debug, Clone, PartialEq)]
pub enum LegacyValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for LegacyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegacyValue::Int(v) => write!(f, "{v}"),
            // Debug keeps the decimal point, so floats parse back as floats
            LegacyValue::Float(v) => write!(f, "{v:?}"),
            LegacyValue::Str(v) => write!(f, "\"{v}\""),
        }
    }
}

impl LegacyValue {
    /// Parse the right-hand side of an input file line.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
            return LegacyValue::Str(inner.to_string());
        }
        if let Ok(v) = raw.parse::<i64>() {
            return LegacyValue::Int(v);
        }
        match raw.parse::<f64>() {
            Ok(v) => LegacyValue::Float(v),
            Err(_) => LegacyValue::Str(raw.to_string()),
        }
    }

    /// Value as the engine reports it through `get_par`: strings unquoted.
    pub fn as_par(&self) -> String {
        match self {
            LegacyValue::Str(v) => v.clone(),
            other => other.to_string(),
        }
    }
}

impl From<i32> for LegacyValue {
    fn from(v: i32) -> Self {
        LegacyValue::Int(v.into())
    }
}

impl From<i64> for LegacyValue {
    fn from(v: i64) -> Self {
        LegacyValue::Int(v)
    }
}

impl From<f64> for LegacyValue {
    fn from(v: f64) -> Self {
        LegacyValue::Float(v)
    }
}

impl From<&str> for LegacyValue {
    fn from(v: &str) -> Self {
        LegacyValue::Str(v.to_string())
    }
}

impl From<String> for LegacyValue {
    fn from(v: String) -> Self {
        LegacyValue::Str(v)
    }
}

/// Ordered `name = value` entries of an input file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyInput {
    pub entries: Vec<(String, LegacyValue)>,
}

fn indexed(name: &str, index0: usize) -> String {
    format!("{name}[{}]", index0 + 1)
}

impl LegacyInput {
    fn push(&mut self, name: impl Into<String>, value: impl Into<LegacyValue>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Translate the description into engine parameters.
    ///
    /// Light curves are numbered in dataset order. Radial-velocity curves are numbered per
    /// (dataset, star) attachment, the first star being the primary.
    pub fn from_bundle(bundle: &dyn Bundle, compute: &ComputeOptions) -> Self {
        let mut input = LegacyInput::default();
        let stars = bundle.hierarchy().stars();

        input.push("phoebe_hjd0", bundle.t0());
        if let Some(primary) = stars.first() {
            input.push("phoebe_incl", bundle.inclination(primary).to_degrees());
        }

        let enabled = |kind: ObservableKind| {
            bundle
                .datasets()
                .into_iter()
                .filter(move |d| bundle.dataset_kind(d) == Some(kind) && compute.is_enabled(d))
        };

        let lcs: Vec<String> = enabled(ObservableKind::Lc).collect();
        input.push("phoebe_lcno", lcs.len() as i64);
        for (i, dataset) in lcs.iter().enumerate() {
            input.push(indexed("phoebe_lc_id", i), dataset.as_str());
            input.push(indexed("phoebe_lc_indep", i), "Time (HJD)");
            input.push(indexed("phoebe_lc_dep", i), "Flux");
            input.push(indexed("phoebe_el3", i), bundle.l3(dataset));
        }

        let rvs: Vec<(String, usize)> = enabled(ObservableKind::Rv)
            .flat_map(|dataset| {
                stars
                    .iter()
                    .enumerate()
                    .filter(|(_, star)| {
                        bundle
                            .dataset_times(&dataset, Some(star.as_str()), TimeQualifier::Times)
                            .is_some()
                    })
                    .map(|(k, _)| (dataset.clone(), k))
                    .collect::<Vec<_>>()
            })
            .collect();
        input.push("phoebe_rvno", rvs.len() as i64);
        for (i, (dataset, star)) in rvs.iter().enumerate() {
            let dep = if *star == 0 { "Primary RV" } else { "Secondary RV" };
            input.push(indexed("phoebe_rv_id", i), dataset.as_str());
            input.push(indexed("phoebe_rv_indep", i), "Time (HJD)");
            input.push(indexed("phoebe_rv_dep", i), dep);
        }

        input
    }

    pub fn get(&self, name: &str) -> Option<&LegacyValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Indexed entry addressed the way the engine does, with a 0-based index.
    pub fn get_indexed(&self, name: &str, index0: usize) -> Option<&LegacyValue> {
        self.get(&indexed(name, index0))
    }

    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{k} = {v}\n"))
            .collect()
    }

    /// Read back a rendered file. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self, SynthError> {
        let mut input = LegacyInput::default();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, value) = line.split_once('=').ok_or_else(|| {
                SynthError::LegacyEngine(format!("malformed input line {}: '{line}'", n + 1))
            })?;
            input.push(name.trim(), LegacyValue::parse(value));
        }
        Ok(input)
    }

    pub fn write(&self, path: &Utf8Path) -> Result<(), SynthError> {
        std::fs::write(path, self.render())?;
        Ok(())
    }
}
