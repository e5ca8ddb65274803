//! Translation of legacy engine meshes into mesh snapshots.
//!
//! The legacy engine only meshes one octant of each star and names its columns
//! `<field><digit>`, the digit being 1 for the primary and 2 for the secondary. Every value is
//! replicated over the eight octants, flipping the sign of y (resp. z) components in the octants
//! mirrored across the xz (resp. xy) plane.
//!
//! Field names map to snapshot columns as follows:
//!
//! | legacy  | snapshot                  |
//! |---------|---------------------------|
//! | `tloc`  | `teffs`                   |
//! | `glog`  | `loggs`                   |
//! | `vcx..` | `xs`, `ys`, `zs`          |
//! | `grx..` | `nxs`, `nys`, `nzs`       |
//! | `csbt`  | `cosbetas`                |
//! | `rad`   | `rs`                      |
//! | `Inorm` | `abs_normal_intensities`  |
//!
//! Any other field is looked up under its own name.
use std::collections::BTreeMap;

use regex::Regex;

use crate::constants::{Day, PBMESH, PROTOMESH};
use crate::synth_errors::SynthError;
use crate::synthetics::SyntheticSet;

/// Mesh columns returned by the legacy engine, keyed by legacy column name.
pub type LegacyMesh = BTreeMap<String, Vec<f64>>;

const PLAIN: [f64; 8] = [1.0; 8];
const MIRROR_Y: [f64; 8] = [1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0, -1.0];
const MIRROR_Z: [f64; 8] = [1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0];

/// Snapshot column of a legacy field, `None` for unknown fields.
pub fn snapshot_column(field: &str) -> Option<&'static str> {
    let column = match field {
        "tloc" => "teffs",
        "glog" => "loggs",
        "vcx" => "xs",
        "vcy" => "ys",
        "vcz" => "zs",
        "grx" => "nxs",
        "gry" => "nys",
        "grz" => "nzs",
        "csbt" => "cosbetas",
        "rad" => "rs",
        "Inorm" => "abs_normal_intensities",
        _ => return None,
    };
    Some(column)
}

fn octant_signs(field: &str) -> [f64; 8] {
    match field {
        "vcy" | "gry" => MIRROR_Y,
        "vcz" | "grz" => MIRROR_Z,
        _ => PLAIN,
    }
}

/// Replicate every value over the eight octants.
pub fn mirror_octants(values: &[f64], signs: [f64; 8]) -> Vec<f64> {
    values
        .iter()
        .flat_map(|&v| signs.map(|s| s * v))
        .collect()
}

/// Split `values` into `n` contiguous chunks whose lengths differ by at most one, longer chunks
/// first.
pub fn split_chunks(values: &[f64], n: usize) -> Vec<&[f64]> {
    if n == 0 {
        return Vec::new();
    }
    let base = values.len() / n;
    let extra = values.len() % n;
    let mut chunks = Vec::with_capacity(n);
    let mut start = 0;
    for k in 0..n {
        let len = base + usize::from(k < extra);
        chunks.push(&values[start..start + len]);
        start += len;
    }
    chunks
}

/// Field name and component label of a legacy column.
struct LegacyKey {
    field: String,
    component: String,
}

struct KeyParser {
    pattern: Regex,
}

impl KeyParser {
    fn new() -> Result<Self, SynthError> {
        let pattern = Regex::new(r"^([A-Za-z]+)([0-9])$")
            .map_err(|e| SynthError::LegacyMeshKey(e.to_string()))?;
        Ok(KeyParser { pattern })
    }

    fn parse(&self, key: &str, stars: &[String]) -> Result<LegacyKey, SynthError> {
        let caps = self
            .pattern
            .captures(key)
            .ok_or_else(|| SynthError::LegacyMeshKey(key.to_string()))?;
        let star = match &caps[2] {
            "1" => stars.first(),
            "2" => stars.get(1),
            _ => None,
        }
        .ok_or_else(|| SynthError::LegacyMeshKey(key.to_string()))?;
        Ok(LegacyKey {
            field: caps[1].to_string(),
            component: star.clone(),
        })
    }
}

fn gradient_norms(mesh: &LegacyMesh, digit: &str) -> Result<Vec<f64>, SynthError> {
    let axis = |a: &str| {
        let key = format!("gr{a}{digit}");
        mesh.get(&key)
            .ok_or_else(|| SynthError::LegacyEngine(format!("protomesh is missing column '{key}'")))
    };
    let (gx, gy, gz) = (axis("x")?, axis("y")?, axis("z")?);
    Ok(gx
        .iter()
        .zip(gy)
        .zip(gz)
        .map(|((x, y), z)| (x * x + y * y + z * z).sqrt())
        .collect())
}

/// Fill the protomesh snapshots at `t0_perpass` from a single-time legacy mesh.
///
/// Gradients are turned into outward unit normals. Fields without a snapshot column are reported
/// in `warnings`.
pub fn translate_protomesh(
    mesh: &LegacyMesh,
    stars: &[String],
    t0_perpass: Day,
    set: &mut SyntheticSet,
    warnings: &mut Vec<String>,
) -> Result<(), SynthError> {
    let parser = KeyParser::new()?;

    for (key, values) in mesh {
        let parsed = parser.parse(key, stars)?;
        let signs = octant_signs(&parsed.field);

        let column = if parsed.field.starts_with("gr") {
            let digit = &key[key.len() - 1..];
            let norms = mirror_octants(&gradient_norms(mesh, digit)?, PLAIN);
            mirror_octants(values, signs)
                .iter()
                .zip(&norms)
                .map(|(g, n)| -g / n)
                .collect()
        } else {
            mirror_octants(values, signs)
        };

        let snapshot = set.snapshot_mut(PROTOMESH, Some(&parsed.component), t0_perpass)?;
        let name = snapshot_column(&parsed.field).unwrap_or(parsed.field.as_str());
        match snapshot.column_mut(name) {
            Some(target) => *target = column,
            None => warnings.push(format!("{key} has no corresponding value in the protomesh")),
        }
    }
    Ok(())
}

/// Fill the automesh snapshots from a multi-time legacy mesh.
///
/// Each legacy column holds every time back to back; it is split into one chunk per time.
/// `Inorm` goes to the dependent columns of `dataset`. Center and gradient fields are not placed
/// in orbit by the engine and are skipped with a warning.
pub fn translate_automesh(
    mesh: &LegacyMesh,
    stars: &[String],
    times: &[Day],
    dataset: &str,
    set: &mut SyntheticSet,
    warnings: &mut Vec<String>,
) -> Result<(), SynthError> {
    let parser = KeyParser::new()?;

    for (key, values) in mesh {
        let parsed = parser.parse(key, stars)?;
        if parsed.field.starts_with("vc") || parsed.field.starts_with("gr") {
            warnings.push(format!("{key} is not placed in orbit and is skipped in the automesh"));
            continue;
        }
        let column = snapshot_column(&parsed.field).unwrap_or(parsed.field.as_str());

        for (&time, chunk) in times.iter().zip(split_chunks(values, times.len())) {
            let snapshot = set.snapshot_mut(PBMESH, Some(&parsed.component), time)?;
            let target = if parsed.field == "Inorm" {
                snapshot.dependent_column_mut(dataset, column)
            } else {
                snapshot.column_mut(column)
            };
            match target {
                Some(target) => *target = mirror_octants(chunk, PLAIN),
                None => warnings.push(format!(
                    "{key} has no corresponding value in the automesh at t={time}"
                )),
            }
        }
    }
    Ok(())
}
