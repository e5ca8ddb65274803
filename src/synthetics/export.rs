//! CSV export of a filled [`SyntheticSet`].
//!
//! One file per container, named `<kind>_<dataset>_<component>.csv` (`system` for system-level
//! containers). Mesh containers produce one file per snapshot, suffixed by the snapshot index.
//! Sp containers carry no filled quantity and are not exported.
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::synth_errors::SynthError;
use crate::synthetics::mesh::{MeshSnapshot, TRIANGLE_COLUMNS};
use crate::synthetics::{Synthetic, SyntheticData, SyntheticSet};

#[derive(Debug, Serialize)]
struct LcRow {
    time: f64,
    flux: f64,
}

#[derive(Debug, Serialize)]
struct RvRow {
    time: f64,
    rv: f64,
}

#[derive(Debug, Serialize)]
struct EtvRow {
    time_ephem: f64,
    time_ecl: f64,
    etv: f64,
    #[serde(rename = "N")]
    n: f64,
}

#[derive(Debug, Serialize)]
struct OrbRow {
    time: f64,
    x: f64,
    y: f64,
    z: f64,
    vx: f64,
    vy: f64,
    vz: f64,
}

fn file_stem(syn: &Synthetic) -> String {
    format!(
        "{}_{}_{}",
        syn.kind(),
        syn.dataset,
        syn.component().unwrap_or("system")
    )
}

fn write_rows<R: Serialize>(
    path: &Utf8Path,
    rows: impl IntoIterator<Item = R>,
) -> Result<(), SynthError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write named columns side by side; rows stop at the shortest column.
fn write_columns(path: &Utf8Path, columns: &[(&str, &[f64])]) -> Result<(), SynthError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(columns.iter().map(|(name, _)| *name))?;
    let n_rows = columns.iter().map(|(_, c)| c.len()).min().unwrap_or(0);
    for i in 0..n_rows {
        writer.write_record(columns.iter().map(|(_, c)| c[i].to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_snapshot(path: &Utf8Path, snapshot: &MeshSnapshot) -> Result<(), SynthError> {
    let n = snapshot.n_triangles();
    let mut columns: Vec<(String, &[f64])> = TRIANGLE_COLUMNS
        .iter()
        .filter_map(|name| snapshot.column(name).map(|c| (name.to_string(), c.as_slice())))
        .filter(|(_, c)| !c.is_empty() && c.len() == n)
        .collect();
    for (dataset, dep) in &snapshot.dependent {
        for (name, c) in &dep.columns {
            if !c.is_empty() && c.len() == n {
                columns.push((format!("{name}:{dataset}"), c.as_slice()));
            }
        }
    }
    let named: Vec<(&str, &[f64])> = columns.iter().map(|(k, c)| (k.as_str(), *c)).collect();
    write_columns(path, &named)
}

/// Write every container of `set` as CSV under `dir`.
///
/// Return
/// ----------
/// * The written paths, in container order.
pub fn write_csv(set: &SyntheticSet, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, SynthError> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    for syn in set {
        let stem = file_stem(syn);
        match &syn.data {
            SyntheticData::Lc { times, fluxes } => {
                let path = dir.join(format!("{stem}.csv"));
                write_rows(
                    &path,
                    times
                        .iter()
                        .zip(fluxes)
                        .map(|(&time, &flux)| LcRow { time, flux }),
                )?;
                written.push(path);
            }
            SyntheticData::Rv { times, rvs } => {
                let path = dir.join(format!("{stem}.csv"));
                write_rows(
                    &path,
                    times.iter().zip(rvs).map(|(&time, &rv)| RvRow { time, rv }),
                )?;
                written.push(path);
            }
            SyntheticData::Etv {
                time_ephems,
                time_ecls,
                etvs,
                ns,
            } => {
                let path = dir.join(format!("{stem}.csv"));
                let n = [time_ecls, etvs, ns]
                    .iter()
                    .map(|c| c.len())
                    .fold(time_ephems.len(), usize::min);
                let rows = (0..n).map(|i| EtvRow {
                    time_ephem: time_ephems[i],
                    time_ecl: time_ecls[i],
                    etv: etvs[i],
                    n: ns[i],
                });
                write_rows(&path, rows)?;
                written.push(path);
            }
            SyntheticData::Orb {
                times,
                xs,
                ys,
                zs,
                vxs,
                vys,
                vzs,
            } => {
                let path = dir.join(format!("{stem}.csv"));
                let n = [xs, ys, zs, vxs, vys, vzs]
                    .iter()
                    .map(|c| c.len())
                    .fold(times.len(), usize::min);
                let rows = (0..n).map(|i| OrbRow {
                    time: times[i],
                    x: xs[i],
                    y: ys[i],
                    z: zs[i],
                    vx: vxs[i],
                    vy: vys[i],
                    vz: vzs[i],
                });
                write_rows(&path, rows)?;
                written.push(path);
            }
            SyntheticData::Ifm { times, columns } => {
                let path = dir.join(format!("{stem}.csv"));
                let mut named: Vec<(&str, &[f64])> = vec![("times", times.as_slice())];
                named.extend(columns.iter().map(|(k, c)| (k.as_str(), c.as_slice())));
                write_columns(&path, &named)?;
                written.push(path);
            }
            SyntheticData::Mesh(mesh) => {
                for (i, snapshot) in mesh.snapshots.iter().enumerate() {
                    let path = dir.join(format!("{stem}_{i:04}.csv"));
                    write_snapshot(&path, snapshot)?;
                    written.push(path);
                }
            }
            SyntheticData::Sp { .. } => {}
        }
    }

    Ok(written)
}
