use thiserror::Error;

use crate::observables::ObservableKind;

/// Render an optional component label the way error messages show it.
fn component_name(component: &Option<String>) -> &str {
    component.as_deref().unwrap_or("<system>")
}

/// Render an optional time the way error messages show it.
fn time_name(time: &Option<f64>) -> String {
    time.map(|t| format!("{t}"))
        .unwrap_or_else(|| "<any>".to_string())
}

#[derive(Error, Debug)]
pub enum SynthError {
    #[error("Invalid compute parameter: {0}")]
    InvalidComputeParameter(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("kind {0} not yet supported by this backend")]
    UnsupportedKind(ObservableKind),

    #[error("Unknown observable kind: {0}")]
    UnknownKind(String),

    #[error(
        "more than 1 result found for kind={kind}, dataset={dataset}, component={}, time={}: {count} matches",
        component_name(component),
        time_name(time)
    )]
    AmbiguousTarget {
        kind: ObservableKind,
        dataset: String,
        component: Option<String>,
        time: Option<f64>,
        count: usize,
    },

    #[error(
        "no synthetic found for kind={kind}, dataset={dataset}, component={}, time={}",
        component_name(component),
        time_name(time)
    )]
    MissingTarget {
        kind: ObservableKind,
        dataset: String,
        component: Option<String>,
        time: Option<f64>,
    },

    #[error("pblum_ref of component '{component}' for dataset '{dataset}' points to unknown component '{reference}'")]
    UnknownPblumReference {
        component: String,
        dataset: String,
        reference: String,
    },

    #[error("pblum_ref copies form a cycle for dataset '{dataset}': {}", components.join(" -> "))]
    PblumReferenceCycle {
        dataset: String,
        components: Vec<String>,
    },

    #[error("analytic horizon not implemented for distortion_method='{distortion}', mesh_method='{mesh_method}'")]
    UnsupportedHorizonMethod {
        distortion: String,
        mesh_method: String,
    },

    #[error("No dynamics available for component '{0}'")]
    MissingDynamics(String),

    #[error("Mesh column '{0}' not provided by the system")]
    MissingMeshColumn(String),

    #[error("Observation did not return the '{0}' quantity")]
    MissingObservable(String),

    #[error("Legacy engine failure: {0}")]
    LegacyEngine(String),

    #[error("All mesh keys should be component specific, got '{0}'")]
    LegacyMeshKey(String),

    #[error("External service failure: {0}")]
    External(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV writer error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("UTF-8 Path error: {0}")]
    Utf8PathError(String),
}

impl PartialEq for SynthError {
    fn eq(&self, other: &Self) -> bool {
        use SynthError::*;
        match (self, other) {
            (InvalidComputeParameter(a), InvalidComputeParameter(b)) => a == b,
            (InvalidConfiguration(a), InvalidConfiguration(b)) => a == b,
            (UnsupportedKind(a), UnsupportedKind(b)) => a == b,
            (UnknownKind(a), UnknownKind(b)) => a == b,
            (
                AmbiguousTarget {
                    kind: k1,
                    dataset: d1,
                    component: c1,
                    time: t1,
                    count: n1,
                },
                AmbiguousTarget {
                    kind: k2,
                    dataset: d2,
                    component: c2,
                    time: t2,
                    count: n2,
                },
            ) => k1 == k2 && d1 == d2 && c1 == c2 && t1 == t2 && n1 == n2,
            (
                MissingTarget {
                    kind: k1,
                    dataset: d1,
                    component: c1,
                    time: t1,
                },
                MissingTarget {
                    kind: k2,
                    dataset: d2,
                    component: c2,
                    time: t2,
                },
            ) => k1 == k2 && d1 == d2 && c1 == c2 && t1 == t2,
            (
                UnknownPblumReference {
                    component: c1,
                    dataset: d1,
                    reference: r1,
                },
                UnknownPblumReference {
                    component: c2,
                    dataset: d2,
                    reference: r2,
                },
            ) => c1 == c2 && d1 == d2 && r1 == r2,
            (
                PblumReferenceCycle {
                    dataset: d1,
                    components: c1,
                },
                PblumReferenceCycle {
                    dataset: d2,
                    components: c2,
                },
            ) => d1 == d2 && c1 == c2,
            (
                UnsupportedHorizonMethod {
                    distortion: d1,
                    mesh_method: m1,
                },
                UnsupportedHorizonMethod {
                    distortion: d2,
                    mesh_method: m2,
                },
            ) => d1 == d2 && m1 == m2,
            (MissingDynamics(a), MissingDynamics(b)) => a == b,
            (MissingMeshColumn(a), MissingMeshColumn(b)) => a == b,
            (MissingObservable(a), MissingObservable(b)) => a == b,
            (LegacyEngine(a), LegacyEngine(b)) => a == b,
            (LegacyMeshKey(a), LegacyMeshKey(b)) => a == b,
            (External(a), External(b)) => a == b,
            (Utf8PathError(a), Utf8PathError(b)) => a == b,

            // Not comparable: equal when the variant matches
            (IoError(_), IoError(_)) => true,
            (CsvError(_), CsvError(_)) => true,

            _ => false,
        }
    }
}
