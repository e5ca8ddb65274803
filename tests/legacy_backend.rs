mod common;

use camino::Utf8PathBuf;

use binsynth::backends::legacy::{run_legacy, LegacyValue};
use binsynth::bundle::description::{DatasetDescription, SystemDescription};
use binsynth::bundle::Hierarchy;
use binsynth::compute::{ComputeOptions, DatasetCompute, EngineKind, RvMethod};
use binsynth::constants::{PBMESH, PROTOMESH};
use binsynth::observables::ObservableKind;
use binsynth::synth_errors::SynthError;

use common::{binary, MockLegacy};

fn legacy() -> binsynth::compute::ComputeOptionsBuilder {
    ComputeOptions::builder().engine(EngineKind::Legacy)
}

fn rv_bundle() -> SystemDescription {
    binary().with_dataset(
        DatasetDescription::new("rv01", ObservableKind::Rv)
            .with_times(Some("primary"), vec![0.5])
            .with_times(Some("secondary"), vec![0.5, 1.0]),
    )
}

#[test]
fn test_light_curve() {
    let bundle = binary()
        .with_dataset(DatasetDescription::new("lc01", ObservableKind::Lc).with_times(None, vec![0.0, 1.0]));
    let compute = legacy().dataset("lc01", DatasetCompute::default()).build().unwrap();
    let mut engine = MockLegacy::new();

    let output = run_legacy(&bundle, &compute, &mut engine, None).unwrap();
    let lc = output.synthetics.get(ObservableKind::Lc, "lc01", None).unwrap();
    assert_eq!(lc.column("times").unwrap(), &[0.0, 1.0]);
    assert_eq!(lc.column("fluxes").unwrap(), &[1.0, 2.0]);
    assert_eq!(engine.calls, vec!["init", "configure", "open", "lc:0"]);
    assert!(output.warnings.is_empty());
}

#[test]
fn test_light_curves_are_numbered_in_order() {
    let bundle = binary()
        .with_dataset(DatasetDescription::new("lc01", ObservableKind::Lc).with_times(None, vec![0.0]))
        .with_dataset(DatasetDescription::new("lc02", ObservableKind::Lc).with_times(None, vec![0.0]));
    let compute = legacy()
        .dataset("lc01", DatasetCompute::default())
        .dataset("lc02", DatasetCompute::default())
        .build()
        .unwrap();
    let mut engine = MockLegacy::new();

    let output = run_legacy(&bundle, &compute, &mut engine, None).unwrap();
    let lc02 = output.synthetics.get(ObservableKind::Lc, "lc02", None).unwrap();
    assert_eq!(lc02.column("fluxes").unwrap(), &[2.0]);
    assert!(engine.calls.ends_with(&["lc:0".to_string(), "lc:1".to_string()]));
}

#[test]
fn test_light_curve_index_follows_input_file() {
    // an enabled light curve without times still takes an engine slot
    let bundle = binary()
        .with_dataset(DatasetDescription::new("lc_empty", ObservableKind::Lc).with_times(None, Vec::new()))
        .with_dataset(DatasetDescription::new("lc01", ObservableKind::Lc).with_times(None, vec![0.0]));
    let compute = legacy()
        .dataset("lc_empty", DatasetCompute::default())
        .dataset("lc01", DatasetCompute::default())
        .build()
        .unwrap();
    let mut engine = MockLegacy::new();

    let output = run_legacy(&bundle, &compute, &mut engine, None).unwrap();
    let lc = output.synthetics.get(ObservableKind::Lc, "lc01", None).unwrap();
    assert_eq!(lc.column("fluxes").unwrap(), &[2.0]);
    assert_eq!(engine.calls, vec!["init", "configure", "open", "lc:1"]);
}

#[test]
fn test_unmatched_light_curve() {
    let bundle = binary()
        .with_dataset(DatasetDescription::new("lc01", ObservableKind::Lc).with_times(None, vec![0.0]));
    let compute = legacy().dataset("lc01", DatasetCompute::default()).build().unwrap();
    let mut engine = MockLegacy::new();
    engine.overrides.insert("phoebe_lc_id[1]".into(), "other".into());

    let err = run_legacy(&bundle, &compute, &mut engine, None).unwrap_err();
    assert!(matches!(err, SynthError::InvalidConfiguration(msg) if msg.contains("lc01")));
}

#[test]
fn test_radial_velocities_per_star() {
    let bundle = rv_bundle();
    let compute = legacy().dataset("rv01", DatasetCompute::default()).build().unwrap();
    let mut engine = MockLegacy::new();

    let output = run_legacy(&bundle, &compute, &mut engine, None).unwrap();
    let primary = output
        .synthetics
        .get(ObservableKind::Rv, "rv01", Some("primary"))
        .unwrap();
    let secondary = output
        .synthetics
        .get(ObservableKind::Rv, "rv01", Some("secondary"))
        .unwrap();
    assert_eq!(primary.column("rvs").unwrap(), &[5.0]);
    assert_eq!(secondary.column("rvs").unwrap(), &[-5.0, -10.0]);
    assert!(engine.calls.contains(&"rv1:0".to_string()));
    assert!(engine.calls.contains(&"rv2:1".to_string()));
    assert_eq!(
        engine.pars,
        vec![
            ("phoebe_proximity_rv1_switch".to_string(), LegacyValue::Int(1)),
            ("phoebe_proximity_rv2_switch".to_string(), LegacyValue::Int(1)),
        ]
    );
}

#[test]
fn test_proximity_switch_follows_primary_method() {
    let bundle = rv_bundle();
    let compute = legacy()
        .dataset(
            "rv01",
            DatasetCompute::default().rv_method("primary", RvMethod::Dynamical),
        )
        .build()
        .unwrap();
    let mut engine = MockLegacy::new();

    run_legacy(&bundle, &compute, &mut engine, None).unwrap();
    assert!(engine.pars.iter().all(|(_, v)| *v == LegacyValue::Int(0)));
}

#[test]
fn test_unmatched_rv_curve() {
    let bundle = rv_bundle();
    let compute = legacy().dataset("rv01", DatasetCompute::default()).build().unwrap();
    let mut engine = MockLegacy::new();
    engine.overrides.insert("phoebe_rv_id[1]".into(), "other".into());
    engine.overrides.insert("phoebe_rv_id[2]".into(), "other".into());

    let err = run_legacy(&bundle, &compute, &mut engine, None).unwrap_err();
    assert!(matches!(err, SynthError::InvalidConfiguration(msg) if msg.contains("rv01")));
}

#[test]
fn test_rv_curve_falls_back_to_first_id_match() {
    let bundle = rv_bundle();
    let compute = legacy().dataset("rv01", DatasetCompute::default()).build().unwrap();
    let mut engine = MockLegacy::new();
    engine.overrides.insert("phoebe_rv_dep[2]".into(), "Primary RV".into());

    run_legacy(&bundle, &compute, &mut engine, None).unwrap();
    assert!(engine.calls.contains(&"rv2:0".to_string()));
}

#[test]
fn test_explicit_input_file_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().join("run.phoebe")).unwrap();
    let bundle = rv_bundle();
    let compute = legacy()
        .dataset("rv01", DatasetCompute::default())
        .legacy_input(path.clone())
        .build()
        .unwrap();
    let mut engine = MockLegacy::new();

    run_legacy(&bundle, &compute, &mut engine, None).unwrap();
    assert_eq!(engine.opened.as_ref(), Some(&path));
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("phoebe_rvno = 2"));
}

#[test]
fn test_temporary_input_file_is_removed() {
    let bundle = rv_bundle();
    let compute = legacy().dataset("rv01", DatasetCompute::default()).build().unwrap();
    let mut engine = MockLegacy::new();

    run_legacy(&bundle, &compute, &mut engine, None).unwrap();
    let opened = engine.opened.unwrap();
    assert!(!opened.exists());
}

#[test]
fn test_mesh_datasets_are_reported() {
    let bundle = binary().with_dataset(
        DatasetDescription::new("mesh01", ObservableKind::Mesh).with_times(None, vec![0.0]),
    );
    let compute = legacy().dataset("mesh01", DatasetCompute::default()).build().unwrap();
    let mut engine = MockLegacy::new();

    let output = run_legacy(&bundle, &compute, &mut engine, None).unwrap();
    assert_eq!(
        output.unfilled_meshes,
        vec![
            ("mesh01".to_string(), Some("primary".to_string())),
            ("mesh01".to_string(), Some("secondary".to_string())),
        ]
    );
    assert_eq!(output.warnings.len(), 2);
}

#[test]
fn test_protomesh_and_automesh_translation() {
    let bundle = binary()
        .with_dataset(DatasetDescription::new("lc01", ObservableKind::Lc).with_times(None, vec![0.0, 1.0]))
        .with_epochs(0.0, 0.2);
    let compute = legacy()
        .dataset("lc01", DatasetCompute::default())
        .protomesh(true)
        .pbmesh(true)
        .build()
        .unwrap();
    let mut engine = MockLegacy::new();

    let output = run_legacy(&bundle, &compute, &mut engine, None).unwrap();
    assert_eq!(
        engine.calls[3..],
        ["lc_with_mesh:0".to_string(), "lc_with_mesh:0".to_string()]
    );
    assert_eq!(
        engine.pars,
        vec![("phoebe_lcno".to_string(), LegacyValue::Int(1))]
    );

    let proto = output
        .synthetics
        .get(ObservableKind::Mesh, PROTOMESH, Some("secondary"))
        .and_then(|s| s.as_mesh())
        .and_then(|m| m.snapshot(0.2))
        .unwrap();
    assert_eq!(proto.teffs, vec![2000.0; 16]);
    assert_eq!(proto.xs, vec![0.5; 16]);
    assert!(proto.nxs.iter().all(|n| (n + 0.6).abs() < 1e-12));
    assert!(proto.nzs[..4].iter().all(|n| (n + 0.8).abs() < 1e-12));
    assert!(proto.nzs[4..8].iter().all(|n| (n - 0.8).abs() < 1e-12));

    let auto = output
        .synthetics
        .get(ObservableKind::Mesh, PBMESH, Some("primary"))
        .and_then(|s| s.as_mesh())
        .and_then(|m| m.snapshot(1.0))
        .unwrap();
    assert_eq!(auto.teffs, vec![1001.0; 16]);
    assert_eq!(auto.dependent["lc01"].columns["abs_normal_intensities"], vec![101.0; 16]);
    assert!(auto.xs.is_empty());

    // Inorm in the protomesh, centers and gradients in the automesh
    assert!(output.warnings.iter().any(|w| w.starts_with("Inorm1")));
    assert!(output.warnings.iter().any(|w| w.starts_with("vcx2")));
    assert!(output.warnings.iter().any(|w| w.starts_with("grz1")));
}

#[test]
fn test_configuration_failure() {
    let bundle = rv_bundle();
    let compute = legacy().dataset("rv01", DatasetCompute::default()).build().unwrap();
    let mut engine = MockLegacy::new();
    engine.fail_configure = true;

    let err = run_legacy(&bundle, &compute, &mut engine, None).unwrap_err();
    assert!(matches!(err, SynthError::LegacyEngine(msg) if msg.contains("configuration failed")));
}

#[test]
fn test_unsupported_runs() {
    let mut engine = MockLegacy::new();

    let triple = SystemDescription::new(Hierarchy::new(vec!["a".into(), "b".into(), "c".into()]));
    let compute = legacy().build().unwrap();
    assert!(matches!(
        run_legacy(&triple, &compute, &mut engine, None),
        Err(SynthError::InvalidConfiguration(_))
    ));

    let native = ComputeOptions::builder().build().unwrap();
    assert!(matches!(
        run_legacy(&binary(), &native, &mut engine, None),
        Err(SynthError::InvalidConfiguration(_))
    ));

    let etv = binary().with_dataset(
        DatasetDescription::new("etv01", ObservableKind::Etv).with_time_ephems(
            "primary",
            vec![1.0],
            vec![0.0],
        ),
    );
    let compute = legacy().dataset("etv01", DatasetCompute::default()).build().unwrap();
    assert_eq!(
        run_legacy(&etv, &compute, &mut engine, None).unwrap_err(),
        SynthError::UnsupportedKind(ObservableKind::Etv)
    );
}

#[test]
fn test_times_override() {
    let bundle = rv_bundle();
    let compute = legacy().dataset("rv01", DatasetCompute::default()).build().unwrap();
    let mut engine = MockLegacy::new();

    let output = run_legacy(&bundle, &compute, &mut engine, Some(vec![2.0])).unwrap();
    let secondary = output
        .synthetics
        .get(ObservableKind::Rv, "rv01", Some("secondary"))
        .unwrap();
    assert_eq!(secondary.column("times").unwrap(), &[2.0]);
    assert_eq!(secondary.column("rvs").unwrap(), &[-20.0]);
}
