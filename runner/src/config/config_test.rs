use crate::{
    config::{ConfigErrors, SweepConfig, ThreadRange},
    scheduler::{FailureMode, TaskOrder},
    sweep::{template::CommandTemplate, LayoutModels, Sweep, Workload},
};
use std::{fs, os::unix::fs::PermissionsExt};
use tempfile::tempdir;

#[test]
pub fn thread_range_defaults_to_multiples_of_step() {
    assert_eq!(ThreadRange::default().counts(16), [4, 8, 12, 16]);
    assert_eq!(ThreadRange::default().counts(3), Vec::<usize>::new());

    let range = ThreadRange {
        start: Some(1),
        stop: Some(7),
        step: 2,
    };
    assert_eq!(range.counts(64), [1, 3, 5, 7]);

    let zero = ThreadRange {
        start: None,
        stop: None,
        step: 0,
    };
    assert!(zero.counts(8).is_empty());
}

#[test]
pub fn minimal_yaml_uses_defaults() {
    let config: SweepConfig =
        serde_yaml::from_str("executable: /opt/desbench\nodir: /tmp/out\n").unwrap();

    assert_eq!(config.runs, 1);
    assert_eq!(config.exetime, 10);
    assert_eq!(config.events, 10000);
    assert_eq!(config.models, "*");
    assert_eq!(config.marker, "Events per second");
    assert_eq!(config.failure_mode, FailureMode::AggressiveFail);
    assert!(matches!(
        config.scheduler_config().order,
        TaskOrder::Randomized { seed: None }
    ));
}

#[test]
pub fn full_yaml_is_parsed() {
    let yaml = r#"
executable: /opt/desbench
output_dir: /tmp/out
capacity: 16
threads:
  start: 2
  stop: 8
  step: 2
runs: 3
exetime: 5
numactl: --interleave=all
models: "phold*"
extra_models:
  phold33:
    kind: phold
    remote: 33
  tiny:
    kind: mem
    bytes: 1024
failure_mode: tolerant-continue
order:
  randomize: false
  seed: 7
verbose: true
"#;
    let config: SweepConfig = serde_yaml::from_str(yaml).unwrap();

    assert_eq!(config.capacity(), 16);
    assert_eq!(config.thread_counts(), [2, 4, 6, 8]);
    assert_eq!(config.failure_mode, FailureMode::TolerantContinue);
    assert_eq!(config.scheduler_config().order, TaskOrder::Insertion);
    assert_eq!(config.extra_models["phold33"], Workload::PHold { remote: 33 });
    assert_eq!(config.extra_models["tiny"], Workload::Mem { bytes: 1024 });

    let models = config.selected_models().unwrap();
    assert!(models.contains_key("phold33"));
    assert!(!models.contains_key("tiny"));
}

#[test]
pub fn unknown_fields_are_rejected() {
    let result: Result<SweepConfig, _> =
        serde_yaml::from_str("executable: /bin/true\noutput_dir: /tmp\nthreadz: 4\n");
    assert!(result.is_err());
}

#[test]
pub fn invalid_extra_model_fails_planning() {
    let mut config = SweepConfig::new("/opt/desbench", "/tmp/out");
    config.capacity = Some(4);
    config
        .extra_models
        .insert("sha3".to_string(), Workload::Sha { bits: 3 });

    assert!(matches!(
        Sweep::plan(&config),
        Err(ConfigErrors::InvalidWorkload { model, .. }) if model == "sha3"
    ));
}

#[test]
pub fn empty_selection_fails_planning() {
    let mut config = SweepConfig::new("/opt/desbench", "/tmp/out");
    config.capacity = Some(4);
    config.models = "nothing-like-this".to_string();

    assert!(matches!(Sweep::plan(&config), Err(ConfigErrors::NoModels(_))));
}

#[test]
pub fn preflight_catches_bad_configs() {
    let dir = tempdir().unwrap();
    let exe = dir.path().join("desbench");
    fs::write(&exe, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();

    let mut config = SweepConfig::new(&exe, dir.path().join("out"));
    config.capacity = Some(4);
    assert!(!config.preflight_checks());

    config.runs = 0;
    assert!(config.preflight_checks());
    config.runs = 1;

    config.threads.stop = Some(8);
    assert!(config.preflight_checks());
    config.threads.stop = None;

    fs::set_permissions(&exe, fs::Permissions::from_mode(0o644)).unwrap();
    assert!(config.preflight_checks());

    config.executable = dir.path().join("missing");
    assert!(config.preflight_checks());
}

#[test]
pub fn config_file_is_loaded() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sweep.yaml");
    fs::write(&path, "executable: /opt/desbench\noutput_dir: /tmp/out\nruns: 4\n").unwrap();

    assert_eq!(SweepConfig::from_file(&path).unwrap().runs, 4);
    assert!(matches!(
        SweepConfig::from_file(&dir.path().join("missing.yaml")),
        Err(ConfigErrors::FileNotFound(_))
    ));
}

#[test]
pub fn argument_templates_are_parsed() {
    let yaml = r#"
executable: /opt/desbench
output_dir: /tmp/out
capacity: 64
models: "*x*"
layouts:
  components: 128
arguments:
  - "{output_dir}/settings.json"
  - "/simulator/core/executers=uint={threads}"
  - "/benchmark/topology=string={topo}"
  - "{args}"
variables:
  topo: torus
extra_models:
  ring:
    kind: custom
    args: ["/benchmark/topology=string=ring"]
"#;
    let config: SweepConfig = serde_yaml::from_str(yaml).unwrap();

    assert_eq!(
        config.layouts,
        Some(LayoutModels {
            components: 128,
            initial_events: 1,
        })
    );
    assert_eq!(config.arguments.0.len(), 4);
    assert_eq!(config.variables["topo"], "torus");
    assert_eq!(
        config.extra_models["ring"],
        Workload::Custom {
            args: vec!["/benchmark/topology=string=ring".to_string()],
        }
    );

    let models = config.selected_models().unwrap();
    assert!(models.contains_key("128x1"));
    assert!(models.contains_key("64x2"));
    assert!(!models.contains_key("32x4"));
}

#[test]
pub fn preflight_catches_unknown_placeholders() {
    let dir = tempdir().unwrap();
    let exe = dir.path().join("desbench");
    fs::write(&exe, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();

    let mut config = SweepConfig::new(&exe, dir.path().join("out"));
    config.capacity = Some(4);
    config.arguments = CommandTemplate::new(["-t", "{threads}", "-x", "{topo}"]);
    assert!(config.preflight_checks());

    config.variables.insert("topo".to_string(), "mesh".to_string());
    assert!(!config.preflight_checks());

    config.arguments = CommandTemplate::new(["{threads"]);
    assert!(config.preflight_checks());
}
