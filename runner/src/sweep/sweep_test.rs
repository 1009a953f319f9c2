use crate::{
    config::{ConfigErrors, SweepConfig},
    scheduler::resource::CPUS,
    sweep::{
        template::{CommandTemplate, TemplateError},
        LayoutModels, Sweep, SweepConfiguration, Workload, WorkloadError, BUILTIN_MODELS,
    },
};
use std::{ffi::OsString, path::Path};

fn config() -> SweepConfig {
    let mut config = SweepConfig::new("/opt/desbench", "/tmp/sweep");
    config.capacity = Some(8);
    config.models = "sha*".to_string();
    config.runs = 2;
    config
}

fn strings(args: &[OsString]) -> Vec<String> {
    args.iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

#[test]
pub fn builtin_models_are_valid() {
    assert_eq!(BUILTIN_MODELS.len(), 29);
    for (name, workload) in BUILTIN_MODELS.iter() {
        assert!(workload.validate().is_ok(), "{name} is invalid");
    }
    assert_eq!(BUILTIN_MODELS["mem10g"], Workload::Mem { bytes: 10_000_000_000 });
}

#[test]
pub fn workloads_are_validated() {
    assert_eq!(
        Workload::Sha { bits: 128 }.validate(),
        Err(WorkloadError::ShaBits(128))
    );
    assert_eq!(Workload::Mem { bytes: 0 }.validate(), Err(WorkloadError::EmptyMemory));
    assert_eq!(Workload::Bounce { hops: 0 }.validate(), Err(WorkloadError::NoHops));
    assert_eq!(
        Workload::PHold { remote: 101 }.validate(),
        Err(WorkloadError::RemotePercentage(101))
    );
}

#[test]
pub fn configuration_names_are_stable() {
    let configuration = SweepConfiguration {
        model: "phold40".to_string(),
        threads: 12,
        repetition: 3,
    };

    assert_eq!(configuration.name(), "phold40_12_3");
    assert_eq!(
        configuration.log_path(Path::new("/out")),
        Path::new("/out/phold40_12_3.log")
    );
}

#[test]
pub fn plan_enumerates_the_grid() {
    let sweep = Sweep::plan(&config()).unwrap();

    assert_eq!(sweep.thread_counts, [4, 8]);
    assert_eq!(
        sweep.models.keys().collect::<Vec<_>>(),
        ["sha1", "sha256", "sha512"]
    );
    assert_eq!(sweep.len(), 12);

    let names = sweep
        .configurations()
        .map(|configuration| configuration.name())
        .collect::<Vec<_>>();
    assert_eq!(names.len(), 12);
    assert_eq!(&names[..4], ["sha1_4_0", "sha1_4_1", "sha1_8_0", "sha1_8_1"]);
    assert_eq!(sweep.cells().len(), 12);
}

#[test]
pub fn command_carries_the_workload() {
    let sweep = Sweep::plan(&config()).unwrap();
    let configuration = SweepConfiguration {
        model: "sha256".to_string(),
        threads: 8,
        repetition: 0,
    };

    let (program, args) = sweep.command(&configuration).unwrap();
    assert_eq!(program, OsString::from("/opt/desbench"));
    assert_eq!(
        strings(&args),
        ["-e", "10", "-c", "10000", "-t", "8", "-n", "sha", "-g", "256"]
    );
}

#[test]
pub fn numactl_wraps_the_benchmark() {
    let mut config = config();
    config.numactl = Some("--interleave=all --physcpubind=0-7".to_string());
    let sweep = Sweep::plan(&config).unwrap();

    let (program, args) = sweep
        .command(&SweepConfiguration {
            model: "sha1".to_string(),
            threads: 4,
            repetition: 1,
        })
        .unwrap();
    assert_eq!(program, OsString::from("numactl"));
    assert_eq!(
        &strings(&args)[..3],
        ["--interleave=all", "--physcpubind=0-7", "/opt/desbench"]
    );
}

#[test]
pub fn tasks_reserve_their_threads() {
    let sweep = Sweep::plan(&config()).unwrap();
    let tasks = sweep.tasks().unwrap();

    assert_eq!(tasks.len(), 12);
    let task = tasks
        .iter()
        .find(|task| task.name() == "sha512_8_1")
        .unwrap();
    assert_eq!(task.requirement().get(CPUS), 8);
    assert_eq!(task.stdout(), Some(Path::new("/tmp/sweep/sha512_8_1.log")));
}

#[test]
pub fn extra_models_join_the_table() {
    let mut config = config();
    config.models = "custom*".to_string();
    config.extra_models.insert("custom".to_string(), Workload::Mix { ratio: 7 });

    let sweep = Sweep::plan(&config).unwrap();
    assert_eq!(sweep.models.len(), 1);
    assert_eq!(sweep.models["custom"], Workload::Mix { ratio: 7 });
}

#[test]
pub fn fixed_step_template_reproduces_the_barrier_sweep() {
    let mut config = config();
    config.models = "empty".to_string();
    config.exetime = 1;
    config.arguments = CommandTemplate::new([
        "-e", "{exetime}", "-m", "1", "-t", "{threads}", "-n", "{kind}", "-g", "{param}",
    ]);
    let sweep = Sweep::plan(&config).unwrap();

    let (_, args) = sweep
        .command(&SweepConfiguration {
            model: "empty".to_string(),
            threads: 8,
            repetition: 0,
        })
        .unwrap();
    assert_eq!(
        strings(&args),
        ["-e", "1", "-m", "1", "-t", "8", "-n", "empty", "-g", "0"]
    );
}

#[test]
pub fn settings_template_splices_layout_overrides() {
    let mut config = config();
    config.capacity = Some(256);
    config.threads.start = Some(64);
    config.threads.stop = Some(128);
    config.threads.step = 64;
    config.models = "[0-9]*x*".to_string();
    config.layouts = Some(LayoutModels::default());
    config.variables.insert("topo".to_string(), "torus".to_string());
    config.arguments = CommandTemplate::new([
        "{output_dir}/settings.json",
        "/simulator/execution_time=float={exetime}",
        "/simulator/core/executers=uint={threads}",
        "/benchmark/topology=string={topo}",
        "{args}",
    ]);
    let sweep = Sweep::plan(&config).unwrap();

    assert_eq!(
        sweep.models.keys().collect::<Vec<_>>(),
        ["1024x1", "256x4", "512x2"]
    );

    let (program, args) = sweep
        .command(&SweepConfiguration {
            model: "512x2".to_string(),
            threads: 128,
            repetition: 0,
        })
        .unwrap();
    assert_eq!(program, OsString::from("/opt/desbench"));
    assert_eq!(
        strings(&args),
        [
            "/tmp/sweep/settings.json",
            "/simulator/execution_time=float=10",
            "/simulator/core/executers=uint=128",
            "/benchmark/topology=string=torus",
            "/benchmark/num_components=int=512",
            "/benchmark/component/initial_events=int=2",
        ]
    );
}

#[test]
pub fn layouts_stop_once_components_fit() {
    let layouts = LayoutModels {
        components: 16,
        initial_events: 3,
    };

    assert_eq!(
        layouts.models(4).keys().collect::<Vec<_>>(),
        ["16x3", "4x12", "8x6"]
    );
    assert_eq!(layouts.models(64).len(), 1);
}

#[test]
pub fn unknown_placeholders_fail_planning() {
    let mut config = config();
    config.arguments = CommandTemplate::new(["-t", "{threads}", "--topo={topo}"]);

    assert!(matches!(
        Sweep::plan(&config),
        Err(ConfigErrors::Template(TemplateError::UnknownPlaceholder(name))) if name == "topo"
    ));

    config.variables.insert("topo".to_string(), "mesh".to_string());
    assert!(Sweep::plan(&config).is_ok());
}

#[test]
pub fn templates_report_their_placeholders() {
    let template = CommandTemplate::new(["a={x}-{y}", "{args}", "plain"]);
    assert_eq!(
        template.placeholders().unwrap().into_iter().collect::<Vec<_>>(),
        ["x", "y"]
    );

    let unclosed = CommandTemplate::new(["{threads"]);
    assert_eq!(
        unclosed.placeholders(),
        Err(TemplateError::Unclosed("{threads".to_string()))
    );
}

#[test]
pub fn custom_models_render_their_arguments() {
    let workload = Workload::Custom {
        args: vec!["/a=int=1".to_string(), "/b=int=2".to_string()],
    };

    assert_eq!(workload.kind(), "custom");
    assert_eq!(workload.args().len(), 2);
    assert_eq!(workload.to_string(), "custom /a=int=1 /b=int=2");
    assert!(Workload::Empty.args().is_empty());
}
