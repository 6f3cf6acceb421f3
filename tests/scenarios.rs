use arena_launch::params::ParamValue;
use arena_launch::{
    Catalog, Composer, DEFAULT_INSTANCE_ARG, FragmentId, LaunchError, Plan, instance_ids,
};
use pretty_assertions::assert_eq;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

fn catalog(files: &[(&str, &str)]) -> Catalog {
    let mut c = Catalog::new();
    for (path, text) in files {
        if path.contains(".launch.") {
            c.insert_fragment_str(path, text).unwrap();
        } else {
            c.insert_params_str(path, text).unwrap();
        }
    }
    c
}

fn args(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn resolve(c: &Catalog, root: &str, a: &[(&str, &str)]) -> arena_launch::Result<Plan> {
    Composer::new(c).resolve(&FragmentId::new(root), &args(a))
}

fn bundled() -> Catalog {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("launch");
    Catalog::load_dir(dir).unwrap()
}

#[test]
fn missing_root_argument_yields_no_plan() {
    let c = catalog(&[(
        "root.launch.yaml",
        r#"
args: [{ name: ns }]
namespace: $(arg ns)
actions: [{ node: { package: p, executable: e } }]
"#,
    )]);
    let err = resolve(&c, "root.launch.yaml", &[]).unwrap_err();
    assert!(matches!(
        err,
        LaunchError::MissingRequiredArgument { ref name, .. } if name == "ns"
    ));
}

#[test]
fn one_fragment_included_twice_gives_disjoint_groups() {
    let c = catalog(&[
        (
            "root.launch.yaml",
            r#"
actions:
  - include: { fragment: env.launch.yaml, args: { ns: envA } }
  - include: { fragment: env.launch.yaml, args: { ns: envB } }
"#,
        ),
        (
            "env.launch.yaml",
            r#"
args: [{ name: ns }]
namespace: $(arg ns)
actions:
  - node: { package: sim, executable: world }
  - node: { package: sim, executable: robot }
"#,
        ),
    ]);
    let plan = resolve(&c, "root.launch.yaml", &[]).unwrap();
    let got: Vec<String> = plan
        .processes
        .iter()
        .map(|p| format!("{} {}", p.namespace, p.executable))
        .collect();
    assert_eq!(
        got,
        vec![
            "/envA sim/world".to_string(),
            "/envA sim/robot".to_string(),
            "/envB sim/world".to_string(),
            "/envB sim/robot".to_string(),
        ]
    );
}

#[test]
fn robot_overlay_overrides_common_layer() {
    let c = catalog(&[
        ("common.yaml", "max_speed: 2.0\nframe: odom\n"),
        ("burger.yaml", "max_speed: 1.5\n"),
        (
            "root.launch.yaml",
            r#"
actions:
  - set_param: { file: common.yaml }
  - set_param: { file: burger.yaml }
  - node: { package: nav, executable: planner }
"#,
        ),
    ]);
    let plan = resolve(&c, "root.launch.yaml", &[]).unwrap();
    let params = &plan.processes[0].parameters;
    assert_eq!(params["max_speed"], ParamValue::Float(1.5));
    assert_eq!(params["frame"], ParamValue::Text("odom".into()));
}

#[test]
fn layer_order_decides_the_winner() {
    let c = catalog(&[
        ("common.yaml", "max_speed: 2.0\n"),
        ("burger.yaml", "max_speed: 1.5\n"),
        (
            "root.launch.yaml",
            r#"
actions:
  - set_param: { file: burger.yaml }
  - set_param: { file: common.yaml }
  - node: { package: nav, executable: planner }
"#,
        ),
    ]);
    let plan = resolve(&c, "root.launch.yaml", &[]).unwrap();
    assert_eq!(plan.processes[0].parameters["max_speed"], ParamValue::Float(2.0));
}

#[test]
fn condition_on_undeclared_argument_is_unbound() {
    let c = catalog(&[
        (
            "root.launch.yaml",
            "actions: [{ include: { fragment: gui.launch.yaml, if: use_gui } }]",
        ),
        ("gui.launch.yaml", "actions: [{ node: { package: rviz, executable: rviz } }]"),
    ]);
    let err = resolve(&c, "root.launch.yaml", &[]).unwrap_err();
    assert!(matches!(err, LaunchError::UnboundArgument { ref name, .. } if name == "use_gui"));
}

#[test]
fn transitive_self_include_is_rejected() {
    let c = catalog(&[
        ("a.launch.yaml", "actions: [{ include: { fragment: b.launch.yaml } }]"),
        (
            "b.launch.yaml",
            r#"
args: [{ name: next, default: a.launch.yaml }]
actions: [{ include: { fragment: "$(arg next)", args: {} } }]
"#,
        ),
    ]);
    match resolve(&c, "a.launch.yaml", &[]).unwrap_err() {
        LaunchError::CyclicInclude { chain } => {
            let chain: Vec<&str> = chain.iter().map(FragmentId::as_str).collect();
            assert_eq!(chain, vec!["a.launch.yaml", "b.launch.yaml", "a.launch.yaml"]);
        }
        other => panic!("expected a cycle, got {other}"),
    }
}

#[test]
fn unknown_root_argument() {
    let c = catalog(&[("root.launch.yaml", "args: [{ name: robot, default: burger }]")]);
    let err = resolve(&c, "root.launch.yaml", &[("robto", "jackal")]).unwrap_err();
    assert!(matches!(err, LaunchError::UnknownArgument { .. }));
}

#[test]
fn type_mismatch_in_condition() {
    let c = catalog(&[(
        "root.launch.yaml",
        r#"
args: [{ name: speed, default: fast }]
actions:
  - node: { package: p, executable: e, if: speed > 1 }
"#,
    )]);
    let err = resolve(&c, "root.launch.yaml", &[]).unwrap_err();
    assert!(matches!(err, LaunchError::TypeMismatch(_)));
}

#[test]
fn resolution_is_deterministic() {
    let c = bundled();
    let root = FragmentId::new("train.launch.yaml");
    let first = Composer::new(&c).resolve(&root, &BTreeMap::new()).unwrap();
    for _ in 0..5 {
        let again = Composer::new(&c).resolve(&root, &BTreeMap::new()).unwrap();
        assert_eq!(again, first);
        assert_eq!(
            serde_json::to_string(&again).unwrap(),
            serde_json::to_string(&first).unwrap()
        );
    }
}

#[test]
fn bundled_training_environment() {
    let c = bundled();
    let (cycles, missing) = c.include_cycles();
    assert!(cycles.is_empty());
    assert!(missing.is_empty());

    let plan = resolve(&c, "train.launch.yaml", &[]).unwrap();
    let got: Vec<String> = plan
        .processes
        .iter()
        .map(|p| format!("{} {}", p.namespace, p.executable))
        .collect();
    assert_eq!(
        got,
        vec![
            "/ flatland/server (world)".to_string(),
            "/peds pedsim/simulator".to_string(),
            "/nav move_base/move_base".to_string(),
            "/nav rl_agent/action_publisher".to_string(),
        ]
    );

    let world = &plan.processes[0];
    assert_eq!(world.parameters["max_speed"], ParamValue::Float(1.5));
    assert_eq!(world.parameters["use_sim_time"], ParamValue::Bool(true));
    assert_eq!(world.parameters["world_name"], ParamValue::Text("sim_1_world".into()));
    assert!(!world.parameters.contains_key("pedestrians.count"));
    assert!(!world.parameters.contains_key("map_file"));
    assert_eq!(world.remaps["scan"], "/sim_1/sim/scan");

    let peds = &plan.processes[1];
    assert_eq!(peds.parameters["pedestrians.count"], ParamValue::Int(4));
    assert_eq!(peds.parameters["pedestrians.speed"], ParamValue::Float(1.0));

    let planner = &plan.processes[2];
    assert_eq!(
        planner.parameters["local_costmap.global_frame"],
        ParamValue::Text("burger/odom".into())
    );
    assert_eq!(planner.remaps["cmd_vel"], "/sim_1/cmd_vel");

    let agent = &plan.processes[3];
    assert_eq!(agent.arguments, vec!["--robot".to_string(), "burger".to_string()]);
    assert_eq!(
        agent.remaps,
        BTreeMap::from([
            ("cmd_vel".to_string(), "/sim_1/cmd_vel".to_string()),
            ("scan".to_string(), "/sim_1/sim/scan".to_string()),
        ])
    );
}

#[test]
fn bundled_overrides_and_toggles() {
    let c = bundled();
    let plan = resolve(
        &c,
        "train.launch.yaml",
        &[
            ("robot", "jackal"),
            ("num_peds", "0"),
            ("gui", "true"),
            ("random_map", "false"),
            ("map", "office"),
        ],
    )
    .unwrap();
    let executables: Vec<String> = plan
        .processes
        .iter()
        .map(|p| p.executable.to_string())
        .collect();
    assert_eq!(
        executables,
        vec![
            "flatland/server (world)".to_string(),
            "move_base/move_base".to_string(),
            "rl_agent/action_publisher".to_string(),
            "rviz/rviz".to_string(),
        ]
    );
    let world = &plan.processes[0];
    assert_eq!(world.parameters["max_speed"], ParamValue::Float(2.5));
    assert_eq!(world.parameters["map_file"], ParamValue::Text("maps/office.yaml".into()));

    // Without a map and without random maps, `map` is required.
    let err = resolve(&c, "train.launch.yaml", &[("random_map", "false")]).unwrap_err();
    assert!(matches!(
        err,
        LaunchError::MissingRequiredArgument { ref name, .. } if name == "map"
    ));
}

#[test]
fn bundled_fleet_shares_no_namespace_or_channel() {
    let c = bundled();
    let ids = instance_ids("env", 4);
    let plans = Composer::new(&c)
        .resolve_fleet(
            &FragmentId::new("train.launch.yaml"),
            &BTreeMap::new(),
            &ids,
            DEFAULT_INSTANCE_ARG,
        )
        .unwrap();
    assert_eq!(plans.len(), 4);

    let mut namespaces = BTreeMap::new();
    let mut channels: BTreeMap<String, String> = BTreeMap::new();
    for plan in &plans {
        let instance = plan.instance.clone().unwrap();
        let prefix = format!("/{}", instance);
        for ns in plan.namespaces() {
            assert!(ns == prefix || ns.starts_with(&format!("{}/", prefix)));
            assert!(namespaces.insert(ns.to_string(), instance.clone()).is_none());
        }

        let targets: BTreeSet<&str> = plan
            .processes
            .iter()
            .flat_map(|p| p.remaps.values())
            .map(String::as_str)
            .collect();
        assert!(!targets.is_empty());
        for target in targets {
            assert!(target.starts_with(&format!("{}/", prefix)), "{target} escapes {prefix}");
            if let Some(other) = channels.insert(target.to_string(), instance.clone()) {
                panic!("{target} is shared by {other} and {instance}");
            }
        }
    }
    assert_eq!(plans[2].processes[2].remaps["cmd_vel"], "/env_3/cmd_vel");
    assert_eq!(plans[2].processes[3].remaps["scan"], "/env_3/sim/scan");
}

#[test]
fn unknown_parameter_file_aborts() {
    let c = bundled();
    let err = resolve(&c, "train.launch.yaml", &[("robot", "turtle")]).unwrap_err();
    assert!(matches!(
        err,
        LaunchError::UnknownParamFile(ref p) if p == "params/robots/turtle.yaml"
    ));
}
