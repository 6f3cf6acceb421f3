use crate::plan::{Plan, ProcessSpec};
use std::fmt::Write;

fn write_process(out: &mut String, index: usize, p: &ProcessSpec) {
    // Writing into a String cannot fail.
    let _ = writeln!(out, "[{}] {}  {}", index, p.namespace, p.executable);
    let _ = writeln!(out, "    from: {}", p.fragment);
    if !p.arguments.is_empty() {
        let _ = writeln!(out, "    args: {}", p.arguments.join(" "));
    }
    if !p.parameters.is_empty() {
        out.push_str("    params:\n");
        for (key, value) in &p.parameters {
            let _ = writeln!(out, "      {} = {}", key, value);
        }
    }
    if !p.remaps.is_empty() {
        out.push_str("    remaps:\n");
        for (from, to) in &p.remaps {
            let _ = writeln!(out, "      {} -> {}", from, to);
        }
    }
}

/// Human-readable listing of a plan, processes in launch order.
pub fn render_plan_text(plan: &Plan) -> String {
    let mut out = String::new();
    let _ = write!(out, "plan {} at {}", plan.root, plan.namespace);
    if let Some(instance) = &plan.instance {
        let _ = write!(out, " [instance {}]", instance);
    }
    let _ = writeln!(out, ": {} process(es)", plan.processes.len());
    for (i, p) in plan.processes.iter().enumerate() {
        out.push('\n');
        write_process(&mut out, i + 1, p);
    }
    out
}

pub fn render_fleet_text(plans: &[Plan]) -> String {
    plans
        .iter()
        .map(render_plan_text)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::FragmentId;
    use crate::params::ParamValue;
    use crate::plan::ExecutableId;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    #[test]
    fn lists_processes_with_their_configuration() {
        let plan = Plan {
            root: FragmentId::new("train.launch.yaml"),
            instance: Some("env_1".to_string()),
            namespace: "/env_1".to_string(),
            processes: vec![ProcessSpec {
                namespace: "/env_1/nav".to_string(),
                executable: ExecutableId {
                    package: "nav".to_string(),
                    executable: "planner".to_string(),
                    name: Some("local".to_string()),
                },
                parameters: BTreeMap::from([
                    ("max_speed".to_string(), ParamValue::Float(1.5)),
                    ("frame".to_string(), ParamValue::Text("odom".to_string())),
                ]),
                remaps: BTreeMap::from([("scan".to_string(), "/env_1/scan".to_string())]),
                arguments: vec![],
                fragment: FragmentId::new("nav.launch.yaml"),
            }],
        };
        let expected = "\
plan train.launch.yaml at /env_1 [instance env_1]: 1 process(es)

[1] /env_1/nav  nav/planner (local)
    from: nav.launch.yaml
    params:
      frame = \"odom\"
      max_speed = 1.5
    remaps:
      scan -> /env_1/scan
";
        assert_eq!(render_plan_text(&plan), expected);
    }
}
