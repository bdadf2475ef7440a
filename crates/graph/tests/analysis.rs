use std::collections::HashMap;

use threadsim_core::AnalysisConfig;
use threadsim_graph::{Analysis, ReducedGraph, UnitKind};

fn config() -> AnalysisConfig {
    AnalysisConfig {
        seed: Some(2024),
        ..AnalysisConfig::default()
    }
}

#[test]
fn diamond_orders_leaves_first() {
    let a = Analysis::run("A B C\nB D\nC D\nD\n", &config());
    assert!(a.groups.is_empty());
    let labels: Vec<&str> = a.plan.units.iter().map(|u| u.members[0].as_str()).collect();
    assert_eq!(labels, vec!["D", "B", "C", "A"]);
    assert!(a.plan.units.iter().all(|u| u.kind == UnitKind::Single));
}

#[test]
fn mutual_pair_becomes_one_unit() {
    let a = Analysis::run("A B\nB A\n", &config());
    assert_eq!(a.groups.len(), 1);
    assert_eq!(a.plan.len(), 1);
    let unit = &a.plan.units[0];
    assert_eq!(unit.kind, UnitKind::Group);
    assert_eq!(unit.members, vec!["A", "B"]);
    let expected: u64 = ["A", "B"]
        .iter()
        .map(|n| a.graph.item(n).unwrap().burst_time_ms)
        .sum();
    assert_eq!(unit.burst_time_ms, expected);
}

#[test]
fn mixed_graph_partition_and_order() {
    let input = "\
main -> cli core
cli args core
args
core store net
store cache
cache store
net net
util
";
    let a = Analysis::run(input, &config());

    // every item exactly once
    let mut count: HashMap<&str, usize> = HashMap::new();
    for unit in &a.plan.units {
        for m in &unit.members {
            *count.entry(m.as_str()).or_default() += 1;
        }
    }
    assert_eq!(count.len(), a.graph.len());
    assert!(count.values().all(|&c| c == 1));

    // reduced edges respected by the single-unit order
    let grouped: std::collections::HashSet<String> = a.grouped_names().into_iter().map(String::from).collect();
    let reduced = ReducedGraph::build(&a.graph, &grouped);
    let pos: HashMap<&str, usize> = a
        .topo
        .order
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();
    for (user, dep) in reduced.edges() {
        assert!(pos[dep] < pos[user]);
    }

    assert_eq!(a.summary.lines_read, 8);
    assert!(a.graph.item("core").unwrap().is_major);
}

#[test]
fn same_seed_same_plan() {
    let input = "a b c\nb c\nc a\nd\n";
    let first = Analysis::run(input, &config());
    let second = Analysis::run(input, &config());
    let bursts = |a: &Analysis| a.plan.units.iter().map(|u| u.burst_time_ms).collect::<Vec<_>>();
    assert_eq!(bursts(&first), bursts(&second));
}
