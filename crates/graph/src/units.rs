use serde::Serialize;
use threadsim_core::AnalysisConfig;
use tracing::warn;

use crate::cycles::CycleGroup;
use crate::model::CallGraph;
use crate::topo::TopoOrder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnitKind {
    /// Flattened cycle group.
    Group,
    /// One non-cyclic work item.
    Single,
}

/// The atomic thing the multiprocessor scheduler executes.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleUnit {
    /// 1-based position in the plan.
    pub index: usize,
    pub kind: UnitKind,
    pub members: Vec<String>,
    /// Sum of the members' burst times, in ms.
    pub burst_time_ms: u64,
}

impl ScheduleUnit {
    /// `T<index>`.
    pub fn label(&self) -> String {
        format!("T{}", self.index)
    }
}

/// Ordered schedule units plus how many were cut by the unit cap.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UnitPlan {
    pub units: Vec<ScheduleUnit>,
    pub dropped_units: usize,
}

impl UnitPlan {
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn total_burst_ms(&self) -> u64 {
        self.units.iter().map(|u| u.burst_time_ms).sum()
    }
}

/// Flatten cycle groups and the topological order into numbered units.
///
/// Groups come first, in discovery order, then the ordered singles. With
/// `majors_only`, non-major singles are skipped entirely. Anything beyond
/// `max_units` is dropped and counted.
pub fn assign_units(
    graph: &CallGraph,
    groups: &[CycleGroup],
    topo: &TopoOrder,
    config: &AnalysisConfig,
) -> UnitPlan {
    let burst_of = |name: &str| graph.item(name).map_or(0, |i| i.burst_time_ms);

    let grouped = groups.iter().map(|g| (UnitKind::Group, g.members.clone()));
    let singles = topo
        .order
        .iter()
        .filter(|name| !config.majors_only || graph.item(name).is_some_and(|i| i.is_major))
        .map(|name| (UnitKind::Single, vec![name.clone()]));

    let mut plan = UnitPlan::default();
    for (kind, members) in grouped.chain(singles) {
        if plan.units.len() >= config.max_units {
            plan.dropped_units += 1;
            continue;
        }
        let burst_time_ms = members.iter().map(|m| burst_of(m)).sum();
        plan.units.push(ScheduleUnit {
            index: plan.units.len() + 1,
            kind,
            members,
            burst_time_ms,
        });
    }

    if plan.dropped_units > 0 {
        warn!(
            kept = plan.units.len(),
            dropped = plan.dropped_units,
            max_units = config.max_units,
            "unit cap reached, dropping excess units"
        );
    }

    plan
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::cycles::detect_cycles;
    use crate::parse::parse_edge_list;
    use crate::topo::topological_order;

    fn plan_for(input: &str, config: &AnalysisConfig) -> (CallGraph, UnitPlan) {
        let graph = parse_edge_list(input, config).graph;
        let groups = detect_cycles(&graph);
        let grouped: HashSet<String> = groups.iter().flat_map(|g| g.members.clone()).collect();
        let topo = topological_order(&graph, &grouped);
        let plan = assign_units(&graph, &groups, &topo, config);
        (graph, plan)
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            seed: Some(11),
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn groups_first_then_singles() {
        let (graph, plan) = plan_for("main a x\na\nx y\ny x\n", &config());
        let labels: Vec<String> = plan.units.iter().map(ScheduleUnit::label).collect();
        assert_eq!(labels, vec!["T1", "T2", "T3"]);
        assert_eq!(plan.units[0].kind, UnitKind::Group);
        assert_eq!(plan.units[0].members, vec!["x", "y"]);
        let expected = graph.item("x").unwrap().burst_time_ms + graph.item("y").unwrap().burst_time_ms;
        assert_eq!(plan.units[0].burst_time_ms, expected);
        assert_eq!(plan.units[1].members, vec!["a"]);
        assert_eq!(plan.units[2].members, vec!["main"]);
        assert_eq!(plan.dropped_units, 0);
    }

    #[test]
    fn cap_drops_and_counts_excess() {
        let cfg = AnalysisConfig {
            max_units: 2,
            ..config()
        };
        let (_, plan) = plan_for("a\nb\nc\nd\n", &cfg);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.dropped_units, 2);
        assert_eq!(plan.units[1].index, 2);
    }

    #[test]
    fn zero_cap_drops_everything() {
        let cfg = AnalysisConfig {
            max_units: 0,
            ..config()
        };
        let (_, plan) = plan_for("a b\nb a\nc\n", &cfg);
        assert!(plan.is_empty());
        assert_eq!(plan.dropped_units, 2);
    }

    #[test]
    fn majors_only_skips_minor_singles() {
        let cfg = AnalysisConfig {
            majors_only: true,
            ..config()
        };
        // main has three deps, log is called twice; util is neither.
        let (_, plan) = plan_for("main util log io\nutil log\nlog\nio\n", &cfg);
        let members: Vec<&str> = plan.units.iter().map(|u| u.members[0].as_str()).collect();
        assert_eq!(members, vec!["log", "main"]);
        assert_eq!(plan.dropped_units, 0);
    }

    #[test]
    fn every_item_lands_in_exactly_one_unit() {
        let (graph, plan) = plan_for("a b c\nb c d\nc b\nd e\ne\nf f\ng a\n", &config());
        let mut seen = HashSet::new();
        for unit in &plan.units {
            for m in &unit.members {
                assert!(seen.insert(m.clone()), "{m} scheduled twice");
            }
        }
        assert_eq!(seen.len(), graph.len());
    }
}
