//! Dependency analysis: turns a call-graph edge list into ordered schedule
//! units.
//!
//! Stages, in pipeline order:
//! - `parse`: edge list -> [`CallGraph`] with burst times and major flags
//! - `cycles`: cyclic clusters as [`CycleGroup`]s
//! - `topo`: reduced acyclic graph and its Kahn order
//! - `units`: groups + ordered singles flattened into a capped [`UnitPlan`]

pub mod analysis;
pub mod cycles;
pub mod model;
pub mod parse;
pub mod topo;
pub mod units;

pub use analysis::Analysis;
pub use cycles::{detect_cycles, CycleGroup};
pub use model::{CallGraph, GraphStats, WorkItem};
pub use parse::{parse_edge_list, BurstSampler, ParseSummary, ParsedGraph};
pub use topo::{topological_order, ReducedGraph, TopoOrder};
pub use units::{assign_units, ScheduleUnit, UnitKind, UnitPlan};
