//! Edge-list parsing.
//!
//! Input is one caller per line: `name dep1 dep2 ...`, whitespace-delimited.
//! The `caller -> callee` form emitted by the call-graph extractor is also
//! accepted, since `->` tokens are ignored.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use threadsim_core::AnalysisConfig;
use tracing::{debug, info};

use crate::model::CallGraph;

const ARROW: &str = "->";

/// Draws burst times from an inclusive range with one generator per run.
pub struct BurstSampler {
    rng: StdRng,
    min_ms: u64,
    max_ms: u64,
}

impl BurstSampler {
    pub fn new(min_ms: u64, max_ms: u64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            min_ms: min_ms.min(max_ms),
            max_ms: max_ms.max(min_ms),
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.burst_min_ms, config.burst_max_ms, config.seed)
    }

    pub fn sample(&mut self) -> u64 {
        self.rng.gen_range(self.min_ms..=self.max_ms)
    }
}

/// Result of parsing an edge list.
#[derive(Debug)]
pub struct ParsedGraph {
    pub graph: CallGraph,
    pub summary: ParseSummary,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ParseSummary {
    pub lines_read: usize,
    /// Lines that yielded no name (blank or arrow-only).
    pub skipped_lines: usize,
}

/// Parse an edge list into a classified [`CallGraph`].
pub fn parse_edge_list(input: &str, config: &AnalysisConfig) -> ParsedGraph {
    let mut sampler = BurstSampler::from_config(config);
    parse_with_sampler(input, &mut sampler)
}

/// Parse with an explicit sampler, e.g. one shared across several inputs.
pub fn parse_with_sampler(input: &str, sampler: &mut BurstSampler) -> ParsedGraph {
    let mut graph = CallGraph::new();
    let mut summary = ParseSummary::default();

    for (line_no, line) in input.lines().enumerate() {
        summary.lines_read += 1;
        let mut tokens = line.split_whitespace().filter(|t| *t != ARROW);

        let Some(name) = tokens.next() else {
            debug!(line = line_no + 1, "skipping line without a name");
            summary.skipped_lines += 1;
            continue;
        };

        graph.upsert_item(name, || sampler.sample());
        for dep in tokens {
            graph.add_dependency(name, dep);
        }
    }

    graph.classify_major();

    let stats = graph.stats();
    info!(
        items = stats.item_count,
        edges = stats.edge_count,
        majors = stats.major_count,
        skipped = summary.skipped_lines,
        "parsed edge list"
    );

    ParsedGraph { graph, summary }
}
