use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use threadsim_core::{AnalysisConfig, ClockKind, SchedulerConfig, SchedulingPolicy, ThreadsimConfig};

/// Call-graph thread grouping and multiprocessor scheduling simulator.
#[derive(Parser, Debug)]
#[command(name = "threadsim", version, about)]
pub struct CliArgs {
    /// Path to threadsim.toml (missing file = defaults).
    #[arg(long, global = true, env = "THREADSIM_CONFIG", default_value = "threadsim.toml")]
    pub config: PathBuf,

    /// Directory reports are written to.
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Print results as JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Group and order an edge list; write threads.txt and thread_grouped.txt
    Plan {
        /// Edge list, one `caller callee...` per line
        edges: PathBuf,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },

    /// Run a thread_grouped.txt file through the scheduler
    Simulate {
        /// Unit file written by `plan`
        grouped: PathBuf,

        #[command(flatten)]
        scheduler: SchedulerArgs,

        /// Label for the metrics.csv row
        #[arg(long, default_value = "Multiprocessor")]
        run_type: String,
    },

    /// Plan, then simulate on one processor and on all of them
    Run {
        /// Edge list, one `caller callee...` per line
        edges: PathBuf,

        #[command(flatten)]
        analysis: AnalysisArgs,

        #[command(flatten)]
        scheduler: SchedulerArgs,
    },

    /// Run copies of the diamond DAG on a processor pool
    Dag {
        /// Number of DAG jobs
        #[arg(long)]
        jobs: Option<usize>,

        /// Processor threads pulling jobs
        #[arg(long)]
        processors: Option<usize>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct AnalysisArgs {
    /// Maximum number of schedule units
    #[arg(long)]
    pub max_units: Option<usize>,

    /// Lower bound of the burst-time range (ms)
    #[arg(long)]
    pub burst_min_ms: Option<u64>,

    /// Upper bound of the burst-time range (ms)
    #[arg(long)]
    pub burst_max_ms: Option<u64>,

    /// Seed for burst times (entropy when unset)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Only promote major items to single units
    #[arg(long)]
    pub majors_only: bool,
}

impl AnalysisArgs {
    pub fn apply(&self, config: &mut AnalysisConfig) {
        if let Some(v) = self.max_units {
            config.max_units = v;
        }
        if let Some(v) = self.burst_min_ms {
            config.burst_min_ms = v;
        }
        if let Some(v) = self.burst_max_ms {
            config.burst_max_ms = v;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.majors_only {
            config.majors_only = true;
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct SchedulerArgs {
    /// Number of simulated processors (0 = available parallelism)
    #[arg(long)]
    pub processors: Option<usize>,

    /// Time slice length (ms)
    #[arg(long)]
    pub quantum_ms: Option<u64>,

    /// run_to_completion (fifo) or round_robin (rr)
    #[arg(long)]
    pub policy: Option<SchedulingPolicy>,

    /// wall or virtual
    #[arg(long)]
    pub clock: Option<ClockKind>,
}

impl SchedulerArgs {
    pub fn apply(&self, config: &mut SchedulerConfig) {
        if let Some(v) = self.processors {
            config.processors = v;
        }
        if let Some(v) = self.quantum_ms {
            config.quantum_ms = v;
        }
        if let Some(v) = self.policy {
            config.policy = v;
        }
        if let Some(v) = self.clock {
            config.clock = v;
        }
    }
}

impl CliArgs {
    /// Layer command-line flags over the loaded config.
    pub fn apply(&self, config: &mut ThreadsimConfig) {
        if let Some(dir) = &self.output_dir {
            config.output.dir = dir.clone();
        }
        match &self.command {
            Command::Plan { analysis, .. } => analysis.apply(&mut config.analysis),
            Command::Simulate { scheduler, .. } => scheduler.apply(&mut config.scheduler),
            Command::Run {
                analysis, scheduler, ..
            } => {
                analysis.apply(&mut config.analysis);
                scheduler.apply(&mut config.scheduler);
            }
            Command::Dag { jobs, processors } => {
                if let Some(v) = jobs {
                    config.dag.jobs = *v;
                }
                if let Some(v) = processors {
                    config.dag.processors = *v;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_flags_override_config() {
        let args = CliArgs::parse_from([
            "threadsim",
            "run",
            "edges.txt",
            "--seed",
            "9",
            "--max-units",
            "5",
            "--processors",
            "2",
            "--policy",
            "rr",
            "--clock",
            "virtual",
            "--output-dir",
            "out",
        ]);
        let mut config = ThreadsimConfig::default();
        args.apply(&mut config);

        assert_eq!(config.analysis.seed, Some(9));
        assert_eq!(config.analysis.max_units, 5);
        assert_eq!(config.scheduler.processors, 2);
        assert_eq!(config.scheduler.policy, SchedulingPolicy::RoundRobin);
        assert_eq!(config.scheduler.clock, ClockKind::Virtual);
        assert_eq!(config.output.dir, PathBuf::from("out"));
    }

    #[test]
    fn absent_flags_keep_config() {
        let args = CliArgs::parse_from(["threadsim", "simulate", "thread_grouped.txt"]);
        let mut config = ThreadsimConfig::default();
        config.scheduler.quantum_ms = 42;
        args.apply(&mut config);
        assert_eq!(config.scheduler.quantum_ms, 42);
        match args.command {
            Command::Simulate { run_type, .. } => assert_eq!(run_type, "Multiprocessor"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn bad_policy_is_a_parse_error() {
        let res = CliArgs::try_parse_from(["threadsim", "simulate", "g.txt", "--policy", "lottery"]);
        assert!(res.is_err());
    }
}
