use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Parse an override value, keeping the current one (with a warning) when it
/// does not parse.
fn parse_override<T: FromStr>(key: &str, raw: &str, current: T) -> T {
    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(key, value = raw, "ignoring unparsable config override");
            current
        }
    }
}

// ── Top-level config ──────────────────────────────────────────

/// Full configuration for a simulation run.
///
/// Parsed from `threadsim.toml`; every field has a default, so an empty (or
/// missing) file is a valid config. Environment variables prefixed with
/// `THREADSIM_` override file values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadsimConfig {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub dag: DagConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl ThreadsimConfig {
    /// Parse config from a TOML string and apply environment overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from `path`. A missing file yields the defaults (still
    /// subject to environment overrides).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            debug!(path = %path.display(), "loading config");
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            debug!(path = %path.display(), "config file not found, using defaults");
            Self::from_toml("")
        }
    }

    /// Apply `THREADSIM_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(env_opt);
    }

    /// Apply overrides from an arbitrary key lookup. Split out from
    /// [`apply_env_overrides`](Self::apply_env_overrides) so tests never touch
    /// the process environment.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let a = &mut self.analysis;
        if let Some(v) = lookup("THREADSIM_MAX_UNITS") {
            a.max_units = parse_override("THREADSIM_MAX_UNITS", &v, a.max_units);
        }
        if let Some(v) = lookup("THREADSIM_BURST_MIN_MS") {
            a.burst_min_ms = parse_override("THREADSIM_BURST_MIN_MS", &v, a.burst_min_ms);
        }
        if let Some(v) = lookup("THREADSIM_BURST_MAX_MS") {
            a.burst_max_ms = parse_override("THREADSIM_BURST_MAX_MS", &v, a.burst_max_ms);
        }
        if let Some(v) = lookup("THREADSIM_SEED") {
            a.seed = Some(parse_override("THREADSIM_SEED", &v, a.seed.unwrap_or_default()));
        }
        if let Some(v) = lookup("THREADSIM_MAJORS_ONLY") {
            a.majors_only = parse_override("THREADSIM_MAJORS_ONLY", &v, a.majors_only);
        }

        let s = &mut self.scheduler;
        if let Some(v) = lookup("THREADSIM_PROCESSORS") {
            s.processors = parse_override("THREADSIM_PROCESSORS", &v, s.processors);
        }
        if let Some(v) = lookup("THREADSIM_QUANTUM_MS") {
            s.quantum_ms = parse_override("THREADSIM_QUANTUM_MS", &v, s.quantum_ms);
        }
        if let Some(v) = lookup("THREADSIM_POLICY") {
            s.policy = parse_override("THREADSIM_POLICY", &v, s.policy);
        }
        if let Some(v) = lookup("THREADSIM_CLOCK") {
            s.clock = parse_override("THREADSIM_CLOCK", &v, s.clock);
        }

        if let Some(v) = lookup("THREADSIM_DAG_JOBS") {
            self.dag.jobs = parse_override("THREADSIM_DAG_JOBS", &v, self.dag.jobs);
        }
        if let Some(v) = lookup("THREADSIM_DAG_PROCESSORS") {
            self.dag.processors = parse_override("THREADSIM_DAG_PROCESSORS", &v, self.dag.processors);
        }
        if let Some(v) = lookup("THREADSIM_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(v);
        }
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.analysis;
        if a.burst_min_ms > a.burst_max_ms {
            return Err(ConfigError::Invalid(format!(
                "burst range is empty: min {} > max {}",
                a.burst_min_ms, a.burst_max_ms
            )));
        }
        if self.scheduler.quantum_ms == 0 {
            return Err(ConfigError::Invalid("quantum_ms must be at least 1".into()));
        }
        if self.dag.processors == 0 {
            return Err(ConfigError::Invalid("dag.processors must be at least 1".into()));
        }
        Ok(())
    }

    /// Print the effective config for startup logs.
    pub fn log_summary(&self) {
        let a = &self.analysis;
        let s = &self.scheduler;
        tracing::info!("Config loaded:");
        tracing::info!(
            "  analysis:   max_units={}, burst={}..={}ms, seed={}, majors_only={}",
            a.max_units,
            a.burst_min_ms,
            a.burst_max_ms,
            a.seed.map_or_else(|| "(entropy)".to_string(), |s| s.to_string()),
            a.majors_only
        );
        tracing::info!(
            "  scheduler:  processors={}, quantum={}ms, policy={}, clock={}",
            s.resolved_processors(),
            s.quantum_ms,
            s.policy,
            s.clock
        );
        tracing::info!("  dag:        jobs={}, processors={}", self.dag.jobs, self.dag.processors);
        tracing::info!("  output:     dir={}", self.output.dir.display());
    }
}

// ── Analysis ──────────────────────────────────────────────────

/// Dependency analysis and unit assignment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Maximum number of schedule units; extra units are dropped.
    #[serde(default = "default_max_units")]
    pub max_units: usize,
    /// Lower bound (inclusive) of the random burst time, in ms.
    #[serde(default = "default_burst_min")]
    pub burst_min_ms: u64,
    /// Upper bound (inclusive) of the random burst time, in ms.
    #[serde(default = "default_burst_max")]
    pub burst_max_ms: u64,
    /// Seed for burst-time generation. `None` seeds from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Only promote major non-cyclic items to schedule units.
    #[serde(default)]
    pub majors_only: bool,
}

fn default_max_units() -> usize { 20 }
fn default_burst_min() -> u64 { 300 }
fn default_burst_max() -> u64 { 400 }

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_units: default_max_units(),
            burst_min_ms: default_burst_min(),
            burst_max_ms: default_burst_max(),
            seed: None,
            majors_only: false,
        }
    }
}

// ── Scheduler ─────────────────────────────────────────────────

/// How a processor treats a unit that still has work after one slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicy {
    /// Keep slicing the same unit until it finishes.
    #[default]
    RunToCompletion,
    /// Put the unit back at the tail of the shared queue after each slice.
    RoundRobin,
}

impl fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingPolicy::RunToCompletion => write!(f, "run_to_completion"),
            SchedulingPolicy::RoundRobin => write!(f, "round_robin"),
        }
    }
}

impl FromStr for SchedulingPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "run_to_completion" | "fifo" => Ok(Self::RunToCompletion),
            "round_robin" | "rr" => Ok(Self::RoundRobin),
            other => Err(ConfigError::Invalid(format!("unknown scheduling policy '{other}'"))),
        }
    }
}

/// Time source used by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockKind {
    /// Slices really sleep; metrics are wall-clock.
    #[default]
    Wall,
    /// Slices advance a per-processor virtual timeline without sleeping.
    Virtual,
}

impl fmt::Display for ClockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockKind::Wall => write!(f, "wall"),
            ClockKind::Virtual => write!(f, "virtual"),
        }
    }
}

impl FromStr for ClockKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wall" => Ok(Self::Wall),
            "virtual" => Ok(Self::Virtual),
            other => Err(ConfigError::Invalid(format!("unknown clock '{other}'"))),
        }
    }
}

/// Multiprocessor scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of simulated processors. 0 = available parallelism.
    #[serde(default = "default_processors")]
    pub processors: usize,
    /// Length of one time slice, in ms.
    #[serde(default = "default_quantum")]
    pub quantum_ms: u64,
    #[serde(default)]
    pub policy: SchedulingPolicy,
    #[serde(default)]
    pub clock: ClockKind,
}

fn default_processors() -> usize { 4 }
fn default_quantum() -> u64 { 100 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            processors: default_processors(),
            quantum_ms: default_quantum(),
            policy: SchedulingPolicy::default(),
            clock: ClockKind::default(),
        }
    }
}

impl SchedulerConfig {
    /// Resolve processor count (0 means use available parallelism).
    pub fn resolved_processors(&self) -> usize {
        if self.processors == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.processors
        }
    }
}

// ── DAG executor ──────────────────────────────────────────────

/// Settings for the DAG job pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagConfig {
    /// Number of DAG jobs submitted to the pool.
    #[serde(default = "default_dag_jobs")]
    pub jobs: usize,
    /// Processor threads pulling jobs.
    #[serde(default = "default_dag_processors")]
    pub processors: usize,
}

fn default_dag_jobs() -> usize { 3 }
fn default_dag_processors() -> usize { 3 }

impl Default for DagConfig {
    fn default() -> Self {
        Self {
            jobs: default_dag_jobs(),
            processors: default_dag_processors(),
        }
    }
}

// ── Output ────────────────────────────────────────────────────

/// Where reports are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_threads_file")]
    pub threads_file: String,
    #[serde(default = "default_grouped_file")]
    pub grouped_file: String,
    #[serde(default = "default_metrics_file")]
    pub metrics_file: String,
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

fn default_output_dir() -> PathBuf { PathBuf::from("output") }
fn default_threads_file() -> String { "threads.txt".into() }
fn default_grouped_file() -> String { "thread_grouped.txt".into() }
fn default_metrics_file() -> String { "metrics.csv".into() }
fn default_log_file() -> String { "execution_log.csv".into() }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            threads_file: default_threads_file(),
            grouped_file: default_grouped_file(),
            metrics_file: default_metrics_file(),
            log_file: default_log_file(),
        }
    }
}

impl OutputConfig {
    pub fn threads_path(&self) -> PathBuf {
        self.dir.join(&self.threads_file)
    }

    pub fn grouped_path(&self) -> PathBuf {
        self.dir.join(&self.grouped_file)
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.dir.join(&self.metrics_file)
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(&self.log_file)
    }
}
