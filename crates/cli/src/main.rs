mod cli;
mod report;

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use serde_json::json;
use tracing::{info, warn};

use threadsim_compute::{diamond_subtasks, DagJob, ProcessorPool, Scheduler, SchedulerReport, SimThread};
use threadsim_core::{load_dotenv, OutputConfig, SchedulerConfig, ThreadsimConfig};
use threadsim_graph::Analysis;

use crate::cli::{CliArgs, Command};

const SINGLE_RUN: &str = "Single Processor";
const MULTI_RUN: &str = "Multiprocessor";

fn main() -> Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    let mut config = ThreadsimConfig::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;
    config.log_summary();

    match &args.command {
        Command::Plan { edges, .. } => {
            let analysis = plan(edges, &config)?;
            if args.json {
                print_json(&plan_json(&analysis))?;
            } else {
                print_plan(&analysis, &config.output);
            }
        }
        Command::Simulate { grouped, run_type, .. } => {
            let threads = report::read_grouped(grouped)
                .with_context(|| format!("failed to read unit file {}", grouped.display()))?;
            let report = simulate(threads, &config.scheduler, run_type, &config.output)?;
            if args.json {
                print_json(&json!({ "run_type": run_type, "metrics": report.metrics, "unfinished": report.unfinished }))?;
            } else {
                print_metrics(run_type, &report);
            }
        }
        Command::Run { edges, .. } => {
            let analysis = plan(edges, &config)?;
            let threads: Vec<SimThread> = analysis.plan.units.iter().map(SimThread::from_unit).collect();

            let single_cfg = SchedulerConfig {
                processors: 1,
                ..config.scheduler.clone()
            };
            let single = simulate(threads.clone(), &single_cfg, SINGLE_RUN, &config.output)?;
            let multi = simulate(threads, &config.scheduler, MULTI_RUN, &config.output)?;

            if args.json {
                print_json(&json!({
                    "plan": plan_json(&analysis),
                    "runs": [
                        { "run_type": SINGLE_RUN, "metrics": single.metrics },
                        { "run_type": MULTI_RUN, "metrics": multi.metrics },
                    ],
                }))?;
            } else {
                print_plan(&analysis, &config.output);
                print_metrics(SINGLE_RUN, &single);
                print_metrics(MULTI_RUN, &multi);
            }
        }
        Command::Dag { .. } => {
            let jobs: Vec<DagJob> = (1..=config.dag.jobs)
                .map(|id| DagJob::new(id, diamond_subtasks()))
                .collect();
            let outcomes = ProcessorPool::new(config.dag.processors)
                .run(jobs)
                .context("processor pool failed")?;

            let mut failed = 0;
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(r) if !args.json => println!(
                        "job {} on processor {}: {} sub-tasks in {} waves, {:.3}s",
                        outcome.job_id,
                        outcome.processor,
                        r.completed(),
                        r.waves.len(),
                        r.elapsed.as_secs_f64()
                    ),
                    Ok(_) => {}
                    Err(e) => {
                        failed += 1;
                        eprintln!("job {} failed: {}", outcome.job_id, e);
                    }
                }
            }
            if args.json {
                let jobs: Vec<_> = outcomes
                    .iter()
                    .map(|o| match &o.result {
                        Ok(r) => json!({ "job": o.job_id, "processor": o.processor, "waves": r.waves, "elapsed_s": r.elapsed.as_secs_f64() }),
                        Err(e) => json!({ "job": o.job_id, "processor": o.processor, "error": e.to_string() }),
                    })
                    .collect();
                print_json(&json!({ "jobs": jobs }))?;
            }
            if failed > 0 {
                bail!("{} of {} DAG jobs failed", failed, outcomes.len());
            }
        }
    }

    Ok(())
}

/// Parse, group and order `edges`, then write the two unit files.
fn plan(edges: &Path, config: &ThreadsimConfig) -> Result<Analysis> {
    let input = std::fs::read_to_string(edges)
        .with_context(|| format!("failed to read edge list {}", edges.display()))?;
    let analysis = Analysis::run(&input, &config.analysis);

    if analysis.topo.residual > 0 {
        warn!(residual = analysis.topo.residual, "Some items could not be ordered");
    }

    let out = &config.output;
    report::write_threads(&out.threads_path(), &analysis.plan)?;
    report::write_grouped(&out.grouped_path(), &analysis.plan)?;
    info!(
        threads = %out.threads_path().display(),
        grouped = %out.grouped_path().display(),
        "Unit files written"
    );
    Ok(analysis)
}

/// Run `threads` once and append the metrics row and execution log.
fn simulate(
    threads: Vec<SimThread>,
    scheduler: &SchedulerConfig,
    run_type: &str,
    out: &OutputConfig,
) -> Result<SchedulerReport> {
    info!(run_type, units = threads.len(), "Simulation starting");
    let report = Scheduler::new(scheduler.clone())
        .run(threads)
        .with_context(|| format!("{} run failed", run_type))?;

    report::append_metrics(&out.metrics_path(), run_type, &report.metrics)?;
    report::append_execution_log(&out.log_path(), &report.slices)?;
    Ok(report)
}

fn plan_json(analysis: &Analysis) -> serde_json::Value {
    json!({
        "generated_at": Utc::now(),
        "summary": analysis.summary,
        "stats": analysis.graph.stats(),
        "groups": analysis.groups,
        "residual": analysis.topo.residual,
        "units": analysis.plan.units,
        "dropped_units": analysis.plan.dropped_units,
    })
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_plan(analysis: &Analysis, out: &OutputConfig) {
    let stats = analysis.graph.stats();
    println!(
        "{} items ({} major), {} edges, {} cycle groups",
        stats.item_count,
        stats.major_count,
        stats.edge_count,
        analysis.groups.len()
    );
    for unit in &analysis.plan.units {
        println!("  {:>4}  {:>6}ms  {}", unit.label(), unit.burst_time_ms, unit.members.join(" "));
    }
    if analysis.plan.dropped_units > 0 {
        println!("  ({} units over the cap were dropped)", analysis.plan.dropped_units);
    }
    println!("wrote {} and {}", out.threads_path().display(), out.grouped_path().display());
}

fn print_metrics(run_type: &str, report: &SchedulerReport) {
    let m = &report.metrics;
    println!("{} ({} processors)", run_type, m.processors);
    println!("  execution time:   {:.3} s", m.execution_time_s);
    println!("  avg turnaround:   {:.2} ms", m.avg_turnaround_ms);
    println!("  throughput:       {:.2} units/s", m.throughput);
    println!("  CPU utilization:  {:.2} %", m.cpu_utilization);
    if !report.unfinished.is_empty() {
        println!("  unfinished units: {}", report.unfinished.len());
    }
}
