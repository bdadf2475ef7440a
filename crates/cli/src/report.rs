//! Report files: unit lists, metrics rows and the execution log.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use threadsim_compute::{SchedulerMetrics, SimThread, SliceRecord};
use threadsim_graph::UnitPlan;

pub const METRICS_HEADER: &str =
    "Run Type,Execution Time (s),Avg Turnaround Time (ms),Throughput (units/s),CPU Utilization (%)";
pub const LOG_HEADER: &str = "Timestamp,Processor,Unit,Exec Time (ms),Remaining Time (ms)";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}:{line}: expected `<index> T<index> <burst>`, got {content:?}", path.display())]
    MalformedUnitLine {
        path: PathBuf,
        line: usize,
        content: String,
    },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ReportError + '_ {
    move |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn create(path: &Path) -> Result<BufWriter<File>, ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    File::create(path).map(BufWriter::new).map_err(io_err(path))
}

/// Open for appending. The flag says whether the file was new or empty.
fn append(path: &Path) -> Result<(BufWriter<File>, bool), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let fresh = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err(path))?;
    Ok((BufWriter::new(file), fresh))
}

/// `<index> T<index> <member1> [member2 ...]` per unit.
pub fn write_threads(path: &Path, plan: &UnitPlan) -> Result<(), ReportError> {
    let mut out = create(path)?;
    for unit in &plan.units {
        writeln!(out, "{} {} {}", unit.index, unit.label(), unit.members.join(" ")).map_err(io_err(path))?;
    }
    out.flush().map_err(io_err(path))
}

/// `<index> T<index> <aggregateBurstTime>` per unit.
pub fn write_grouped(path: &Path, plan: &UnitPlan) -> Result<(), ReportError> {
    let mut out = create(path)?;
    for unit in &plan.units {
        writeln!(out, "{} {} {}", unit.index, unit.label(), unit.burst_time_ms).map_err(io_err(path))?;
    }
    out.flush().map_err(io_err(path))
}

/// Read a unit file written by [`write_grouped`] back into scheduler input.
pub fn read_grouped(path: &Path) -> Result<Vec<SimThread>, ReportError> {
    let text = fs::read_to_string(path).map_err(io_err(path))?;
    parse_grouped(path, &text)
}

fn parse_grouped(path: &Path, text: &str) -> Result<Vec<SimThread>, ReportError> {
    let mut threads = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        let malformed = || ReportError::MalformedUnitLine {
            path: path.to_path_buf(),
            line: i + 1,
            content: line.to_string(),
        };
        let &[index, label, burst] = fields.as_slice() else {
            return Err(malformed());
        };
        let index: usize = index.parse().map_err(|_| malformed())?;
        let burst: u64 = burst.parse().map_err(|_| malformed())?;
        threads.push(SimThread::new(index, label, burst));
    }
    Ok(threads)
}

/// Append one metrics row, writing the header first if the file is new.
pub fn append_metrics(path: &Path, run_type: &str, metrics: &SchedulerMetrics) -> Result<(), ReportError> {
    let (mut out, fresh) = append(path)?;
    if fresh {
        writeln!(out, "{}", METRICS_HEADER).map_err(io_err(path))?;
    }
    writeln!(
        out,
        "{},{:.3},{:.2},{:.2},{:.2}",
        run_type,
        metrics.execution_time_s,
        metrics.avg_turnaround_ms,
        metrics.throughput,
        metrics.cpu_utilization
    )
    .map_err(io_err(path))?;
    out.flush().map_err(io_err(path))
}

/// Append the slice log, writing the header first if the file is new.
pub fn append_execution_log(path: &Path, slices: &[SliceRecord]) -> Result<(), ReportError> {
    let (mut out, fresh) = append(path)?;
    if fresh {
        writeln!(out, "{}", LOG_HEADER).map_err(io_err(path))?;
    }
    for s in slices {
        writeln!(
            out,
            "{},{},{},{},{}",
            s.timestamp_ms, s.processor, s.unit, s.slice_ms, s.remaining_ms
        )
        .map_err(io_err(path))?;
    }
    out.flush().map_err(io_err(path))
}

#[cfg(test)]
mod tests {
    use threadsim_core::AnalysisConfig;
    use threadsim_graph::Analysis;

    use super::*;

    fn plan() -> UnitPlan {
        let config = AnalysisConfig {
            seed: Some(5),
            ..AnalysisConfig::default()
        };
        Analysis::run("main a x\na\nx y\ny x\n", &config).plan
    }

    #[test]
    fn threads_file_lists_members() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("threads.txt");
        write_threads(&path, &plan()).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["1 T1 x y", "2 T2 a", "3 T3 main"]);
    }

    #[test]
    fn grouped_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thread_grouped.txt");
        let plan = plan();
        write_grouped(&path, &plan).unwrap();

        let threads = read_grouped(&path).unwrap();
        assert_eq!(threads.len(), plan.len());
        for (t, u) in threads.iter().zip(&plan.units) {
            assert_eq!(t.id, u.index);
            assert_eq!(t.name, u.label());
            assert_eq!(t.burst_time_ms, u.burst_time_ms);
            assert_eq!(t.remaining_ms, u.burst_time_ms);
        }
    }

    #[test]
    fn malformed_unit_line_names_the_line() {
        let err = parse_grouped(Path::new("g.txt"), "1 T1 300\n\n2 T2 lots\n").unwrap_err();
        match err {
            ReportError::MalformedUnitLine { line, content, .. } => {
                assert_eq!(line, 3);
                assert_eq!(content, "2 T2 lots");
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(parse_grouped(Path::new("g.txt"), "1 T1\n").is_err());
    }

    #[test]
    fn metrics_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let m = SchedulerMetrics {
            processors: 2,
            units_completed: 3,
            execution_time_s: 1.5,
            avg_turnaround_ms: 700.0,
            throughput: 2.0,
            cpu_utilization: 80.0,
        };
        append_metrics(&path, "Single Processor", &m).unwrap();
        append_metrics(&path, "Multiprocessor", &m).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], METRICS_HEADER);
        assert_eq!(lines[1], "Single Processor,1.500,700.00,2.00,80.00");
        assert!(lines[2].starts_with("Multiprocessor,"));
    }

    #[test]
    fn execution_log_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("execution_log.csv");
        let slice = SliceRecord {
            timestamp_ms: 100,
            processor: 1,
            unit: "T2".into(),
            slice_ms: 100,
            remaining_ms: 250,
        };
        append_execution_log(&path, std::slice::from_ref(&slice)).unwrap();
        append_execution_log(&path, &[slice]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![LOG_HEADER, "100,1,T2,100,250", "100,1,T2,100,250"]);
    }
}
