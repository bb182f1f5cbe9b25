//! Turns raw UART traces into CSV tables, and CSV tables into other CSV
//! tables. Every table starts with a header row, even when it has no data.

use crate::trace::{decode_lines, Completion, ContextSwitch, JobTime, TraceError};

use csv::{Writer, WriterBuilder};
use log::{debug, info};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    borrow::Cow,
    collections::{BTreeMap, HashMap},
    fmt,
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

/// Writes floats the way `printf("%f")` does, which is what the rest of the
/// course material expects to find in these files.
mod fixed {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&format_args!("{:.6}", value))
    }
}

/// Writes a 0.0/1.0 state as a bare `0` or `1`.
mod flag {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(if *value > 0.5 { 1 } else { 0 })
    }
}

/// One row of a job trace: when a job was released and when it completed.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct JobRecord {
    pub task: u32,
    #[serde(serialize_with = "fixed::serialize")]
    pub release_s: f64,
    #[serde(serialize_with = "fixed::serialize")]
    pub completion_s: f64,
}

/// One row of a job time trace: when a job started and ended executing.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct JobTimeRecord {
    pub task: u32,
    #[serde(serialize_with = "fixed::serialize")]
    pub start_s: f64,
    #[serde(serialize_with = "fixed::serialize")]
    pub end_s: f64,
}

/// One row of a per-task execution trace. `is_running` is 1.0 from `time_s`
/// until the next sample.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ExecSample {
    #[serde(serialize_with = "fixed::serialize")]
    pub time_s: f64,
    #[serde(serialize_with = "flag::serialize")]
    pub is_running: f64,
}

/// RSSI as read off the node's LEDs, at a distance measured with a tape.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawRssiRecord {
    pub dist_ft: f64,
    /// Binary digits, most significant first
    pub rssi_bin: String,
}

/// RSSI in dB at a distance in meters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct RssiRecord {
    #[serde(serialize_with = "fixed::serialize")]
    pub dist_m: f64,
    #[serde(serialize_with = "fixed::serialize")]
    pub rssi_db: f64,
}

const JOB_HEADER: [&str; 3] = ["task", "release_s", "completion_s"];
const JOB_TIME_HEADER: [&str; 3] = ["task", "start_s", "end_s"];
const EXEC_HEADER: [&str; 2] = ["time_s", "is_running"];
const RSSI_HEADER: [&str; 2] = ["dist_m", "rssi_db"];

/// Everything that can stop a conversion.
#[derive(Debug)]
pub enum ConvertError {
    /// Returned when an input or output file can't be opened.
    IoError(std::io::Error),

    /// Returned when a CSV table can't be read or written.
    CsvError(csv::Error),

    /// Returned when the raw trace has a line we don't understand.
    TraceError(TraceError),

    /// Returned when a completion shows up for a task without a period.
    UnknownPeriod(u32),

    /// Returned when an RSSI field is not a binary number. `row` counts data
    /// rows from 1.
    BadRssiBin { row: usize, value: String },
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ConvertError as CE;
        let msg = match self {
            CE::IoError(error) => Cow::from(format!("io error: {}", error)),
            CE::CsvError(error) => Cow::from(format!("csv error: {}", error)),
            CE::TraceError(error) => Cow::from(format!("trace error: {}", error)),
            CE::UnknownPeriod(task) => Cow::from(format!("no period configured for task {}", task)),
            CE::BadRssiBin { row, value } => {
                Cow::from(format!("row {}: '{}' is not a binary RSSI value", row, value))
            }
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for ConvertError {}

impl From<std::io::Error> for ConvertError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

impl From<csv::Error> for ConvertError {
    fn from(value: csv::Error) -> Self {
        Self::CsvError(value)
    }
}

impl From<TraceError> for ConvertError {
    fn from(value: TraceError) -> Self {
        Self::TraceError(value)
    }
}

/// Path of the per-task table `<prefix>-task-<task>.csv`.
pub fn task_path(prefix: &str, task: u32) -> PathBuf {
    PathBuf::from(format!("{}-task-{}.csv", prefix, task))
}

fn headed_writer<W: Write>(out: W, header: &[&str]) -> Result<Writer<W>, ConvertError> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(out);
    wtr.write_record(header)?;
    Ok(wtr)
}

/// Read every row of the CSV table at `path`.
pub fn read_records<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>, ConvertError> {
    let handle = File::open(path)?;
    read_records_from(handle)
}

/// Read every row of a CSV table from the [Read]able object provided.
pub fn read_records_from<T: DeserializeOwned>(input: impl Read) -> Result<Vec<T>, ConvertError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input);
    let records = rdr.deserialize().collect::<Result<Vec<T>, csv::Error>>()?;
    Ok(records)
}

/// Pair every completion in `trace` with its release time. Each task's
/// release clock starts at zero and advances by the task's period after
/// every completion. Returns the number of rows written.
pub fn job_trace_to_csv(
    trace: impl Read,
    out: impl Write,
    periods_s: &BTreeMap<u32, f64>,
) -> Result<usize, ConvertError> {
    let completions: Vec<Completion> = decode_lines(trace)?;
    let mut wtr = headed_writer(out, &JOB_HEADER)?;
    let mut release_s: HashMap<u32, f64> = HashMap::new();

    for Completion { task, time_s } in &completions {
        let period = *periods_s
            .get(task)
            .ok_or(ConvertError::UnknownPeriod(*task))?;
        let release = release_s.entry(*task).or_insert(0.0);
        wtr.serialize(JobRecord {
            task: *task,
            release_s: *release,
            completion_s: *time_s,
        })?;
        *release += period;
    }

    wtr.flush()?;
    Ok(completions.len())
}

/// Copy every job time line in `trace` into a table. Returns the number of
/// rows written.
pub fn job_time_trace_to_csv(trace: impl Read, out: impl Write) -> Result<usize, ConvertError> {
    let jobs: Vec<JobTime> = decode_lines(trace)?;
    let mut wtr = headed_writer(out, &JOB_TIME_HEADER)?;

    for JobTime {
        task,
        start_s,
        end_s,
    } in &jobs
    {
        wtr.serialize(JobTimeRecord {
            task: *task,
            start_s: *start_s,
            end_s: *end_s,
        })?;
    }

    wtr.flush()?;
    Ok(jobs.len())
}

/// Split a context switch trace into one execution table per task, named by
/// [task_path]. Returns the tables written, in ascending task order.
pub fn ctx_trace_to_csv(trace: impl Read, prefix: &str) -> Result<Vec<PathBuf>, ConvertError> {
    let switches: Vec<ContextSwitch> = decode_lines(trace)?;
    let mut outputs: BTreeMap<u32, Writer<File>> = BTreeMap::new();

    for ContextSwitch {
        time_s,
        task_out,
        task_in,
    } in switches
    {
        for task in [task_in, task_out] {
            if !outputs.contains_key(&task) {
                let path = task_path(prefix, task);
                debug!("creating {}", path.display());
                outputs.insert(task, headed_writer(File::create(path)?, &EXEC_HEADER)?);
            }
        }

        let samples = [(task_out, 0.0), (task_in, 1.0)];
        for (task, is_running) in samples {
            if let Some(wtr) = outputs.get_mut(&task) {
                wtr.serialize(ExecSample { time_s, is_running })?;
            }
        }
    }

    let mut written = Vec::with_capacity(outputs.len());
    for (task, mut wtr) in outputs {
        wtr.flush()?;
        written.push(task_path(prefix, task));
    }
    info!("wrote {} execution tables", written.len());
    Ok(written)
}

/// Build the execution samples of one task from its jobs: the task goes high
/// at each start and low at each end.
pub fn exec_samples(jobs: &[JobTimeRecord]) -> Vec<ExecSample> {
    let mut samples: Vec<ExecSample> = jobs
        .iter()
        .map(|j| ExecSample {
            time_s: j.start_s,
            is_running: 1.0,
        })
        .chain(jobs.iter().map(|j| ExecSample {
            time_s: j.end_s,
            is_running: 0.0,
        }))
        .collect();
    samples.sort_by(|l, r| l.time_s.total_cmp(&r.time_s));
    samples
}

/// Build per-task execution tables from a job time table. Tasks are written
/// in the order they first appear. Returns the tables written.
pub fn exec_from_job_times(job_csv: impl Read, prefix: &str) -> Result<Vec<PathBuf>, ConvertError> {
    let jobs: Vec<JobTimeRecord> = read_records_from(job_csv)?;

    let mut tasks: Vec<u32> = Vec::new();
    for job in &jobs {
        if !tasks.contains(&job.task) {
            tasks.push(job.task);
        }
    }

    let mut written = Vec::with_capacity(tasks.len());
    for task in tasks {
        let task_jobs: Vec<JobTimeRecord> =
            jobs.iter().filter(|j| j.task == task).copied().collect();
        let path = task_path(prefix, task);
        let mut wtr = headed_writer(File::create(&path)?, &EXEC_HEADER)?;
        for sample in exec_samples(&task_jobs) {
            wtr.serialize(sample)?;
        }
        wtr.flush()?;
        written.push(path);
    }
    Ok(written)
}

/// Decode a binary RSSI bin as printed by the node.
pub fn rssi_bin_value(bin: &str) -> Option<u32> {
    let bin = bin.trim();
    if bin.is_empty() {
        return None;
    }
    u32::from_str_radix(bin, 2).ok()
}

/// Convert raw measurements to meters and dB. Returns the number of rows
/// written.
pub fn convert_units(
    input: impl Read,
    out: impl Write,
    feet_to_meters: f64,
    rssi_step_db: f64,
) -> Result<usize, ConvertError> {
    let raw: Vec<RawRssiRecord> = read_records_from(input)?;
    let mut wtr = headed_writer(out, &RSSI_HEADER)?;

    for (idx, record) in raw.iter().enumerate() {
        let bin = rssi_bin_value(&record.rssi_bin).ok_or_else(|| ConvertError::BadRssiBin {
            row: idx + 1,
            value: record.rssi_bin.clone(),
        })?;
        wtr.serialize(RssiRecord {
            dist_m: record.dist_ft * feet_to_meters,
            rssi_db: bin as f64 * rssi_step_db,
        })?;
    }

    wtr.flush()?;
    Ok(raw.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn periods() -> BTreeMap<u32, f64> {
        BTreeMap::from([(1, 1.0), (2, 2.0)])
    }

    #[test]
    fn job_trace_release_clock() {
        let trace = "Nano-RK Version 101\n\
                     Task1: 0 441406476\n\
                     Task2: 0 138671946\n\
                     Task1: 1 250000000\n\
                     Task2: 2 500000000\n";
        let mut out = Vec::new();
        let rows = job_trace_to_csv(trace.as_bytes(), &mut out, &periods()).unwrap();
        assert_eq!(rows, 4);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "task,release_s,completion_s\n\
             1,0.000000,0.441406\n\
             2,0.000000,0.138672\n\
             1,1.000000,1.250000\n\
             2,2.000000,2.500000\n"
        );
    }

    #[test]
    fn job_trace_unknown_task() {
        let mut out = Vec::new();
        let res = job_trace_to_csv("Task7: 0 1\n".as_bytes(), &mut out, &periods());
        assert!(matches!(res, Err(ConvertError::UnknownPeriod(7))));
    }

    #[test]
    fn empty_trace_still_has_header() {
        let mut out = Vec::new();
        job_time_trace_to_csv("".as_bytes(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "task,start_s,end_s\n");
    }

    #[test]
    fn job_time_rows() {
        let mut out = Vec::new();
        job_time_trace_to_csv("Task2: 0 5 0 500000000\n".as_bytes(), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "task,start_s,end_s\n2,0.000000,0.500000\n"
        );
    }

    #[test]
    fn ctx_trace_splits_per_task() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("run").to_string_lossy().into_owned();
        let trace = "  0 0 0->1\n  0 500000000 1->2\n  1 0 2->0\n";

        let written = ctx_trace_to_csv(trace.as_bytes(), &prefix).unwrap();
        assert_eq!(written.len(), 3);

        let task1 = fs::read_to_string(task_path(&prefix, 1)).unwrap();
        assert_eq!(task1, "time_s,is_running\n0.000000,1\n0.500000,0\n");
        let task0 = fs::read_to_string(task_path(&prefix, 0)).unwrap();
        assert_eq!(task0, "time_s,is_running\n0.000000,0\n1.000000,1\n");
    }

    #[test]
    fn exec_samples_are_sorted() {
        let jobs = [
            JobTimeRecord {
                task: 1,
                start_s: 0.0,
                end_s: 0.5,
            },
            JobTimeRecord {
                task: 1,
                start_s: 1.0,
                end_s: 1.25,
            },
        ];
        let samples = exec_samples(&jobs);
        let times: Vec<f64> = samples.iter().map(|s| s.time_s).collect();
        let states: Vec<f64> = samples.iter().map(|s| s.is_running).collect();
        assert_eq!(times, vec![0.0, 0.5, 1.0, 1.25]);
        assert_eq!(states, vec![1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn calc_exec_tables() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("exec").to_string_lossy().into_owned();
        let table = "task,start_s,end_s\n2,0.1,0.2\n1,0.0,0.05\n2,1.1,1.3\n";

        let written = exec_from_job_times(table.as_bytes(), &prefix).unwrap();
        assert_eq!(written, vec![task_path(&prefix, 2), task_path(&prefix, 1)]);

        let samples: Vec<ExecSample> = read_records(task_path(&prefix, 2)).unwrap();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[3].time_s, 1.3);
        assert_eq!(samples[3].is_running, 0.0);
    }

    #[test]
    fn units() {
        let input = "dist_ft,rssi_bin\n1,101\n10,0011\n";
        let mut out = Vec::new();
        convert_units(input.as_bytes(), &mut out, 0.3048, 5.0).unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        assert_eq!(text.lines().nth(1), Some("0.304800,25.000000"));
        let rows: Vec<RssiRecord> = read_records_from(out.as_slice()).unwrap();
        assert_eq!(rows.len(), 2);
        assert!((rows[0].dist_m - 0.3048).abs() < 1e-12);
        assert_eq!(rows[0].rssi_db, 25.0);
        assert!((rows[1].dist_m - 3.048).abs() < 1e-12);
        assert_eq!(rows[1].rssi_db, 15.0);
    }

    #[test]
    fn units_bad_bin() {
        let input = "dist_ft,rssi_bin\n1,101\n2,12\n";
        let mut out = Vec::new();
        match convert_units(input.as_bytes(), &mut out, 0.3048, 5.0) {
            Err(ConvertError::BadRssiBin { row, value }) => {
                assert_eq!(row, 2);
                assert_eq!(value, "12");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
