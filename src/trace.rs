//! Decoders for the lines Nano-RK tasks print over the UART while a lab
//! experiment runs. Every timestamp is printed as a `<sec> <nsec>` pair.

use nom::{
    bytes::complete::tag,
    character::complete::{space0, space1, u32, u64},
    combinator::map,
    error::Error,
    sequence::{preceded, terminated, tuple},
    Finish, IResult,
};

use std::{
    fmt,
    io::{BufRead, BufReader, Read},
    str::FromStr,
};

/// The kernel prints this at boot; it is the only non-trace line we expect.
pub const VERSION_BANNER: &str = "Nano-RK Version";

/// `Task2: 0 138671946`, a job of `task` completed at `time_s`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Completion {
    pub task: u32,
    pub time_s: f64,
}

/// `Task1: 0 1000 0 441406476`, a job of `task` ran from `start_s` to `end_s`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobTime {
    pub task: u32,
    pub start_s: f64,
    pub end_s: f64,
}

/// `  1 250000000 2->1`, the scheduler switched from `task_out` to `task_in`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextSwitch {
    pub time_s: f64,
    pub task_out: u32,
    pub task_in: u32,
}

fn parse_timestamp(s: &str) -> IResult<&str, f64> {
    map(
        tuple((preceded(space0, u64), preceded(space1, u64))),
        |(sec, nsec)| sec as f64 + nsec as f64 / 1_000_000_000.0,
    )(s)
}

fn parse_task_label(s: &str) -> IResult<&str, u32> {
    terminated(preceded(tag("Task"), u32), tag(":"))(s)
}

fn parse_completion(s: &str) -> IResult<&str, Completion> {
    map(
        tuple((parse_task_label, parse_timestamp)),
        |(task, time_s)| Completion { task, time_s },
    )(s)
}

fn parse_job_time(s: &str) -> IResult<&str, JobTime> {
    map(
        tuple((parse_task_label, parse_timestamp, parse_timestamp)),
        |(task, start_s, end_s)| JobTime {
            task,
            start_s,
            end_s,
        },
    )(s)
}

fn parse_context_switch(s: &str) -> IResult<&str, ContextSwitch> {
    map(
        tuple((
            parse_timestamp,
            preceded(space1, u32),
            preceded(tag("->"), u32),
        )),
        |(time_s, task_out, task_in)| ContextSwitch {
            time_s,
            task_out,
            task_in,
        },
    )(s)
}

// The firmware sometimes appends debug output, so anything left over after
// a successful match is ignored.
fn finish_line<T>(res: IResult<&str, T>) -> Result<T, Error<String>> {
    match res.finish() {
        Ok((_remaining, line)) => Ok(line),
        Err(Error { input, code }) => Err(Error {
            input: input.to_string(),
            code,
        }),
    }
}

impl FromStr for Completion {
    type Err = Error<String>;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        finish_line(parse_completion(s))
    }
}

impl FromStr for JobTime {
    type Err = Error<String>;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        finish_line(parse_job_time(s))
    }
}

impl FromStr for ContextSwitch {
    type Err = Error<String>;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        finish_line(parse_context_switch(s))
    }
}

/// Problems reading a raw UART trace.
#[derive(Debug)]
pub enum TraceError {
    /// Returned when the trace can't be read.
    IoError(std::io::Error),

    /// Returned for the first line that is neither a trace line of the
    /// expected kind nor the version banner. `line_no` counts from 1.
    BadLine { line_no: usize, line: String },
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TraceError::IoError(error) => write!(f, "io error: {}", error),
            TraceError::BadLine { line_no, line } => {
                write!(f, "failed to parse line {}: '{}'", line_no, line)
            }
        }
    }
}

impl std::error::Error for TraceError {}

impl From<std::io::Error> for TraceError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

/// Decode every line of `reader` as a `T`, skipping the version banner and
/// blank lines. Stops at the first line that does not decode.
pub fn decode_lines<T, R>(reader: R) -> Result<Vec<T>, TraceError>
where
    T: FromStr,
    R: Read,
{
    let mut decoded = Vec::new();
    for (idx, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim_end();
        if trimmed.is_empty() || trimmed.starts_with(VERSION_BANNER) {
            continue;
        }
        match trimmed.parse::<T>() {
            Ok(item) => decoded.push(item),
            Err(_) => {
                return Err(TraceError::BadLine {
                    line_no: idx + 1,
                    line: trimmed.to_owned(),
                })
            }
        }
    }
    Ok(decoded)
}
