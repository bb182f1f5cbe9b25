// Commandline argument parsers using clap for the lab tools

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::figure::FigureOptions;

/// Trace conversion, statistics and plotting for the lab assignments
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct LabArgs {
    #[command(subcommand)]
    /// Which tool to run
    pub command: LabCommand,

    /// RON file overriding task periods, unit factors and other tunables
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum LabCommand {
    /// Convert a job completion trace to a job release/completion table
    #[command(about)]
    JobTrace(TraceToCsvCommand),

    /// Convert a job start/end trace to a table
    #[command(about)]
    JobTimeTrace(TraceToCsvCommand),

    /// Convert a context switch trace to one execution table per task
    #[command(about)]
    CtxTrace(TraceToPrefixCommand),

    /// Compute per-task execution tables from a job start/end table
    #[command(about)]
    CalcExec(TraceToPrefixCommand),

    /// Print response time statistics for each task in a job table
    #[command(about)]
    ResponseTime(ResponseTimeCommand),

    /// Convert raw RSSI measurements (feet, binary RSSI bins) to meters and dB
    #[command(about)]
    ConvertUnits(TraceToCsvCommand),

    /// Fit the path loss exponent to RSSI against distance
    #[command(about)]
    PathLoss(DataPlotCommand),

    /// Plot RSSI against distance
    #[command(about)]
    PlotRssi(DataPlotCommand),

    /// Plot the execution state of each task over time
    #[command(about)]
    PlotExec(PlotExecCommand),

    /// Draw a network graph stored in a DOT file
    #[command(about)]
    ShowGraph(ShowGraphCommand),
}

#[derive(Debug, Args, Clone)]
pub struct TraceToCsvCommand {
    /// File to read
    pub input: PathBuf,

    /// CSV file to write
    pub output: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct TraceToPrefixCommand {
    /// File to read
    pub input: PathBuf,

    /// Output files are named `<prefix>-task-<n>.csv`
    pub output_prefix: String,
}

#[derive(Debug, Args, Clone)]
pub struct ResponseTimeCommand {
    /// Job table, as written by `job-trace`
    pub job_trace_file: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct FigureArgs {
    /// Path to write the figure to, as SVG. Shown in the terminal if absent
    #[arg(short = 'f', long = "figure")]
    pub figure: Option<PathBuf>,

    /// Size of the figure, in inches
    #[arg(
        short = 's',
        long = "size",
        num_args = 2,
        value_names = ["WIDTH", "HEIGHT"],
        default_values_t = [6.0, 4.0]
    )]
    pub size: Vec<f64>,
}

impl FigureArgs {
    pub fn options(&self) -> FigureOptions {
        let default = FigureOptions::default();
        let size_in = match self.size.as_slice() {
            &[w, h] => (w, h),
            _ => default.size_in,
        };
        FigureOptions {
            path: self.figure.clone(),
            size_in,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct DataPlotCommand {
    /// RSSI table with `dist_m,rssi_db` columns
    pub data_file: PathBuf,

    #[command(flatten)]
    pub figure: FigureArgs,
}

#[derive(Debug, Args, Clone)]
pub struct PlotExecCommand {
    /// Execution tables, one per task
    #[clap(num_args = 1.., required = true)]
    pub exec_trace_files: Vec<PathBuf>,

    /// Only plot the first DURATION seconds
    #[arg(long = "duration", default_value_t = -1.0, allow_hyphen_values = true)]
    pub duration: f64,

    #[command(flatten)]
    pub figure: FigureArgs,
}

#[derive(Debug, Args, Clone)]
pub struct ShowGraphCommand {
    /// File with a graph in DOT format
    pub graph_file: PathBuf,
}

/// Live view of the network topology reported by the fence master
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct MonitorArgs {
    /// Serial device the node is attached to, or a capture file to replay.
    /// Asks interactively when left out
    pub dev: Option<PathBuf>,

    /// Drop graphs identical to the previous one
    #[arg(short = 'd', long = "dedup")]
    pub dedup: bool,

    /// Read bare multi-line DOT blocks instead of prefixed control lines
    #[arg(short = 'b', long = "blocks")]
    pub blocks: bool,

    /// Baud rate of the serial device
    #[arg(long = "baud")]
    pub baud: Option<u32>,

    /// Keep waiting for more lines at the end of a capture file
    #[arg(long = "follow")]
    pub follow: bool,

    /// Ignore the device and watch a simulated network of N nodes
    #[arg(long = "simulate", value_name = "N", conflicts_with = "dev")]
    pub simulate: Option<usize>,

    /// Seed for the simulated network
    #[arg(long = "seed", requires = "simulate")]
    pub seed: Option<u64>,

    /// RON file overriding the control prefix, baud rate and refresh rate
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Where log messages go while the view owns the terminal
    #[arg(long = "log-file", default_value = "monitor.log")]
    pub log_file: PathBuf,
}
