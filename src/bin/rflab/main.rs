//! Offline lab tools: trace conversion, statistics and plots.
//!
//! ```text
//! rflab job-trace trace.txt jobs.csv
//! rflab response-time jobs.csv
//! rflab ctx-trace ctx.txt exec
//! rflab plot-exec exec-task-1.csv exec-task-2.csv --duration 10 -f exec.svg
//! rflab convert-units raw.csv rssi.csv
//! rflab path-loss rssi.csv -f path-loss.svg
//! rflab show-graph topology.dot
//! ```

use clap::Parser;
use log::{error, info};
use rflab::{
    args::{LabArgs, LabCommand},
    config::LabConfig,
    control::{ControlSession, StreamMode},
    convert::{self, ExecSample, JobRecord, RssiRecord},
    dot::DotGraph,
    figure,
    gui::topology_view,
    stats::{self, PathLossFit},
};
use std::{
    error::Error,
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
    process,
    sync::{Arc, Mutex},
    time::Duration,
};

type BoxResult<T> = Result<T, Box<dyn Error>>;

fn open(path: &Path) -> BoxResult<BufReader<File>> {
    let file = File::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    Ok(BufReader::new(file))
}

fn create(path: &Path) -> BoxResult<File> {
    Ok(File::create(path).map_err(|e| format!("{}: {}", path.display(), e))?)
}

fn report_paths(paths: &[PathBuf]) {
    for path in paths {
        println!("{}", path.display());
    }
}

fn run(args: LabArgs) -> BoxResult<()> {
    let cfg = LabConfig::load(args.config.as_deref())?;

    match args.command {
        LabCommand::JobTrace(cmd) => {
            let rows = convert::job_trace_to_csv(
                open(&cmd.input)?,
                create(&cmd.output)?,
                &cfg.task_periods_s,
            )?;
            info!("wrote {} jobs to {}", rows, cmd.output.display());
        }

        LabCommand::JobTimeTrace(cmd) => {
            let rows = convert::job_time_trace_to_csv(open(&cmd.input)?, create(&cmd.output)?)?;
            info!("wrote {} jobs to {}", rows, cmd.output.display());
        }

        LabCommand::CtxTrace(cmd) => {
            let paths = convert::ctx_trace_to_csv(open(&cmd.input)?, &cmd.output_prefix)?;
            report_paths(&paths);
        }

        LabCommand::CalcExec(cmd) => {
            let paths = convert::exec_from_job_times(open(&cmd.input)?, &cmd.output_prefix)?;
            report_paths(&paths);
        }

        LabCommand::ResponseTime(cmd) => {
            let jobs: Vec<JobRecord> = convert::read_records(&cmd.job_trace_file)?;
            let rows = stats::response_times(&jobs);
            print!("{}", stats::format_summary_table("response_s", &rows));
        }

        LabCommand::ConvertUnits(cmd) => {
            let rows = convert::convert_units(
                open(&cmd.input)?,
                create(&cmd.output)?,
                cfg.feet_to_meters,
                cfg.rssi_step_db,
            )?;
            info!("converted {} measurements", rows);
        }

        LabCommand::PathLoss(cmd) => {
            let data: Vec<RssiRecord> = convert::read_records(&cmd.data_file)?;
            let fit = PathLossFit::solve(&data)?;
            println!("{}", fit);
            figure::path_loss(&data, &fit).render(&cmd.figure.options())?;
        }

        LabCommand::PlotRssi(cmd) => {
            let data: Vec<RssiRecord> = convert::read_records(&cmd.data_file)?;
            figure::rssi_vs_distance(&data).render(&cmd.figure.options())?;
        }

        LabCommand::PlotExec(cmd) => {
            let traces = cmd
                .exec_trace_files
                .iter()
                .map(|path| convert::read_records::<ExecSample>(path))
                .collect::<Result<Vec<_>, _>>()?;
            figure::exec_timeline(&traces, cmd.duration).render(&cmd.figure.options())?;
        }

        LabCommand::ShowGraph(cmd) => {
            let text = fs::read_to_string(&cmd.graph_file)?;
            let graph: DotGraph = text.parse().map_err(|e: nom::error::Error<String>| {
                format!(
                    "{}: failed to parse graph near '{}'",
                    cmd.graph_file.display(),
                    e.input
                )
            })?;
            info!("{}", graph.to_dot());

            let mut session = ControlSession::new(StreamMode::Blocks, &cfg.ctrl_prefix, false);
            session.replace_graph(&graph);
            topology_view(
                Arc::new(Mutex::new(session)),
                Duration::from_millis(cfg.tick_ms),
                &cmd.graph_file.to_string_lossy(),
            )?;
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let args = LabArgs::parse();

    if let Err(e) = run(args) {
        error!("{}", e);
        eprintln!("rflab: {}", e);
        process::exit(1);
    }
}
