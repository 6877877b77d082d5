//! kvshim_bench drives deterministic workloads against embedded key-value engines.
//!
//! A run is configured by a [BenchmarkConfig](config::BenchmarkConfig).  The workload turns the
//! configuration into an operation stream, the [TimedRun](runner::TimedRun) issues the stream
//! against one [kvshim::Store], and a [Recorder](recorder::Recorder) writes one JSON line per
//! sample (or per aggregate interval), framed by a setup record and a footprint record.

use std::fmt::{Display, Formatter};
use std::io::Write;
use std::path::Path;

use kvshim::{Backend, KeyValueStore};

pub mod config;
pub mod keyspace;
pub mod metrics;
pub mod recorder;
pub mod runner;
pub mod workload;

use config::BenchmarkConfig;
use recorder::{AggregateRecorder, Footprint, JsonLinesRecorder, Recorder, Setup};
use runner::{RunSummary, TimedRun};

/////////////////////////////////////////////// Error //////////////////////////////////////////////

/// Every way a run can fail as a whole.  Per-operation failures are samples, not errors.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// The configuration is invalid.
    Config { what: String },
    /// The backend cannot express the workload.
    Unsupported { what: String },
    /// The backend could not be opened.
    BackendOpen { backend: Backend, err: kvshim::Error },
    /// The backend failed in a way that ends the run.
    Backend { err: kvshim::Error },
    /// Records could not be written.
    Output { what: String },
}

impl Error {
    pub fn config(what: impl Into<String>) -> Self {
        Self::Config { what: what.into() }
    }

    /// The process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config { .. } => 2,
            Error::Unsupported { .. } => 3,
            Error::BackendOpen { .. } => 4,
            Error::Backend { .. } => 5,
            Error::Output { .. } => 6,
        }
    }
}

impl Display for Error {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Error::Config { what } => write!(fmt, "configuration error: {}", what),
            Error::Unsupported { what } => write!(fmt, "unsupported: {}", what),
            Error::BackendOpen { backend, err } => {
                write!(fmt, "could not open {}: {}", backend, err)
            }
            Error::Backend { err } => write!(fmt, "backend failed: {}", err),
            Error::Output { what } => write!(fmt, "could not write records: {}", what),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Output {
            what: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Output {
            what: err.to_string(),
        }
    }
}

/////////////////////////////////////////// run_benchmark //////////////////////////////////////////

/// Run one benchmark with the engine's state under `path`, writing records to `output`.
///
/// The caller owns `path`: it should be fresh, and nothing here removes it.
pub fn run_benchmark<W: Write>(
    config: &BenchmarkConfig,
    path: &Path,
    output: W,
) -> Result<RunSummary, Error> {
    config.validate()?;
    let kvs = config
        .backend
        .open(path, config.durability)
        .map_err(|err| match err {
            kvshim::Error::Unsupported { what } => Error::Unsupported { what },
            err => Error::BackendOpen {
                backend: config.backend,
                err,
            },
        })?;
    let workload = config.workload.name();
    let backend = config.backend.name();
    tracing::info!(
        workload,
        backend,
        version = config.backend.version(),
        items = config.items,
        value_size = config.value_size,
        pattern = %config.pattern,
        durability = %config.durability,
        seed = config.seed,
        writes = config.workload.writes(),
        "starting run"
    );
    let summary = match config.aggregate_interval {
        Some(interval) => drive(
            config,
            path,
            kvs,
            AggregateRecorder::new(output, workload, backend, interval),
        )?,
        None => drive(
            config,
            path,
            kvs,
            JsonLinesRecorder::new(output, workload, backend),
        )?,
    };
    tracing::info!(
        workload,
        backend,
        executed = summary.executed,
        failed = summary.failed,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        stop = summary.stop.name(),
        "finished run"
    );
    Ok(summary)
}

fn drive<KVS: KeyValueStore, R: Recorder>(
    config: &BenchmarkConfig,
    path: &Path,
    kvs: KVS,
    mut recorder: R,
) -> Result<RunSummary, Error> {
    recorder.setup(&Setup::new(config))?;
    let run = TimedRun::new(config.workload, config.duration);
    let result = run.run(&kvs, config.workload.operations(config), &mut recorder);
    let closed = kvs.close().map_err(|err| Error::Backend { err });
    // Measure after close so buffered writes are on disk.
    let footprint = match (&result, &closed) {
        (Ok(summary), Ok(())) => {
            let footprint = Footprint::measure(summary, path);
            tracing::info!(
                dataset_bytes = footprint.dataset_bytes,
                disk_bytes = footprint.disk_bytes,
                "measured footprint"
            );
            recorder.footprint(&footprint)
        }
        _ => Ok(()),
    };
    // Keep whatever was recorded, even when the run failed.
    let finished = recorder.finish();
    let summary = result?;
    closed?;
    footprint?;
    finished?;
    Ok(summary)
}
