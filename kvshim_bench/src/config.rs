//! Configuration of one benchmark run.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

use kvshim::{Backend, Durability};

use crate::workload::Workload;
use crate::Error;

/////////////////////////////////////////// AccessPattern //////////////////////////////////////////

/// The order in which operation indices are mapped onto keys.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum AccessPattern {
    #[default]
    Sequential,
    Random,
}

impl AccessPattern {
    pub fn name(&self) -> &'static str {
        match self {
            AccessPattern::Sequential => "sequential",
            AccessPattern::Random => "random",
        }
    }
}

impl Display for AccessPattern {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(fmt, "{}", self.name())
    }
}

///////////////////////////////////////////// ValueKind ////////////////////////////////////////////

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum ValueKind {
    /// Fragments of English text.
    #[default]
    Compressible,
    /// Uniformly random bytes.
    Incompressible,
}

impl ValueKind {
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Compressible => "compressible",
            ValueKind::Incompressible => "incompressible",
        }
    }
}

////////////////////////////////////////// BenchmarkConfig /////////////////////////////////////////

/// Everything the core needs to know to execute one run.
#[derive(Clone, Debug)]
pub struct BenchmarkConfig {
    pub workload: Workload,
    pub backend: Backend,
    /// Safety cap on wall time.
    pub duration: Duration,
    /// Cardinality of the key space and the number of preloaded records.
    pub items: u64,
    pub value_size: usize,
    pub pattern: AccessPattern,
    pub durability: Durability,
    pub seed: u64,
    pub values: ValueKind,
    /// Bound on the steady-state phase of workloads that would otherwise run for the duration.
    pub operations: Option<u64>,
    pub zipf_theta: f64,
    pub scan_length: usize,
    /// Emit periodic aggregates instead of one record per operation.
    pub aggregate_interval: Option<Duration>,
}

impl BenchmarkConfig {
    pub fn new(workload: Workload, backend: Backend) -> Self {
        Self {
            workload,
            backend,
            duration: Duration::from_secs(60),
            items: 1_000_000,
            value_size: 1024,
            pattern: AccessPattern::Sequential,
            durability: Durability::Buffered,
            seed: 0,
            values: ValueKind::Compressible,
            operations: None,
            zipf_theta: 0.99,
            scan_length: 10,
            aggregate_interval: None,
        }
    }

    /// Reject configurations that cannot run, before anything touches a backend.
    pub fn validate(&self) -> Result<(), Error> {
        if self.items == 0 {
            return Err(Error::config("items must be at least 1"));
        }
        if self.items > u64::MAX / 4 {
            return Err(Error::config(format!("items={} is too large", self.items)));
        }
        if self.duration.is_zero() {
            return Err(Error::config("duration must be positive"));
        }
        if !(self.zipf_theta > 0.0 && self.zipf_theta < 1.0) {
            return Err(Error::config(format!(
                "zipf theta must be in (0, 1); got {}",
                self.zipf_theta
            )));
        }
        if self.workload.requires_scan() && self.scan_length == 0 {
            return Err(Error::config("scan length must be at least 1"));
        }
        if let Some(interval) = self.aggregate_interval {
            if interval.is_zero() {
                return Err(Error::config("aggregate interval must be positive"));
            }
        }
        if self.workload.requires_scan() && !self.backend.capabilities().range_scan {
            return Err(Error::Unsupported {
                what: format!(
                    "workload {} needs range scans and {} has none",
                    self.workload, self.backend
                ),
            });
        }
        Ok(())
    }
}

///////////////////////////////////////// BenchmarkOptions /////////////////////////////////////////

/// The command-line mirror of [BenchmarkConfig].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "command_line", derive(arrrg_derive::CommandLine))]
pub struct BenchmarkOptions {
    #[cfg_attr(
        feature = "command_line",
        arrrg(required, "Workload to run (e.g. load, read-after-write, task-a).", "NAME")
    )]
    pub workload: String,
    #[cfg_attr(
        feature = "command_line",
        arrrg(required, "Storage engine to benchmark (e.g. sled, fjall, redb).", "NAME")
    )]
    pub backend: String,
    #[cfg_attr(feature = "command_line", arrrg(optional, "Minutes to run at most."))]
    pub minutes: u64,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Number of items in the key space.")
    )]
    pub items: u64,
    #[cfg_attr(feature = "command_line", arrrg(optional, "Bytes per value."))]
    pub value_size: u64,
    #[cfg_attr(
        feature = "command_line",
        arrrg(flag, "Permute keys instead of visiting them in order.")
    )]
    pub random: bool,
    #[cfg_attr(
        feature = "command_line",
        arrrg(flag, "Make every write durable before acknowledging it.")
    )]
    pub fsync: bool,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "JSON-lines file to append records to.", "PATH")
    )]
    pub out: String,
    #[cfg_attr(feature = "command_line", arrrg(optional, "Seed for all randomness."))]
    pub seed: u64,
    #[cfg_attr(
        feature = "command_line",
        arrrg(flag, "Use random bytes instead of text for values.")
    )]
    pub incompressible: bool,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Operations in the steady-state phase (0 runs until time is up).")
    )]
    pub operations: u64,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Skew of the Zipf key choice, in (0, 1).")
    )]
    pub zipf_theta: f64,
    #[cfg_attr(feature = "command_line", arrrg(optional, "Entries visited per scan."))]
    pub scan_length: u64,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Aggregate records over this many seconds (0 writes every sample).")
    )]
    pub aggregate_secs: u64,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Directory under which engines keep their state.", "PATH")
    )]
    pub data_dir: String,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Write process biometrics to this file at exit.", "PATH")
    )]
    pub metrics: String,
}

impl BenchmarkOptions {
    pub fn try_into_config(&self) -> Result<BenchmarkConfig, Error> {
        let workload: Workload = self.workload.parse().map_err(Error::config)?;
        let backend: Backend = self.backend.parse().map_err(Error::config)?;
        let value_size = usize::try_from(self.value_size)
            .map_err(|_| Error::config(format!("value size {} is too large", self.value_size)))?;
        let scan_length = usize::try_from(self.scan_length)
            .map_err(|_| Error::config(format!("scan length {} is too large", self.scan_length)))?;
        let config = BenchmarkConfig {
            workload,
            backend,
            duration: Duration::from_secs(self.minutes.saturating_mul(60)),
            items: self.items,
            value_size,
            pattern: if self.random {
                AccessPattern::Random
            } else {
                AccessPattern::Sequential
            },
            durability: if self.fsync {
                Durability::ForcedSync
            } else {
                Durability::Buffered
            },
            seed: self.seed,
            values: if self.incompressible {
                ValueKind::Incompressible
            } else {
                ValueKind::Compressible
            },
            operations: if self.operations > 0 {
                Some(self.operations)
            } else {
                None
            },
            zipf_theta: self.zipf_theta,
            scan_length,
            aggregate_interval: if self.aggregate_secs > 0 {
                Some(Duration::from_secs(self.aggregate_secs))
            } else {
                None
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// The directory holding the chosen engine's state.
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(self.backend.to_ascii_lowercase())
    }
}

impl Default for BenchmarkOptions {
    fn default() -> Self {
        Self {
            workload: String::new(),
            backend: String::new(),
            minutes: 1,
            items: 1_000_000,
            value_size: 1024,
            random: false,
            fsync: false,
            out: "log.jsonl".to_string(),
            seed: 0,
            incompressible: false,
            operations: 0,
            zipf_theta: 0.99,
            scan_length: 10,
            aggregate_secs: 0,
            data_dir: ".data".to_string(),
            metrics: String::new(),
        }
    }
}

impl PartialEq for BenchmarkOptions {
    fn eq(&self, other: &BenchmarkOptions) -> bool {
        fn approx_eq(lhs: f64, rhs: f64) -> bool {
            lhs * 0.999 < rhs && lhs * 1.001 > rhs
        }
        self.workload == other.workload
            && self.backend == other.backend
            && self.minutes == other.minutes
            && self.items == other.items
            && self.value_size == other.value_size
            && self.random == other.random
            && self.fsync == other.fsync
            && self.out == other.out
            && self.seed == other.seed
            && self.incompressible == other.incompressible
            && self.operations == other.operations
            && approx_eq(self.zipf_theta, other.zipf_theta)
            && self.scan_length == other.scan_length
            && self.aggregate_secs == other.aggregate_secs
            && self.data_dir == other.data_dir
            && self.metrics == other.metrics
    }
}

impl Eq for BenchmarkOptions {}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
