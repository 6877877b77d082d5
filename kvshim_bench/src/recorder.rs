//! Turning samples into the JSON-lines record stream.
//!
//! Every run opens with one `setup` record describing its configuration, so runs appended to the
//! same file can be told apart.  A `footprint` record closes a run that completed.
//!
//! Both recorders hold a bounded amount of state no matter how long the run: the per-sample
//! recorder holds at most one batch of unflushed records and the aggregating recorder holds one
//! window of statistics per operation kind.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::config::BenchmarkConfig;
use crate::runner::{RunSummary, Sample};
use crate::workload::OperationKind;
use crate::Error;

/// Records written between explicit flushes.
pub const DEFAULT_BATCH: usize = 1024;

/////////////////////////////////////////// ResultRecord ///////////////////////////////////////////

/// One line of output.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultRecord<'a> {
    Sample {
        workload: &'a str,
        backend: &'a str,
        phase: &'a str,
        op: &'a str,
        seq: u64,
        time_micros: u64,
        latency_nanos: u64,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        hit: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<&'a str>,
    },
    Setup {
        workload: &'a str,
        backend: &'a str,
        version: &'a str,
        items: u64,
        value_size: usize,
        pattern: &'a str,
        durability: &'a str,
        values: &'a str,
        seed: u64,
        zipf_theta: f64,
        scan_length: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        operations: Option<u64>,
        duration_micros: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        aggregate_interval_micros: Option<u64>,
        start_unix_micros: u64,
    },
    Aggregate {
        workload: &'a str,
        backend: &'a str,
        op: &'a str,
        time_micros: u64,
        interval_micros: u64,
        count: u64,
        failures: u64,
        min_latency_nanos: u64,
        max_latency_nanos: u64,
        mean_latency_nanos: u64,
    },
    Footprint {
        workload: &'a str,
        backend: &'a str,
        time_micros: u64,
        dataset_bytes: u64,
        written_bytes: u64,
        disk_bytes: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        space_amp: Option<f64>,
    },
}

impl<'a> ResultRecord<'a> {
    fn setup(setup: &Setup<'a>) -> Self {
        let config = setup.config;
        ResultRecord::Setup {
            workload: config.workload.name(),
            backend: config.backend.name(),
            version: config.backend.version(),
            items: config.items,
            value_size: config.value_size,
            pattern: config.pattern.name(),
            durability: config.durability.name(),
            values: config.values.name(),
            seed: config.seed,
            zipf_theta: config.zipf_theta,
            scan_length: config.scan_length,
            operations: config.operations,
            duration_micros: micros(config.duration),
            aggregate_interval_micros: config.aggregate_interval.map(micros),
            start_unix_micros: setup.start_unix_micros,
        }
    }

    fn footprint(workload: &'a str, backend: &'a str, footprint: &Footprint) -> Self {
        ResultRecord::Footprint {
            workload,
            backend,
            time_micros: micros(footprint.elapsed),
            dataset_bytes: footprint.dataset_bytes,
            written_bytes: footprint.written_bytes,
            disk_bytes: footprint.disk_bytes,
            space_amp: footprint.space_amp(),
        }
    }
}

fn write_record<W: Write>(output: &mut BufWriter<W>, record: &ResultRecord) -> Result<(), Error> {
    serde_json::to_writer(&mut *output, record)?;
    output.write_all(b"\n")?;
    Ok(())
}

fn micros(d: Duration) -> u64 {
    d.as_micros().try_into().unwrap_or(u64::MAX)
}

fn nanos(d: Duration) -> u64 {
    d.as_nanos().try_into().unwrap_or(u64::MAX)
}

/////////////////////////////////////////////// Setup //////////////////////////////////////////////

/// The configuration of a run and the wall-clock time it started.
#[derive(Clone, Debug)]
pub struct Setup<'a> {
    pub config: &'a BenchmarkConfig,
    pub start_unix_micros: u64,
}

impl<'a> Setup<'a> {
    pub fn new(config: &'a BenchmarkConfig) -> Self {
        let start_unix_micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(micros)
            .unwrap_or(0);
        Self {
            config,
            start_unix_micros,
        }
    }
}

///////////////////////////////////////////// Footprint ////////////////////////////////////////////

/// How much data a run stored, and how much disk the engine used to store it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Footprint {
    pub elapsed: Duration,
    pub dataset_bytes: u64,
    pub written_bytes: u64,
    pub disk_bytes: u64,
}

impl Footprint {
    /// Measure the files under `path` after a run that produced `summary`.
    pub fn measure(summary: &RunSummary, path: &Path) -> Self {
        Self {
            elapsed: summary.elapsed,
            dataset_bytes: summary.dataset_bytes,
            written_bytes: summary.written_bytes,
            disk_bytes: disk_usage(path),
        }
    }

    /// Disk bytes per byte of inserted data.
    pub fn space_amp(&self) -> Option<f64> {
        if self.dataset_bytes > 0 {
            Some(self.disk_bytes as f64 / self.dataset_bytes as f64)
        } else {
            None
        }
    }
}

/// Total size of the regular files under `path`.  Unreadable entries count as empty.
pub fn disk_usage(path: &Path) -> u64 {
    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

///////////////////////////////////////////// Recorder /////////////////////////////////////////////

pub trait Recorder {
    /// Describe the run.  Called once, before the first sample.
    fn setup(&mut self, setup: &Setup<'_>) -> Result<(), Error> {
        let _ = setup;
        Ok(())
    }

    fn record(&mut self, sample: &Sample) -> Result<(), Error>;

    /// Report what a completed run left behind.  Called at most once, after the last sample.
    fn footprint(&mut self, footprint: &Footprint) -> Result<(), Error> {
        let _ = footprint;
        Ok(())
    }

    /// Write out anything buffered.  Called once, last.
    fn finish(&mut self) -> Result<(), Error>;
}

///////////////////////////////////////// JsonLinesRecorder ////////////////////////////////////////

/// One record per sample.
pub struct JsonLinesRecorder<W: Write> {
    output: BufWriter<W>,
    workload: String,
    backend: String,
    batch: usize,
    pending: usize,
}

impl<W: Write> JsonLinesRecorder<W> {
    pub fn new(output: W, workload: &str, backend: &str) -> Self {
        Self::with_batch(output, workload, backend, DEFAULT_BATCH)
    }

    pub fn with_batch(output: W, workload: &str, backend: &str, batch: usize) -> Self {
        Self {
            output: BufWriter::new(output),
            workload: workload.to_string(),
            backend: backend.to_string(),
            batch: batch.max(1),
            pending: 0,
        }
    }

    pub fn into_inner(self) -> Result<W, Error> {
        self.output.into_inner().map_err(|err| Error::Output {
            what: err.error().to_string(),
        })
    }
}

impl<W: Write> Recorder for JsonLinesRecorder<W> {
    fn setup(&mut self, setup: &Setup<'_>) -> Result<(), Error> {
        write_record(&mut self.output, &ResultRecord::setup(setup))
    }

    fn record(&mut self, sample: &Sample) -> Result<(), Error> {
        let record = ResultRecord::Sample {
            workload: &self.workload,
            backend: &self.backend,
            phase: sample.phase.name(),
            op: sample.kind.name(),
            seq: sample.seq,
            time_micros: micros(sample.issued),
            latency_nanos: nanos(sample.latency),
            ok: sample.ok,
            hit: sample.hit,
            detail: sample.detail.as_deref(),
        };
        write_record(&mut self.output, &record)?;
        self.pending += 1;
        if self.pending >= self.batch {
            self.output.flush()?;
            self.pending = 0;
        }
        Ok(())
    }

    fn footprint(&mut self, footprint: &Footprint) -> Result<(), Error> {
        let record = ResultRecord::footprint(&self.workload, &self.backend, footprint);
        write_record(&mut self.output, &record)
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.output.flush()?;
        self.pending = 0;
        Ok(())
    }
}

///////////////////////////////////////////// KindStats ////////////////////////////////////////////

#[derive(Clone, Copy, Debug, Default)]
struct KindStats {
    count: u64,
    failures: u64,
    min: u64,
    max: u64,
    sum: u128,
}

impl KindStats {
    fn add(&mut self, latency: u64, ok: bool) {
        if self.count == 0 || latency < self.min {
            self.min = latency;
        }
        self.max = self.max.max(latency);
        self.sum += latency as u128;
        self.count += 1;
        if !ok {
            self.failures += 1;
        }
    }

    fn mean(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            (self.sum / self.count as u128) as u64
        }
    }
}

///////////////////////////////////////// AggregateRecorder ////////////////////////////////////////

/// One record per operation kind per interval.
pub struct AggregateRecorder<W: Write> {
    output: BufWriter<W>,
    workload: String,
    backend: String,
    interval: Duration,
    window: Duration,
    stats: [KindStats; 5],
}

impl<W: Write> AggregateRecorder<W> {
    pub fn new(output: W, workload: &str, backend: &str, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_micros(1));
        Self {
            output: BufWriter::new(output),
            workload: workload.to_string(),
            backend: backend.to_string(),
            interval,
            window: Duration::ZERO,
            stats: [KindStats::default(); 5],
        }
    }

    pub fn into_inner(self) -> Result<W, Error> {
        self.output.into_inner().map_err(|err| Error::Output {
            what: err.error().to_string(),
        })
    }

    fn emit_window(&mut self) -> Result<(), Error> {
        for kind in OperationKind::ALL.iter() {
            let stats = self.stats[kind.index()];
            if stats.count == 0 {
                continue;
            }
            let record = ResultRecord::Aggregate {
                workload: &self.workload,
                backend: &self.backend,
                op: kind.name(),
                time_micros: micros(self.window),
                interval_micros: micros(self.interval),
                count: stats.count,
                failures: stats.failures,
                min_latency_nanos: stats.min,
                max_latency_nanos: stats.max,
                mean_latency_nanos: stats.mean(),
            };
            write_record(&mut self.output, &record)?;
        }
        self.stats = [KindStats::default(); 5];
        self.output.flush()?;
        Ok(())
    }
}

impl<W: Write> Recorder for AggregateRecorder<W> {
    fn setup(&mut self, setup: &Setup<'_>) -> Result<(), Error> {
        write_record(&mut self.output, &ResultRecord::setup(setup))
    }

    fn record(&mut self, sample: &Sample) -> Result<(), Error> {
        if sample.issued >= self.window + self.interval {
            self.emit_window()?;
            let width = self.interval.as_nanos();
            let start = sample.issued.as_nanos() / width * width;
            self.window = Duration::from_nanos(start.try_into().unwrap_or(u64::MAX));
        }
        self.stats[sample.kind.index()].add(nanos(sample.latency), sample.ok);
        Ok(())
    }

    fn footprint(&mut self, footprint: &Footprint) -> Result<(), Error> {
        self.emit_window()?;
        let record = ResultRecord::footprint(&self.workload, &self.backend, footprint);
        write_record(&mut self.output, &record)
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.emit_window()
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::Phase;

    fn sample(seq: u64, kind: OperationKind, issued_ms: u64, latency_us: u64, ok: bool) -> Sample {
        Sample {
            seq,
            phase: Phase::Run,
            kind,
            issued: Duration::from_millis(issued_ms),
            latency: Duration::from_micros(latency_us),
            ok,
            hit: if kind == OperationKind::Fetch {
                Some(ok)
            } else {
                None
            },
            detail: if ok { None } else { Some("boom".to_string()) },
        }
    }

    fn lines(bytes: &[u8]) -> Vec<serde_json::Value> {
        std::str::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn one_line_per_sample() {
        let mut rec = JsonLinesRecorder::new(Vec::new(), "load", "memory");
        rec.record(&sample(0, OperationKind::Insert, 0, 5, true))
            .unwrap();
        rec.record(&sample(1, OperationKind::Fetch, 1, 7, false))
            .unwrap();
        rec.finish().unwrap();
        let records = lines(&rec.into_inner().unwrap());
        assert_eq!(2, records.len());
        assert_eq!("sample", records[0]["type"]);
        assert_eq!("load", records[0]["workload"]);
        assert_eq!("memory", records[0]["backend"]);
        assert_eq!("run", records[0]["phase"]);
        assert_eq!("insert", records[0]["op"]);
        assert_eq!(5_000, records[0]["latency_nanos"]);
        assert_eq!(true, records[0]["ok"]);
        assert!(records[0].get("hit").is_none());
        assert!(records[0].get("detail").is_none());
        assert_eq!(1_000, records[1]["time_micros"]);
        assert_eq!(false, records[1]["hit"]);
        assert_eq!("boom", records[1]["detail"]);
    }

    #[test]
    fn batches_flush_to_the_writer() {
        struct Counting {
            bytes: std::rc::Rc<std::cell::RefCell<Vec<u8>>>,
        }
        impl Write for Counting {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.bytes.borrow_mut().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let bytes = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut rec = JsonLinesRecorder::with_batch(
            Counting {
                bytes: bytes.clone(),
            },
            "load",
            "memory",
            4,
        );
        for seq in 0..4 {
            rec.record(&sample(seq, OperationKind::Insert, seq, 1, true))
                .unwrap();
        }
        assert_eq!(4, lines(&bytes.borrow()).len());
        rec.record(&sample(4, OperationKind::Insert, 4, 1, true))
            .unwrap();
        assert_eq!(4, lines(&bytes.borrow()).len());
        rec.finish().unwrap();
        assert_eq!(5, lines(&bytes.borrow()).len());
    }

    #[test]
    fn aggregates_per_kind_per_window() {
        let mut rec =
            AggregateRecorder::new(Vec::new(), "mixed", "memory", Duration::from_secs(1));
        rec.record(&sample(0, OperationKind::Fetch, 0, 10, true))
            .unwrap();
        rec.record(&sample(1, OperationKind::Fetch, 100, 30, false))
            .unwrap();
        rec.record(&sample(2, OperationKind::Insert, 200, 20, true))
            .unwrap();
        rec.record(&sample(3, OperationKind::Fetch, 2500, 40, true))
            .unwrap();
        rec.finish().unwrap();
        let records = lines(&rec.into_inner().unwrap());
        assert_eq!(3, records.len());
        assert_eq!("aggregate", records[0]["type"]);
        assert_eq!("insert", records[0]["op"]);
        assert_eq!(1, records[0]["count"]);
        assert_eq!("fetch", records[1]["op"]);
        assert_eq!(2, records[1]["count"]);
        assert_eq!(1, records[1]["failures"]);
        assert_eq!(10_000, records[1]["min_latency_nanos"]);
        assert_eq!(30_000, records[1]["max_latency_nanos"]);
        assert_eq!(20_000, records[1]["mean_latency_nanos"]);
        assert_eq!(0, records[1]["time_micros"]);
        assert_eq!(1_000_000, records[1]["interval_micros"]);
        assert_eq!("fetch", records[2]["op"]);
        assert_eq!(2_000_000, records[2]["time_micros"]);
        let total: u64 = records.iter().map(|r| r["count"].as_u64().unwrap()).sum();
        assert_eq!(4, total);
    }

    #[test]
    fn empty_run_writes_nothing() {
        let mut rec = AggregateRecorder::new(Vec::new(), "load", "memory", Duration::from_secs(1));
        rec.finish().unwrap();
        assert!(rec.into_inner().unwrap().is_empty());
        let mut rec = JsonLinesRecorder::new(Vec::new(), "load", "memory");
        rec.finish().unwrap();
        assert!(rec.into_inner().unwrap().is_empty());
    }

    #[test]
    fn setup_describes_the_run() {
        use kvshim::{Backend, Durability};

        use crate::config::{AccessPattern, BenchmarkConfig};
        use crate::workload::Workload;

        let mut config = BenchmarkConfig::new(Workload::ReadOnly, Backend::Memory);
        config.items = 500;
        config.value_size = 64;
        config.pattern = AccessPattern::Random;
        config.durability = Durability::ForcedSync;
        config.seed = 9;
        let mut rec = JsonLinesRecorder::new(Vec::new(), "read-only", "memory");
        rec.setup(&Setup::new(&config)).unwrap();
        rec.record(&sample(0, OperationKind::Fetch, 0, 3, true))
            .unwrap();
        rec.finish().unwrap();
        let records = lines(&rec.into_inner().unwrap());
        assert_eq!(2, records.len());
        let setup = &records[0];
        assert_eq!("setup", setup["type"]);
        assert_eq!("read-only", setup["workload"]);
        assert_eq!("memory", setup["backend"]);
        assert_eq!(500, setup["items"]);
        assert_eq!(64, setup["value_size"]);
        assert_eq!("random", setup["pattern"]);
        assert_eq!("forced-sync", setup["durability"]);
        assert_eq!("compressible", setup["values"]);
        assert_eq!(9, setup["seed"]);
        assert_eq!(60_000_000, setup["duration_micros"]);
        assert!(setup.get("operations").is_none());
        assert!(setup["start_unix_micros"].as_u64().unwrap() > 0);
        assert_eq!("sample", records[1]["type"]);
    }

    #[test]
    fn footprint_follows_the_last_window() {
        let mut rec =
            AggregateRecorder::new(Vec::new(), "load", "memory", Duration::from_secs(1));
        rec.record(&sample(0, OperationKind::Insert, 0, 10, true))
            .unwrap();
        rec.footprint(&Footprint {
            elapsed: Duration::from_millis(5),
            dataset_bytes: 100,
            written_bytes: 100,
            disk_bytes: 250,
        })
        .unwrap();
        rec.finish().unwrap();
        let records = lines(&rec.into_inner().unwrap());
        assert_eq!(2, records.len());
        assert_eq!("aggregate", records[0]["type"]);
        assert_eq!("footprint", records[1]["type"]);
        assert_eq!(5_000, records[1]["time_micros"]);
        assert_eq!(250, records[1]["disk_bytes"]);
        assert_eq!(2.5, records[1]["space_amp"]);
    }

    #[test]
    fn disk_usage_sums_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), [0u8; 100]).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("b"), [0u8; 28]).unwrap();
        assert_eq!(128, disk_usage(dir.path()));
        assert_eq!(0, disk_usage(&dir.path().join("missing")));
    }
}
