//! The timed run loop.
//!
//! Operations are issued one at a time, in stream order, against a single store.  Only the call
//! into the store sits between the two clock readings; building the operation and recording the
//! sample happen outside the timed region.
//!
//! The duration cap covers the whole run of a bounded workload.  For workloads with a
//! steady-state mix it covers only the steady state, so a slow preload cannot starve the mix.

use std::time::{Duration, Instant};

use kvshim::KeyValueStore;

use crate::metrics;
use crate::recorder::Recorder;
use crate::workload::{Operation, OperationKind, Phase, Workload};
use crate::Error;

////////////////////////////////////////////// Sample //////////////////////////////////////////////

/// The observation of one executed operation.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub seq: u64,
    pub phase: Phase,
    pub kind: OperationKind,
    /// Offset of issuance from the start of the run.
    pub issued: Duration,
    pub latency: Duration,
    pub ok: bool,
    /// For fetches, whether the key was found.
    pub hit: Option<bool>,
    /// The error, for failed operations.
    pub detail: Option<String>,
}

//////////////////////////////////////////// RunSummary ////////////////////////////////////////////

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StopReason {
    /// Every operation of the stream was executed.
    Exhausted,
    /// The duration cap was reached first.
    Duration,
}

impl StopReason {
    pub fn name(&self) -> &'static str {
        match self {
            StopReason::Exhausted => "exhausted",
            StopReason::Duration => "duration",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunSummary {
    pub executed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub elapsed: Duration,
    pub stop: StopReason,
    /// The longest latency observed.
    pub max_latency: Duration,
    /// Key and value bytes of successful inserts.
    pub dataset_bytes: u64,
    /// Key and value bytes of every successful insert and update.
    pub written_bytes: u64,
}

///////////////////////////////////////////// TimedRun /////////////////////////////////////////////

#[derive(Clone, Debug)]
pub struct TimedRun {
    workload: Workload,
    duration: Duration,
}

impl TimedRun {
    pub fn new(workload: Workload, duration: Duration) -> Self {
        Self { workload, duration }
    }

    /// Execute `ops` against `kvs` until the stream ends or the duration elapses.  For workloads
    /// with a steady-state mix the duration is counted from the first [Phase::Run] operation.
    ///
    /// A store lacking a capability the workload needs fails the run before any operation is
    /// issued.  Per-operation failures are recorded and the run continues.  A fatal failure is
    /// recorded and then ends the run with [Error::Backend].
    pub fn run<KVS, I, R>(&self, kvs: &KVS, ops: I, recorder: &mut R) -> Result<RunSummary, Error>
    where
        KVS: KeyValueStore,
        I: IntoIterator<Item = (Phase, Operation)>,
        R: Recorder,
    {
        if self.workload.requires_scan() && !kvs.capabilities().range_scan {
            return Err(Error::Unsupported {
                what: format!("workload {} needs range scans", self.workload),
            });
        }
        let mut summary = RunSummary {
            executed: 0,
            succeeded: 0,
            failed: 0,
            elapsed: Duration::ZERO,
            stop: StopReason::Exhausted,
            max_latency: Duration::ZERO,
            dataset_bytes: 0,
            written_bytes: 0,
        };
        let start = Instant::now();
        let mut deadline = if self.workload.is_bounded() {
            Some(start + self.duration)
        } else {
            None
        };
        for (phase, op) in ops {
            let now = Instant::now();
            if deadline.is_none() && phase == Phase::Run {
                deadline = Some(now + self.duration);
            }
            if deadline.map(|d| now >= d).unwrap_or(false) {
                summary.stop = StopReason::Duration;
                break;
            }
            let issued = now.duration_since(start);
            let kind = op.kind();
            let bytes = op.payload_len() as u64;
            let op_start = Instant::now();
            let result = execute(kvs, &op);
            let latency = op_start.elapsed();
            let (ok, hit, err) = match result {
                Ok(hit) => (true, hit, None),
                Err(err) => (false, None, Some(err)),
            };
            let sample = Sample {
                seq: summary.executed,
                phase,
                kind,
                issued,
                latency,
                ok,
                hit,
                detail: err.as_ref().map(|e| e.to_string()),
            };
            summary.executed += 1;
            summary.max_latency = summary.max_latency.max(latency);
            if ok {
                summary.succeeded += 1;
                if kind == OperationKind::Insert {
                    summary.dataset_bytes += bytes;
                }
                summary.written_bytes += bytes;
            } else {
                summary.failed += 1;
            }
            metrics::observe(&sample);
            recorder.record(&sample)?;
            if let Some(err) = err {
                if err.is_fatal() {
                    tracing::error!(seq = sample.seq, op = %kind, error = %err, "fatal backend error");
                    return Err(Error::Backend { err });
                }
                tracing::debug!(seq = sample.seq, op = %kind, error = %err, "operation failed");
            }
        }
        summary.elapsed = start.elapsed();
        metrics::stopped(summary.stop);
        Ok(summary)
    }
}

/// Issue one operation.  Fetches report whether they found the key.
fn execute<KVS: KeyValueStore>(kvs: &KVS, op: &Operation) -> Result<Option<bool>, kvshim::Error> {
    match op {
        Operation::Insert { key, value } | Operation::Update { key, value } => {
            kvs.put(key, value).map(|_| None)
        }
        Operation::Fetch { key } => kvs.get(key).map(|v| Some(v.is_some())),
        Operation::Delete { key } => kvs.del(key).map(|_| None),
        Operation::Scan { start, limit } => kvs.scan(start, *limit).map(|_| None),
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use kvshim::reference::{Call, KeyValueStore as Reference};
    use kvshim::{Backend, Capabilities, Durability};

    use super::*;
    use crate::config::BenchmarkConfig;

    #[derive(Default)]
    struct Collect {
        samples: Vec<Sample>,
        finished: bool,
    }

    impl Recorder for Collect {
        fn record(&mut self, sample: &Sample) -> Result<(), Error> {
            self.samples.push(sample.clone());
            Ok(())
        }

        fn finish(&mut self) -> Result<(), Error> {
            self.finished = true;
            Ok(())
        }
    }

    fn config(workload: Workload, items: u64) -> BenchmarkConfig {
        let mut config = BenchmarkConfig::new(workload, Backend::Memory);
        config.items = items;
        config.value_size = 8;
        config
    }

    #[test]
    fn read_after_write_against_reference() {
        let config = config(Workload::ReadAfterWrite, 10);
        let kvs = Reference::new(Durability::Buffered);
        let mut recorder = Collect::default();
        let summary = TimedRun::new(config.workload, config.duration)
            .run(&kvs, config.workload.operations(&config), &mut recorder)
            .unwrap();
        assert_eq!(20, summary.executed);
        assert_eq!(20, summary.succeeded);
        assert_eq!(StopReason::Exhausted, summary.stop);
        assert_eq!(20, recorder.samples.len());
        assert!(recorder.samples.iter().all(|s| s.ok));
        for (i, sample) in recorder.samples.iter().enumerate() {
            assert_eq!(i as u64, sample.seq);
            if i < 10 {
                assert_eq!(OperationKind::Insert, sample.kind);
            } else {
                assert_eq!(OperationKind::Fetch, sample.kind);
                assert_eq!(Some(true), sample.hit);
            }
        }
        let calls = kvs.calls();
        assert_eq!(20, calls.len());
        for (i, call) in calls.iter().enumerate() {
            let key = (i as u64 % 10).to_be_bytes().to_vec();
            if i < 10 {
                assert!(matches!(call, Call::Put { key: k, .. } if *k == key));
            } else {
                assert_eq!(Call::Get { key }, *call);
            }
        }
    }

    #[test]
    fn samples_are_ordered_by_issuance() {
        let config = config(Workload::Load, 100);
        let kvs = Reference::new(Durability::Buffered);
        let mut recorder = Collect::default();
        TimedRun::new(config.workload, config.duration)
            .run(&kvs, config.workload.operations(&config), &mut recorder)
            .unwrap();
        for pair in recorder.samples.windows(2) {
            assert!(pair[0].issued <= pair[1].issued);
            assert!(pair[0].seq < pair[1].seq);
        }
    }

    #[test]
    fn forced_sync_precedes_every_acknowledgement() {
        let mut config = config(Workload::InsertDelete, 25);
        config.durability = Durability::ForcedSync;
        let kvs = Reference::new(config.durability);
        let mut recorder = Collect::default();
        TimedRun::new(config.workload, config.duration)
            .run(&kvs, config.workload.operations(&config), &mut recorder)
            .unwrap();
        let calls = kvs.calls();
        let writes = calls.iter().filter(|c| c.is_write()).count();
        assert_eq!(50, writes);
        for (i, call) in calls.iter().enumerate() {
            if call.is_write() {
                assert_eq!(Some(&Call::Sync), calls.get(i + 1), "call {} not synced", i);
            }
        }
    }

    #[test]
    fn unsupported_aborts_before_any_sample() {
        let config = config(Workload::ScanLatest, 10);
        let kvs = Reference::new(Durability::Buffered).with_capabilities(Capabilities {
            range_scan: false,
            ..Capabilities::ALL
        });
        let mut recorder = Collect::default();
        let result = TimedRun::new(config.workload, config.duration).run(
            &kvs,
            config.workload.operations(&config),
            &mut recorder,
        );
        assert!(matches!(result, Err(Error::Unsupported { .. })));
        assert!(recorder.samples.is_empty());
        assert!(kvs.calls().is_empty());
    }

    #[test]
    fn failures_are_recorded_and_the_run_continues() {
        let config = config(Workload::Load, 10);
        let kvs = Reference::new(Durability::Buffered);
        kvs.fail_on(&3u64.to_be_bytes(), kvshim::Error::other("injected"));
        kvs.fail_on(
            &7u64.to_be_bytes(),
            kvshim::Error::Io {
                kind: std::io::ErrorKind::Other,
                what: "disk".to_string(),
            },
        );
        let mut recorder = Collect::default();
        let summary = TimedRun::new(config.workload, config.duration)
            .run(&kvs, config.workload.operations(&config), &mut recorder)
            .unwrap();
        assert_eq!(10, summary.executed);
        assert_eq!(8, summary.succeeded);
        assert_eq!(2, summary.failed);
        assert_eq!(10, recorder.samples.len());
        assert!(!recorder.samples[3].ok);
        assert_eq!(Some("injected".to_string()), recorder.samples[3].detail);
        assert!(!recorder.samples[7].ok);
        assert_eq!(8, kvs.len());
    }

    #[test]
    fn fatal_errors_end_the_run_after_recording() {
        let config = config(Workload::Load, 10);
        let kvs = Reference::new(Durability::Buffered);
        kvs.fail_on(
            &4u64.to_be_bytes(),
            kvshim::Error::Corruption {
                what: "bad page".to_string(),
            },
        );
        let mut recorder = Collect::default();
        let result = TimedRun::new(config.workload, config.duration).run(
            &kvs,
            config.workload.operations(&config),
            &mut recorder,
        );
        assert!(matches!(result, Err(Error::Backend { .. })));
        assert_eq!(5, recorder.samples.len());
        assert!(!recorder.samples[4].ok);
    }

    #[test]
    fn duration_caps_unbounded_workloads() {
        let mut config = config(Workload::ReadOnly, 100);
        config.duration = Duration::from_millis(50);
        let kvs = Reference::new(Durability::Buffered);
        let mut recorder = Collect::default();
        let start = Instant::now();
        let summary = TimedRun::new(config.workload, config.duration)
            .run(&kvs, config.workload.operations(&config), &mut recorder)
            .unwrap();
        let wall = start.elapsed();
        assert_eq!(StopReason::Duration, summary.stop);
        assert!(summary.executed > 100);
        assert!(summary.elapsed >= config.duration);
        assert!(wall >= config.duration);
        assert_eq!(100 * 16, summary.dataset_bytes);
    }

    #[test]
    fn preload_does_not_count_against_the_duration() {
        let mut config = config(Workload::ReadOnly, 100_000);
        config.duration = Duration::from_millis(1);
        let kvs = Reference::new(Durability::Buffered);
        let mut recorder = Collect::default();
        let summary = TimedRun::new(config.workload, config.duration)
            .run(&kvs, config.workload.operations(&config), &mut recorder)
            .unwrap();
        assert_eq!(StopReason::Duration, summary.stop);
        let loaded = recorder
            .samples
            .iter()
            .filter(|s| s.phase == Phase::Load)
            .count();
        let steady = recorder
            .samples
            .iter()
            .filter(|s| s.phase == Phase::Run)
            .count();
        assert_eq!(100_000, loaded);
        assert!(steady > 0);
        let first_run = recorder
            .samples
            .iter()
            .find(|s| s.phase == Phase::Run)
            .unwrap();
        assert!(first_run.issued > config.duration);
    }

    #[test]
    fn bounded_workloads_cap_the_whole_run() {
        let mut config = config(Workload::ReadAfterWrite, 1_000_000);
        config.duration = Duration::from_millis(10);
        let kvs = Reference::new(Durability::Buffered);
        let mut recorder = Collect::default();
        let summary = TimedRun::new(config.workload, config.duration)
            .run(&kvs, config.workload.operations(&config), &mut recorder)
            .unwrap();
        assert_eq!(StopReason::Duration, summary.stop);
        assert!(summary.executed < 2_000_000);
        assert!(recorder.samples.last().unwrap().issued < config.duration);
    }

    #[test]
    fn bytes_are_counted_for_successful_writes() {
        let mut config = config(Workload::UpdateHeavy, 10);
        config.operations = Some(100);
        let kvs = Reference::new(Durability::Buffered);
        let mut recorder = Collect::default();
        let summary = TimedRun::new(config.workload, config.duration)
            .run(&kvs, config.workload.operations(&config), &mut recorder)
            .unwrap();
        let updates = recorder
            .samples
            .iter()
            .filter(|s| s.kind == OperationKind::Update)
            .count() as u64;
        assert_eq!(10 * 16, summary.dataset_bytes);
        assert_eq!((10 + updates) * 16, summary.written_bytes);
    }
}
