//! Process biometrics for benchmark runs, and an emitter that writes them as JSON lines.

use std::io::Write;

use biometrics::{Collector, Counter, Emitter, Gauge, Moments, Sensor};
use serde_json::json;

use crate::runner::{Sample, StopReason};
use crate::workload::OperationKind;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static INSERT: Counter = Counter::new("kvshim_bench.requests.insert");
static UPDATE: Counter = Counter::new("kvshim_bench.requests.update");
static FETCH: Counter = Counter::new("kvshim_bench.requests.fetch");
static DELETE: Counter = Counter::new("kvshim_bench.requests.delete");
static SCAN: Counter = Counter::new("kvshim_bench.requests.scan");

static INSERT_LATENCY: Moments = Moments::new("kvshim_bench.requests.insert_latency_micros");
static UPDATE_LATENCY: Moments = Moments::new("kvshim_bench.requests.update_latency_micros");
static FETCH_LATENCY: Moments = Moments::new("kvshim_bench.requests.fetch_latency_micros");
static DELETE_LATENCY: Moments = Moments::new("kvshim_bench.requests.delete_latency_micros");
static SCAN_LATENCY: Moments = Moments::new("kvshim_bench.requests.scan_latency_micros");

static FAILED: Counter = Counter::new("kvshim_bench.requests.failed");
static FETCH_MISS: Counter = Counter::new("kvshim_bench.requests.fetch_miss");

static STOP_EXHAUSTED: Counter = Counter::new("kvshim_bench.stop.exhausted");
static STOP_DURATION: Counter = Counter::new("kvshim_bench.stop.duration");

pub fn register_biometrics(collector: &Collector) {
    collector.register_counter(&INSERT);
    collector.register_counter(&UPDATE);
    collector.register_counter(&FETCH);
    collector.register_counter(&DELETE);
    collector.register_counter(&SCAN);
    collector.register_moments(&INSERT_LATENCY);
    collector.register_moments(&UPDATE_LATENCY);
    collector.register_moments(&FETCH_LATENCY);
    collector.register_moments(&DELETE_LATENCY);
    collector.register_moments(&SCAN_LATENCY);
    collector.register_counter(&FAILED);
    collector.register_counter(&FETCH_MISS);
    collector.register_counter(&STOP_EXHAUSTED);
    collector.register_counter(&STOP_DURATION);
}

pub(crate) fn observe(sample: &Sample) {
    let (counter, moments) = match sample.kind {
        OperationKind::Insert => (&INSERT, &INSERT_LATENCY),
        OperationKind::Update => (&UPDATE, &UPDATE_LATENCY),
        OperationKind::Fetch => (&FETCH, &FETCH_LATENCY),
        OperationKind::Delete => (&DELETE, &DELETE_LATENCY),
        OperationKind::Scan => (&SCAN, &SCAN_LATENCY),
    };
    counter.click();
    moments.add(sample.latency.as_secs_f64() * 1_000_000.0);
    if !sample.ok {
        FAILED.click();
    }
    if sample.hit == Some(false) {
        FETCH_MISS.click();
    }
}

pub(crate) fn stopped(reason: StopReason) {
    match reason {
        StopReason::Exhausted => STOP_EXHAUSTED.click(),
        StopReason::Duration => STOP_DURATION.click(),
    }
}

//////////////////////////////////////////// JsonEmitter ///////////////////////////////////////////

/// An emitter that writes one JSON object per reading.
///
/// Times are reported relative to the first emission, in milliseconds.
pub struct JsonEmitter<W: Write> {
    output: W,
    offset: Option<u64>,
}

impl<W: Write> JsonEmitter<W> {
    pub fn new(output: W) -> Self {
        Self {
            output,
            offset: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.output
    }

    fn offset(&mut self, now: u64) -> u64 {
        let offset = *self.offset.get_or_insert(now);
        now.saturating_sub(offset)
    }

    fn line(&mut self, value: serde_json::Value) -> Result<(), std::io::Error> {
        serde_json::to_writer(&mut self.output, &value)?;
        self.output.write_all(b"\n")
    }
}

impl<W: Write> Emitter for JsonEmitter<W> {
    type Error = std::io::Error;

    fn emit_counter(&mut self, counter: &'static Counter, now: u64) -> Result<(), std::io::Error> {
        let time_millis = self.offset(now);
        self.line(json!({
            "type": "counter",
            "label": counter.label(),
            "time_millis": time_millis,
            "value": counter.read(),
        }))
    }

    fn emit_gauge(&mut self, gauge: &'static Gauge, now: u64) -> Result<(), std::io::Error> {
        let time_millis = self.offset(now);
        self.line(json!({
            "type": "gauge",
            "label": gauge.label(),
            "time_millis": time_millis,
            "value": gauge.read(),
        }))
    }

    fn emit_moments(&mut self, moments: &'static Moments, now: u64) -> Result<(), std::io::Error> {
        let time_millis = self.offset(now);
        let label = moments.label();
        let moments = moments.read();
        self.line(json!({
            "type": "moments",
            "label": label,
            "time_millis": time_millis,
            "n": moments.n,
            "m1": moments.m1,
            "m2": moments.m2,
            "m3": moments.m3,
            "m4": moments.m4,
        }))
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
