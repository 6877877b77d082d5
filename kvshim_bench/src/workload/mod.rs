//! Workloads turn a [BenchmarkConfig] into a deterministic stream of operations.
//!
//! The stream depends only on the workload, item count, value size, access pattern, value kind
//! and seed.  It never observes the backend, so every engine sees the same operations in the
//! same order.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use guacamole::{FromGuacamole, Guacamole};

use crate::config::{BenchmarkConfig, ValueKind};
use crate::keyspace::KeySpace;

pub mod ycsb;

use ycsb::{Mix, Pick, Zipf};

/////////////////////////////////////////// OperationKind //////////////////////////////////////////

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OperationKind {
    Insert,
    Update,
    Fetch,
    Delete,
    Scan,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Insert,
        OperationKind::Update,
        OperationKind::Fetch,
        OperationKind::Delete,
        OperationKind::Scan,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Fetch => "fetch",
            OperationKind::Delete => "delete",
            OperationKind::Scan => "scan",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            OperationKind::Insert => 0,
            OperationKind::Update => 1,
            OperationKind::Fetch => 2,
            OperationKind::Delete => 3,
            OperationKind::Scan => 4,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            OperationKind::Insert | OperationKind::Update | OperationKind::Delete
        )
    }
}

impl Display for OperationKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(fmt, "{}", self.name())
    }
}

///////////////////////////////////////////// Operation ////////////////////////////////////////////

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Operation {
    Insert { key: [u8; 8], value: Vec<u8> },
    Update { key: [u8; 8], value: Vec<u8> },
    Fetch { key: [u8; 8] },
    Delete { key: [u8; 8] },
    Scan { start: [u8; 8], limit: usize },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Insert { .. } => OperationKind::Insert,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Fetch { .. } => OperationKind::Fetch,
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::Scan { .. } => OperationKind::Scan,
        }
    }

    pub fn key(&self) -> &[u8; 8] {
        match self {
            Operation::Insert { key, .. } => key,
            Operation::Update { key, .. } => key,
            Operation::Fetch { key } => key,
            Operation::Delete { key } => key,
            Operation::Scan { start, .. } => start,
        }
    }

    /// Bytes of key and value a write hands to the store.  Zero for reads and deletes.
    pub fn payload_len(&self) -> usize {
        match self {
            Operation::Insert { key, value } | Operation::Update { key, value } => {
                key.len() + value.len()
            }
            _ => 0,
        }
    }
}

/////////////////////////////////////////////// Phase //////////////////////////////////////////////

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Phase {
    /// Insert every item once.
    Load,
    /// Fetch every item once.
    Fetch,
    /// Delete every item once.
    Delete,
    /// The steady-state mix.
    Run,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Load => "load",
            Phase::Fetch => "fetch",
            Phase::Delete => "delete",
            Phase::Run => "run",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(fmt, "{}", self.name())
    }
}

///////////////////////////////////////////// Workload /////////////////////////////////////////////

/// The closed catalog of workloads.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Workload {
    /// Bulk insert of every item.
    Load,
    /// Insert every item, then fetch every item.
    ReadAfterWrite,
    /// Insert every item, then delete every item.
    InsertDelete,
    /// 50% update, 50% fetch.  A session store recording recent actions.
    UpdateHeavy,
    /// 5% update, 95% fetch.  Photo tagging.
    ReadMostly,
    /// 100% fetch.  A user profile cache.
    ReadOnly,
    /// 5% insert, 95% scan of the newest records.  User status updates.
    ScanLatest,
    /// 95% insert, 5% scan of the newest records.  Event logging.
    ScanInsertHeavy,
    /// 5% insert, 95% fetch of recent records.
    ReadLatest,
    /// 95% insert, 5% fetch of recent records.
    InsertHeavy,
    /// Fetches, scans, updates and inserts around the newest records.
    Mixed,
}

impl Workload {
    pub const ALL: [Workload; 11] = [
        Workload::Load,
        Workload::ReadAfterWrite,
        Workload::InsertDelete,
        Workload::UpdateHeavy,
        Workload::ReadMostly,
        Workload::ReadOnly,
        Workload::ScanLatest,
        Workload::ScanInsertHeavy,
        Workload::ReadLatest,
        Workload::InsertHeavy,
        Workload::Mixed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Workload::Load => "load",
            Workload::ReadAfterWrite => "read-after-write",
            Workload::InsertDelete => "insert-delete",
            Workload::UpdateHeavy => "update-heavy",
            Workload::ReadMostly => "read-mostly",
            Workload::ReadOnly => "read-only",
            Workload::ScanLatest => "scan-latest",
            Workload::ScanInsertHeavy => "scan-insert-heavy",
            Workload::ReadLatest => "read-latest",
            Workload::InsertHeavy => "insert-heavy",
            Workload::Mixed => "mixed",
        }
    }

    /// The task-style alias, for steady-state workloads.
    pub fn alias(&self) -> Option<&'static str> {
        match self {
            Workload::UpdateHeavy => Some("task-a"),
            Workload::ReadMostly => Some("task-b"),
            Workload::ReadOnly => Some("task-c"),
            Workload::ScanLatest => Some("task-d"),
            Workload::ScanInsertHeavy => Some("task-e"),
            Workload::ReadLatest => Some("task-f"),
            Workload::InsertHeavy => Some("task-g"),
            Workload::Mixed => Some("task-h"),
            _ => None,
        }
    }

    /// True when the workload ends on its own once every phase is done.
    pub fn is_bounded(&self) -> bool {
        self.mix().is_none()
    }

    pub fn requires_scan(&self) -> bool {
        self.mix().map(|m| m.scans()).unwrap_or(false)
    }

    /// True when operations after the initial load modify the store.
    pub fn writes(&self) -> bool {
        match self {
            Workload::Load | Workload::ReadAfterWrite => false,
            Workload::InsertDelete => true,
            _ => self.mix().map(|m| m.writes()).unwrap_or(false),
        }
    }

    /// The phases of the workload, in the order they run.
    pub fn phases(&self) -> &'static [Phase] {
        match self {
            Workload::Load => &[Phase::Load],
            Workload::ReadAfterWrite => &[Phase::Load, Phase::Fetch],
            Workload::InsertDelete => &[Phase::Load, Phase::Delete],
            _ => &[Phase::Load, Phase::Run],
        }
    }

    pub fn mix(&self) -> Option<Mix> {
        use OperationKind::*;
        let weights: &[(f64, OperationKind, Pick)] = match self {
            Workload::Load | Workload::ReadAfterWrite | Workload::InsertDelete => return None,
            Workload::UpdateHeavy => &[(0.5, Update, Pick::Skewed), (0.5, Fetch, Pick::Skewed)],
            Workload::ReadMostly => &[(0.05, Update, Pick::Skewed), (0.95, Fetch, Pick::Skewed)],
            Workload::ReadOnly => &[(1.0, Fetch, Pick::Skewed)],
            Workload::ScanLatest => &[(0.05, Insert, Pick::Next), (0.95, Scan, Pick::Latest)],
            Workload::ScanInsertHeavy => &[(0.95, Insert, Pick::Next), (0.05, Scan, Pick::Latest)],
            Workload::ReadLatest => &[(0.05, Insert, Pick::Next), (0.95, Fetch, Pick::Latest)],
            Workload::InsertHeavy => &[(0.95, Insert, Pick::Next), (0.05, Fetch, Pick::Latest)],
            Workload::Mixed => &[
                (0.5, Fetch, Pick::Latest),
                (0.2, Scan, Pick::Latest),
                (0.1, Update, Pick::Latest),
                (0.2, Insert, Pick::Next),
            ],
        };
        Some(Mix::new(weights))
    }

    /// The operation stream this workload issues under `config`.
    ///
    /// # Panics
    ///
    /// If `config.items` is zero.  [BenchmarkConfig::validate] rejects such configurations.
    pub fn operations(&self, config: &BenchmarkConfig) -> OperationStream {
        OperationStream::new(*self, config)
    }
}

impl Display for Workload {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(fmt, "{}", self.name())
    }
}

impl FromStr for Workload {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        for workload in Workload::ALL.iter() {
            if workload.name() == lower || workload.alias() == Some(lower.as_str()) {
                return Ok(*workload);
            }
        }
        Err(format!("unknown workload {:?}", s))
    }
}

////////////////////////////////////////// ValueGenerator //////////////////////////////////////////

const TEXT: &str = "\
Shall I compare thee to a summer's day? Thou art more lovely and more temperate: \
Rough winds do shake the darling buds of May, And summer's lease hath all too short a date; \
Sometime too hot the eye of heaven shines, And often is his gold complexion dimm'd; \
And every fair from fair sometime declines, By chance or nature's changing course untrimm'd; \
But thy eternal summer shall not fade, Nor lose possession of that fair thou ow'st; \
Nor shall death brag thou wander'st in his shade, When in eternal lines to time thou grow'st: \
So long as men can breathe or eyes can see, So long lives this, and this gives life to thee. \
Let me not to the marriage of true minds Admit impediments. Love is not love \
Which alters when it alteration finds, Or bends with the remover to remove. \
O no! it is an ever-fixed mark That looks on tempests and is never shaken; \
It is the star to every wand'ring bark, Whose worth's unknown, although his height be taken. \
Love's not Time's fool, though rosy lips and cheeks Within his bending sickle's compass come; \
Love alters not with his brief hours and weeks, But bears it out even to the edge of doom. \
If this be error and upon me prov'd, I never writ, nor no man ever lov'd. ";

/// Deterministic values of a fixed size.
#[derive(Clone, Debug)]
pub struct ValueGenerator {
    kind: ValueKind,
    size: usize,
}

impl ValueGenerator {
    pub fn new(kind: ValueKind, size: usize) -> Self {
        Self { kind, size }
    }

    pub fn generate(&self, guac: &mut Guacamole) -> Vec<u8> {
        let mut value = Vec::with_capacity(self.size);
        match self.kind {
            ValueKind::Compressible => {
                let text = TEXT.as_bytes();
                let mut offset = (u64::from_guacamole(&mut (), guac) % text.len() as u64) as usize;
                while value.len() < self.size {
                    let take = (self.size - value.len()).min(text.len() - offset);
                    value.extend_from_slice(&text[offset..offset + take]);
                    offset = 0;
                }
            }
            ValueKind::Incompressible => {
                while value.len() < self.size {
                    let word = u64::from_guacamole(&mut (), guac).to_le_bytes();
                    let take = (self.size - value.len()).min(word.len());
                    value.extend_from_slice(&word[..take]);
                }
            }
        }
        value
    }
}

////////////////////////////////////////// OperationStream /////////////////////////////////////////

/// An iterator over the `(Phase, Operation)` pairs of one run.
///
/// Bounded phases yield exactly `items` operations each, in key-space order.  The steady-state
/// phase yields operations forever unless `operations` bounds it.
pub struct OperationStream {
    keys: KeySpace,
    values: ValueGenerator,
    guac: Guacamole,
    phases: &'static [Phase],
    phase: usize,
    index: u64,
    mix: Option<Mix>,
    zipf: Zipf,
    next_insert: u64,
    remaining: Option<u64>,
    scan_length: usize,
}

impl OperationStream {
    pub fn new(workload: Workload, config: &BenchmarkConfig) -> Self {
        let keys = KeySpace::new(config.items, config.pattern, config.seed);
        let values = ValueGenerator::new(config.values, config.value_size);
        // Offset the generator so keys and choices draw from unrelated streams.
        let guac = Guacamole::new(config.seed.wrapping_add(0x9e3779b97f4a7c15));
        Self {
            keys,
            values,
            guac,
            phases: workload.phases(),
            phase: 0,
            index: 0,
            mix: workload.mix(),
            zipf: Zipf::new(config.items, config.zipf_theta),
            next_insert: config.items,
            remaining: config.operations,
            scan_length: config.scan_length,
        }
    }

    fn next_key(&mut self) -> Option<[u8; 8]> {
        if self.index < self.keys.len() {
            self.index += 1;
            Some(self.keys.key_bytes(self.index - 1))
        } else {
            None
        }
    }

    fn steady(&mut self) -> Option<Operation> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }
        let (kind, pick) = self.mix.as_ref()?.choose(&mut self.guac);
        let index = match pick {
            Pick::Next => {
                let index = self.next_insert;
                self.next_insert += 1;
                index
            }
            Pick::Skewed => self.zipf.next(&mut self.guac) - 1,
            Pick::Latest => {
                let back = self.zipf.next(&mut self.guac);
                self.next_insert.saturating_sub(back)
            }
        };
        // A scan ends on the chosen record, so even the newest one yields a full window.
        let index = if kind == OperationKind::Scan {
            index.saturating_sub(self.scan_length.saturating_sub(1) as u64)
        } else {
            index
        };
        let key = self.keys.key_bytes(index);
        Some(match kind {
            OperationKind::Insert => Operation::Insert {
                key,
                value: self.values.generate(&mut self.guac),
            },
            OperationKind::Update => Operation::Update {
                key,
                value: self.values.generate(&mut self.guac),
            },
            OperationKind::Fetch => Operation::Fetch { key },
            OperationKind::Delete => Operation::Delete { key },
            OperationKind::Scan => Operation::Scan {
                start: key,
                limit: self.scan_length,
            },
        })
    }
}

impl Iterator for OperationStream {
    type Item = (Phase, Operation);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let phase = *self.phases.get(self.phase)?;
            let op = match phase {
                Phase::Run => self.steady(),
                Phase::Load => self.next_key().map(|key| Operation::Insert {
                    key,
                    value: self.values.generate(&mut self.guac),
                }),
                Phase::Fetch => self.next_key().map(|key| Operation::Fetch { key }),
                Phase::Delete => self.next_key().map(|key| Operation::Delete { key }),
            };
            match op {
                Some(op) => return Some((phase, op)),
                None => {
                    self.phase += 1;
                    self.index = 0;
                }
            }
        }
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
