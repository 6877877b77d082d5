//! kvshim provides one key-value interface over several embedded storage engines.
//!
//! Every engine sits behind the [KeyValueStore] trait and every engine error is normalized into
//! the same [Error] taxonomy.  [Backend] is the closed set of engines compiled into this build;
//! [Backend::open] returns a [Store] that dispatches to exactly one of them.

use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;

use biometrics::{Collector, Counter};

#[cfg(feature = "reference")]
pub mod reference;

#[cfg(feature = "fjall")]
pub mod fjall;
#[cfg(feature = "jammdb")]
pub mod jammdb;
#[cfg(feature = "nebari")]
pub mod nebari;
#[cfg(feature = "persy")]
pub mod persy;
#[cfg(feature = "redb")]
pub mod redb;
#[cfg(feature = "rocksdb")]
pub mod rocksdb;
#[cfg(feature = "sled")]
pub mod sled;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static OPEN: Counter = Counter::new("kvshim.open");
static OPEN_FAILED: Counter = Counter::new("kvshim.open.failed");
static DURABILITY_UPGRADED: Counter = Counter::new("kvshim.durability.upgraded");
static ERROR_IO: Counter = Counter::new("kvshim.error.io");
static ERROR_CORRUPTION: Counter = Counter::new("kvshim.error.corruption");
static ERROR_UNSUPPORTED: Counter = Counter::new("kvshim.error.unsupported");
static ERROR_OTHER: Counter = Counter::new("kvshim.error.other");

pub fn register_biometrics(collector: &Collector) {
    collector.register_counter(&OPEN);
    collector.register_counter(&OPEN_FAILED);
    collector.register_counter(&DURABILITY_UPGRADED);
    collector.register_counter(&ERROR_IO);
    collector.register_counter(&ERROR_CORRUPTION);
    collector.register_counter(&ERROR_UNSUPPORTED);
    collector.register_counter(&ERROR_OTHER);
}

/////////////////////////////////////////////// Error //////////////////////////////////////////////

/// The error taxonomy shared by every engine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    Io {
        kind: std::io::ErrorKind,
        what: String,
    },
    Corruption {
        what: String,
    },
    Unsupported {
        what: String,
    },
    Other {
        what: String,
    },
}

impl Error {
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported { what: what.into() }
    }

    pub fn other(what: impl Into<String>) -> Self {
        Self::Other { what: what.into() }
    }

    /// True when the store cannot be trusted to serve further operations.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Corruption { .. } | Error::Unsupported { .. })
    }

    /// A short, stable name for the error class.
    pub fn class(&self) -> &'static str {
        match self {
            Error::Io { .. } => "io",
            Error::Corruption { .. } => "corruption",
            Error::Unsupported { .. } => "unsupported",
            Error::Other { .. } => "other",
        }
    }

    fn click(&self) {
        match self {
            Error::Io { .. } => ERROR_IO.click(),
            Error::Corruption { .. } => ERROR_CORRUPTION.click(),
            Error::Unsupported { .. } => ERROR_UNSUPPORTED.click(),
            Error::Other { .. } => ERROR_OTHER.click(),
        }
    }
}

impl Display for Error {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Error::Io { kind, what } => write!(fmt, "io error ({:?}): {}", kind, what),
            Error::Corruption { what } => write!(fmt, "corruption: {}", what),
            Error::Unsupported { what } => write!(fmt, "unsupported: {}", what),
            Error::Other { what } => write!(fmt, "{}", what),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            what: err.to_string(),
        }
    }
}

//////////////////////////////////////////// Durability ////////////////////////////////////////////

/// When a write may be acknowledged.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Durability {
    /// The engine may hold the write in memory and make it durable later.
    #[default]
    Buffered,
    /// The write is durable before `put` or `del` returns.
    ForcedSync,
}

impl Durability {
    pub fn name(&self) -> &'static str {
        match self {
            Durability::Buffered => "buffered",
            Durability::ForcedSync => "forced-sync",
        }
    }
}

impl Display for Durability {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(fmt, "{}", self.name())
    }
}

/////////////////////////////////////////// Capabilities ///////////////////////////////////////////

/// What an engine binding can do.  Checked before a run, never discovered mid-run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Capabilities {
    pub range_scan: bool,
    pub forced_sync: bool,
    pub buffered: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        range_scan: true,
        forced_sync: true,
        buffered: true,
    };

    pub fn supports(&self, durability: Durability) -> bool {
        match durability {
            Durability::Buffered => self.buffered,
            Durability::ForcedSync => self.forced_sync,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::ALL
    }
}

/////////////////////////////////////////// KeyValueStore //////////////////////////////////////////

/// The adapter contract.
///
/// Writes made under [Durability::ForcedSync] must be durable when `put` or `del` returns.
pub trait KeyValueStore {
    fn capabilities(&self) -> Capabilities;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error>;
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error>;
    fn del(&self, key: &[u8]) -> Result<(), Error>;

    /// Visit up to `limit` entries with keys at or after `start`, returning how many were seen.
    fn scan(&self, start: &[u8], limit: usize) -> Result<usize, Error> {
        let _ = (start, limit);
        Err(Error::unsupported("range scan"))
    }

    /// Make every acknowledged write durable.
    fn sync(&self) -> Result<(), Error>;

    fn close(self) -> Result<(), Error>
    where
        Self: Sized,
    {
        self.sync()
    }
}

////////////////////////////////////////////// Backend /////////////////////////////////////////////

/// The closed set of engines compiled into this build.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Backend {
    #[cfg(feature = "reference")]
    Memory,
    #[cfg(feature = "sled")]
    Sled,
    #[cfg(feature = "fjall")]
    Fjall,
    #[cfg(feature = "persy")]
    Persy,
    #[cfg(feature = "jammdb")]
    JammDb,
    #[cfg(feature = "redb")]
    Redb,
    #[cfg(feature = "nebari")]
    Nebari,
    #[cfg(feature = "rocksdb")]
    RocksDb,
}

impl Backend {
    pub const ALL: &'static [Backend] = &[
        #[cfg(feature = "reference")]
        Backend::Memory,
        #[cfg(feature = "sled")]
        Backend::Sled,
        #[cfg(feature = "fjall")]
        Backend::Fjall,
        #[cfg(feature = "persy")]
        Backend::Persy,
        #[cfg(feature = "jammdb")]
        Backend::JammDb,
        #[cfg(feature = "redb")]
        Backend::Redb,
        #[cfg(feature = "nebari")]
        Backend::Nebari,
        #[cfg(feature = "rocksdb")]
        Backend::RocksDb,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "reference")]
            Backend::Memory => "memory",
            #[cfg(feature = "sled")]
            Backend::Sled => "sled",
            #[cfg(feature = "fjall")]
            Backend::Fjall => "fjall",
            #[cfg(feature = "persy")]
            Backend::Persy => "persy",
            #[cfg(feature = "jammdb")]
            Backend::JammDb => "jammdb",
            #[cfg(feature = "redb")]
            Backend::Redb => "redb",
            #[cfg(feature = "nebari")]
            Backend::Nebari => "nebari",
            #[cfg(feature = "rocksdb")]
            Backend::RocksDb => "rocksdb",
        }
    }

    /// The version of the engine crate this build links against.
    pub fn version(&self) -> &'static str {
        match self {
            #[cfg(feature = "reference")]
            Backend::Memory => env!("CARGO_PKG_VERSION"),
            #[cfg(feature = "sled")]
            Backend::Sled => crate::sled::VERSION,
            #[cfg(feature = "fjall")]
            Backend::Fjall => crate::fjall::VERSION,
            #[cfg(feature = "persy")]
            Backend::Persy => crate::persy::VERSION,
            #[cfg(feature = "jammdb")]
            Backend::JammDb => crate::jammdb::VERSION,
            #[cfg(feature = "redb")]
            Backend::Redb => crate::redb::VERSION,
            #[cfg(feature = "nebari")]
            Backend::Nebari => crate::nebari::VERSION,
            #[cfg(feature = "rocksdb")]
            Backend::RocksDb => crate::rocksdb::VERSION,
        }
    }

    /// Capabilities of the engine, known without opening it.
    pub fn capabilities(&self) -> Capabilities {
        match self {
            #[cfg(feature = "reference")]
            Backend::Memory => Capabilities::ALL,
            #[cfg(feature = "sled")]
            Backend::Sled => crate::sled::CAPABILITIES,
            #[cfg(feature = "fjall")]
            Backend::Fjall => crate::fjall::CAPABILITIES,
            #[cfg(feature = "persy")]
            Backend::Persy => crate::persy::CAPABILITIES,
            #[cfg(feature = "jammdb")]
            Backend::JammDb => crate::jammdb::CAPABILITIES,
            #[cfg(feature = "redb")]
            Backend::Redb => crate::redb::CAPABILITIES,
            #[cfg(feature = "nebari")]
            Backend::Nebari => crate::nebari::CAPABILITIES,
            #[cfg(feature = "rocksdb")]
            Backend::RocksDb => crate::rocksdb::CAPABILITIES,
        }
    }

    /// Open the engine with its state under `path`.
    ///
    /// An engine that cannot buffer writes is opened with the stronger [Durability::ForcedSync].
    pub fn open(&self, path: &Path, durability: Durability) -> Result<Store, Error> {
        let capabilities = self.capabilities();
        let durability = if capabilities.supports(durability) {
            durability
        } else if durability == Durability::Buffered && capabilities.forced_sync {
            DURABILITY_UPGRADED.click();
            tracing::warn!(
                backend = self.name(),
                "engine cannot buffer writes; opening with forced-sync durability"
            );
            Durability::ForcedSync
        } else {
            OPEN_FAILED.click();
            return Err(Error::unsupported(format!(
                "{} does not offer {} durability",
                self.name(),
                durability
            )));
        };
        let store = match self {
            #[cfg(feature = "reference")]
            Backend::Memory => Ok(Store::Memory(reference::KeyValueStore::new(durability))),
            #[cfg(feature = "sled")]
            Backend::Sled => crate::sled::KeyValueStore::open(path, durability).map(Store::Sled),
            #[cfg(feature = "fjall")]
            Backend::Fjall => {
                crate::fjall::KeyValueStore::open(path, durability).map(Store::Fjall)
            }
            #[cfg(feature = "persy")]
            Backend::Persy => {
                crate::persy::KeyValueStore::open(path, durability).map(Store::Persy)
            }
            #[cfg(feature = "jammdb")]
            Backend::JammDb => {
                crate::jammdb::KeyValueStore::open(path, durability).map(Store::JammDb)
            }
            #[cfg(feature = "redb")]
            Backend::Redb => crate::redb::KeyValueStore::open(path, durability).map(Store::Redb),
            #[cfg(feature = "nebari")]
            Backend::Nebari => {
                crate::nebari::KeyValueStore::open(path, durability).map(Store::Nebari)
            }
            #[cfg(feature = "rocksdb")]
            Backend::RocksDb => {
                crate::rocksdb::KeyValueStore::open(path, durability).map(Store::RocksDb)
            }
        };
        match &store {
            Ok(_) => {
                OPEN.click();
                tracing::info!(backend = self.name(), %durability, path = %path.display(), "opened store");
            }
            Err(err) => {
                OPEN_FAILED.click();
                tracing::error!(backend = self.name(), error = %err, "could not open store");
            }
        }
        store
    }
}

impl Display for Backend {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(fmt, "{}", self.name())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        for backend in Backend::ALL {
            if backend.name() == lower {
                return Ok(*backend);
            }
        }
        Err(format!(
            "unknown backend {:?}; this build knows {}",
            s,
            Backend::ALL
                .iter()
                .map(Backend::name)
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }
}

/////////////////////////////////////////////// Store //////////////////////////////////////////////

/// One open engine.
pub enum Store {
    #[cfg(feature = "reference")]
    Memory(reference::KeyValueStore),
    #[cfg(feature = "sled")]
    Sled(crate::sled::KeyValueStore),
    #[cfg(feature = "fjall")]
    Fjall(crate::fjall::KeyValueStore),
    #[cfg(feature = "persy")]
    Persy(crate::persy::KeyValueStore),
    #[cfg(feature = "jammdb")]
    JammDb(crate::jammdb::KeyValueStore),
    #[cfg(feature = "redb")]
    Redb(crate::redb::KeyValueStore),
    #[cfg(feature = "nebari")]
    Nebari(crate::nebari::KeyValueStore),
    #[cfg(feature = "rocksdb")]
    RocksDb(crate::rocksdb::KeyValueStore),
}

macro_rules! dispatch {
    ($store:expr, $kvs:ident => $body:expr) => {
        match $store {
            #[cfg(feature = "reference")]
            Store::Memory($kvs) => $body,
            #[cfg(feature = "sled")]
            Store::Sled($kvs) => $body,
            #[cfg(feature = "fjall")]
            Store::Fjall($kvs) => $body,
            #[cfg(feature = "persy")]
            Store::Persy($kvs) => $body,
            #[cfg(feature = "jammdb")]
            Store::JammDb($kvs) => $body,
            #[cfg(feature = "redb")]
            Store::Redb($kvs) => $body,
            #[cfg(feature = "nebari")]
            Store::Nebari($kvs) => $body,
            #[cfg(feature = "rocksdb")]
            Store::RocksDb($kvs) => $body,
        }
    };
}

impl Store {
    pub fn backend(&self) -> Backend {
        match self {
            #[cfg(feature = "reference")]
            Store::Memory(_) => Backend::Memory,
            #[cfg(feature = "sled")]
            Store::Sled(_) => Backend::Sled,
            #[cfg(feature = "fjall")]
            Store::Fjall(_) => Backend::Fjall,
            #[cfg(feature = "persy")]
            Store::Persy(_) => Backend::Persy,
            #[cfg(feature = "jammdb")]
            Store::JammDb(_) => Backend::JammDb,
            #[cfg(feature = "redb")]
            Store::Redb(_) => Backend::Redb,
            #[cfg(feature = "nebari")]
            Store::Nebari(_) => Backend::Nebari,
            #[cfg(feature = "rocksdb")]
            Store::RocksDb(_) => Backend::RocksDb,
        }
    }
}

fn observe<T>(result: Result<T, Error>) -> Result<T, Error> {
    if let Err(err) = &result {
        err.click();
    }
    result
}

impl KeyValueStore for Store {
    fn capabilities(&self) -> Capabilities {
        dispatch!(self, kvs => kvs.capabilities())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        observe(dispatch!(self, kvs => kvs.put(key, value)))
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        observe(dispatch!(self, kvs => kvs.get(key)))
    }

    fn del(&self, key: &[u8]) -> Result<(), Error> {
        observe(dispatch!(self, kvs => kvs.del(key)))
    }

    fn scan(&self, start: &[u8], limit: usize) -> Result<usize, Error> {
        observe(dispatch!(self, kvs => kvs.scan(start, limit)))
    }

    fn sync(&self) -> Result<(), Error> {
        observe(dispatch!(self, kvs => kvs.sync()))
    }

    fn close(self) -> Result<(), Error> {
        observe(dispatch!(self, kvs => kvs.close()))
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
