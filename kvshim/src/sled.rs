use std::path::Path;

use super::{Capabilities, Durability, Error};

pub const VERSION: &str = "0.34";

pub const CAPABILITIES: Capabilities = Capabilities::ALL;

/// Background flush interval when writes are buffered.
const FLUSH_EVERY_MS: u64 = 1_000;

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Io(err) => err.into(),
            sled::Error::Corruption { .. } => Error::Corruption {
                what: err.to_string(),
            },
            sled::Error::Unsupported(what) => Error::Unsupported { what },
            err => Error::Other {
                what: err.to_string(),
            },
        }
    }
}

/////////////////////////////////////////// KeyValueStore //////////////////////////////////////////

pub struct KeyValueStore {
    db: sled::Db,
    durability: Durability,
}

impl KeyValueStore {
    pub fn open(path: &Path, durability: Durability) -> Result<Self, Error> {
        let flush_every_ms = match durability {
            Durability::Buffered => Some(FLUSH_EVERY_MS),
            Durability::ForcedSync => None,
        };
        let db = sled::Config::new()
            .path(path)
            .flush_every_ms(flush_every_ms)
            .open()?;
        Ok(Self { db, durability })
    }

    fn after_write(&self) -> Result<(), Error> {
        if self.durability == Durability::ForcedSync {
            self.db.flush()?;
        }
        Ok(())
    }
}

impl super::KeyValueStore for KeyValueStore {
    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.db.insert(key, value)?;
        self.after_write()
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }

    fn del(&self, key: &[u8]) -> Result<(), Error> {
        self.db.remove(key)?;
        self.after_write()
    }

    fn scan(&self, start: &[u8], limit: usize) -> Result<usize, Error> {
        let mut count = 0;
        for kvp in self.db.range(start.to_vec()..).take(limit) {
            kvp?;
            count += 1;
        }
        Ok(count)
    }

    fn sync(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }
}
