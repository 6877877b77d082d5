use std::path::Path;

use rocksdb::{Direction, ErrorKind, IteratorMode, Options, DB};

use super::{Capabilities, Durability, Error};

pub const VERSION: &str = "0.21";

pub const CAPABILITIES: Capabilities = Capabilities::ALL;

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        let what = err.to_string();
        match err.kind() {
            ErrorKind::IOError => Error::Io {
                kind: std::io::ErrorKind::Other,
                what,
            },
            ErrorKind::Corruption => Error::Corruption { what },
            ErrorKind::NotSupported => Error::Unsupported { what },
            _ => Error::Other { what },
        }
    }
}

/////////////////////////////////////////// KeyValueStore //////////////////////////////////////////

pub struct KeyValueStore {
    db: DB,
    durability: Durability,
}

impl KeyValueStore {
    pub fn open(path: &Path, durability: Durability) -> Result<Self, Error> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_manual_wal_flush(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db, durability })
    }

    fn after_write(&self) -> Result<(), Error> {
        if self.durability == Durability::ForcedSync {
            self.db.flush_wal(true)?;
        }
        Ok(())
    }
}

impl super::KeyValueStore for KeyValueStore {
    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.db.put(key, value)?;
        self.after_write()
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.db.get(key)?)
    }

    fn del(&self, key: &[u8]) -> Result<(), Error> {
        self.db.delete(key)?;
        self.after_write()
    }

    fn scan(&self, start: &[u8], limit: usize) -> Result<usize, Error> {
        let mut count = 0;
        for kvp in self
            .db
            .iterator(IteratorMode::From(start, Direction::Forward))
            .take(limit)
        {
            kvp?;
            count += 1;
        }
        Ok(count)
    }

    fn sync(&self) -> Result<(), Error> {
        self.db.flush_wal(true)?;
        Ok(())
    }
}
