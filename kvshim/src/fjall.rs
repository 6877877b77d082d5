use std::path::Path;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};

use super::{Capabilities, Durability, Error};

pub const VERSION: &str = "2";

pub const CAPABILITIES: Capabilities = Capabilities::ALL;

const FSYNC_MS: u16 = 1_000;
const PARTITION: &str = "data";

impl From<fjall::Error> for Error {
    fn from(err: fjall::Error) -> Self {
        match err {
            fjall::Error::Io(err) => err.into(),
            err => Error::Other {
                what: err.to_string(),
            },
        }
    }
}

/////////////////////////////////////////// KeyValueStore //////////////////////////////////////////

pub struct KeyValueStore {
    keyspace: Keyspace,
    partition: PartitionHandle,
    durability: Durability,
}

impl KeyValueStore {
    pub fn open(path: &Path, durability: Durability) -> Result<Self, Error> {
        let fsync_ms = match durability {
            Durability::Buffered => Some(FSYNC_MS),
            Durability::ForcedSync => None,
        };
        let keyspace = Config::new(path).fsync_ms(fsync_ms).open()?;
        let partition = keyspace.open_partition(PARTITION, PartitionCreateOptions::default())?;
        Ok(Self {
            keyspace,
            partition,
            durability,
        })
    }

    fn after_write(&self) -> Result<(), Error> {
        if self.durability == Durability::ForcedSync {
            self.keyspace.persist(PersistMode::SyncAll)?;
        }
        Ok(())
    }
}

impl super::KeyValueStore for KeyValueStore {
    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.partition.insert(key, value)?;
        self.after_write()
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.partition.get(key)?.map(|v| v.to_vec()))
    }

    fn del(&self, key: &[u8]) -> Result<(), Error> {
        self.partition.remove(key)?;
        self.after_write()
    }

    fn scan(&self, start: &[u8], limit: usize) -> Result<usize, Error> {
        let mut count = 0;
        for kvp in self.partition.range(start.to_vec()..).take(limit) {
            kvp?;
            count += 1;
        }
        Ok(count)
    }

    fn sync(&self) -> Result<(), Error> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}
