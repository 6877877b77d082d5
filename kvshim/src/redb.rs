use std::cell::Cell;
use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use super::{Capabilities, Durability, Error};

pub const VERSION: &str = "2.1";

pub const CAPABILITIES: Capabilities = Capabilities::ALL;

const TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("data");

/// Buffered writes are made durable every this many commits.
const DURABLE_EVERY: u64 = 10_000;

fn convert<E: Into<redb::Error>>(err: E) -> Error {
    match err.into() {
        redb::Error::Io(err) => err.into(),
        redb::Error::Corrupted(what) => Error::Corruption { what },
        err => Error::Other {
            what: err.to_string(),
        },
    }
}

/////////////////////////////////////////// KeyValueStore //////////////////////////////////////////

pub struct KeyValueStore {
    db: Database,
    durability: Durability,
    writes: Cell<u64>,
}

impl KeyValueStore {
    pub fn open(path: &Path, durability: Durability) -> Result<Self, Error> {
        std::fs::create_dir_all(path)?;
        let db = Database::create(path.join("data.redb")).map_err(convert)?;
        let tx = db.begin_write().map_err(convert)?;
        tx.open_table(TABLE).map_err(convert)?;
        tx.commit().map_err(convert)?;
        Ok(Self {
            db,
            durability,
            writes: Cell::new(0),
        })
    }

    fn write<F>(&self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut redb::Table<'_, &'static [u8], &'static [u8]>) -> Result<(), redb::StorageError>,
    {
        let writes = self.writes.get() + 1;
        self.writes.set(writes);
        let durable = self.durability == Durability::ForcedSync || writes % DURABLE_EVERY == 0;
        let mut tx = self.db.begin_write().map_err(convert)?;
        if durable {
            tx.set_durability(redb::Durability::Immediate);
        } else {
            tx.set_durability(redb::Durability::None);
        }
        {
            let mut table = tx.open_table(TABLE).map_err(convert)?;
            f(&mut table).map_err(convert)?;
        }
        tx.commit().map_err(convert)?;
        Ok(())
    }
}

impl super::KeyValueStore for KeyValueStore {
    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.write(|table| {
            table.insert(key, value)?;
            Ok(())
        })
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let tx = self.db.begin_read().map_err(convert)?;
        let table = tx.open_table(TABLE).map_err(convert)?;
        let value = ReadableTable::get(&table, key).map_err(convert)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn del(&self, key: &[u8]) -> Result<(), Error> {
        self.write(|table| {
            table.remove(key)?;
            Ok(())
        })
    }

    fn scan(&self, start: &[u8], limit: usize) -> Result<usize, Error> {
        let tx = self.db.begin_read().map_err(convert)?;
        let table = tx.open_table(TABLE).map_err(convert)?;
        let mut count = 0;
        for kvp in table.range::<&[u8]>(start..).map_err(convert)?.take(limit) {
            kvp.map_err(convert)?;
            count += 1;
        }
        Ok(count)
    }

    fn sync(&self) -> Result<(), Error> {
        // An empty durable commit persists every non-durable commit before it.
        let mut tx = self.db.begin_write().map_err(convert)?;
        tx.set_durability(redb::Durability::Immediate);
        tx.commit().map_err(convert)?;
        Ok(())
    }
}
