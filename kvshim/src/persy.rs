use std::path::Path;

use persy::{Config, Persy, PersyId, TransactionConfig, ValueMode};

use super::{Capabilities, Durability, Error};

pub const VERSION: &str = "1.5";

/// Persy indexes are not walked in key order here, so there are no range scans.
pub const CAPABILITIES: Capabilities = Capabilities {
    range_scan: false,
    forced_sync: true,
    buffered: true,
};

const SEGMENT: &str = "data";
const INDEX: &str = "primary";

fn other<E: std::fmt::Display>(err: E) -> Error {
    Error::Other {
        what: err.to_string(),
    }
}

fn hex(key: &[u8]) -> String {
    let mut s = String::with_capacity(key.len() * 2);
    for b in key {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/////////////////////////////////////////// KeyValueStore //////////////////////////////////////////

pub struct KeyValueStore {
    persy: Persy,
    durability: Durability,
}

impl KeyValueStore {
    pub fn open(path: &Path, durability: Durability) -> Result<Self, Error> {
        std::fs::create_dir_all(path)?;
        let file = path.join("data.persy");
        let fresh = !file.exists();
        if fresh {
            Persy::create(&file).map_err(other)?;
        }
        let persy = Persy::open(&file, Config::new()).map_err(other)?;
        if fresh {
            let mut tx = persy.begin().map_err(other)?;
            tx.create_segment(SEGMENT).map_err(other)?;
            tx.create_index::<String, PersyId>(INDEX, ValueMode::Replace)
                .map_err(other)?;
            tx.prepare().map_err(other)?.commit().map_err(other)?;
        }
        Ok(Self { persy, durability })
    }

    fn begin(&self) -> Result<persy::Transaction, Error> {
        let background = self.durability == Durability::Buffered;
        self.persy
            .begin_with(TransactionConfig::new().set_background_sync(background))
            .map_err(other)
    }

    fn lookup(&self, key: &str) -> Result<Option<PersyId>, Error> {
        let mut ids = self
            .persy
            .get::<String, PersyId>(INDEX, &key.to_owned())
            .map_err(other)?;
        Ok(ids.next())
    }
}

impl super::KeyValueStore for KeyValueStore {
    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        let key = hex(key);
        let existing = self.lookup(&key)?;
        let mut tx = self.begin()?;
        match existing {
            Some(id) => {
                tx.update(SEGMENT, &id, value).map_err(other)?;
            }
            None => {
                let id = tx.insert(SEGMENT, value).map_err(other)?;
                tx.put::<String, PersyId>(INDEX, key, id).map_err(other)?;
            }
        }
        tx.prepare().map_err(other)?.commit().map_err(other)?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        match self.lookup(&hex(key))? {
            Some(id) => self.persy.read(SEGMENT, &id).map_err(other),
            None => Ok(None),
        }
    }

    fn del(&self, key: &[u8]) -> Result<(), Error> {
        let key = hex(key);
        let Some(id) = self.lookup(&key)? else {
            return Ok(());
        };
        let mut tx = self.begin()?;
        tx.delete(SEGMENT, &id).map_err(other)?;
        tx.remove::<String, PersyId>(INDEX, key, None)
            .map_err(other)?;
        tx.prepare().map_err(other)?.commit().map_err(other)?;
        Ok(())
    }

    fn sync(&self) -> Result<(), Error> {
        // A synchronous commit fsyncs the journal and everything committed ahead of it.
        let tx = self
            .persy
            .begin_with(TransactionConfig::new().set_background_sync(false))
            .map_err(other)?;
        tx.prepare().map_err(other)?.commit().map_err(other)?;
        Ok(())
    }
}
