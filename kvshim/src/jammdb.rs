use std::path::Path;

use jammdb::DB;

use super::{Capabilities, Durability, Error};

pub const VERSION: &str = "0.11";

/// Every jammdb commit is synced to disk.
pub const CAPABILITIES: Capabilities = Capabilities {
    range_scan: false,
    forced_sync: true,
    buffered: false,
};

const BUCKET: &str = "data";

impl From<jammdb::Error> for Error {
    fn from(err: jammdb::Error) -> Self {
        match err {
            jammdb::Error::Io(err) => err.into(),
            err => Error::Other {
                what: err.to_string(),
            },
        }
    }
}

/////////////////////////////////////////// KeyValueStore //////////////////////////////////////////

pub struct KeyValueStore {
    db: DB,
}

impl KeyValueStore {
    pub fn open(path: &Path, _: Durability) -> Result<Self, Error> {
        std::fs::create_dir_all(path)?;
        let db = DB::open(path.join("data.db"))?;
        {
            let tx = db.tx(true)?;
            tx.get_or_create_bucket(BUCKET)?;
            tx.commit()?;
        }
        Ok(Self { db })
    }
}

impl super::KeyValueStore for KeyValueStore {
    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        let tx = self.db.tx(true)?;
        {
            let bucket = tx.get_bucket(BUCKET)?;
            bucket.put(key.to_vec(), value.to_vec())?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let tx = self.db.tx(false)?;
        let bucket = tx.get_bucket(BUCKET)?;
        let value = bucket
            .get_kv(key)
            .map(|kv| kv.value().to_vec());
        Ok(value)
    }

    fn del(&self, key: &[u8]) -> Result<(), Error> {
        let tx = self.db.tx(true)?;
        {
            let bucket = tx.get_bucket(BUCKET)?;
            if bucket.get_kv(key).is_none() {
                return Ok(());
            }
            bucket.delete(key)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn sync(&self) -> Result<(), Error> {
        Ok(())
    }
}
