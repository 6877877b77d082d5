use std::path::Path;

use nebari::io::fs::StdFile;
use nebari::tree::{Root, Unversioned};
use nebari::{Config, Tree};

use super::{Capabilities, Durability, Error};

pub const VERSION: &str = "0.5";

/// Every nebari transaction is synced before it returns.
pub const CAPABILITIES: Capabilities = Capabilities {
    range_scan: false,
    forced_sync: true,
    buffered: false,
};

const TREE: &str = "data";

impl From<nebari::Error> for Error {
    fn from(err: nebari::Error) -> Self {
        match &err.kind {
            nebari::ErrorKind::Io(io) => Error::Io {
                kind: io.kind(),
                what: io.to_string(),
            },
            nebari::ErrorKind::DataIntegrity(_) => Error::Corruption {
                what: err.to_string(),
            },
            _ => Error::Other {
                what: err.to_string(),
            },
        }
    }
}

/////////////////////////////////////////// KeyValueStore //////////////////////////////////////////

pub struct KeyValueStore {
    tree: Tree<Unversioned, StdFile>,
}

impl KeyValueStore {
    pub fn open(path: &Path, _: Durability) -> Result<Self, Error> {
        std::fs::create_dir_all(path)?;
        let roots = Config::default_for(path.join("db.nebari")).open()?;
        let tree = roots.tree(Unversioned::tree(TREE))?;
        Ok(Self { tree })
    }
}

impl super::KeyValueStore for KeyValueStore {
    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.tree.set(key.to_vec(), value.to_vec())?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.tree.get(key)?.map(|v| v.to_vec()))
    }

    fn del(&self, key: &[u8]) -> Result<(), Error> {
        self.tree.remove(key)?;
        Ok(())
    }

    fn sync(&self) -> Result<(), Error> {
        Ok(())
    }
}
