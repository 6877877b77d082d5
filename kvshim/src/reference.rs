//! An in-memory store that records every call made against it.
//!
//! The reference store is deterministic and fast, so it doubles as the mock backend for testing
//! anything that drives a [KeyValueStore](super::KeyValueStore).

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use super::{Capabilities, Durability, Error, KeyValueStore as KeyValueStoreTrait};

/////////////////////////////////////////////// Call ///////////////////////////////////////////////

/// One call observed by the reference store, in the order it was made.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    Put { key: Vec<u8>, value: Vec<u8> },
    Get { key: Vec<u8> },
    Del { key: Vec<u8> },
    Scan { start: Vec<u8>, limit: usize },
    Sync,
    Close,
}

impl Call {
    pub fn is_write(&self) -> bool {
        matches!(self, Call::Put { .. } | Call::Del { .. })
    }
}

/////////////////////////////////////////// KeyValueStore //////////////////////////////////////////

#[derive(Debug, Default)]
pub struct KeyValueStore {
    durability: Durability,
    capabilities: Capabilities,
    entries: RefCell<BTreeMap<Vec<u8>, Vec<u8>>>,
    calls: RefCell<Vec<Call>>,
    failures: RefCell<HashMap<Vec<u8>, Error>>,
}

impl KeyValueStore {
    pub fn new(durability: Durability) -> Self {
        Self {
            durability,
            ..Self::default()
        }
    }

    /// Pretend to be an engine with only the given capabilities.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Fail every put, get, or del of `key` with `err`.
    pub fn fail_on(&self, key: &[u8], err: Error) {
        self.failures.borrow_mut().insert(key.to_vec(), err);
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    fn check(&self, key: &[u8]) -> Result<(), Error> {
        match self.failures.borrow().get(key) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn after_write(&self) -> Result<(), Error> {
        if self.durability == Durability::ForcedSync {
            self.sync()
        } else {
            Ok(())
        }
    }
}

impl KeyValueStoreTrait for KeyValueStore {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.calls.borrow_mut().push(Call::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        });
        self.check(key)?;
        self.entries
            .borrow_mut()
            .insert(key.to_vec(), value.to_vec());
        self.after_write()
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        self.calls.borrow_mut().push(Call::Get { key: key.to_vec() });
        self.check(key)?;
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn del(&self, key: &[u8]) -> Result<(), Error> {
        self.calls.borrow_mut().push(Call::Del { key: key.to_vec() });
        self.check(key)?;
        self.entries.borrow_mut().remove(key);
        self.after_write()
    }

    fn scan(&self, start: &[u8], limit: usize) -> Result<usize, Error> {
        self.calls.borrow_mut().push(Call::Scan {
            start: start.to_vec(),
            limit,
        });
        if !self.capabilities.range_scan {
            return Err(Error::unsupported("range scan"));
        }
        let entries = self.entries.borrow();
        let range = entries.range::<[u8], _>((Bound::Included(start), Bound::Unbounded));
        Ok(range.take(limit).count())
    }

    fn sync(&self) -> Result<(), Error> {
        self.calls.borrow_mut().push(Call::Sync);
        Ok(())
    }

    fn close(self) -> Result<(), Error> {
        self.calls.borrow_mut().push(Call::Close);
        Ok(())
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_del() {
        let kvs = KeyValueStore::new(Durability::Buffered);
        assert!(kvs.is_empty());
        kvs.put(b"key1", b"value1").unwrap();
        kvs.put(b"key2", b"value2").unwrap();
        assert_eq!(2, kvs.len());
        assert_eq!(Some(b"value1".to_vec()), kvs.get(b"key1").unwrap());
        kvs.del(b"key1").unwrap();
        assert_eq!(None, kvs.get(b"key1").unwrap());
        assert_eq!(1, kvs.len());
    }

    #[test]
    fn forced_sync_trace() {
        let kvs = KeyValueStore::new(Durability::ForcedSync);
        kvs.put(b"a", b"1").unwrap();
        kvs.get(b"a").unwrap();
        kvs.del(b"a").unwrap();
        assert_eq!(
            vec![
                Call::Put {
                    key: b"a".to_vec(),
                    value: b"1".to_vec()
                },
                Call::Sync,
                Call::Get { key: b"a".to_vec() },
                Call::Del { key: b"a".to_vec() },
                Call::Sync,
            ],
            kvs.calls()
        );
    }

    #[test]
    fn buffered_never_syncs() {
        let kvs = KeyValueStore::new(Durability::Buffered);
        kvs.put(b"a", b"1").unwrap();
        kvs.del(b"a").unwrap();
        assert!(!kvs.calls().contains(&Call::Sync));
    }

    #[test]
    fn scan_counts_from_start() {
        let kvs = KeyValueStore::new(Durability::Buffered);
        for key in [b"a", b"b", b"c", b"d"] {
            kvs.put(key, b"x").unwrap();
        }
        assert_eq!(2, kvs.scan(b"b", 2).unwrap());
        assert_eq!(3, kvs.scan(b"b", 10).unwrap());
        assert_eq!(0, kvs.scan(b"z", 10).unwrap());
    }

    #[test]
    fn scan_without_capability() {
        let kvs = KeyValueStore::new(Durability::Buffered).with_capabilities(Capabilities {
            range_scan: false,
            ..Capabilities::ALL
        });
        assert!(matches!(
            kvs.scan(b"", 1),
            Err(Error::Unsupported { .. })
        ));
    }

    #[test]
    fn injected_failure() {
        let kvs = KeyValueStore::new(Durability::Buffered);
        kvs.fail_on(b"bad", Error::other("injected"));
        assert_eq!(Err(Error::other("injected")), kvs.put(b"bad", b"x"));
        assert_eq!(None, kvs.get(b"good").unwrap());
        assert!(kvs.is_empty());
    }
}
