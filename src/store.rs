//! Key/value state the ledger reads and replaces whole values in
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use sled::Batch;

use crate::error::{PolicyError, PolicyResult};

/// Whole-value get/put storage, atomic per key.
pub trait StateStore {
    fn get(&self, key: &str) -> PolicyResult<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: Vec<u8>) -> PolicyResult<()>;

    /// Applies staged writes in order. Stores that can write several keys
    /// atomically should override this.
    fn commit(&self, writes: WriteSet) -> PolicyResult<()> {
        for (key, value) in writes.entries {
            self.put(&key, value)?;
        }
        Ok(())
    }
}

/// Writes staged by a handler, issued only once every validation has passed.
#[derive(Debug, Default)]
pub struct WriteSet {
    entries: Vec<(String, Vec<u8>)>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `value` under `key`, replacing an earlier write to the same key.
    pub fn insert(&mut self, key: &str, value: Vec<u8>) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct SledStore {
    instance: Arc<sled::Db>,
}

impl SledStore {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }
}

impl StateStore for SledStore {
    fn get(&self, key: &str) -> PolicyResult<Option<Vec<u8>>> {
        Ok(self.instance.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn put(&self, key: &str, value: Vec<u8>) -> PolicyResult<()> {
        self.instance.insert(key.as_bytes(), value)?;
        Ok(())
    }

    // every staged key lands in one sled batch
    fn commit(&self, writes: WriteSet) -> PolicyResult<()> {
        let mut batch = Batch::default();
        for (key, value) in writes.entries {
            batch.insert(key.as_bytes(), value);
        }
        self.instance.apply_batch(batch)?;
        Ok(())
    }
}

/// In-process store, mostly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> PolicyResult<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn lock(&self) -> PolicyResult<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.state
            .lock()
            .map_err(|_| PolicyError::StoreUnavailable("memory store lock poisoned".into()))
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> PolicyResult<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> PolicyResult<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }
}

impl<S: StateStore + ?Sized> StateStore for Arc<S> {
    fn get(&self, key: &str) -> PolicyResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: Vec<u8>) -> PolicyResult<()> {
        (**self).put(key, value)
    }

    fn commit(&self, writes: WriteSet) -> PolicyResult<()> {
        (**self).commit(writes)
    }
}
