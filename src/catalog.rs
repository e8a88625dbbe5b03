//! Catalog documents and their persistence
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PolicyError, PolicyResult};
use crate::policy::Policy;
use crate::store::{StateStore, WriteSet};

/// One lifecycle stage, stored whole under its own key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AllPolicies {
    #[serde(rename = "policies", default)]
    pub catalog: Vec<Policy>,
}

impl AllPolicies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.catalog.iter().any(|p| p.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Policy> {
        self.catalog.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Policy> {
        self.catalog.iter_mut().find(|p| p.id == id)
    }

    pub fn find_index_by_id(&self, id: &str) -> PolicyResult<usize> {
        self.catalog
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| PolicyError::NotFound(id.to_string()))
    }

    /// Removes the policy at `index`, keeping the order of the rest.
    pub fn remove_at(mut self, index: usize) -> PolicyResult<(Policy, AllPolicies)> {
        if index >= self.catalog.len() {
            return Err(PolicyError::NotFound(format!("catalog index {index}")));
        }
        let removed = self.catalog.remove(index);
        Ok((removed, self))
    }

    /// Removes and returns the policy with `id`, if present.
    pub fn take(&mut self, id: &str) -> Option<Policy> {
        let index = self.catalog.iter().position(|p| p.id == id)?;
        Some(self.catalog.remove(index))
    }

    /// Like [`AllPolicies::take`] but a missing id is an error.
    pub fn take_required(&mut self, id: &str) -> PolicyResult<Policy> {
        self.take(id).ok_or_else(|| PolicyError::NotFound(id.to_string()))
    }

    pub fn push(&mut self, policy: Policy) {
        self.catalog.push(policy);
    }

    /// Appends `policy`, dropping any earlier copy with the same id.
    pub fn replace_or_push(&mut self, policy: Policy) {
        self.take(&policy.id);
        self.catalog.push(policy);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Policy> {
        self.catalog.iter()
    }
}

pub fn decode_catalog(key: &str, bytes: &[u8]) -> PolicyResult<AllPolicies> {
    serde_json::from_slice(bytes).map_err(|source| PolicyError::CorruptState {
        key: key.to_string(),
        source,
    })
}

pub fn encode_catalog(catalog: &AllPolicies) -> PolicyResult<Vec<u8>> {
    Ok(serde_json::to_vec(catalog)?)
}

/// Loads the catalog under `key`. A missing key is an empty catalog.
pub fn read_catalog<S: StateStore + ?Sized>(store: &S, key: &str) -> PolicyResult<AllPolicies> {
    match store.get(key)? {
        Some(bytes) => {
            let catalog = decode_catalog(key, &bytes)?;
            debug!(key, count = catalog.len(), "catalog read");
            Ok(catalog)
        }
        None => {
            debug!(key, "catalog missing, treated as empty");
            Ok(AllPolicies::new())
        }
    }
}

/// The stored document under `key`, or an encoded empty catalog.
pub fn read_catalog_raw<S: StateStore + ?Sized>(store: &S, key: &str) -> PolicyResult<Vec<u8>> {
    match store.get(key)? {
        Some(bytes) => Ok(bytes),
        None => encode_catalog(&AllPolicies::new()),
    }
}

pub fn write_catalog<S: StateStore + ?Sized>(
    store: &S,
    key: &str,
    catalog: &AllPolicies,
) -> PolicyResult<()> {
    store.put(key, encode_catalog(catalog)?)?;
    debug!(key, count = catalog.len(), "catalog written");
    Ok(())
}

/// Stages `catalog` for a later [`StateStore::commit`].
pub fn stage_catalog(writes: &mut WriteSet, key: &str, catalog: &AllPolicies) -> PolicyResult<()> {
    writes.insert(key, encode_catalog(catalog)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn sample(holder: &str) -> Policy {
        Policy::draft(holder, &["US".to_string()], None).unwrap()
    }

    #[test]
    fn missing_key_reads_as_empty() {
        let store = MemoryStore::new();
        let catalog = read_catalog(&store, "_nothing").unwrap();
        assert!(catalog.is_empty());
        assert_eq!(read_catalog_raw(&store, "_nothing").unwrap(), br#"{"policies":[]}"#);
    }

    #[test]
    fn malformed_bytes_are_corrupt_state() {
        let store = MemoryStore::new();
        store.put("_bad", b"not json".to_vec()).unwrap();

        let err = read_catalog(&store, "_bad").unwrap_err();
        assert!(matches!(err, PolicyError::CorruptState { key, .. } if key == "_bad"));
    }

    #[test]
    fn write_then_read() {
        let store = MemoryStore::new();
        let mut catalog = AllPolicies::new();
        catalog.push(sample("H1"));
        write_catalog(&store, "_k", &catalog).unwrap();

        assert_eq!(read_catalog(&store, "_k").unwrap(), catalog);
    }

    #[test]
    fn remove_at_preserves_order() {
        let mut catalog = AllPolicies::new();
        let (a, b, c) = (sample("A"), sample("B"), sample("C"));
        catalog.push(a.clone());
        catalog.push(b.clone());
        catalog.push(c.clone());

        let index = catalog.find_index_by_id(&b.id).unwrap();
        let (removed, rest) = catalog.remove_at(index).unwrap();

        assert_eq!(removed, b);
        assert_eq!(rest.catalog, vec![a, c]);
    }

    #[test]
    fn remove_at_out_of_range_is_not_found() {
        let mut catalog = AllPolicies::new();
        catalog.push(sample("A"));

        let err = catalog.remove_at(1).unwrap_err();
        assert!(matches!(err, PolicyError::NotFound(_)));
    }

    #[test]
    fn find_index_of_missing_id_is_not_found() {
        let catalog = AllPolicies::new();
        assert!(matches!(
            catalog.find_index_by_id("policy1xyz"),
            Err(PolicyError::NotFound(_))
        ));
    }

    #[test]
    fn replace_or_push_keeps_a_single_copy() {
        let mut catalog = AllPolicies::new();
        let policy = sample("H1");
        catalog.push(policy.clone());
        catalog.replace_or_push(policy.clone());

        assert_eq!(catalog.len(), 1);
    }
}
