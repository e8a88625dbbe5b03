//! Per-holder index of policies that have become active
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PolicyError, PolicyResult};
use crate::policy::{Policy, PolicyHolder};
use crate::store::{StateStore, WriteSet};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AllHolders {
    #[serde(rename = "Catalog", default)]
    pub catalog: Vec<PolicyHolder>,
}

impl AllHolders {
    pub fn get(&self, holder_id: &str) -> Option<&PolicyHolder> {
        self.catalog.iter().find(|h| h.id == holder_id)
    }

    /// Stores `policy` under `holder_id`, replacing a copy with the same id.
    pub fn upsert(&mut self, holder_id: &str, policy: Policy) {
        let index = match self.catalog.iter().position(|h| h.id == holder_id) {
            Some(index) => index,
            None => {
                self.catalog.push(PolicyHolder {
                    id: holder_id.to_string(),
                    policies: vec![],
                });
                self.catalog.len() - 1
            }
        };

        let holder = &mut self.catalog[index];
        match holder.policies.iter_mut().find(|p| p.id == policy.id) {
            Some(existing) => *existing = policy,
            None => holder.policies.push(policy),
        }
    }

    /// Drops `policy_id` from the holder's list. Returns whether a copy was removed.
    pub fn remove(&mut self, holder_id: &str, policy_id: &str) -> bool {
        let Some(holder) = self.catalog.iter_mut().find(|h| h.id == holder_id) else {
            return false;
        };
        let before = holder.policies.len();
        holder.policies.retain(|p| p.id != policy_id);
        holder.policies.len() != before
    }
}

pub fn read_holders<S: StateStore + ?Sized>(store: &S, key: &str) -> PolicyResult<AllHolders> {
    match store.get(key)? {
        Some(bytes) => serde_json::from_slice(&bytes).map_err(|source| PolicyError::CorruptState {
            key: key.to_string(),
            source,
        }),
        None => Ok(AllHolders::default()),
    }
}

pub fn encode_holders(holders: &AllHolders) -> PolicyResult<Vec<u8>> {
    Ok(serde_json::to_vec(holders)?)
}

/// Loads the index, upserts `policy` for `holder_id` and stages the result.
pub fn upsert_holder_policy<S: StateStore + ?Sized>(
    store: &S,
    key: &str,
    writes: &mut WriteSet,
    holder_id: &str,
    policy: Policy,
) -> PolicyResult<()> {
    let mut holders = read_holders(store, key)?;
    debug!(holder_id, policy_id = %policy.id, "holder index updated");
    holders.upsert(holder_id, policy);
    writes.insert(key, encode_holders(&holders)?);
    Ok(())
}

/// Stages the index without `policy_id` for `holder_id`, once it is no longer active.
/// Nothing is staged when the holder has no copy.
pub fn remove_holder_policy<S: StateStore + ?Sized>(
    store: &S,
    key: &str,
    writes: &mut WriteSet,
    holder_id: &str,
    policy_id: &str,
) -> PolicyResult<()> {
    let mut holders = read_holders(store, key)?;
    if holders.remove(holder_id, policy_id) {
        debug!(holder_id, policy_id, "policy dropped from holder index");
        writes.insert(key, encode_holders(&holders)?);
    }
    Ok(())
}
