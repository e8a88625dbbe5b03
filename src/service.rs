//! Service layer API for the policy lifecycle
//!
//! ```text
//! Incomplete ──assign terms──▶ Pending ──unanimous approve──▶ Active
//!     ▲                          │  ▲                           │
//!     └───any disapprove─────────┘  └────────modify terms───────┘
//!         (regenerated, new id)
//! ```
//!
//! Every operation re-reads the catalogs it needs, mutates in memory and
//! stages its writes in a [`WriteSet`]. Nothing is written until every
//! check has passed.
use std::fmt;

use tracing::{debug, info, warn};

use crate::catalog::{self, AllPolicies};
use crate::config::LedgerKeys;
use crate::error::{PolicyError, PolicyResult};
use crate::holders::{self, AllHolders};
use crate::policy::{CarrierTerms, Policy, PolicyHolder, Vote};
use crate::store::{StateStore, WriteSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyStage {
    Incomplete,
    Pending,
    Active,
}

impl fmt::Display for PolicyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PolicyStage::Incomplete => "incomplete",
            PolicyStage::Pending => "pending",
            PolicyStage::Active => "active",
        };
        f.write_str(s)
    }
}

/// Where a policy ended up after an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub policy: Policy,
    pub stage: PolicyStage,
}

impl Placement {
    fn new(policy: Policy, stage: PolicyStage) -> Self {
        Self { policy, stage }
    }
}

pub struct PolicyService<S: StateStore> {
    store: S,
    keys: LedgerKeys,
}

impl<S: StateStore> PolicyService<S> {
    pub fn new(store: S, keys: LedgerKeys) -> Self {
        Self { store, keys }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn keys(&self) -> &LedgerKeys {
        &self.keys
    }

    fn catalog_key(&self, stage: PolicyStage) -> &str {
        match stage {
            PolicyStage::Incomplete => &self.keys.incomplete,
            PolicyStage::Pending => &self.keys.pending,
            PolicyStage::Active => &self.keys.active,
        }
    }

    fn load(&self, stage: PolicyStage) -> PolicyResult<AllPolicies> {
        catalog::read_catalog(&self.store, self.catalog_key(stage))
    }

    fn stage(
        &self,
        writes: &mut WriteSet,
        stage: PolicyStage,
        policies: &AllPolicies,
    ) -> PolicyResult<()> {
        catalog::stage_catalog(writes, self.catalog_key(stage), policies)
    }

    fn commit(&self, writes: WriteSet) -> PolicyResult<()> {
        debug!(keys = ?writes.keys().collect::<Vec<_>>(), "committing");
        self.store.commit(writes)
    }

    /// Writes empty documents to every catalog key and the holders key.
    pub fn init(&self) -> PolicyResult<()> {
        let mut writes = WriteSet::new();
        let empty = AllPolicies::new();
        for stage in [PolicyStage::Incomplete, PolicyStage::Pending, PolicyStage::Active] {
            self.stage(&mut writes, stage, &empty)?;
        }
        writes.insert(&self.keys.holders, holders::encode_holders(&AllHolders::default())?);
        self.commit(writes)?;

        info!("ledger initialised");
        Ok(())
    }

    /// The catalog currently holding `policy_id`, if any.
    pub fn locate(&self, policy_id: &str) -> PolicyResult<Option<PolicyStage>> {
        for stage in [PolicyStage::Incomplete, PolicyStage::Pending, PolicyStage::Active] {
            if self.load(stage)?.contains(policy_id) {
                return Ok(Some(stage));
            }
        }
        Ok(None)
    }

    /// Creates a new incomplete policy for `holder_id` covering `countries`.
    pub fn generate_policy(&self, holder_id: &str, countries: &[String]) -> PolicyResult<Policy> {
        let policy = Policy::draft(holder_id, countries, None)?;
        if let Some(stage) = self.locate(&policy.id)? {
            warn!(policy_id = %policy.id, %stage, "policy already exists");
            return Err(PolicyError::DuplicatePolicy(policy.id));
        }

        let mut incomplete = self.load(PolicyStage::Incomplete)?;
        incomplete.push(policy.clone());

        let mut writes = WriteSet::new();
        self.stage(&mut writes, PolicyStage::Incomplete, &incomplete)?;
        self.commit(writes)?;

        info!(
            policy_id = %policy.id,
            holder_id,
            countries = policy.countries.len(),
            incomplete = incomplete.len(),
            "policy generated"
        );
        Ok(policy)
    }

    /// Fills one country slot of an incomplete policy. Filling the last
    /// slot opens the ballot and moves the policy to pending.
    pub fn assign_terms(&self, policy_id: &str, terms: CarrierTerms) -> PolicyResult<Placement> {
        let mut incomplete = self.load(PolicyStage::Incomplete)?;
        if incomplete.is_empty() {
            return Err(PolicyError::NotFound(policy_id.to_string()));
        }

        let target = incomplete
            .get_mut(policy_id)
            .ok_or_else(|| PolicyError::NotFound(policy_id.to_string()))?;
        let (carrier_id, country) = (terms.carrier_id.clone(), terms.country.clone());
        target.fill_slot(terms)?;
        debug!(policy_id, %carrier_id, %country, "terms inserted");

        let mut writes = WriteSet::new();
        if !target.is_complete() {
            let policy = target.clone();
            self.stage(&mut writes, PolicyStage::Incomplete, &incomplete)?;
            self.commit(writes)?;
            return Ok(Placement::new(policy, PolicyStage::Incomplete));
        }

        let mut policy = incomplete.take_required(policy_id)?;
        policy.open_ballot();
        let mut pending = self.load(PolicyStage::Pending)?;
        pending.push(policy.clone());

        self.stage(&mut writes, PolicyStage::Incomplete, &incomplete)?;
        self.stage(&mut writes, PolicyStage::Pending, &pending)?;
        self.commit(writes)?;

        info!(policy_id, voters = policy.votes.len(), "policy complete, moved to pending");
        Ok(Placement::new(policy, PolicyStage::Pending))
    }

    /// Re-terms an active policy. Every vote is cleared and the policy goes
    /// back to pending for a fresh round. The holder index drops it until it
    /// is approved again.
    pub fn modify_policy(&self, policy_id: &str, terms: CarrierTerms) -> PolicyResult<Placement> {
        let mut active = self.load(PolicyStage::Active)?;
        let mut policy = active.take_required(policy_id)?;

        policy.replace_slot(terms)?;
        policy.clear_votes();

        let mut pending = self.load(PolicyStage::Pending)?;
        if pending.take(policy_id).is_some() {
            debug!(policy_id, "stale pending copy dropped");
        }
        pending.push(policy.clone());

        let mut writes = WriteSet::new();
        holders::remove_holder_policy(
            &self.store,
            &self.keys.holders,
            &mut writes,
            &policy.holder_id,
            policy_id,
        )?;
        self.stage(&mut writes, PolicyStage::Active, &active)?;
        self.stage(&mut writes, PolicyStage::Pending, &pending)?;
        self.commit(writes)?;

        info!(policy_id, "policy modified, votes cleared, moved to pending");
        Ok(Placement::new(policy, PolicyStage::Pending))
    }

    /// Records a carrier's vote on a pending policy. The last vote decides:
    /// unanimous approval activates the policy, any disapproval replaces it
    /// with a freshly generated incomplete policy.
    pub fn cast_vote(
        &self,
        policy_id: &str,
        carrier_id: &str,
        vote: Vote,
    ) -> PolicyResult<Placement> {
        if !vote.is_cast() {
            return Err(PolicyError::InvalidArgument("an empty vote cannot be cast".into()));
        }

        let mut pending = self.load(PolicyStage::Pending)?;
        let target = pending
            .get_mut(policy_id)
            .ok_or_else(|| PolicyError::NotFound(policy_id.to_string()))?;
        target.record_vote(carrier_id, vote)?;
        debug!(policy_id, carrier_id, %vote, "vote recorded");

        let mut writes = WriteSet::new();
        if !target.all_votes_cast() {
            let policy = target.clone();
            self.stage(&mut writes, PolicyStage::Pending, &pending)?;
            self.commit(writes)?;
            return Ok(Placement::new(policy, PolicyStage::Pending));
        }

        let policy = pending.take_required(policy_id)?;

        if policy.is_unanimous() {
            let mut active = self.load(PolicyStage::Active)?;
            active.replace_or_push(policy.clone());
            holders::upsert_holder_policy(
                &self.store,
                &self.keys.holders,
                &mut writes,
                &policy.holder_id,
                policy.clone(),
            )?;

            self.stage(&mut writes, PolicyStage::Pending, &pending)?;
            self.stage(&mut writes, PolicyStage::Active, &active)?;
            self.commit(writes)?;

            info!(policy_id, holder_id = %policy.holder_id, "policy approved, moved to active");
            return Ok(Placement::new(policy, PolicyStage::Active));
        }

        let mut incomplete = self.load(PolicyStage::Incomplete)?;
        let active = self.load(PolicyStage::Active)?;
        let fresh = regenerate(&policy, |id| {
            id == policy.id
                || incomplete.contains(id)
                || pending.contains(id)
                || active.contains(id)
        })?;
        incomplete.push(fresh.clone());

        self.stage(&mut writes, PolicyStage::Pending, &pending)?;
        self.stage(&mut writes, PolicyStage::Incomplete, &incomplete)?;
        self.commit(writes)?;

        warn!(
            policy_id,
            regenerated_id = %fresh.id,
            "policy disapproved, regenerated as incomplete"
        );
        Ok(Placement::new(fresh, PolicyStage::Incomplete))
    }

    pub fn incomplete_policies(&self) -> PolicyResult<AllPolicies> {
        self.load(PolicyStage::Incomplete)
    }

    pub fn pending_policies(&self) -> PolicyResult<AllPolicies> {
        self.load(PolicyStage::Pending)
    }

    pub fn active_policies(&self) -> PolicyResult<AllPolicies> {
        self.load(PolicyStage::Active)
    }

    /// The stored document for one catalog, as raw bytes.
    pub fn raw_catalog(&self, stage: PolicyStage) -> PolicyResult<Vec<u8>> {
        catalog::read_catalog_raw(&self.store, self.catalog_key(stage))
    }

    pub fn holder(&self, holder_id: &str) -> PolicyResult<Option<PolicyHolder>> {
        let holders = holders::read_holders(&self.store, &self.keys.holders)?;
        Ok(holders.get(holder_id).cloned())
    }
}

/// A fresh, empty policy for the same holder and countries as `retired`.
/// The id chains off the retired id, re-deriving while `taken` says the
/// candidate is already in use.
fn regenerate(retired: &Policy, taken: impl Fn(&str) -> bool) -> PolicyResult<Policy> {
    let mut lineage = retired.id.clone();
    loop {
        let draft = Policy::draft(&retired.holder_id, &retired.countries, Some(&lineage))?;
        if !taken(&draft.id) {
            return Ok(draft);
        }
        lineage = draft.id;
    }
}
