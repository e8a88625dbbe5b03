use anyhow::Context;
use policy_ledger::{
    LedgerKeys, PolicyContract, PolicyError, PolicyService, PolicyStage,
    catalog::AllPolicies,
    policy::Vote,
    store::SledStore,
};
use sled::open;
use std::sync::Arc;

use tempfile::{TempDir, tempdir}; // Use for test db cleanup.

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|a| a.to_string()).collect()
}

// Sled locks its directory, so every test opens its own database under a
// temp dir. The TempDir is returned so it outlives the contract.
fn open_contract(name: &str) -> anyhow::Result<(TempDir, PolicyContract<SledStore>)> {
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join(name))?);
    db.clear()?;

    let contract = PolicyContract::new(PolicyService::new(
        SledStore::new(db),
        LedgerKeys::default(),
    ));
    contract.invoke("init", &[])?;
    Ok((temp_dir, contract))
}

fn query(contract: &PolicyContract<SledStore>, function: &str) -> anyhow::Result<AllPolicies> {
    let raw = contract.query(function, &[])?;
    Ok(serde_json::from_slice(&raw)?)
}

fn id_of(bytes: Vec<u8>) -> anyhow::Result<String> {
    Ok(String::from_utf8(bytes)?)
}

// generatePolicy("H1","US","DE") then both carriers fill their slot.
fn complete_policy(contract: &PolicyContract<SledStore>) -> anyhow::Result<String> {
    let id = id_of(contract.invoke("generatePolicy", &args(&["H1", "US", "DE"]))?)?;
    contract
        .invoke("assignTerms", &args(&[&id, "C1", "US", "100", "1000"]))
        .context("US terms: ")?;
    contract
        .invoke("assignTerms", &args(&[&id, "C2", "DE", "50", "500"]))
        .context("DE terms: ")?;
    Ok(id)
}

#[test]
fn generate_assign_and_approve() -> anyhow::Result<()> {
    let (_dir, contract) = open_contract("approve.db")?;

    let id = id_of(contract.invoke("generatePolicy", &args(&["H1", "US", "DE"]))?)?;
    let incomplete = query(&contract, "getIncompletePolicies")?;
    assert_eq!(incomplete.len(), 1);
    let policy = incomplete.get(&id).context("generated policy missing")?;
    assert_eq!(policy.terms.len(), 2);
    assert!(policy.terms.iter().all(|t| t.id.is_empty()));

    // first slot filled, still incomplete
    contract.invoke("assignTerms", &args(&[&id, "C1", "US", "100", "1000"]))?;
    let incomplete = query(&contract, "getIncompletePolicies")?;
    let policy = incomplete.get(&id).context("policy left incomplete")?;
    let us = policy.slot("US").context("US slot")?;
    assert_eq!(us.carrier_id, "C1");
    assert_eq!((us.premium, us.value), (100, 1000));
    assert!(policy.slot("DE").context("DE slot")?.id.is_empty());

    // last slot filled, moves to pending with a blank ballot
    contract.invoke("assignTerms", &args(&[&id, "C2", "DE", "50", "500"]))?;
    assert!(query(&contract, "getIncompletePolicies")?.is_empty());
    let pending = query(&contract, "getPendingPolicies")?;
    let policy = pending.get(&id).context("policy should be pending")?;
    assert_eq!(policy.votes.len(), 2);
    assert!(policy.votes.iter().all(|a| a.vote == Vote::Pending));

    contract.invoke("castVote", &args(&[&id, "C1", "approve"]))?;
    assert!(query(&contract, "getPendingPolicies")?.contains(&id));

    contract.invoke("castVote", &args(&[&id, "C2", "approve"]))?;
    assert!(query(&contract, "getPendingPolicies")?.is_empty());
    let active = query(&contract, "getActivePolicies")?;
    assert!(active.contains(&id));

    let held = contract.holder_policies("H1")?;
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].id, id);

    Ok(())
}

#[test]
fn repeated_vote_is_rejected() -> anyhow::Result<()> {
    let (_dir, contract) = open_contract("repeat_vote.db")?;
    let id = complete_policy(&contract)?;

    contract.invoke("castVote", &args(&[&id, "C1", "approve"]))?;
    let before = contract.query("getPendingPolicies", &[])?;

    let err = contract
        .invoke("castVote", &args(&[&id, "C1", "disapprove"]))
        .unwrap_err();
    assert!(matches!(err, PolicyError::AlreadyVoted { .. }));
    assert_eq!(contract.query("getPendingPolicies", &[])?, before);

    Ok(())
}

#[test]
fn disapproval_regenerates_an_empty_policy() -> anyhow::Result<()> {
    let (_dir, contract) = open_contract("disapprove.db")?;
    let id = complete_policy(&contract)?;

    contract.invoke("castVote", &args(&[&id, "C1", "approve"]))?;
    let fresh_id = id_of(contract.invoke("castVote", &args(&[&id, "C2", "disapprove"]))?)?;

    assert_ne!(fresh_id, id);
    assert!(!query(&contract, "getPendingPolicies")?.contains(&id));
    assert!(!query(&contract, "getActivePolicies")?.contains(&id));

    let incomplete = query(&contract, "getIncompletePolicies")?;
    assert!(!incomplete.contains(&id));
    let fresh = incomplete.get(&fresh_id).context("regenerated policy")?;
    assert_eq!(fresh.holder_id, "H1");
    assert_eq!(fresh.countries, args(&["US", "DE"]));
    assert!(fresh.terms.iter().all(|t| t.id.is_empty()));
    assert!(fresh.votes.is_empty());

    // no holder entry for a rejected policy
    assert!(contract.holder_policies("H1")?.is_empty());

    Ok(())
}

#[test]
fn modify_active_policy_requires_revote() -> anyhow::Result<()> {
    let (_dir, contract) = open_contract("modify.db")?;
    let id = complete_policy(&contract)?;
    contract.invoke("castVote", &args(&[&id, "C1", "approve"]))?;
    contract.invoke("castVote", &args(&[&id, "C2", "approve"]))?;

    // identical terms are not a modification
    let err = contract
        .invoke("modifyPolicy", &args(&[&id, "C1", "US", "100", "1000"]))
        .unwrap_err();
    assert!(matches!(err, PolicyError::NoChange(_)));

    // a carrier cannot re-term a country it does not cover
    let err = contract
        .invoke("modifyPolicy", &args(&[&id, "C1", "DE", "10", "100"]))
        .unwrap_err();
    assert!(matches!(err, PolicyError::RequirementNotFound { .. }));

    contract.invoke("modifyPolicy", &args(&[&id, "C1", "US", "120", "1000"]))?;

    assert!(!query(&contract, "getActivePolicies")?.contains(&id));
    let pending = query(&contract, "getPendingPolicies")?;
    let policy = pending.get(&id).context("modified policy should be pending")?;
    assert_eq!(policy.slot("US").context("US slot")?.premium, 120);
    assert!(policy.votes.iter().all(|a| a.vote == Vote::Pending));

    // no longer active, so no longer held
    assert!(contract.holder_policies("H1")?.is_empty());

    contract.invoke("castVote", &args(&[&id, "C1", "approve"]))?;
    contract.invoke("castVote", &args(&[&id, "C2", "approve"]))?;

    let active = query(&contract, "getActivePolicies")?;
    assert_eq!(active.len(), 1);
    assert_eq!(active.get(&id).context("re-approved")?.slot("US").context("US")?.premium, 120);

    // the holder keeps one, refreshed copy
    let held = contract.holder_policies("H1")?;
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].slot("US").context("US")?.premium, 120);

    Ok(())
}

#[test]
fn rejected_modification_leaves_holder_without_the_policy() -> anyhow::Result<()> {
    let (_dir, contract) = open_contract("modify_reject.db")?;
    let id = complete_policy(&contract)?;
    contract.invoke("castVote", &args(&[&id, "C1", "approve"]))?;
    contract.invoke("castVote", &args(&[&id, "C2", "approve"]))?;
    assert_eq!(contract.holder_policies("H1")?.len(), 1);

    contract.invoke("modifyPolicy", &args(&[&id, "C1", "US", "120", "1000"]))?;
    contract.invoke("castVote", &args(&[&id, "C1", "approve"]))?;
    let fresh_id = id_of(contract.invoke("castVote", &args(&[&id, "C2", "disapprove"]))?)?;

    assert!(query(&contract, "getActivePolicies")?.is_empty());
    assert!(query(&contract, "getIncompletePolicies")?.contains(&fresh_id));
    assert!(contract.holder_policies("H1")?.is_empty());

    Ok(())
}

#[test]
fn state_survives_reopening_the_database() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("reopen.db");

    let id = {
        let db = Arc::new(open(&path)?);
        let service = PolicyService::new(SledStore::new(db.clone()), LedgerKeys::default());
        let policy = service.generate_policy("H1", &args(&["US"]))?;
        db.flush()?;
        policy.id
    };

    let db = Arc::new(open(&path)?);
    let service = PolicyService::new(SledStore::new(db), LedgerKeys::default());
    assert_eq!(service.locate(&id)?, Some(PolicyStage::Incomplete));

    Ok(())
}

#[test]
fn namespaces_are_isolated() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join("namespaces.db"))?);

    let tenant_a = PolicyService::new(SledStore::new(db.clone()), LedgerKeys::namespaced("a"));
    let tenant_b = PolicyService::new(SledStore::new(db), LedgerKeys::namespaced("b"));

    let policy = tenant_a.generate_policy("H1", &args(&["US"]))?;

    assert_eq!(tenant_a.locate(&policy.id)?, Some(PolicyStage::Incomplete));
    assert_eq!(tenant_b.locate(&policy.id)?, None);
    assert!(tenant_b.incomplete_policies()?.is_empty());

    Ok(())
}
