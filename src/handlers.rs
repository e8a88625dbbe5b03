//! Invocation and query entry points taking raw string arguments
use tracing::{debug, info};

use crate::error::{PolicyError, PolicyResult};
use crate::policy::{CarrierTerms, Policy, Vote};
use crate::service::{PolicyService, PolicyStage};
use crate::store::StateStore;

pub struct PolicyContract<S: StateStore> {
    service: PolicyService<S>,
}

fn expect_args(function: &str, args: &[String], expected: usize) -> PolicyResult<()> {
    if args.len() != expected {
        return Err(PolicyError::InvalidArgument(format!(
            "{function} expects {expected} arguments; arguments received: {}",
            args.len()
        )));
    }
    Ok(())
}

fn parse_amount(name: &str, raw: &str) -> PolicyResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|e| PolicyError::InvalidArgument(format!("{name} '{raw}' is not an integer: {e}")))
}

/// Builds terms from `[carrierID, country, premium, value]`.
pub fn parse_terms(args: &[String]) -> PolicyResult<CarrierTerms> {
    expect_args("terms", args, 4)?;
    let (carrier_id, country) = (&args[0], &args[1]);
    if carrier_id.is_empty() || country.is_empty() {
        return Err(PolicyError::InvalidArgument(
            "carrier id and country must be non-empty".into(),
        ));
    }
    let premium = parse_amount("premium", &args[2])?;
    let value = parse_amount("value", &args[3])?;

    CarrierTerms::new(carrier_id, country, premium, value)
}

impl<S: StateStore> PolicyContract<S> {
    pub fn new(service: PolicyService<S>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &PolicyService<S> {
        &self.service
    }

    /// Runs a state-changing invocation. Returns the id of the policy the
    /// call left behind, or nothing for `init`.
    pub fn invoke(&self, function: &str, args: &[String]) -> PolicyResult<Vec<u8>> {
        debug!(function, argc = args.len(), "invoke");
        match function {
            "init" => self.init(),
            "generatePolicy" => self.generate_policy(args),
            "assignTerms" => self.assign_terms(args),
            "castVote" => self.cast_vote(args),
            "modifyPolicy" => self.modify_policy(args),
            other => Err(PolicyError::UnknownFunction(other.to_string())),
        }
    }

    /// Read-only access to the stored documents.
    pub fn query(&self, function: &str, args: &[String]) -> PolicyResult<Vec<u8>> {
        debug!(function, argc = args.len(), "query");
        match function {
            "getIncompletePolicies" => self.service.raw_catalog(PolicyStage::Incomplete),
            "getPendingPolicies" => self.service.raw_catalog(PolicyStage::Pending),
            "getActivePolicies" => self.service.raw_catalog(PolicyStage::Active),
            "getHolderPolicies" => {
                expect_args(function, args, 1)?;
                let holder = self
                    .service
                    .holder(&args[0])?
                    .ok_or_else(|| PolicyError::NotFound(args[0].clone()))?;
                Ok(serde_json::to_vec(&holder)?)
            }
            other => Err(PolicyError::UnknownFunction(other.to_string())),
        }
    }

    pub fn init(&self) -> PolicyResult<Vec<u8>> {
        self.service.init()?;
        Ok(vec![])
    }

    /// `holderID, country...`
    pub fn generate_policy(&self, args: &[String]) -> PolicyResult<Vec<u8>> {
        if args.len() < 2 {
            return Err(PolicyError::InvalidArgument(format!(
                "generatePolicy expects a holder and at least one country; arguments received: {}",
                args.len()
            )));
        }
        let policy = self.service.generate_policy(&args[0], &args[1..])?;
        Ok(policy.id.into_bytes())
    }

    /// `policyID, carrierID, country, premium, value`
    pub fn assign_terms(&self, args: &[String]) -> PolicyResult<Vec<u8>> {
        expect_args("assignTerms", args, 5)?;
        let terms = parse_terms(&args[1..])?;
        let placement = self.service.assign_terms(&args[0], terms)?;
        info!(policy_id = %placement.policy.id, stage = %placement.stage, "terms assigned");
        Ok(placement.policy.id.into_bytes())
    }

    /// `policyID, carrierID, vote`
    pub fn cast_vote(&self, args: &[String]) -> PolicyResult<Vec<u8>> {
        expect_args("castVote", args, 3)?;
        let vote = Vote::parse_cast(&args[2])?;
        let placement = self.service.cast_vote(&args[0], &args[1], vote)?;
        Ok(placement.policy.id.into_bytes())
    }

    /// `policyID, carrierID, country, premium, value`
    pub fn modify_policy(&self, args: &[String]) -> PolicyResult<Vec<u8>> {
        expect_args("modifyPolicy", args, 5)?;
        let terms = parse_terms(&args[1..])?;
        let placement = self.service.modify_policy(&args[0], terms)?;
        Ok(placement.policy.id.into_bytes())
    }

    /// Decoded holder entry, for callers that do not want raw bytes.
    pub fn holder_policies(&self, holder_id: &str) -> PolicyResult<Vec<Policy>> {
        Ok(self
            .service
            .holder(holder_id)?
            .map(|h| h.policies)
            .unwrap_or_default())
    }
}
