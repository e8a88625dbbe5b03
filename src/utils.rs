//! Utility functions for hashing and identifiers

use bech32::Bech32m;
use uuid7::uuid7;

use crate::error::{PolicyError, PolicyResult};

/// Human readable prefix of a policy id.
pub const POLICY_HRP: &str = "policy";
/// Human readable prefix of a carrier terms id.
pub const TERMS_HRP: &str = "terms";

// construct a unique party id (holder, carrier) then encode using bech32
pub fn new_party_id(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Derives a deterministic identifier from an ordered list of arguments.
///
/// Every argument takes part in the hash, including the leading holder or
/// carrier id. The list is encoded into cbor before hashing so element
/// boundaries are preserved: `["US", "DE"]` and `["USD", "E"]` differ.
/// The sha256 digest is rendered as bech32m under `hrp`.
pub fn derive_id<S: AsRef<str>>(hrp: &str, args: &[S]) -> PolicyResult<String> {
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    let cbor = minicbor::to_vec(&args).map_err(|e| PolicyError::Identity(e.to_string()))?;
    let digest = hex::decode(sha256::digest(&cbor))
        .map_err(|e| PolicyError::Identity(e.to_string()))?;

    let hrp = bech32::Hrp::parse(hrp).map_err(|e| PolicyError::Identity(e.to_string()))?;
    bech32::encode::<Bech32m>(hrp, &digest).map_err(|e| PolicyError::Identity(e.to_string()))
}
