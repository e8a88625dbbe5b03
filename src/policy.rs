//! Core policy, terms and approval types
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, PolicyResult};
use crate::utils::{POLICY_HRP, TERMS_HRP, derive_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Vote {
    #[default]
    #[serde(rename = "")]
    Pending,
    #[serde(rename = "approve")]
    Approve,
    #[serde(rename = "disapprove")]
    Disapprove,
}

impl Vote {
    /// Parses a cast vote. Only `approve` and `disapprove` can be cast.
    pub fn parse_cast(vote: &str) -> PolicyResult<Self> {
        match vote {
            "approve" => Ok(Vote::Approve),
            "disapprove" => Ok(Vote::Disapprove),
            other => Err(PolicyError::InvalidArgument(format!(
                "vote must be \"approve\" or \"disapprove\", got \"{other}\""
            ))),
        }
    }

    pub fn is_cast(&self) -> bool {
        !matches!(self, Vote::Pending)
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Vote::Pending => "",
            Vote::Approve => "approve",
            Vote::Disapprove => "disapprove",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CarrierTerms {
    #[serde(rename = "carrier")]
    pub carrier_id: String,
    pub id: String, // empty until assigned
    pub country: String,
    pub premium: i64,
    pub value: i64,
}

impl CarrierTerms {
    /// An unfilled slot for `country`.
    pub fn empty(country: &str) -> Self {
        Self {
            country: country.to_string(),
            ..Self::default()
        }
    }

    /// Builds filled terms whose id is derived from every defining field.
    pub fn new(carrier_id: &str, country: &str, premium: i64, value: i64) -> PolicyResult<Self> {
        let id = derive_id(
            TERMS_HRP,
            &[
                carrier_id.to_string(),
                country.to_string(),
                premium.to_string(),
                value.to_string(),
            ],
        )?;

        Ok(Self {
            carrier_id: carrier_id.to_string(),
            id,
            country: country.to_string(),
            premium,
            value,
        })
    }

    pub fn is_filled(&self) -> bool {
        !self.id.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Approval {
    #[serde(rename = "carrier")]
    pub carrier_id: String,
    pub vote: Vote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    #[serde(rename = "holderID")]
    pub holder_id: String,
    pub countries: Vec<String>,
    pub terms: Vec<CarrierTerms>,
    #[serde(default)]
    pub votes: Vec<Approval>,
}

impl Policy {
    /// Builds a fresh policy with one empty terms slot per country.
    ///
    /// The id is derived from the holder and the countries. A regenerated
    /// policy passes the id it replaces as `lineage` so it never reuses an
    /// id from its own history.
    pub fn draft(
        holder_id: &str,
        countries: &[String],
        lineage: Option<&str>,
    ) -> PolicyResult<Self> {
        if holder_id.is_empty() {
            return Err(PolicyError::InvalidArgument("holder id is empty".into()));
        }
        if countries.is_empty() {
            return Err(PolicyError::InvalidArgument(
                "a policy requires at least one country".into(),
            ));
        }
        for (i, country) in countries.iter().enumerate() {
            if country.is_empty() {
                return Err(PolicyError::InvalidArgument("country is empty".into()));
            }
            if countries[..i].contains(country) {
                return Err(PolicyError::InvalidArgument(format!(
                    "country {country} is listed more than once"
                )));
            }
        }

        let mut args = Vec::with_capacity(countries.len() + 2);
        args.push(holder_id.to_string());
        args.extend(countries.iter().cloned());
        if let Some(previous) = lineage {
            args.push(previous.to_string());
        }

        Ok(Self {
            id: derive_id(POLICY_HRP, &args)?,
            holder_id: holder_id.to_string(),
            countries: countries.to_vec(),
            terms: countries.iter().map(|c| CarrierTerms::empty(c)).collect(),
            votes: vec![],
        })
    }

    pub fn slot(&self, country: &str) -> Option<&CarrierTerms> {
        self.terms.iter().find(|t| t.country == country)
    }

    /// Fills the still-empty slot for the terms' country.
    pub fn fill_slot(&mut self, terms: CarrierTerms) -> PolicyResult<()> {
        match self
            .terms
            .iter_mut()
            .find(|t| t.country == terms.country && !t.is_filled())
        {
            Some(slot) => {
                *slot = terms;
                Ok(())
            }
            None => Err(PolicyError::RequirementNotFound {
                policy_id: self.id.clone(),
                requirement: format!("country {}", terms.country),
            }),
        }
    }

    /// Replaces the slot held by the same carrier for the same country.
    pub fn replace_slot(&mut self, terms: CarrierTerms) -> PolicyResult<()> {
        let policy_id = self.id.clone();
        let slot = self
            .terms
            .iter_mut()
            .find(|t| t.carrier_id == terms.carrier_id && t.country == terms.country)
            .ok_or_else(|| PolicyError::RequirementNotFound {
                policy_id: policy_id.clone(),
                requirement: format!("carrier {} for country {}", terms.carrier_id, terms.country),
            })?;

        if slot.id == terms.id {
            return Err(PolicyError::NoChange(policy_id));
        }
        *slot = terms;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.terms.iter().all(CarrierTerms::is_filled)
    }

    /// Carriers holding a terms slot, in slot order, each listed once.
    pub fn carriers(&self) -> Vec<&str> {
        let mut carriers: Vec<&str> = vec![];
        for terms in self.terms.iter().filter(|t| t.is_filled()) {
            if !carriers.contains(&terms.carrier_id.as_str()) {
                carriers.push(&terms.carrier_id);
            }
        }
        carriers
    }

    /// One blank approval per carrier holding terms.
    pub fn open_ballot(&mut self) {
        self.votes = self
            .carriers()
            .into_iter()
            .map(|carrier_id| Approval {
                carrier_id: carrier_id.to_string(),
                vote: Vote::Pending,
            })
            .collect();
    }

    /// Re-opens the ballot after a change, so every carrier votes again.
    pub fn clear_votes(&mut self) {
        if self.votes.is_empty() {
            self.open_ballot();
        }
        for approval in &mut self.votes {
            approval.vote = Vote::Pending;
        }
    }

    pub fn record_vote(&mut self, carrier_id: &str, vote: Vote) -> PolicyResult<()> {
        let policy_id = self.id.clone();
        let approval = self
            .votes
            .iter_mut()
            .find(|a| a.carrier_id == carrier_id)
            .ok_or_else(|| PolicyError::RequirementNotFound {
                policy_id: policy_id.clone(),
                requirement: format!("a vote from carrier {carrier_id}"),
            })?;

        if approval.vote.is_cast() {
            return Err(PolicyError::AlreadyVoted {
                policy_id,
                carrier_id: carrier_id.to_string(),
            });
        }
        approval.vote = vote;
        Ok(())
    }

    pub fn all_votes_cast(&self) -> bool {
        self.votes.iter().all(|a| a.vote.is_cast())
    }

    pub fn is_unanimous(&self) -> bool {
        !self.votes.is_empty() && self.votes.iter().all(|a| a.vote == Vote::Approve)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyHolder {
    pub id: String,
    pub policies: Vec<Policy>,
}
