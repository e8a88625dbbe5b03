pub type PolicyResult<T> = Result<T, PolicyError>;

#[derive(thiserror::Error, Debug)]
pub enum PolicyError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("No policy found with id: {0}")]
    NotFound(String),
    #[error("Policy {policy_id} does not require {requirement}")]
    RequirementNotFound {
        policy_id: String,
        requirement: String,
    },
    #[error("Terms submitted are not different than existing terms ({0})")]
    NoChange(String),
    #[error("Carrier {carrier_id} has already voted on policy {policy_id}")]
    AlreadyVoted {
        policy_id: String,
        carrier_id: String,
    },
    #[error("A policy with id {0} already exists")]
    DuplicatePolicy(String),
    #[error("Catalog stored under '{key}' could not be decoded: {source}")]
    CorruptState {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("State store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Received unknown function: {0}")]
    UnknownFunction(String),
    #[error("Failed to derive identifier: {0}")]
    Identity(String),
}

impl From<sled::Error> for PolicyError {
    fn from(err: sled::Error) -> Self {
        PolicyError::StoreUnavailable(err.to_string())
    }
}
