pub mod catalog;
pub mod config;
pub mod error;
pub mod handlers;
pub mod holders;
pub mod policy;
pub mod service;
pub mod store;
pub mod utils;

pub use config::{LedgerConfig, LedgerKeys};
pub use error::{PolicyError, PolicyResult};
pub use handlers::PolicyContract;
pub use service::{Placement, PolicyService, PolicyStage};
