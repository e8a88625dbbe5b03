//! # policy-ledger CLI
//!
//! Opens a sled database and runs a single invocation or query against it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use policy_ledger::{
    LedgerConfig, LedgerKeys, PolicyContract, PolicyService, store::SledStore, utils,
};
use tracing_subscriber::EnvFilter;

/// Multi-carrier insurance policy ledger.
#[derive(Parser, Debug)]
#[command(name = "policy-ledger", version, about)]
struct Cli {
    /// TOML file with `db_path` and a `[keys]` table
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Overrides the database path from the config file
    #[arg(long, value_name = "DIR")]
    db: Option<PathBuf>,

    /// Prefix for every ledger key
    #[arg(long)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a state-changing function (init, generatePolicy, assignTerms, castVote,
    /// modifyPolicy).
    Invoke {
        function: String,
        args: Vec<String>,
    },
    /// Read a catalog (getIncompletePolicies, getPendingPolicies, getActivePolicies,
    /// getHolderPolicies).
    Query {
        function: String,
        args: Vec<String>,
    },
    /// Mint a fresh holder or carrier id.
    NewId {
        #[arg(default_value = "holder")]
        prefix: String,
    },
}

fn open_contract(
    config: Option<PathBuf>,
    db: Option<PathBuf>,
    namespace: Option<String>,
) -> anyhow::Result<PolicyContract<SledStore>> {
    let mut config = match &config {
        Some(path) => LedgerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => LedgerConfig::default(),
    };
    if let Some(db) = db {
        config.db_path = db;
    }
    if let Some(namespace) = &namespace {
        config.keys = LedgerKeys::namespaced(namespace);
    }

    let db = sled::open(&config.db_path)
        .with_context(|| format!("failed to open database at {}", config.db_path.display()))?;
    Ok(PolicyContract::new(PolicyService::new(
        SledStore::new(Arc::new(db)),
        config.keys,
    )))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli {
        config,
        db,
        namespace,
        command,
    } = Cli::parse();

    let output = match command {
        Commands::NewId { prefix } => utils::new_party_id(&prefix)?.into_bytes(),
        Commands::Invoke { function, args } => {
            open_contract(config, db, namespace)?
                .invoke(&function, &args)
                .with_context(|| format!("invoke {function} failed"))?
        }
        Commands::Query { function, args } => {
            open_contract(config, db, namespace)?
                .query(&function, &args)
                .with_context(|| format!("query {function} failed"))?
        }
    };

    if !output.is_empty() {
        println!("{}", String::from_utf8_lossy(&output));
    }
    Ok(())
}
