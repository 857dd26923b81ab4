//! # CLI Interface
//!
//! Defines the command-line argument structure for `nameledger-node` using
//! `clap` derive. Supports three subcommands: `run`, `init`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use nameledger_protocol::config::{
    DEFAULT_RETRY_WAIT_MS, MAX_RETRIES_BEFORE_SETTLE, MAX_SETTLEMENT_BATCH, MIN_ACTIONS_TO_SETTLE,
};

use crate::logging::LogFormat;

/// NameLedger settlement daemon.
///
/// Accepts signed name actions, keeps the pending log, and periodically
/// folds it into a new committed root with a Groth16 settlement proof.
#[derive(Parser, Debug)]
#[command(
    name = "nameledger-node",
    about = "NameLedger settlement daemon",
    version,
    propagate_version = true
)]
pub struct NameLedgerCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the settlement daemon.
    Run(RunArgs),
    /// Initialize a data directory and generate the administrator keypair.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Data directory holding the sled database and the admin key.
    #[arg(long, short = 'd', env = "NAMELEDGER_DATA_DIR", default_value = "./nameledger-data")]
    pub data_dir: PathBuf,

    /// Hex-encoded administrator address.
    ///
    /// When omitted, the address is derived from `admin.key` in the data
    /// directory (written by `init`).
    #[arg(long, env = "NAMELEDGER_ADMIN")]
    pub admin: Option<String>,

    /// Port for the REST API.
    #[arg(long, env = "NAMELEDGER_API_PORT", default_value_t = 8740)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "NAMELEDGER_METRICS_PORT", default_value_t = 8741)]
    pub metrics_port: u16,

    /// Milliseconds between settlement cycles.
    #[arg(long, env = "RETRY_WAIT_MS", default_value_t = DEFAULT_RETRY_WAIT_MS)]
    pub retry_wait_ms: u64,

    /// Settle as soon as this many actions are pending.
    #[arg(long, env = "MIN_ACTIONS_TO_SETTLE", default_value_t = MIN_ACTIONS_TO_SETTLE)]
    pub min_actions_to_settle: usize,

    /// Settle any non-empty backlog after this many waiting cycles.
    #[arg(long, env = "MAX_RETRIES_BEFORE_SETTLE", default_value_t = MAX_RETRIES_BEFORE_SETTLE)]
    pub max_retries_before_settle: u32,

    /// Actions per settlement proof. Fixes the circuit shape.
    #[arg(long, env = "NAMELEDGER_CIRCUIT_CAPACITY", default_value_t = MAX_SETTLEMENT_BATCH)]
    pub circuit_capacity: usize,

    /// Deterministic Groth16 setup seed. Development only: anyone who knows
    /// the seed can forge proofs.
    #[arg(long, env = "NAMELEDGER_SETUP_SEED")]
    pub setup_seed: Option<u64>,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "NAMELEDGER_LOG_FORMAT", default_value = "pretty", value_parser = parse_log_format)]
    pub log_format: LogFormat,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "NAMELEDGER_DATA_DIR", default_value = "./nameledger-data")]
    pub data_dir: PathBuf,

    /// Overwrite an existing admin key.
    #[arg(long)]
    pub force: bool,
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    Ok(LogFormat::from_str_lossy(s))
}
