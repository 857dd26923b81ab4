// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # NameLedger Settlement Node
//!
//! Entry point for the `nameledger-node` binary. Parses CLI arguments,
//! initializes logging and metrics, wires one directory instance, starts
//! the settlement scheduler and serves the HTTP API.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the daemon
//! - `init`    — initialize the data directory and generate the admin key
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod settler;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;

use nameledger_contracts::NameService;
use nameledger_protocol::actions::{ActionLog, ActionLogConfig};
use nameledger_protocol::crypto::keys::{Address, Keypair};
use nameledger_protocol::rules::TransitionRules;
use nameledger_protocol::settlement::{
    GeneratorConfig, SchedulerConfig, SettlementProofGenerator, SettlementScheduler,
};
use nameledger_protocol::storage::{NameDb, StateStore};
use nameledger_protocol::zkp::{Groth16ProofSystem, ProofSystem};

use cli::{Commands, NameLedgerCli};
use logging::LogFormat;
use metrics::SettlerMetrics;
use settler::LocalSettlement;

/// File name of the administrator secret key inside the data directory.
const ADMIN_KEY_FILE: &str = "admin.key";

/// How often the state gauges are refreshed outside settlement cycles.
const GAUGE_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = NameLedgerCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the daemon: storage, contract, scheduler, API and metrics.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_DIRECTIVES, args.log_format);

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        capacity = args.circuit_capacity,
        "starting nameledger-node"
    );

    // --- Persistent storage ---
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = Arc::new(
        NameDb::open(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?,
    );
    tracing::info!(path = %db_path.display(), "database opened");

    // --- Directory state ---
    let admin = resolve_admin(args.admin.as_deref(), &args.data_dir)?;
    let store = Arc::new(
        StateStore::open(TransitionRules::new(admin), Arc::clone(&db))
            .context("failed to load committed state")?,
    );
    let log = Arc::new(
        ActionLog::open(ActionLogConfig::default(), Arc::clone(&db))
            .context("failed to load action log")?,
    );

    // --- Proof system ---
    let system = Arc::new(match args.setup_seed {
        Some(seed) => {
            tracing::warn!("using a seeded Groth16 setup; proofs are forgeable by anyone with the seed");
            Groth16ProofSystem::with_seed(args.circuit_capacity, seed)
        }
        None => Groth16ProofSystem::new(args.circuit_capacity),
    });
    let compiling = Arc::clone(&system);
    tokio::task::spawn_blocking(move || compiling.compile())
        .await
        .context("circuit setup task panicked")?
        .context("circuit setup failed")?;
    let system: Arc<dyn ProofSystem> = system;

    // --- Contract + generator ---
    let service = Arc::new(NameService::deploy(
        Arc::clone(&store),
        Arc::clone(&log),
        Arc::clone(&system),
    ));
    let generator = Arc::new(SettlementProofGenerator::new(
        store,
        log,
        system,
        GeneratorConfig::default(),
    ));

    // --- Metrics ---
    let node_metrics =
        Arc::new(SettlerMetrics::new().context("failed to register prometheus metrics")?);

    // --- Scheduler ---
    let target = Arc::new(LocalSettlement::new(
        Arc::clone(&service),
        generator,
        Arc::clone(&node_metrics),
    ));
    target.refresh_gauges();
    let scheduler = Arc::new(SettlementScheduler::new(
        Arc::clone(&target),
        SchedulerConfig {
            retry_wait: Duration::from_millis(args.retry_wait_ms),
            min_actions_to_settle: args.min_actions_to_settle,
            max_retries_before_settle: args.max_retries_before_settle,
        },
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    let gauge_task = {
        let scheduler = Arc::clone(&scheduler);
        let metrics = Arc::clone(&node_metrics);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(GAUGE_REFRESH_INTERVAL);
            loop {
                interval.tick().await;
                target.refresh_gauges();
                metrics.retry_counter.set(i64::from(scheduler.retry_counter()));
            }
        })
    };

    // --- API server ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            nameledger_protocol::config::PROTOCOL_VERSION,
        ),
        service,
        metrics: Arc::clone(&node_metrics),
    };
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, finishing the current cycle");
        }
    }

    gauge_task.abort();
    // A settlement in flight runs to completion before the loop exits.
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_task.await {
        tracing::error!("scheduler task failed: {}", e);
    }
    db.flush().context("failed to flush database")?;

    tracing::info!(settlements = scheduler.settlements(), "nameledger-node stopped");
    Ok(())
}

/// The administrator address: the flag when given, otherwise the address of
/// the key written by `init`.
fn resolve_admin(flag: Option<&str>, data_dir: &Path) -> Result<Address> {
    if let Some(hex) = flag {
        return hex
            .parse::<Address>()
            .with_context(|| format!("invalid admin address {:?}", hex));
    }

    let key_path = data_dir.join(ADMIN_KEY_FILE);
    let secret = std::fs::read_to_string(&key_path).with_context(|| {
        format!(
            "no --admin given and failed to read {} (run `init` first)",
            key_path.display()
        )
    })?;
    let keypair = Keypair::from_hex(&secret)
        .with_context(|| format!("malformed admin key in {}", key_path.display()))?;
    Ok(keypair.address())
}

/// Initializes a new data directory and generates the administrator keypair.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("nameledger_node=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let key_path = data_dir.join(ADMIN_KEY_FILE);
    if key_path.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to replace it",
            key_path.display()
        );
    }

    let keypair = Keypair::generate();
    std::fs::write(&key_path, keypair.to_hex())
        .with_context(|| format!("failed to write admin key to {}", key_path.display()))?;

    // Restrict permissions on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;
    }

    let address = keypair.address();
    tracing::info!(
        admin = %address,
        key_path = %key_path.display(),
        "admin keypair generated"
    );

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Admin key      : {}", key_path.display());
    println!("  Admin address  : {}", address);

    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("nameledger-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol        {}", nameledger_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed that branch never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
