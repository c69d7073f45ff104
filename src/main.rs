//! smm_relay service entry point
//!
//! ```text
//! --gateway : HTTP API + submission dispatcher
//! --worker  : reconciliation loop
//! (neither) : both in one process
//! ```

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use smm_relay::account::UserRepository;
use smm_relay::balance::{BalanceService, PgBalanceLedger, PgTransactionLog};
use smm_relay::catalog::PgCatalog;
use smm_relay::config::AppConfig;
use smm_relay::db::Database;
use smm_relay::gateway::{self, state::AppState};
use smm_relay::orders::{Dispatcher, OrderService, PgOrderStore};
use smm_relay::provider::HttpProviderFactory;
use smm_relay::reconcile::{ReconcileWorker, Reconciler};
use smm_relay::retry::RetryPolicy;
use smm_relay::task_lock::{LockKind, PgTaskLock};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

fn has_flag(flag: &str) -> bool {
    std::env::args().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut app_config =
        AppConfig::load(&env).with_context(|| format!("loading config for env '{}'", env))?;
    if let Some(port) = get_port_override() {
        app_config.gateway.port = port;
    }
    let _log_guard = smm_relay::logging::init_logging(&app_config);

    let (gateway_mode, worker_mode) = match (has_flag("--gateway"), has_flag("--worker")) {
        (false, false) => (true, true),
        flags => flags,
    };

    info!(
        env = %env,
        git_hash = env!("GIT_HASH"),
        gateway = gateway_mode,
        worker = worker_mode,
        "Starting smm_relay"
    );

    let db = Arc::new(
        Database::connect(&app_config.postgres_url)
            .await
            .context("connecting to PostgreSQL")?,
    );
    if app_config.run_migrations {
        db.migrate().await.context("running migrations")?;
    }
    let pool = db.pool().clone();

    // ==========================================================================
    // Collaborators
    // ==========================================================================
    let catalog = Arc::new(PgCatalog::new(pool.clone()));
    let store = Arc::new(PgOrderStore::new(pool.clone()));
    let lock_config = &app_config.task_lock;
    let balance = Arc::new(BalanceService::new(
        Arc::new(PgBalanceLedger::new(pool.clone())),
        Arc::new(PgTaskLock::new(pool.clone())),
        Arc::new(PgTransactionLog::new(pool.clone())),
        lock_config.ttl_for(LockKind::BalanceUpdate.as_str()),
        RetryPolicy::new(lock_config.release_attempts, lock_config.release_backoff()),
    ));
    let providers = Arc::new(
        HttpProviderFactory::new(app_config.dispatch.submit_timeout())
            .context("building provider HTTP client")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks: JoinSet<std::io::Result<()>> = JoinSet::new();
    let mut dispatch_workers = None;

    if worker_mode {
        if app_config.reconcile.enabled {
            let reconciler = Arc::new(Reconciler::new(
                catalog.clone(),
                store.clone(),
                providers.clone(),
                balance.clone(),
                app_config.reconcile.clone(),
            ));
            let worker = ReconcileWorker::new(reconciler);
            let stop = shutdown_rx.clone();
            tasks.spawn(async move {
                worker.run(stop).await;
                Ok(())
            });
        } else {
            warn!("Reconciliation disabled in config");
        }
    }

    if gateway_mode {
        let (dispatcher, workers) =
            Dispatcher::start(&app_config.dispatch, providers.clone(), store.clone());
        dispatch_workers = Some(workers);
        let orders = Arc::new(OrderService::new(
            catalog.clone(),
            balance.clone(),
            store.clone(),
            dispatcher,
        ));
        let state = Arc::new(
            AppState::new(
                orders,
                balance.clone(),
                Arc::new(UserRepository::new(pool.clone())),
                catalog.clone(),
                &app_config.gateway,
            )
            .with_database(db.clone()),
        );
        let gateway_config = app_config.gateway.clone();
        let mut stop = shutdown_rx.clone();
        tasks.spawn(async move {
            let shutdown = async move {
                let _ = stop.wait_for(|stop| *stop).await;
            };
            gateway::run_server(&gateway_config, state, shutdown).await
        });
    }

    tokio::select! {
        Some(result) = tasks.join_next() => log_task_exit(result),
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }

    // ==========================================================================
    // Shutdown: stop intake, then work off the submission queue
    // ==========================================================================
    let _ = shutdown_tx.send(true);
    let drain_timeout = app_config.dispatch.drain_timeout();

    // The gateway owns the last Dispatcher handle; its exit closes the queue
    let stopped = tokio::time::timeout(drain_timeout, async {
        while let Some(result) = tasks.join_next().await {
            log_task_exit(result);
        }
    })
    .await;
    if stopped.is_err() {
        warn!(
            timeout_ms = drain_timeout.as_millis() as u64,
            "Service tasks did not stop in time, aborting"
        );
        tasks.shutdown().await;
    }

    if let Some(workers) = dispatch_workers {
        let left = workers.drain(drain_timeout).await;
        if left > 0 {
            error!(
                outstanding = left,
                "Submissions lost at shutdown; affected orders keep provider_order_id = 0"
            );
        }
    }

    info!("smm_relay stopped");
    Ok(())
}

fn log_task_exit(result: Result<std::io::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!("Service task exited"),
        Ok(Err(e)) => error!(error = %e, "Gateway failed"),
        Err(e) => error!(error = %e, "Service task panicked"),
    }
}
