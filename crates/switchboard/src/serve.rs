// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `switchboard serve` command implementation.
//!
//! Opens storage, restores paired tenants through the bridge sidecar, starts
//! the queue workers, the scheduled-message ticker and the limiter sweeper,
//! then serves the gateway until a shutdown signal arrives.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use switchboard_bridge::BridgeFactory;
use switchboard_config::SwitchboardConfig;
use switchboard_core::{PluginAdapter, StorageAdapter, SwitchboardError};
use switchboard_gateway::{
    AppState, AuthConfig, HealthState, RateLimiter, RoomBroadcaster, build_router, start_server,
};
use switchboard_prometheus::PrometheusAdapter;
use switchboard_queue::QueueWorker;
use switchboard_session::{
    AutomationService, CallService, InstanceManager, ManagerDeps, SyncService, run_scheduler,
};
use switchboard_storage::SqliteStorage;
use switchboard_webhook::WebhookDispatcher;

use crate::shutdown;

/// Runs the `switchboard serve` command.
pub async fn run_serve(config: SwitchboardConfig) -> Result<(), SwitchboardError> {
    init_tracing(&config.logging.level);

    info!(version = env!("CARGO_PKG_VERSION"), "starting switchboard serve");

    let storage = Arc::new(
        SqliteStorage::new(config.storage.clone())
            .with_poll_interval(Duration::from_millis(config.queue.poll_interval_ms)),
    );
    storage.initialize().await?;

    let prometheus = match PrometheusAdapter::new() {
        Ok(adapter) => Some(adapter),
        Err(e) => {
            warn!(error = %e, "metrics disabled");
            None
        }
    };

    let rooms = RoomBroadcaster::new(config.rooms.send_buffer);
    let webhooks = Arc::new(WebhookDispatcher::new(storage.clone(), &config.webhook)?);
    let manager = InstanceManager::new(
        ManagerDeps {
            store: storage.clone(),
            factory: Arc::new(BridgeFactory::new(config.bridge.clone())),
            sink: webhooks.clone(),
            broadcaster: Arc::new(rooms.clone()),
        },
        config.session.clone(),
        config.server.public_url.clone(),
    );

    let restored = manager.load_all().await?;
    info!(restored, bridge = %config.bridge.url, "tenants restored");

    let queue = QueueWorker::new(
        storage.clone(),
        manager.clone(),
        webhooks.clone(),
        config.queue.clone(),
    );

    let cancel = shutdown::install_signal_handler();

    let queue_task = {
        let queue = queue.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { queue.run(cancel).await })
    };
    let scheduler_task = tokio::spawn(run_scheduler(
        manager.clone(),
        Duration::from_secs(config.scheduler.tick_secs),
        cancel.clone(),
    ));

    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
    let sweeper_task = limiter.spawn_sweeper(
        Duration::from_secs(config.rate_limit.sweep_secs),
        cancel.clone(),
    );

    if config.server.api_key.is_none() {
        warn!("no server.api_key configured, every protected route will answer 401");
    }
    let auth = AuthConfig {
        api_key: config.server.api_key.clone(),
    };

    let prometheus_render = prometheus.map(|adapter| {
        Arc::new(move || adapter.render()) as Arc<dyn Fn() -> String + Send + Sync>
    });
    let state = AppState {
        automation: AutomationService::new(manager.clone()),
        calls: CallService::new(manager.clone()),
        sync: SyncService::new(manager.clone()),
        manager: manager.clone(),
        queue,
        webhooks,
        rooms: rooms.clone(),
        rooms_config: config.rooms.clone(),
        health: HealthState {
            storage: storage.clone(),
            start_time: Instant::now(),
            prometheus_render,
        },
    };

    let app = build_router(state, auth, limiter);
    let served = start_server(&config.server, app, cancel.clone()).await;

    // A bind or serve error must still stop the background tasks.
    cancel.cancel();
    rooms.close_all();
    for (name, task) in [
        ("queue", queue_task),
        ("scheduler", scheduler_task),
        ("rate limit sweeper", sweeper_task),
    ] {
        if let Err(e) = task.await {
            warn!(task = name, error = %e, "background task ended abnormally");
        }
    }

    manager.close().await;
    if let Err(e) = storage.shutdown().await {
        warn!(error = %e, "storage shutdown failed");
    }

    served?;
    info!("switchboard serve shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("switchboard={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
