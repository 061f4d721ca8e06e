use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use ipviz::dashboard::{self, DashboardState};
use ipviz::{event_channel, Aggregator, Config, ConnectionListener, VisualizationState};

const STATS_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cfg = Config::parse();

    let filter = EnvFilter::try_new(&cfg.log_level)
        .with_context(|| format!("invalid log level: {}", cfg.log_level))?;
    fmt().with_env_filter(filter).with_target(true).init();

    cfg.validate().context("invalid configuration")?;
    let mapper = cfg.mapper().context("invalid grid configuration")?;
    if !mapper.covers_address_space() {
        warn!(
            order = cfg.order,
            shift = cfg.bucket_shift,
            "grid does not cover the whole IPv4 space, high addresses will be dropped"
        );
    }

    let state = Arc::new(VisualizationState::new(cfg.order));
    let (sink, events) = event_channel(cfg.queue_capacity);
    let shutdown = CancellationToken::new();

    let listener = ConnectionListener::bind(&cfg.bind, cfg.port, cfg.listener_settings())
        .await
        .with_context(|| format!("error listening on {}:{}", cfg.bind, cfg.port))?;

    let aggregator = tokio::spawn(Aggregator::new(mapper, state.clone(), events).run());
    let feeds = tokio::spawn(listener.serve(sink, shutdown.clone()));

    let dashboard = cfg.dashboard.map(|addr| {
        let dash = DashboardState {
            state: state.clone(),
            mapper,
        };
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = dashboard::serve(addr, dash, shutdown).await {
                error!(error = ?e, "dashboard stopped");
            }
        })
    });

    let reporter_state = state.clone();
    let reporter_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let mut interval = time::interval(STATS_INTERVAL);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = reporter_shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let stats = reporter_state.stats();
                    info!(
                        total = stats.total_events,
                        dropped = stats.dropped_events,
                        last = ?stats.last_address.map(|a| a.to_string()),
                        "event stats (60s)"
                    );
                }
            }
        }
    });

    shutdown_signal().await;
    info!("shutting down");
    shutdown.cancel();

    if let Err(e) = feeds.await {
        error!(error = %e, "listener task failed");
    }
    match aggregator.await {
        Ok(report) => info!(applied = report.applied, dropped = report.dropped, "ipviz stopped"),
        Err(e) => error!(error = %e, "aggregator task failed"),
    }
    if let Some(dashboard) = dashboard {
        if let Err(e) = dashboard.await {
            error!(error = %e, "dashboard task failed");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT"),
                    _ = sigterm.recv() => info!("received SIGTERM"),
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("received SIGINT");
    }
}
