use anyhow::Result;
use clap::Parser;
use sensorpoll::*;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::prelude::*;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[derive(Parser, Debug)]
#[command(name = "sensorpoll", version, about = "Polls a 1-Wire sensor bus and publishes readings and time buckets")]
struct Cli {
    /// Config file (default: $CONFIG_FILE or ./config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Stop after this many seconds; 0 runs until SIGINT/SIGTERM
    #[arg(short = 't', long, default_value_t = 0)]
    run_time: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the logLevel setting.
    let env_filter_set = std::env::var(EnvFilter::DEFAULT_ENV).is_ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, reload_handle) = tracing_subscriber::reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_timer(LocalTimer))
        .init();
    tracing::info!(run_time_secs = cli.run_time, "starting {}", version::banner());

    let log_level_hook: Option<worker::LogLevelHook> = if env_filter_set {
        None
    } else {
        Some(Arc::new(move |directive: &str| match EnvFilter::try_new(directive) {
            Ok(f) => {
                if let Err(e) = reload_handle.reload(f) {
                    tracing::warn!(error = %e, "log level reload failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, directive, "invalid log directive"),
        }))
    };

    let app_config = config::AppConfig::load(cli.config.as_deref())?;

    let store = Arc::new(store::TelemetryStore::connect(&app_config.store.path).await?);
    store.init().await?;

    let (settings_tx, settings_rx) = watch::channel(Arc::new(models::Settings::default()));
    let mut raw_settings = models::RawSettings::new();
    if let Err(e) = worker::refresh_settings(
        &store,
        &settings_tx,
        &mut raw_settings,
        log_level_hook.as_ref(),
    )
    .await
    {
        tracing::warn!(error = %e, "initial settings fetch failed; using defaults");
    }
    let settings_handle = worker::spawn_settings_refresh(
        store.clone(),
        settings_tx,
        app_config.store.settings_refresh_secs,
        raw_settings,
        log_level_hook,
    );

    let (tx, _) =
        broadcast::channel::<models::CycleOutput>(app_config.monitoring.broadcast_capacity);
    let status = Arc::new(worker::WorkerStatus::default());
    let owfs = bus::OwfsBus::new(&app_config.bus.root);
    tracing::info!(root = %owfs.root().display(), "sensor bus configured");
    let bus: Arc<dyn bus::SensorBus> = Arc::new(owfs);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let worker_handle = worker::spawn(
        worker::WorkerDeps {
            bus,
            store: store.clone(),
            settings_rx,
            tx: tx.clone(),
            status: status.clone(),
            shutdown_rx,
        },
        worker::WorkerConfig {
            poll_interval_ms: app_config.bus.poll_interval_ms,
            stats_log_interval_secs: app_config.monitoring.stats_log_interval_secs,
        },
    );

    let app = routes::app(tx, store, status);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let run_time = cli.run_time;
    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = async {
            if run_time == 0 {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(std::time::Duration::from_secs(run_time)).await;
        } => {
            tracing::info!(run_time_secs = run_time, "run time elapsed");
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
        }
    }

    let _ = shutdown_tx.send(());
    let _ = worker_handle.await;
    let _ = settings_handle.await;
    tracing::info!(
        stopped_at = %chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "execution stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
