// Background poll worker and settings refresher.
// The engine is synchronous; each cycle moves it onto a blocking thread (bus reads block on
// file I/O) and takes it back afterwards. Settings arrive through a watch channel as whole
// `Arc<Settings>` values and are read once per cycle.

use crate::bus::SensorBus;
use crate::models::{CycleOutput, RawSettings, Settings, changed_keys, point_count};
use crate::poll::PollCycle;
use crate::store::{CURRENT_PATH, TIMESERIES_PATH, TelemetryStore};
use chrono::Local;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{broadcast, watch};
use tokio::time::{Duration, Instant, interval};
use tracing::Instrument;

/// Rate limit for "no receivers" message (avoid logging every cycle when no one is on /ws/current)
const NO_RECEIVERS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Called with a tracing filter directive when the `logLevel` setting changes.
pub type LogLevelHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Shared, thread-safe worker status; read by the HTTP side and the stats log.
#[derive(Debug, Default)]
pub struct WorkerStatus {
    pub running: AtomicBool,
    pub cycles_total: AtomicU64,
    pub devices_known: AtomicUsize,
    pub points_published_total: AtomicU64,
    pub publish_failures_total: AtomicU64,
    pub ws_current_connections: AtomicUsize,
}

impl WorkerStatus {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "running": self.running.load(Ordering::Relaxed),
            "cyclesTotal": self.cycles_total.load(Ordering::Relaxed),
            "devicesKnown": self.devices_known.load(Ordering::Relaxed),
            "pointsPublishedTotal": self.points_published_total.load(Ordering::Relaxed),
            "publishFailuresTotal": self.publish_failures_total.load(Ordering::Relaxed),
            "wsCurrentClients": self.ws_current_connections.load(Ordering::Relaxed),
        })
    }
}

/// Bus, store, channels, and shutdown for the worker.
pub struct WorkerDeps {
    pub bus: Arc<dyn SensorBus>,
    pub store: Arc<TelemetryStore>,
    pub settings_rx: watch::Receiver<Arc<Settings>>,
    pub tx: broadcast::Sender<CycleOutput>,
    pub status: Arc<WorkerStatus>,
    pub shutdown_rx: tokio::sync::oneshot::Receiver<()>,
}

/// Worker timing config.
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    /// How often to log app stats (real seconds).
    pub stats_log_interval_secs: u64,
}

/// Outcome of publishing one cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub writes: usize,
    pub failures: usize,
    pub points: usize,
}

/// Runs one cycle on a blocking thread. Returns the engine with the cycle's output.
pub async fn run_cycle(
    engine: PollCycle<Local>,
    bus: Arc<dyn SensorBus>,
    settings: Arc<Settings>,
) -> anyhow::Result<(PollCycle<Local>, CycleOutput)> {
    tokio::task::spawn_blocking(move || {
        let mut engine = engine;
        let output = engine.run(bus.as_ref(), &settings, Local::now());
        (engine, output)
    })
    .await
    .map_err(|e| anyhow::anyhow!("poll cycle task join: {}", e))
}

/// Writes `current` and every rolled-up series of one cycle. Failures are logged and counted;
/// nothing is retried, the next cycle supersedes them.
pub async fn publish(store: &TelemetryStore, output: &CycleOutput) -> PublishReport {
    let mut report = PublishReport::default();

    report.writes += 1;
    let current = serde_json::to_value(&output.current);
    let result = match current {
        Ok(v) => store.update(CURRENT_PATH, &v).await,
        Err(e) => Err(e.into()),
    };
    match result {
        Ok(()) => tracing::debug!(devices = output.current.len(), "current reading published"),
        Err(e) => {
            report.failures += 1;
            tracing::warn!(error = %e, operation = "publish_current", "failed to publish current reading");
        }
    }

    for (device_id, sensors) in &output.timeseries_delta {
        for (sensor, series) in sensors {
            let path = format!("{}/{}/{}", TIMESERIES_PATH, device_id, sensor);
            report.writes += 1;
            let result = match serde_json::to_value(series) {
                Ok(v) => store.update(&path, &v).await,
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(()) => {
                    report.points += series.len();
                    tracing::debug!(path = %path, points = series.len(), "timeseries published");
                }
                Err(e) => {
                    report.failures += 1;
                    tracing::warn!(error = %e, path = %path, operation = "publish_timeseries", "failed to publish timeseries");
                }
            }
        }
    }
    report
}

pub fn spawn(deps: WorkerDeps, config: WorkerConfig) -> tokio::task::JoinHandle<()> {
    let WorkerDeps {
        bus,
        store,
        settings_rx,
        tx,
        status,
        mut shutdown_rx,
    } = deps;
    let WorkerConfig {
        poll_interval_ms,
        stats_log_interval_secs,
    } = config;

    let worker_span = tracing::span!(tracing::Level::DEBUG, "worker", poll_interval_ms);
    let worker = async move {
        let mut tick = interval(Duration::from_millis(poll_interval_ms));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut engine: PollCycle<Local> = PollCycle::new();
        let mut last_no_receivers_log: Option<Instant> = None;
        let mut paused = false;
        status.running.store(true, Ordering::Relaxed);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let settings = settings_rx.borrow().clone();
                    if !settings.poll_enable {
                        if !paused {
                            tracing::info!("polling paused by settings");
                            paused = true;
                        }
                        continue;
                    }
                    if paused {
                        tracing::info!("polling resumed");
                        paused = false;
                    }

                    let output = match run_cycle(std::mem::take(&mut engine), bus.clone(), settings).await {
                        Ok((e, output)) => {
                            engine = e;
                            output
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, operation = "poll_cycle", "poll cycle failed; device state reset");
                            continue;
                        }
                    };
                    status.cycles_total.fetch_add(1, Ordering::Relaxed);
                    status.devices_known.store(output.current.len(), Ordering::Relaxed);

                    let report = publish(&store, &output).await;
                    status.points_published_total.fetch_add(report.points as u64, Ordering::Relaxed);
                    status.publish_failures_total.fetch_add(report.failures as u64, Ordering::Relaxed);
                    if point_count(&output.timeseries_delta) > 0 {
                        tracing::info!(points = report.points, failures = report.failures, "timeseries published");
                    }

                    if tx.send(output).is_err() {
                        let should_log = last_no_receivers_log
                            .is_none_or(|t| t.elapsed() >= NO_RECEIVERS_LOG_INTERVAL);
                        if should_log {
                            tracing::debug!(
                                operation = "broadcast_cycle",
                                "No active WebSocket clients; broadcast channel has no receivers"
                            );
                            last_no_receivers_log = Some(Instant::now());
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("Worker shutting down");
                    break;
                }
                _ = stats_log_tick.tick() => {
                    tracing::info!(
                        cycles_total = status.cycles_total.load(Ordering::Relaxed),
                        devices_known = status.devices_known.load(Ordering::Relaxed),
                        points_published_total = status.points_published_total.load(Ordering::Relaxed),
                        publish_failures_total = status.publish_failures_total.load(Ordering::Relaxed),
                        ws_current_clients = status.ws_current_connections.load(Ordering::Relaxed),
                        "app stats"
                    );
                }
            }
        }
        status.running.store(false, Ordering::Relaxed);
    };
    tokio::spawn(worker.instrument(worker_span))
}

/// Fetches settings once, logs what changed against `previous`, and replaces the watch value
/// when the parsed snapshot differs. A failed fetch keeps the current snapshot.
pub async fn refresh_settings(
    store: &TelemetryStore,
    settings_tx: &watch::Sender<Arc<Settings>>,
    previous: &mut RawSettings,
    log_level_hook: Option<&LogLevelHook>,
) -> anyhow::Result<bool> {
    let raw = store.fetch_settings().await?;

    let changed = changed_keys(previous, &raw);
    if changed.is_empty() {
        tracing::debug!("no new settings detected");
    }
    let first = previous.is_empty();
    for key in &changed {
        match raw.get(key) {
            Some(entry) if first => {
                tracing::info!(key = %key, name = %entry.name, value = %entry.value, "setting detected")
            }
            Some(entry) => {
                tracing::info!(key = %key, name = %entry.name, value = %entry.value, "setting changed")
            }
            None => tracing::info!(key = %key, "setting removed; default applies"),
        }
    }
    *previous = raw;

    let next = Settings::from_entries(previous);
    let current = settings_tx.borrow().clone();
    if *current == next {
        return Ok(false);
    }
    if let Some(hook) = log_level_hook
        && current.log_directive() != next.log_directive()
    {
        tracing::info!(level = next.log_directive(), "log level updated from settings");
        hook(next.log_directive());
    }
    settings_tx.send_replace(Arc::new(next));
    Ok(true)
}

/// Spawns the settings refresher. Stops once every settings receiver is gone.
pub fn spawn_settings_refresh(
    store: Arc<TelemetryStore>,
    settings_tx: watch::Sender<Arc<Settings>>,
    refresh_secs: u64,
    mut previous: RawSettings,
    log_level_hook: Option<LogLevelHook>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(refresh_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = refresh_settings(&store, &settings_tx, &mut previous, log_level_hook.as_ref()).await {
                        tracing::warn!(error = %e, operation = "fetch_settings", "failed to refresh settings");
                    }
                }
                _ = settings_tx.closed() => {
                    tracing::debug!("Settings refresher shutting down");
                    break;
                }
            }
        }
    })
}
