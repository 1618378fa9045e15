use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use channel_plugin::plugin::LogLevel;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Target of the one-line JSON records written for every flow step.
pub const STEP_TARGET: &str = "flow_step";

pub const DEFAULT_LOG_FILE: &str = "guide_creator.log";
pub const DEFAULT_EVENT_FILE: &str = "guide_creator_events.json";

/// Install the global subscriber: stdout, a rolling text log and a rolling
/// JSON file holding only `flow_step` records.
pub fn init_tracing(log_dir: &Path, log_file: &str, event_file: &str, log_level: LogLevel) -> Result<FileTelemetry> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("could not create log directory {}", log_dir.display()))?;
    FileTelemetry::init_files(log_level.as_filter(), log_dir.join(log_file), log_dir.join(event_file))
}

/// Counters for instrumented steps. Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct FileTelemetry {
    steps_started: Arc<AtomicU64>,
    steps_succeeded: Arc<AtomicU64>,
    steps_failed: Arc<AtomicU64>,
}

impl FileTelemetry {
    /// Initialize file based logging.
    ///
    /// - `log_level` is an `EnvFilter` directive (e.g. `"info"`); `RUST_LOG` wins when set.
    /// - `log_file` is the path to the rolling text log.
    /// - `event_file` is the path to the rolling JSON step log.
    pub fn init_files(log_level: &str, log_file: PathBuf, event_file: PathBuf) -> Result<Self> {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let (txt_dir, txt_name) = split_path(&log_file)?;
        let txt_appender = RollingFileAppender::new(Rotation::DAILY, txt_dir, txt_name);
        let txt_layer = fmt::layer().with_writer(txt_appender).with_ansi(false);

        let (json_dir, json_name) = split_path(&event_file)?;
        let json_appender = RollingFileAppender::new(Rotation::DAILY, json_dir, json_name);
        let json_layer = fmt::layer()
            .json()
            .with_writer(json_appender)
            .with_target(true)
            .with_filter(EnvFilter::new(format!("{STEP_TARGET}=info")));

        let stdout_layer = fmt::layer().with_target(false).with_filter(env_filter);

        Registry::default()
            .with(stdout_layer)
            .with(txt_layer.with_filter(EnvFilter::new(log_level)))
            .with(json_layer)
            .try_init()
            .map_err(|e| anyhow!("could not install tracing subscriber: {e}"))?;

        Ok(Self::default())
    }

    pub fn steps_started(&self) -> u64 {
        self.steps_started.load(Ordering::Relaxed)
    }

    pub fn steps_succeeded(&self) -> u64 {
        self.steps_succeeded.load(Ordering::Relaxed)
    }

    pub fn steps_failed(&self) -> u64 {
        self.steps_failed.load(Ordering::Relaxed)
    }

    /// Wrap one flow step with timing and logs.
    ///
    /// Any `info!`/`error!` inside `step` goes to the text log. At the end
    /// one JSON line (target = "flow_step") records name, latency and status.
    pub async fn instrument_step<Fut, T, E>(&self, name: &str, step: Fut) -> Result<T, E>
    where
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.steps_started.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        let result = step.await;

        let elapsed = start.elapsed().as_secs_f64() * 1_000.0;
        match &result {
            Ok(_) => {
                self.steps_succeeded.fetch_add(1, Ordering::Relaxed);
                info!("step `{}` succeeded in {:.1} ms", name, elapsed);
            }
            Err(err) => {
                self.steps_failed.fetch_add(1, Ordering::Relaxed);
                error!(error = %err, "step `{}` failed in {:.1} ms", name, elapsed);
            }
        }

        tracing::event!(
            target: STEP_TARGET,
            tracing::Level::INFO,
            step = name,
            latency_ms = elapsed,
            status = if result.is_ok() { "ok" } else { "error" },
        );

        result
    }
}

fn split_path(path: &Path) -> Result<(&Path, &std::ffi::OsStr)> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("log path {} has no file name", path.display()))?;
    Ok((dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn instrument_step_counts_outcomes() {
        let telemetry = FileTelemetry::default();
        let ok: Result<u32, String> = telemetry.instrument_step("one", async { Ok(1) }).await;
        let err: Result<u32, String> = telemetry
            .instrument_step("two", async { Err("boom".to_string()) })
            .await;

        assert_eq!(ok, Ok(1));
        assert_eq!(err, Err("boom".to_string()));
        assert_eq!(telemetry.steps_started(), 2);
        assert_eq!(telemetry.steps_succeeded(), 1);
        assert_eq!(telemetry.steps_failed(), 1);
        assert_eq!(telemetry.clone().steps_started(), 2);
    }

    #[test]
    fn split_path_needs_file_name() {
        assert!(split_path(Path::new("/")).is_err());
        let (dir, name) = split_path(Path::new("logs/app.log")).unwrap();
        assert_eq!(dir, Path::new("logs"));
        assert_eq!(name, "app.log");
    }
}
