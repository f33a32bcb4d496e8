// SPDX-License-Identifier: GPL-3.0-only

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{LoggingConfig, LoggingLevel};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_PREFIX: &str = "partctl.log";
const KEEP_DAYS: u64 = 7;

/// Stdout carries command output, so logs go to stderr and, when a
/// directory is configured, to a daily rolling file.
pub(crate) fn init(config: &LoggingConfig) {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter(config.level));

    let Some(dir) = log_dir(config) else {
        tracing_subscriber::registry().with(stderr_layer).init();
        return;
    };

    match file_writer(&dir) {
        Ok((writer, guard)) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .with_filter(env_filter(config.level));

            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .init();

            // Keep the background logging worker alive for the duration of the process.
            let _ = LOG_GUARD.set(guard);
        }
        Err(e) => {
            eprintln!("partctl: failed to initialize file logging: {e:#}");
            tracing_subscriber::registry().with(stderr_layer).init();
        }
    }
}

/// `RUST_LOG` wins; otherwise operation reports stay visible at info.
fn env_filter(level: LoggingLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(default_directives(level)).unwrap_or_else(|_| EnvFilter::new("warn"))
    })
}

fn default_directives(level: LoggingLevel) -> String {
    let engine = match level {
        LoggingLevel::Debug | LoggingLevel::Trace => level,
        _ => LoggingLevel::Info,
    };
    format!(
        "{},part_engine={},part_sys={}",
        level.as_directive(),
        engine.as_directive(),
        level.as_directive()
    )
}

fn log_dir(config: &LoggingConfig) -> Option<PathBuf> {
    config
        .directory
        .clone()
        .or_else(|| std::env::var_os("PARTCTL_LOG_DIR").map(PathBuf::from))
}

fn file_writer(
    dir: &Path,
) -> anyhow::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    if let Err(e) = fs::create_dir_all(dir) {
        return Err(anyhow::anyhow!(
            "create log directory failed: {} ({})",
            dir.display(),
            e
        ));
    }

    let prefix = OsString::from(LOG_PREFIX);
    cleanup_old_logs(dir, &prefix);

    let appender = tracing_appender::rolling::daily(dir, &prefix);
    Ok(tracing_appender::non_blocking(appender))
}

fn cleanup_old_logs(dir: &Path, prefix: &OsString) {
    let cutoff = SystemTime::now().checked_sub(Duration::from_secs(KEEP_DAYS * 24 * 60 * 60));
    let Some(cutoff) = cutoff else { return };

    let prefix = prefix.to_string_lossy();

    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        // Only touch files created by our rolling appender.
        if !entry
            .file_name()
            .to_string_lossy()
            .starts_with(prefix.as_ref())
        {
            continue;
        }

        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if modified < cutoff {
            let _ = fs::remove_file(entry.path());
        }
    }
}
