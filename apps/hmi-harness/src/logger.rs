//! Logging for the harness: colored stdout plus a plain log file.
//!
//! Initialization runs once; later calls only warn. The log file lives in a
//! `logs/` directory under the config directory, and the previous run's file
//! is kept alongside as `hmi-harness.log.1`.

use crate::error::HarnessError;

use common::ErrorLocation;

use std::env;
use std::fs;
use std::io::stdout;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use fern::Dispatch;
use fern::colors::Color::{Blue, Green, Magenta, Red, Yellow};
use fern::colors::ColoredLevelConfig;
use humantime::format_rfc3339;
use log::{LevelFilter, info, warn};

static INIT_LOGGER_ONCE: Once = Once::new();

static LOGGER_ALREADY_CALLED: AtomicBool = AtomicBool::new(false);

pub const LOG_FILE_NAME: &str = "hmi-harness.log";
pub const PREVIOUS_LOG_FILE_NAME: &str = "hmi-harness.log.1";
const LOG_DIR_NAME: &str = "logs";

/// Overrides the log level (`trace`, `debug`, `info`, `warn`, `error`, `off`).
pub const LOG_LEVEL_ENV: &str = "HMI_HARNESS_LOG";

#[cfg(debug_assertions)]
const LOG_LEVEL: LevelFilter = LevelFilter::Debug;

#[cfg(not(debug_assertions))]
const LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// Directory the log file is written to for a given config directory.
pub fn log_dir(config_dir: &Path) -> PathBuf {
    config_dir.join(LOG_DIR_NAME)
}

/// Level from `HMI_HARNESS_LOG`, falling back to the build default.
pub fn level_from_env() -> LevelFilter {
    parse_level(env::var(LOG_LEVEL_ENV).ok().as_deref())
}

pub fn parse_level(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(LOG_LEVEL)
}

/// Move last run's log aside so each run starts a fresh file.
pub fn rotate_previous(log_dir: &Path) -> std::io::Result<()> {
    let current = log_dir.join(LOG_FILE_NAME);
    if current.exists() {
        fs::rename(&current, log_dir.join(PREVIOUS_LOG_FILE_NAME))?;
    }
    Ok(())
}

/// Initialize logging to stdout and `config_dir/logs/hmi-harness.log`.
///
/// Safe to call more than once: later calls log a warning and return Ok.
///
/// # Errors
///
/// Returns an error if the log directory or file cannot be created or a
/// global logger is already installed by someone else.
pub fn initialize(config_dir: &Path) -> Result<(), HarnessError> {
    if LOGGER_ALREADY_CALLED.swap(true, Ordering::SeqCst) {
        warn!("Logger already initialized");
        return Ok(());
    }

    let mut result = Ok(());

    INIT_LOGGER_ONCE.call_once(|| {
        let level = level_from_env();
        result = initialize_internal(&log_dir(config_dir), level);
        if result.is_ok() {
            info!("Logger initialized with level: {level:?}");
        }
    });

    result
}

#[track_caller]
fn initialize_internal(log_dir: &Path, level: LevelFilter) -> Result<(), HarnessError> {
    let log_file_path = log_dir.join(LOG_FILE_NAME);

    fs::create_dir_all(log_dir).map_err(|e| HarnessError::Harness {
        message: format!("Failed to create log directory for {}: {e}", log_file_path.display()),
        location: ErrorLocation::from(Location::caller()),
    })?;

    // Rotation failure is not fatal.
    if let Err(e) = rotate_previous(log_dir) {
        eprintln!("Failed to rotate {}: {e}", log_file_path.display());
    }

    let colors = ColoredLevelConfig::new()
        .debug(Blue)
        .info(Green)
        .warn(Yellow)
        .error(Red)
        .trace(Magenta);

    let stdout_dispatch = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{date} - {level}] {message} [{file}:{line}]",
                date = format_rfc3339(SystemTime::now()),
                level = colors.color(record.level()),
                file = record.file().unwrap_or("unknown"),
                line = record.line().unwrap_or(0),
            ))
        })
        .chain(stdout());

    let log_file = fern::log_file(&log_file_path).map_err(|e| HarnessError::Harness {
        message: format!("Failed to create log file {}: {e}", log_file_path.display()),
        location: ErrorLocation::from(Location::caller()),
    })?;

    // No colors in the file
    let file_dispatch = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{date} - {level}] {message} [{file}:{line}]",
                date = format_rfc3339(SystemTime::now()),
                level = record.level(),
                file = record.file().unwrap_or("unknown"),
                line = record.line().unwrap_or(0)
            ))
        })
        .chain(log_file);

    // Socket internals are capped at Info.
    let socket_level = level.min(LevelFilter::Info);

    Dispatch::new()
        .level(level)
        .level_for("tungstenite", socket_level)
        .level_for("tokio_tungstenite", socket_level)
        .chain(stdout_dispatch)
        .chain(file_dispatch)
        .apply()
        .map_err(|e| HarnessError::Harness {
            message: format!("Failed to initialize logger: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    Ok(())
}
