//! Process-wide log setup for binaries that drive mapping streams.
//!
//! By default only stream lifecycle (done signal, implicit close, run results,
//! upstream failures) is logged. Per-frame outcomes such as unmapped frames
//! and resolver errors sit at `debug`/`trace` in `stream_mapper_core` and are
//! switched on with [`ObservabilitySettings::frame_outcomes`].

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const ENABLED_VAR: &str = "STREAM_MAPPER_OBSERVABILITY";
const FILTER_VAR: &str = "STREAM_MAPPER_LOG_LEVEL";
const JSON_LOG_PATH_VAR: &str = "STREAM_MAPPER_JSON_LOG_PATH";

const LIFECYCLE_DIRECTIVES: &str =
    "warn,stream_mapper_core=info,stream_mapper_harness=info,stream_mapper_cli=info";
const FRAME_DIRECTIVES: &str =
    "warn,stream_mapper_core=trace,stream_mapper_harness=debug,stream_mapper_cli=info";

const DEFAULT_JSON_LOG_FILE: &str = "stream-mapper.logs.jsonl";

/// Where log records go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogOutput {
    /// Nothing is installed.
    Off,
    /// Compact lines on stderr; stdout stays free for events.
    Console,
    /// JSON lines appended to a file.
    JsonFile(PathBuf),
}

/// Log configuration, usually read from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservabilitySettings {
    /// Explicit `EnvFilter` directives; overrides the built-in defaults.
    pub filter: Option<String>,
    /// Log every frame outcome, not just stream lifecycle.
    pub frame_outcomes: bool,
    pub output: LogOutput,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            filter: None,
            frame_outcomes: false,
            output: LogOutput::Console,
        }
    }
}

impl ObservabilitySettings {
    /// Reads the settings from the process environment.
    ///
    /// - `STREAM_MAPPER_OBSERVABILITY`: `0`/`false`/`off` disables logging.
    /// - `STREAM_MAPPER_LOG_LEVEL`, then `RUST_LOG`: filter directives.
    /// - `STREAM_MAPPER_JSON_LOG_PATH`: write JSON lines to this file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup(ENABLED_VAR)
            .and_then(|value| parse_bool_env(&value))
            .unwrap_or(true);
        let filter = lookup(FILTER_VAR)
            .or_else(|| lookup("RUST_LOG"))
            .filter(|directives| !directives.trim().is_empty());
        let output = if !enabled {
            LogOutput::Off
        } else if let Some(path) = lookup(JSON_LOG_PATH_VAR).filter(|p| !p.trim().is_empty()) {
            LogOutput::JsonFile(PathBuf::from(path))
        } else {
            LogOutput::Console
        };
        Self {
            filter,
            frame_outcomes: false,
            output,
        }
    }

    /// Turns per-frame logging on or off. An explicit filter still wins.
    pub fn frame_outcomes(mut self, enabled: bool) -> Self {
        self.frame_outcomes = enabled;
        self
    }

    fn directives(&self) -> &str {
        match &self.filter {
            Some(filter) => filter.as_str(),
            None if self.frame_outcomes => FRAME_DIRECTIVES,
            None => LIFECYCLE_DIRECTIVES,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(self.directives())
            .unwrap_or_else(|_| EnvFilter::new(LIFECYCLE_DIRECTIVES))
    }
}

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Splits a log file path into the directory and file name the appender wants.
fn log_file_parts(path: &Path) -> (&Path, &str) {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_JSON_LOG_FILE);
    (dir, file_name)
}

/// Installs logging from [`ObservabilitySettings::from_env`].
pub fn init_observability() {
    init_observability_with(ObservabilitySettings::from_env());
}

/// Installs logging once per process; later calls are no-ops.
pub fn init_observability_with(settings: ObservabilitySettings) {
    INIT.get_or_init(|| {
        let env_filter = settings.env_filter();
        match &settings.output {
            LogOutput::Off => {}
            LogOutput::JsonFile(path) => {
                let (dir, file_name) = log_file_parts(path);
                let _ = std::fs::create_dir_all(dir);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_writer(tracing_appender::rolling::never(dir, file_name));
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
            LogOutput::Console => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}
