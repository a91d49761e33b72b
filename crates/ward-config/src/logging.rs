use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Once};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// A level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json: bool,

    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to this file as well. If it cannot be opened, file logging
    /// is disabled and the other sinks stay active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    /// `level` as filter directives, with `warning` accepted for `warn`.
    pub(crate) fn level_directives(&self) -> String {
        let level = self.level.trim();
        if level.is_empty() {
            return Self::default_level();
        }
        if level.eq_ignore_ascii_case("warning") {
            return "warn".to_owned();
        }
        level.to_owned()
    }

    /// The effective filter: `level`, with `RUST_LOG` layered on top when set.
    ///
    /// Falls back to `RUST_LOG` alone, then to `level` alone, then to `info`
    /// when a combination does not parse.
    pub fn env_filter(&self) -> EnvFilter {
        let configured = self.level_directives();
        let from_env = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let mut attempts = Vec::with_capacity(3);
        if let Some(env) = from_env {
            attempts.push(format!("{configured},{env}"));
            attempts.push(env);
        }
        attempts.push(configured);
        attempts
            .into_iter()
            .find_map(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

static TRACING_INIT: Once = Once::new();

/// Install the global `tracing` subscriber.
///
/// Safe to call repeatedly; only the first call installs anything. Returns
/// whether this call installed the subscriber.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let mut installed = false;
    TRACING_INIT.call_once(|| {
        let filter = config.env_filter();

        let file = config.file.as_ref().and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
        let file_open_failed = config.file.is_some() && file.is_none();

        let mut make_writer = BoxMakeWriter::new(io::sink);
        if config.stderr {
            // Test output capture only sees `eprint!`, so debug builds go through `TestWriter`.
            if cfg!(debug_assertions) {
                make_writer = BoxMakeWriter::new(
                    make_writer.and(tracing_subscriber::fmt::writer::TestWriter::with_stderr),
                );
            } else {
                make_writer = BoxMakeWriter::new(make_writer.and(io::stderr));
            }
        }
        if let Some(file) = file {
            // `&File` is a writer, so a shared handle serves every event.
            make_writer = BoxMakeWriter::new(make_writer.and(Arc::new(file)));
        }

        let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if config.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(filter).with(layer);
        installed = tracing::subscriber::set_global_default(subscriber).is_ok();
        if installed && file_open_failed {
            if let Some(path) = config.file.as_ref() {
                tracing::warn!(
                    target = "ward.config",
                    path = %path.display(),
                    "failed to open log file; file logging disabled"
                );
            }
        }
    });
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_synonyms_normalize() {
        let level = |level: &str| LoggingConfig {
            level: level.to_owned(),
            ..LoggingConfig::default()
        };
        assert_eq!(level(" WARNING ").level_directives(), "warn");
        assert_eq!(level("").level_directives(), "info");
        assert_eq!(level("ward.guard=debug").level_directives(), "ward.guard=debug");
    }

    #[test]
    fn repeated_init_is_harmless() {
        let config = LoggingConfig {
            stderr: false,
            ..LoggingConfig::default()
        };
        let first = init_tracing(&config);
        let second = init_tracing(&config);
        assert!(!second);
        // Another test binary may have installed a subscriber first.
        let _ = first;
    }
}
