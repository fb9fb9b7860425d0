//! Tracing subscriber setup for the binary.
//!
//! Output goes through a non-blocking `tracing-appender` writer to stdout,
//! stderr or an append-mode file. The returned guard must outlive `main` so
//! buffered events are flushed.

use crate::config::{LogFormat, LoggingConfig};
use std::fs::OpenOptions;
use std::io;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber.
///
/// `level_override` (from the command line) wins over the configured level;
/// `RUST_LOG` wins over both. Unless `trace_deps` is set, HTTP and TLS
/// dependencies are held at `warn`.
pub fn init_logging(
    config: &LoggingConfig,
    level_override: Option<&str>,
    trace_deps: bool,
) -> io::Result<WorkerGuard> {
    let level = normalize_level(level_override.unwrap_or(&config.level));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if trace_deps {
            EnvFilter::new(level)
        } else {
            EnvFilter::new(format!(
                "{level},hyper=warn,hyper_util=warn,rustls=warn,notify=warn"
            ))
        }
    });

    let output = config.output.as_str();
    let (writer, guard) = if output.eq_ignore_ascii_case("stdout") {
        tracing_appender::non_blocking(io::stdout())
    } else if output.eq_ignore_ascii_case("stderr") {
        tracing_appender::non_blocking(io::stderr())
    } else {
        let file = OpenOptions::new().create(true).append(true).open(output)?;
        tracing_appender::non_blocking(file)
    };

    tracing_subscriber::registry()
        .with(build_layer(config, writer))
        .with(filter)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    Ok(guard)
}

fn build_layer(config: &LoggingConfig, writer: NonBlocking) -> BoxedLayer {
    let base = fmt::layer()
        .with_writer(writer)
        .with_target(config.include_target);

    match (&config.format, config.timestamps) {
        (LogFormat::Json, true) => base.json().with_span_events(FmtSpan::CLOSE).boxed(),
        (LogFormat::Json, false) => base
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .without_time()
            .boxed(),
        (LogFormat::Compact, true) => base.compact().boxed(),
        (LogFormat::Compact, false) => base.compact().without_time().boxed(),
        (LogFormat::Pretty, true) => base.pretty().boxed(),
        (LogFormat::Pretty, false) => base.pretty().without_time().boxed(),
    }
}

/// Maps a level name to a filter directive, falling back to `info`.
pub fn normalize_level(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    }
}
