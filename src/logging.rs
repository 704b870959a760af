use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

fn filter(default_level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(default_level).into())
        .from_env_lossy()
}

/// Logs to stdout. `RUST_LOG` overrides `default_level`.
pub fn init_stdout(default_level: Level) {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_target(false)
        .with_line_number(true)
        .with_env_filter(filter(default_level))
        .init();
}

/// Logs to `<dir>/<file_prefix>.log` through a background writer.
///
/// Keep the returned guard alive for as long as logs should be flushed.
pub fn init_file(dir: impl AsRef<Path>, file_prefix: &str, default_level: Level) -> WorkerGuard {
    let appender = tracing_appender::rolling::never(dir, format!("{file_prefix}.log"));
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::NONE)
        .with_target(false)
        .with_line_number(false)
        .with_ansi(false)
        .with_writer(writer)
        .with_env_filter(filter(default_level))
        .init();

    guard
}
