//! Logging Infrastructure
//!
//! Console output by default; a daily rolling file when a log directory is given.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Initialize the logger on stderr at `info`
pub fn init_logger() {
    let _ = init_logger_with_file(None, None);
}

/// Initialize the logger with optional file output
///
/// `RUST_LOG` wins over `log_level` when set. File output only kicks in when
/// `log_dir` already exists. The returned guard flushes the file writer on
/// drop and must live as long as the program.
pub fn init_logger_with_file(log_level: Option<&str>, log_dir: Option<&str>) -> Option<WorkerGuard> {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "split_station={level},label_printer={level},warn"
        ))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    if let Some(dir) = log_dir
        && Path::new(dir).is_dir()
    {
        let file_appender = tracing_appender::rolling::daily(dir, "split-station");
        let (writer, guard) = tracing_appender::non_blocking(file_appender);
        let _ = subscriber.with_ansi(false).with_writer(writer).try_init();
        return Some(guard);
    }

    let _ = subscriber.with_writer(std::io::stderr).try_init();
    None
}
