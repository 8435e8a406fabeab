use std::fs;

use pagechat_core::Config;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

/// Log to a file under the data directory; the terminal belongs to the UI.
/// The returned guard flushes the writer when dropped, so keep it alive for
/// the whole program.
pub fn configure_logging() -> Option<WorkerGuard> {
    let log_path = Config::log_path()?;
    let dir = log_path.parent()?;
    let file_name = log_path.file_name()?;

    if let Err(e) = fs::create_dir_all(dir) {
        eprintln!("Failed to create log directory {}: {e}", dir.display());
        return None;
    }

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_log = tracing_subscriber::fmt::layer()
        .compact()
        .with_ansi(false)
        .with_target(false)
        .with_writer(writer);

    let subscriber = Registry::default().with(filter).with(file_log);
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {e}");
        return None;
    }

    Some(guard)
}
