//! Logging setup from composition options.
//!
//! Builds a `tracing-subscriber` stack according to the composition's
//! `print_log` / `log_file` / `log_level` options and installs it as the
//! global default. Installation is best-effort: if a subscriber is
//! already installed (test harnesses, embedding applications), the
//! existing one stays.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;

use crate::composition::{CompositionOptions, LogFile};

pub(crate) fn init(options: &CompositionOptions) {
    let file_path: Option<PathBuf> = match &options.log_file {
        LogFile::None => None,
        LogFile::Default => Some(PathBuf::from(format!("{}.log", options.logger_name))),
        LogFile::Path(path) => Some(path.clone()),
    };

    let file = file_path.and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                eprintln!(
                    "{}: cannot open log file {}: {e}; logging to stdout only",
                    options.logger_name,
                    path.display()
                );
            })
            .ok()
    });

    let filter = LevelFilter::from_level(options.log_level);
    let result = match (options.print_log, file) {
        (true, Some(file)) => {
            let subscriber = tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(false))
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                );
            tracing::subscriber::set_global_default(subscriber)
        }
        (true, None) => {
            let subscriber = tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(false));
            tracing::subscriber::set_global_default(subscriber)
        }
        (false, Some(file)) => {
            let subscriber = tracing_subscriber::registry().with(filter).with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            );
            tracing::subscriber::set_global_default(subscriber)
        }
        (false, None) => return,
    };
    // Already-set is fine: an embedding application owns the subscriber.
    let _ = result;
}
