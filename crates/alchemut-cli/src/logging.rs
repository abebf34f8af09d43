use crate::error::{CliError, Result};
use std::fs::File;
use std::path::PathBuf;
use tracing::Dispatch;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self},
    prelude::*,
};

fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::ERROR
    } else {
        match verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

/// Builds the subscriber for one run: compact stderr output plus an optional log file.
///
/// The returned dispatch is installed globally by the caller and handed to the
/// pipeline observer.
pub fn build_dispatch(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<Dispatch> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact();

    let subscriber = tracing_subscriber::registry()
        .with(level_filter(verbosity, quiet))
        .with(stderr_layer);

    if let Some(path) = log_file {
        let file = File::create(&path).map_err(CliError::Io)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_thread_ids(true)
            .with_target(true);

        Ok(Dispatch::new(subscriber.with(file_layer)))
    } else {
        Ok(Dispatch::new(subscriber))
    }
}

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<Dispatch> {
    let dispatch = build_dispatch(verbosity, quiet, log_file)?;
    tracing::dispatcher::set_global_default(dispatch.clone())
        .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to install the logger: {}", e)))?;
    Ok(dispatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::Once;
    use tracing::{debug, error, info, trace, warn};

    static INIT: Once = Once::new();

    fn ensure_global_logger_is_set() {
        INIT.call_once(|| {
            setup_logging(3, false, None).expect("Failed to set up global logger for tests");
        });
    }

    #[test]
    #[serial]
    fn initialization_and_macros_work() {
        ensure_global_logger_is_set();

        error!("This is an error");
        warn!("This is a warning");
        info!("This is info");
        debug!("This is debug");
        trace!("This is trace");
    }

    #[test]
    #[serial]
    fn dispatch_writes_to_log_file_when_scoped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("run.log");

        let dispatch = build_dispatch(2, false, Some(log_path.clone())).unwrap();
        tracing::dispatcher::with_default(&dispatch, || {
            debug!(phase = "apo", "Message for the scoped dispatch.");
        });

        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("Message for the scoped dispatch."));
        assert!(content.contains("DEBUG"));
        assert!(content.contains("ThreadId"));
    }

    #[test]
    fn quiet_keeps_errors_only() {
        assert_eq!(level_filter(3, true), LevelFilter::ERROR);
        assert_eq!(level_filter(0, false), LevelFilter::WARN);
        assert_eq!(level_filter(1, false), LevelFilter::INFO);
    }

    #[test]
    #[serial]
    fn invalid_log_file_path_propagates_error() {
        let invalid_path = PathBuf::from("/");

        if cfg!(unix) && invalid_path.is_dir() {
            let result = build_dispatch(0, false, Some(invalid_path));
            assert!(matches!(result, Err(CliError::Io(_))));
        }
    }
}
