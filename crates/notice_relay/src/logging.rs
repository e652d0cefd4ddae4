//! Logger setup for the relay binary.
//!
//! Logs go to the terminal and to `./relay.log` in the current working
//! directory. `RELAY_LOG_LEVEL` overrides the default `info` level.

use std::fs::File;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

pub const LOG_FILE: &str = "./relay.log";
pub const LEVEL_VAR: &str = "RELAY_LOG_LEVEL";

/// Resolves the level from `RELAY_LOG_LEVEL`, falling back to `Info` for
/// unset or unknown values.
pub fn level_from(value: Option<&str>) -> LevelFilter {
    match value {
        Some(raw) => relay_logging::parse_level(raw).unwrap_or_else(|| {
            eprintln!("Warning: unknown {LEVEL_VAR} {raw:?}, using info");
            LevelFilter::Info
        }),
        None => LevelFilter::Info,
    }
}

/// Installs the terminal logger and, when the file can be created, the
/// `./relay.log` writer.
pub fn initialize(level: LevelFilter) {
    let config = build_config();
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if let Some(file_logger) = create_file_logger(Path::new(LOG_FILE), level, config) {
        loggers.push(file_logger);
    }
    let _ = CombinedLogger::init(loggers);
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        // reqwest and friends are chatty at debug level.
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("rustls")
        .build()
}

fn create_file_logger(
    path: &Path,
    level: LevelFilter,
    config: Config,
) -> Option<Box<WriteLogger<File>>> {
    let log_path = PathBuf::from(path);
    match File::create(&log_path) {
        Ok(file) => Some(WriteLogger::new(level, config, file)),
        Err(err) => {
            eprintln!("Warning: Could not create log file at {:?}: {}", log_path, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{build_config, create_file_logger, level_from};
    use log::LevelFilter;
    use tempfile::TempDir;

    #[test]
    fn level_defaults_to_info() {
        assert_eq!(level_from(None), LevelFilter::Info);
        assert_eq!(level_from(Some("chatty")), LevelFilter::Info);
        assert_eq!(level_from(Some("debug")), LevelFilter::Debug);
    }

    #[test]
    fn file_logger_is_skipped_when_path_is_unusable() {
        let temp = TempDir::new().unwrap();
        let missing_parent = temp.path().join("nope").join("relay.log");
        assert!(create_file_logger(&missing_parent, LevelFilter::Info, build_config()).is_none());

        let ok = temp.path().join("relay.log");
        assert!(create_file_logger(&ok, LevelFilter::Info, build_config()).is_some());
        assert!(ok.exists());
    }
}
