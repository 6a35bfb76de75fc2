//! File logging through `log4rs`. The terminal belongs to the UI, so nothing
//! is ever written to stdout or stderr.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::LevelFilter;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::config::ConsoleSettings;

/// Optional user-supplied logging configuration, relative to the working directory.
pub const LOG4RS_RELATIVE_PATH: &str = "config/log4rs.yaml";

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {l:<5} {t} - {m}{n}";

/// Installs the global logger.
///
/// `config/log4rs.yaml` wins when present; otherwise a single file appender
/// at `settings.log_file` and `settings.log_level` is used.
pub fn init(workspace_root: &Path, settings: &ConsoleSettings) -> Result<()> {
    let custom = workspace_root.join(LOG4RS_RELATIVE_PATH);
    if custom.exists() {
        log4rs::init_file(&custom, Default::default())
            .with_context(|| format!("failed to load {}", custom.display()))?;
        return Ok(());
    }

    let config = file_config(&log_path(workspace_root, settings), level(&settings.log_level))?;
    log4rs::init_config(config).context("failed to install logger")?;
    Ok(())
}

fn file_config(path: &Path, level: LevelFilter) -> Result<Config> {
    let appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    Config::builder()
        .appender(Appender::builder().build("file", Box::new(appender)))
        .build(Root::builder().appender("file").build(level))
        .context("invalid logging configuration")
}

fn log_path(workspace_root: &Path, settings: &ConsoleSettings) -> PathBuf {
    if settings.log_file.is_absolute() {
        settings.log_file.clone()
    } else {
        workspace_root.join(&settings.log_file)
    }
}

/// Parses a level name; unknown names fall back to `info`.
pub fn level(raw: &str) -> LevelFilter {
    raw.trim().parse().unwrap_or(LevelFilter::Info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_case_insensitive_with_fallback() {
        assert_eq!(level("debug"), LevelFilter::Debug);
        assert_eq!(level(" WARN "), LevelFilter::Warn);
        assert_eq!(level("off"), LevelFilter::Off);
        assert_eq!(level("chatty"), LevelFilter::Info);
    }

    #[test]
    fn relative_log_file_is_under_the_workspace() {
        let settings = ConsoleSettings::default();
        assert_eq!(
            log_path(Path::new("/srv/console"), &settings),
            PathBuf::from("/srv/console/logs/agent-console.log")
        );

        let absolute = ConsoleSettings {
            log_file: PathBuf::from("/var/log/console.log"),
            ..ConsoleSettings::default()
        };
        assert_eq!(
            log_path(Path::new("/srv/console"), &absolute),
            PathBuf::from("/var/log/console.log")
        );
    }
}
