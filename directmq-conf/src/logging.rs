//! The `[log]` section.
//!
//! ```toml
//! [log]
//! to = "both"                              # off | file | console | both
//! level = "debug"                          # trace | debug | info | warn | error | critical
//! file = "/var/log/directmq/directmq.log"  # empty keeps records off the disk
//! ```

use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    #[serde(rename = "to")]
    pub target: LogTarget,
    #[serde(deserialize_with = "deserialize_level")]
    pub level: slog::Level,
    pub file: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { target: LogTarget::Console, level: slog::Level::Info, file: "/var/log/directmq/directmq.log".into() }
    }
}

impl LogSettings {
    /// Where records end up once the configured file is taken into account,
    /// a target naming a file but no file path degrades to what is left.
    pub fn effective_target(&self) -> LogTarget {
        if self.file.trim().is_empty() {
            self.target.without_file()
        } else {
            self.target
        }
    }
}

/// Where log records are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    Off,
    File,
    Console,
    Both,
}

impl LogTarget {
    #[inline]
    pub fn file(&self) -> bool {
        matches!(self, LogTarget::Both | LogTarget::File)
    }

    #[inline]
    pub fn console(&self) -> bool {
        matches!(self, LogTarget::Both | LogTarget::Console)
    }

    /// Drops console output, stdout carries agent notifications.
    pub fn without_console(self) -> Self {
        match self {
            LogTarget::Both | LogTarget::File => LogTarget::File,
            LogTarget::Console | LogTarget::Off => LogTarget::Off,
        }
    }

    pub fn without_file(self) -> Self {
        match self {
            LogTarget::Both | LogTarget::Console => LogTarget::Console,
            LogTarget::File | LogTarget::Off => LogTarget::Off,
        }
    }
}

fn deserialize_level<'de, D>(deserializer: D) -> Result<slog::Level, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    slog::Level::from_str(&name).map_err(|_| de::Error::custom(format!("unknown log level {name:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_target() {
        let mut log = LogSettings { target: LogTarget::Both, ..Default::default() };
        assert_eq!(log.effective_target(), LogTarget::Both);
        log.file = " ".into();
        assert_eq!(log.effective_target(), LogTarget::Console);
        log.target = LogTarget::File;
        assert_eq!(log.effective_target(), LogTarget::Off);
    }

    #[test]
    fn test_target() {
        assert!(LogTarget::Both.file() && LogTarget::Both.console());
        assert!(LogTarget::File.file() && !LogTarget::File.console());
        assert_eq!(LogTarget::Both.without_console(), LogTarget::File);
        assert_eq!(LogTarget::Console.without_console(), LogTarget::Off);
    }
}
