use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Формат вывода событий.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Период ротации файла логов.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// Файловый sink.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FileSinkConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub rotation: Rotation,
    /// Файл всегда пишется в JSON, если не указано иное.
    #[serde(default = "default_file_format")]
    pub format: LogFormat,
}

/// Конфигурация логирования.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// Директива `EnvFilter`: уровень (`info`) или список (`logmux=debug,warn`).
    /// Переменная `RUST_LOG` имеет приоритет.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_true")]
    pub console_enabled: bool,
    #[serde(default = "default_true")]
    pub with_ansi: bool,
    #[serde(default = "default_true")]
    pub with_target: bool,
    #[serde(default)]
    pub with_line_numbers: bool,
    #[serde(default)]
    pub file: Option<FileSinkConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            console_enabled: true,
            with_ansi: true,
            with_target: true,
            with_line_numbers: false,
            file: None,
        }
    }
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            prefix: default_file_prefix(),
            rotation: Rotation::default(),
            format: default_file_format(),
        }
    }
}

impl LoggingConfig {
    /// Переопределения из окружения: `LOGMUX_LOG_LEVEL`, `LOGMUX_LOG_FORMAT`,
    /// `LOGMUX_LOG_DIR`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("LOGMUX_LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(format) = std::env::var("LOGMUX_LOG_FORMAT") {
            match format.to_ascii_lowercase().as_str() {
                "compact" => self.format = LogFormat::Compact,
                "pretty" => self.format = LogFormat::Pretty,
                "json" => self.format = LogFormat::Json,
                other => eprintln!("Unknown LOGMUX_LOG_FORMAT '{other}', keeping {:?}", self.format),
            }
        }
        if let Ok(dir) = std::env::var("LOGMUX_LOG_DIR") {
            self.file.get_or_insert_with(FileSinkConfig::default).dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.level.trim().is_empty() {
            return Err("log level must not be empty".into());
        }
        if let Some(file) = &self.file {
            if file.prefix.is_empty() {
                return Err("log file prefix must not be empty".into());
            }
        }
        if !self.console_enabled && self.file.is_none() {
            return Err("at least one log sink must be enabled".into());
        }
        Ok(())
    }

    /// Создаёт каталог файлового sink, если он включён.
    pub fn ensure_log_dir(&self) -> std::io::Result<()> {
        match &self.file {
            Some(file) => std::fs::create_dir_all(&file.dir),
            None => Ok(()),
        }
    }

    pub fn build_filter_directive(&self) -> String {
        self.level.trim().to_string()
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_file_prefix() -> String {
    "logmux.log".to_string()
}

fn default_file_format() -> LogFormat {
    LogFormat::Json
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = LoggingConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.build_filter_directive(), "info");
        assert!(cfg.file.is_none());
    }

    #[test]
    fn test_no_sinks_is_invalid() {
        let cfg = LoggingConfig {
            console_enabled: false,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let cfg: LoggingConfig =
            serde_json::from_str(r#"{"level":"debug","format":"json","file":{"rotation":"hourly"}}"#)
                .unwrap();
        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.format, LogFormat::Json);
        let file = cfg.file.unwrap();
        assert_eq!(file.rotation, Rotation::Hourly);
        assert_eq!(file.prefix, "logmux.log");
        assert_eq!(file.format, LogFormat::Json);
    }
}
