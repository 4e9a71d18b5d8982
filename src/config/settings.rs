use std::{path::Path, time::Duration};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{MuxError, MuxResult};

const DEFAULT_BROKER: &str = "127.0.0.1:9092";
const DEFAULT_PARTITIONS: usize = 1;
const DEFAULT_SEND_TIMEOUT_MS: u64 = 10_000;

/// Настройки мультиплексора и его соединения с брокером.
///
/// Источники по возрастанию приоритета: значения по умолчанию, TOML-файл,
/// переменные окружения `LOGMUX_*` (`LOGMUX_BROKERS=a:9092,b:9092`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MuxSettings {
    pub brokers: Vec<String>,
    /// Число партиций для автоматически создаваемых топиков.
    pub default_partitions: usize,
    pub send_timeout_ms: u64,
    /// Плагин выключен: мультиплексор не создаётся.
    pub disabled: bool,
    pub client_id: String,
}

impl Default for MuxSettings {
    fn default() -> Self {
        Self {
            brokers: vec![DEFAULT_BROKER.to_string()],
            default_partitions: DEFAULT_PARTITIONS,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            disabled: false,
            client_id: default_client_id(),
        }
    }
}

impl MuxSettings {
    /// Загружает настройки из окружения.
    pub fn load() -> MuxResult<Self> {
        Self::load_from(None)
    }

    /// Загружает настройки из файла (если указан) и окружения.
    pub fn load_from(path: Option<&Path>) -> MuxResult<Self> {
        let mut builder = Config::builder()
            // Добавляем значения по умолчанию
            .set_default("brokers", vec![DEFAULT_BROKER])?
            .set_default("default_partitions", DEFAULT_PARTITIONS as u64)?
            .set_default("send_timeout_ms", DEFAULT_SEND_TIMEOUT_MS)?
            .set_default("disabled", false)?
            .set_default("client_id", default_client_id())?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // Добавляем переменные окружения с префиксом LOGMUX_
        let cfg = builder
            .add_source(
                Environment::with_prefix("LOGMUX")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("brokers"),
            )
            .build()?;

        let settings: Self = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> MuxResult<()> {
        if !self.disabled && self.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(MuxError::InvalidSettings(
                "at least one broker address is required".into(),
            ));
        }
        if self.default_partitions == 0 {
            return Err(MuxError::InvalidSettings(
                "default_partitions must be positive".into(),
            ));
        }
        if self.send_timeout_ms == 0 {
            return Err(MuxError::InvalidSettings(
                "send_timeout_ms must be positive".into(),
            ));
        }
        if self.client_id.is_empty() {
            return Err(MuxError::InvalidSettings("client_id must not be empty".into()));
        }
        Ok(())
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

fn default_client_id() -> String {
    format!("logmux-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    #[test]
    fn test_defaults() {
        let settings = MuxSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.send_timeout(), Duration::from_secs(10));
        assert!(settings.client_id.starts_with("logmux-"));
        assert_ne!(settings.client_id, MuxSettings::default().client_id);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            MuxSettings {
                brokers: vec![],
                ..Default::default()
            },
            MuxSettings {
                default_partitions: 0,
                ..Default::default()
            },
            MuxSettings {
                send_timeout_ms: 0,
                ..Default::default()
            },
            MuxSettings {
                client_id: String::new(),
                ..Default::default()
            },
        ];
        for settings in cases {
            assert!(matches!(
                settings.validate(),
                Err(MuxError::InvalidSettings(_))
            ));
        }
    }

    /// Выключенному плагину брокеры не нужны.
    #[test]
    fn test_disabled_without_brokers_is_valid() {
        let settings = MuxSettings {
            brokers: vec![],
            disabled: true,
            ..Default::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "brokers = [\"kafka-1:9092\", \"kafka-2:9092\"]\ndefault_partitions = 6\nsend_timeout_ms = 250"
        )
        .unwrap();

        let settings = MuxSettings::load_from(Some(file.path())).unwrap();
        assert_eq!(settings.brokers, vec!["kafka-1:9092", "kafka-2:9092"]);
        assert_eq!(settings.default_partitions, 6);
        assert_eq!(settings.send_timeout(), Duration::from_millis(250));
        assert!(!settings.disabled);
    }

    #[test]
    #[serial]
    fn test_missing_file_is_config_error() {
        let result = MuxSettings::load_from(Some(Path::new("/nonexistent/logmux.toml")));
        assert!(matches!(result, Err(MuxError::Config(_))));
    }
}
