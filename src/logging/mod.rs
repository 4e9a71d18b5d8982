//! Логирование на `tracing`: консольный и файловый sink, фильтр `EnvFilter`.

pub mod config;
mod filters;
mod formatter;
pub mod handle;
pub mod sinks;

pub use config::{FileSinkConfig, LogFormat, LoggingConfig, Rotation};
pub use handle::LoggingHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Инициализация глобального подписчика по конфигурации.
///
/// Повторная инициализация в том же процессе возвращает ошибку.
pub fn init_logging(
    mut config: LoggingConfig
) -> Result<LoggingHandle, Box<dyn std::error::Error + Send + Sync>> {
    config.apply_env_overrides();
    config.validate()?;
    config.ensure_log_dir()?;

    let env_filter = filters::build_filter_from_config(&config);
    let mut layers = Vec::new();

    if config.console_enabled {
        layers.push(sinks::console::layer(&config));
    }

    let file_guard = match &config.file {
        Some(file) => {
            let (layer, guard) = sinks::file::layer(&config, file);
            layers.push(layer);
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        git_commit = env!("GIT_COMMIT"),
        build_time = env!("BUILD_TIME"),
        log_level = %config.level,
        format = ?config.format,
        console_enabled = config.console_enabled,
        file_enabled = config.file.is_some(),
        "Logging system initialized"
    );

    Ok(LoggingHandle::new(file_guard))
}
