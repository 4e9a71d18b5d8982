use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::{
    config::{FileSinkConfig, LoggingConfig, Rotation},
    formatter,
};

/// Файловый слой с ротацией и неблокирующей записью.
///
/// Guard нужно держать до завершения процесса, иначе хвост логов потеряется.
pub fn layer<S>(
    config: &LoggingConfig,
    file: &FileSinkConfig,
) -> (Box<dyn LayerTrait<S> + Send + Sync>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = match file.rotation {
        Rotation::Daily => rolling::daily(&file.dir, &file.prefix),
        Rotation::Hourly => rolling::hourly(&file.dir, &file.prefix),
        Rotation::Never => rolling::never(&file.dir, &file.prefix),
    };
    let (writer, guard) = non_blocking(appender);

    (
        formatter::build_formatter(config, file.format, writer, false),
        guard,
    )
}
