use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::{Duration, Instant},
};

use tracing_appender::non_blocking::WorkerGuard;

/// Handle для управления жизненным циклом логирования.
///
/// Держит guard файлового sink: пока handle жив, фоновый поток записи
/// работает.
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    flush_count: AtomicU64,
    shutdown_in_progress: AtomicBool,
    /// Timeout для flush при shutdown (по умолчанию 5 секунд)
    flush_timeout: Duration,
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            file_guard,
            flush_count: AtomicU64::new(0),
            shutdown_in_progress: AtomicBool::new(false),
            flush_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_flush_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    /// Отмечает запрос на flush; сам WorkerGuard сбрасывает буфер при drop.
    pub fn flush(&self) {
        let count = self.flush_count.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(flush_count = count, "logging flush requested");
    }

    pub fn flush_count(&self) -> u64 {
        self.flush_count.load(Ordering::Relaxed)
    }

    pub fn is_shutdown_in_progress(&self) -> bool {
        self.shutdown_in_progress.load(Ordering::Acquire)
    }

    /// Graceful shutdown: дожидается записи хвоста логов.
    pub fn shutdown(mut self) {
        self.shutdown_in_progress.store(true, Ordering::Release);
        tracing::info!(
            flushes = self.flush_count(),
            timeout_ms = self.flush_timeout.as_millis() as u64,
            "logging shutdown"
        );

        let start = Instant::now();
        drop(self.file_guard.take());
        let elapsed = start.elapsed();

        if elapsed > self.flush_timeout {
            eprintln!(
                "WARNING: Logging shutdown took {}ms (timeout: {}ms)",
                elapsed.as_millis(),
                self.flush_timeout.as_millis()
            );
        }
    }
}

impl Drop for LoggingHandle {
    fn drop(&mut self) {
        if self.file_guard.is_some() && !self.is_shutdown_in_progress() {
            eprintln!(
                "WARNING: LoggingHandle dropped without explicit shutdown(). \
                 Some logs may be lost."
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_without_file_sink() {
        let handle = LoggingHandle::new(None).with_flush_timeout(Duration::from_millis(10));
        assert!(!handle.has_file_sink());
        handle.flush();
        handle.flush();
        assert_eq!(handle.flush_count(), 2);
        handle.shutdown();
    }

    #[test]
    fn test_shutdown_releases_guard() {
        let (_writer, guard) = tracing_appender::non_blocking(std::io::sink());
        let handle = LoggingHandle::new(Some(guard));
        assert!(handle.has_file_sink());
        handle.shutdown();
    }
}
