//! Плагин хоста: корень композиции мультиплексора.
//!
//! Собирает настройки, соединение с брокером и [`Mux`] в явном порядке, без
//! глобального реестра. Зависимости внедряются через построитель; то, что
//! не передано, получает значение по умолчанию.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use logmux_error::{ensure, LogLevel, LogmuxResult, ResultExt, StackError, StatusCode};

use crate::{
    config::MuxSettings,
    pubsub::{BrokerConnection, Codec, InMemoryBroker, Mux},
    MuxError, MuxResult,
};

const DEFAULT_PLUGIN_NAME: &str = "logmux";

/// Состояние плагина для проверки здоровья.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
    Disabled,
    Error(String),
}

impl fmt::Display for HealthStatus {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Disabled => write!(f, "disabled"),
            Self::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

/// Построитель [`MuxPlugin`].
pub struct MuxPluginBuilder<C: Codec> {
    name: String,
    codec: C,
    settings: Option<MuxSettings>,
    connection: Option<Arc<dyn BrokerConnection>>,
}

impl<C: Codec + Clone> MuxPluginBuilder<C> {
    pub fn with_name(
        mut self,
        name: impl Into<String>,
    ) -> Self {
        self.name = name.into();
        self
    }

    /// Готовые настройки вместо загрузки из окружения.
    pub fn with_settings(
        mut self,
        settings: MuxSettings,
    ) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Внешнее соединение с брокером. По умолчанию [`InMemoryBroker`].
    pub fn with_connection(
        mut self,
        connection: Arc<dyn BrokerConnection>,
    ) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Завершает сборку. Настройки, если не переданы, читаются из
    /// окружения `LOGMUX_*`.
    pub fn build(self) -> LogmuxResult<MuxPlugin<C>> {
        let settings = match self.settings {
            Some(settings) => settings,
            None => MuxSettings::load().context("loading messaging settings")?,
        };

        Ok(MuxPlugin {
            name: self.name,
            codec: self.codec,
            settings,
            connection: self.connection,
            mux: None,
            closed: AtomicBool::new(false),
        })
    }
}

/// Плагин обмена сообщениями.
pub struct MuxPlugin<C: Codec> {
    name: String,
    codec: C,
    settings: MuxSettings,
    connection: Option<Arc<dyn BrokerConnection>>,
    mux: Option<Mux<C>>,
    closed: AtomicBool,
}

impl<C: Codec + Clone> MuxPlugin<C> {
    pub fn builder(codec: C) -> MuxPluginBuilder<C> {
        MuxPluginBuilder {
            name: DEFAULT_PLUGIN_NAME.to_string(),
            codec,
            settings: None,
            connection: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &MuxSettings {
        &self.settings
    }

    /// Проверяет настройки и создаёт мультиплексор.
    ///
    /// Повторный вызов после успешной инициализации ничего не делает.
    /// Выключенный плагин мультиплексор не создаёт.
    pub fn init(&mut self) -> LogmuxResult<()> {
        self.try_init()
            .inspect_err(|err| log_init_failure(&self.name, err))
    }

    fn try_init(&mut self) -> LogmuxResult<()> {
        ensure!(
            !self.closed.load(Ordering::Acquire),
            MuxError::Closed
        );
        if self.mux.is_some() {
            return Ok(());
        }

        self.settings
            .validate()
            .with_context(|| format!("validating settings of plugin '{}'", self.name))?;

        if self.settings.disabled {
            tracing::info!(plugin = %self.name, "messaging plugin disabled");
            return Ok(());
        }

        let connection = self
            .connection
            .get_or_insert_with(|| {
                tracing::debug!(
                    partitions = self.settings.default_partitions,
                    "no broker connection injected, using in-memory broker"
                );
                let broker: Arc<dyn BrokerConnection> =
                    Arc::new(InMemoryBroker::new(self.settings.default_partitions));
                broker
            })
            .clone();
        ensure!(
            connection.is_healthy(),
            StatusCode::ConnectionFailed,
            "broker connection of plugin '{}' is not healthy",
            self.name
        );

        let mux = Mux::builder(connection, self.codec.clone())
            .send_timeout(self.settings.send_timeout())
            .build()
            .context("creating multiplexer")?;
        self.mux = Some(mux);

        tracing::info!(
            plugin = %self.name,
            client_id = %self.settings.client_id,
            brokers = ?self.settings.brokers,
            send_timeout_ms = self.settings.send_timeout_ms,
            git_commit = env!("GIT_COMMIT"),
            "messaging plugin initialized"
        );
        Ok(())
    }

    /// Мультиплексор инициализированного плагина.
    pub fn mux(&self) -> MuxResult<&Mux<C>> {
        if self.settings.disabled {
            return Err(MuxError::Disabled);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(MuxError::Closed);
        }
        self.mux.as_ref().ok_or(MuxError::NotInitialized)
    }

    pub fn status(&self) -> HealthStatus {
        if self.settings.disabled {
            return HealthStatus::Disabled;
        }
        if self.closed.load(Ordering::Acquire) {
            return HealthStatus::Error("plugin is closed".into());
        }
        match (&self.mux, &self.connection) {
            (Some(_), Some(conn)) if conn.is_healthy() => HealthStatus::Ok,
            (Some(_), _) => HealthStatus::Error("broker connection is unhealthy".into()),
            (None, _) => HealthStatus::Error("plugin is not initialized".into()),
        }
    }

    /// Останавливает подписки и закрывает соединение. Идемпотентен.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(mux) = &self.mux {
            mux.close();
        }
        if let Some(connection) = &self.connection {
            connection.close();
        }
        tracing::info!(plugin = %self.name, "messaging plugin closed");
    }
}

fn log_init_failure(
    plugin: &str,
    err: &StackError,
) {
    let code = err.status_code();
    match err.log_level() {
        LogLevel::Error => tracing::error!(
            plugin,
            %code,
            critical = err.is_critical(),
            error = %err,
            "messaging plugin init failed"
        ),
        LogLevel::Warn => tracing::warn!(plugin, %code, error = %err, "messaging plugin init failed"),
        _ => tracing::info!(plugin, %code, error = %err, "messaging plugin init failed"),
    }
}
