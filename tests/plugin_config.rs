//! Загрузка настроек из окружения и файла, жизненный цикл плагина.

use std::{env, io::Write, sync::Arc, time::Duration};

use bytes::Bytes;
use logmux::{
    BrokerConnection, HealthStatus, InMemoryBroker, MuxError, MuxPlugin, MuxSettings, RawCodec,
};
use serial_test::serial;

const VARS: &[&str] = &[
    "LOGMUX_BROKERS",
    "LOGMUX_DEFAULT_PARTITIONS",
    "LOGMUX_SEND_TIMEOUT_MS",
    "LOGMUX_DISABLED",
    "LOGMUX_CLIENT_ID",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_env_overrides_defaults() {
    clear_env();
    env::set_var("LOGMUX_BROKERS", "k1:9092,k2:9092");
    env::set_var("LOGMUX_SEND_TIMEOUT_MS", "1500");
    env::set_var("LOGMUX_CLIENT_ID", "billing-service");

    let settings = MuxSettings::load().unwrap();
    clear_env();

    assert_eq!(settings.brokers, vec!["k1:9092", "k2:9092"]);
    assert_eq!(settings.send_timeout(), Duration::from_millis(1500));
    assert_eq!(settings.client_id, "billing-service");
    assert_eq!(settings.default_partitions, 1);
}

#[test]
#[serial]
fn test_env_wins_over_file() {
    clear_env();
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "default_partitions = 8\nsend_timeout_ms = 100").unwrap();
    env::set_var("LOGMUX_DEFAULT_PARTITIONS", "3");

    let settings = MuxSettings::load_from(Some(file.path())).unwrap();
    clear_env();

    assert_eq!(settings.default_partitions, 3);
    assert_eq!(settings.send_timeout_ms, 100);
}

#[test]
#[serial]
fn test_invalid_env_value_is_rejected() {
    clear_env();
    env::set_var("LOGMUX_SEND_TIMEOUT_MS", "0");
    let result = MuxSettings::load();
    clear_env();

    assert!(matches!(result, Err(MuxError::InvalidSettings(_))));
}

/// Плагин без явных настроек читает окружение, включая флаг выключения.
#[tokio::test]
#[serial]
async fn test_plugin_disabled_from_env() {
    clear_env();
    env::set_var("LOGMUX_DISABLED", "true");
    let mut plugin = MuxPlugin::builder(RawCodec).build().unwrap();
    clear_env();

    plugin.init().unwrap();
    assert_eq!(plugin.status(), HealthStatus::Disabled);
    assert!(matches!(plugin.mux(), Err(MuxError::Disabled)));
}

/// Полный цикл: init, публикация и подписка через плагин, close.
#[tokio::test]
#[serial]
async fn test_plugin_lifecycle() {
    let broker = Arc::new(InMemoryBroker::new(2));
    let mut plugin = MuxPlugin::builder(RawCodec)
        .with_name("events")
        .with_settings(MuxSettings {
            send_timeout_ms: 500,
            ..Default::default()
        })
        .with_connection(broker.clone())
        .build()
        .unwrap();
    plugin.init().unwrap();
    assert_eq!(plugin.status(), HealthStatus::Ok);

    let mux = plugin.mux().unwrap().clone();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    mux.new_watcher("audit")
        .unwrap()
        .watch(
            move |msg: logmux::Message<Bytes>| {
                let _ = tx.send(msg.value);
            },
            ["events"],
        )
        .unwrap();
    mux.new_sync_publisher("events")
        .unwrap()
        .publish("k", Bytes::from_static(b"hello"))
        .await
        .unwrap();
    let value = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(value, Bytes::from_static(b"hello"));

    plugin.close();
    assert!(!broker.is_healthy());
    assert_eq!(mux.subscription_count(), 0);
    assert!(matches!(plugin.status(), HealthStatus::Error(_)));
}
