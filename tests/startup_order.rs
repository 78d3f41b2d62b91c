//! Process-wide logging is in place before the driver is built.
//!
//! Lives in its own test binary: the logging subscriber is installed once
//! per process.

use yt_http_proxy::{Application, ProxyConfig};

#[tokio::test]
async fn driver_construction_is_logged() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("proxy.log");

    let mut config = ProxyConfig::default();
    config.observability.log_level = "info".into();
    config.observability.log_file = Some(log_path.clone());

    let app = Application::init(config).unwrap();
    app.shutdown();

    let log = std::fs::read_to_string(&log_path).unwrap();
    let singletons = log
        .find("Process singletons configured")
        .expect("logging was never configured");
    let driver = log
        .find("Upstream driver created")
        .expect("driver construction happened before logging was configured");
    assert!(singletons < driver);
}
