//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use yt_http_proxy::admission::ManualProbe;
use yt_http_proxy::driver::{Driver, DriverError, DriverRequest, ExecutionMode, InputStream, OutputSink};
use yt_http_proxy::{Application, HttpServer, ProxyConfig, Shutdown};

/// What the mock driver does with a command.
#[derive(Clone)]
pub enum Behavior {
    /// Write the chunks and succeed.
    Chunks(Vec<&'static str>),
    /// Fail before producing output.
    Fail(u16, &'static str),
    /// Write one chunk, then fail.
    FailAfter(&'static str, u16, &'static str),
    /// Write one chunk, then wait for cancellation and try to write again.
    HoldUntilCancelled(&'static str),
    /// Wait for the notify before writing "done".
    Block(Arc<Notify>),
    /// Copy the request body to the output.
    Echo,
    /// Produce nothing until cancelled.
    Silent,
}

#[derive(Default)]
pub struct Recorded {
    pub calls: AtomicUsize,
    pub cancellations: AtomicUsize,
    pub late_write_failed: AtomicBool,
    pub requests: Mutex<Vec<DriverRequest>>,
    pub capacities: Mutex<Vec<usize>>,
}

/// Scriptable driver recording what it was asked to do.
#[derive(Clone)]
pub struct MockDriver {
    behavior: Behavior,
    pub recorded: Arc<Recorded>,
}

impl MockDriver {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            recorded: Arc::new(Recorded::default()),
        }
    }

    pub fn calls(&self) -> usize {
        self.recorded.calls.load(Ordering::SeqCst)
    }

    pub fn cancellations(&self) -> usize {
        self.recorded.cancellations.load(Ordering::SeqCst)
    }

    pub fn modes(&self) -> Vec<ExecutionMode> {
        self.recorded
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.mode)
            .collect()
    }

    pub fn last_request(&self) -> Option<DriverRequest> {
        self.recorded.requests.lock().unwrap().last().cloned()
    }

    /// Output buffer size handed to each call.
    pub fn capacities(&self) -> Vec<usize> {
        self.recorded.capacities.lock().unwrap().clone()
    }
}

impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn execute(
        &self,
        request: DriverRequest,
        mut input: InputStream,
        output: OutputSink,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<(), DriverError>> {
        let behavior = self.behavior.clone();
        let recorded = self.recorded.clone();

        Box::pin(async move {
            recorded.calls.fetch_add(1, Ordering::SeqCst);
            recorded.requests.lock().unwrap().push(request);
            recorded.capacities.lock().unwrap().push(output.capacity());

            match behavior {
                Behavior::Chunks(chunks) => {
                    for chunk in chunks {
                        output.write(Bytes::from_static(chunk.as_bytes())).await?;
                    }
                    Ok(())
                }
                Behavior::Fail(status, message) => Err(DriverError::new(status, message)),
                Behavior::FailAfter(chunk, status, message) => {
                    output.write(Bytes::from_static(chunk.as_bytes())).await?;
                    Err(DriverError::new(status, message))
                }
                Behavior::HoldUntilCancelled(chunk) => {
                    output.write(Bytes::from_static(chunk.as_bytes())).await?;
                    cancel.cancelled().await;
                    recorded.cancellations.fetch_add(1, Ordering::SeqCst);
                    let late = output.write(Bytes::from_static(b"late")).await;
                    recorded
                        .late_write_failed
                        .store(late.is_err(), Ordering::SeqCst);
                    Err(DriverError::cancelled())
                }
                Behavior::Block(notify) => {
                    notify.notified().await;
                    output.write(Bytes::from_static(b"done")).await
                }
                Behavior::Echo => {
                    while let Some(chunk) = input.next().await {
                        let chunk = chunk.map_err(|e| DriverError::new(400, e.to_string()))?;
                        output.write(chunk).await?;
                    }
                    Ok(())
                }
                Behavior::Silent => {
                    cancel.cancelled().await;
                    recorded.cancellations.fetch_add(1, Ordering::SeqCst);
                    Err(DriverError::cancelled())
                }
            }
        })
    }
}

/// Config with `memory_limit = 1000` (watermarks 800/950) and a watcher
/// that only samples on demand.
pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.memory.memory_limit = 1000;
    config.watcher.interval_ms = 60_000;
    config
}

pub fn application(config: ProxyConfig, driver: &MockDriver, probe: &Arc<ManualProbe>) -> Application {
    Application::with_components(config, Arc::new(driver.clone()), probe.clone()).unwrap()
}

/// Start the proxy on an ephemeral port.
pub async fn start_proxy(application: Application) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let server = HttpServer::new(application);

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

/// Start a programmable backend speaking just enough HTTP/1.1.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    start_recording_backend(f).await.0
}

/// Like [`start_programmable_backend`], also keeping each request line.
pub async fn start_recording_backend<F, Fut>(f: F) -> (SocketAddr, Arc<Mutex<Vec<String>>>)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);
    let lines = Arc::new(Mutex::new(Vec::new()));
    let seen = lines.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    let seen = seen.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 8192];
                        let n = socket.read(&mut buf).await.unwrap_or(0);
                        let head = String::from_utf8_lossy(&buf[..n]);
                        if let Some(line) = head.lines().next() {
                            seen.lock().unwrap().push(line.to_string());
                        }

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            400 => "400 Bad Request",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, lines)
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
