//! HTTP readiness polling.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Per-request timeout for readiness probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Waits at or below this length are "is it already up?" checks, and a
/// negative answer is not worth a warning.
const QUIET_TIMEOUT: Duration = Duration::from_secs(10);

/// Something that can tell whether a service answers at `url`.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn is_ready(&self, url: &str) -> bool;
}

/// Probe that requires an HTTP 200 response.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    async fn is_ready(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) if response.status() == StatusCode::OK => true,
            Ok(response) => {
                debug!(url, status = %response.status(), "Service answered but is not ready");
                false
            }
            Err(_) => false,
        }
    }
}

/// Poll `url` every `interval` until the probe succeeds or `timeout`
/// elapses. The first probe happens immediately, even for a zero timeout.
pub async fn wait_for_service(
    probe: &dyn ReadinessProbe,
    url: &str,
    timeout: Duration,
    interval: Duration,
) -> bool {
    info!(url, "Checking if service is available");
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if probe.is_ready(url).await {
            info!(
                url,
                attempts,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Service is available"
            );
            return true;
        }
        if start.elapsed() >= timeout {
            break;
        }
        tokio::time::sleep(interval).await;
    }

    if timeout <= QUIET_TIMEOUT {
        info!(url, "Service not available (not started yet)");
    } else {
        warn!(url, timeout_secs = timeout.as_secs(), "Service not available (timed out)");
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{serve_http, serve_status};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Probe that succeeds from the `ready_after`-th call on.
    struct CountingProbe {
        calls: AtomicU32,
        ready_after: u32,
    }

    impl CountingProbe {
        fn new(ready_after: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                ready_after,
            }
        }
    }

    #[async_trait]
    impl ReadinessProbe for CountingProbe {
        async fn is_ready(&self, _url: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.ready_after
        }
    }

    #[tokio::test]
    async fn returns_true_once_probe_succeeds() {
        let probe = CountingProbe::new(3);
        let ready = wait_for_service(
            &probe,
            "http://test",
            Duration::from_secs(5),
            Duration::from_millis(10),
        )
        .await;
        assert!(ready);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn first_probe_is_immediate() {
        let probe = CountingProbe::new(1);
        let start = std::time::Instant::now();
        assert!(
            wait_for_service(&probe, "http://test", Duration::from_secs(5), Duration::from_secs(5))
                .await
        );
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn zero_timeout_still_probes_once() {
        let up = CountingProbe::new(1);
        assert!(wait_for_service(&up, "http://test", Duration::ZERO, Duration::from_secs(5)).await);

        let down = CountingProbe::new(u32::MAX);
        let start = std::time::Instant::now();
        assert!(
            !wait_for_service(&down, "http://test", Duration::ZERO, Duration::from_secs(5)).await
        );
        assert_eq!(down.calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn gives_up_after_timeout() {
        let probe = CountingProbe::new(u32::MAX);
        let ready = wait_for_service(
            &probe,
            "http://test",
            Duration::from_millis(100),
            Duration::from_millis(20),
        )
        .await;
        assert!(!ready);
        let calls = probe.calls.load(Ordering::SeqCst);
        assert!(calls >= 2, "expected repeated probes, got {calls}");
    }

    #[tokio::test]
    async fn http_probe_accepts_200() {
        let url = serve_http("ok").await;
        let probe = HttpProbe::new().unwrap();
        assert!(probe.is_ready(&url).await);
    }

    #[tokio::test]
    async fn http_probe_rejects_other_statuses() {
        let url = serve_status(503, "Service Unavailable").await;
        let probe = HttpProbe::new().unwrap();
        assert!(!probe.is_ready(&url).await);
    }

    #[tokio::test]
    async fn http_probe_rejects_closed_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = HttpProbe::new().unwrap();
        assert!(!probe.is_ready(&format!("http://127.0.0.1:{port}")).await);
    }
}
