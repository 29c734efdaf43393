//! Outbound reachability probe.
//!
//! # Responsibilities
//! - Decide whether the process can reach the outside world
//! - Bound every attempt with a connect timeout
//!
//! # Design Decisions
//! - Plain TCP connects, no payload: only routing and handshake matter
//! - Every target must answer; an empty target list counts as online

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time;

use crate::config::HealthConfig;

/// Probes a fixed set of `host:port` targets.
#[derive(Debug, Clone)]
pub struct Reachability {
    targets: Vec<String>,
    timeout: Duration,
}

impl Reachability {
    pub fn new(targets: Vec<String>, timeout: Duration) -> Self {
        Self { targets, timeout }
    }

    pub fn from_config(config: &HealthConfig) -> Self {
        Self::new(
            config.reachability_targets.clone(),
            Duration::from_millis(config.probe_timeout_ms),
        )
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Probe every target concurrently.
    pub async fn check(&self) -> bool {
        let probes = self.targets.iter().map(|target| {
            let target = target.clone();
            let timeout = self.timeout;
            tokio::spawn(async move { probe(&target, timeout).await })
        });
        let handles: Vec<_> = probes.collect();

        let mut online = true;
        for handle in handles {
            online &= handle.await.unwrap_or(false);
        }
        online
    }
}

async fn probe(target: &str, timeout: Duration) -> bool {
    match time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            tracing::debug!(target = %target, error = %e, "Reachability probe failed");
            false
        }
        Err(_) => {
            tracing::debug!(target = %target, timeout_ms = timeout.as_millis() as u64, "Reachability probe timed out");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn empty_target_list_is_online() {
        assert!(Reachability::new(Vec::new(), Duration::from_millis(100)).check().await);
    }

    #[tokio::test]
    async fn reachable_listener_is_online() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let probe = Reachability::new(vec![addr.to_string()], Duration::from_secs(1));
        assert!(probe.check().await);
    }

    #[tokio::test]
    async fn one_dead_target_fails_the_check() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live = listener.local_addr().unwrap();

        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = closed.local_addr().unwrap();
        drop(closed);

        let probe = Reachability::new(vec![live.to_string(), dead.to_string()], Duration::from_secs(1));
        assert!(!probe.check().await);
    }
}
