//! Periodic cleanup of idle sessions and stale rate-limit records.
//!
//! Without it the registry keeps every user who ever typed the trigger and
//! the limiter keeps one record per (user, action) pair forever.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::ratelimit::RateLimiter;
use crate::session::SessionRegistry;

/// Janitor configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JanitorConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// Sessions idle for at least this long are evicted.
    pub idle_ttl: Duration,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for JanitorConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            interval: config.sweep_interval(),
            idle_ttl: config.idle_ttl(),
        }
    }
}

/// Handle for stopping a running janitor.
#[derive(Debug, Clone)]
pub struct JanitorHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl JanitorHandle {
    /// Signal the janitor to stop.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Counters reported by the janitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JanitorStatus {
    /// Sweeps completed since start.
    pub sweeps: u64,
    /// Sessions evicted in total.
    pub sessions_evicted: u64,
    /// Rate-limit records dropped in total.
    pub records_evicted: u64,
    /// When the last sweep ran.
    pub last_sweep: Option<SystemTime>,
}

/// Background sweeper for the session registry and the rate limiter.
#[derive(Debug)]
pub struct Janitor {
    config: JanitorConfig,
    registry: Arc<SessionRegistry>,
    limiter: Arc<RateLimiter>,
    status: Arc<RwLock<JanitorStatus>>,
    running: Arc<RwLock<bool>>,
}

impl Janitor {
    /// Create a janitor over the given stores.
    #[must_use]
    pub fn new(
        config: JanitorConfig,
        registry: Arc<SessionRegistry>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            config,
            registry,
            limiter,
            status: Arc::new(RwLock::new(JanitorStatus::default())),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Current counters.
    pub async fn status(&self) -> JanitorStatus {
        *self.status.read().await
    }

    /// Shared view of the counters, usable after [`start`](Self::start).
    #[must_use]
    pub fn status_handle(&self) -> Arc<RwLock<JanitorStatus>> {
        Arc::clone(&self.status)
    }

    /// Whether the sweep loop is running.
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Run one sweep now.
    pub async fn sweep_once(&self) -> (usize, usize) {
        Self::sweep(&self.config, &self.registry, &self.limiter, &self.status).await
    }

    /// Spawn the sweep loop.
    #[must_use]
    pub fn start(self) -> JanitorHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let handle = JanitorHandle { shutdown_tx };

        tokio::spawn(async move {
            *self.running.write().await = true;
            info!(
                interval = ?self.config.interval,
                idle_ttl = ?self.config.idle_ttl,
                "janitor started"
            );

            loop {
                tokio::select! {
                    () = tokio::time::sleep(self.config.interval) => {
                        self.sweep_once().await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("janitor shutting down");
                        break;
                    }
                }
            }

            *self.running.write().await = false;
        });

        handle
    }

    async fn sweep(
        config: &JanitorConfig,
        registry: &SessionRegistry,
        limiter: &RateLimiter,
        status: &RwLock<JanitorStatus>,
    ) -> (usize, usize) {
        let sessions = registry.sweep(config.idle_ttl).await;
        let records = limiter.sweep();

        let mut s = status.write().await;
        s.sweeps += 1;
        s.sessions_evicted += sessions as u64;
        s.records_evicted += records as u64;
        s.last_sweep = Some(SystemTime::now());
        debug!(sweep = s.sweeps, sessions, records, "janitor sweep");

        (sessions, records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::ActionKey;
    use crate::session::UserId;

    fn janitor(interval_secs: u64, ttl_secs: u64) -> Janitor {
        Janitor::new(
            JanitorConfig {
                interval: Duration::from_secs(interval_secs),
                idle_ttl: Duration::from_secs(ttl_secs),
            },
            Arc::new(SessionRegistry::new()),
            Arc::new(RateLimiter::default()),
        )
    }

    #[test]
    fn test_config_from_session_settings() {
        let config = JanitorConfig::default();
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.idle_ttl, Duration::from_secs(1800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_idle_sessions_and_records() {
        let janitor = janitor(60, 300);
        let alice = UserId::new("test", "alice");
        janitor.registry.get_or_create(&alice).await;
        janitor.limiter.allow(&alice, ActionKey::Balance);

        assert_eq!(janitor.sweep_once().await, (0, 0));

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(janitor.sweep_once().await, (1, 1));

        let status = janitor.status().await;
        assert_eq!(status.sweeps, 2);
        assert_eq!(status.sessions_evicted, 1);
        assert_eq!(status.records_evicted, 1);
        assert!(status.last_sweep.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_sweeps_on_interval_until_stopped() {
        let janitor = janitor(60, 300);
        let status = janitor.status_handle();
        let running = Arc::clone(&janitor.running);

        let handle = janitor.start();
        tokio::time::sleep(Duration::from_secs(125)).await;
        assert!(*running.read().await);
        assert_eq!(status.read().await.sweeps, 2);

        handle.stop().await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!*running.read().await);
    }
}
