//! # Network Monitor
//!
//! Turns raw, possibly flapping connectivity signals into confirmed
//! transitions.
//!
//! ## Features
//!
//! - **Debounce**: A new status is published only after the raw signal has
//!   been stable for the debounce window
//! - **Single Transition**: Each confirmed change is published exactly once
//! - **Health Probe**: `ConnectivityProbe` feeds the monitor from the API's
//!   health endpoint
//!
//! ## Usage
//!
//! ```rust,no_run
//! use claimsync::client::sync::network_monitor::{NetworkMonitor, NetworkStatus};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let monitor = NetworkMonitor::new(NetworkStatus::Offline, Duration::from_secs(2));
//! let mut changes = monitor.subscribe();
//!
//! monitor.report(true);
//! changes.changed().await.ok();
//! assert!(monitor.is_online());
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::sync::transport::RemoteApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    Online,
    Offline,
}

impl NetworkStatus {
    pub fn from_online(online: bool) -> Self {
        if online {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        }
    }

    pub fn is_online(&self) -> bool {
        *self == NetworkStatus::Online
    }
}

#[derive(Debug)]
pub struct NetworkMonitor {
    /// Latest raw signal
    raw: watch::Sender<bool>,
    /// Confirmed status
    status: Arc<watch::Sender<NetworkStatus>>,
    debounce: Duration,
    debounce_task: JoinHandle<()>,
}

impl NetworkMonitor {
    /// Create a monitor and spawn its debounce task. Must be called inside a
    /// tokio runtime.
    pub fn new(initial: NetworkStatus, debounce: Duration) -> Self {
        let (raw, raw_rx) = watch::channel(initial.is_online());
        let (status, _) = watch::channel(initial);
        let status = Arc::new(status);

        let debounce_task = tokio::spawn(Self::debounce_loop(raw_rx, status.clone(), debounce));

        Self {
            raw,
            status,
            debounce,
            debounce_task,
        }
    }

    async fn debounce_loop(
        mut raw: watch::Receiver<bool>,
        status: Arc<watch::Sender<NetworkStatus>>,
        debounce: Duration,
    ) {
        while raw.changed().await.is_ok() {
            // Restart the window on every raw change until one value holds.
            let stable = loop {
                let candidate = *raw.borrow_and_update();
                tokio::select! {
                    changed = raw.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    _ = tokio::time::sleep(debounce) => break candidate,
                }
            };

            let next = NetworkStatus::from_online(stable);
            let published = status.send_if_modified(|current| {
                if *current == next {
                    false
                } else {
                    *current = next;
                    true
                }
            });
            if published {
                tracing::info!(status = ?next, "Connectivity changed");
            }
        }
    }

    /// Feed a raw platform signal
    pub fn report(&self, online: bool) {
        self.raw.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
    }

    /// Publish a status immediately, skipping the debounce window.
    ///
    /// Meant for authoritative signals such as the first probe at startup.
    pub fn force(&self, status: NetworkStatus) {
        // The debounce task sees this too; republishing the same value is a no-op.
        self.raw.send_replace(status.is_online());
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    pub fn status(&self) -> NetworkStatus {
        *self.status.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.status().is_online()
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.status.subscribe()
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        self.debounce_task.abort();
    }
}

/// Periodically probes the API and reports the result to a monitor
#[derive(Debug)]
pub struct ConnectivityProbe {
    task: JoinHandle<()>,
}

impl ConnectivityProbe {
    pub fn spawn(api: Arc<dyn RemoteApi>, monitor: Arc<NetworkMonitor>, interval: Duration) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let online = api.health_check().await;
                tracing::trace!(online, "Connectivity probe");
                monitor.report(online);
            }
        });
        Self { task }
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for ConnectivityProbe {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEBOUNCE: Duration = Duration::from_secs(2);

    #[tokio::test(start_paused = true)]
    async fn test_transition_published_after_debounce() {
        let monitor = NetworkMonitor::new(NetworkStatus::Offline, DEBOUNCE);
        let mut changes = monitor.subscribe();

        monitor.report(true);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!monitor.is_online());

        changes.changed().await.unwrap();
        assert_eq!(*changes.borrow_and_update(), NetworkStatus::Online);
        assert!(monitor.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flapping_signal_is_suppressed() {
        let monitor = NetworkMonitor::new(NetworkStatus::Offline, DEBOUNCE);
        let changes = monitor.subscribe();

        for _ in 0..5 {
            monitor.report(true);
            tokio::time::sleep(Duration::from_millis(500)).await;
            monitor.report(false);
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(!monitor.is_online());
        assert!(!changes.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_publish_per_confirmed_change() {
        let monitor = NetworkMonitor::new(NetworkStatus::Offline, DEBOUNCE);
        let mut changes = monitor.subscribe();

        monitor.report(true);
        tokio::time::sleep(Duration::from_millis(500)).await;
        monitor.report(false);
        tokio::time::sleep(Duration::from_millis(500)).await;
        monitor.report(true);
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(changes.has_changed().unwrap());
        changes.borrow_and_update();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!changes.has_changed().unwrap());
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn test_force_skips_debounce() {
        let monitor = NetworkMonitor::new(NetworkStatus::Offline, DEBOUNCE);
        monitor.force(NetworkStatus::Online);
        assert!(monitor.is_online());
    }
}
