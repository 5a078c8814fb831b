//! # Sync Metrics
//!
//! Drain-pass counters and timings. Written by the engine only.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct SyncMetrics {
    pub passes_started: u64,
    pub passes_completed: u64,
    /// Passes cut short by a connectivity loss
    pub passes_interrupted: u64,
    /// Rolling average over completed passes
    pub average_pass_duration: Duration,
    pub last_pass_duration: Option<Duration>,
    /// Payload bytes of intents the server confirmed
    pub total_bytes_applied: u64,
    last_pass_start: Option<Instant>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pass_start(&mut self) {
        self.last_pass_start = Some(Instant::now());
        self.passes_started += 1;
    }

    pub fn record_pass_complete(&mut self, bytes_applied: u64) {
        self.total_bytes_applied += bytes_applied;
        if let Some(start) = self.last_pass_start.take() {
            let duration = start.elapsed();
            self.last_pass_duration = Some(duration);
            self.passes_completed += 1;

            // Update rolling average
            let completed = u32::try_from(self.passes_completed).unwrap_or(u32::MAX);
            let total_duration = self.average_pass_duration * (completed - 1) + duration;
            self.average_pass_duration = total_duration / completed;
        }
    }

    pub fn record_pass_interrupted(&mut self, bytes_applied: u64) {
        self.total_bytes_applied += bytes_applied;
        self.last_pass_start = None;
        self.passes_interrupted += 1;
    }

    pub fn completion_rate(&self) -> f64 {
        if self.passes_started == 0 {
            0.0
        } else {
            self.passes_completed as f64 / self.passes_started as f64
        }
    }
}
