//! Utility helpers

use std::time::{Duration, Instant};

use tracing::{debug, info};

/// Timer for measuring stage durations
#[derive(Debug)]
pub struct Timer {
    name: String,
    start: Instant,
    checkpoints: Vec<(String, Duration)>,
}

impl Timer {
    /// Create and start a new timer
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
            checkpoints: Vec::new(),
        }
    }

    /// Record the elapsed time under `name`
    pub fn checkpoint(&mut self, name: impl Into<String>) {
        let name = name.into();
        let elapsed = self.start.elapsed();
        debug!(timer = %self.name, checkpoint = %name, secs = elapsed.as_secs_f64(), "Checkpoint");
        self.checkpoints.push((name, elapsed));
    }

    pub fn checkpoints(&self) -> &[(String, Duration)] {
        &self.checkpoints
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Stop and log the timer
    pub fn stop(self) -> Duration {
        let elapsed = self.start.elapsed();
        info!("{} completed in {:.3}s", self.name, elapsed.as_secs_f64());
        elapsed
    }
}
