// Frame-count progress with periodic checkpoints

/// Default spacing between progress log lines, in frames
pub const DEFAULT_LOG_INTERVAL: u64 = 100;

/// A frame count worth reporting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkpoint {
    pub frame: u64,
    pub total: u64,
    pub pct: f64,
}

#[derive(Debug, Clone)]
pub struct ProgressTracker {
    current: u64,
    total: u64,
    ratio: f64,
    log_interval: u64,
}

impl ProgressTracker {
    pub fn new(total: u64, log_interval: u64) -> Self {
        Self {
            current: 0,
            total,
            ratio: 0.0,
            log_interval,
        }
    }

    /// Count one consumed frame; returns a checkpoint every `log_interval`
    /// frames and on the final frame
    pub fn record_frame(&mut self) -> Option<Checkpoint> {
        self.current += 1;
        self.ratio = self.completion();

        let on_interval = self.log_interval > 0 && self.current % self.log_interval == 0;
        if on_interval || self.is_finished() {
            Some(Checkpoint {
                frame: self.current,
                total: self.total,
                pct: self.ratio * 100.0,
            })
        } else {
            None
        }
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Ratio as of the last consumed frame
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Live current/total ratio
    pub fn completion(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.current as f64 / self.total as f64
        }
    }

    pub fn is_finished(&self) -> bool {
        self.total > 0 && self.current >= self.total
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(0, DEFAULT_LOG_INTERVAL)
    }
}
