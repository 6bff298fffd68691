use chrono::{DateTime, Utc};

/// Drawdown reading at one point in time.
#[derive(Debug, Clone, Copy, Default)]
pub struct DrawdownSnapshot {
    pub timestamp: Option<DateTime<Utc>>,
    pub equity: f64,
    pub peak: f64,
    pub drawdown: f64,
}

/// Tracks peak-to-trough drawdowns over an equity stream.
#[derive(Debug, Clone, Default)]
pub struct DrawdownTracker {
    peak: f64,
    max_drawdown: f64,
    max_start: Option<DateTime<Utc>>,
    max_end: Option<DateTime<Utc>>,
    current_peak_time: Option<DateTime<Utc>>,
    last: DrawdownSnapshot,
}

impl DrawdownTracker {
    pub fn update(&mut self, timestamp: DateTime<Utc>, equity: f64) {
        if self.peak == 0.0 || equity >= self.peak {
            self.peak = equity;
            self.current_peak_time = Some(timestamp);
        }

        let drawdown = if self.peak > 0.0 {
            (self.peak - equity) / self.peak
        } else {
            0.0
        };
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
            self.max_start = self.current_peak_time;
            self.max_end = Some(timestamp);
        }

        self.last = DrawdownSnapshot {
            timestamp: Some(timestamp),
            equity,
            peak: self.peak,
            drawdown,
        };
    }

    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    pub fn max_drawdown_start(&self) -> Option<DateTime<Utc>> {
        self.max_start
    }

    pub fn max_drawdown_end(&self) -> Option<DateTime<Utc>> {
        self.max_end
    }

    pub fn last_snapshot(&self) -> DrawdownSnapshot {
        self.last
    }
}
