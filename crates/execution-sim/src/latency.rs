use chrono::Duration;

/// Order-submission latency estimate used by live-style executors.
pub trait LatencyModel: Send + Sync {
    fn latency(&self) -> Duration;
}

/// Constant latency.
#[derive(Debug, Clone, Copy)]
pub struct FixedLatency {
    latency: Duration,
}

impl FixedLatency {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    pub fn from_millis(ms: i64) -> Self {
        Self {
            latency: Duration::milliseconds(ms),
        }
    }
}

impl Default for FixedLatency {
    fn default() -> Self {
        Self::from_millis(0)
    }
}

impl LatencyModel for FixedLatency {
    fn latency(&self) -> Duration {
        self.latency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_latency_reports_configured_duration() {
        let model = FixedLatency::from_millis(250);
        assert_eq!(model.latency(), Duration::milliseconds(250));
    }
}
