/// Scalar Kalman filter used to smooth per-state regime probabilities.
///
/// The first measurement initializes the state directly; subsequent
/// updates follow the standard predict/correct recursion with process
/// noise `q` and measurement noise `r`.
#[derive(Debug, Clone, Copy)]
pub struct KalmanFilter1d {
    x: f64,
    p: f64,
    q: f64,
    r: f64,
    initialized: bool,
}

impl KalmanFilter1d {
    pub fn new(process_noise: f64, measurement_noise: f64) -> Self {
        Self {
            x: 0.0,
            p: 1.0,
            q: process_noise,
            r: measurement_noise,
            initialized: false,
        }
    }

    pub fn configure(&mut self, process_noise: f64, measurement_noise: f64) {
        self.q = process_noise;
        self.r = measurement_noise;
    }

    pub fn reset(&mut self) {
        self.initialized = false;
        self.x = 0.0;
        self.p = 1.0;
    }

    pub fn update(&mut self, measurement: f64) -> f64 {
        if !self.initialized {
            self.x = measurement;
            self.p = 1.0;
            self.initialized = true;
            return self.x;
        }
        self.p += self.q;
        let k = self.p / (self.p + self.r);
        self.x += k * (measurement - self.x);
        self.p = (1.0 - k) * self.p;
        self.x
    }
}

impl Default for KalmanFilter1d {
    fn default() -> Self {
        Self::new(1e-3, 1e-2)
    }
}
