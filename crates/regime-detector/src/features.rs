use std::collections::{HashMap, VecDeque};

use regime_core::{Bar, OrderBook};

/// Fixed-length vector of feature values; positions correspond to the
/// configured feature list.
pub type FeatureVector = Vec<f64>;

/// Features computable from the rolling market-data window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureType {
    Return,
    Volatility,
    Volume,
    LogReturn,
    VolumeZScore,
    Range,
    RangeZScore,
    VolumeRatio,
    VolatilityRatio,
    OnBalanceVolume,
    UpDownVolumeRatio,
    BidAskSpread,
    SpreadZScore,
    OrderImbalance,
    MarketBreadth,
    SectorRotation,
    CorrelationEigen,
    RiskAppetite,
}

impl FeatureType {
    /// Stable numeric id used by the persisted model format.
    pub fn id(&self) -> u32 {
        match self {
            FeatureType::Return => 0,
            FeatureType::Volatility => 1,
            FeatureType::Volume => 2,
            FeatureType::LogReturn => 3,
            FeatureType::VolumeZScore => 4,
            FeatureType::Range => 5,
            FeatureType::RangeZScore => 6,
            FeatureType::VolumeRatio => 7,
            FeatureType::VolatilityRatio => 8,
            FeatureType::OnBalanceVolume => 9,
            FeatureType::UpDownVolumeRatio => 10,
            FeatureType::BidAskSpread => 11,
            FeatureType::SpreadZScore => 12,
            FeatureType::OrderImbalance => 13,
            FeatureType::MarketBreadth => 14,
            FeatureType::SectorRotation => 15,
            FeatureType::CorrelationEigen => 16,
            FeatureType::RiskAppetite => 17,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Some(match id {
            0 => FeatureType::Return,
            1 => FeatureType::Volatility,
            2 => FeatureType::Volume,
            3 => FeatureType::LogReturn,
            4 => FeatureType::VolumeZScore,
            5 => FeatureType::Range,
            6 => FeatureType::RangeZScore,
            7 => FeatureType::VolumeRatio,
            8 => FeatureType::VolatilityRatio,
            9 => FeatureType::OnBalanceVolume,
            10 => FeatureType::UpDownVolumeRatio,
            11 => FeatureType::BidAskSpread,
            12 => FeatureType::SpreadZScore,
            13 => FeatureType::OrderImbalance,
            14 => FeatureType::MarketBreadth,
            15 => FeatureType::SectorRotation,
            16 => FeatureType::CorrelationEigen,
            17 => FeatureType::RiskAppetite,
            _ => return None,
        })
    }

    /// Snake-case name used in config files.
    pub fn parse_name(name: &str) -> Option<Self> {
        Some(match name {
            "return" => FeatureType::Return,
            "volatility" => FeatureType::Volatility,
            "volume" => FeatureType::Volume,
            "log_return" => FeatureType::LogReturn,
            "volume_zscore" => FeatureType::VolumeZScore,
            "range" => FeatureType::Range,
            "range_zscore" => FeatureType::RangeZScore,
            "volume_ratio" => FeatureType::VolumeRatio,
            "volatility_ratio" => FeatureType::VolatilityRatio,
            "obv" => FeatureType::OnBalanceVolume,
            "up_down_volume_ratio" => FeatureType::UpDownVolumeRatio,
            "bid_ask_spread" => FeatureType::BidAskSpread,
            "spread_zscore" => FeatureType::SpreadZScore,
            "order_imbalance" => FeatureType::OrderImbalance,
            "market_breadth" => FeatureType::MarketBreadth,
            "sector_rotation" => FeatureType::SectorRotation,
            "correlation_eigen" => FeatureType::CorrelationEigen,
            "risk_appetite" => FeatureType::RiskAppetite,
            _ => return None,
        })
    }
}

/// Per-feature normalization applied after raw feature computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizationMode {
    #[default]
    None,
    ZScore,
    MinMax,
    Robust,
}

impl NormalizationMode {
    pub fn id(&self) -> u32 {
        match self {
            NormalizationMode::None => 0,
            NormalizationMode::ZScore => 1,
            NormalizationMode::MinMax => 2,
            NormalizationMode::Robust => 3,
        }
    }

    pub fn from_id(id: u32) -> Self {
        match id {
            1 => NormalizationMode::ZScore,
            2 => NormalizationMode::MinMax,
            3 => NormalizationMode::Robust,
            _ => NormalizationMode::None,
        }
    }

    pub fn parse_name(name: &str) -> Self {
        match name {
            "zscore" => NormalizationMode::ZScore,
            "minmax" => NormalizationMode::MinMax,
            "robust" => NormalizationMode::Robust,
            _ => NormalizationMode::None,
        }
    }
}

fn push_bounded(series: &mut VecDeque<f64>, value: f64, cap: usize) {
    series.push_back(value);
    while series.len() > cap {
        series.pop_front();
    }
}

fn mean_of(series: &VecDeque<f64>) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    series.iter().sum::<f64>() / series.len() as f64
}

/// Sample standard deviation (n-1 denominator); 0 below two samples.
fn sample_stddev(series: &VecDeque<f64>) -> f64 {
    if series.len() < 2 {
        return 0.0;
    }
    let mean = mean_of(series);
    let var = series.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (series.len() - 1) as f64;
    var.sqrt()
}

fn zscore_of(series: &VecDeque<f64>, value: f64) -> f64 {
    let stddev = sample_stddev(series);
    if stddev == 0.0 {
        return 0.0;
    }
    (value - mean_of(series)) / stddev
}

/// Percentile with linear interpolation over a sorted slice.
fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if pct <= 0.0 {
        return sorted[0];
    }
    if pct >= 100.0 {
        return sorted[sorted.len() - 1];
    }
    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        return sorted[low];
    }
    let weight = rank - low as f64;
    sorted[low] * (1.0 - weight) + sorted[high] * weight
}

/// Rolling-window feature extraction over bars, ticks, and order books.
///
/// Each deque is truncated from the front once it exceeds the window.
/// Cross-asset scalars are injected externally and passed through.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    window: usize,
    features: Vec<FeatureType>,
    last_close: f64,
    returns: VecDeque<f64>,
    volumes: VecDeque<f64>,
    ranges: VecDeque<f64>,
    volatilities: VecDeque<f64>,
    signed_volumes: VecDeque<f64>,
    spreads: VecDeque<f64>,
    obv: f64,
    normalization_mode: NormalizationMode,
    normalization_history: HashMap<FeatureType, VecDeque<f64>>,
    market_breadth: f64,
    sector_rotation: f64,
    correlation_eigen: f64,
    risk_appetite: f64,
}

impl FeatureExtractor {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            features: Vec::new(),
            last_close: 0.0,
            returns: VecDeque::new(),
            volumes: VecDeque::new(),
            ranges: VecDeque::new(),
            volatilities: VecDeque::new(),
            signed_volumes: VecDeque::new(),
            spreads: VecDeque::new(),
            obv: 0.0,
            normalization_mode: NormalizationMode::None,
            normalization_history: HashMap::new(),
            market_breadth: 0.0,
            sector_rotation: 0.0,
            correlation_eigen: 0.0,
            risk_appetite: 0.0,
        }
    }

    /// Changing the window resets all rolling state.
    pub fn set_window(&mut self, window: usize) {
        self.window = window;
        self.returns.clear();
        self.volumes.clear();
        self.ranges.clear();
        self.volatilities.clear();
        self.signed_volumes.clear();
        self.spreads.clear();
        self.obv = 0.0;
        self.normalization_history.clear();
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn set_features(&mut self, features: Vec<FeatureType>) {
        self.features = features;
    }

    pub fn features(&self) -> &[FeatureType] {
        &self.features
    }

    pub fn set_normalize(&mut self, normalize: bool) {
        self.normalization_mode = if normalize {
            NormalizationMode::ZScore
        } else {
            NormalizationMode::None
        };
    }

    pub fn set_normalization_mode(&mut self, mode: NormalizationMode) {
        self.normalization_mode = mode;
    }

    pub fn normalization_mode(&self) -> NormalizationMode {
        self.normalization_mode
    }

    pub fn update_cross_asset(
        &mut self,
        market_breadth: f64,
        sector_rotation: f64,
        correlation_eigen: f64,
        risk_appetite: f64,
    ) {
        self.market_breadth = market_breadth;
        self.sector_rotation = sector_rotation;
        self.correlation_eigen = correlation_eigen;
        self.risk_appetite = risk_appetite;
    }

    pub fn on_bar(&mut self, bar: &Bar) -> FeatureVector {
        let (ret, log_ret) = self.ingest_close(bar.close);
        let range = bar.high - bar.low;

        push_bounded(&mut self.returns, ret, self.window);
        push_bounded(&mut self.volumes, bar.volume, self.window);
        push_bounded(&mut self.ranges, range, self.window);
        let current_vol = sample_stddev(&self.returns);
        push_bounded(&mut self.volatilities, current_vol, self.window);
        let signed_volume = if ret > 0.0 {
            bar.volume
        } else if ret < 0.0 {
            -bar.volume
        } else {
            0.0
        };
        push_bounded(&mut self.signed_volumes, signed_volume, self.window);
        self.obv += signed_volume;

        self.build(ret, log_ret, range, bar.volume, current_vol, 0.0, 0.0)
    }

    pub fn on_book(&mut self, book: &OrderBook) -> FeatureVector {
        let bid = book.best_bid().map(|l| l.price).unwrap_or(0.0);
        let ask = book.best_ask().map(|l| l.price).unwrap_or(0.0);
        let bid_qty = book.best_bid().map(|l| l.quantity).unwrap_or(0.0);
        let ask_qty = book.best_ask().map(|l| l.quantity).unwrap_or(0.0);
        let mid = (bid + ask) / 2.0;
        let spread = if mid > 0.0 { (ask - bid) / mid } else { 0.0 };
        let total_qty = bid_qty + ask_qty;
        let imbalance = if total_qty > 0.0 {
            (bid_qty - ask_qty) / total_qty
        } else {
            0.0
        };

        let (ret, log_ret) = self.ingest_close(mid);
        let range = 0.0;
        let volume = total_qty;

        push_bounded(&mut self.returns, ret, self.window);
        push_bounded(&mut self.volumes, volume, self.window);
        push_bounded(&mut self.ranges, range, self.window);
        let current_vol = sample_stddev(&self.returns);
        push_bounded(&mut self.volatilities, current_vol, self.window);
        let signed_volume = if ret > 0.0 {
            volume
        } else if ret < 0.0 {
            -volume
        } else {
            0.0
        };
        push_bounded(&mut self.signed_volumes, signed_volume, self.window);
        self.obv += signed_volume;
        push_bounded(&mut self.spreads, spread, self.window);

        self.build(ret, log_ret, range, volume, current_vol, spread, imbalance)
    }

    fn ingest_close(&mut self, close: f64) -> (f64, f64) {
        let ret = if self.last_close > 0.0 {
            (close - self.last_close) / self.last_close
        } else {
            0.0
        };
        let log_ret = if self.last_close > 0.0 && close > 0.0 {
            (close / self.last_close).ln()
        } else {
            0.0
        };
        self.last_close = close;
        (ret, log_ret)
    }

    fn build(
        &mut self,
        ret: f64,
        log_ret: f64,
        range: f64,
        volume: f64,
        current_vol: f64,
        spread: f64,
        imbalance: f64,
    ) -> FeatureVector {
        if self.features.is_empty() {
            self.features = vec![FeatureType::Return, FeatureType::Volatility];
        }

        let features = self.features.clone();
        let mut values = Vec::with_capacity(features.len());
        for feature in features {
            let value = match feature {
                FeatureType::Return => ret,
                FeatureType::LogReturn => log_ret,
                FeatureType::Volatility => current_vol,
                FeatureType::Volume => volume,
                FeatureType::VolumeZScore => {
                    let last = self.volumes.back().copied().unwrap_or(0.0);
                    zscore_of(&self.volumes, last)
                }
                FeatureType::Range => range,
                FeatureType::RangeZScore => zscore_of(&self.ranges, range),
                FeatureType::VolumeRatio => {
                    let mean = mean_of(&self.volumes);
                    let last = self.volumes.back().copied().unwrap_or(0.0);
                    if mean > 0.0 {
                        last / mean
                    } else {
                        0.0
                    }
                }
                FeatureType::VolatilityRatio => {
                    let mean = mean_of(&self.volatilities);
                    if mean > 0.0 {
                        current_vol / mean
                    } else {
                        0.0
                    }
                }
                FeatureType::OnBalanceVolume => self.obv,
                FeatureType::UpDownVolumeRatio => {
                    let mut up = 0.0;
                    let mut total = 0.0;
                    for &sv in &self.signed_volumes {
                        if sv > 0.0 {
                            up += sv;
                        }
                        total += sv.abs();
                    }
                    if total > 0.0 {
                        up / total
                    } else {
                        0.0
                    }
                }
                FeatureType::BidAskSpread => spread,
                FeatureType::SpreadZScore => zscore_of(&self.spreads, spread),
                FeatureType::OrderImbalance => imbalance,
                FeatureType::MarketBreadth => self.market_breadth,
                FeatureType::SectorRotation => self.sector_rotation,
                FeatureType::CorrelationEigen => self.correlation_eigen,
                FeatureType::RiskAppetite => self.risk_appetite,
            };
            values.push(self.normalize(feature, value));
        }
        values
    }

    /// Normalization keeps an independent history per feature; degenerate
    /// denominators and histories below two samples yield 0.
    fn normalize(&mut self, feature: FeatureType, value: f64) -> f64 {
        if self.normalization_mode == NormalizationMode::None {
            return value;
        }
        let series = self.normalization_history.entry(feature).or_default();
        push_bounded(series, value, self.window);
        if series.len() < 2 {
            return 0.0;
        }
        match self.normalization_mode {
            NormalizationMode::ZScore => zscore_of(series, value),
            NormalizationMode::MinMax => {
                let min = series.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = series.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let range = max - min;
                if range == 0.0 {
                    0.0
                } else {
                    (value - min) / range
                }
            }
            NormalizationMode::Robust => {
                let mut sample: Vec<f64> = series.iter().copied().collect();
                sample.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let median = percentile_sorted(&sample, 50.0);
                let q1 = percentile_sorted(&sample, 25.0);
                let q3 = percentile_sorted(&sample, 75.0);
                let iqr = q3 - q1;
                if iqr == 0.0 {
                    0.0
                } else {
                    (value - median) / iqr
                }
            }
            NormalizationMode::None => value,
        }
    }
}
