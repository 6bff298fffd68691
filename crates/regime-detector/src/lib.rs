pub mod constant;
pub mod detector;
pub mod ensemble;
pub mod factory;
pub mod features;
pub mod hmm;
pub mod kalman;
pub mod tracker;


pub use constant::ConstantDetector;
pub use detector::RegimeDetector;
pub use ensemble::{EnsembleDetector, VotingMethod};
pub use factory::detector_from_config;
pub use features::{FeatureExtractor, FeatureType, FeatureVector, NormalizationMode};
pub use hmm::{GaussianParams, HmmDetector};
pub use kalman::KalmanFilter1d;
pub use tracker::RegimeTracker;
