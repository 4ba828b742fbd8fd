pub mod hub;
pub mod impact;
pub mod microstructure;
pub mod volatility;

pub use hub::SignalHub;
pub use impact::ImpactEstimator;
pub use microstructure::MicrostructureSignals;
pub use volatility::VolatilityEstimator;
