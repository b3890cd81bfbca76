//! Port trait definitions (Hexagonal Architecture)
//!
//! - StatisticsProbe: convergence statistics from the external comparison tools
//!
//! The convergence loop depends only on these traits, so tests can drive it
//! without the real tools installed.

pub mod statistics_probe;

pub use statistics_probe::StatisticsProbe;
