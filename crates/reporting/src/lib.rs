//! Smart attribution: reconciles ad-platform, tag and revenue-connector
//! signals into per-channel conversion credit with confidence scores.

pub mod channels;
pub mod confidence;
pub mod distribution;
pub mod engine;
pub mod hierarchy;
pub mod quality;
pub mod summary;
pub mod timeseries;

pub use confidence::{calculate_confidence, sample_size_factor, signal_confidence};
pub use distribution::{DistributionEngine, DistributionPath};
pub use engine::{build_report, SmartAttributionEngine};
pub use hierarchy::{Resolution, SignalHierarchyResolver};
pub use quality::DataQualityAssessor;
