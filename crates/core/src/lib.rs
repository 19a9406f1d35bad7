pub mod config;
pub mod error;
pub mod signals;
pub mod types;

pub use config::{AppConfig, AttributionSettings};
pub use error::{AttributionError, AttributionResult};
