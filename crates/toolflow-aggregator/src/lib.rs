//! Score aggregation for toolflow.

mod aggregator;
mod config;
mod error;

pub use aggregator::{Aggregation, Aggregator, OVERALL_SCORE, Recommendation};
pub use config::AggregatorConfig;
pub use error::AggregateError;
