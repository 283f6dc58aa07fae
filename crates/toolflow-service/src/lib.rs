//! Request facade for toolflow.
//!
//! Maps an `AnalysisRequest` to a flow (custom flow or template), runs it on
//! the engine and keeps successful results in a fingerprint-keyed cache with
//! a TTL. Concurrent identical requests share a single execution.

mod cache;
mod error;
mod request;
mod response;
mod service;

pub use cache::ResultCache;
pub use error::ServiceError;
pub use request::{AnalysisRequest, DEFAULT_PLATFORM};
pub use response::AnalysisResponse;
pub use service::{AnalysisService, ServiceConfig};
