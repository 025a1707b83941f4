pub mod circuit_breaker;
pub mod config;
pub mod errors;

pub use circuit_breaker::*;
pub use config::*;
pub use errors::*;

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
