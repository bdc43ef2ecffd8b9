//! gRPC service implementations.

mod rate_limit;
mod session_proof;

pub use rate_limit::{CallerKey, RateLimitInterceptor, ServiceRateLimiter};
pub use session_proof::SessionProofServiceImpl;
