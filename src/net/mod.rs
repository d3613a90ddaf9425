pub mod client;
pub mod metrics;
pub mod proxy_pool;
pub mod rate_limiter;

pub use client::{HttpClient, RequestSpec};
pub use proxy_pool::ProxyPool;
pub use rate_limiter::RateLimiter;
