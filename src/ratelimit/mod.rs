//! Admission control limiters and their shared state.

mod backend;
mod leaky_bucket;
mod limiter;
mod pool;
mod token_bucket;

pub use backend::{Limiter, Strategy};
pub use leaky_bucket::LeakyBucketLimiter;
pub use limiter::RateLimiter;
pub use token_bucket::TokenBucketLimiter;
