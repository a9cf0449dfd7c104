//! Substrate Client: the sole HTTP boundary to the substrate knowledge
//! service. Retry policy and circuit breaker live here so every caller in
//! the crate gets them for free.

mod circuit_breaker;
mod client;
pub mod types;

pub use circuit_breaker::CircuitBreaker;
pub use client::{AuthOverride, SharedSubstrateClient, SubstrateClient};
