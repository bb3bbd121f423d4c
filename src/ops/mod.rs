pub mod breaker;
pub mod client;

pub use breaker::{BreakerState, CircuitBreaker};
pub use client::{OpsClient, OpsError};
