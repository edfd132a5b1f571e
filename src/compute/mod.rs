//! [`ComputeLayer`](crate::wrap::ComputeLayer) implementations.
//!
//! - [`InMemoryComputeLayer`]: a local stand-in that stores wrapped values in
//!   process and enforces the same authorization rules as the real service.
//! - [`GatewayComputeLayer`]: JSON-over-HTTPS adapter for a relayer gateway.

mod gateway;
mod memory;

pub use gateway::GatewayComputeLayer;
pub use memory::{InMemoryComputeLayer, CLOCK_SKEW_SECS};
