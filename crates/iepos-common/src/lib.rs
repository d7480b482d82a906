//! # IEPOS Common
//!
//! Shared types and errors for the I-EPOS tree aggregation protocol.
//!
//! ## Core Types
//!
//! - [`Plan`]: fixed-length numeric vector with discomfort, the currency of the protocol
//! - [`AgentPlans`]: a node's per-iteration snapshot (global, aggregate, selected, combinational)
//! - [`NodeId`] / [`Phase`]: node identity and planning-period timestamp
//!
//! ## Messages
//!
//! - [`message::MessageHeader`]: sender plus cumulative cost counters
//! - [`message::Payload`]: per-protocol payload union (I-EPOS and exhaustive variants)

pub mod error;
pub mod message;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ConfigError, IeposError, ProtocolError, Result};
pub use message::{
    ExhaustiveAggregate, ExhaustiveOptimal, IeposDown, IeposUp, Message, MessageHeader,
    PartialCombination, Payload, ProtocolPayload,
};
pub use types::{
    agent_plans::AgentPlans,
    node::{NodeId, Phase},
    plan::Plan,
};

/// IEPOS version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Floor applied to the hop count when averaging branching factors
pub const MIN_HOPS_DIVISOR: f64 = 0.1;

/// Default number of iterations per phase
pub const DEFAULT_NUM_ITERATIONS: usize = 20;

/// Default number of archived phases
pub const DEFAULT_HISTORY_SIZE: usize = 5;
