//! Error types for the I-EPOS protocol
//!
//! Provides a unified error type and domain-specific error variants

use thiserror::Error;

use crate::types::node::NodeId;

/// Result type alias using IeposError
pub type Result<T> = std::result::Result<T, IeposError>;

/// Unified error type for I-EPOS operations
#[derive(Debug, Error)]
pub enum IeposError {
    // Setup defects, fatal at the point of detection
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // Message-flow violations
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // Delivery substrate failures
    #[error("Transport error: {0}")]
    Transport(String),

    // Plan source / dataset failures
    #[error("Dataset error: {0}")]
    Dataset(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Setup defects: zero-size menus, mismatched plan shapes, bad ramp-up rates
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Child {child} reported an empty plan menu")]
    EmptyMenu { child: NodeId },

    #[error("Plan length mismatch: expected {expected} states, got {actual}")]
    PlanLengthMismatch { expected: usize, actual: usize },

    #[error("Ramp-up produced a non-positive candidate count: {count}")]
    NonPositiveCandidateCount { count: i64 },

    #[error("Invalid ramp-up rate: {0}")]
    InvalidRampUpRate(f64),

    #[error("Combinatorial space overflows usize")]
    CombinationOverflow,

    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    #[error("History size must be at least 1")]
    InvalidHistorySize,

    #[error("Number of iterations must be at least 1")]
    ZeroIterations,
}

/// Message-flow violations detected by a node
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("Node {node} received an up message from {sender}, which is not one of its children")]
    UnknownChild { node: NodeId, sender: NodeId },

    #[error("Node {node} received a second up message from child {sender} in the same iteration")]
    DuplicateUp { node: NodeId, sender: NodeId },

    #[error("Node {node} received a down message from {sender}, which is not its parent")]
    UnexpectedSender { node: NodeId, sender: NodeId },

    #[error("Node {node} cannot handle payload {payload}")]
    UnexpectedPayload { node: NodeId, payload: &'static str },

    #[error("Fitness function selected index {index} out of {candidates} candidates")]
    InvalidSelection { index: usize, candidates: usize },

    #[error("Node {node} has no iterations left in the current phase")]
    PhaseExhausted { node: NodeId },

    #[error("Node {node} has not started a phase")]
    NotStarted { node: NodeId },

    #[error("Node {node} is missing the up message of child {child}")]
    MissingChildMessage { node: NodeId, child: NodeId },

    #[error("Node {node} is missing its selected plan index for child {child}")]
    MissingSelection { node: NodeId, child: NodeId },

    #[error("Selected plan index {index} is outside the menu of {menu} plans at node {node}")]
    SelectionOutOfMenu { node: NodeId, index: usize, menu: usize },
}
