//! Core data types for the I-EPOS protocol

pub mod agent_plans;
pub mod node;
pub mod plan;
