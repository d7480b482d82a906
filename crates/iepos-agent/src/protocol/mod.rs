//! Tree protocols
//!
//! Every node is a message-driven state machine. It acts only when a phase
//! starts, when the driver advances it to the next iteration, or when a
//! message arrives; each step returns the messages to deliver. Transport is
//! someone else's job: [`network::LocalNetwork`] delivers in-process and
//! the simulator crate runs one task per node.

pub mod exhaustive;
pub mod iepos;
pub mod network;
pub mod template;
pub mod topology;

use iepos_common::{Message, NodeId, Phase, Plan, Result};

pub use self::exhaustive::ExhaustiveNode;
pub use self::iepos::IeposAgent;
pub use self::network::{exhaustive_nodes, iepos_nodes, LocalNetwork, PhaseReport};
pub use self::template::{IterativeAgent, IterativeNode, NodeContext, WorkDelta};
pub use self::topology::{NodeTopology, Topology};

/// A message addressed to a neighbour
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub to: NodeId,
    pub message: Message,
}

/// Result of one node step
#[derive(Debug, Default)]
pub struct NodeOutput {
    pub messages: Vec<Outgoing>,
    /// Set when this step finished the node's part of an iteration
    pub iteration_complete: Option<usize>,
}

impl NodeOutput {
    /// Append another step's output, keeping the latest completion
    pub fn merge(&mut self, other: NodeOutput) {
        self.messages.extend(other.messages);
        if other.iteration_complete.is_some() {
            self.iteration_complete = other.iteration_complete;
        }
    }
}

/// Inputs of a new phase, supplied by the phase driver
#[derive(Debug, Clone)]
pub struct PhaseStart {
    pub phase: Phase,
    /// Phase whose archived plans become the `historic` record
    pub previous_phase: Option<Phase>,
    /// The node's menu for this phase
    pub plans: Vec<Plan>,
}

/// Externally visible state of a node after an iteration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSnapshot {
    pub global_plan: Option<Plan>,
    pub selected_plan: Option<Plan>,
    pub selected_index: Option<usize>,
    pub cum_computations: u64,
    pub cum_transmitted: u64,
}

/// A participant that can be driven by a network or runtime
pub trait ProtocolNode: Send {
    fn id(&self) -> NodeId;

    /// Number of iterations every phase runs
    fn iterations_per_phase(&self) -> usize;

    fn start_phase(&mut self, start: PhaseStart) -> Result<NodeOutput>;

    /// Per-node advance event
    fn next_iteration(&mut self) -> Result<NodeOutput>;

    fn handle(&mut self, message: Message) -> Result<NodeOutput>;

    fn snapshot(&self) -> NodeSnapshot;
}
