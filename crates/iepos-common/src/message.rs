//! Protocol messages
//!
//! Every message is a [`MessageHeader`] (sender identity plus the cumulative
//! cost counters that are max-merged at every hop) composed with a
//! [`Payload`] variant. Each protocol of the family contributes its own
//! payload variants; nodes reject variants they do not speak.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::node::NodeId;
use crate::types::plan::Plan;

/// Fields shared by every message of every protocol variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Sending node
    pub sender: NodeId,
    /// Worst-path cumulative computation units so far
    pub cum_computations: u64,
    /// Worst-path cumulative transmitted units so far
    pub cum_transmitted: u64,
}

impl MessageHeader {
    pub fn new(sender: NodeId) -> Self {
        Self {
            sender,
            cum_computations: 0,
            cum_transmitted: 0,
        }
    }
}

/// A header plus one protocol payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub header: MessageHeader,
    pub payload: Payload,
}

impl Message {
    pub fn new(header: MessageHeader, payload: impl ProtocolPayload) -> Self {
        Self {
            header,
            payload: payload.into_payload(),
        }
    }

    pub fn sender(&self) -> NodeId {
        self.header.sender
    }
}

/// Payload union over all protocol variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    IeposUp(IeposUp),
    IeposDown(IeposDown),
    ExhaustiveAggregate(ExhaustiveAggregate),
    ExhaustiveOptimal(ExhaustiveOptimal),
}

impl Payload {
    /// Variant name, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::IeposUp(_) => "iepos_up",
            Payload::IeposDown(_) => "iepos_down",
            Payload::ExhaustiveAggregate(_) => "exhaustive_aggregate",
            Payload::ExhaustiveOptimal(_) => "exhaustive_optimal",
        }
    }
}

/// Conversion between a concrete payload struct and the [`Payload`] union
pub trait ProtocolPayload: Sized {
    fn into_payload(self) -> Payload;

    /// Extract the concrete payload, handing the union back on mismatch
    fn from_payload(payload: Payload) -> Result<Self, Payload>;
}

/// I-EPOS up message: a child's contribution to its parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IeposUp {
    /// Aggregate of the sender's subtree
    pub aggregate_plan: Plan,
    /// Sender's own menu, passed through for the parent's combinations
    pub possible_plans: Vec<Plan>,
    /// Number of nodes in the sender's subtree
    pub num_nodes: usize,
}

/// I-EPOS down message: the root's decision on its way to the leaves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IeposDown {
    /// Tentative or final global plan
    pub global_plan: Plan,
    /// Total number of nodes in the tree
    pub num_nodes: usize,
    /// Hops from the root to the sender
    pub hops: usize,
    /// Sum of branching factors along the path from the root
    pub sum_children: usize,
    /// Menu index selected for the receiving node
    pub selected: usize,
    /// Receiver must keep its previous iteration's decision
    pub discard: bool,
}

impl IeposDown {
    pub fn new(global_plan: Plan, num_nodes: usize, hops: usize, sum_children: usize, selected: usize) -> Self {
        Self {
            global_plan,
            num_nodes,
            hops,
            sum_children,
            selected,
            discard: false,
        }
    }
}

/// One partial assignment of menu indices, with its summed plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialCombination {
    pub plan: Plan,
    pub selection: BTreeMap<NodeId, usize>,
}

/// Exhaustive variant: the growing set of all combinations, passed depth first
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExhaustiveAggregate {
    pub combinations: Vec<PartialCombination>,
}

/// Exhaustive variant: the optimum chosen by the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExhaustiveOptimal {
    pub global_plan: Plan,
    pub selection: BTreeMap<NodeId, usize>,
}

macro_rules! impl_protocol_payload {
    ($($ty:ident),* $(,)?) => {
        $(
            impl ProtocolPayload for $ty {
                fn into_payload(self) -> Payload {
                    Payload::$ty(self)
                }

                fn from_payload(payload: Payload) -> Result<Self, Payload> {
                    match payload {
                        Payload::$ty(inner) => Ok(inner),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

impl_protocol_payload!(IeposUp, IeposDown, ExhaustiveAggregate, ExhaustiveOptimal);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_unwrap_mismatch() {
        let down = IeposDown::new(Plan::zeros(2), 3, 0, 0, 1);
        let payload = down.clone().into_payload();
        assert_eq!(payload.kind(), "iepos_down");

        let back = IeposDown::from_payload(payload.clone()).unwrap();
        assert_eq!(back, down);

        let err = IeposUp::from_payload(payload).unwrap_err();
        assert_eq!(err.kind(), "iepos_down");
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::new(
            MessageHeader::new(NodeId(4)),
            IeposUp {
                aggregate_plan: Plan::from_values(vec![1.0, 2.0]),
                possible_plans: vec![Plan::zeros(2)],
                num_nodes: 1,
            },
        );
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"iepos_up\""));
        let decoded: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, msg);
    }
}
