//! Exhaustive (optimal) baseline
//!
//! A single token walks the tree depth first. On its first visit every node
//! extends each partial combination with each of its own plans, so when the
//! token returns to the root it carries every combination of the whole
//! tree. The root picks the optimum through the same fitness contract and
//! broadcasts the complete selection map. One iteration per phase; the
//! token size is the product of all menu sizes, so this only suits small
//! trees.

use std::collections::BTreeMap;
use std::sync::Arc;

use iepos_common::{
    ConfigError, ExhaustiveAggregate, ExhaustiveOptimal, Message, MessageHeader, NodeId, PartialCombination,
    Payload, Phase, Plan, ProtocolError, Result,
};
use tracing::{debug, info, instrument};

use super::template::WorkDelta;
use super::topology::NodeTopology;
use super::{NodeOutput, NodeSnapshot, Outgoing, PhaseStart, ProtocolNode};
use crate::fitness::{IterativeFitnessFunction, SelectionContext};
use crate::telemetry::{GlobalMeasurement, LocalMeasurement, MeasurementSink, WorkMeasurement};

pub struct ExhaustiveNode {
    topology: NodeTopology,
    cost_signal: Plan,
    fitness: Box<dyn IterativeFitnessFunction>,
    sink: Arc<dyn MeasurementSink>,

    phase: Option<Phase>,
    possible_plans: Vec<Plan>,
    /// Token already extended with this node's plans
    visited: bool,
    /// Next child to hand the token to
    next_child: usize,

    global_plan: Option<Plan>,
    selected_index: Option<usize>,

    work: WorkDelta,
    cum_computations: u64,
    cum_transmitted: u64,
}

impl ExhaustiveNode {
    pub fn new(
        topology: NodeTopology,
        cost_signal: Plan,
        fitness: Box<dyn IterativeFitnessFunction>,
        sink: Arc<dyn MeasurementSink>,
    ) -> Self {
        Self {
            topology,
            cost_signal,
            fitness,
            sink,
            phase: None,
            possible_plans: Vec::new(),
            visited: false,
            next_child: 0,
            global_plan: None,
            selected_index: None,
            work: WorkDelta::default(),
            cum_computations: 0,
            cum_transmitted: 0,
        }
    }

    fn phase(&self) -> Result<Phase> {
        self.phase
            .ok_or_else(|| ProtocolError::NotStarted { node: self.topology.id }.into())
    }

    /// Fold pending work into the counters and stamp a header
    fn header(&mut self) -> MessageHeader {
        let work = std::mem::take(&mut self.work);
        self.cum_computations += work.computations;
        self.cum_transmitted += work.transmitted;
        MessageHeader {
            sender: self.topology.id,
            cum_computations: self.cum_computations,
            cum_transmitted: self.cum_transmitted,
        }
    }

    fn seed(&mut self) -> ExhaustiveAggregate {
        let id = self.topology.id;
        let combinations: Vec<PartialCombination> = self
            .possible_plans
            .iter()
            .enumerate()
            .map(|(i, plan)| PartialCombination {
                plan: plan.clone(),
                selection: BTreeMap::from([(id, i)]),
            })
            .collect();
        self.work.computations += combinations.len() as u64;
        ExhaustiveAggregate { combinations }
    }

    /// Cross product of the token with this node's menu
    fn extend(&mut self, token: ExhaustiveAggregate) -> Result<ExhaustiveAggregate> {
        let id = self.topology.id;
        let mut combinations = Vec::with_capacity(token.combinations.len() * self.possible_plans.len());
        for partial in &token.combinations {
            self.cost_signal.check_same_shape(&partial.plan)?;
            for (i, own) in self.possible_plans.iter().enumerate() {
                let mut plan = partial.plan.clone();
                plan.add(own);
                plan.set_discomfort(partial.plan.discomfort() + own.discomfort());
                let mut selection = partial.selection.clone();
                selection.insert(id, i);
                combinations.push(PartialCombination { plan, selection });
            }
        }
        self.work.computations += combinations.len() as u64;
        Ok(ExhaustiveAggregate { combinations })
    }

    /// Hand the token to the next child, back to the parent, or decide
    fn forward(&mut self, token: ExhaustiveAggregate) -> Result<NodeOutput> {
        let to = match self.topology.children.get(self.next_child) {
            Some(child) => {
                self.next_child += 1;
                *child
            }
            None => match self.topology.parent {
                Some(parent) => parent,
                None => return self.decide(token),
            },
        };
        self.work.transmitted += token.combinations.len() as u64;
        let header = self.header();
        Ok(NodeOutput {
            messages: vec![Outgoing {
                to,
                message: Message::new(header, token),
            }],
            iteration_complete: None,
        })
    }

    #[instrument(skip_all, fields(node = %self.topology.id))]
    fn decide(&mut self, token: ExhaustiveAggregate) -> Result<NodeOutput> {
        let phase = self.phase()?;
        let candidates: Vec<Plan> = token.combinations.iter().map(|c| c.plan.clone()).collect();
        let num_nodes = token
            .combinations
            .first()
            .map(|c| c.selection.len())
            .unwrap_or(1);

        let aggregate = Plan::zeros(self.cost_signal.num_states());
        let ctx = SelectionContext {
            node: self.topology.id,
            cost_signal: &self.cost_signal,
            previous: None,
            num_nodes: Some(num_nodes),
            num_nodes_subtree: num_nodes,
            layer: 0,
            avg_num_children: self.topology.children.len() as f64,
            iteration: 0,
        };
        let index = self
            .fitness
            .select(&ctx, &aggregate, &candidates)
            .ok_or(ProtocolError::InvalidSelection {
                index: 0,
                candidates: candidates.len(),
            })?;
        self.work.computations += candidates.len() as u64;

        let optimal = token
            .combinations
            .into_iter()
            .nth(index)
            .ok_or(ProtocolError::InvalidSelection {
                index,
                candidates: candidates.len(),
            })?;

        let robustness = self.fitness.robustness(&optimal.plan, &self.cost_signal, None);
        info!(
            combinations = candidates.len(),
            variance = optimal.plan.variance(),
            "Exhaustive optimum selected"
        );
        self.sink.record_global(GlobalMeasurement {
            phase,
            iteration: 0,
            global_plan: optimal.plan.clone(),
            num_states: optimal.plan.num_states(),
            num_nodes,
            robustness,
        });

        self.apply(ExhaustiveOptimal {
            global_plan: optimal.plan,
            selection: optimal.selection,
        })
    }

    /// Adopt the optimum and pass it on to every child
    fn apply(&mut self, optimal: ExhaustiveOptimal) -> Result<NodeOutput> {
        let phase = self.phase()?;
        let node = self.topology.id;
        let index = *optimal
            .selection
            .get(&node)
            .ok_or(ProtocolError::MissingSelection { node, child: node })?;
        let plan = self
            .possible_plans
            .get(index)
            .ok_or(ProtocolError::SelectionOutOfMenu {
                node,
                index,
                menu: self.possible_plans.len(),
            })?;

        self.sink.record_local(LocalMeasurement {
            node,
            phase,
            iteration: 0,
            selected_index: index,
            menu_size: self.possible_plans.len(),
            discomfort: plan.discomfort(),
            selected_plan: plan.clone(),
        });
        self.selected_index = Some(index);
        self.global_plan = Some(optimal.global_plan.clone());

        self.work.transmitted += self.topology.children.len() as u64;
        let header = self.header();
        let messages = self
            .topology
            .children
            .iter()
            .map(|child| Outgoing {
                to: *child,
                message: Message::new(header, optimal.clone()),
            })
            .collect();

        self.sink.record_work(WorkMeasurement {
            node,
            phase,
            iteration: 0,
            cum_computations: self.cum_computations,
            cum_transmitted: self.cum_transmitted,
        });

        Ok(NodeOutput {
            messages,
            iteration_complete: Some(0),
        })
    }

    fn handle_token(&mut self, sender: NodeId, token: ExhaustiveAggregate) -> Result<NodeOutput> {
        let node = self.topology.id;
        if self.topology.parent == Some(sender) && !self.visited {
            self.visited = true;
            let extended = self.extend(token)?;
            return self.forward(extended);
        }

        let active = self
            .next_child
            .checked_sub(1)
            .and_then(|i| self.topology.children.get(i));
        if active == Some(&sender) {
            return self.forward(token);
        }
        if self.topology.child_position(sender).is_none() && self.topology.parent != Some(sender) {
            return Err(ProtocolError::UnknownChild { node, sender }.into());
        }
        Err(ProtocolError::UnexpectedSender { node, sender }.into())
    }
}

impl ProtocolNode for ExhaustiveNode {
    fn id(&self) -> NodeId {
        self.topology.id
    }

    fn iterations_per_phase(&self) -> usize {
        1
    }

    fn start_phase(&mut self, start: PhaseStart) -> Result<NodeOutput> {
        if start.plans.is_empty() {
            return Err(ConfigError::EmptyMenu { child: self.topology.id }.into());
        }
        for plan in &start.plans {
            self.cost_signal.check_same_shape(plan)?;
        }
        debug!(node = %self.topology.id, phase = %start.phase, "Starting exhaustive phase");

        self.phase = Some(start.phase);
        self.possible_plans = start.plans;
        self.visited = self.topology.is_root();
        self.next_child = 0;
        self.global_plan = None;
        self.selected_index = None;

        if self.topology.is_root() {
            let token = self.seed();
            self.forward(token)
        } else {
            Ok(NodeOutput::default())
        }
    }

    fn next_iteration(&mut self) -> Result<NodeOutput> {
        Err(ProtocolError::PhaseExhausted { node: self.topology.id }.into())
    }

    fn handle(&mut self, message: Message) -> Result<NodeOutput> {
        self.phase()?;
        self.cum_computations = self.cum_computations.max(message.header.cum_computations);
        self.cum_transmitted = self.cum_transmitted.max(message.header.cum_transmitted);
        let sender = message.header.sender;
        let node = self.topology.id;

        match message.payload {
            Payload::ExhaustiveAggregate(token) => self.handle_token(sender, token),
            Payload::ExhaustiveOptimal(optimal) if self.topology.parent == Some(sender) => self.apply(optimal),
            Payload::ExhaustiveOptimal(_) => Err(ProtocolError::UnexpectedSender { node, sender }.into()),
            other => Err(ProtocolError::UnexpectedPayload {
                node,
                payload: other.kind(),
            }
            .into()),
        }
    }

    fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            global_plan: self.global_plan.clone(),
            selected_plan: self
                .selected_index
                .and_then(|i| self.possible_plans.get(i))
                .cloned(),
            selected_index: self.selected_index,
            cum_computations: self.cum_computations,
            cum_transmitted: self.cum_transmitted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::VarianceFitness;
    use crate::telemetry::RecordingSink;
    use chrono::Utc;
    use iepos_common::IeposError;

    fn node(id: u32, parent: Option<u32>, children: &[u32]) -> ExhaustiveNode {
        ExhaustiveNode::new(
            NodeTopology {
                id: NodeId(id),
                parent: parent.map(NodeId),
                children: children.iter().map(|c| NodeId(*c)).collect(),
            },
            Plan::zeros(2),
            Box::new(VarianceFitness::default()),
            Arc::new(RecordingSink::new()),
        )
    }

    fn start(plans: Vec<Plan>) -> PhaseStart {
        PhaseStart {
            phase: Utc::now(),
            previous_phase: None,
            plans,
        }
    }

    #[test]
    fn test_single_root_decides_immediately() {
        let mut root = node(0, None, &[]);
        let output = root
            .start_phase(start(vec![
                Plan::from_values(vec![3.0, 0.0]),
                Plan::from_values(vec![1.0, 1.0]),
            ]))
            .unwrap();

        assert!(output.messages.is_empty());
        assert_eq!(output.iteration_complete, Some(0));
        assert_eq!(root.snapshot().selected_index, Some(1));
    }

    #[test]
    fn test_leaf_extends_and_returns_token() {
        let mut leaf = node(1, Some(0), &[]);
        leaf.start_phase(start(vec![Plan::from_values(vec![1.0, 0.0]), Plan::from_values(vec![0.0, 1.0])]))
            .unwrap();

        let token = ExhaustiveAggregate {
            combinations: vec![PartialCombination {
                plan: Plan::from_values(vec![5.0, 5.0]),
                selection: BTreeMap::from([(NodeId(0), 0)]),
            }],
        };
        let output = leaf.handle(Message::new(MessageHeader::new(NodeId(0)), token)).unwrap();

        assert_eq!(output.messages.len(), 1);
        assert_eq!(output.messages[0].to, NodeId(0));
        let Payload::ExhaustiveAggregate(returned) = &output.messages[0].message.payload else {
            panic!("expected aggregate token");
        };
        assert_eq!(returned.combinations.len(), 2);
        assert_eq!(returned.combinations[1].plan.values(), &[5.0, 6.0]);
        assert_eq!(returned.combinations[1].selection.get(&NodeId(1)), Some(&1));
    }

    #[test]
    fn test_rejects_iepos_payload() {
        let mut leaf = node(1, Some(0), &[]);
        leaf.start_phase(start(vec![Plan::zeros(2)])).unwrap();
        let err = leaf
            .handle(Message::new(
                MessageHeader::new(NodeId(0)),
                iepos_common::IeposDown::new(Plan::zeros(2), 2, 0, 0, 0),
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            IeposError::Protocol(ProtocolError::UnexpectedPayload { payload: "iepos_down", .. })
        ));
    }
}
