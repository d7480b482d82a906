//! Iterative node template
//!
//! Owns everything that is the same for every iterative protocol of the
//! family: iteration counting, buffering of up messages until every child
//! has reported, restoring canonical child order, the root turnaround, the
//! cumulative work counters and addressing of down messages. The protocol
//! itself plugs in through [`IterativeAgent`].
//!
//! ```text
//! PhaseInit -> IterationInit -> AwaitingChildren -> Ascend -> (root) Decide
//!                   ^                                            |
//!                   +---- IterationDone <----- Descend <---------+
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use iepos_common::{
    IeposError, Message, MessageHeader, NodeId, Phase, Plan, ProtocolError, ProtocolPayload, Result,
};
use tracing::{debug, instrument, trace};

use super::topology::NodeTopology;
use super::{NodeOutput, NodeSnapshot, Outgoing, PhaseStart, ProtocolNode};
use crate::telemetry::{MeasurementSink, WorkMeasurement};

/// Work done since the counters were last fixed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkDelta {
    pub computations: u64,
    pub transmitted: u64,
}

/// What an agent sees of its surroundings during a step
#[derive(Debug, Clone, Copy)]
pub struct NodeContext<'a> {
    pub topology: &'a NodeTopology,
    pub phase: Phase,
    pub previous_phase: Option<Phase>,
    pub iteration: usize,
    pub num_iterations: usize,
}

/// Protocol-specific half of an iterative node
pub trait IterativeAgent: Send {
    type Up: ProtocolPayload + Send;
    type Down: ProtocolPayload + Send;

    /// Reset per-phase state and take over the phase's menu
    fn init_phase(&mut self, ctx: &NodeContext<'_>, plans: Vec<Plan>) -> Result<()>;

    fn init_iteration(&mut self, ctx: &NodeContext<'_>);

    /// Combine the children's messages (canonical order) into this node's up message
    fn up(&mut self, ctx: &NodeContext<'_>, children: Vec<Self::Up>) -> Result<Self::Up>;

    /// Root turnaround: decide and produce the first down message
    fn at_root(&mut self, ctx: &NodeContext<'_>, msg: Self::Up) -> Result<Self::Down>;

    /// Apply the parent's decision; one message per child in canonical order
    fn down(&mut self, ctx: &NodeContext<'_>, parent: Self::Down) -> Result<Vec<Self::Down>>;

    /// Work accumulated since the last call
    fn drain_work(&mut self) -> WorkDelta;

    fn snapshot(&self) -> NodeSnapshot;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Idle,
    AwaitingChildren,
    AwaitingParent,
    IterationDone,
}

#[derive(Debug, Clone, Copy)]
struct PhaseState {
    phase: Phase,
    previous_phase: Option<Phase>,
    iteration: usize,
}

/// Generic iterative node driving an [`IterativeAgent`]
pub struct IterativeNode<A: IterativeAgent> {
    topology: NodeTopology,
    agent: A,
    num_iterations: usize,
    state: NodeState,
    phase: Option<PhaseState>,
    /// Up messages keyed by child, in arrival order
    buffer: HashMap<NodeId, A::Up>,
    cum_computations: u64,
    cum_transmitted: u64,
    sink: Arc<dyn MeasurementSink>,
}

/// Borrows only the topology, so the agent stays mutably borrowable
fn context(topology: &NodeTopology, phase: Option<PhaseState>, num_iterations: usize) -> Result<NodeContext<'_>> {
    let phase = phase.ok_or(ProtocolError::NotStarted { node: topology.id })?;
    Ok(NodeContext {
        topology,
        phase: phase.phase,
        previous_phase: phase.previous_phase,
        iteration: phase.iteration,
        num_iterations,
    })
}

impl<A: IterativeAgent> IterativeNode<A> {
    pub fn new(topology: NodeTopology, agent: A, num_iterations: usize, sink: Arc<dyn MeasurementSink>) -> Self {
        Self {
            topology,
            agent,
            num_iterations,
            state: NodeState::Idle,
            phase: None,
            buffer: HashMap::new(),
            cum_computations: 0,
            cum_transmitted: 0,
            sink,
        }
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn topology(&self) -> &NodeTopology {
        &self.topology
    }

    /// Zero-based iteration of the running phase
    pub fn iteration(&self) -> Option<usize> {
        self.phase.map(|p| p.iteration)
    }

    fn header(&self) -> MessageHeader {
        MessageHeader {
            sender: self.topology.id,
            cum_computations: self.cum_computations,
            cum_transmitted: self.cum_transmitted,
        }
    }

    fn merge_counters(&mut self, header: &MessageHeader) {
        self.cum_computations = self.cum_computations.max(header.cum_computations);
        self.cum_transmitted = self.cum_transmitted.max(header.cum_transmitted);
    }

    fn fix_counters(&mut self) {
        let work = self.agent.drain_work();
        self.cum_computations += work.computations;
        self.cum_transmitted += work.transmitted;
    }

    fn begin_iteration(&mut self) -> Result<NodeOutput> {
        let ctx = context(&self.topology, self.phase, self.num_iterations)?;
        self.agent.init_iteration(&ctx);
        self.state = NodeState::AwaitingChildren;
        self.try_ascend()
    }

    fn try_ascend(&mut self) -> Result<NodeOutput> {
        if self.state != NodeState::AwaitingChildren || self.buffer.len() < self.topology.children.len() {
            return Ok(NodeOutput::default());
        }
        self.ascend()
    }

    #[instrument(skip(self), fields(node = %self.topology.id))]
    fn ascend(&mut self) -> Result<NodeOutput> {
        let mut ordered = Vec::with_capacity(self.topology.children.len());
        for child in &self.topology.children {
            let msg = self.buffer.remove(child).ok_or(ProtocolError::MissingChildMessage {
                node: self.topology.id,
                child: *child,
            })?;
            ordered.push(msg);
        }

        let ctx = context(&self.topology, self.phase, self.num_iterations)?;
        let up = self.agent.up(&ctx, ordered)?;
        self.fix_counters();

        match self.topology.parent {
            None => {
                let ctx = context(&self.topology, self.phase, self.num_iterations)?;
                let down = self.agent.at_root(&ctx, up)?;
                self.fix_counters();
                self.descend(down)
            }
            Some(parent) => {
                self.state = NodeState::AwaitingParent;
                trace!(to = %parent, "Ascend");
                Ok(NodeOutput {
                    messages: vec![Outgoing {
                        to: parent,
                        message: Message::new(self.header(), up),
                    }],
                    iteration_complete: None,
                })
            }
        }
    }

    fn descend(&mut self, parent: A::Down) -> Result<NodeOutput> {
        let ctx = context(&self.topology, self.phase, self.num_iterations)?;
        let iteration = ctx.iteration;
        let downs = self.agent.down(&ctx, parent)?;
        self.fix_counters();

        if downs.len() != self.topology.children.len() {
            return Err(IeposError::Internal(format!(
                "{} produced {} down messages for {} children",
                self.topology.id,
                downs.len(),
                self.topology.children.len()
            )));
        }

        let header = self.header();
        let messages = self
            .topology
            .children
            .iter()
            .zip(downs)
            .map(|(child, down)| Outgoing {
                to: *child,
                message: Message::new(header, down),
            })
            .collect();

        self.state = NodeState::IterationDone;
        if let Some(phase) = self.phase {
            self.sink.record_work(WorkMeasurement {
                node: self.topology.id,
                phase: phase.phase,
                iteration,
                cum_computations: self.cum_computations,
                cum_transmitted: self.cum_transmitted,
            });
        }

        Ok(NodeOutput {
            messages,
            iteration_complete: Some(iteration),
        })
    }

    fn handle_up(&mut self, sender: NodeId, up: A::Up) -> Result<NodeOutput> {
        let node = self.topology.id;
        if self.topology.child_position(sender).is_none() {
            return Err(ProtocolError::UnknownChild { node, sender }.into());
        }
        if self.buffer.contains_key(&sender) {
            return Err(ProtocolError::DuplicateUp { node, sender }.into());
        }
        self.buffer.insert(sender, up);
        self.try_ascend()
    }

    fn handle_down(&mut self, sender: NodeId, down: A::Down) -> Result<NodeOutput> {
        let node = self.topology.id;
        if self.topology.parent != Some(sender) {
            return Err(ProtocolError::UnexpectedSender { node, sender }.into());
        }
        if self.state != NodeState::AwaitingParent {
            return Err(ProtocolError::UnexpectedPayload {
                node,
                payload: "down message outside of awaiting-parent state",
            }
            .into());
        }
        self.descend(down)
    }
}

impl<A: IterativeAgent> ProtocolNode for IterativeNode<A> {
    fn id(&self) -> NodeId {
        self.topology.id
    }

    fn iterations_per_phase(&self) -> usize {
        self.num_iterations
    }

    fn start_phase(&mut self, start: PhaseStart) -> Result<NodeOutput> {
        debug!(node = %self.topology.id, phase = %start.phase, "Starting phase");
        self.phase = Some(PhaseState {
            phase: start.phase,
            previous_phase: start.previous_phase,
            iteration: 0,
        });
        let ctx = context(&self.topology, self.phase, self.num_iterations)?;
        self.agent.init_phase(&ctx, start.plans)?;
        self.begin_iteration()
    }

    fn next_iteration(&mut self) -> Result<NodeOutput> {
        let node = self.topology.id;
        let phase = self.phase.as_mut().ok_or(ProtocolError::NotStarted { node })?;
        if phase.iteration + 1 >= self.num_iterations {
            return Err(ProtocolError::PhaseExhausted { node }.into());
        }
        phase.iteration += 1;
        self.begin_iteration()
    }

    fn handle(&mut self, message: Message) -> Result<NodeOutput> {
        self.merge_counters(&message.header);
        let sender = message.header.sender;

        match A::Up::from_payload(message.payload) {
            Ok(up) => self.handle_up(sender, up),
            Err(payload) => match A::Down::from_payload(payload) {
                Ok(down) => self.handle_down(sender, down),
                Err(payload) => Err(ProtocolError::UnexpectedPayload {
                    node: self.topology.id,
                    payload: payload.kind(),
                }
                .into()),
            },
        }
    }

    fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            cum_computations: self.cum_computations,
            cum_transmitted: self.cum_transmitted,
            ..self.agent.snapshot()
        }
    }
}
