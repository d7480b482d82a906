//! Per-node async runtime
//!
//! Every node runs in its own tokio task behind an unbounded mailbox. Nodes
//! address each other through a shared [`Router`]; the driver only starts
//! phases, waits until every node reports the current iteration complete,
//! and then sends each node its advance event.
//!
//! A node that has finished the last iteration of a phase is inactive.
//! Messages reaching an inactive node (a child that already started the
//! next phase) are held back and replayed once its own phase starts.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use iepos_agent::protocol::{NodeOutput, NodeSnapshot, PhaseStart};
use iepos_agent::{PhaseReport, PlanSource, ProtocolNode, Topology};
use iepos_common::{IeposError, Message, NodeId, Phase, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Mailbox entry of a node task
#[derive(Debug)]
pub enum NodeCommand {
    Start(PhaseStart),
    Advance,
    Deliver(Message),
    Snapshot(oneshot::Sender<NodeSnapshot>),
    Shutdown,
}

/// Progress reported to the driver
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    IterationComplete { node: NodeId, iteration: usize },
    Failed { node: NodeId, error: String },
}

/// Mailboxes of every node, indexed by node id
#[derive(Clone)]
struct Router {
    mailboxes: Arc<Vec<mpsc::UnboundedSender<NodeCommand>>>,
}

impl Router {
    fn send(&self, to: NodeId, command: NodeCommand) -> Result<()> {
        self.mailboxes
            .get(to.index())
            .ok_or_else(|| IeposError::Transport(format!("no route to {}", to)))?
            .send(command)
            .map_err(|_| IeposError::Transport(format!("mailbox of {} is closed", to)))
    }
}

struct NodeTask {
    node: Box<dyn ProtocolNode>,
    router: Router,
    events: mpsc::UnboundedSender<NodeEvent>,
    active: bool,
    held: Vec<Message>,
}

impl NodeTask {
    async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<NodeCommand>) {
        let id = self.node.id();
        while let Some(command) = mailbox.recv().await {
            let result = match command {
                NodeCommand::Start(start) => self.start(start),
                NodeCommand::Advance => self.advance(),
                NodeCommand::Deliver(message) => self.deliver(message),
                NodeCommand::Snapshot(reply) => {
                    let _ = reply.send(self.node.snapshot());
                    Ok(())
                }
                NodeCommand::Shutdown => break,
            };

            if let Err(e) = result {
                error!(node = %id, error = %e, "Node failed");
                let _ = self.events.send(NodeEvent::Failed {
                    node: id,
                    error: e.to_string(),
                });
                break;
            }
        }
        debug!(node = %id, "Node task stopped");
    }

    fn start(&mut self, start: PhaseStart) -> Result<()> {
        self.active = true;
        let output = self.node.start_phase(start)?;
        self.dispatch(output)?;

        for message in mem::take(&mut self.held) {
            self.deliver(message)?;
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<()> {
        let output = self.node.next_iteration()?;
        self.dispatch(output)
    }

    fn deliver(&mut self, message: Message) -> Result<()> {
        if !self.active {
            self.held.push(message);
            return Ok(());
        }
        let output = self.node.handle(message)?;
        self.dispatch(output)
    }

    fn dispatch(&mut self, output: NodeOutput) -> Result<()> {
        for outgoing in output.messages {
            self.router.send(outgoing.to, NodeCommand::Deliver(outgoing.message))?;
        }
        if let Some(iteration) = output.iteration_complete {
            if iteration + 1 >= self.node.iterations_per_phase() {
                self.active = false;
            }
            self.events
                .send(NodeEvent::IterationComplete {
                    node: self.node.id(),
                    iteration,
                })
                .map_err(|_| IeposError::Transport("driver is gone".to_string()))?;
        }
        Ok(())
    }
}

/// A spawned tree of node tasks
pub struct TreeRuntime {
    router: Router,
    events: mpsc::UnboundedReceiver<NodeEvent>,
    handles: Vec<JoinHandle<()>>,
    ids: Vec<NodeId>,
    root: NodeId,
    iterations: usize,
    stall_timeout: Option<Duration>,
}

impl TreeRuntime {
    /// Spawn one task per node; `nodes[i]` must be node `i` of `topology`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(topology: &Topology, nodes: Vec<Box<dyn ProtocolNode>>) -> Result<Self> {
        if nodes.len() != topology.len() {
            return Err(IeposError::Internal(format!(
                "{} nodes for a topology of {}",
                nodes.len(),
                topology.len()
            )));
        }
        if let Some((i, node)) = nodes.iter().enumerate().find(|(i, n)| n.id().index() != *i) {
            return Err(IeposError::Internal(format!("{} placed at index {}", node.id(), i)));
        }

        let root = topology.root();
        let iterations = nodes[root.index()].iterations_per_phase();
        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id()).collect();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (senders, receivers): (Vec<_>, Vec<_>) = nodes.iter().map(|_| mpsc::unbounded_channel()).unzip();
        let router = Router {
            mailboxes: Arc::new(senders),
        };

        let handles = nodes
            .into_iter()
            .zip(receivers)
            .map(|(node, mailbox)| {
                let task = NodeTask {
                    node,
                    router: router.clone(),
                    events: event_tx.clone(),
                    active: false,
                    held: Vec::new(),
                };
                tokio::spawn(task.run(mailbox))
            })
            .collect();

        info!(nodes = ids.len(), iterations, "Spawned node tasks");
        Ok(Self {
            router,
            events: event_rx,
            handles,
            ids,
            root,
            iterations,
            stall_timeout: None,
        })
    }

    /// Fail an iteration when no node reports progress for `timeout`
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Run every iteration of `phase` to completion
    #[instrument(skip(self, source), fields(nodes = self.ids.len()))]
    pub async fn run_phase(
        &mut self,
        phase: Phase,
        previous_phase: Option<Phase>,
        source: &dyn PlanSource,
    ) -> Result<PhaseReport> {
        for id in &self.ids {
            let plans = source.plans(*id, phase)?;
            self.router.send(
                *id,
                NodeCommand::Start(PhaseStart {
                    phase,
                    previous_phase,
                    plans,
                }),
            )?;
        }
        self.await_iteration(0).await?;

        for iteration in 1..self.iterations {
            for id in &self.ids {
                self.router.send(*id, NodeCommand::Advance)?;
            }
            self.await_iteration(iteration).await?;
        }

        let nodes = self.snapshots().await?;
        debug!(%phase, iterations = self.iterations, "Phase complete");
        Ok(PhaseReport {
            phase,
            iterations: self.iterations,
            global_plan: nodes[self.root.index()].global_plan.clone(),
            nodes,
        })
    }

    async fn await_iteration(&mut self, iteration: usize) -> Result<()> {
        let mut done = vec![false; self.ids.len()];
        let mut remaining = self.ids.len();

        while remaining > 0 {
            let event = match self.stall_timeout {
                Some(timeout) => tokio::time::timeout(timeout, self.events.recv())
                    .await
                    .map_err(|_| {
                        IeposError::Transport(format!(
                            "iteration {} stalled with {} nodes outstanding",
                            iteration, remaining
                        ))
                    })?,
                None => self.events.recv().await,
            };

            match event.ok_or_else(|| IeposError::Transport("every node task stopped".to_string()))? {
                NodeEvent::IterationComplete { node, iteration: it } if it == iteration => {
                    let slot = done
                        .get_mut(node.index())
                        .ok_or_else(|| IeposError::Internal(format!("event from unknown {}", node)))?;
                    if !*slot {
                        *slot = true;
                        remaining -= 1;
                    }
                }
                NodeEvent::IterationComplete { node, iteration: it } => {
                    return Err(IeposError::Internal(format!(
                        "{} completed iteration {} while iteration {} was running",
                        node, it, iteration
                    )));
                }
                NodeEvent::Failed { node, error } => {
                    return Err(IeposError::Internal(format!("{} failed: {}", node, error)));
                }
            }
        }
        Ok(())
    }

    /// Current state of every node, indexed by node id
    pub async fn snapshots(&self) -> Result<Vec<NodeSnapshot>> {
        let mut snapshots = Vec::with_capacity(self.ids.len());
        for id in &self.ids {
            let (tx, rx) = oneshot::channel();
            self.router.send(*id, NodeCommand::Snapshot(tx))?;
            let snapshot = rx
                .await
                .map_err(|_| IeposError::Transport(format!("{} dropped a snapshot request", id)))?;
            snapshots.push(snapshot);
        }
        Ok(snapshots)
    }

    /// Stop every node task and wait for it to exit
    pub async fn shutdown(self) -> Result<()> {
        for id in &self.ids {
            // A failed node has already stopped
            if self.router.send(*id, NodeCommand::Shutdown).is_err() {
                warn!(node = %id, "Node task already stopped");
            }
        }

        let results = futures::future::join_all(self.handles).await;
        if let Some(e) = results.into_iter().find_map(|r| r.err()) {
            return Err(IeposError::Internal(format!("node task panicked: {}", e)));
        }
        info!(nodes = self.ids.len(), "Node tasks stopped");
        Ok(())
    }
}
