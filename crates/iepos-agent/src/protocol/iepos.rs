//! I-EPOS agent
//!
//! Every iteration, a node combines its children's own menus into candidate
//! combinations, lets its fitness function pick one against the children's
//! aggregate and passes the result up. The root picks its own plan, fixes the
//! global plan and the decision flows back down: each node adopts the menu
//! entry its parent chose for it, optionally keeping last iteration's choice
//! when told to discard.

use std::sync::Arc;

use iepos_common::{
    AgentPlans, ConfigError, IeposDown, IeposError, IeposUp, NodeId, Plan, ProtocolError, Result,
    MIN_HOPS_DIVISOR,
};
use tracing::{debug, instrument, trace};

use super::template::{IterativeAgent, NodeContext, WorkDelta};
use super::NodeSnapshot;
use crate::combinatorial::{ChildMenu, CombinatorialSpace, RampUp};
use crate::fitness::{IterativeFitnessFunction, SelectionContext};
use crate::history::HistoryStore;
use crate::local_search::{sum_aggregates, LocalSearch};
use crate::telemetry::{GlobalMeasurement, LocalMeasurement, MeasurementSink};
use crate::AgentConfig;

/// Per-node state of the I-EPOS protocol
pub struct IeposAgent {
    id: NodeId,
    /// Defines the number of states of every plan
    cost_signal: Plan,

    fitness_prototype: Box<dyn IterativeFitnessFunction>,
    fitness: Box<dyn IterativeFitnessFunction>,
    /// Root-only instance, cloned at every phase start
    fitness_root: Option<Box<dyn IterativeFitnessFunction>>,
    local_search: Option<Box<dyn LocalSearch>>,
    ramp_up: Option<RampUp>,

    history: HistoryStore,
    historic: Option<AgentPlans>,

    /// Own menu for the running phase
    possible_plans: Vec<Plan>,
    current: AgentPlans,
    previous: AgentPlans,
    prev_aggregate: AgentPlans,
    /// Per-child menu indices chosen during Ascend, canonical order
    selected_combination: Vec<usize>,
    selected_index: Option<usize>,

    num_nodes: Option<usize>,
    num_nodes_subtree: usize,
    layer: usize,
    avg_num_children: f64,

    work: WorkDelta,
    sink: Arc<dyn MeasurementSink>,
}

impl IeposAgent {
    pub fn new(
        id: NodeId,
        config: &AgentConfig,
        cost_signal: Plan,
        fitness: Box<dyn IterativeFitnessFunction>,
        sink: Arc<dyn MeasurementSink>,
    ) -> Result<Self> {
        config.validate()?;
        let num_states = cost_signal.num_states();
        Ok(Self {
            id,
            cost_signal,
            fitness: fitness.clone(),
            fitness_prototype: fitness,
            fitness_root: None,
            local_search: None,
            ramp_up: config.ramp_up()?,
            history: HistoryStore::new(config.history_size)?,
            historic: None,
            possible_plans: Vec::new(),
            current: AgentPlans::zeroed(num_states),
            previous: AgentPlans::default(),
            prev_aggregate: AgentPlans::default(),
            selected_combination: Vec::new(),
            selected_index: None,
            num_nodes: None,
            num_nodes_subtree: 1,
            layer: 0,
            avg_num_children: 0.0,
            work: WorkDelta::default(),
            sink,
        })
    }

    /// Attach a local search; kept across phases
    pub fn with_local_search(mut self, local_search: Box<dyn LocalSearch>) -> Self {
        self.local_search = Some(local_search);
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn num_states(&self) -> usize {
        self.cost_signal.num_states()
    }

    pub fn possible_plans(&self) -> &[Plan] {
        &self.possible_plans
    }

    pub fn current(&self) -> &AgentPlans {
        &self.current
    }

    pub fn previous(&self) -> &AgentPlans {
        &self.previous
    }

    /// Archived plans of the phase named as previous at phase start
    pub fn historic(&self) -> Option<&AgentPlans> {
        self.historic.as_ref()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn selected_combination(&self) -> &[usize] {
        &self.selected_combination
    }

    /// Total tree size, known after the first Descend of a phase
    pub fn num_nodes(&self) -> Option<usize> {
        self.num_nodes
    }

    pub fn layer(&self) -> usize {
        self.layer
    }

    pub fn avg_num_children(&self) -> f64 {
        self.avg_num_children
    }

    fn selection_context<'a>(
        &'a self,
        ctx: &NodeContext<'_>,
        previous: Option<&'a AgentPlans>,
    ) -> SelectionContext<'a> {
        SelectionContext {
            node: self.id,
            cost_signal: &self.cost_signal,
            previous,
            num_nodes: self.num_nodes,
            num_nodes_subtree: self.num_nodes_subtree,
            layer: self.layer,
            avg_num_children: self.avg_num_children,
            iteration: ctx.iteration,
        }
    }

    fn validate_menu(&self, plans: &[Plan]) -> Result<()> {
        if plans.is_empty() {
            return Err(ConfigError::EmptyMenu { child: self.id }.into());
        }
        for plan in plans {
            self.cost_signal.check_same_shape(plan)?;
        }
        Ok(())
    }

    /// Aggregate of the children, refined by the local search when present
    fn child_aggregate(&mut self, children: &[IeposUp], previous_global: Option<&Plan>) -> Result<Plan> {
        let aggregates: Vec<Plan> = children.iter().map(|m| m.aggregate_plan.clone()).collect();
        match self.local_search.as_mut() {
            Some(local_search) => {
                let refined = local_search.calc_aggregate(self.id, &aggregates, previous_global)?;
                self.cost_signal.check_same_shape(&refined)?;
                Ok(refined)
            }
            None => sum_aggregates(&aggregates, self.cost_signal.num_states()),
        }
    }
}

impl IterativeAgent for IeposAgent {
    type Up = IeposUp;
    type Down = IeposDown;

    fn init_phase(&mut self, ctx: &NodeContext<'_>, plans: Vec<Plan>) -> Result<()> {
        self.history.evict_over_capacity();
        self.prev_aggregate.reset();
        self.previous.reset();

        self.historic = ctx.previous_phase.and_then(|phase| self.history.get(&phase).cloned());
        self.num_nodes = None;
        self.fitness = self.fitness_prototype.clone();
        self.fitness_root = ctx.topology.is_root().then(|| self.fitness_prototype.clone());

        self.validate_menu(&plans)?;
        self.possible_plans = plans;
        self.selected_index = None;
        debug!(
            node = %self.id,
            menu_size = self.possible_plans.len(),
            historic = self.historic.is_some(),
            "Phase initialized"
        );
        Ok(())
    }

    fn init_iteration(&mut self, ctx: &NodeContext<'_>) {
        self.current = AgentPlans::zeroed(self.num_states());
        self.selected_combination.clear();
        self.num_nodes_subtree = 1;
        self.avg_num_children = ctx.topology.children.len() as f64;
        self.layer = 0;
    }

    #[instrument(skip_all, fields(node = %self.id, iteration = ctx.iteration))]
    fn up(&mut self, ctx: &NodeContext<'_>, children: Vec<IeposUp>) -> Result<IeposUp> {
        let num_states = self.num_states();

        if !children.is_empty() {
            let previous_global = self.previous.global_plan.clone();
            let child_aggregate = self.child_aggregate(&children, previous_global.as_ref())?;

            self.num_nodes_subtree += children.iter().map(|m| m.num_nodes).sum::<usize>();

            let menus: Vec<ChildMenu<'_>> = ctx
                .topology
                .children
                .iter()
                .zip(&children)
                .map(|(child, msg)| ChildMenu {
                    child: *child,
                    plans: &msg.possible_plans,
                })
                .collect();
            let mut space = CombinatorialSpace::build(num_states, &menus)?;

            if let Some(ramp_up) = self.ramp_up.filter(|_| !ctx.topology.is_root()) {
                let limit = self.possible_plans.len().min(space.len());
                let count = ramp_up.candidate_count(self.id, ctx.iteration, limit)?;
                trace!(count, total = space.len(), "Ramp-up truncated combinations");
                space.truncate(count);
            }

            let candidates = space.len();
            let selected = {
                let selection_ctx = self.selection_context(ctx, Some(&self.prev_aggregate));
                self.fitness.select(&selection_ctx, &child_aggregate, space.plans())
            }
            .ok_or(ProtocolError::InvalidSelection { index: 0, candidates })?;
            self.work.computations += candidates as u64;

            let (combination, selection) = space
                .take(selected)
                .ok_or(ProtocolError::InvalidSelection { index: selected, candidates })?;

            let mut aggregate = child_aggregate;
            aggregate.add(&combination);
            self.current.aggregate_plan = Some(aggregate);
            self.current.selected_combinational_plan = Some(combination);
            self.selected_combination = selection;
        }

        let aggregate_plan = self
            .current
            .aggregate_plan
            .clone()
            .unwrap_or_else(|| Plan::zeros(num_states));
        self.work.transmitted += self.possible_plans.len() as u64 + 1;

        Ok(IeposUp {
            aggregate_plan,
            possible_plans: self.possible_plans.clone(),
            num_nodes: self.num_nodes_subtree,
        })
    }

    #[instrument(skip_all, fields(node = %self.id, iteration = ctx.iteration))]
    fn at_root(&mut self, ctx: &NodeContext<'_>, msg: IeposUp) -> Result<IeposDown> {
        let aggregate = msg.aggregate_plan;
        let candidates = self.possible_plans.len();

        let fitness_root = self
            .fitness_root
            .as_ref()
            .ok_or_else(|| IeposError::Internal(format!("{} decides without a root fitness function", self.id)))?;
        let selected = {
            let selection_ctx = self.selection_context(ctx, Some(&self.prev_aggregate));
            fitness_root.select(&selection_ctx, &aggregate, &self.possible_plans)
        }
        .ok_or(ProtocolError::InvalidSelection { index: 0, candidates })?;
        self.work.computations += candidates as u64;

        let selected_plan = self
            .possible_plans
            .get(selected)
            .cloned()
            .ok_or(ProtocolError::InvalidSelection { index: selected, candidates })?;

        let mut global = aggregate;
        global.add(&selected_plan);
        let robustness = fitness_root.robustness(&global, &self.cost_signal, self.historic.as_ref());

        self.current.selected_plan = Some(selected_plan);
        self.current.global_plan = Some(global.clone());
        self.history.insert(ctx.phase, self.current.clone());

        self.sink.record_global(GlobalMeasurement {
            phase: ctx.phase,
            iteration: ctx.iteration,
            global_plan: global.clone(),
            num_states: self.num_states(),
            num_nodes: self.num_nodes_subtree,
            robustness,
        });

        Ok(IeposDown::new(global, self.num_nodes_subtree, 0, 0, selected))
    }

    #[instrument(skip_all, fields(node = %self.id, iteration = ctx.iteration))]
    fn down(&mut self, ctx: &NodeContext<'_>, parent: IeposDown) -> Result<Vec<IeposDown>> {
        self.cost_signal.check_same_shape(&parent.global_plan)?;
        self.current.global_plan = Some(parent.global_plan.clone());

        // discarding keeps last iteration's decision; nothing to keep in the first one
        if parent.discard && !self.previous.is_empty() {
            self.current.aggregate_plan = self.previous.aggregate_plan.clone();
            self.current.selected_plan = self.previous.selected_plan.clone();
            self.current.selected_combinational_plan = self.previous.selected_combinational_plan.clone();
            trace!("Kept previous decision");
        } else {
            let plan = self
                .possible_plans
                .get(parent.selected)
                .cloned()
                .ok_or(ProtocolError::SelectionOutOfMenu {
                    node: self.id,
                    index: parent.selected,
                    menu: self.possible_plans.len(),
                })?;
            self.current.selected_plan = Some(plan);
            self.selected_index = Some(parent.selected);
        }

        self.num_nodes = Some(parent.num_nodes);
        self.layer = parent.hops;
        self.avg_num_children = parent.sum_children as f64 / MIN_HOPS_DIVISOR.max(parent.hops as f64);

        self.fitness
            .update_previous(Some(&mut self.prev_aggregate), &self.current, &self.cost_signal, ctx.iteration);
        if let Some(fitness_root) = self.fitness_root.as_mut() {
            fitness_root.update_previous(None, &self.current, &self.cost_signal, ctx.iteration);
        }
        self.previous = self.current.clone();
        self.history.insert(ctx.phase, self.current.clone());

        if let (Some(selected_index), Some(selected_plan)) = (self.selected_index, &self.current.selected_plan) {
            self.sink.record_local(LocalMeasurement {
                node: self.id,
                phase: ctx.phase,
                iteration: ctx.iteration,
                selected_index,
                menu_size: self.possible_plans.len(),
                discomfort: selected_plan.discomfort(),
                selected_plan: selected_plan.clone(),
            });
        }

        let children = &ctx.topology.children;
        if self.selected_combination.len() != children.len() {
            let child = children
                .get(self.selected_combination.len())
                .copied()
                .unwrap_or(self.id);
            return Err(ProtocolError::MissingSelection { node: self.id, child }.into());
        }

        let keep = self.local_search.as_ref().map(|local_search| local_search.selected());
        let messages: Vec<IeposDown> = self
            .selected_combination
            .iter()
            .enumerate()
            .map(|(i, &selected)| IeposDown {
                global_plan: parent.global_plan.clone(),
                num_nodes: parent.num_nodes,
                hops: parent.hops + 1,
                sum_children: parent.sum_children + children.len(),
                selected,
                discard: parent.discard || keep.is_some_and(|keep| !keep.get(i).copied().unwrap_or(true)),
            })
            .collect();
        self.work.transmitted += messages.len() as u64;

        Ok(messages)
    }

    fn drain_work(&mut self) -> WorkDelta {
        std::mem::take(&mut self.work)
    }

    fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            global_plan: self.current.global_plan.clone(),
            selected_plan: self.current.selected_plan.clone(),
            selected_index: self.selected_index,
            ..NodeSnapshot::default()
        }
    }
}
