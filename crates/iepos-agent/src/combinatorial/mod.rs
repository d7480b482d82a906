//! Combinatorial engine
//!
//! Builds the cross product of the immediate children's menus. Combination
//! `i` is decoded in mixed radix over the menu sizes, first child least
//! significant:
//!
//! ```text
//! factor = 1
//! for child j in canonical order:
//!     index_j = (i / factor) % m_j
//!     factor *= m_j
//! ```
//!
//! Child order therefore fixes digit significance and must be identical on
//! every node that derives indices from it.

pub mod ramp_up;

use iepos_common::{ConfigError, NodeId, Plan, Result};

pub use self::ramp_up::RampUp;

/// Number of combinations over the given menu sizes
pub fn num_combinations(radices: &[usize]) -> Result<usize> {
    radices
        .iter()
        .try_fold(1usize, |acc, &m| acc.checked_mul(m))
        .ok_or_else(|| ConfigError::CombinationOverflow.into())
}

/// Per-child menu indices of combination `index`
pub fn decode_index(index: usize, radices: &[usize]) -> Vec<usize> {
    let mut factor = 1usize;
    radices
        .iter()
        .map(|&m| {
            let digit = (index / factor) % m;
            factor = factor.saturating_mul(m);
            digit
        })
        .collect()
}

/// Inverse of [`decode_index`]
pub fn encode_selection(selection: &[usize], radices: &[usize]) -> usize {
    let mut factor = 1usize;
    let mut index = 0usize;
    for (&digit, &m) in selection.iter().zip(radices) {
        index += digit * factor;
        factor *= m;
    }
    index
}

/// A child's pass-through menu as seen by its parent
#[derive(Debug, Clone, Copy)]
pub struct ChildMenu<'a> {
    pub child: NodeId,
    pub plans: &'a [Plan],
}

/// All combinations of the children's menus, in index order
#[derive(Debug, Clone, Default)]
pub struct CombinatorialSpace {
    plans: Vec<Plan>,
    selections: Vec<Vec<usize>>,
}

impl CombinatorialSpace {
    /// Enumerate every combination.
    ///
    /// Each combinational plan is the elementwise sum of the chosen child
    /// plans; its discomfort is the sum of their discomforts. Fails on an
    /// empty menu or a plan whose length differs from `num_states`.
    pub fn build(num_states: usize, menus: &[ChildMenu<'_>]) -> Result<Self> {
        let reference = Plan::zeros(num_states);
        let mut radices = Vec::with_capacity(menus.len());
        for menu in menus {
            if menu.plans.is_empty() {
                return Err(ConfigError::EmptyMenu { child: menu.child }.into());
            }
            for plan in menu.plans {
                reference.check_same_shape(plan)?;
            }
            radices.push(menu.plans.len());
        }

        let count = num_combinations(&radices)?;
        let mut plans = vec![Plan::zeros(num_states); count];
        let mut selections = vec![Vec::with_capacity(menus.len()); count];

        let mut factor = 1usize;
        for menu in menus {
            let num_plans = menu.plans.len();
            for (i, (plan, selection)) in plans.iter_mut().zip(selections.iter_mut()).enumerate() {
                let plan_idx = (i / factor) % num_plans;
                let child_plan = &menu.plans[plan_idx];
                plan.add(child_plan);
                plan.set_discomfort(plan.discomfort() + child_plan.discomfort());
                selection.push(plan_idx);
            }
            factor = factor.saturating_mul(num_plans);
        }

        Ok(Self { plans, selections })
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }

    /// Per-child menu indices of combination `index`
    pub fn selection(&self, index: usize) -> Option<&[usize]> {
        self.selections.get(index).map(Vec::as_slice)
    }

    /// Expose only the first `len` combinations
    pub fn truncate(&mut self, len: usize) {
        self.plans.truncate(len);
        self.selections.truncate(len);
    }

    /// Split into the chosen combination's plan and selection
    pub fn take(mut self, index: usize) -> Option<(Plan, Vec<usize>)> {
        if index >= self.plans.len() {
            return None;
        }
        Some((self.plans.swap_remove(index), self.selections.swap_remove(index)))
    }
}
