// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cost estimation for execution plans
//!
//! Every node kind derives its estimate from the estimate of its first
//! dependency. Estimates are memoized in a [`CostCache`] owned by the plan and
//! keyed by node id; structural edits invalidate the affected entries.

use crate::error::{PlanError, PlanResult};
use crate::plan::execution_plan::ExecutionPlan;
use crate::plan::node::{ExecutionNode, NodeId};
use crate::plan::nodes::NodeData;
use crate::variable::VariableId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Assumed number of vertices on a shortest path
const DEFAULT_PATH_LENGTH: usize = 7;

/// Cost estimate for a node and everything upstream of it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    /// Accumulated abstract cost
    pub estimated_cost: f64,
    /// Rows produced by the node
    pub estimated_nr_items: usize,
    /// Row counts of enclosing spliced subqueries
    #[serde(skip)]
    outer_estimated_nr_items: Vec<usize>,
}

impl CostEstimate {
    pub fn new(estimated_cost: f64, estimated_nr_items: usize) -> Self {
        Self {
            estimated_cost,
            estimated_nr_items,
            outer_estimated_nr_items: Vec::new(),
        }
    }

    /// Marker for "not yet computed"
    pub fn invalid() -> Self {
        Self::new(-1.0, 0)
    }

    pub fn empty() -> Self {
        Self::new(0.0, 0)
    }

    pub fn is_valid(&self) -> bool {
        self.estimated_cost >= 0.0
    }

    /// Remember the current row count before entering a subquery
    pub fn save_estimated_nr_items(&mut self) {
        self.outer_estimated_nr_items.push(self.estimated_nr_items);
    }

    /// Restore the row count saved by the matching [`Self::save_estimated_nr_items`]
    pub fn restore_estimated_nr_items(&mut self) {
        if let Some(outer) = self.outer_estimated_nr_items.pop() {
            self.estimated_nr_items = outer;
        }
    }
}

impl Default for CostEstimate {
    fn default() -> Self {
        Self::invalid()
    }
}

/// Memoized estimates of one plan
#[derive(Debug, Default)]
pub struct CostCache {
    estimates: Mutex<HashMap<NodeId, CostEstimate>>,
    estimations: AtomicUsize,
}

impl CostCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<CostEstimate> {
        self.estimates.lock().get(&id).cloned()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.estimates.lock().contains_key(&id)
    }

    fn store(&self, id: NodeId, estimate: CostEstimate) {
        self.estimations.fetch_add(1, Ordering::Relaxed);
        self.estimates.lock().insert(id, estimate);
    }

    fn remove(&self, id: NodeId) -> bool {
        self.estimates.lock().remove(&id).is_some()
    }

    pub fn clear(&self) {
        self.estimates.lock().clear();
    }

    /// Number of estimates computed since the cache was created
    pub fn estimations(&self) -> usize {
        self.estimations.load(Ordering::Relaxed)
    }
}

impl ExecutionPlan {
    /// Memoized cost of `id`, computing missing estimates bottom-up
    pub fn get_cost(&self, id: NodeId) -> PlanResult<CostEstimate> {
        if let Some(cached) = self.costs.get(id) {
            return Ok(cached);
        }
        let estimate = self.estimate_cost(self.node(id)?)?;
        log::trace!(
            "estimated {} {}: cost {:.3}, {} items",
            self.node(id)?.kind(),
            id,
            estimate.estimated_cost,
            estimate.estimated_nr_items
        );
        self.costs.store(id, estimate.clone());
        Ok(estimate)
    }

    /// Drop the cached estimate of `id`, of everything upstream of it (nested
    /// subquery plans included) and of everything downstream via parent edges
    pub fn invalidate_cost(&self, id: NodeId) -> PlanResult<()> {
        self.node(id)?;
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            self.costs.remove(current);
            if let Ok(node) = self.node(current) {
                stack.extend(node.dependencies.iter().copied());
                stack.extend(node.data.subquery_root());
            }
        }
        self.invalidate_downstream_cost(id);
        Ok(())
    }

    /// Drop cached estimates of `id` and every node that consumes its output
    pub(crate) fn invalidate_downstream_cost(&self, id: NodeId) {
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            self.costs.remove(current);
            if let Ok(node) = self.node(current) {
                stack.extend(node.parents.iter().copied());
            }
        }
    }

    /// Number of per-node estimations performed on this plan
    pub fn cost_estimations(&self) -> usize {
        self.costs.estimations()
    }

    fn dependency_cost(&self, node: &ExecutionNode) -> PlanResult<CostEstimate> {
        match node.first_dependency() {
            Some(dep) => self.get_cost(dep),
            None => Err(PlanError::MissingChild {
                node: node.id,
                child: "dependency",
            }),
        }
    }

    fn estimate_cost(&self, node: &ExecutionNode) -> PlanResult<CostEstimate> {
        let config = &self.config;

        if let NodeData::Singleton = node.data {
            return Ok(CostEstimate::new(1.0, 1));
        }
        if let NodeData::NoResults = node.data {
            return Ok(CostEstimate::new(0.5, 0));
        }

        let mut estimate = self.dependency_cost(node)?;
        let incoming = estimate.estimated_nr_items;

        match &node.data {
            NodeData::Singleton | NodeData::NoResults => {}
            NodeData::EnumerateCollection(n) => {
                let count = self.statistics.collection_count(&n.collection);
                if !n.count_only {
                    estimate.estimated_nr_items = incoming.saturating_mul(count as usize);
                }
                let penalty = if n.random {
                    config.random_iteration_penalty
                } else {
                    1.0
                };
                estimate.estimated_cost += count as f64 * penalty + 1.0;
            }
            NodeData::Index(n) => {
                let count = self.statistics.collection_count(&n.collection) as f64;
                let per_input = (count * self.statistics.selectivity(&n.index)).ceil() as usize;
                estimate.estimated_nr_items = incoming.saturating_mul(per_input);
                estimate.estimated_cost += estimate.estimated_nr_items as f64;
            }
            NodeData::EnumerateView(n) => {
                let count = self.statistics.collection_count(&n.view) as usize;
                estimate.estimated_nr_items = incoming.saturating_mul(count);
                estimate.estimated_cost += estimate.estimated_nr_items as f64;
            }
            NodeData::Join(n) => {
                for source in &n.sources {
                    let count = self.statistics.collection_count(&source.collection);
                    estimate.estimated_nr_items =
                        estimate.estimated_nr_items.saturating_mul(count as usize);
                    estimate.estimated_cost += count as f64 + 1.0;
                }
            }
            NodeData::EnumerateList(n) => {
                let length = self.list_length(node.id, n.in_variable)?;
                estimate.estimated_nr_items = incoming.saturating_mul(length);
                estimate.estimated_cost += estimate.estimated_nr_items as f64;
            }
            NodeData::Limit(n) => {
                let remaining = if incoming >= n.offset {
                    estimate.estimated_cost += n.offset as f64 * config.skip_cost_per_row;
                    incoming - n.offset
                } else {
                    estimate.estimated_cost += incoming as f64 * config.skip_cost_per_row;
                    0
                };
                estimate.estimated_nr_items = n.limit.min(remaining);
                estimate.estimated_cost += estimate.estimated_nr_items as f64;
            }
            NodeData::Sort(_) => {
                let rows = incoming as f64;
                estimate.estimated_cost += if incoming > 3 { rows * rows.log2() } else { rows };
            }
            NodeData::Collect(n) => {
                if n.is_pure_count() {
                    estimate.estimated_nr_items = 1;
                } else if incoming >= config.collect_reduction_threshold {
                    estimate.estimated_nr_items =
                        (incoming as f64 * config.collect_reduction_factor) as usize;
                }
                estimate.estimated_cost += estimate.estimated_nr_items as f64;
            }
            NodeData::Subquery(n) => {
                estimate.save_estimated_nr_items();
                let sub = self.get_cost(n.subquery)?;
                estimate.restore_estimated_nr_items();
                if incoming > 0 {
                    estimate.estimated_cost += saturate(incoming as f64 * sub.estimated_cost);
                }
            }
            NodeData::SubqueryStart => {
                estimate.save_estimated_nr_items();
                estimate.estimated_cost += incoming as f64;
            }
            NodeData::SubqueryEnd(_) => {
                estimate.restore_estimated_nr_items();
                estimate.estimated_cost += incoming as f64;
            }
            NodeData::Traversal(n) => {
                if incoming > 0 {
                    let fan_out = config.default_fan_out;
                    let min = n.options.min_depth;
                    let max = n.options.max_depth;
                    let items = geometric_sum(fan_out, min, max);
                    let work = geometric_sum(fan_out, 1, max.max(1));
                    estimate.estimated_nr_items = saturate(incoming as f64 * items) as usize;
                    estimate.estimated_cost += saturate(incoming as f64 * work);
                } else {
                    estimate.estimated_nr_items = 0;
                }
            }
            NodeData::ShortestPath(_) => {
                estimate.estimated_nr_items = incoming.saturating_mul(DEFAULT_PATH_LENGTH);
                estimate.estimated_cost += estimate.estimated_nr_items as f64;
            }
            NodeData::KShortestPaths(_) => {
                let paths = config.default_fan_out as usize;
                estimate.estimated_nr_items = incoming.saturating_mul(paths);
                estimate.estimated_cost +=
                    estimate.estimated_nr_items as f64 * DEFAULT_PATH_LENGTH as f64;
            }
            NodeData::Async | NodeData::Mutex => {}
            NodeData::Filter(_)
            | NodeData::Calculation(_)
            | NodeData::Return(_)
            | NodeData::Materialize(_)
            | NodeData::Window(_)
            | NodeData::Insert(_)
            | NodeData::Remove(_)
            | NodeData::Replace(_)
            | NodeData::Update(_)
            | NodeData::Upsert(_)
            | NodeData::Scatter(_)
            | NodeData::Gather(_)
            | NodeData::Remote(_)
            | NodeData::Distribute(_)
            | NodeData::DistributeConsumer(_)
            | NodeData::SingleRemoteOperation(_) => {
                estimate.estimated_cost += incoming as f64;
            }
        }

        estimate.estimated_cost = saturate(estimate.estimated_cost);
        Ok(estimate)
    }

    /// Length of the list enumerated at `node`, judged from the upstream node
    /// setting `variable`
    fn list_length(&self, node: NodeId, variable: VariableId) -> PlanResult<usize> {
        let chain = self.get_dependency_chain(node, false)?;
        let setter = chain
            .iter()
            .filter_map(|id| self.node(*id).ok())
            .find(|n| n.variables_set_here().contains(&variable));

        let length = match setter.map(|n| &n.data) {
            Some(NodeData::Calculation(calc)) => calc.expression.static_length(),
            Some(NodeData::Subquery(sq)) => Some(self.get_cost(sq.subquery)?.estimated_nr_items),
            _ => None,
        };
        Ok(length.unwrap_or(self.config.default_list_length))
    }
}

/// Clamp a cost into the finite range; overflowed or undefined costs count
/// as maximal
fn saturate(cost: f64) -> f64 {
    if cost.is_nan() {
        f64::MAX
    } else {
        cost.min(f64::MAX)
    }
}

fn capped_powi(base: f64, exponent: u64) -> f64 {
    base.powi(exponent.min(i32::MAX as u64) as i32)
}

/// `base^from + ... + base^to` in closed form, saturated to `f64::MAX`
fn geometric_sum(base: f64, from: u64, to: u64) -> f64 {
    if from > to {
        return 0.0;
    }
    let terms = (to - from).saturating_add(1);
    if (base - 1.0).abs() < f64::EPSILON {
        return saturate(terms as f64);
    }
    saturate(capped_powi(base, from) * (capped_powi(base, terms) - 1.0) / (base - 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_validity() {
        assert!(!CostEstimate::invalid().is_valid());
        assert!(CostEstimate::empty().is_valid());
        assert_eq!(CostEstimate::default(), CostEstimate::invalid());
    }

    #[test]
    fn test_save_and_restore_nr_items() {
        let mut estimate = CostEstimate::new(3.0, 10);
        estimate.save_estimated_nr_items();
        estimate.estimated_nr_items = 500;
        estimate.save_estimated_nr_items();
        estimate.estimated_nr_items = 7;
        estimate.restore_estimated_nr_items();
        assert_eq!(estimate.estimated_nr_items, 500);
        estimate.restore_estimated_nr_items();
        assert_eq!(estimate.estimated_nr_items, 10);
        // unbalanced restore keeps the current value
        estimate.restore_estimated_nr_items();
        assert_eq!(estimate.estimated_nr_items, 10);
    }

    #[test]
    fn test_geometric_sum() {
        assert_eq!(geometric_sum(10.0, 1, 3), 1110.0);
        assert_eq!(geometric_sum(10.0, 0, 0), 1.0);
        assert_eq!(geometric_sum(1.0, 2, 5), 4.0);
        assert_eq!(geometric_sum(10.0, 4, 2), 0.0);
        assert_eq!(geometric_sum(10.0, 1, 400), f64::MAX);
        assert_eq!(geometric_sum(10.0, 0, u64::MAX), f64::MAX);
        assert_eq!(saturate(f64::NAN), f64::MAX);
        assert_eq!(saturate(f64::INFINITY), f64::MAX);
    }

    #[test]
    fn test_cache_counts_estimations() {
        let cache = CostCache::new();
        cache.store(NodeId(1), CostEstimate::new(1.0, 1));
        cache.store(NodeId(2), CostEstimate::new(2.0, 1));
        assert_eq!(cache.estimations(), 2);
        assert!(cache.contains(NodeId(1)));
        assert!(cache.remove(NodeId(1)));
        assert!(!cache.remove(NodeId(1)));
        cache.clear();
        assert!(!cache.contains(NodeId(2)));
        assert_eq!(cache.estimations(), 2);
    }
}
