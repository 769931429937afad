// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! The execution plan arena
//!
//! [`ExecutionPlan`] owns every node of a query plan, including the nodes of
//! classic subquery plans, which are only reachable through their Subquery
//! node. All edge edits go through the plan so that dependency and parent
//! lists stay symmetric.

use crate::config::{PlannerConfig, Statistics};
use crate::error::{PlanError, PlanResult};
use crate::plan::cost::CostCache;
use crate::plan::node::{ExecutionNode, NodeId, NodeType};
use crate::plan::nodes::NodeData;
use crate::plan::register_plan::RegisterPlan;
use crate::plan::walker::{walk, DeterministicFinder, NodeFinder};
use crate::variable::{VariableId, VariableRegistry};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug)]
pub struct ExecutionPlan {
    pub(crate) nodes: BTreeMap<NodeId, ExecutionNode>,
    pub(crate) root: Option<NodeId>,
    pub(crate) next_id: usize,
    pub(crate) variables: VariableRegistry,
    pub(crate) statistics: Arc<Statistics>,
    pub(crate) config: PlannerConfig,
    pub(crate) costs: CostCache,
    pub(crate) var_usage_computed: bool,
    pub(crate) var_set_by: HashMap<VariableId, NodeId>,
    pub(crate) register_plan: Option<RegisterPlan>,
    pub(crate) subquery_register_plans: BTreeMap<NodeId, RegisterPlan>,
    pub(crate) applied_rules: Vec<String>,
}

impl Default for ExecutionPlan {
    fn default() -> Self {
        Self::new(Arc::new(Statistics::new()), PlannerConfig::default())
    }
}

impl ExecutionPlan {
    pub fn new(statistics: Arc<Statistics>, config: PlannerConfig) -> Self {
        Self {
            nodes: BTreeMap::new(),
            root: None,
            next_id: 1,
            variables: VariableRegistry::new(),
            statistics,
            config,
            costs: CostCache::new(),
            var_usage_computed: false,
            var_set_by: HashMap::new(),
            register_plan: None,
            subquery_register_plans: BTreeMap::new(),
            applied_rules: Vec::new(),
        }
    }

    /// Empty plan sharing statistics, configuration and id space with `self`
    fn empty_like(&self) -> Self {
        let mut plan = Self::new(Arc::clone(&self.statistics), self.config.clone());
        plan.next_id = self.next_id;
        plan
    }

    // ---------------------------------------------------------------------
    // Arena access
    // ---------------------------------------------------------------------

    /// Allocate a fresh node id
    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Create an unconnected node
    pub fn create_node(&mut self, data: NodeData) -> NodeId {
        let id = self.next_id();
        self.nodes.insert(id, ExecutionNode::new(id, data));
        id
    }

    /// Take ownership of an externally built node
    pub fn register_node(&mut self, node: ExecutionNode) -> PlanResult<NodeId> {
        let id = node.id;
        if self.nodes.contains_key(&id) {
            return Err(PlanError::DuplicateNode(id));
        }
        for linked in node.dependencies.iter().chain(node.parents.iter()) {
            if !self.nodes.contains_key(linked) {
                return Err(PlanError::UnknownNode(*linked));
            }
        }
        self.next_id = self.next_id.max(id.0 + 1);
        self.nodes.insert(id, node);
        Ok(id)
    }

    pub fn root(&self) -> PlanResult<NodeId> {
        self.root.ok_or(PlanError::NoRoot)
    }

    pub fn set_root(&mut self, id: NodeId) -> PlanResult<()> {
        self.node(id)?;
        self.root = Some(id);
        Ok(())
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self.root == Some(id)
    }

    pub fn node(&self, id: NodeId) -> PlanResult<&ExecutionNode> {
        self.nodes.get(&id).ok_or(PlanError::UnknownNode(id))
    }

    /// Mutable node access. Payload edits that change cost must be followed
    /// by [`Self::invalidate_cost`].
    pub fn node_mut(&mut self, id: NodeId) -> PlanResult<&mut ExecutionNode> {
        self.nodes.get_mut(&id).ok_or(PlanError::UnknownNode(id))
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// All nodes owned by the plan, reachable or not, in id order
    pub fn nodes(&self) -> impl Iterator<Item = &ExecutionNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn variables(&self) -> &VariableRegistry {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableRegistry {
        &mut self.variables
    }

    pub fn statistics(&self) -> &Arc<Statistics> {
        &self.statistics
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: PlannerConfig) {
        self.config = config;
        self.costs.clear();
    }

    /// Names of the optimizer rules that changed this plan, in order
    pub fn applied_rules(&self) -> &[String] {
        &self.applied_rules
    }

    pub fn add_applied_rule(&mut self, rule: impl Into<String>) {
        self.applied_rules.push(rule.into());
    }

    // ---------------------------------------------------------------------
    // Edge edits
    // ---------------------------------------------------------------------

    /// Append `dep` to the dependencies of `node`
    pub fn add_dependency(&mut self, node: NodeId, dep: NodeId) -> PlanResult<()> {
        self.node(dep)?;
        self.node_mut(node)?.dependencies.push(dep);
        self.node_mut(dep)?.parents.push(node);
        self.invalidate_downstream_cost(node);
        Ok(())
    }

    /// Remove `dep` from the dependencies of `node`; false if it was not one
    pub fn remove_dependency(&mut self, node: NodeId, dep: NodeId) -> PlanResult<bool> {
        self.node(dep)?;
        let deps = &mut self.node_mut(node)?.dependencies;
        let Some(position) = deps.iter().position(|d| *d == dep) else {
            return Ok(false);
        };
        deps.remove(position);
        remove_first(&mut self.node_mut(dep)?.parents, node);
        self.invalidate_downstream_cost(node);
        Ok(true)
    }

    pub fn remove_dependencies(&mut self, node: NodeId) -> PlanResult<()> {
        let deps = std::mem::take(&mut self.node_mut(node)?.dependencies);
        for dep in deps {
            remove_first(&mut self.node_mut(dep)?.parents, node);
        }
        self.invalidate_downstream_cost(node);
        Ok(())
    }

    /// Replace `old` by `new` in the dependencies of `node`, keeping its
    /// position; false if `old` was not a dependency
    pub fn replace_dependency(&mut self, node: NodeId, old: NodeId, new: NodeId) -> PlanResult<bool> {
        self.node(old)?;
        self.node(new)?;
        let deps = &mut self.node_mut(node)?.dependencies;
        let Some(position) = deps.iter().position(|d| *d == old) else {
            return Ok(false);
        };
        deps[position] = new;
        self.node_mut(new)?.parents.push(node);
        remove_first(&mut self.node_mut(old)?.parents, node);
        self.invalidate_downstream_cost(node);
        Ok(true)
    }

    /// Make `new` the first dependency of `node`, detaching the previous one
    pub fn swap_first_dependency(&mut self, node: NodeId, new: NodeId) -> PlanResult<()> {
        match self.node(node)?.first_dependency() {
            Some(old) => {
                self.replace_dependency(node, old, new)?;
            }
            None => self.add_dependency(node, new)?,
        }
        Ok(())
    }

    /// Place `new` between `old` and the first dependency of `old`
    pub fn insert_dependency(&mut self, old: NodeId, new: NodeId) -> PlanResult<()> {
        let first = self
            .node(old)?
            .first_dependency()
            .ok_or(PlanError::MissingChild {
                node: old,
                child: "dependency",
            })?;
        self.replace_dependency(old, first, new)?;
        self.add_dependency(new, first)
    }

    /// Place `new` directly downstream of `previous`, taking over its parents
    pub fn insert_after(&mut self, previous: NodeId, new: NodeId) -> PlanResult<()> {
        self.node(new)?;
        let parents = self.node(previous)?.parents.clone();
        for parent in parents {
            self.replace_dependency(parent, previous, new)?;
        }
        self.add_dependency(new, previous)?;
        if self.is_root(previous) {
            self.root = Some(new);
        }
        Ok(())
    }

    /// Detach `id` from the graph and connect its parents to its dependencies.
    /// The node stays in the arena but is no longer reachable.
    pub fn unlink_node(&mut self, id: NodeId) -> PlanResult<()> {
        let deps = self.node(id)?.dependencies.clone();
        if self.is_root(id) {
            let first = deps.first().copied().ok_or_else(|| {
                PlanError::InvalidStructure(format!("cannot unlink root {} without dependency", id))
            })?;
            self.root = Some(first);
        }
        let parents = self.node(id)?.parents.clone();
        for parent in parents {
            match deps.split_first() {
                Some((first, rest)) => {
                    self.replace_dependency(parent, id, *first)?;
                    for dep in rest {
                        self.add_dependency(parent, *dep)?;
                    }
                }
                None => {
                    self.remove_dependency(parent, id)?;
                }
            }
        }
        self.remove_dependencies(id)?;
        log::trace!("unlinked {} {}", self.node(id)?.kind(), id);
        Ok(())
    }

    /// Put `new` in place of `old`: `new` takes over dependencies, parents and
    /// the root position
    pub fn replace_node(&mut self, old: NodeId, new: NodeId) -> PlanResult<()> {
        if self.node(new)?.has_dependency() {
            return Err(PlanError::InvalidStructure(format!(
                "replacement node {} already has dependencies",
                new
            )));
        }
        let deps = self.node(old)?.dependencies.clone();
        for dep in &deps {
            self.add_dependency(new, *dep)?;
        }
        let parents = self.node(old)?.parents.clone();
        for parent in parents {
            self.replace_dependency(parent, old, new)?;
        }
        self.remove_dependencies(old)?;
        if self.is_root(old) {
            self.root = Some(new);
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Upstream queries
    // ---------------------------------------------------------------------

    /// Ids from `start` upstream along first dependencies
    pub fn get_dependency_chain(&self, start: NodeId, include_self: bool) -> PlanResult<Vec<NodeId>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(start);
        while let Some(id) = current {
            if !seen.insert(id) {
                return Err(PlanError::InvalidStructure(format!(
                    "dependency cycle through {}",
                    id
                )));
            }
            let node = self.node(id)?;
            if id != start || include_self {
                chain.push(id);
            }
            current = node.first_dependency();
        }
        Ok(chain)
    }

    /// The Singleton at the top of the first-dependency chain, if any
    pub fn get_singleton(&self, start: NodeId) -> PlanResult<Option<NodeId>> {
        let chain = self.get_dependency_chain(start, true)?;
        match chain.last() {
            Some(last) if self.node(*last)?.kind() == NodeType::Singleton => Ok(Some(*last)),
            _ => Ok(None),
        }
    }

    /// Nearest loop node upstream of `id`
    pub fn get_loop(&self, id: NodeId) -> PlanResult<Option<NodeId>> {
        for dep in self.get_dependency_chain(id, false)? {
            if self.node(dep)?.kind().is_loop() {
                return Ok(Some(dep));
            }
        }
        Ok(None)
    }

    /// Whether `id` belongs to a classic subquery plan, i.e. its topmost
    /// consumer is not the plan root
    pub fn is_in_subquery(&self, id: NodeId) -> PlanResult<bool> {
        let mut seen = HashSet::new();
        let mut current = id;
        while let Some(parent) = self.node(current)?.first_parent() {
            if !seen.insert(parent) {
                return Err(PlanError::InvalidStructure(format!(
                    "parent cycle through {}",
                    parent
                )));
            }
            current = parent;
        }
        Ok(!self.is_root(current))
    }

    /// Node that sets `variable`, as recorded by the last liveness pass
    pub fn get_var_set_by(&self, variable: VariableId) -> Option<NodeId> {
        self.var_set_by.get(&variable).copied()
    }

    /// Nodes of the given kinds reachable from the root, optionally
    /// descending into classic subqueries
    pub fn find_nodes_of_type(&self, kinds: &[NodeType], enter_subqueries: bool) -> PlanResult<Vec<NodeId>> {
        self.find_nodes_of_type_from(self.root()?, kinds, enter_subqueries)
    }

    pub(crate) fn find_nodes_of_type_from(
        &self,
        start: NodeId,
        kinds: &[NodeType],
        enter_subqueries: bool,
    ) -> PlanResult<Vec<NodeId>> {
        let mut finder = NodeFinder::new(kinds, enter_subqueries);
        walk(self, start, &mut finder)?;
        Ok(finder.into_found())
    }

    // ---------------------------------------------------------------------
    // Node properties that depend on the plan
    // ---------------------------------------------------------------------

    /// Deterministic unless the node, or any node of its classic subquery,
    /// produces different results on re-execution
    pub fn is_deterministic(&self, id: NodeId) -> PlanResult<bool> {
        let node = self.node(id)?;
        if !node.data.is_locally_deterministic() {
            return Ok(false);
        }
        match node.data.subquery_root() {
            Some(sub) => {
                let mut finder = DeterministicFinder::new();
                walk(self, sub, &mut finder)?;
                Ok(finder.is_deterministic())
            }
            None => Ok(true),
        }
    }

    /// Whether the classic subquery of `id` writes data
    pub fn is_modification_subquery(&self, id: NodeId) -> PlanResult<bool> {
        let sub = self.node(id)?.as_subquery()?.subquery;
        let kinds: Vec<NodeType> = NodeType::all()
            .iter()
            .copied()
            .filter(NodeType::is_modification)
            .collect();
        Ok(!self.find_nodes_of_type_from(sub, &kinds, true)?.is_empty())
    }

    /// Whether the classic subquery of `id` yields the same result for
    /// every outer row
    pub fn is_const_subquery(&self, id: NodeId) -> PlanResult<bool> {
        if self.is_modification_subquery(id)? || !self.is_deterministic(id)? {
            return Ok(false);
        }
        Ok(self.variables_used_here(id)?.is_empty())
    }

    // ---------------------------------------------------------------------
    // Cloning
    // ---------------------------------------------------------------------

    /// Clone node `id` into another plan, keeping node ids. With
    /// `with_dependencies` the whole upstream graph is cloned; shared
    /// upstream nodes are cloned once. With `with_properties` the target
    /// receives its own copies of all variables the cloned nodes reference.
    pub fn clone_node(
        &self,
        id: NodeId,
        target: &mut ExecutionPlan,
        with_dependencies: bool,
        with_properties: bool,
    ) -> PlanResult<NodeId> {
        let copies = self.collect_clone_set(id, with_dependencies)?;
        for copy in &copies {
            if target.nodes.contains_key(&copy.id) {
                return Err(PlanError::DuplicateNode(copy.id));
            }
            for var in copy.data.payload_variables() {
                let variable = self.variables.get(var)?;
                if with_properties {
                    if !target.variables.contains(var) {
                        target.variables.create_variable_from(variable);
                    }
                } else {
                    target.variables.share(variable);
                }
            }
        }
        let mapping: HashMap<NodeId, NodeId> = copies.iter().map(|n| (n.id, n.id)).collect();
        target.next_id = target.next_id.max(self.next_id);
        target.insert_clones(copies, &mapping, id)
    }

    /// Clone node `id` into this plan under fresh ids. Cloning with
    /// properties is only possible into a different plan.
    pub fn clone_node_in_place(
        &mut self,
        id: NodeId,
        with_dependencies: bool,
        with_properties: bool,
    ) -> PlanResult<NodeId> {
        if with_properties {
            return Err(PlanError::CloneIntoSamePlan(id));
        }
        let copies = self.collect_clone_set(id, with_dependencies)?;
        let mut mapping = HashMap::new();
        for copy in &copies {
            let fresh = self.next_id();
            mapping.insert(copy.id, fresh);
        }
        self.insert_clones(copies, &mapping, id)
    }

    /// Fully independent copy of the plan. Unreachable nodes are dropped.
    pub fn deep_clone(&self, with_properties: bool) -> PlanResult<ExecutionPlan> {
        let mut plan = self.empty_like();
        if with_properties {
            for variable in self.variables.iter() {
                plan.variables.create_variable_from(variable);
            }
        } else {
            plan.variables = self.variables.clone();
        }
        if let Some(root) = self.root {
            self.clone_node(root, &mut plan, true, with_properties)?;
            plan.root = Some(root);
        }
        plan.var_usage_computed = self.var_usage_computed;
        plan.var_set_by = self.var_set_by.clone();
        plan.register_plan = self.register_plan.clone();
        plan.subquery_register_plans = self.subquery_register_plans.clone();
        plan.applied_rules = self.applied_rules.clone();
        log::debug!(
            "cloned plan with {} nodes (with properties: {})",
            plan.len(),
            with_properties
        );
        Ok(plan)
    }

    /// Copies of `id` and, depending on `with_dependencies`, its upstream
    /// graph. Nested subquery plans are always included.
    fn collect_clone_set(&self, id: NodeId, with_dependencies: bool) -> PlanResult<Vec<ExecutionNode>> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        let mut stack = vec![(id, with_dependencies)];
        while let Some((current, follow_deps)) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            let node = self.node(current)?;
            ordered.push(node.clone());
            if follow_deps {
                stack.extend(node.dependencies.iter().map(|d| (*d, true)));
            }
            if let Some(sub) = node.data.subquery_root() {
                if !self.nodes.contains_key(&sub) {
                    return Err(PlanError::MissingChild {
                        node: current,
                        child: "subquery",
                    });
                }
                stack.push((sub, true));
            }
        }
        Ok(ordered)
    }

    /// Insert node copies, renaming ids through `mapping` and rebuilding
    /// parent lists from the copied dependency edges. Edges leading out of
    /// the copied set are dropped.
    fn insert_clones(
        &mut self,
        copies: Vec<ExecutionNode>,
        mapping: &HashMap<NodeId, NodeId>,
        top: NodeId,
    ) -> PlanResult<NodeId> {
        let mut edges = Vec::new();
        for mut copy in copies {
            let new_id = mapping
                .get(&copy.id)
                .copied()
                .ok_or(PlanError::UnknownNode(copy.id))?;
            let deps = std::mem::take(&mut copy.dependencies);
            copy.parents.clear();
            copy.id = new_id;
            copy.dependencies = deps.iter().filter_map(|d| mapping.get(d).copied()).collect();
            if let NodeData::Subquery(sq) = &mut copy.data {
                if let Some(sub) = mapping.get(&sq.subquery) {
                    sq.subquery = *sub;
                }
            }
            edges.extend(copy.dependencies.iter().map(|d| (new_id, *d)));
            self.nodes.insert(new_id, copy);
        }
        for (node, dep) in edges {
            self.node_mut(dep)?.parents.push(node);
        }
        mapping
            .get(&top)
            .copied()
            .ok_or(PlanError::UnknownNode(top))
    }
}

fn remove_first(list: &mut Vec<NodeId>, id: NodeId) {
    if let Some(position) = list.iter().position(|x| *x == id) {
        list.remove(position);
    }
}
