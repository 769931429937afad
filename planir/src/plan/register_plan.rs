// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Register planning
//!
//! Assigns every variable a register slot at the nesting depth where it is
//! first set, and computes for each node which registers can be cleared and
//! which must be kept across row-duplicating nodes. Requires the liveness
//! pass to have run.

use crate::error::{PlanError, PlanResult};
use crate::plan::execution_plan::ExecutionPlan;
use crate::plan::node::{ExecutionNode, NodeId, NodeRegisters, NodeType};
use crate::plan::walker::{walk, VisitedSet, WalkerWorker};
use crate::variable::{VarSet, VariableId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

pub type RegisterId = u32;
pub type RegIdSet = BTreeSet<RegisterId>;
pub type RegIdSetStack = Vec<RegIdSet>;

/// Register assigned to a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarInfo {
    pub depth: usize,
    pub register: RegisterId,
}

/// Register layout of one (sub)plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPlan {
    pub var_info: HashMap<VariableId, VarInfo>,
    /// Registers introduced at each depth
    pub nr_regs_here: Vec<RegisterId>,
    /// Total registers available at each depth
    pub nr_regs: Vec<RegisterId>,
    pub depth: usize,
}

impl Default for RegisterPlan {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterPlan {
    pub fn new() -> Self {
        Self {
            var_info: HashMap::new(),
            nr_regs_here: vec![0],
            nr_regs: vec![0],
            depth: 0,
        }
    }

    /// Layout for a classic subquery started from this layout
    pub fn for_subquery(&self) -> Self {
        let mut plan = self.clone();
        plan.increase_depth();
        plan
    }

    pub fn increase_depth(&mut self) {
        let total = self.nr_regs.last().copied().unwrap_or(0);
        self.depth += 1;
        self.nr_regs_here.push(0);
        self.nr_regs.push(total);
    }

    /// Assign the next free register at the current depth
    pub fn register_variable(&mut self, variable: VariableId) -> RegisterId {
        let register = self.nr_regs[self.depth];
        self.nr_regs_here[self.depth] += 1;
        self.nr_regs[self.depth] += 1;
        self.var_info.insert(
            variable,
            VarInfo {
                depth: self.depth,
                register,
            },
        );
        register
    }

    pub fn register_of(&self, variable: VariableId) -> Option<RegisterId> {
        self.var_info.get(&variable).map(|info| info.register)
    }

    /// Registers in use at `depth`
    pub fn nr_registers(&self, depth: usize) -> RegisterId {
        self.nr_regs.get(depth).copied().unwrap_or(0)
    }

    /// Drop everything at or above register `threshold`
    pub fn shrink(&mut self, threshold: RegisterId) {
        self.var_info.retain(|_, info| info.register < threshold);
        for total in &mut self.nr_regs {
            *total = (*total).min(threshold);
        }
        let mut previous = 0;
        for (here, total) in self.nr_regs_here.iter_mut().zip(&self.nr_regs) {
            *here = total.saturating_sub(previous);
            previous = *total;
        }
    }
}

struct RegisterPlanWalker {
    visited: VisitedSet,
    plan: RegisterPlan,
    registers: HashMap<NodeId, NodeRegisters>,
    /// Classic subqueries met on the way with the layout at that point
    subqueries: Vec<(NodeId, NodeId, RegisterPlan)>,
    error: Option<PlanError>,
}

impl RegisterPlanWalker {
    fn new(plan: RegisterPlan) -> Self {
        Self {
            visited: VisitedSet::unique(),
            plan,
            registers: HashMap::new(),
            subqueries: Vec::new(),
            error: None,
        }
    }

    fn register(&self, variable: VariableId, node: &ExecutionNode) -> PlanResult<RegisterId> {
        self.plan
            .register_of(variable)
            .ok_or(PlanError::MissingRegister {
                variable,
                node: node.id(),
                kind: node.kind(),
            })
    }

    fn plan_node(&mut self, plan: &ExecutionPlan, node: &ExecutionNode) -> PlanResult<()> {
        if node.kind().increases_depth() {
            self.plan.increase_depth();
        }
        let set_here = node.variables_set_here();
        for var in &set_here {
            self.plan.register_variable(*var);
        }

        let usage = node.var_usage()?;
        let used_later_here = usage.used_later.last().cloned().unwrap_or_default();

        let mut regs_to_clear = RegIdSet::new();
        if node.kind() != NodeType::Return {
            let mut candidates = plan.variables_used_here(node.id())?;
            candidates.extend(set_here.iter().copied());
            for var in candidates {
                if !used_later_here.contains(&var) {
                    regs_to_clear.insert(self.register(var, node)?);
                }
            }
        }

        let set_here: VarSet = set_here.into_iter().collect();
        let mut regs_to_keep = Vec::with_capacity(usage.used_later.len());
        for (used_later, valid) in usage.used_later.iter().zip(&usage.valid) {
            let mut keep = RegIdSet::new();
            for var in used_later.intersection(valid) {
                if !set_here.contains(var) {
                    keep.insert(self.register(*var, node)?);
                }
            }
            regs_to_keep.push(keep);
        }

        self.registers.insert(
            node.id(),
            NodeRegisters {
                depth: self.plan.depth,
                regs_to_clear,
                regs_to_keep,
            },
        );

        if let Some(sub) = node.data().subquery_root() {
            self.subqueries.push((node.id(), sub, self.plan.clone()));
        }
        Ok(())
    }
}

impl WalkerWorker for RegisterPlanWalker {
    fn visited(&mut self) -> &mut VisitedSet {
        &mut self.visited
    }

    fn after(&mut self, plan: &ExecutionPlan, node: &ExecutionNode) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.plan_node(plan, node) {
            self.error = Some(e);
        }
    }
}

impl ExecutionPlan {
    /// Assign registers to all reachable nodes, classic subqueries included
    pub fn plan_registers(&mut self) -> PlanResult<()> {
        let root = self.root()?;
        if !self.var_usage_computed {
            return Err(PlanError::VarUsageNotComputed(root));
        }

        let mut registers = HashMap::new();
        let mut subquery_plans = std::collections::BTreeMap::new();

        let mut walker = RegisterPlanWalker::new(RegisterPlan::new());
        walk(self, root, &mut walker)?;
        if let Some(e) = walker.error {
            return Err(e);
        }
        registers.extend(walker.registers);
        let main_plan = walker.plan;
        let mut pending = walker.subqueries;

        while let Some((subquery_node, sub_root, snapshot)) = pending.pop() {
            let mut walker = RegisterPlanWalker::new(snapshot.for_subquery());
            walk(self, sub_root, &mut walker)?;
            if let Some(e) = walker.error {
                return Err(e);
            }
            registers.extend(walker.registers);
            pending.extend(walker.subqueries);
            subquery_plans.insert(subquery_node, walker.plan);
        }

        for (id, node_registers) in registers {
            self.node_mut(id)?.registers = Some(node_registers);
        }
        log::debug!(
            "planned {} registers at depth {} ({} subquery plans)",
            main_plan.nr_registers(main_plan.depth),
            main_plan.depth,
            subquery_plans.len()
        );
        self.register_plan = Some(main_plan);
        self.subquery_register_plans = subquery_plans;
        Ok(())
    }

    /// Register layout of the main query
    pub fn register_plan(&self) -> Option<&RegisterPlan> {
        self.register_plan.as_ref()
    }

    /// Register layout of the classic subquery owned by `subquery_node`
    pub fn subquery_register_plan(&self, subquery_node: NodeId) -> Option<&RegisterPlan> {
        self.subquery_register_plans.get(&subquery_node)
    }

    /// Drop register bookkeeping at or above `threshold` in every layout
    /// and node
    pub fn shrink_registers(&mut self, threshold: RegisterId) {
        if let Some(plan) = &mut self.register_plan {
            plan.shrink(threshold);
        }
        for plan in self.subquery_register_plans.values_mut() {
            plan.shrink(threshold);
        }
        for node in self.nodes.values_mut() {
            if let Some(registers) = &mut node.registers {
                registers.regs_to_clear.retain(|r| *r < threshold);
                for keep in &mut registers.regs_to_keep {
                    keep.retain(|r| *r < threshold);
                }
            }
        }
    }
}
