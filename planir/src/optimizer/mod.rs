// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Rule-based plan optimizer
//!
//! Rules run in registration order. Each rule is tried on a copy of every
//! candidate plan, so both the rewritten and the untouched plan stay in the
//! running. A rule that fails, or leaves a plan that does not verify, only
//! loses its rewritten copy. Once all rules ran, candidates are costed in
//! parallel and the cheapest one wins.

pub mod traversal_conditions;

use crate::config::PlannerConfig;
use crate::error::{PlanError, PlanResult};
use crate::plan::execution_plan::ExecutionPlan;
use rayon::prelude::*;
use std::fmt;

pub use traversal_conditions::optimize_traversal_conditions;

/// A rewrite rule; returns whether it changed the plan
pub type RuleFn = fn(&mut ExecutionPlan, &PlannerConfig) -> PlanResult<bool>;

#[derive(Clone, Copy)]
pub struct OptimizerRule {
    pub name: &'static str,
    pub apply: RuleFn,
}

impl fmt::Debug for OptimizerRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimizerRule").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone)]
pub struct Optimizer {
    rules: Vec<OptimizerRule>,
    config: PlannerConfig,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(PlannerConfig::default())
    }
}

impl Optimizer {
    /// Optimizer with the default rule set
    pub fn new(config: PlannerConfig) -> Self {
        let mut optimizer = Self::without_rules(config);
        optimizer.add_rule(traversal_conditions::RULE_NAME, optimize_traversal_conditions);
        optimizer
    }

    pub fn without_rules(config: PlannerConfig) -> Self {
        Self {
            rules: Vec::new(),
            config,
        }
    }

    pub fn add_rule(&mut self, name: &'static str, apply: RuleFn) {
        self.rules.push(OptimizerRule { name, apply });
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name).collect()
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Run all rules and return the cheapest resulting plan
    pub fn optimize(&self, plan: ExecutionPlan) -> PlanResult<ExecutionPlan> {
        if self.config.verify_plans {
            plan.verify()?;
        }
        let mut candidates = vec![plan];

        for rule in &self.rules {
            let mut next = Vec::with_capacity(candidates.len() * 2);
            for candidate in candidates {
                let mut rewritten = candidate.deep_clone(true)?;
                match self.apply_rule(rule, &mut rewritten) {
                    Ok(true) => next.push(rewritten),
                    Ok(false) => {}
                    Err(e) => log::debug!("discarding rewritten candidate: {}", e),
                }
                next.push(candidate);
            }
            next.truncate(self.config.max_candidate_plans.max(1));
            candidates = next;
        }

        log::debug!(
            "costing {} candidate plans after {} rules",
            candidates.len(),
            self.rules.len()
        );
        let costs = candidates
            .par_iter()
            .map(|candidate| -> PlanResult<f64> {
                let root = candidate.root()?;
                Ok(candidate.get_cost(root)?.estimated_cost)
            })
            .collect::<PlanResult<Vec<f64>>>()?;

        let best = costs
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(index, _)| index)
            .unwrap_or(0);
        candidates
            .into_iter()
            .nth(best)
            .ok_or(PlanError::NoRoot)
    }

    fn apply_rule(&self, rule: &OptimizerRule, plan: &mut ExecutionPlan) -> PlanResult<bool> {
        let altered = (rule.apply)(plan, &self.config).map_err(|e| PlanError::RuleFailed {
            rule: rule.name.to_string(),
            message: e.to_string(),
        })?;
        if !altered {
            log::trace!("rule {} left the plan unchanged", rule.name);
            return Ok(false);
        }

        log::debug!("rule {} altered the plan", rule.name);
        plan.add_applied_rule(rule.name);
        if self.config.verify_plans {
            plan.verify().map_err(|e| PlanError::RuleFailed {
                rule: rule.name.to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(true)
    }
}
