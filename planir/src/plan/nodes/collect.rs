// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! COLLECT node payload

use crate::variable::{VarSet, VariableId};
use serde::{Deserialize, Serialize};

/// Grouping key: out = in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupVarInfo {
    pub out_variable: VariableId,
    pub in_variable: VariableId,
}

/// Aggregate: out = aggregator(in)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateVarInfo {
    pub out_variable: VariableId,
    /// Absent for aggregators without input, e.g. LENGTH()
    #[serde(default)]
    pub in_variable: Option<VariableId>,
    #[serde(rename = "type")]
    pub aggregator: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectMethod {
    #[default]
    Undefined,
    Hash,
    Sorted,
    Distinct,
    Count,
}

/// COLLECT groups AGGREGATE aggregates INTO out KEEP keep / WITH COUNT INTO out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectNode {
    pub groups: Vec<GroupVarInfo>,
    pub aggregates: Vec<AggregateVarInfo>,
    /// INTO out = expression
    #[serde(default)]
    pub expression_variable: Option<VariableId>,
    /// INTO target, or the count target with `count`
    #[serde(default)]
    pub out_variable: Option<VariableId>,
    #[serde(default)]
    pub keep_variables: Vec<VariableId>,
    /// WITH COUNT INTO
    #[serde(default)]
    pub count: bool,
    #[serde(default)]
    pub is_distinct_command: bool,
    /// Method has been fixed by the optimizer
    #[serde(default)]
    pub specialized: bool,
    #[serde(default)]
    pub method: CollectMethod,
}

impl CollectNode {
    /// COLLECT WITH COUNT INTO out
    pub fn count_into(out_variable: VariableId) -> Self {
        Self {
            groups: Vec::new(),
            aggregates: Vec::new(),
            expression_variable: None,
            out_variable: Some(out_variable),
            keep_variables: Vec::new(),
            count: true,
            is_distinct_command: false,
            specialized: false,
            method: CollectMethod::Count,
        }
    }

    /// COLLECT key = in [INTO out]
    pub fn grouping(groups: Vec<GroupVarInfo>, out_variable: Option<VariableId>) -> Self {
        Self {
            groups,
            aggregates: Vec::new(),
            expression_variable: None,
            out_variable,
            keep_variables: Vec::new(),
            count: false,
            is_distinct_command: false,
            specialized: false,
            method: CollectMethod::Undefined,
        }
    }

    /// Produces exactly one row whatever the input
    pub fn is_pure_count(&self) -> bool {
        self.count && self.groups.is_empty()
    }

    /// INTO without KEEP: every user variable in scope must be retained
    pub fn retains_all_variables(&self) -> bool {
        self.out_variable.is_some()
            && !self.count
            && self.expression_variable.is_none()
            && self.keep_variables.is_empty()
    }

    pub fn set_specialized(&mut self) {
        self.specialized = true;
    }

    /// Inputs known without looking at the rest of the plan
    pub(crate) fn direct_used_variables(&self, vars: &mut VarSet) {
        vars.extend(self.groups.iter().map(|g| g.in_variable));
        vars.extend(self.aggregates.iter().filter_map(|a| a.in_variable));
        if let Some(expression) = self.expression_variable {
            vars.insert(expression);
        }
        if self.out_variable.is_some() && !self.count {
            vars.extend(self.keep_variables.iter().copied());
        }
    }

    pub(crate) fn variables_set_here(&self) -> Vec<VariableId> {
        let mut vars: Vec<VariableId> = self.groups.iter().map(|g| g.out_variable).collect();
        vars.extend(self.aggregates.iter().map(|a| a.out_variable));
        vars.extend(self.out_variable);
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_shapes() {
        let count = CollectNode::count_into(VariableId(5));
        assert!(count.is_pure_count());
        assert!(!count.retains_all_variables());

        let into = CollectNode::grouping(
            vec![GroupVarInfo {
                out_variable: VariableId(2),
                in_variable: VariableId(1),
            }],
            Some(VariableId(3)),
        );
        assert!(!into.is_pure_count());
        assert!(into.retains_all_variables());
        assert_eq!(
            into.variables_set_here(),
            vec![VariableId(2), VariableId(3)]
        );
    }

    #[test]
    fn test_count_collect_does_not_use_keep_variables() {
        let mut count = CollectNode::count_into(VariableId(5));
        count.keep_variables.push(VariableId(1));
        let mut vars = VarSet::new();
        count.direct_used_variables(&mut vars);
        assert!(vars.is_empty());
    }

    #[test]
    fn test_groups_must_be_array() {
        let doc = serde_json::json!({"groups": 5, "aggregates": []});
        assert!(serde_json::from_value::<CollectNode>(doc).is_err());
    }
}
