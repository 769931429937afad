// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Payloads of the single-collection, list, filter and projection nodes

use crate::ast::Expression;
use crate::plan::nodes::collect::AggregateVarInfo;
use crate::variable::{VarSet, VariableId};
use serde::{Deserialize, Serialize};

/// FOR doc IN collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumerateCollectionNode {
    pub collection: String,
    pub out_variable: VariableId,
    /// Iterate in random order
    #[serde(default)]
    pub random: bool,
    /// Only the number of documents is needed
    #[serde(default)]
    pub count_only: bool,
}

/// FOR x IN list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumerateListNode {
    pub in_variable: VariableId,
    pub out_variable: VariableId,
}

/// FOR doc IN collection, served by an index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexNode {
    pub collection: String,
    pub index: String,
    pub out_variable: VariableId,
    #[serde(default)]
    pub condition: Option<Expression>,
}

/// FOR doc IN view SEARCH ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumerateViewNode {
    pub view: String,
    pub out_variable: VariableId,
    #[serde(default)]
    pub search: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterNode {
    pub in_variable: VariableId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitNode {
    pub offset: usize,
    pub limit: usize,
    /// Count rows dropped by the limit as well
    #[serde(default)]
    pub full_count: bool,
}

/// LET out = expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationNode {
    pub out_variable: VariableId,
    pub expression: Expression,
}

/// One ORDER BY key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortElement {
    pub in_variable: VariableId,
    pub ascending: bool,
    #[serde(default)]
    pub attribute_path: Vec<String>,
}

impl SortElement {
    pub fn new(in_variable: VariableId, ascending: bool) -> Self {
        Self {
            in_variable,
            ascending,
            attribute_path: Vec::new(),
        }
    }

    pub fn with_path(mut self, path: &[&str]) -> Self {
        self.attribute_path = path.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Render as `$<id>` followed by `.attr` for every path element
    pub fn to_var_string(&self) -> String {
        let mut result = format!("${}", self.in_variable.0);
        for attribute in &self.attribute_path {
            result.push('.');
            result.push_str(attribute);
        }
        result
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortNode {
    pub elements: Vec<SortElement>,
    #[serde(default)]
    pub stable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnNode {
    pub in_variable: VariableId,
    #[serde(default)]
    pub count: bool,
}

/// Late document materialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializeNode {
    pub in_variable: VariableId,
    pub out_variable: VariableId,
}

/// WINDOW aggregation over neighbouring rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowNode {
    #[serde(default)]
    pub range_variable: Option<VariableId>,
    pub aggregates: Vec<AggregateVarInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSource {
    pub collection: String,
    pub out_variable: VariableId,
    #[serde(default)]
    pub condition: Option<Expression>,
}

/// Index join over several collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinNode {
    pub sources: Vec<JoinSource>,
}

impl JoinNode {
    pub(crate) fn used_variables(&self, vars: &mut VarSet) {
        for source in &self.sources {
            if let Some(condition) = &source.condition {
                condition.referenced_variables(vars);
            }
        }
        for source in &self.sources {
            vars.remove(&source.out_variable);
        }
    }
}
