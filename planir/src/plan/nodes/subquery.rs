// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Subquery payloads
//!
//! A classic subquery owns a nested plan whose root is `subquery`; the nested
//! nodes live in the same arena but are only reachable through this node.
//! Spliced subqueries are inlined between a SubqueryStart and a SubqueryEnd.

use crate::plan::node::NodeId;
use crate::variable::VariableId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubqueryNode {
    /// Root of the nested plan
    pub subquery: NodeId,
    pub out_variable: VariableId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubqueryEndNode {
    /// Value returned by each inner row
    #[serde(default)]
    pub in_variable: Option<VariableId>,
    pub out_variable: VariableId,
}
