// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Payloads of nodes that move rows between servers

use crate::plan::nodes::basic::SortElement;
use crate::variable::VariableId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScatterNode {
    #[serde(default)]
    pub clients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatherNode {
    /// Merge order of the incoming streams; empty for unsorted gathering
    #[serde(default)]
    pub elements: Vec<SortElement>,
    #[serde(default)]
    pub parallel: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNode {
    pub server: String,
    #[serde(default)]
    pub query_id: String,
}

/// Route rows to shards by the value of `variable`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributeNode {
    pub collection: String,
    pub variable: VariableId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributeConsumerNode {
    pub distribute_id: String,
}

/// Single-document operation executed directly on the responsible server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleRemoteOperationNode {
    pub collection: String,
    pub mode: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub in_variable: Option<VariableId>,
    #[serde(default)]
    pub out_variable: Option<VariableId>,
}
