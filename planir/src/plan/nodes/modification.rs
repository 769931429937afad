// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Data modification node payloads

use crate::variable::{VarSet, VariableId};
use serde::{Deserialize, Serialize};

/// INSERT / REMOVE / REPLACE / UPDATE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationNode {
    pub collection: String,
    pub in_variable: VariableId,
    /// Separate key expression for REPLACE/UPDATE key WITH doc
    #[serde(default)]
    pub key_variable: Option<VariableId>,
    /// OLD
    #[serde(default)]
    pub out_old_variable: Option<VariableId>,
    /// NEW
    #[serde(default)]
    pub out_new_variable: Option<VariableId>,
    #[serde(default)]
    pub ignore_errors: bool,
}

impl ModificationNode {
    pub fn new(collection: impl Into<String>, in_variable: VariableId) -> Self {
        Self {
            collection: collection.into(),
            in_variable,
            key_variable: None,
            out_old_variable: None,
            out_new_variable: None,
            ignore_errors: false,
        }
    }

    pub(crate) fn used_variables(&self, vars: &mut VarSet) {
        vars.insert(self.in_variable);
        vars.extend(self.key_variable);
    }

    pub(crate) fn variables_set_here(&self) -> Vec<VariableId> {
        [self.out_old_variable, self.out_new_variable]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// UPSERT search INSERT doc UPDATE|REPLACE doc
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertNode {
    pub collection: String,
    pub in_doc_variable: VariableId,
    pub insert_variable: VariableId,
    pub update_variable: VariableId,
    #[serde(default)]
    pub is_replace: bool,
    #[serde(default)]
    pub out_new_variable: Option<VariableId>,
}

impl UpsertNode {
    pub(crate) fn used_variables(&self, vars: &mut VarSet) {
        vars.insert(self.in_doc_variable);
        vars.insert(self.insert_variable);
        vars.insert(self.update_variable);
    }
}
