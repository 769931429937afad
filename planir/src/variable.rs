// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query variables and the per-plan variable registry
//!
//! Nodes never own variables. They store a [`VariableId`] and resolve it
//! through the [`VariableRegistry`] of the plan they belong to.

use crate::error::{PlanError, PlanResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Numeric identity of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableId(pub u32);

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// A named query variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub id: VariableId,
    pub name: String,
}

impl Variable {
    pub fn new(id: VariableId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Variables introduced by the user, as opposed to planner temporaries
    /// whose names start with a digit or an underscore
    pub fn is_user_defined(&self) -> bool {
        match self.name.chars().next() {
            Some(c) => !c.is_ascii_digit() && c != '_',
            None => false,
        }
    }
}

/// Set of variables, ordered for deterministic output
pub type VarSet = BTreeSet<VariableId>;

/// One [`VarSet`] per spliced-subquery nesting level; index 0 is outermost
pub type VarSetStack = Vec<VarSet>;

/// Owns the variables of one plan
///
/// Entries are shared `Arc`s so plans cloned without properties can alias the
/// same variable objects; renaming replaces the entry in this registry only.
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    variables: BTreeMap<VariableId, Arc<Variable>>,
    next_id: u32,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new variable with a fresh id
    pub fn create_variable(&mut self, name: impl Into<String>) -> VariableId {
        let id = VariableId(self.next_id);
        self.next_id += 1;
        self.variables.insert(id, Arc::new(Variable::new(id, name)));
        id
    }

    /// Create a planner temporary; its name is its id, so it is not user defined
    pub fn create_temporary_variable(&mut self) -> VariableId {
        let name = self.next_id.to_string();
        self.create_variable(name)
    }

    /// Register an independent copy of `original` under the same id
    pub fn create_variable_from(&mut self, original: &Variable) -> VariableId {
        self.insert(Arc::new(original.clone()))
    }

    /// Register a shared handle to `variable` under its id unless already known
    pub fn share(&mut self, variable: &Arc<Variable>) -> VariableId {
        if !self.variables.contains_key(&variable.id) {
            self.insert(Arc::clone(variable));
        }
        variable.id
    }

    /// Duplicate a variable under a fresh id
    pub fn clone_with_fresh_id(&mut self, id: VariableId) -> PlanResult<VariableId> {
        let name = self.get(id)?.name.clone();
        Ok(self.create_variable(name))
    }

    pub fn get(&self, id: VariableId) -> PlanResult<&Arc<Variable>> {
        self.variables.get(&id).ok_or(PlanError::UnknownVariable(id))
    }

    pub fn contains(&self, id: VariableId) -> bool {
        self.variables.contains_key(&id)
    }

    pub fn rename(&mut self, id: VariableId, name: impl Into<String>) -> PlanResult<()> {
        let slot = self
            .variables
            .get_mut(&id)
            .ok_or(PlanError::UnknownVariable(id))?;
        *slot = Arc::new(Variable::new(id, name));
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Variable>> {
        self.variables.values()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    fn insert(&mut self, variable: Arc<Variable>) -> VariableId {
        let id = variable.id;
        self.next_id = self.next_id.max(id.0 + 1);
        self.variables.insert(id, variable);
        id
    }
}
