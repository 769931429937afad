// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Planner configuration and collection statistics

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tunables used by cost estimation and the optimizer driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Assumed number of elements of a list whose length is not known statically
    pub default_list_length: usize,

    /// Minimum input row count before a grouping COLLECT is assumed to reduce
    pub collect_reduction_threshold: usize,

    /// Fraction of input rows a grouping COLLECT is assumed to keep
    pub collect_reduction_factor: f64,

    /// Cost multiplier for random-order collection iteration
    pub random_iteration_penalty: f64,

    /// Cost of skipping one row in LIMIT
    pub skip_cost_per_row: f64,

    /// Assumed edges followed per vertex and depth when no index estimate exists
    pub default_fan_out: f64,

    /// Run the structural verifier after every optimizer rule
    pub verify_plans: bool,

    /// Upper bound for candidate plans kept by the optimizer driver
    pub max_candidate_plans: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            default_list_length: 100,
            collect_reduction_threshold: 10,
            collect_reduction_factor: 0.8,
            random_iteration_penalty: 1.005,
            skip_cost_per_row: 0.000001,
            default_fan_out: 10.0,
            verify_plans: false,
            max_candidate_plans: 128,
        }
    }
}

impl PlannerConfig {
    /// Configuration that verifies the plan graph after every rewrite
    pub fn strict() -> Self {
        Self {
            verify_plans: true,
            ..Default::default()
        }
    }

    /// Configuration for quick planning with a single candidate
    pub fn single_candidate() -> Self {
        Self {
            max_candidate_plans: 1,
            ..Default::default()
        }
    }
}

/// Data distribution statistics consumed by cost estimation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Document count by collection (or view) name
    pub collection_counts: HashMap<String, u64>,
    /// Selectivity estimate by index name, in (0, 1]
    pub index_selectivity: HashMap<String, f64>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collection count, builder style
    pub fn with_collection(mut self, name: impl Into<String>, count: u64) -> Self {
        self.collection_counts.insert(name.into(), count);
        self
    }

    /// Add an index selectivity estimate, builder style
    pub fn with_index(mut self, name: impl Into<String>, selectivity: f64) -> Self {
        self.index_selectivity
            .insert(name.into(), selectivity.clamp(f64::MIN_POSITIVE, 1.0));
        self
    }

    /// Number of documents in a collection; unknown collections are empty
    pub fn collection_count(&self, name: &str) -> u64 {
        self.collection_counts.get(name).copied().unwrap_or(0)
    }

    pub fn selectivity(&self, index: &str) -> f64 {
        self.index_selectivity.get(index).copied().unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlannerConfig::default();
        assert_eq!(config.default_list_length, 100);
        assert_eq!(config.collect_reduction_threshold, 10);
        assert!(!config.verify_plans);
        assert!(PlannerConfig::strict().verify_plans);
    }

    #[test]
    fn test_statistics_lookup() {
        let stats = Statistics::new()
            .with_collection("users", 250)
            .with_index("users_age", 2.5);
        assert_eq!(stats.collection_count("users"), 250);
        assert_eq!(stats.collection_count("missing"), 0);
        assert_eq!(stats.selectivity("users_age"), 1.0);
        assert_eq!(stats.selectivity("other"), 1.0);
    }

    #[test]
    fn test_config_serde() {
        let config = PlannerConfig::single_candidate();
        let json = serde_json::to_string(&config).unwrap();
        let back: PlannerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
