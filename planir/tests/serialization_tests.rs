//! Plan serialization tests
//!
//! `from_json(to_json(plan))` must rebuild the same plan; malformed
//! documents are rejected with a typed error.

#[path = "testutils/mod.rs"]
mod testutils;

use planir::config::PlannerConfig;
use planir::plan::{ExecutionPlan, NodeType, SerializeFlags};
use planir::PlanError;
use serde_json::{json, Value};
use testutils::*;

fn restore(doc: &Value) -> Result<ExecutionPlan, PlanError> {
    ExecutionPlan::from_json(doc, statistics(), PlannerConfig::default())
}

fn assert_round_trip(plan: &ExecutionPlan, flags: SerializeFlags) {
    let doc = plan.to_json(flags).unwrap();
    let restored = restore(&doc).unwrap();
    assert_eq!(restored.to_json(flags).unwrap(), doc);
    assert_eq!(restored.root().unwrap(), plan.root().unwrap());
}

fn nodes_mut(doc: &mut Value) -> &mut Vec<Value> {
    doc["nodes"].as_array_mut().unwrap()
}

#[test]
fn test_round_trip_without_analysis() {
    init_logging();
    let (plan, _) = collection_plan();
    assert_round_trip(&plan, SerializeFlags::NONE);
    assert_round_trip(&plan, SerializeFlags::PARENTS | SerializeFlags::ESTIMATES);
}

#[test]
fn test_round_trip_with_register_information() {
    let (mut plan, _) = collection_plan();
    plan.find_var_usage().unwrap();
    plan.plan_registers().unwrap();
    assert_round_trip(&plan, SerializeFlags::all());

    let (mut plan, _) = subquery_plan();
    plan.find_var_usage().unwrap();
    plan.plan_registers().unwrap();
    assert_round_trip(&plan, SerializeFlags::all());

    let restored = restore(&plan.to_json(SerializeFlags::all()).unwrap()).unwrap();
    assert!(restored.is_var_usage_computed());
}

#[test]
fn test_round_trip_random_plans() {
    let mut rng = fastrand::Rng::with_seed(1234);
    for _ in 0..10 {
        let len = rng.usize(1..10);
        let mut plan = random_linear_plan(&mut rng, len);
        assert_round_trip(&plan, SerializeFlags::PARENTS);
        plan.find_var_usage().unwrap();
        plan.plan_registers().unwrap();
        assert_round_trip(&plan, SerializeFlags::all());
    }
}

#[test]
fn test_round_trip_keeps_fan_in() {
    let (plan, _, _, scatter) = diamond_plan();
    let doc = plan.to_json(SerializeFlags::PARENTS).unwrap();
    let restored = restore(&doc).unwrap();
    assert_eq!(restored.node(scatter).unwrap().parents().len(), 2);
    restored.verify().unwrap();
}

#[test]
fn test_document_layout() {
    let (mut plan, vars) = collection_plan();
    plan.add_applied_rule("some-rule");
    let doc = plan.to_json(SerializeFlags::NONE).unwrap();

    assert_eq!(doc["rootId"], json!(plan.root().unwrap()));
    assert_eq!(doc["appliedRules"], json!(["some-rule"]));
    assert_eq!(doc["variables"].as_array().unwrap().len(), 2);

    let nodes = doc["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), plan.len());
    // dependencies come before their dependents
    assert_eq!(nodes[0]["type"], json!("SingletonNode"));
    assert_eq!(nodes[0]["typeID"], json!(NodeType::Singleton.type_id()));
    assert_eq!(nodes.last().unwrap()["type"], json!("ReturnNode"));
    assert_eq!(nodes.last().unwrap()["inVariable"], json!(vars.doc));
    assert!(nodes[0].get("parents").is_none());
    assert!(nodes[0].get("estimatedCost").is_none());
}

#[test]
fn test_unknown_type_id_is_rejected() {
    let (plan, _) = collection_plan();
    let mut doc = plan.to_json(SerializeFlags::NONE).unwrap();
    nodes_mut(&mut doc)[0]["typeID"] = json!(3);
    assert!(matches!(restore(&doc), Err(PlanError::UnknownNodeType(3))));
}

#[test]
fn test_missing_attributes_are_rejected() {
    let (plan, _) = collection_plan();
    let doc = plan.to_json(SerializeFlags::NONE).unwrap();

    let mut no_nodes = doc.clone();
    no_nodes.as_object_mut().unwrap().remove("nodes");
    assert!(matches!(restore(&no_nodes), Err(PlanError::Malformed(_))));

    let mut no_id = doc.clone();
    nodes_mut(&mut no_id)[1].as_object_mut().unwrap().remove("id");
    assert!(matches!(restore(&no_id), Err(PlanError::Malformed(_))));

    let mut bad_nodes = doc;
    bad_nodes["nodes"] = json!({});
    assert!(matches!(restore(&bad_nodes), Err(PlanError::Malformed(_))));
}

#[test]
fn test_dangling_dependency_is_rejected() {
    let (plan, _) = collection_plan();
    let mut doc = plan.to_json(SerializeFlags::NONE).unwrap();
    nodes_mut(&mut doc)[1]["dependencies"] = json!([999]);
    assert!(matches!(restore(&doc), Err(PlanError::Malformed(_))));
}

#[test]
fn test_unknown_variable_is_rejected() {
    let (plan, _) = collection_plan();
    let mut doc = plan.to_json(SerializeFlags::NONE).unwrap();
    let last = nodes_mut(&mut doc).len() - 1;
    nodes_mut(&mut doc)[last]["inVariable"] = json!(777);
    assert!(matches!(restore(&doc), Err(PlanError::UnknownVariable(_))));
}

#[test]
fn test_empty_liveness_stack_is_rejected() {
    let (mut plan, _) = collection_plan();
    plan.find_var_usage().unwrap();
    let mut doc = plan.to_json(SerializeFlags::REGISTER_INFORMATION).unwrap();
    nodes_mut(&mut doc)[0]["varsUsedLaterStack"] = json!([]);
    match restore(&doc) {
        Err(PlanError::Malformed(message)) => assert!(message.contains("non-empty")),
        other => panic!("unexpected result: {:?}", other.map(|p| p.len())),
    }
}

#[test]
fn test_mismatched_parents_are_rejected() {
    let (plan, _, _, scatter) = diamond_plan();
    let mut doc = plan.to_json(SerializeFlags::PARENTS).unwrap();
    for node in nodes_mut(&mut doc) {
        if node["id"] == json!(scatter) {
            node["parents"] = json!([]);
        }
    }
    assert!(matches!(restore(&doc), Err(PlanError::Malformed(_))));
}

#[test]
fn test_missing_subquery_is_rejected() {
    let (plan, vars) = subquery_plan();
    let mut doc = plan.to_json(SerializeFlags::NONE).unwrap();
    for node in nodes_mut(&mut doc) {
        if node["id"] == json!(vars.subquery) {
            node["subquery"] = json!(999);
        }
    }
    assert!(matches!(restore(&doc), Err(PlanError::Malformed(_))));
}
