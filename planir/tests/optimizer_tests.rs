//! Optimizer driver and instantiation tests

#[path = "testutils/mod.rs"]
mod testutils;

use planir::ast::{Expression, Operator};
use planir::config::PlannerConfig;
use planir::optimizer::traversal_conditions::RULE_NAME;
use planir::optimizer::Optimizer;
use planir::plan::nodes::{PathEndpoint, TraversalNode, TraversalOptions};
use planir::plan::{ExecutionNode, ExecutionPlan, NodeData, NodeId, NodeType, SerializeFlags};
use planir::{ExecutorFactory, PlanError, PlanResult};
use testutils::*;

/// FOR v, e, p IN 1..4 OUTBOUND 'persons/alice' GRAPH 'social'
///   FILTER p.vertices[3].age >= 21 RETURN v
fn friends_of_friends(config: PlannerConfig) -> (ExecutionPlan, NodeId) {
    let mut builder = PlanBuilder::with_config(config);
    let v = builder.var("v");
    let e = builder.var("e");
    let p = builder.var("p");
    let tmp = builder.tmp();
    let c = builder.tmp();

    builder.then(NodeData::Singleton);
    let traversal = builder.then(NodeData::Traversal(
        TraversalNode::new(
            "social",
            PathEndpoint::constant("persons/alice"),
            TraversalOptions {
                min_depth: 1,
                max_depth: 4,
            },
            tmp,
        )
        .with_outputs(Some(v), Some(e), Some(p)),
    ));
    builder.then(calculation(
        c,
        Expression::compare(
            Expression::property(
                Expression::index(
                    Expression::property(Expression::reference(p), "vertices"),
                    Expression::literal(3),
                ),
                "age",
            ),
            Operator::GreaterEqual,
            Expression::literal(21),
        ),
    ));
    builder.then(filter(c));
    builder.then(ret(v));
    (builder.finish(), traversal)
}

fn root_cost(plan: &ExecutionPlan) -> f64 {
    plan.get_cost(plan.root().unwrap()).unwrap().estimated_cost
}

/// Raises every LIMIT so the rewritten plan is always more expensive
fn widen_limits(plan: &mut ExecutionPlan, _config: &PlannerConfig) -> PlanResult<bool> {
    let limits = plan.find_nodes_of_type(&[NodeType::Limit], true)?;
    for id in &limits {
        plan.node_mut(*id)?.as_limit_mut()?.limit = 1_000;
    }
    plan.invalidate_cost(plan.root()?)?;
    Ok(!limits.is_empty())
}

#[test]
fn test_optimizer_applies_pushdown() {
    init_logging();
    let (plan, traversal) = friends_of_friends(PlannerConfig::strict());
    let before = root_cost(&plan);

    let optimizer = Optimizer::new(PlannerConfig::strict());
    let optimized = optimizer.optimize(plan).unwrap();

    assert_eq!(optimized.applied_rules(), &[RULE_NAME.to_string()]);
    let node = optimized.node(traversal).unwrap().as_traversal().unwrap();
    assert_eq!(node.options.min_depth, 3);
    assert_eq!(node.vertex_conditions[&3].len(), 1);
    assert!(root_cost(&optimized) < before);
    optimized.verify().unwrap();
}

#[test]
fn test_single_candidate_keeps_rewritten_plan() {
    let (plan, traversal) = friends_of_friends(PlannerConfig::single_candidate());
    let optimizer = Optimizer::new(PlannerConfig::single_candidate());
    let optimized = optimizer.optimize(plan).unwrap();

    assert_eq!(optimized.applied_rules().len(), 1);
    let node = optimized.node(traversal).unwrap().as_traversal().unwrap();
    assert!(node.condition.is_some());
}

#[test]
fn test_plan_without_traversals_is_unchanged() {
    let (plan, _) = collection_plan();
    let expected = plan.to_json(SerializeFlags::NONE).unwrap();

    let optimized = Optimizer::new(PlannerConfig::default()).optimize(plan).unwrap();
    assert!(optimized.applied_rules().is_empty());
    assert_eq!(optimized.to_json(SerializeFlags::NONE).unwrap(), expected);
}

#[test]
fn test_cheaper_original_wins() {
    let (plan, _) = collection_plan();
    let mut optimizer = Optimizer::without_rules(PlannerConfig::default());
    optimizer.add_rule("widen-limits", widen_limits);
    assert_eq!(optimizer.rule_names(), vec!["widen-limits"]);

    let optimized = optimizer.optimize(plan).unwrap();
    assert!(optimized.applied_rules().is_empty());
    let limit = optimized.find_nodes_of_type(&[NodeType::Limit], false).unwrap()[0];
    assert_eq!(optimized.node(limit).unwrap().as_limit().unwrap().limit, 10);
}

/// Records the node kinds in instantiation order
#[derive(Default)]
struct BlockRecorder {
    created: usize,
}

impl ExecutorFactory for BlockRecorder {
    type Block = (NodeType, usize);

    fn create_block(&mut self, _plan: &ExecutionPlan, node: &ExecutionNode) -> PlanResult<Self::Block> {
        self.created += 1;
        Ok((node.kind(), node.registers()?.depth))
    }
}

#[test]
fn test_instantiate_optimized_plan() {
    let (plan, _) = friends_of_friends(PlannerConfig::default());
    let mut optimized = Optimizer::new(PlannerConfig::default()).optimize(plan).unwrap();

    let mut factory = BlockRecorder::default();
    assert!(matches!(
        optimized.instantiate(&mut factory),
        Err(PlanError::RegistersNotPlanned(_))
    ));
    assert_eq!(factory.created, 0);

    optimized.find_var_usage().unwrap();
    optimized.plan_registers().unwrap();
    let blocks = optimized.instantiate(&mut factory).unwrap();

    let kinds: Vec<NodeType> = blocks.iter().map(|(_, (kind, _))| *kind).collect();
    assert_eq!(
        kinds,
        vec![
            NodeType::Singleton,
            NodeType::Traversal,
            NodeType::Calculation,
            NodeType::Filter,
            NodeType::Return,
        ]
    );
    assert_eq!(blocks[0].1 .1, 0);
    assert_eq!(blocks[1].1 .1, 1);
    assert_eq!(blocks.last().unwrap().0, optimized.root().unwrap());
    assert_eq!(factory.created, optimized.len());
}
