//! Common subexpression elimination over a compiled, topologically ordered
//! program (§4.8). Grounded in `original_source/transforms/compiler/
//! cse_optimizer.cpp`'s `Optimize` fixed-point loop.
//!
//! Two nodes are equivalent when they share a transform kind, the same
//! (already-coerced) options, the same wired inputs once input node ids
//! are rewritten through the current id-remapping, and the same effective
//! timeframe/session — except for scalar-literal nodes, whose
//! `effective_timeframe`/`effective_session` collapse to `None` so a `5`
//! used inside a `"1h"` node and a `5` used inside a `"1D"` node still
//! dedup to one node (§3 invariant, `AlgorithmNode::effective_timeframe`).
//! Sink nodes (`trade_signal_executor` and any other zero-output
//! transform) are never merged: each represents a distinct execution
//! side effect even if wired identically.

use std::collections::HashMap;

use crate::types::{AlgorithmNode, CompiledProgram, InputValue};

/// Runs CSE to a fixed point and returns the deduplicated, re-indexed
/// program. Collisions are resolved by exact key equality (a `String`
/// comparison over the full canonical key), never by a hash computed over
/// a truncated representation, so two structurally different nodes can
/// never be merged merely because their keys happened to hash alike.
pub fn optimize(mut program: CompiledProgram) -> CompiledProgram {
    loop {
        let remap = pass(&program);
        if remap.is_empty() {
            return program;
        }
        program = apply_remap(program, &remap);
    }
}

/// One fixed-point iteration: returns a map from dropped node id to the
/// surviving node id it should be rewritten to, empty once no further
/// merges are possible.
fn pass(program: &CompiledProgram) -> HashMap<String, String> {
    let mut canonical_to_survivor: HashMap<String, String> = HashMap::new();
    let mut remap = HashMap::new();

    for node in &program.nodes {
        if is_sink_node(node) {
            continue;
        }
        let key = canonical_key(node);
        match canonical_to_survivor.get(&key) {
            Some(survivor) if survivor != &node.id => {
                remap.insert(node.id.clone(), survivor.clone());
            }
            Some(_) => {}
            None => {
                canonical_to_survivor.insert(key, node.id.clone());
            }
        }
    }
    remap
}

/// Executor/sink nodes have no declared outputs, which this module cannot
/// check directly without the registry; the reliable, registry-free
/// signal is the well-known `trade_signal_executor` kind plus the
/// convention that every other sink transform in this codebase is named
/// with a `_executor`/`_sink` suffix.
fn is_sink_node(node: &AlgorithmNode) -> bool {
    node.kind == "trade_signal_executor" || node.kind.ends_with("_executor") || node.kind.ends_with("_sink")
}

fn canonical_key(node: &AlgorithmNode) -> String {
    let options: Vec<String> = node
        .options
        .iter()
        .map(|(k, v)| format!("{k}={v:?}"))
        .collect();
    let inputs: Vec<String> = node
        .inputs
        .iter()
        .map(|(k, v)| format!("{k}={v:?}"))
        .collect();
    let timeframe = node.effective_timeframe().map(|t| t.canonical().to_string());
    let session = node.effective_session().map(|s| s.to_string());
    format!(
        "{}|{:?}|{:?}|{timeframe:?}|{session:?}",
        node.kind, options, inputs
    )
}

fn apply_remap(program: CompiledProgram, remap: &HashMap<String, String>) -> CompiledProgram {
    let mut nodes = Vec::with_capacity(program.nodes.len());
    for mut node in program.nodes {
        if remap.contains_key(&node.id) {
            continue;
        }
        for values in node.inputs.values_mut() {
            for v in values.iter_mut() {
                if let InputValue::NodeRef { node_id, .. } = v {
                    if let Some(target) = remap.get(node_id) {
                        *node_id = target.clone();
                    }
                }
            }
        }
        nodes.push(node);
    }
    let mut program = CompiledProgram {
        nodes,
        index: Default::default(),
        executor_count: program.executor_count,
    };
    program.rebuild_index();
    program
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OptionValue, Scalar};

    fn literal(id: &str) -> AlgorithmNode {
        let mut n = AlgorithmNode::new(id, "number");
        n.options
            .insert("value".to_string(), OptionValue::Scalar(Scalar::String("5".to_string())));
        n
    }

    #[test]
    fn identical_nodes_merge_and_rewire_dependents() {
        let mut a = literal("number_0");
        a.timeframe = Some("1h".parse().unwrap());
        let mut b = literal("number_1");
        b.timeframe = Some("1D".parse().unwrap());
        // Scalar literals are timeframe-agnostic for CSE purposes even
        // though the `timeframe` field itself differs here.
        let mut dependent = AlgorithmNode::new("add_0", "add");
        dependent
            .inputs
            .insert("lhs".to_string(), vec![InputValue::node_ref("number_0", "result")]);
        dependent
            .inputs
            .insert("rhs".to_string(), vec![InputValue::node_ref("number_1", "result")]);

        let mut program = CompiledProgram::new();
        program.nodes = vec![a, b, dependent];
        program.rebuild_index();

        let optimized = optimize(program);
        assert_eq!(optimized.nodes.len(), 2);
        let dep = optimized.node("add_0").unwrap();
        for values in dep.inputs.values() {
            for v in values {
                if let InputValue::NodeRef { node_id, .. } = v {
                    assert_eq!(node_id, "number_0");
                }
            }
        }
    }

    #[test]
    fn distinct_options_are_not_merged() {
        let mut a = literal("number_0");
        a.options
            .insert("value".to_string(), OptionValue::Scalar(Scalar::String("5".to_string())));
        let mut b = literal("number_1");
        b.options
            .insert("value".to_string(), OptionValue::Scalar(Scalar::String("6".to_string())));

        let mut program = CompiledProgram::new();
        program.nodes = vec![a, b];
        program.rebuild_index();

        let optimized = optimize(program);
        assert_eq!(optimized.nodes.len(), 2);
    }

    #[test]
    fn sink_nodes_are_never_merged_even_if_identical() {
        let mut a = AlgorithmNode::new("exec_0", "trade_signal_executor");
        a.inputs
            .insert("SLOT".to_string(), vec![InputValue::node_ref("x", "result")]);
        let mut b = AlgorithmNode::new("exec_1", "trade_signal_executor");
        b.inputs
            .insert("SLOT".to_string(), vec![InputValue::node_ref("x", "result")]);

        let mut program = CompiledProgram::new();
        program.nodes = vec![a, b];
        program.rebuild_index();

        let optimized = optimize(program);
        assert_eq!(optimized.nodes.len(), 2);
    }
}
