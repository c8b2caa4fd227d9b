//! Type checking and implicit-cast insertion (§4.4). Grounded in
//! `original_source/transforms/compiler/type_checker.cpp`'s
//! `GetNodeOutputType`/`IsTypeCompatible`/`InsertStaticCast`.

use crate::error::CompileError;
use crate::types::{AlgorithmNode, DataType, InputValue};

use super::context::CompilationContext;

/// Resolves the output type of `node_id.handle`, consulting the Any-
/// resolution override map first, then falling back to the static
/// metadata declared by the node's transform (§4.4 "Any resolution").
pub fn node_output_type(
    ctx: &CompilationContext,
    node_id: &str,
    handle: &str,
) -> Result<DataType, CompileError> {
    if let Some(dt) = ctx
        .node_output_types
        .get(&CompilationContext::output_type_key(node_id, handle))
    {
        return Ok(*dt);
    }
    let node = ctx
        .node(node_id)
        .ok_or_else(|| CompileError::Binding(format!("unknown node '{node_id}'")))?;
    output_type_for(ctx, node, handle)
}

fn output_type_for(
    ctx: &CompilationContext,
    node: &AlgorithmNode,
    handle: &str,
) -> Result<DataType, CompileError> {
    let meta = ctx
        .registry
        .get(&node.kind)
        .ok_or_else(|| CompileError::UnknownComponent(node.kind.clone()))?;
    let port = meta.output(handle).ok_or_else(|| {
        CompileError::Binding(format!(
            "node '{}' ({}) has no output handle '{handle}'",
            node.id, node.kind
        ))
    })?;
    Ok(port.data_type)
}

/// The type carried by a wired input value: either the referenced node's
/// output type, or the scalar literal's own type.
pub fn input_value_type(
    ctx: &CompilationContext,
    value: &InputValue,
) -> Result<DataType, CompileError> {
    match value {
        InputValue::NodeRef { node_id, handle } => node_output_type(ctx, node_id, handle),
        InputValue::Constant(scalar) => Ok(scalar.data_type()),
    }
}

/// If `from` is not directly compatible with `target`, materializes the
/// matching cast node (§4.4 "the checker may insert an implicit cast") and
/// rewires `value` through it; otherwise returns `value` unchanged. Casts
/// wire their operand via the `SLOT` handle (original_source's
/// `InsertStaticCast` writes `cast_node.inputs["SLOT"]`).
pub fn cast_if_needed(
    ctx: &mut CompilationContext,
    value: InputValue,
    from: DataType,
    target: DataType,
) -> Result<InputValue, CompileError> {
    if from.is_compatible_with(target) {
        return Ok(value);
    }
    let cast_kind = from.cast_to(target).ok_or_else(|| {
        CompileError::Type(format!("no implicit cast from {from} to {target}"))
    })?;
    let id = ctx.reserve_id(cast_kind);
    let mut node = AlgorithmNode::new(id.clone(), cast_kind);
    node.inputs.insert("SLOT".to_string(), vec![value]);
    ctx.push_node(node);
    let declared = ctx
        .registry
        .get(cast_kind)
        .and_then(|m| m.output("result"))
        .map(|p| p.data_type)
        .unwrap_or(target);
    ctx.record_output_type(&id, "result", declared);
    Ok(InputValue::node_ref(id, "result"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::builtin_operator_registry;
    use crate::types::Scalar;

    #[test]
    fn compatible_types_need_no_cast_node() {
        let mut ctx = CompilationContext::new(builtin_operator_registry());
        let value = InputValue::Constant(Scalar::Decimal(Default::default()));
        let result = cast_if_needed(&mut ctx, value.clone(), DataType::Decimal, DataType::Number).unwrap();
        assert_eq!(result, value);
        assert!(ctx.nodes.is_empty());
    }

    #[test]
    fn boolean_to_string_inserts_stringify() {
        let mut ctx = CompilationContext::new(builtin_operator_registry());
        let value = InputValue::Constant(Scalar::Boolean(true));
        let result = cast_if_needed(&mut ctx, value, DataType::Boolean, DataType::String).unwrap();
        assert_eq!(ctx.nodes.len(), 1);
        assert_eq!(ctx.nodes[0].kind, "stringify");
        match result {
            InputValue::NodeRef { node_id, handle } => {
                assert_eq!(node_id, "stringify_0");
                assert_eq!(handle, "result");
            }
            _ => panic!("expected node ref"),
        }
    }

    #[test]
    fn boolean_to_number_uses_static_cast_to_decimal() {
        let mut ctx = CompilationContext::new(builtin_operator_registry());
        let value = InputValue::Constant(Scalar::Boolean(false));
        cast_if_needed(&mut ctx, value, DataType::Boolean, DataType::Number).unwrap();
        assert_eq!(ctx.nodes[0].kind, "static_cast_to_decimal");
    }
}
