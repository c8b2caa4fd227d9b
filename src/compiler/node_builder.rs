//! Statement-level compilation: assignment targets, sink statements, and
//! constructor-node construction shared by top-level assignments and
//! inline constructor calls (§4.3). Grounded in
//! `original_source/transforms/compiler/node_builder.cpp`'s
//! `BuildNodeFromConstructor`/`WireFeedInputs`.

use crate::error::CompileError;
use crate::registry::TransformMetadata;
use crate::types::{AlgorithmNode, DataType, InputValue};

use super::ast::{Expr, Module, Pos, Stmt};
use super::constructor_parser::{assemble, unwrap_call_chain, ParsedCall};
use super::context::{Binding, CompilationContext};
use super::expr_compiler::{compile_expr, resolve_call_target};
use super::option_validator::validate_options;
use super::special_params::extract_special_params;
use super::type_checker::{cast_if_needed, input_value_type};

pub fn compile_module(ctx: &mut CompilationContext, module: &Module) -> Result<(), CompileError> {
    for stmt in &module.statements {
        compile_stmt(ctx, stmt)?;
    }
    Ok(())
}

fn compile_stmt(ctx: &mut CompilationContext, stmt: &Stmt) -> Result<(), CompileError> {
    match stmt {
        Stmt::Assign { targets, value, pos } => compile_assign(ctx, targets, value, *pos),
        Stmt::Expr(expr) => compile_sink_stmt(ctx, expr),
    }
}

/// A variable bound to a bare, uncalled transform id (`f = ema`), callable
/// later as `f(opts)(inputs)` (§4.2 "Bare identifier resolution").
fn is_component_reference(ctx: &CompilationContext, value: &Expr) -> Option<String> {
    match value {
        Expr::Name { id, .. } if !ctx.var_to_binding.contains_key(id) && ctx.registry.has(id) => {
            Some(id.clone())
        }
        _ => None,
    }
}

fn compile_assign(
    ctx: &mut CompilationContext,
    targets: &[String],
    value: &Expr,
    pos: Pos,
) -> Result<(), CompileError> {
    for name in targets {
        if ctx.var_to_binding.contains_key(name) {
            return Err(CompileError::Binding(format!(
                "line {}: variable '{name}' is already bound",
                pos.line
            )));
        }
    }

    if targets.len() == 1 {
        let name = &targets[0];
        if let Some(transform_id) = is_component_reference(ctx, value) {
            ctx.var_to_binding
                .insert(name.clone(), Binding::Component(transform_id));
            return Ok(());
        }
        if let Some((base, layers)) = unwrap_call_chain(value) {
            if let Ok(component) = resolve_call_target(ctx, base) {
                if ctx.registry.has(&component) {
                    let handle = bind_named_constructor(ctx, name, &component, &layers, pos)?;
                    ctx.var_to_binding.insert(
                        name.clone(),
                        Binding::Handle {
                            node_id: name.clone(),
                            handle,
                        },
                    );
                    return Ok(());
                }
            }
        }
        let val = compile_expr(ctx, value)?;
        match val {
            InputValue::NodeRef { node_id, handle } => {
                ctx.var_to_binding
                    .insert(name.clone(), Binding::Handle { node_id, handle });
            }
            InputValue::Constant(_) => {
                return Err(CompileError::Binding(format!(
                    "line {}: expression compiles to a bare scalar with no backing node",
                    pos.line
                )))
            }
        }
        return Ok(());
    }

    // Tuple assignment: the constructor's declared outputs are bound
    // positionally to each target (§4.3 "Tuple assignment").
    let (base, layers) = unwrap_call_chain(value).ok_or_else(|| CompileError::Binding(format!(
        "line {}: tuple assignment requires a constructor call on the right-hand side",
        pos.line
    )))?;
    let component = resolve_call_target(ctx, base)?;
    let meta = ctx
        .registry
        .get(&component)
        .ok_or_else(|| CompileError::UnknownComponent(component.clone()))?
        .clone();
    if meta.outputs.len() != targets.len() {
        return Err(CompileError::Arity(format!(
            "line {}: '{component}' declares {} output(s) but {} target(s) were given",
            pos.line,
            meta.outputs.len(),
            targets.len()
        )));
    }
    let parsed = assemble(&layers);
    let id = ctx.reserve_synthetic_id("node");
    let node = build_constructor_node(ctx, id, &component, &parsed, pos)?;
    let node_id = node.id.clone();
    ctx.push_node(node);
    for (target, port) in targets.iter().zip(meta.outputs.iter()) {
        ctx.var_to_binding.insert(
            target.clone(),
            Binding::Handle {
                node_id: node_id.clone(),
                handle: port.id.clone(),
            },
        );
    }
    Ok(())
}

/// Builds and pushes a constructor node whose id is the bound variable
/// name itself (rather than a synthesized `base_n` id), returning the
/// output handle the variable should resolve to (§4.3: named assignment
/// targets become the node's id directly, unlike inline or tuple-bound
/// constructor calls).
fn bind_named_constructor(
    ctx: &mut CompilationContext,
    name: &str,
    component: &str,
    layers: &[super::constructor_parser::CallLayer],
    pos: Pos,
) -> Result<String, CompileError> {
    if ctx.used_node_ids.contains(name) {
        return Err(CompileError::Binding(format!(
            "line {}: node id '{name}' collides with an existing node",
            pos.line
        )));
    }
    ctx.used_node_ids.insert(name.to_string());
    let parsed = assemble(layers);
    let meta = ctx
        .registry
        .get(component)
        .ok_or_else(|| CompileError::UnknownComponent(component.to_string()))?
        .clone();
    let node = build_constructor_node(ctx, name.to_string(), component, &parsed, pos)?;
    ctx.push_node(node);
    Ok(meta
        .default_output_handle()
        .unwrap_or_default()
        .to_string())
}

/// A bare expression statement is only valid as a sink-node call: a
/// constructor whose component declares zero outputs (§4.3 "Sink node
/// statement").
fn compile_sink_stmt(ctx: &mut CompilationContext, expr: &Expr) -> Result<(), CompileError> {
    let pos = expr.pos();
    let (base, layers) = unwrap_call_chain(expr).ok_or_else(|| CompileError::Binding(format!(
        "line {}: a bare expression statement must be a sink-node call",
        pos.line
    )))?;
    let component = resolve_call_target(ctx, base)?;
    let meta = ctx
        .registry
        .get(&component)
        .ok_or_else(|| CompileError::UnknownComponent(component.clone()))?
        .clone();
    if !meta.is_sink() {
        return Err(CompileError::Binding(format!(
            "line {}: '{component}' declares output(s) and cannot be used as a bare statement; \
             assign it to a variable",
            pos.line
        )));
    }
    let parsed = assemble(&layers);
    let id = ctx.reserve_synthetic_id("node");
    let node = build_constructor_node(ctx, id, &component, &parsed, pos)?;
    ctx.push_node(node);
    Ok(())
}

/// Builds (but does not push) a fully wired [`AlgorithmNode`] for
/// `component` at `id`: extracts `timeframe`/`session`, validates the
/// remaining options against metadata, and wires feed-step inputs.
pub fn build_constructor_node(
    ctx: &mut CompilationContext,
    id: impl Into<String>,
    component: &str,
    parsed: &ParsedCall,
    pos: Pos,
) -> Result<AlgorithmNode, CompileError> {
    let id = id.into();
    let meta = ctx
        .registry
        .get(component)
        .ok_or_else(|| CompileError::UnknownComponent(component.to_string()))?
        .clone();

    let (timeframe, session, rest) = extract_special_params(&parsed.options)?;
    let resolved_options = validate_options(&id, &meta, &rest)?;

    let mut node = AlgorithmNode::new(id.clone(), component);
    node.timeframe = timeframe;
    node.session = session;
    for (k, v) in resolved_options {
        node.options.insert(k, v);
    }

    wire_inputs(ctx, &mut node, &meta, &parsed.feed_steps, pos)?;

    Ok(node)
}

/// Wires each feed step's positional and keyword arguments to the
/// component's declared input ports, inserting casts as needed (§4.3
/// "Input wiring"). Positional arguments fill non-keyword-claimed ports
/// in declared order; a variadic port absorbs every positional argument
/// offered to it across every feed step without advancing the cursor.
fn wire_inputs(
    ctx: &mut CompilationContext,
    node: &mut AlgorithmNode,
    meta: &TransformMetadata,
    feed_steps: &[super::constructor_parser::FeedStep],
    pos: Pos,
) -> Result<(), CompileError> {
    let mut keyword_claimed = std::collections::HashSet::new();
    for step in feed_steps {
        for (key, _) in &step.keywords {
            keyword_claimed.insert(key.clone());
        }
    }
    let positional_ports: Vec<_> = meta
        .inputs
        .iter()
        .filter(|p| !keyword_claimed.contains(&p.id))
        .collect();
    let mut cursor = 0usize;

    for step in feed_steps {
        for arg in &step.positional {
            if cursor >= positional_ports.len() {
                return Err(CompileError::Arity(format!(
                    "line {}: '{}' takes no further positional input",
                    pos.line, meta.id
                )));
            }
            let port = positional_ports[cursor];
            let value = compile_expr(ctx, arg)?;
            let ty = input_value_type(ctx, &value)?;
            let value = cast_if_needed(ctx, value, ty, port.data_type)?;
            node.inputs
                .entry(port.id.clone())
                .or_insert_with(Vec::new)
                .push(value);
            if !port.allow_multiple_connections {
                cursor += 1;
            }
        }
        for (key, expr) in &step.keywords {
            let port = meta.input(key).ok_or_else(|| {
                CompileError::Arity(format!(
                    "line {}: '{}' has no declared input '{key}'",
                    pos.line, meta.id
                ))
            })?;
            let value = compile_expr(ctx, expr)?;
            let ty = input_value_type(ctx, &value)?;
            let value = cast_if_needed(ctx, value, ty, port.data_type)?;
            if port.allow_multiple_connections {
                node.inputs
                    .entry(port.id.clone())
                    .or_insert_with(Vec::new)
                    .push(value);
            } else {
                node.inputs.insert(port.id.clone(), vec![value]);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{builtin_operator_registry, OptionKind, OptionSpec, Port, TransformRegistry};
    use crate::types::DataType;
    use super::super::parser::parse;

    fn test_registry() -> TransformRegistry {
        let mut library = Vec::new();
        library.push(TransformMetadata {
            id: "market_data_source".to_string(),
            category: "source".to_string(),
            inputs: vec![],
            outputs: vec![
                Port::new("o", DataType::Number),
                Port::new("c", DataType::Number),
            ],
            options: vec![],
        });
        library.push(TransformMetadata {
            id: "ema".to_string(),
            category: "indicator".to_string(),
            inputs: vec![Port::new("*", DataType::Number)],
            outputs: vec![Port::new("result", DataType::Number)],
            options: vec![OptionSpec::new("period", OptionKind::Integer).required()],
        });
        library.push(TransformMetadata {
            id: "splitter".to_string(),
            category: "utility".to_string(),
            inputs: vec![Port::new("*", DataType::Number)],
            outputs: vec![
                Port::new("a", DataType::Number),
                Port::new("b", DataType::Number),
            ],
            options: vec![],
        });
        library.push(TransformMetadata {
            id: "sink".to_string(),
            category: "sink".to_string(),
            inputs: vec![Port::new("*", DataType::Any).variadic()],
            outputs: vec![],
            options: vec![],
        });
        TransformRegistry::with_builtins(library)
    }

    #[test]
    fn named_constructor_assignment_uses_variable_name_as_node_id() {
        let registry = test_registry();
        let mut ctx = CompilationContext::new(&registry);
        let module = parse("src = market_data_source()").unwrap();
        compile_module(&mut ctx, &module).unwrap();
        assert!(ctx.node("src").is_some());
        assert_eq!(ctx.node("src").unwrap().kind, "market_data_source");
    }

    #[test]
    fn tuple_assignment_binds_each_output_by_position() {
        let registry = test_registry();
        let mut ctx = CompilationContext::new(&registry);
        let module = parse(
            "src = market_data_source()\nlo, hi = splitter()(src.c)",
        )
        .unwrap();
        compile_module(&mut ctx, &module).unwrap();
        match ctx.var_to_binding.get("lo").unwrap() {
            Binding::Handle { handle, .. } => assert_eq!(handle, "a"),
            _ => panic!("expected handle binding"),
        }
        match ctx.var_to_binding.get("hi").unwrap() {
            Binding::Handle { handle, .. } => assert_eq!(handle, "b"),
            _ => panic!("expected handle binding"),
        }
    }

    #[test]
    fn sink_statement_is_accepted_bare() {
        let registry = test_registry();
        let mut ctx = CompilationContext::new(&registry);
        let module = parse("src = market_data_source()\nsink()(src.c)").unwrap();
        compile_module(&mut ctx, &module).unwrap();
        assert_eq!(ctx.executor_count, 0);
        assert!(ctx.nodes.iter().any(|n| n.kind == "sink"));
    }

    #[test]
    fn non_sink_bare_expression_statement_is_rejected() {
        let registry = test_registry();
        let mut ctx = CompilationContext::new(&registry);
        let module = parse("src = market_data_source()\nema(period=5)(src.c)").unwrap();
        assert!(compile_module(&mut ctx, &module).is_err());
    }

    #[test]
    fn reassigning_a_bound_name_is_rejected() {
        let registry = test_registry();
        let mut ctx = CompilationContext::new(&registry);
        let module = parse("src = market_data_source()\nsrc = market_data_source()").unwrap();
        assert!(compile_module(&mut ctx, &module).is_err());
    }

    #[test]
    fn component_reference_is_callable_later() {
        let registry = test_registry();
        let mut ctx = CompilationContext::new(&registry);
        let module = parse(
            "src = market_data_source()\nf = ema\nx = f(period=10)(src.c)",
        )
        .unwrap();
        compile_module(&mut ctx, &module).unwrap();
        assert_eq!(ctx.node("x").unwrap().kind, "ema");
    }
}
