//! Expression compilation: AST `Expr` -> value handle (§4.2). The single
//! public entry point, [`compile_expr`], is called recursively by itself
//! and by `node_builder` (for constructor-call arguments) and
//! `constructor_parser`-adjacent option wiring.
//!
//! Grounded in `original_source/transforms/compiler/expression_compiler.h`'s
//! `VisitExpr`/`VisitCall`/`VisitBinOp`/`VisitCompare`/`VisitBoolOp`/
//! `VisitIfExp`/`VisitSubscript` visitor surface and its exact
//! specialization rules for lag/boolean_select/null variants.

use rust_decimal::Decimal;

use crate::error::CompileError;
use crate::registry::Port;
use crate::types::{AlgorithmNode, DataType, InputValue, OptionValue, Scalar};

use super::ast::{BinOpKind, BoolOpKind, CompareOp, ConstantValue, Expr, Pos, UnaryOpKind};
use super::constructor_parser::{assemble, component_name, unwrap_call_chain};
use super::context::{Binding, CompilationContext};
use super::node_builder::build_constructor_node;
use super::type_checker::{cast_if_needed, input_value_type};

/// Compiles `expr` into a value handle, materializing any nodes it needs
/// along the way (§4.2).
pub fn compile_expr(ctx: &mut CompilationContext, expr: &Expr) -> Result<InputValue, CompileError> {
    match expr {
        Expr::Name { id, pos } => compile_name(ctx, id, *pos),
        Expr::Constant { value, pos } => materialize_literal(ctx, value, None, *pos),
        Expr::Attribute { base, attr, pos } => compile_attribute(ctx, base, attr, *pos),
        Expr::Call { .. } => compile_call(ctx, expr),
        Expr::BinOp { left, op, right, pos } => compile_binop(ctx, *op, left, right, *pos),
        Expr::UnaryOp { op, operand, pos } => compile_unary(ctx, *op, operand, *pos),
        Expr::Compare { left, op, right, pos } => compile_compare(ctx, *op, left, right, *pos),
        Expr::BoolOp { op, values, pos } => compile_boolop(ctx, *op, values, *pos),
        Expr::IfExp { body, test, orelse, pos } => compile_ifexp(ctx, body, test, orelse, *pos),
        Expr::Subscript { value, index, pos } => compile_subscript(ctx, value, index, *pos),
        Expr::List { pos, .. } => Err(syntax_unsupported("list literal", *pos)),
        Expr::Dict { pos, .. } => Err(syntax_unsupported("dict literal", *pos)),
    }
}

fn syntax_unsupported(what: &str, pos: Pos) -> CompileError {
    CompileError::Syntax {
        message: format!("{what} is not valid outside of a structured-option constructor argument"),
        line: pos.line,
        column: pos.column,
    }
}

/// §4.2 "Bare identifier resolution": a bound variable resolves to its
/// `node.handle` form directly.
fn compile_name(ctx: &CompilationContext, id: &str, pos: Pos) -> Result<InputValue, CompileError> {
    match ctx.var_to_binding.get(id) {
        Some(Binding::Handle { node_id, handle }) => {
            Ok(InputValue::node_ref(node_id.clone(), handle.clone()))
        }
        Some(Binding::Component(_)) => Err(CompileError::Binding(format!(
            "line {}: component '{id}' must be called before it can be used as a value",
            pos.line
        ))),
        None => Err(CompileError::Binding(format!(
            "line {}: unknown variable '{id}'",
            pos.line
        ))),
    }
}

/// §4.2 "Attribute access".
fn compile_attribute(
    ctx: &mut CompilationContext,
    base: &Expr,
    attr: &str,
    pos: Pos,
) -> Result<InputValue, CompileError> {
    let node_id = match base {
        Expr::Name { id, .. } => match ctx.var_to_binding.get(id) {
            Some(Binding::Handle { node_id, .. }) => node_id.clone(),
            Some(Binding::Component(_)) => {
                return Err(CompileError::Binding(format!(
                    "line {}: cannot access attribute '{attr}' of uncalled component '{id}'",
                    pos.line
                )))
            }
            None => {
                return Err(CompileError::Binding(format!(
                    "line {}: unknown variable '{id}'",
                    pos.line
                )))
            }
        },
        other => match compile_expr(ctx, other)? {
            InputValue::NodeRef { node_id, .. } => node_id,
            InputValue::Constant(_) => {
                return Err(CompileError::Binding(format!(
                    "line {}: cannot access attribute '{attr}' of a scalar literal",
                    pos.line
                )))
            }
        },
    };
    let node = ctx
        .node(&node_id)
        .ok_or_else(|| CompileError::Binding(format!("unknown node '{node_id}'")))?;
    let meta = ctx
        .registry
        .get(&node.kind)
        .ok_or_else(|| CompileError::UnknownComponent(node.kind.clone()))?;
    if meta.output(attr).is_none() && meta.input(attr).is_none() {
        return Err(CompileError::Binding(format!(
            "line {}: '{attr}' is not a declared input or output of node '{node_id}' ({})",
            pos.line, node.kind
        )));
    }
    Ok(InputValue::node_ref(node_id, attr.to_string()))
}

/// §4.2 "Inline constructor calls" and "Bare identifier resolution"'s
/// `Component` callable path (`f = ema; f(opts)(inputs)`).
fn compile_call(ctx: &mut CompilationContext, expr: &Expr) -> Result<InputValue, CompileError> {
    let (base, layers) =
        unwrap_call_chain(expr).expect("compile_call is only reached for Expr::Call");
    let pos = expr.pos();
    let component = resolve_call_target(ctx, base)?;
    let meta = ctx
        .registry
        .get(&component)
        .ok_or_else(|| CompileError::UnknownComponent(component.clone()))?
        .clone();
    if meta.outputs.len() != 1 {
        return Err(CompileError::Binding(format!(
            "line {}: component '{component}' used inline must have exactly one output \
             (found {}); unpack it with a tuple assignment instead",
            pos.line,
            meta.outputs.len()
        )));
    }
    let parsed = assemble(&layers);
    let id = ctx.reserve_id(&component);
    let node = build_constructor_node(ctx, id, &component, &parsed, pos)?;
    let handle = meta.outputs[0].id.clone();
    let node_id = node.id.clone();
    ctx.push_node(node);
    Ok(InputValue::node_ref(node_id, handle))
}

pub(super) fn resolve_call_target(ctx: &CompilationContext, base: &Expr) -> Result<String, CompileError> {
    if let Expr::Name { id, .. } = base {
        if let Some(Binding::Component(transform_id)) = ctx.var_to_binding.get(id) {
            return Ok(transform_id.clone());
        }
    }
    component_name(base)
}

/// §4.2 "Literal materialization". `expected` drives null specialization;
/// `None` defaults to `null_number`.
fn materialize_literal(
    ctx: &mut CompilationContext,
    value: &ConstantValue,
    expected: Option<DataType>,
    pos: Pos,
) -> Result<InputValue, CompileError> {
    let (kind, scalar) = match value {
        ConstantValue::Integer(s) => (
            "number",
            Scalar::Decimal(parse_decimal(s, pos)?),
        ),
        ConstantValue::Decimal(s) => (
            "number",
            Scalar::Decimal(parse_decimal(s, pos)?),
        ),
        ConstantValue::Bool(true) => ("bool_true", Scalar::Boolean(true)),
        ConstantValue::Bool(false) => ("bool_false", Scalar::Boolean(false)),
        ConstantValue::Str(s) => ("text", Scalar::String(s.clone())),
        ConstantValue::None => {
            let kind = match expected {
                Some(DataType::Boolean) => "null_boolean",
                Some(DataType::String) => "null_string",
                Some(DataType::Timestamp) => "null_timestamp",
                _ => "null_number",
            };
            let dt = match expected {
                Some(DataType::Boolean) => DataType::Boolean,
                Some(DataType::String) => DataType::String,
                Some(DataType::Timestamp) => DataType::Timestamp,
                _ => DataType::Number,
            };
            let id = ctx.reserve_id(kind);
            let mut node = AlgorithmNode::new(id.clone(), kind);
            node.options.insert("value".to_string(), OptionValue::Scalar(Scalar::String(String::new())));
            ctx.push_node(node);
            ctx.record_output_type(&id, "result", dt);
            return Ok(InputValue::node_ref(id, "result"));
        }
    };
    let id = ctx.reserve_id(kind);
    let mut node = AlgorithmNode::new(id.clone(), kind);
    node.options
        .insert("value".to_string(), OptionValue::Scalar(scalar));
    ctx.push_node(node);
    Ok(InputValue::node_ref(id, "result"))
}

fn parse_decimal(s: &str, pos: Pos) -> Result<Decimal, CompileError> {
    s.parse::<Decimal>().map_err(|e| CompileError::Syntax {
        message: format!("invalid numeric literal '{s}': {e}"),
        line: pos.line,
        column: pos.column,
    })
}

fn binop_transform_id(op: BinOpKind) -> &'static str {
    match op {
        BinOpKind::Add => "add",
        BinOpKind::Sub => "sub",
        BinOpKind::Mul => "mul",
        BinOpKind::Div => "div",
        BinOpKind::Mod => "modulo",
        BinOpKind::Pow => "power_op",
    }
}

fn compare_transform_id(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Lt => "lt",
        CompareOp::Gt => "gt",
        CompareOp::Lte => "lte",
        CompareOp::Gte => "gte",
        CompareOp::Eq => "eq",
        CompareOp::Neq => "neq",
    }
}

/// Shared by arithmetic `BinOp` and `Compare`: §4.2 "Topological
/// placement ... except for binary operators where the parent is
/// pre-reserved at a fixed index so its id numerically precedes
/// children."
fn compile_two_input_op(
    ctx: &mut CompilationContext,
    transform_id: &'static str,
    left: &Expr,
    right: &Expr,
) -> Result<InputValue, CompileError> {
    let id = ctx.reserve_id(transform_id);
    let left_val = compile_expr(ctx, left)?;
    let right_val = compile_expr(ctx, right)?;
    let meta = ctx
        .registry
        .get(transform_id)
        .ok_or_else(|| CompileError::UnknownComponent(transform_id.to_string()))?
        .clone();
    let (in0, in1): (Port, Port) = (meta.inputs[0].clone(), meta.inputs[1].clone());
    let left_ty = input_value_type(ctx, &left_val)?;
    let right_ty = input_value_type(ctx, &right_val)?;
    let left_val = cast_if_needed(ctx, left_val, left_ty, in0.data_type)?;
    let right_val = cast_if_needed(ctx, right_val, right_ty, in1.data_type)?;
    let mut node = AlgorithmNode::new(id.clone(), transform_id);
    node.inputs.insert(in0.id, vec![left_val]);
    node.inputs.insert(in1.id, vec![right_val]);
    ctx.push_node(node);
    let out_handle = meta
        .default_output_handle()
        .ok_or_else(|| CompileError::UnknownComponent(transform_id.to_string()))?
        .to_string();
    Ok(InputValue::node_ref(id, out_handle))
}

fn compile_binop(
    ctx: &mut CompilationContext,
    op: BinOpKind,
    left: &Expr,
    right: &Expr,
    _pos: Pos,
) -> Result<InputValue, CompileError> {
    compile_two_input_op(ctx, binop_transform_id(op), left, right)
}

fn compile_compare(
    ctx: &mut CompilationContext,
    op: CompareOp,
    left: &Expr,
    right: &Expr,
    _pos: Pos,
) -> Result<InputValue, CompileError> {
    compile_two_input_op(ctx, compare_transform_id(op), left, right)
}

/// §4.2 "Unary operators".
fn compile_unary(
    ctx: &mut CompilationContext,
    op: UnaryOpKind,
    operand: &Expr,
    pos: Pos,
) -> Result<InputValue, CompileError> {
    match op {
        UnaryOpKind::Plus => compile_expr(ctx, operand),
        UnaryOpKind::Minus => {
            let id = ctx.reserve_id("mul");
            let neg_one = materialize_literal(
                ctx,
                &ConstantValue::Decimal("-1".to_string()),
                None,
                pos,
            )?;
            let operand_val = compile_expr(ctx, operand)?;
            let meta = ctx
                .registry
                .get("mul")
                .ok_or_else(|| CompileError::UnknownComponent("mul".to_string()))?
                .clone();
            let (in0, in1) = (meta.inputs[0].clone(), meta.inputs[1].clone());
            let neg_ty = input_value_type(ctx, &neg_one)?;
            let operand_ty = input_value_type(ctx, &operand_val)?;
            let neg_one = cast_if_needed(ctx, neg_one, neg_ty, in0.data_type)?;
            let operand_val = cast_if_needed(ctx, operand_val, operand_ty, in1.data_type)?;
            let mut node = AlgorithmNode::new(id.clone(), "mul");
            node.inputs.insert(in0.id, vec![neg_one]);
            node.inputs.insert(in1.id, vec![operand_val]);
            ctx.push_node(node);
            Ok(InputValue::node_ref(id, "result"))
        }
        UnaryOpKind::Not => {
            let operand_val = compile_expr(ctx, operand)?;
            let operand_ty = input_value_type(ctx, &operand_val)?;
            let operand_val = cast_if_needed(ctx, operand_val, operand_ty, DataType::Boolean)?;
            let id = ctx.reserve_id("logical_not");
            let mut node = AlgorithmNode::new(id.clone(), "logical_not");
            node.inputs.insert("operand".to_string(), vec![operand_val]);
            ctx.push_node(node);
            Ok(InputValue::node_ref(id, "result"))
        }
    }
}

/// §4.2 "Boolean operations with n >= 2 operands": lowered right-to-left
/// into a chain of binary `logical_and`/`logical_or` nodes.
fn compile_boolop(
    ctx: &mut CompilationContext,
    op: BoolOpKind,
    values: &[Expr],
    pos: Pos,
) -> Result<InputValue, CompileError> {
    let transform_id = match op {
        BoolOpKind::And => "logical_and",
        BoolOpKind::Or => "logical_or",
    };
    if values.len() < 2 {
        return Err(CompileError::Syntax {
            message: "boolean operation requires at least two operands".to_string(),
            line: pos.line,
            column: pos.column,
        });
    }
    let mut compiled = Vec::with_capacity(values.len());
    for v in values {
        let val = compile_expr(ctx, v)?;
        let ty = input_value_type(ctx, &val)?;
        compiled.push(cast_if_needed(ctx, val, ty, DataType::Boolean)?);
    }
    let mut acc = compiled.pop().expect("checked len >= 2 above");
    while let Some(next) = compiled.pop() {
        let id = ctx.reserve_id(transform_id);
        let mut node = AlgorithmNode::new(id.clone(), transform_id);
        node.inputs.insert("lhs".to_string(), vec![next]);
        node.inputs.insert("rhs".to_string(), vec![acc]);
        ctx.push_node(node);
        acc = InputValue::node_ref(id, "result");
    }
    Ok(acc)
}

/// §4.2 "Ternary `body if test else alt`".
fn compile_ifexp(
    ctx: &mut CompilationContext,
    body: &Expr,
    test: &Expr,
    orelse: &Expr,
    _pos: Pos,
) -> Result<InputValue, CompileError> {
    let test_val = compile_expr(ctx, test)?;
    let test_ty = input_value_type(ctx, &test_val)?;
    let test_val = cast_if_needed(ctx, test_val, test_ty, DataType::Boolean)?;

    let true_val = compile_expr(ctx, body)?;
    let true_ty = input_value_type(ctx, &true_val)?;
    let false_val = compile_expr(ctx, orelse)?;
    let false_ty = input_value_type(ctx, &false_val)?;

    let (kind, target) = if true_ty == DataType::String || false_ty == DataType::String {
        ("boolean_select_string", DataType::String)
    } else if true_ty == DataType::Timestamp || false_ty == DataType::Timestamp {
        ("boolean_select_timestamp", DataType::Timestamp)
    } else if true_ty == DataType::Boolean && false_ty == DataType::Boolean {
        ("boolean_select_boolean", DataType::Boolean)
    } else {
        ("boolean_select_number", DataType::Number)
    };

    let true_val = cast_if_needed(ctx, true_val, true_ty, target)?;
    let false_val = cast_if_needed(ctx, false_val, false_ty, target)?;

    let id = ctx.reserve_id(kind);
    let mut node = AlgorithmNode::new(id.clone(), kind);
    node.inputs.insert("condition".to_string(), vec![test_val]);
    node.inputs.insert("true".to_string(), vec![true_val]);
    node.inputs.insert("false".to_string(), vec![false_val]);
    ctx.push_node(node);
    Ok(InputValue::node_ref(id, "result"))
}

/// §4.2 "Subscript as lag".
fn compile_subscript(
    ctx: &mut CompilationContext,
    value: &Expr,
    index: &Expr,
    pos: Pos,
) -> Result<InputValue, CompileError> {
    let period = literal_integer_index(index)?;
    if period == 0 {
        return Err(CompileError::Syntax {
            message: "subscript lag period 0 is not valid; use the value directly".to_string(),
            line: pos.line,
            column: pos.column,
        });
    }
    let value_val = compile_expr(ctx, value)?;
    let value_ty = input_value_type(ctx, &value_val)?;
    let kind = match value_ty {
        DataType::String => "lag_string",
        DataType::Boolean => "lag_boolean",
        DataType::Timestamp => "lag_timestamp",
        _ => "lag_number",
    };
    let id = ctx.reserve_id(kind);
    let mut node = AlgorithmNode::new(id.clone(), kind);
    node.options.insert(
        "period".to_string(),
        OptionValue::Scalar(Scalar::Integer(period)),
    );
    node.inputs.insert("SLOT".to_string(), vec![value_val]);
    ctx.push_node(node);
    Ok(InputValue::node_ref(id, "result"))
}

fn literal_integer_index(index: &Expr) -> Result<i64, CompileError> {
    match index {
        Expr::Constant {
            value: ConstantValue::Integer(s),
            pos,
        } => s.parse::<i64>().map_err(|e| CompileError::Syntax {
            message: format!("invalid subscript index '{s}': {e}"),
            line: pos.line,
            column: pos.column,
        }),
        Expr::UnaryOp {
            op: UnaryOpKind::Minus,
            operand,
            pos,
        } => match operand.as_ref() {
            Expr::Constant {
                value: ConstantValue::Integer(s),
                ..
            } => s
                .parse::<i64>()
                .map(|n| -n)
                .map_err(|e| CompileError::Syntax {
                    message: format!("invalid subscript index '-{s}': {e}"),
                    line: pos.line,
                    column: pos.column,
                }),
            other => Err(CompileError::Syntax {
                message: format!("subscript index must be an integer literal, found {other:?}"),
                line: pos.line,
                column: pos.column,
            }),
        },
        other => Err(CompileError::Syntax {
            message: format!("subscript index must be an integer literal, found {other:?}"),
            line: other.pos().line,
            column: other.pos().column,
        }),
    }
}
