//! Constructor-call parsing: flattening chained constructor calls into an
//! options layer plus feed steps (§4.3 "Input wiring"), and parsing
//! structured-typed option values (`Time`, `EventMarkerSchema`,
//! `SqlStatement`, `TableReportSchema`, `CardColumnSchema`) into a
//! generic JSON tree for schema-typed deserialization (§4.7). Grounded in
//! `original_source/transforms/compiler/constructor_parser.cpp`'s
//! `IsConstructorCall`/`ParseConstructorAndFeeds`/`ParseLiteralOrPrimitive`.

use serde_json::{json, Map, Value};

use crate::error::CompileError;

use super::ast::{ConstantValue, Expr, UnaryOpKind};

/// One call layer `(args)` in a chain `f(opts)(feed1)(feed2)`.
pub struct CallLayer<'e> {
    pub args: &'e [Expr],
    pub keywords: &'e [(String, Expr)],
}

/// Unwraps a right-nested `Call` chain into its ultimate callee expression
/// plus the call layers, outermost-last becoming last-in-vector
/// (base-to-tip order). Returns `None` if `expr` is not a `Call` at all.
pub fn unwrap_call_chain(expr: &Expr) -> Option<(&Expr, Vec<CallLayer<'_>>)> {
    let mut layers = Vec::new();
    let mut cur = expr;
    loop {
        match cur {
            Expr::Call {
                func,
                args,
                keywords,
                ..
            } => {
                layers.push(CallLayer { args, keywords });
                cur = func;
            }
            _ => break,
        }
    }
    if layers.is_empty() {
        return None;
    }
    layers.reverse();
    Some((cur, layers))
}

/// The callee at the base of a call chain must be a bare component name
/// (§4.2 "Inline constructor calls"; constructors are never called off an
/// arbitrary expression).
pub fn component_name(base: &Expr) -> Result<String, CompileError> {
    match base {
        Expr::Name { id, .. } => Ok(id.clone()),
        other => Err(CompileError::Binding(format!(
            "constructor call target must be a bare component name, found {other:?}"
        ))),
    }
}

#[derive(Clone, Debug, Default)]
pub struct FeedStep {
    pub positional: Vec<Expr>,
    pub keywords: Vec<(String, Expr)>,
}

#[derive(Clone, Debug, Default)]
pub struct ParsedCall {
    /// First layer's keyword arguments (§4.3 "Constructor keyword
    /// arguments become options").
    pub options: Vec<(String, Expr)>,
    pub feed_steps: Vec<FeedStep>,
}

/// Flattens call layers into an options layer and an ordered list of feed
/// steps. Positional arguments are never options (options are always
/// named), so the traditional "shorthand" rule — a single call whose
/// component declares no options is read as feed inputs rather than an
/// options call — falls out automatically here: a lone layer's positional
/// args become its own feed step regardless of how many options the
/// layer's keywords set, and a lone layer with only keywords contributes
/// no feed step at all. This is a deliberate, more uniform re-derivation
/// of the shorthand rule (see DESIGN.md), not a literal transcription.
pub fn assemble(layers: &[CallLayer]) -> ParsedCall {
    if layers.is_empty() {
        return ParsedCall::default();
    }
    let options = layers[0].keywords.to_vec();
    let mut feed_steps = Vec::new();
    if !layers[0].args.is_empty() {
        feed_steps.push(FeedStep {
            positional: layers[0].args.to_vec(),
            keywords: Vec::new(),
        });
    }
    for layer in &layers[1..] {
        feed_steps.push(FeedStep {
            positional: layer.args.to_vec(),
            keywords: layer.keywords.to_vec(),
        });
    }
    ParsedCall {
        options,
        feed_steps,
    }
}

/// Parses an option value expression into the generic JSON tree consumed
/// by structured-option deserialization (§4.7). Inline dict literals used
/// directly as an option value are rejected; a nested constructor call is
/// tagged with `_type` so SLOT resolution and deserialization can later
/// recognize which schema it came from.
pub fn parse_structured_value(expr: &Expr) -> Result<Value, String> {
    match expr {
        Expr::Dict { .. } => Err(
            "inline dict literals are not a valid option value; use the matching constructor \
             (e.g. EventMarkerSchema(...), TableReportSchema(...))"
                .to_string(),
        ),
        Expr::Call {
            func,
            args,
            keywords,
            ..
        } => {
            let name = match func.as_ref() {
                Expr::Name { id, .. } => id.clone(),
                other => {
                    return Err(format!(
                        "structured-option constructor target must be a bare name, found {other:?}"
                    ))
                }
            };
            let mut obj = Map::new();
            obj.insert("_type".to_string(), Value::String(name));
            for (i, a) in args.iter().enumerate() {
                obj.insert(format!("_arg{i}"), parse_structured_value(a)?);
            }
            for (k, v) in keywords {
                obj.insert(k.clone(), parse_structured_value(v)?);
            }
            Ok(Value::Object(obj))
        }
        Expr::List { elts, .. } => Ok(Value::Array(
            elts.iter()
                .map(parse_structured_value)
                .collect::<Result<_, _>>()?,
        )),
        Expr::Constant { value, .. } => Ok(constant_to_json(value)),
        Expr::Name { id, .. } => Ok(Value::String(id.clone())),
        Expr::UnaryOp {
            op: UnaryOpKind::Minus,
            operand,
            ..
        } => match operand.as_ref() {
            Expr::Constant {
                value: ConstantValue::Integer(s),
                ..
            } => Ok(json!(-s.parse::<i64>().map_err(|e| e.to_string())?)),
            Expr::Constant {
                value: ConstantValue::Decimal(s),
                ..
            } => Ok(json!(-s.parse::<f64>().map_err(|e| e.to_string())?)),
            other => Err(format!("unsupported structured-option expression: {other:?}")),
        },
        other => Err(format!("unsupported structured-option expression: {other:?}")),
    }
}

fn constant_to_json(value: &ConstantValue) -> Value {
    match value {
        ConstantValue::Integer(s) => s
            .parse::<i64>()
            .map(|i| json!(i))
            .unwrap_or_else(|_| json!(s)),
        ConstantValue::Decimal(s) => s
            .parse::<f64>()
            .map(|f| json!(f))
            .unwrap_or_else(|_| json!(s)),
        ConstantValue::Bool(b) => json!(b),
        ConstantValue::Str(s) => json!(s),
        ConstantValue::None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inline_dict_literal() {
        let expr = Expr::Dict {
            keys: vec![],
            values: vec![],
            pos: super::super::ast::Pos { line: 1, column: 1 },
        };
        assert!(parse_structured_value(&expr).is_err());
    }

    #[test]
    fn tags_nested_constructor_calls_with_type() {
        let expr = Expr::Call {
            func: Box::new(Expr::Name {
                id: "Time".to_string(),
                pos: super::super::ast::Pos { line: 1, column: 1 },
            }),
            args: vec![],
            keywords: vec![(
                "hour".to_string(),
                Expr::Constant {
                    value: ConstantValue::Integer("9".to_string()),
                    pos: super::super::ast::Pos { line: 1, column: 1 },
                },
            )],
            pos: super::super::ast::Pos { line: 1, column: 1 },
        };
        let value = parse_structured_value(&expr).unwrap();
        assert_eq!(value["_type"], "Time");
        assert_eq!(value["hour"], 9);
    }
}
