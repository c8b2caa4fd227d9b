//! Per-node option validation and coercion against declared
//! [`crate::registry::OptionSpec`] metadata (§4.6). Grounded in
//! `original_source/transforms/compiler/option_validator.cpp`'s
//! `ValidateAndCoerce`.

use crate::error::CompileError;
use crate::registry::{OptionKind, OptionSpec, TransformMetadata};
use crate::types::value::{OptionValue, Scalar};

use super::ast::{ConstantValue, Expr};
use super::constructor_parser::parse_structured_value;

fn option_err(node_id: &str, component: &str, option_id: &str, message: impl Into<String>) -> CompileError {
    CompileError::Option {
        node_id: node_id.to_string(),
        component: component.to_string(),
        option_id: option_id.to_string(),
        message: message.into(),
    }
}

/// Validates and coerces one constructor's keyword options (with
/// `timeframe`/`session` already removed by `special_params`) against
/// `meta`'s declared [`OptionSpec`]s, filling in defaults for any option
/// the caller omitted and rejecting unknown keys (§4.6 "every declared
/// option not supplied and not required falls back to its default;
/// unknown keys are a compile error").
pub fn validate_options(
    node_id: &str,
    meta: &TransformMetadata,
    supplied: &[(String, Expr)],
) -> Result<Vec<(String, OptionValue)>, CompileError> {
    let mut resolved = Vec::with_capacity(meta.options.len());
    let mut seen = std::collections::HashSet::new();

    for (key, expr) in supplied {
        let spec = meta.option(key).ok_or_else(|| {
            option_err(
                node_id,
                &meta.id,
                key,
                format!("'{key}' is not a declared option of '{}'", meta.id),
            )
        })?;
        let value = coerce(node_id, &meta.id, spec, expr)?;
        resolved.push((key.clone(), value));
        seen.insert(key.clone());
    }

    for spec in &meta.options {
        if seen.contains(&spec.id) {
            continue;
        }
        if spec.is_required {
            return Err(option_err(
                node_id,
                &meta.id,
                &spec.id,
                format!("missing required option '{}'", spec.id),
            ));
        }
        if let Some(default) = &spec.default {
            resolved.push((spec.id.clone(), default.clone()));
        }
    }

    Ok(resolved)
}

fn coerce(
    node_id: &str,
    component: &str,
    spec: &OptionSpec,
    expr: &Expr,
) -> Result<OptionValue, CompileError> {
    match &spec.kind {
        OptionKind::Boolean => match expr {
            Expr::Constant {
                value: ConstantValue::Bool(b),
                ..
            } => Ok(OptionValue::Scalar(Scalar::Boolean(*b))),
            other => Err(option_err(
                node_id,
                component,
                &spec.id,
                format!("expected a boolean literal, found {other:?}"),
            )),
        },
        OptionKind::Integer => {
            let n = numeric_literal(node_id, component, spec, expr)?;
            check_range(node_id, component, spec, n)?;
            let i = n as i64;
            Ok(OptionValue::Scalar(Scalar::Integer(i)))
        }
        OptionKind::Decimal | OptionKind::Number => {
            let n = numeric_literal(node_id, component, spec, expr)?;
            check_range(node_id, component, spec, n)?;
            Ok(OptionValue::Scalar(Scalar::Number(n)))
        }
        OptionKind::String => match expr {
            Expr::Constant {
                value: ConstantValue::Str(s),
                ..
            } => Ok(OptionValue::Scalar(Scalar::String(s.clone()))),
            Expr::Name { id, .. } => Ok(OptionValue::Scalar(Scalar::String(id.clone()))),
            other => Err(option_err(
                node_id,
                component,
                &spec.id,
                format!("expected a string literal, found {other:?}"),
            )),
        },
        OptionKind::Select(choices) => {
            let chosen = match expr {
                Expr::Constant {
                    value: ConstantValue::Str(s),
                    ..
                } => s.clone(),
                Expr::Name { id, .. } => id.clone(),
                other => {
                    return Err(option_err(
                        node_id,
                        component,
                        &spec.id,
                        format!("expected one of {choices:?}, found {other:?}"),
                    ))
                }
            };
            if !choices.contains(&chosen) {
                return Err(option_err(
                    node_id,
                    component,
                    &spec.id,
                    format!("'{chosen}' is not one of {choices:?}"),
                ));
            }
            Ok(OptionValue::Select(chosen))
        }
        OptionKind::Structured(schema_name) => {
            let value = parse_structured_value(expr).map_err(|e| {
                option_err(
                    node_id,
                    component,
                    &spec.id,
                    format!("invalid {schema_name} value: {e}"),
                )
            })?;
            Ok(OptionValue::Structured(value))
        }
    }
}

fn numeric_literal(
    node_id: &str,
    component: &str,
    spec: &OptionSpec,
    expr: &Expr,
) -> Result<f64, CompileError> {
    let (text, negate) = match expr {
        Expr::UnaryOp {
            op: super::ast::UnaryOpKind::Minus,
            operand,
            ..
        } => (operand.as_ref(), true),
        other => (other, false),
    };
    let raw = match text {
        Expr::Constant {
            value: ConstantValue::Integer(s) | ConstantValue::Decimal(s),
            ..
        } => s,
        other => {
            return Err(option_err(
                node_id,
                component,
                &spec.id,
                format!("expected a numeric literal, found {other:?}"),
            ))
        }
    };
    let n: f64 = raw.parse().map_err(|_| {
        option_err(
            node_id,
            component,
            &spec.id,
            format!("invalid numeric literal '{raw}'"),
        )
    })?;
    Ok(if negate { -n } else { n })
}

fn check_range(
    node_id: &str,
    component: &str,
    spec: &OptionSpec,
    n: f64,
) -> Result<(), CompileError> {
    if let (Some(min), Some(max)) = (spec.min, spec.max) {
        if n < min || n > max {
            return Err(option_err(
                node_id,
                component,
                &spec.id,
                format!("{n} is outside of the allowed range [{min}, {max}]"),
            ));
        }
    }
    if let Some(step) = spec.step_size {
        if let Some(min) = spec.min {
            let steps = (n - min) / step;
            if (steps - steps.round()).abs() > 1e-9 {
                return Err(option_err(
                    node_id,
                    component,
                    &spec.id,
                    format!("{n} does not land on a step of {step} from {min}"),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Port;
    use crate::types::DataType;
    use super::super::ast::Pos;

    fn pos() -> Pos {
        Pos { line: 1, column: 1 }
    }

    fn ema_meta() -> TransformMetadata {
        TransformMetadata {
            id: "ema".to_string(),
            category: "indicator".to_string(),
            inputs: vec![Port::new("*", DataType::Number)],
            outputs: vec![Port::new("result", DataType::Number)],
            options: vec![
                OptionSpec::new("period", OptionKind::Integer).required().range(1.0, 500.0),
                OptionSpec::new("adjust", OptionKind::Boolean)
                    .default_value(OptionValue::Scalar(Scalar::Boolean(true))),
            ],
        }
    }

    #[test]
    fn missing_required_option_is_an_error() {
        let meta = ema_meta();
        let err = validate_options("x", &meta, &[]).unwrap_err();
        assert!(matches!(err, CompileError::Option { .. }));
    }

    #[test]
    fn defaults_fill_in_unspecified_optional_options() {
        let meta = ema_meta();
        let supplied = vec![(
            "period".to_string(),
            Expr::Constant {
                value: ConstantValue::Integer("20".to_string()),
                pos: pos(),
            },
        )];
        let resolved = validate_options("x", &meta, &supplied).unwrap();
        assert_eq!(resolved.len(), 2);
        assert!(resolved.iter().any(|(k, v)| k == "adjust" && *v == OptionValue::Scalar(Scalar::Boolean(true))));
    }

    #[test]
    fn out_of_range_integer_is_rejected() {
        let meta = ema_meta();
        let supplied = vec![(
            "period".to_string(),
            Expr::Constant {
                value: ConstantValue::Integer("5000".to_string()),
                pos: pos(),
            },
        )];
        assert!(validate_options("x", &meta, &supplied).is_err());
    }

    #[test]
    fn unknown_option_key_is_rejected() {
        let meta = ema_meta();
        let supplied = vec![(
            "bogus".to_string(),
            Expr::Constant {
                value: ConstantValue::Integer("1".to_string()),
                pos: pos(),
            },
        )];
        assert!(validate_options("x", &meta, &supplied).is_err());
    }
}
