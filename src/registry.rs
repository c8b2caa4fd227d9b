//! Transform metadata registry.
//!
//! Treated as an immutable, process-wide table populated once (§9 "Global
//! transform metadata"). Grounded in `original_source/data/factory.h/.cpp`'s
//! registration pattern; re-expressed as a `HashMap` behind a `OnceLock`
//! rather than a singleton class, since Rust has no class statics.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::types::DataType;

/// A single named input or output of a transform (§3).
#[derive(Clone, Debug, PartialEq)]
pub struct Port {
    /// Already rewritten: `*` -> `SLOT`, `*0` -> `SLOT0`, etc.
    pub id: String,
    pub data_type: DataType,
    pub allow_multiple_connections: bool,
}

impl Port {
    pub fn new(id: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: rewrite_positional_id(&id.into()),
            data_type,
            allow_multiple_connections: false,
        }
    }

    pub fn variadic(mut self) -> Self {
        self.allow_multiple_connections = true;
        self
    }
}

/// Rewrites `*`, `*0`, `*1`, ... to `SLOT`, `SLOT0`, `SLOT1`, ... (§3).
pub fn rewrite_positional_id(id: &str) -> String {
    if let Some(rest) = id.strip_prefix('*') {
        format!("SLOT{rest}")
    } else {
        id.to_string()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum OptionKind {
    Boolean,
    Integer,
    Decimal,
    Number,
    String,
    Select(Vec<String>),
    Structured(&'static str),
}

#[derive(Clone, Debug)]
pub struct OptionSpec {
    pub id: String,
    pub kind: OptionKind,
    pub default: Option<crate::types::value::OptionValue>,
    pub is_required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step_size: Option<f64>,
}

impl OptionSpec {
    pub fn new(id: impl Into<String>, kind: OptionKind) -> Self {
        Self {
            id: id.into(),
            kind,
            default: None,
            is_required: false,
            min: None,
            max: None,
            step_size: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn default_value(mut self, value: crate::types::value::OptionValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn step(mut self, step_size: f64) -> Self {
        self.step_size = Some(step_size);
        self
    }
}

/// Static, library-defined description of one transform (§3 "Transform
/// metadata").
#[derive(Clone, Debug)]
pub struct TransformMetadata {
    pub id: String,
    pub category: String,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub options: Vec<OptionSpec>,
}

impl TransformMetadata {
    pub fn is_sink(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn output(&self, handle: &str) -> Option<&Port> {
        self.outputs.iter().find(|o| o.id == handle)
    }

    pub fn input(&self, handle: &str) -> Option<&Port> {
        self.inputs.iter().find(|i| i.id == handle)
    }

    pub fn option(&self, id: &str) -> Option<&OptionSpec> {
        self.options.iter().find(|o| o.id == id)
    }

    /// The handle used when a caller does not name an output explicitly:
    /// `"result"` if declared, else the first declared output's id.
    pub fn default_output_handle(&self) -> Option<&str> {
        if self.outputs.iter().any(|o| o.id == "result") {
            Some("result")
        } else {
            self.outputs.first().map(|o| o.id.as_str())
        }
    }
}

/// Read-only lookup over the registered transform metadata (§6 "Transform
/// registry").
pub struct TransformRegistry {
    by_id: HashMap<String, TransformMetadata>,
}

impl TransformRegistry {
    pub fn new(transforms: impl IntoIterator<Item = TransformMetadata>) -> Self {
        Self {
            by_id: transforms.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&TransformMetadata> {
        self.by_id.get(id)
    }

    pub fn has(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransformMetadata> {
        self.by_id.values()
    }

    /// Combines the compiler's built-in operator/cast/literal transforms
    /// with library-defined metadata supplied by the external transform
    /// registry collaborator (§1, §6 "Transform registry"). The compiler
    /// only ever sees one `TransformRegistry`, so a host wires its own
    /// transform library's metadata through this constructor alongside
    /// `builtin_operator_registry()`.
    pub fn with_builtins(library: impl IntoIterator<Item = TransformMetadata>) -> Self {
        Self::new(
            builtin_operator_registry()
                .iter()
                .cloned()
                .chain(library),
        )
    }
}

static BUILTIN_OPERATORS: OnceLock<TransformRegistry> = OnceLock::new();

/// The operator/cast/literal transforms the compiler itself materializes
/// (arithmetic, comparisons, casts, lag/boolean_select/null variants, and
/// scalar literals). The numerics behind these are delegated to the
/// external transform library (§1); only their input/output/option shape
/// is needed by the compiler, so this registry is intentionally small and
/// synthesized rather than loaded from an external source.
pub fn builtin_operator_registry() -> &'static TransformRegistry {
    BUILTIN_OPERATORS.get_or_init(|| {
        let mut transforms = Vec::new();

        let binary = |id: &str, dt: DataType| TransformMetadata {
            id: id.to_string(),
            category: "operator".to_string(),
            inputs: vec![
                Port::new("lhs", DataType::Any),
                Port::new("rhs", DataType::Any),
            ],
            outputs: vec![Port::new("result", dt)],
            options: vec![],
        };
        for (id, dt) in [
            ("add", DataType::Decimal),
            ("sub", DataType::Decimal),
            ("mul", DataType::Decimal),
            ("div", DataType::Decimal),
            ("modulo", DataType::Decimal),
            ("power_op", DataType::Decimal),
            ("lt", DataType::Boolean),
            ("gt", DataType::Boolean),
            ("lte", DataType::Boolean),
            ("gte", DataType::Boolean),
            ("eq", DataType::Boolean),
            ("neq", DataType::Boolean),
        ] {
            transforms.push(binary(id, dt));
        }

        // Boolean-operand-only, unlike the Any-typed arithmetic/comparison
        // operators above: §4.2 "Operands are first coerced to Boolean"
        // before a logical_and/logical_or chain link is wired.
        for id in ["logical_and", "logical_or"] {
            transforms.push(TransformMetadata {
                id: id.to_string(),
                category: "operator".to_string(),
                inputs: vec![
                    Port::new("lhs", DataType::Boolean),
                    Port::new("rhs", DataType::Boolean),
                ],
                outputs: vec![Port::new("result", DataType::Boolean)],
                options: vec![],
            });
        }

        transforms.push(TransformMetadata {
            id: "logical_not".to_string(),
            category: "operator".to_string(),
            inputs: vec![Port::new("operand", DataType::Boolean)],
            outputs: vec![Port::new("result", DataType::Boolean)],
            options: vec![],
        });

        for (kind, dt) in [
            ("number", DataType::Decimal),
            ("bool_true", DataType::Boolean),
            ("bool_false", DataType::Boolean),
            ("text", DataType::String),
            ("null_number", DataType::Number),
            ("null_boolean", DataType::Boolean),
            ("null_string", DataType::String),
            ("null_timestamp", DataType::Timestamp),
        ] {
            transforms.push(TransformMetadata {
                id: kind.to_string(),
                category: "literal".to_string(),
                inputs: vec![],
                outputs: vec![Port::new("result", dt)],
                options: vec![OptionSpec::new("value", OptionKind::String)],
            });
        }

        for (kind, out_dt) in [
            ("lag_number", DataType::Number),
            ("lag_string", DataType::String),
            ("lag_boolean", DataType::Boolean),
            ("lag_timestamp", DataType::Timestamp),
        ] {
            transforms.push(TransformMetadata {
                id: kind.to_string(),
                category: "operator".to_string(),
                inputs: vec![Port::new("*", DataType::Any)],
                outputs: vec![Port::new("result", out_dt)],
                options: vec![OptionSpec::new("period", OptionKind::Integer).required()],
            });
        }

        for (kind, out_dt) in [
            ("boolean_select_number", DataType::Number),
            ("boolean_select_string", DataType::String),
            ("boolean_select_boolean", DataType::Boolean),
            ("boolean_select_timestamp", DataType::Timestamp),
        ] {
            transforms.push(TransformMetadata {
                id: kind.to_string(),
                category: "operator".to_string(),
                inputs: vec![
                    Port::new("condition", DataType::Boolean),
                    Port::new("true", DataType::Any),
                    Port::new("false", DataType::Any),
                ],
                outputs: vec![Port::new("result", out_dt)],
                options: vec![],
            });
        }

        for target in ["integer", "decimal", "number", "boolean", "string", "timestamp"] {
            let dt = match target {
                "integer" => DataType::Integer,
                "decimal" => DataType::Decimal,
                "number" => DataType::Number,
                "boolean" => DataType::Boolean,
                "string" => DataType::String,
                _ => DataType::Timestamp,
            };
            transforms.push(TransformMetadata {
                id: format!("static_cast_to_{target}"),
                category: "cast".to_string(),
                // Cast nodes wire their single input via the `SLOT` handle,
                // matching the convention the rest of the registry uses for
                // positional inputs (`type_checker.cpp`'s `InsertStaticCast`
                // writes `cast_node.inputs["SLOT"]`).
                inputs: vec![Port::new("*", DataType::Any)],
                outputs: vec![Port::new("result", dt)],
                options: vec![],
            });
        }
        transforms.push(TransformMetadata {
            id: "stringify".to_string(),
            category: "cast".to_string(),
            inputs: vec![Port::new("*", DataType::Any)],
            outputs: vec![Port::new("result", DataType::String)],
            options: vec![],
        });

        transforms.push(TransformMetadata {
            id: "trade_signal_executor".to_string(),
            category: "sink".to_string(),
            inputs: vec![Port::new("*", DataType::Any).variadic()],
            outputs: vec![],
            options: vec![],
        });

        TransformRegistry::new(transforms)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_ids_are_rewritten_to_slot() {
        assert_eq!(rewrite_positional_id("*"), "SLOT");
        assert_eq!(rewrite_positional_id("*0"), "SLOT0");
        assert_eq!(rewrite_positional_id("named"), "named");
    }

    #[test]
    fn builtin_registry_knows_binary_operators() {
        let reg = builtin_operator_registry();
        assert!(reg.has("add"));
        assert!(reg.has("lag_number"));
        assert!(reg.get("trade_signal_executor").unwrap().is_sink());
    }
}
