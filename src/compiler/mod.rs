//! Strategy-script compiler: parser through CSE (§4.1-§4.8).
//!
//! [`compile`] is the single public entry point a host calls with source
//! text and a [`crate::registry::TransformRegistry`]; every other item in
//! this module tree is an implementation stage it drives in order.

pub mod ast;
pub mod constructor_parser;
pub mod context;
pub mod cse;
pub mod expr_compiler;
pub mod lexer_fixups;
pub mod node_builder;
pub mod option_validator;
pub mod parser;
pub mod special_params;
pub mod type_checker;

use crate::error::CompileError;
use crate::registry::TransformRegistry;
use crate::types::CompiledProgram;

use context::CompilationContext;

/// Parses `source`, compiles it against `registry`, runs CSE, and returns
/// the topologically ordered, deduplicated program (§2 "Flow").
///
/// Aborts on the first error encountered at any stage, per §7's
/// "no partial compilation is returned" propagation policy.
pub fn compile(source: &str, registry: &TransformRegistry) -> Result<CompiledProgram, CompileError> {
    let module = parser::parse(source)?;
    let mut ctx = CompilationContext::new(registry);
    node_builder::compile_module(&mut ctx, &module)?;
    let program = ctx.into_compiled_program();
    debug_assert!(program.is_topologically_sorted());
    Ok(cse::optimize(program))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{builtin_operator_registry, OptionKind, OptionSpec, Port, TransformMetadata, TransformRegistry};
    use crate::types::DataType;

    pub(crate) fn test_registry() -> TransformRegistry {
        let mut library = Vec::new();
        library.push(TransformMetadata {
            id: "market_data_source".to_string(),
            category: "source".to_string(),
            inputs: vec![],
            outputs: vec![
                Port::new("o", DataType::Number),
                Port::new("h", DataType::Number),
                Port::new("l", DataType::Number),
                Port::new("c", DataType::Number),
                Port::new("v", DataType::Number),
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
        TransformRegistry::with_builtins(library)
    }

    #[test]
    fn simple_ema_chain_compiles_to_two_nodes_in_order() {
        let registry = test_registry();
        let program = compile(
            "src = market_data_source(timeframe=\"1D\")\nx = ema(period=20)(src.c)",
            &registry,
        )
        .unwrap();
        assert_eq!(program.nodes.len(), 2);
        assert_eq!(program.nodes[0].id, "src");
        assert_eq!(program.nodes[1].id, "x");
        assert_eq!(program.nodes[1].kind, "ema");
        assert_eq!(
            program.nodes[1].timeframe.as_ref().map(|t| t.canonical()),
            None
        );
        let period = program.nodes[1].options.get(&"period".to_string()).unwrap();
        assert_eq!(format!("{period}"), "20");
    }

    #[test]
    fn duplicate_constructor_calls_are_deduplicated() {
        let registry = test_registry();
        let program = compile(
            "src = market_data_source(timeframe=\"1D\")\n\
             a = ema(period=20)(src.c)\n\
             b = ema(period=20)(src.c)",
            &registry,
        )
        .unwrap();
        let ema_nodes: Vec<_> = program.nodes.iter().filter(|n| n.kind == "ema").collect();
        assert_eq!(ema_nodes.len(), 1);
    }

    #[test]
    fn ternary_specializes_by_branch_type() {
        let registry = test_registry();
        let program = compile("y = 1 if flag else 0", &registry);
        // `flag` is unbound here; expect a binding error rather than a panic.
        assert!(program.is_err());

        let registry = builtin_operator_registry();
        let mut ctx = CompilationContext::new(registry);
        ctx.var_to_binding.insert(
            "flag".to_string(),
            context::Binding::Handle {
                node_id: "flag".to_string(),
                handle: "result".to_string(),
            },
        );
        ctx.push_node(crate::types::AlgorithmNode::new("flag", "bool_true"));
        let module = parser::parse("y = 1 if flag else 0").unwrap();
        node_builder::compile_module(&mut ctx, &module).unwrap();
        let program = ctx.into_compiled_program();
        let y = program.node("y").unwrap();
        assert_eq!(y.kind, "boolean_select_number");
    }

    #[test]
    fn lag_subscript_produces_typed_variant() {
        let registry = test_registry();
        let program = compile(
            "src = market_data_source(timeframe=\"1D\")\nz = src.c[2]",
            &registry,
        )
        .unwrap();
        let z = program.node("z").unwrap();
        assert_eq!(z.kind, "lag_number");
        assert_eq!(format!("{}", z.options.get(&"period".to_string()).unwrap()), "2");
    }
}
