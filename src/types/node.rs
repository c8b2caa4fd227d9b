use crate::sorted_vec_map::SortedVecMap;

use super::value::{OptionValue, Scalar};
use super::timeframe::Timeframe;

/// Either a reference to another node's output handle, or a literal scalar
/// wired directly as an input value (§3, §9 "polymorphic node
/// representation" — modeled as a sum type, not inheritance).
#[derive(Clone, Debug, PartialEq)]
pub enum InputValue {
    NodeRef { node_id: String, handle: String },
    Constant(Scalar),
}

impl InputValue {
    pub fn node_ref(node_id: impl Into<String>, handle: impl Into<String>) -> Self {
        InputValue::NodeRef {
            node_id: node_id.into(),
            handle: handle.into(),
        }
    }
}

/// The compiler's unit of computation (§3 "Algorithm node"). `id` is unique
/// within one compilation; `kind` names a transform metadata id.
#[derive(Clone, Debug, PartialEq)]
pub struct AlgorithmNode {
    pub id: String,
    pub kind: String,
    pub options: SortedVecMap<String, OptionValue>,
    pub inputs: SortedVecMap<String, Vec<InputValue>>,
    pub timeframe: Option<Timeframe>,
    pub session: Option<String>,
}

impl AlgorithmNode {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            options: SortedVecMap::new(),
            inputs: SortedVecMap::new(),
            timeframe: None,
            session: None,
        }
    }

    /// Scalar-literal nodes hold their value in `options["value"]` and have
    /// no inputs (§3 invariant d).
    pub fn is_scalar_literal(&self) -> bool {
        matches!(
            self.kind.as_str(),
            "number" | "bool_true" | "bool_false" | "text"
        ) || self.kind.starts_with("null_")
    }

    /// "Effective" timeframe/session used by CSE equivalence (§4.8):
    /// scalar-literal nodes are timeframe/session-agnostic.
    pub fn effective_timeframe(&self) -> Option<&Timeframe> {
        if self.is_scalar_literal() {
            None
        } else {
            self.timeframe.as_ref()
        }
    }

    pub fn effective_session(&self) -> Option<&str> {
        if self.is_scalar_literal() {
            None
        } else {
            self.session.as_deref()
        }
    }
}

/// An ordered vector of algorithm nodes plus an index, with every referenced
/// node appearing before its users (§3 "Compiled program").
#[derive(Clone, Debug, Default)]
pub struct CompiledProgram {
    pub nodes: Vec<AlgorithmNode>,
    pub index: SortedVecMap<String, usize>,
    pub executor_count: usize,
}

impl CompiledProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position_of(&self, node_id: &str) -> Option<usize> {
        self.index.get(&node_id.to_string()).copied()
    }

    pub fn node(&self, node_id: &str) -> Option<&AlgorithmNode> {
        self.position_of(node_id).map(|i| &self.nodes[i])
    }

    pub fn rebuild_index(&mut self) {
        self.index = SortedVecMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            self.index.insert(node.id.clone(), i);
        }
    }

    /// Checks the topological-order invariant from §8: every `NodeReference`
    /// in a node's inputs names a node at an earlier position.
    pub fn is_topologically_sorted(&self) -> bool {
        for (i, node) in self.nodes.iter().enumerate() {
            for values in node.inputs.values() {
                for v in values {
                    if let InputValue::NodeRef { node_id, .. } = v {
                        match self.position_of(node_id) {
                            Some(j) if j < i => {}
                            _ => return false,
                        }
                    }
                }
            }
        }
        true
    }
}
