//! Typed AST for the strategy-script expression language (§4.1).
//!
//! Every node records 1-based line/column for diagnostics, matching
//! `original_source/transforms/compiler/parser/python_parser.h`'s AST node
//! shape. The grammar itself is restricted: no imports, no function/class
//! definitions, no control flow, chained comparisons rejected.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Module {
    pub statements: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    /// `name = expr` or `a, b = expr` (tuple target).
    Assign {
        targets: Vec<String>,
        value: Expr,
        pos: Pos,
    },
    /// A bare expression statement, used for sink-node calls.
    Expr(Expr),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOpKind {
    Plus,
    Minus,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Gt,
    Lte,
    Gte,
    Eq,
    Neq,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoolOpKind {
    And,
    Or,
}

/// A literal value as written in source, before scalar-type inference.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstantValue {
    Integer(String),
    Decimal(String),
    Bool(bool),
    Str(String),
    None,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Name {
        id: String,
        pos: Pos,
    },
    Constant {
        value: ConstantValue,
        pos: Pos,
    },
    Attribute {
        base: Box<Expr>,
        attr: String,
        pos: Pos,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<(String, Expr)>,
        pos: Pos,
    },
    BinOp {
        left: Box<Expr>,
        op: BinOpKind,
        right: Box<Expr>,
        pos: Pos,
    },
    UnaryOp {
        op: UnaryOpKind,
        operand: Box<Expr>,
        pos: Pos,
    },
    /// Single pairwise comparison; chained comparisons (`a < b < c`) are
    /// rejected at parse time (§4.1).
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
        pos: Pos,
    },
    /// Flattened n-ary boolean op (§4.1 "Boolean operations are
    /// flattened"): `a and b and c` is one node with three values.
    BoolOp {
        op: BoolOpKind,
        values: Vec<Expr>,
        pos: Pos,
    },
    /// `body if test else orelse`.
    IfExp {
        body: Box<Expr>,
        test: Box<Expr>,
        orelse: Box<Expr>,
        pos: Pos,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
        pos: Pos,
    },
    List {
        elts: Vec<Expr>,
        pos: Pos,
    },
    Dict {
        keys: Vec<Expr>,
        values: Vec<Expr>,
        pos: Pos,
    },
}

impl Expr {
    pub fn pos(&self) -> Pos {
        match self {
            Expr::Name { pos, .. }
            | Expr::Constant { pos, .. }
            | Expr::Attribute { pos, .. }
            | Expr::Call { pos, .. }
            | Expr::BinOp { pos, .. }
            | Expr::UnaryOp { pos, .. }
            | Expr::Compare { pos, .. }
            | Expr::BoolOp { pos, .. }
            | Expr::IfExp { pos, .. }
            | Expr::Subscript { pos, .. }
            | Expr::List { pos, .. }
            | Expr::Dict { pos, .. } => *pos,
        }
    }
}
