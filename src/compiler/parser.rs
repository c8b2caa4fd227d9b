//! Hand-rolled tokenizer and recursive-descent parser for the restricted
//! expression language (§4.1). Grounded in
//! `original_source/transforms/compiler/parser/python_parser.cpp` for the
//! accepted grammar, the rejected-construct list, and the diagnostic shape
//! (`PythonParseError` with message/line/column) — re-expressed as an
//! idiomatic `Result`-returning Rust parser rather than a visitor over a
//! third-party Python AST, since there is no such dependency here.

use crate::error::CompileError;

use super::ast::{
    BinOpKind, BoolOpKind, CompareOp, ConstantValue, Expr, Module, Pos, Stmt, UnaryOpKind,
};
use super::lexer_fixups::normalize_source;

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Ident(String),
    Integer(String),
    Decimal(String),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Assign,
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    Percent,
    Amp,
    Pipe,
}

type Tokline = Vec<(Tok, Pos)>;

const REJECTED_LEADING_KEYWORDS: &[&str] = &[
    "import", "from", "def", "class", "if", "for", "while", "with", "return", "lambda", "try",
    "except", "raise", "yield", "async", "await",
];

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn here(&self) -> Pos {
        Pos {
            line: self.line,
            column: self.column,
        }
    }

    /// Tokenizes the whole module into logical lines: statements split on
    /// unparenthesized newlines, blank lines and comments dropped, so the
    /// parser can detect a top-level assignment by scanning one line's
    /// tokens for a top-level `=` (§5/§4.1 "surface syntax is
    /// whitespace-insensitive except within line-separated statements").
    fn tokenize_lines(mut self) -> Result<Vec<Tokline>, CompileError> {
        let mut lines = Vec::new();
        let mut current: Tokline = Vec::new();
        let mut depth: i32 = 0;

        loop {
            let Some(c) = self.peek() else { break };
            match c {
                b' ' | b'\t' | b'\r' => {
                    self.bump();
                }
                b'#' => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                b'\n' => {
                    self.bump();
                    if depth == 0 {
                        if !current.is_empty() {
                            lines.push(std::mem::take(&mut current));
                        }
                    }
                }
                b'(' | b'[' | b'{' => {
                    depth += 1;
                    let pos = self.here();
                    self.bump();
                    current.push((
                        match c {
                            b'(' => Tok::LParen,
                            b'[' => Tok::LBracket,
                            _ => Tok::LBrace,
                        },
                        pos,
                    ));
                }
                b')' | b']' | b'}' => {
                    depth = (depth - 1).max(0);
                    let pos = self.here();
                    self.bump();
                    current.push((
                        match c {
                            b')' => Tok::RParen,
                            b']' => Tok::RBracket,
                            _ => Tok::RBrace,
                        },
                        pos,
                    ));
                }
                b',' => {
                    let pos = self.here();
                    self.bump();
                    current.push((Tok::Comma, pos));
                }
                b'.' => {
                    let pos = self.here();
                    self.bump();
                    current.push((Tok::Dot, pos));
                }
                b'"' | b'\'' => {
                    let (s, pos) = self.lex_string(c)?;
                    current.push((Tok::Str(s), pos));
                }
                b'0'..=b'9' => {
                    let (tok, pos) = self.lex_number();
                    current.push((tok, pos));
                }
                c if c == b'_' || c.is_ascii_alphabetic() => {
                    let (tok, pos) = self.lex_ident();
                    current.push((tok, pos));
                }
                b'=' => {
                    let pos = self.here();
                    self.bump();
                    if self.peek() == Some(b'=') {
                        self.bump();
                        current.push((Tok::Eq, pos));
                    } else {
                        current.push((Tok::Assign, pos));
                    }
                }
                b'!' => {
                    let pos = self.here();
                    self.bump();
                    if self.peek() == Some(b'=') {
                        self.bump();
                        current.push((Tok::Neq, pos));
                    } else {
                        return Err(syntax_err("unexpected character '!'", pos));
                    }
                }
                b'<' => {
                    let pos = self.here();
                    self.bump();
                    if self.peek() == Some(b'=') {
                        self.bump();
                        current.push((Tok::Lte, pos));
                    } else {
                        current.push((Tok::Lt, pos));
                    }
                }
                b'>' => {
                    let pos = self.here();
                    self.bump();
                    if self.peek() == Some(b'=') {
                        self.bump();
                        current.push((Tok::Gte, pos));
                    } else {
                        current.push((Tok::Gt, pos));
                    }
                }
                b'+' => {
                    let pos = self.here();
                    self.bump();
                    current.push((Tok::Plus, pos));
                }
                b'-' => {
                    let pos = self.here();
                    self.bump();
                    current.push((Tok::Minus, pos));
                }
                b'*' => {
                    let pos = self.here();
                    self.bump();
                    if self.peek() == Some(b'*') {
                        self.bump();
                        current.push((Tok::DoubleStar, pos));
                    } else {
                        current.push((Tok::Star, pos));
                    }
                }
                b'/' => {
                    let pos = self.here();
                    self.bump();
                    current.push((Tok::Slash, pos));
                }
                b'%' => {
                    let pos = self.here();
                    self.bump();
                    current.push((Tok::Percent, pos));
                }
                b'&' => {
                    let pos = self.here();
                    self.bump();
                    current.push((Tok::Amp, pos));
                }
                b'|' => {
                    let pos = self.here();
                    self.bump();
                    current.push((Tok::Pipe, pos));
                }
                b':' => {
                    let pos = self.here();
                    self.bump();
                    current.push((Tok::Colon, pos));
                }
                _ => {
                    let pos = self.here();
                    return Err(syntax_err(
                        &format!("unexpected character '{}'", c as char),
                        pos,
                    ));
                }
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
        Ok(lines)
    }

    fn lex_string(&mut self, quote: u8) -> Result<(String, Pos), CompileError> {
        let pos = self.here();
        self.bump();
        let mut s = String::new();
        loop {
            match self.peek() {
                None => return Err(syntax_err("unterminated string literal", pos)),
                Some(c) if c == quote => {
                    self.bump();
                    break;
                }
                Some(b'\\') => {
                    self.bump();
                    match self.bump() {
                        Some(b'n') => s.push('\n'),
                        Some(b't') => s.push('\t'),
                        Some(b'\\') => s.push('\\'),
                        Some(b'"') => s.push('"'),
                        Some(b'\'') => s.push('\''),
                        Some(c) => s.push(c as char),
                        None => return Err(syntax_err("unterminated string literal", pos)),
                    }
                }
                Some(c) => {
                    self.bump();
                    s.push(c as char);
                }
            }
        }
        Ok((s, pos))
    }

    fn lex_number(&mut self) -> (Tok, Pos) {
        let pos = self.here();
        let mut s = String::new();
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            s.push(self.bump().unwrap() as char);
        }
        let mut is_decimal = false;
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            is_decimal = true;
            s.push(self.bump().unwrap() as char);
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                s.push(self.bump().unwrap() as char);
            }
        }
        if is_decimal {
            (Tok::Decimal(s), pos)
        } else {
            (Tok::Integer(s), pos)
        }
    }

    fn lex_ident(&mut self) -> (Tok, Pos) {
        let pos = self.here();
        let mut s = String::new();
        while matches!(self.peek(), Some(c) if c == b'_' || c.is_ascii_alphanumeric()) {
            s.push(self.bump().unwrap() as char);
        }
        (Tok::Ident(s), pos)
    }
}

fn syntax_err(message: &str, pos: Pos) -> CompileError {
    CompileError::Syntax {
        message: message.to_string(),
        line: pos.line,
        column: pos.column,
    }
}

/// Parses normalized source text into a `Module` AST. Applies the two
/// lexer fixups first (§4.1).
pub fn parse(source: &str) -> Result<Module, CompileError> {
    let normalized = normalize_source(source);
    let lines = Lexer::new(&normalized).tokenize_lines()?;
    let mut statements = Vec::with_capacity(lines.len());
    for line in lines {
        statements.push(parse_statement(&line)?);
    }
    Ok(Module { statements })
}

fn parse_statement(line: &Tokline) -> Result<Stmt, CompileError> {
    if let Some((Tok::Ident(kw), pos)) = line.first() {
        if REJECTED_LEADING_KEYWORDS.contains(&kw.as_str()) {
            return Err(syntax_err(
                &format!("'{kw}' statements are not supported"),
                *pos,
            ));
        }
    }

    if let Some(assign_at) = find_top_level_assign(line) {
        let (lhs, rhs) = line.split_at(assign_at);
        let rhs = &rhs[1..]; // drop the '=' token itself
        let targets = parse_target_list(lhs)?;
        let mut p = Parser { toks: rhs, idx: 0 };
        let value = p.parse_expr()?;
        p.expect_end()?;
        let pos = lhs.first().map(|(_, p)| *p).unwrap_or(Pos {
            line: 0,
            column: 0,
        });
        return Ok(Stmt::Assign {
            targets,
            value,
            pos,
        });
    }

    let mut p = Parser { toks: line, idx: 0 };
    let expr = p.parse_expr()?;
    p.expect_end()?;
    Ok(Stmt::Expr(expr))
}

/// Finds a top-level (depth-0) `=` token, since depth tracking already
/// collapsed parenthesized continuations within one logical line.
fn find_top_level_assign(line: &Tokline) -> Option<usize> {
    let mut depth = 0i32;
    for (i, (tok, _)) in line.iter().enumerate() {
        match tok {
            Tok::LParen | Tok::LBracket | Tok::LBrace => depth += 1,
            Tok::RParen | Tok::RBracket | Tok::RBrace => depth -= 1,
            Tok::Assign if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_target_list(lhs: &Tokline) -> Result<Vec<String>, CompileError> {
    if lhs.is_empty() {
        return Err(syntax_err("missing assignment target", Pos { line: 0, column: 0 }));
    }
    let mut targets = Vec::new();
    let mut expect_ident = true;
    for (tok, pos) in lhs {
        if expect_ident {
            match tok {
                Tok::Ident(name) => targets.push(name.clone()),
                _ => {
                    return Err(syntax_err(
                        "only bare names are valid assignment targets",
                        *pos,
                    ))
                }
            }
        } else {
            match tok {
                Tok::Comma => {}
                _ => return Err(syntax_err("expected ',' in tuple target", *pos)),
            }
        }
        expect_ident = !expect_ident;
    }
    if expect_ident {
        // trailing comma with nothing after it
        return Err(syntax_err(
            "trailing comma in assignment target",
            lhs.last().unwrap().1,
        ));
    }
    Ok(targets)
}

struct Parser<'a> {
    toks: &'a [(Tok, Pos)],
    idx: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.idx).map(|(t, _)| t)
    }

    fn peek_pos(&self) -> Pos {
        self.toks
            .get(self.idx)
            .map(|(_, p)| *p)
            .or_else(|| self.toks.last().map(|(_, p)| *p))
            .unwrap_or(Pos { line: 0, column: 0 })
    }

    fn bump(&mut self) -> Option<(Tok, Pos)> {
        let t = self.toks.get(self.idx).cloned();
        if t.is_some() {
            self.idx += 1;
        }
        t
    }

    fn expect_end(&self) -> Result<(), CompileError> {
        if self.idx < self.toks.len() {
            return Err(syntax_err("unexpected trailing tokens", self.peek_pos()));
        }
        Ok(())
    }

    fn eat_ident(&mut self, word: &str) -> bool {
        if let Some(Tok::Ident(s)) = self.peek() {
            if s == word {
                self.bump();
                return true;
            }
        }
        false
    }

    fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expr, CompileError> {
        let body = self.parse_bool_or()?;
        if self.eat_ident("if") {
            let pos = body.pos();
            let test = self.parse_bool_or()?;
            if !self.eat_ident("else") {
                return Err(syntax_err("expected 'else' in ternary expression", self.peek_pos()));
            }
            let orelse = self.parse_ternary()?;
            return Ok(Expr::IfExp {
                body: Box::new(body),
                test: Box::new(test),
                orelse: Box::new(orelse),
                pos,
            });
        }
        Ok(body)
    }

    fn parse_bool_or(&mut self) -> Result<Expr, CompileError> {
        let first = self.parse_bool_and()?;
        let pos = first.pos();
        let mut values = vec![first];
        loop {
            let is_or = matches!(self.peek(), Some(Tok::Pipe)) || self.peeks_ident("or");
            if !is_or {
                break;
            }
            self.bump();
            values.push(self.parse_bool_and()?);
        }
        if values.len() == 1 {
            Ok(values.into_iter().next().unwrap())
        } else {
            Ok(Expr::BoolOp {
                op: BoolOpKind::Or,
                values,
                pos,
            })
        }
    }

    fn parse_bool_and(&mut self) -> Result<Expr, CompileError> {
        let first = self.parse_bool_not()?;
        let pos = first.pos();
        let mut values = vec![first];
        loop {
            let is_and = matches!(self.peek(), Some(Tok::Amp)) || self.peeks_ident("and");
            if !is_and {
                break;
            }
            self.bump();
            values.push(self.parse_bool_not()?);
        }
        if values.len() == 1 {
            Ok(values.into_iter().next().unwrap())
        } else {
            Ok(Expr::BoolOp {
                op: BoolOpKind::And,
                values,
                pos,
            })
        }
    }

    fn peeks_ident(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(s)) if s == word)
    }

    fn parse_bool_not(&mut self) -> Result<Expr, CompileError> {
        let pos = self.peek_pos();
        if self.eat_ident("not") {
            let operand = self.parse_bool_not()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOpKind::Not,
                operand: Box::new(operand),
                pos,
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, CompileError> {
        let left = self.parse_arith()?;
        let pos = left.pos();
        let op = match self.peek() {
            Some(Tok::Lt) => CompareOp::Lt,
            Some(Tok::Gt) => CompareOp::Gt,
            Some(Tok::Lte) => CompareOp::Lte,
            Some(Tok::Gte) => CompareOp::Gte,
            Some(Tok::Eq) => CompareOp::Eq,
            Some(Tok::Neq) => CompareOp::Neq,
            _ => return Ok(left),
        };
        self.bump();
        let right = self.parse_arith()?;
        let result = Expr::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
            pos,
        };
        if matches!(
            self.peek(),
            Some(Tok::Lt | Tok::Gt | Tok::Lte | Tok::Gte | Tok::Eq | Tok::Neq)
        ) {
            return Err(syntax_err(
                "chained comparisons are not supported",
                self.peek_pos(),
            ));
        }
        Ok(result)
    }

    fn parse_arith(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinOpKind::Add,
                Some(Tok::Minus) => BinOpKind::Sub,
                _ => break,
            };
            let pos = left.pos();
            self.bump();
            let right = self.parse_term()?;
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
                pos,
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinOpKind::Mul,
                Some(Tok::Slash) => BinOpKind::Div,
                Some(Tok::Percent) => BinOpKind::Mod,
                _ => break,
            };
            let pos = left.pos();
            self.bump();
            let right = self.parse_unary()?;
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
                pos,
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let pos = self.peek_pos();
        match self.peek() {
            Some(Tok::Plus) => {
                self.bump();
                let operand = self.parse_unary()?;
                Ok(Expr::UnaryOp {
                    op: UnaryOpKind::Plus,
                    operand: Box::new(operand),
                    pos,
                })
            }
            Some(Tok::Minus) => {
                self.bump();
                let operand = self.parse_unary()?;
                Ok(Expr::UnaryOp {
                    op: UnaryOpKind::Minus,
                    operand: Box::new(operand),
                    pos,
                })
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, CompileError> {
        let base = self.parse_postfix()?;
        if matches!(self.peek(), Some(Tok::DoubleStar)) {
            let pos = base.pos();
            self.bump();
            let exp = self.parse_unary()?;
            return Ok(Expr::BinOp {
                left: Box::new(base),
                op: BinOpKind::Pow,
                right: Box::new(exp),
                pos,
            });
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek() {
                Some(Tok::Dot) => {
                    let pos = expr.pos();
                    self.bump();
                    let attr = match self.bump() {
                        Some((Tok::Ident(name), _)) => name,
                        _ => return Err(syntax_err("expected attribute name after '.'", pos)),
                    };
                    expr = Expr::Attribute {
                        base: Box::new(expr),
                        attr,
                        pos,
                    };
                }
                Some(Tok::LParen) => {
                    let pos = expr.pos();
                    let (args, keywords) = self.parse_call_args()?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        keywords,
                        pos,
                    };
                }
                Some(Tok::LBracket) => {
                    let pos = expr.pos();
                    self.bump();
                    let index = self.parse_expr()?;
                    self.expect(Tok::RBracket)?;
                    expr = Expr::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                        pos,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), CompileError> {
        self.expect(Tok::LParen)?;
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        if !matches!(self.peek(), Some(Tok::RParen)) {
            loop {
                // Lookahead for `ident = expr` kwarg shape.
                if let (Some(Tok::Ident(name)), Some(Tok::Assign)) =
                    (self.toks.get(self.idx).map(|(t, _)| t), self.toks.get(self.idx + 1).map(|(t, _)| t))
                {
                    let name = name.clone();
                    self.idx += 2;
                    let value = self.parse_expr()?;
                    keywords.push((name, value));
                } else {
                    args.push(self.parse_expr()?);
                }
                if matches!(self.peek(), Some(Tok::Comma)) {
                    self.bump();
                    if matches!(self.peek(), Some(Tok::RParen)) {
                        break;
                    }
                    continue;
                }
                break;
            }
        }
        self.expect(Tok::RParen)?;
        Ok((args, keywords))
    }

    fn parse_atom(&mut self) -> Result<Expr, CompileError> {
        let pos = self.peek_pos();
        match self.bump() {
            Some((Tok::Ident(name), pos)) => match name.as_str() {
                "True" | "true" => Ok(Expr::Constant {
                    value: ConstantValue::Bool(true),
                    pos,
                }),
                "False" | "false" => Ok(Expr::Constant {
                    value: ConstantValue::Bool(false),
                    pos,
                }),
                "None" | "null" => Ok(Expr::Constant {
                    value: ConstantValue::None,
                    pos,
                }),
                _ => Ok(Expr::Name { id: name, pos }),
            },
            Some((Tok::Integer(s), pos)) => Ok(Expr::Constant {
                value: ConstantValue::Integer(s),
                pos,
            }),
            Some((Tok::Decimal(s), pos)) => Ok(Expr::Constant {
                value: ConstantValue::Decimal(s),
                pos,
            }),
            Some((Tok::Str(s), pos)) => Ok(Expr::Constant {
                value: ConstantValue::Str(s),
                pos,
            }),
            Some((Tok::LParen, _)) => {
                let inner = self.parse_expr()?;
                self.expect(Tok::RParen)?;
                Ok(inner)
            }
            Some((Tok::LBracket, pos)) => {
                let mut elts = Vec::new();
                if !matches!(self.peek(), Some(Tok::RBracket)) {
                    loop {
                        elts.push(self.parse_expr()?);
                        if matches!(self.peek(), Some(Tok::Comma)) {
                            self.bump();
                            if matches!(self.peek(), Some(Tok::RBracket)) {
                                break;
                            }
                            continue;
                        }
                        break;
                    }
                }
                self.expect(Tok::RBracket)?;
                Ok(Expr::List { elts, pos })
            }
            Some((Tok::LBrace, pos)) => {
                let mut keys = Vec::new();
                let mut values = Vec::new();
                if !matches!(self.peek(), Some(Tok::RBrace)) {
                    loop {
                        let k = self.parse_expr()?;
                        self.expect(Tok::Colon)?;
                        let v = self.parse_expr()?;
                        keys.push(k);
                        values.push(v);
                        if matches!(self.peek(), Some(Tok::Comma)) {
                            self.bump();
                            if matches!(self.peek(), Some(Tok::RBrace)) {
                                break;
                            }
                            continue;
                        }
                        break;
                    }
                }
                self.expect(Tok::RBrace)?;
                Ok(Expr::Dict { keys, values, pos })
            }
            Some((tok, pos)) => Err(syntax_err(&format!("unexpected token {tok:?}"), pos)),
            None => Err(syntax_err("unexpected end of expression", pos)),
        }
    }

    fn expect(&mut self, expected: Tok) -> Result<(), CompileError> {
        match self.bump() {
            Some((tok, _)) if tok == expected => Ok(()),
            Some((tok, pos)) => Err(syntax_err(
                &format!("expected {expected:?}, found {tok:?}"),
                pos,
            )),
            None => Err(syntax_err(
                &format!("expected {expected:?}, found end of expression"),
                self.peek_pos(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(src: &str) -> Stmt {
        let module = parse(src).unwrap();
        assert_eq!(module.statements.len(), 1);
        module.statements.into_iter().next().unwrap()
    }

    #[test]
    fn parses_single_name_assignment() {
        let stmt = parse_one("src = market_data_source(timeframe=\"1D\")");
        match stmt {
            Stmt::Assign { targets, value, .. } => {
                assert_eq!(targets, vec!["src".to_string()]);
                assert!(matches!(value, Expr::Call { .. }));
            }
            _ => panic!("expected assignment"),
        }
    }

    #[test]
    fn parses_tuple_assignment() {
        let stmt = parse_one("a, b = splitter()(x)");
        match stmt {
            Stmt::Assign { targets, .. } => assert_eq!(targets, vec!["a".to_string(), "b".to_string()]),
            _ => panic!("expected assignment"),
        }
    }

    #[test]
    fn flattens_boolean_and_chain() {
        let stmt = parse_one("y = a and b and c and d");
        match stmt {
            Stmt::Assign { value, .. } => match value {
                Expr::BoolOp { op, values, .. } => {
                    assert_eq!(op, BoolOpKind::And);
                    assert_eq!(values.len(), 4);
                }
                other => panic!("expected flattened BoolOp, got {other:?}"),
            },
            _ => panic!("expected assignment"),
        }
    }

    #[test]
    fn rejects_chained_comparisons() {
        let err = parse("y = a < b < c");
        assert!(err.is_err());
    }

    #[test]
    fn parses_ternary_and_subscript() {
        let stmt = parse_one("y = 1 if flag else 0");
        assert!(matches!(
            stmt,
            Stmt::Assign {
                value: Expr::IfExp { .. },
                ..
            }
        ));
        let stmt = parse_one("z = x[2]");
        assert!(matches!(
            stmt,
            Stmt::Assign {
                value: Expr::Subscript { .. },
                ..
            }
        ));
    }

    #[test]
    fn rejects_import_statement() {
        assert!(parse("import os").is_err());
    }

    #[test]
    fn heals_backtick_literal_before_parsing() {
        let stmt = parse_one("src = market_data_source(timeframe=`1D`)");
        assert!(matches!(stmt, Stmt::Assign { .. }));
    }
}
