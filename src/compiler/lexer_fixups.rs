//! Pre-parse text normalizations (§4.1): two fixups applied before
//! tokenization to heal common authoring errors, grounded in
//! `original_source/transforms/compiler/parser/python_parser.cpp`'s
//! `preprocessSource`.

use regex::Regex;
use std::sync::OnceLock;

fn backtick_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`([^`\n]*)`").unwrap())
}

fn mismatched_quote_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A double-quote opener whose body contains no further double quote,
    // closed by a single quote immediately before one of `) ] } ,`.
    RE.get_or_init(|| Regex::new(r#""([^"'\n]*)'(?=[),\]}])"#).unwrap())
}

/// Rewrites backtick string literals to double-quoted strings, and heals
/// `"...'`-style mismatched quote pairs immediately preceding `) ] } ,`.
pub fn normalize_source(src: &str) -> String {
    let rewritten_backticks = backtick_re().replace_all(src, "\"$1\"");
    let healed = mismatched_quote_re().replace_all(&rewritten_backticks, "\"$1\"");
    healed.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_backtick_strings_to_double_quotes() {
        let src = "x = `1D`";
        assert_eq!(normalize_source(src), "x = \"1D\"");
    }

    #[test]
    fn heals_mismatched_closing_quote_before_paren() {
        let src = "ema(period=20)(\"1D')";
        assert_eq!(normalize_source(src), "ema(period=20)(\"1D\")");
    }

    #[test]
    fn leaves_well_formed_strings_untouched() {
        let src = "x = ema(period=20)(src.c)";
        assert_eq!(normalize_source(src), src);
    }
}
