//! Extraction of the two option keys every node may carry regardless of
//! its transform's declared options: `timeframe` and `session` (§4.5).
//! Grounded in `original_source/transforms/compiler/node_builder.cpp`'s
//! `ExtractSpecialParams`.

use crate::error::CompileError;
use crate::types::Timeframe;

use super::ast::{ConstantValue, Expr};

/// One of `timeframe=` / `session=`, pulled out of a constructor's keyword
/// arguments before the rest are validated as ordinary options. Accepts
/// either a string literal (`"1h"`) or a bare identifier (`1h` is not a
/// valid identifier, but `session=regular` is), matching the source forms
/// the parser already produces for both.
pub fn literal_or_identifier(expr: &Expr) -> Result<String, CompileError> {
    match expr {
        Expr::Constant {
            value: ConstantValue::Str(s),
            ..
        } => Ok(s.clone()),
        Expr::Name { id, .. } => Ok(id.clone()),
        other => Err(CompileError::Option {
            node_id: String::new(),
            component: String::new(),
            option_id: "timeframe/session".to_string(),
            message: format!("expected a string literal or bare identifier, found {other:?}"),
        }),
    }
}

/// Extracts and removes `timeframe=`/`session=` from `keywords` if present,
/// returning the parsed [`Timeframe`] and session label alongside the
/// remaining keyword arguments (§4.5: "removed from the options before
/// per-transform option validation runs").
pub fn extract_special_params(
    keywords: &[(String, Expr)],
) -> Result<(Option<Timeframe>, Option<String>, Vec<(String, Expr)>), CompileError> {
    let mut timeframe = None;
    let mut session = None;
    let mut rest = Vec::with_capacity(keywords.len());
    for (key, value) in keywords {
        match key.as_str() {
            "timeframe" => {
                let raw = literal_or_identifier(value)?;
                let tf: Timeframe = raw.parse().map_err(|e| CompileError::Option {
                    node_id: String::new(),
                    component: String::new(),
                    option_id: "timeframe".to_string(),
                    message: format!("invalid timeframe '{raw}': {e}"),
                })?;
                timeframe = Some(tf);
            }
            "session" => {
                session = Some(literal_or_identifier(value)?);
            }
            _ => rest.push((key.clone(), value.clone())),
        }
    }
    Ok((timeframe, session, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::ast::Pos;

    fn pos() -> Pos {
        Pos { line: 1, column: 1 }
    }

    #[test]
    fn pulls_timeframe_and_session_out_of_keywords() {
        let keywords = vec![
            (
                "timeframe".to_string(),
                Expr::Constant {
                    value: ConstantValue::Str("1h".to_string()),
                    pos: pos(),
                },
            ),
            (
                "session".to_string(),
                Expr::Name {
                    id: "regular".to_string(),
                    pos: pos(),
                },
            ),
            (
                "period".to_string(),
                Expr::Constant {
                    value: ConstantValue::Integer("20".to_string()),
                    pos: pos(),
                },
            ),
        ];
        let (tf, session, rest) = extract_special_params(&keywords).unwrap();
        assert_eq!(tf.unwrap().canonical(), "1h");
        assert_eq!(session.unwrap(), "regular");
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].0, "period");
    }

    #[test]
    fn absent_special_params_leave_keywords_untouched() {
        let keywords = vec![(
            "period".to_string(),
            Expr::Constant {
                value: ConstantValue::Integer("20".to_string()),
                pos: pos(),
            },
        )];
        let (tf, session, rest) = extract_special_params(&keywords).unwrap();
        assert!(tf.is_none());
        assert!(session.is_none());
        assert_eq!(rest.len(), 1);
    }
}
