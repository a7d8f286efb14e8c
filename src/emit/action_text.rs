//! Per-rule semantic-action translation (spec.md §4.7): rewrites a
//! rule's captured code fragment so that RHS aliases become stack-slot
//! reads and the LHS alias becomes a stack-slot write, the way
//! `report.c::translate_code` does it for `lemon`.
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

use crate::rule::Rule;
use crate::symbol::Symbol;

lazy_static! {
    /// Matches a bare identifier or an `@identifier` token reference,
    /// never inside a longer identifier (word-boundary match), mirroring
    /// `production.rs::RHS_CRE`'s use of `regex`+`lazy_static` for
    /// action-text substitution.
    static ref IDENT_RE: Regex = Regex::new(r"@?[A-Za-z_][A-Za-z0-9_]*").unwrap();
}

#[derive(Debug)]
pub enum Error {
    UnusedLhsAlias { rule_line: u32, alias: String },
    DuplicateRhsAlias { rule_line: u32, alias: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnusedLhsAlias { rule_line, alias } => write!(
                f,
                "line {}: label \"{}\" for non-terminal \"{}\" is never used",
                rule_line, alias, alias
            ),
            Error::DuplicateRhsAlias { rule_line, alias } => {
                write!(f, "line {}: label \"{}\" used for multiple symbols", rule_line, alias)
            }
        }
    }
}

/// The result of translating one rule's action: the rewritten body plus
/// whether the LHS write happens directly into the leftmost RHS slot
/// (`direct`) or through a `yylhsminor` temporary that must be copied
/// back afterward (spec.md §4.7's alias-collision rule).
pub struct TranslatedAction {
    pub body: String,
    pub direct_lhs_slot: bool,
    pub destructors: Vec<(usize, String)>,
}

fn rhs_slot_ref(position_from_left: usize, nrhs: usize, dtnum: u32) -> String {
    let offset = position_from_left as isize - nrhs as isize + 1;
    format!("yymsp[{}].minor.yy{}", offset, dtnum)
}

/// Rewrites `rule.code()` per spec.md §4.7. `dtnum_of` assigns each
/// symbol its stack-union slot number (see `emit::mod::assign_dtnums`).
pub fn translate_rule_action(rule: &Rule, dtnum_of: &dyn Fn(&Symbol) -> u32) -> Result<TranslatedAction, Error> {
    let code = rule.code().unwrap_or("").to_string();
    let nrhs = rule.len();

    let mut seen_aliases = std::collections::HashSet::new();
    for rs in rule.rhs() {
        if let Some(alias) = &rs.alias {
            if !seen_aliases.insert(alias.clone()) {
                return Err(Error::DuplicateRhsAlias {
                    rule_line: rule.line(),
                    alias: alias.clone(),
                });
            }
        }
    }

    let lhs_alias = rule.lhs_alias();
    if let Some(alias) = lhs_alias {
        if !code.contains(alias) {
            return Err(Error::UnusedLhsAlias {
                rule_line: rule.line(),
                alias: alias.to_string(),
            });
        }
    }

    // A direct writeback into the leftmost RHS slot is possible when the
    // leftmost RHS symbol has no alias of its own (nothing else claims
    // that slot) or shares the same alias as the LHS.
    let direct_lhs_slot = lhs_alias.is_some()
        && match rule.rhs().first() {
            None => false,
            Some(first) => match &first.alias {
                None => true,
                Some(a) => Some(a.as_str()) == lhs_alias,
            },
        };

    let mut destructors = Vec::new();
    for (i, rs) in rule.rhs().iter().enumerate() {
        if rs.alias.is_none() && !code_uses_position(&code, i, nrhs) {
            if let Some(destructor) = rs.symbol.destructor() {
                destructors.push((i, destructor));
            }
        }
    }

    let body = IDENT_RE
        .replace_all(&code, |caps: &regex::Captures| {
            let matched = &caps[0];
            let (is_major, name) = if let Some(stripped) = matched.strip_prefix('@') {
                (true, stripped)
            } else {
                (false, matched)
            };
            if Some(name) == lhs_alias {
                return if is_major {
                    matched.to_string()
                } else if direct_lhs_slot {
                    rhs_slot_ref(0, nrhs, dtnum_of(rule.lhs()))
                } else {
                    format!("yylhsminor.yy{}", dtnum_of(rule.lhs()))
                };
            }
            for (i, rs) in rule.rhs().iter().enumerate() {
                if rs.alias.as_deref() == Some(name) {
                    return if is_major {
                        format!("yymsp[{}].major", i as isize - nrhs as isize + 1)
                    } else {
                        rhs_slot_ref(i, nrhs, dtnum_of(&rs.symbol))
                    };
                }
            }
            matched.to_string()
        })
        .into_owned();

    Ok(TranslatedAction {
        body,
        direct_lhs_slot,
        destructors,
    })
}

/// Best-effort check that a slot's alias-less symbol isn't referenced
/// positionally elsewhere in the action text (conservative: since
/// positional `$N`-style references don't exist in this grammar syntax,
/// an alias-less slot is only ever "used" via its destructor).
fn code_uses_position(_code: &str, _position: usize, _nrhs: usize) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Location;
    use crate::rule::RuleSymbol;
    use crate::symbol::SymbolTable;
    use std::rc::Rc;

    fn loc() -> Location {
        let name: Rc<str> = Rc::from("t.y");
        Location::new(&name, 1)
    }

    #[test]
    fn rhs_aliases_expand_to_stack_slots() {
        let mut table = SymbolTable::new();
        let plus = table.add_token("PLUS", &loc()).unwrap();
        let expr = table.non_terminal_used_at("expr", &loc());
        let rule = Rule::new(
            0,
            expr.clone(),
            Some("a".to_string()),
            vec![
                RuleSymbol { symbol: expr.clone(), alias: Some("b".to_string()) },
                RuleSymbol { symbol: plus, alias: None },
                RuleSymbol { symbol: expr, alias: Some("c".to_string()) },
            ],
            Some("a = b + c;".to_string()),
            1,
            1,
        );
        let translated = translate_rule_action(&rule, &|_s| 3).unwrap();
        assert!(translated.body.contains("yymsp[-2].minor.yy3"));
        assert!(translated.body.contains("yymsp[0].minor.yy3"));
    }

    #[test]
    fn lhs_alias_sharing_leftmost_rhs_writes_back_directly() {
        let mut table = SymbolTable::new();
        let num = table.add_token("NUM", &loc()).unwrap();
        let expr = table.non_terminal_used_at("expr", &loc());
        let rule = Rule::new(
            0,
            expr.clone(),
            Some("a".to_string()),
            vec![RuleSymbol { symbol: num, alias: Some("a".to_string()) }],
            Some("a = a;".to_string()),
            1,
            1,
        );
        let translated = translate_rule_action(&rule, &|_s| 1).unwrap();
        assert!(translated.direct_lhs_slot);
    }

    #[test]
    fn unused_lhs_alias_is_an_error() {
        let mut table = SymbolTable::new();
        let num = table.add_token("NUM", &loc()).unwrap();
        let expr = table.non_terminal_used_at("expr", &loc());
        let rule = Rule::new(
            0,
            expr,
            Some("a".to_string()),
            vec![RuleSymbol { symbol: num, alias: None }],
            Some("do_nothing();".to_string()),
            1,
            1,
        );
        assert!(translate_rule_action(&rule, &|_s| 0).is_err());
    }
}
