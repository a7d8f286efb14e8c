use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::symbol::{Associativity, Symbol};

/// One symbol on a rule's right-hand side, together with the alias
/// name (if any) it was bound to for use in the semantic action, e.g.
/// the `B` in `expr(A) ::= expr(B) PLUS expr(C).`
#[derive(Debug, Clone)]
pub struct RuleSymbol {
    pub symbol: Symbol,
    pub alias: Option<String>,
}

#[derive(Debug)]
struct RuleData {
    /// Position in declaration order. Rules that carry a semantic
    /// action are renumbered to the front of this ordering by the
    /// emitter (see spec's "code-carrying rules get smallest iRule
    /// values" invariant); this field always holds the *declaration*
    /// index, the emitter keeps a separate remapping.
    index: u32,
    lhs: Symbol,
    lhs_alias: Option<String>,
    rhs: Vec<RuleSymbol>,
    /// Explicit `[TAG]` precedence override, or the rule's inherited
    /// precedence computed by `FindRulePrecedences` once that pass has
    /// run.
    precedence: std::cell::Cell<Option<(Associativity, i32)>>,
    code: Option<String>,
    code_line: u32,
    line: u32,
    /// Assigned by the builder once rule numbering runs: code-carrying
    /// rules get the smallest values (spec.md §3's rule-numbering
    /// invariant), so a downstream reduce-action jump table can be
    /// smaller. `None` before that pass.
    final_index: std::cell::Cell<Option<u32>>,
}

/// A grammar production, shared via `Rc` so that `Configuration`
/// values (rule, dot-position pairs) stay cheap to copy around item
/// sets, matching the teacher's `production.rs::Production` handle.
#[derive(Debug, Clone)]
pub struct Rule(Rc<RuleData>);

impl Rule {
    pub fn new(
        index: u32,
        lhs: Symbol,
        lhs_alias: Option<String>,
        rhs: Vec<RuleSymbol>,
        code: Option<String>,
        code_line: u32,
        line: u32,
    ) -> Self {
        Rule(Rc::new(RuleData {
            index,
            lhs,
            lhs_alias,
            rhs,
            precedence: std::cell::Cell::new(None),
            code,
            code_line,
            line,
            final_index: std::cell::Cell::new(None),
        }))
    }

    pub fn index(&self) -> usize {
        self.0.index as usize
    }

    /// `true` for the literal `{NEVER-REDUCE` marker (spec.md §4.2,
    /// §9 Open Questions): the rule's reduce action must never be
    /// chosen, even though it carries a (never fully captured) code
    /// fragment.
    pub fn never_reduce(&self) -> bool {
        self.0.code.as_deref() == Some("{NEVER-REDUCE")
    }

    /// `true` if the rule has a real semantic action to emit (i.e. a
    /// code fragment other than the `{NEVER-REDUCE` marker).
    pub fn has_code(&self) -> bool {
        matches!(self.0.code.as_deref(), Some(c) if c != "{NEVER-REDUCE")
    }

    /// The rule number used for emission (`iRule`), assigned once by
    /// `assign_final_indices`. Panics if asked before that pass runs.
    pub fn final_index(&self) -> u32 {
        self.0
            .final_index
            .get()
            .expect("final_index read before rule numbering ran")
    }

    pub(crate) fn set_final_index(&self, index: u32) {
        self.0.final_index.set(Some(index));
    }

    pub fn lhs(&self) -> &Symbol {
        &self.0.lhs
    }

    pub fn lhs_alias(&self) -> Option<&str> {
        self.0.lhs_alias.as_deref()
    }

    pub fn rhs(&self) -> &[RuleSymbol] {
        &self.0.rhs
    }

    pub fn len(&self) -> usize {
        self.0.rhs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.rhs.is_empty()
    }

    pub fn code(&self) -> Option<&str> {
        self.0.code.as_deref()
    }

    pub fn code_line(&self) -> u32 {
        self.0.code_line
    }

    pub fn line(&self) -> u32 {
        self.0.line
    }

    pub fn precedence(&self) -> Option<(Associativity, i32)> {
        self.0.precedence.get()
    }

    pub fn set_precedence(&self, associativity: Associativity, precedence: i32) {
        self.0.precedence.set(Some((associativity, precedence)));
    }

    /// `FindRulePrecedences`: a rule's precedence, absent an explicit
    /// `[TAG]`, is that of the first (leftmost) RHS terminal that has a
    /// declared precedence, scanning left to right.
    pub fn compute_default_precedence(&self) {
        if self.0.precedence.get().is_some() {
            return;
        }
        for rule_symbol in self.0.rhs.iter() {
            if rule_symbol.symbol.is_terminal() {
                if let Some(precedence) = rule_symbol.symbol.precedence() {
                    self.0
                        .precedence
                        .set(Some((rule_symbol.symbol.associativity(), precedence)));
                    return;
                }
            }
        }
    }
}

/// Assigns `iRule` values: every rule with a real semantic action
/// first (in input order), then every code-less rule (in input
/// order), per spec.md §3's rule-numbering invariant. Must run once,
/// after the frontend has finished and before the packer/emitter read
/// `final_index()`.
pub fn assign_final_indices(rules: &[Rule]) {
    let mut next = 0u32;
    for rule in rules.iter().filter(|r| r.has_code()) {
        rule.set_final_index(next);
        next += 1;
    }
    for rule in rules.iter().filter(|r| !r.has_code()) {
        rule.set_final_index(next);
        next += 1;
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Rule {}

impl PartialOrd for Rule {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rule {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index().cmp(&other.index())
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ::=", self.lhs().name())?;
        for rule_symbol in self.rhs() {
            write!(f, " {}", rule_symbol.symbol.name())?;
        }
        write!(f, ".")
    }
}

/// A grammar item: a rule together with a dot position, e.g.
/// `expr ::= expr PLUS . expr`. Cheap to copy since `Rule` is an `Rc`
/// handle; equality and ordering are by `(rule index, dot)`, matching
/// `production.rs::GrammarItemKey`.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub rule: Rule,
    pub dot: usize,
}

impl Configuration {
    pub fn new(rule: Rule) -> Self {
        Self { rule, dot: 0 }
    }

    pub fn is_kernel_item(&self, is_start_rule: bool) -> bool {
        self.dot > 0 || is_start_rule
    }

    pub fn is_reducible(&self) -> bool {
        self.dot >= self.rule.len()
    }

    pub fn next_symbol(&self) -> Option<&Symbol> {
        self.rule.rhs().get(self.dot).map(|rs| &rs.symbol)
    }

    pub fn is_closable(&self) -> bool {
        matches!(self.next_symbol(), Some(s) if s.is_non_terminal())
    }

    pub fn shifted(&self) -> Self {
        Self {
            rule: self.rule.clone(),
            dot: self.dot + 1,
        }
    }

    /// The symbols following the dot, used to compute FIRST-of-tail
    /// when propagating lookahead sets during closure.
    pub fn rhs_tail(&self) -> &[RuleSymbol] {
        &self.rule.rhs()[self.dot.min(self.rule.len())..]
    }
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.rule == other.rule && self.dot == other.dot
    }
}

impl Eq for Configuration {}

impl PartialOrd for Configuration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Configuration {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rule
            .index()
            .cmp(&other.rule.index())
            .then(self.dot.cmp(&other.dot))
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ::=", self.rule.lhs().name())?;
        for (i, rule_symbol) in self.rule.rhs().iter().enumerate() {
            if i == self.dot {
                write!(f, " .")?;
            }
            write!(f, " {}", rule_symbol.symbol.name())?;
        }
        if self.dot == self.rule.len() {
            write!(f, " .")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Location;
    use crate::symbol::SymbolTable;

    fn make_rule() -> Rule {
        let mut table = SymbolTable::new();
        let name: Rc<str> = Rc::from("t.y");
        let loc = Location::new(&name, 1);
        let plus = table.add_token("PLUS", &loc).unwrap();
        let expr = table.non_terminal_used_at("expr", &loc);
        Rule::new(
            0,
            expr.clone(),
            None,
            vec![
                RuleSymbol {
                    symbol: expr.clone(),
                    alias: Some("a".to_string()),
                },
                RuleSymbol {
                    symbol: plus,
                    alias: None,
                },
                RuleSymbol {
                    symbol: expr,
                    alias: Some("b".to_string()),
                },
            ],
            Some("$$ = $a + $b;".to_string()),
            1,
            1,
        )
    }

    #[test]
    fn configuration_advances_the_dot() {
        let rule = make_rule();
        let item = Configuration::new(rule);
        assert!(!item.is_reducible());
        let item = item.shifted().shifted().shifted();
        assert!(item.is_reducible());
        assert!(item.next_symbol().is_none());
    }

    #[test]
    fn closable_only_before_a_non_terminal() {
        let rule = make_rule();
        let item = Configuration::new(rule);
        assert!(item.is_closable());
        let item = item.shifted();
        assert!(!item.is_closable());
    }

    #[test]
    fn final_indices_put_code_carrying_rules_first() {
        let mut table = SymbolTable::new();
        let name: Rc<str> = Rc::from("t.y");
        let loc = Location::new(&name, 1);
        let expr = table.non_terminal_used_at("expr", &loc);
        let num = table.add_token("NUM", &loc).unwrap();
        let coded = Rule::new(
            0,
            expr.clone(),
            None,
            vec![RuleSymbol {
                symbol: num.clone(),
                alias: None,
            }],
            None,
            1,
            1,
        );
        let with_action = Rule::new(
            1,
            expr.clone(),
            None,
            vec![RuleSymbol {
                symbol: num,
                alias: None,
            }],
            Some("$$ = 1;".to_string()),
            2,
            2,
        );
        let rules = vec![coded.clone(), with_action.clone()];
        assign_final_indices(&rules);
        assert_eq!(with_action.final_index(), 0);
        assert_eq!(coded.final_index(), 1);
    }
}
