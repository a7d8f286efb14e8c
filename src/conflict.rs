//! Conflict resolution (spec.md §4.4): sorts each state's actions,
//! applies precedence/associativity to shift/reduce conflicts, keeps
//! the lowest-numbered rule for reduce/reduce conflicts, and flags
//! shift/shift collisions as an internal invariant failure.
use std::cmp::Ordering;

use crate::automaton::{Action, ActionKind, State};
use crate::symbol::Associativity;

#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictCounts {
    pub shift_reduce: usize,
    pub reduce_reduce: usize,
    pub shift_shift: usize,
}

impl ConflictCounts {
    pub fn total(&self) -> usize {
        self.shift_reduce + self.reduce_reduce + self.shift_shift
    }
}

/// Rank used to order same-lookahead actions before conflict
/// resolution: `Shift`/`ShiftReduce` is tried against `Reduce` first,
/// matching the original's "sort by (symbol, type)" ordering.
fn type_rank(kind: &ActionKind) -> u8 {
    match kind {
        ActionKind::Shift(_) => 0,
        ActionKind::ShiftReduce(_) => 0,
        ActionKind::Accept => 1,
        ActionKind::Reduce => 2,
        _ => 3,
    }
}

pub fn resolve_conflicts(states: &mut [State]) -> ConflictCounts {
    let mut counts = ConflictCounts::default();
    for state in states.iter_mut() {
        state.actions.sort_by(|a, b| {
            a.lookahead
                .index()
                .cmp(&b.lookahead.index())
                .then_with(|| type_rank(&a.kind).cmp(&type_rank(&b.kind)))
        });
        let mut i = 0;
        while i < state.actions.len() {
            let mut j = i + 1;
            while j < state.actions.len() && state.actions[j].lookahead == state.actions[i].lookahead {
                j += 1;
            }
            if j - i > 1 {
                resolve_group(&mut state.actions[i..j], &mut counts);
            }
            i = j;
        }
    }
    counts
}

/// Reduces one run of same-lookahead actions to a single winner,
/// pairwise: each loser is demoted to a `*Resolved`/`*Conflict` variant
/// but kept in the list (spec.md: "retained only for the report").
fn is_live(kind: &ActionKind) -> bool {
    matches!(
        kind,
        ActionKind::Shift(_) | ActionKind::ShiftReduce(_) | ActionKind::Reduce | ActionKind::Accept
    )
}

fn resolve_group(actions: &mut [Action], counts: &mut ConflictCounts) {
    let mut winner = 0usize;
    for i in 1..actions.len() {
        let (lo, hi) = (winner, i);
        let (left, right) = actions.split_at_mut(hi);
        resolve_pair(&mut left[lo], &mut right[0], counts);
        if !is_live(&actions[winner].kind) && is_live(&actions[i].kind) {
            winner = i;
        }
    }
}

fn resolve_pair(a: &mut Action, b: &mut Action, counts: &mut ConflictCounts) {
    use ActionKind::*;
    match (a.kind, b.kind) {
        (Shift(_), Reduce) | (ShiftReduce(_), Reduce) => resolve_shift_reduce(a, b, counts),
        (Reduce, Shift(_)) | (Reduce, ShiftReduce(_)) => resolve_shift_reduce(b, a, counts),
        (Reduce, Reduce) => resolve_reduce_reduce(a, b, counts),
        (Shift(_), Shift(_)) | (Shift(_), ShiftReduce(_)) | (ShiftReduce(_), Shift(_)) => {
            a.kind = SsConflict;
            b.kind = SsConflict;
            counts.shift_shift += 1;
        }
        (Accept, _) | (_, Accept) => {}
        _ => {}
    }
}

/// `shift` carries the lookahead terminal being shifted; `reduce`
/// carries the candidate rule. Resolution order follows spec.md §4.4
/// verbatim.
fn resolve_shift_reduce(shift: &mut Action, reduce: &mut Action, counts: &mut ConflictCounts) {
    let rule = reduce.rule.clone().expect("Reduce action always carries a rule");
    let shift_precedence = shift.lookahead.precedence();
    let reduce_precedence = rule.precedence();
    match (shift_precedence, reduce_precedence) {
        (Some(sp), Some((assoc, rp))) => match sp.cmp(&rp) {
            Ordering::Greater => reduce.kind = ActionKind::RdResolved,
            Ordering::Less => shift.kind = ActionKind::ShResolved,
            Ordering::Equal => match assoc {
                Associativity::Left => shift.kind = ActionKind::ShResolved,
                Associativity::Right => reduce.kind = ActionKind::RdResolved,
                Associativity::NonAssoc => {
                    shift.kind = ActionKind::SrConflict;
                    reduce.kind = ActionKind::SrConflict;
                }
                Associativity::Unknown => {
                    shift.kind = ActionKind::SrConflict;
                    reduce.kind = ActionKind::SrConflict;
                    counts.shift_reduce += 1;
                }
            },
        },
        _ => {
            shift.kind = ActionKind::SrConflict;
            reduce.kind = ActionKind::SrConflict;
            counts.shift_reduce += 1;
        }
    }
}

fn resolve_reduce_reduce(a: &mut Action, b: &mut Action, counts: &mut ConflictCounts) {
    let rule_a = a.rule.clone().expect("Reduce action always carries a rule");
    let rule_b = b.rule.clone().expect("Reduce action always carries a rule");
    counts.reduce_reduce += 1;
    if rule_a.final_index() <= rule_b.final_index() {
        b.kind = ActionKind::RrConflict;
    } else {
        a.kind = ActionKind::RrConflict;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::build;
    use crate::rule::assign_final_indices;
    use std::collections::HashSet;

    fn build_automaton(src: &str) -> crate::automaton::Automaton {
        let grammar = crate::frontend::parse(src, "t.y", &HashSet::new()).unwrap();
        assign_final_indices(&grammar.rules);
        build(&grammar).unwrap()
    }

    #[test]
    fn left_associative_operator_resolves_to_reduce() {
        let mut automaton = build_automaton(
            "%start_symbol S.\n%left PLUS.\nS ::= E.\nE ::= E PLUS E.\nE ::= NUM.\n",
        );
        let counts = resolve_conflicts(&mut automaton.states);
        assert_eq!(counts.shift_reduce, 0);
        let has_resolved_shift = automaton
            .states
            .iter()
            .any(|s| s.actions.iter().any(|a| a.kind == ActionKind::ShResolved));
        assert!(has_resolved_shift);
    }

    #[test]
    fn right_associative_operator_resolves_to_shift() {
        let mut automaton = build_automaton(
            "%start_symbol S.\n%right ASSIGN.\nS ::= E.\nE ::= E ASSIGN E.\nE ::= NUM.\n",
        );
        let counts = resolve_conflicts(&mut automaton.states);
        assert_eq!(counts.shift_reduce, 0);
        let has_resolved_reduce = automaton
            .states
            .iter()
            .any(|s| s.actions.iter().any(|a| a.kind == ActionKind::RdResolved));
        assert!(has_resolved_reduce);
    }

    #[test]
    fn undeclared_precedence_is_an_unresolved_conflict() {
        let mut automaton = build_automaton(
            "%start_symbol S.\nS ::= E.\nE ::= E PLUS E.\nE ::= NUM.\n",
        );
        let counts = resolve_conflicts(&mut automaton.states);
        assert_eq!(counts.shift_reduce, 1);
    }
}
