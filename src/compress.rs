//! Table compression and state resort (spec.md §4.5): default-reduce
//! detection, shift-into-auto-reduce fusion, unit-production self-loop
//! elimination, and the final state renumbering pass.
use std::collections::HashMap;

use crate::automaton::{Action, ActionKind, State};
use crate::rule::Rule;
use crate::symbol::Symbol;

fn has_wildcard_lookahead(state: &State, wildcard: Option<&Symbol>) -> bool {
    match wildcard {
        Some(w) => state.actions.iter().any(|a| &a.lookahead == w),
        None => false,
    }
}

/// The rule reduced most often (by action count) among a state's live
/// `Reduce` actions, or `None` if the state has no reduce actions at all.
fn most_frequent_reduce(state: &State) -> Option<Rule> {
    let mut counts: HashMap<usize, (Rule, usize)> = HashMap::new();
    for action in &state.actions {
        if action.kind == ActionKind::Reduce {
            let rule = action.rule.clone().expect("Reduce always carries a rule");
            let entry = counts.entry(rule.index()).or_insert((rule, 0));
            entry.1 += 1;
        }
    }
    counts
        .into_values()
        .max_by_key(|(_, count)| *count)
        .map(|(rule, _)| rule)
}

/// Step 1: collapse the most frequent reduce in each state (absent a
/// possible wildcard lookahead) into a single default action, and mark
/// the state `auto_reduce` if nothing else survives.
fn default_reduce_pass(states: &mut [State], wildcard: Option<&Symbol>) {
    for state in states.iter_mut() {
        if has_wildcard_lookahead(state, wildcard) {
            continue;
        }
        let best = match most_frequent_reduce(state) {
            Some(r) => r,
            None => continue,
        };
        for action in state.actions.iter_mut() {
            if action.kind == ActionKind::Reduce && action.rule.as_ref() == Some(&best) {
                action.kind = ActionKind::NotUsed;
            }
        }
        state.default_reduce = Some(best);
        let remaining = state.actions.iter().any(|a| {
            matches!(a.kind, ActionKind::Shift(_) | ActionKind::ShiftReduce(_) | ActionKind::Reduce)
        });
        if !remaining {
            state.auto_reduce = true;
        }
    }
}

/// Step 2: any `Shift` whose target is now `auto_reduce` is fused into
/// a `ShiftReduce` targeting that state's default rule; `alt` records
/// the target symbol for report clarity (spec.md's `spOpt`).
fn fuse_shift_into_auto_reduce(states: &mut [State]) {
    let auto_reduce_rule: Vec<Option<Rule>> = states
        .iter()
        .map(|s| if s.auto_reduce { s.default_reduce.clone() } else { None })
        .collect();
    for state in states.iter_mut() {
        for action in state.actions.iter_mut() {
            if let ActionKind::Shift(target) = action.kind {
                if let Some(rule) = &auto_reduce_rule[target] {
                    let alt = action.lookahead.clone();
                    action.kind = ActionKind::ShiftReduce(target);
                    action.rule = Some(rule.clone());
                    action.alt = Some(alt);
                }
            }
        }
    }
}

/// Step 3: a `ShiftReduce` whose rule is a code-less unit production
/// (`A -> X.` with no action) is equivalent to shifting straight to
/// whatever this state already does on `A` — eliminate the extra hop
/// (spec.md §9 Open Questions: the original skips this when the rule's
/// own LHS slot collides with another action on the same symbol, which
/// cannot happen here since a state has at most one action per
/// lookahead once conflicts are already resolved).
fn eliminate_self_loops(states: &mut [State]) {
    for i in 0..states.len() {
        let candidates: Vec<(usize, Symbol)> = states[i]
            .actions
            .iter()
            .enumerate()
            .filter_map(|(idx, action)| match &action.kind {
                ActionKind::ShiftReduce(_) => {
                    let rule = action.rule.as_ref()?;
                    if rule.len() == 1 && !rule.has_code() && rule.lhs().is_non_terminal() {
                        Some((idx, rule.lhs().clone()))
                    } else {
                        None
                    }
                }
                _ => None,
            })
            .collect();
        for (idx, lhs) in candidates {
            let replacement = states[i]
                .actions
                .iter()
                .enumerate()
                .find(|(other_idx, a)| *other_idx != idx && a.lookahead == lhs)
                .map(|(_, a)| a.clone());
            if let Some(replacement) = replacement {
                states[i].actions[idx] = replacement;
            }
        }
    }
}

pub fn compress_tables(states: &mut [State], wildcard: Option<&Symbol>) {
    default_reduce_pass(states, wildcard);
    fuse_shift_into_auto_reduce(states);
    eliminate_self_loops(states);
}

/// `ResortStates`: orders states by (non-terminal action count desc,
/// token action count desc, original state number desc), state 0
/// pinned in place, then renumbers every `Shift`/`ShiftReduce` target
/// to match. Returns `nxstate`: the count of states that are *not*
/// part of the trailing run of `auto_reduce` states (those tail states
/// are emitted as plain default-reduce entries, spec.md §4.5).
pub fn resort_states(states: &mut Vec<State>) -> usize {
    for state in states.iter_mut() {
        state.n_token_actions = state
            .actions
            .iter()
            .filter(|a| is_live(&a.kind) && a.lookahead.is_terminal())
            .count();
        state.n_non_terminal_actions = state
            .actions
            .iter()
            .filter(|a| matches!(a.kind, ActionKind::Shift(_)) && a.lookahead.is_non_terminal())
            .count();
    }

    let n = states.len();
    if n == 0 {
        return 0;
    }
    let mut tail: Vec<usize> = (1..n).collect();
    tail.sort_by(|&a, &b| {
        states[b]
            .n_non_terminal_actions
            .cmp(&states[a].n_non_terminal_actions)
            .then_with(|| states[b].n_token_actions.cmp(&states[a].n_token_actions))
            .then_with(|| b.cmp(&a))
    });
    let mut new_order = vec![0usize];
    new_order.extend(tail);

    let mut renumber = vec![0usize; n];
    for (new_idx, &old_idx) in new_order.iter().enumerate() {
        renumber[old_idx] = new_idx;
    }

    let mut taken: Vec<Option<State>> = states.drain(..).map(Some).collect();
    let mut reordered = Vec::with_capacity(n);
    for &old_idx in &new_order {
        let mut state = taken[old_idx].take().expect("each old index visited once");
        state.statenum = renumber[old_idx];
        for action in state.actions.iter_mut() {
            match &mut action.kind {
                ActionKind::Shift(t) | ActionKind::ShiftReduce(t) => *t = renumber[*t],
                _ => {}
            }
        }
        reordered.push(state);
    }
    *states = reordered;

    let mut nxstate = states.len();
    while nxstate > 0 && states[nxstate - 1].auto_reduce {
        nxstate -= 1;
    }
    nxstate
}

/// `nxstate` without reordering (spec.md `-r`): states are left in
/// build order, so only a trailing run of `auto_reduce` states (if any
/// happen to be in that position) is excluded.
pub fn count_nxstate(states: &[State]) -> usize {
    let mut nxstate = states.len();
    while nxstate > 0 && states[nxstate - 1].auto_reduce {
        nxstate -= 1;
    }
    nxstate
}

fn is_live(kind: &ActionKind) -> bool {
    matches!(
        kind,
        ActionKind::Shift(_) | ActionKind::ShiftReduce(_) | ActionKind::Reduce | ActionKind::Accept
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::build;
    use crate::conflict::resolve_conflicts;
    use crate::rule::assign_final_indices;
    use std::collections::HashSet;

    fn pipeline(src: &str) -> Vec<State> {
        let grammar = crate::frontend::parse(src, "t.y", &HashSet::new()).unwrap();
        assign_final_indices(&grammar.rules);
        let mut automaton = build(&grammar).unwrap();
        resolve_conflicts(&mut automaton.states);
        automaton.states
    }

    #[test]
    fn unambiguous_state_gets_a_default_reduce() {
        let mut states = pipeline("S ::= A.\nA ::= NUM.\n");
        compress_tables(&mut states, None);
        let has_default = states.iter().any(|s| s.default_reduce.is_some());
        assert!(has_default);
    }

    #[test]
    fn a_state_with_only_a_default_reduce_becomes_auto_reduce() {
        let mut states = pipeline("S ::= A.\nA ::= NUM.\n");
        compress_tables(&mut states, None);
        let num_shift_state = states
            .iter()
            .find(|s| s.actions.iter().any(|a| matches!(a.kind, ActionKind::ShiftReduce(_))))
            .is_some()
            || states.iter().any(|s| s.auto_reduce);
        assert!(num_shift_state);
    }

    #[test]
    fn resort_keeps_state_zero_in_place() {
        let mut states = pipeline("S ::= A B.\nA ::= X.\nB ::= Y.\n");
        compress_tables(&mut states, None);
        let before_basis: Vec<_> = states[0].basis.clone();
        let _nxstate = resort_states(&mut states);
        assert_eq!(states[0].statenum, 0);
        assert_eq!(states[0].basis, before_basis);
    }
}
