//! The LR(0)/LALR(1) automaton builder (spec.md §4.3): `FindRulePrecedences`,
//! `FindFirstSets`, `FindStates`/`FindLinks`, `FindFollowSets`, `FindActions`.
//!
//! Grounded on the prose algorithm in spec.md §4.3 (the original `build.c`
//! was not present in the retrieved source pack) and, for the Rust idiom of
//! representing states/links as index-addressed arenas rather than pointer
//! graphs, on `alap_gen_ng/src/grammar.rs`'s state-interning loop (see
//! DESIGN.md).
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use crate::frontend::Grammar;
use crate::rule::{Configuration, Rule, RuleSymbol};
use crate::set::SymbolSet;
use crate::symbol::Symbol;

#[derive(Debug)]
pub enum Error {
    NoRules,
    UnknownStartSymbol(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NoRules => write!(f, "grammar has no rules"),
            Error::UnknownStartSymbol(name) => {
                write!(f, "%start_symbol \"{}\" is not the LHS of any rule", name)
            }
        }
    }
}

/// `FindRulePrecedences`: a rule's precedence, absent an explicit
/// `[TAG]`, is that of the rightmost RHS terminal that has one.
pub fn find_rule_precedences(rules: &[Rule]) {
    for rule in rules {
        rule.compute_default_precedence();
    }
}

/// `FindFirstSets`: fixpoint computation of `lambda` and `firstset` for
/// every non-terminal, from every rule `A -> alpha`.
pub fn find_first_sets(rules: &[Rule]) {
    loop {
        let mut changed = false;
        for rule in rules {
            let lhs = rule.lhs();
            let mut all_nullable_so_far = true;
            for rule_symbol in rule.rhs() {
                let symbol = &rule_symbol.symbol;
                if !all_nullable_so_far {
                    break;
                }
                if symbol.is_terminal() {
                    let mut set = SymbolSet::new();
                    for idx in symbol.terminal_indices() {
                        set.insert(idx);
                    }
                    if lhs.union_first_set(&set) {
                        changed = true;
                    }
                    all_nullable_so_far = false;
                } else {
                    if lhs.union_first_set(&symbol.first_set()) {
                        changed = true;
                    }
                    all_nullable_so_far = symbol.is_lambda();
                }
            }
            if all_nullable_so_far && lhs.set_lambda(true) {
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

/// FIRST(beta), and whether beta as a whole is nullable, for a tail of
/// RHS symbols (the `beta` in `A -> alpha . B beta` during closure).
fn first_of_sequence(tail: &[RuleSymbol]) -> (SymbolSet, bool) {
    let mut set = SymbolSet::new();
    for rule_symbol in tail {
        let symbol = &rule_symbol.symbol;
        if symbol.is_terminal() {
            for idx in symbol.terminal_indices() {
                set.insert(idx);
            }
            return (set, false);
        }
        set.union_with(&symbol.first_set());
        if !symbol.is_lambda() {
            return (set, false);
        }
    }
    (set, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Shift(usize),
    Reduce,
    ShiftReduce(usize),
    Accept,
    Error,
    SrConflict,
    RrConflict,
    SsConflict,
    ShResolved,
    RdResolved,
    NotUsed,
}

/// `(lookahead symbol, type, payload)` from spec.md §3. `rule` carries
/// the payload for `Reduce`/`ShiftReduce` actions (and for a conflict,
/// the rule it originally named); `alt` is the `spOpt` field recorded
/// when a `Shift` is fused into a `ShiftReduce` targeting an
/// auto-reduce state (spec.md §4.5 step 2).
#[derive(Debug, Clone)]
pub struct Action {
    pub lookahead: Symbol,
    pub kind: ActionKind,
    pub rule: Option<Rule>,
    pub alt: Option<Symbol>,
}

impl Action {
    fn new(lookahead: Symbol, kind: ActionKind) -> Self {
        Self {
            lookahead,
            kind,
            rule: None,
            alt: None,
        }
    }

    fn reduce(lookahead: Symbol, rule: Rule) -> Self {
        Self {
            lookahead,
            kind: ActionKind::Reduce,
            rule: Some(rule),
            alt: None,
        }
    }

    fn accept(lookahead: Symbol) -> Self {
        Self {
            lookahead,
            kind: ActionKind::Accept,
            rule: None,
            alt: None,
        }
    }
}

/// One LALR(1) state: the (sorted) configuration set together with
/// which subset is kernel/basis, and the resolved action list.
#[derive(Debug)]
pub struct State {
    pub statenum: usize,
    /// Number assigned at construction time; stable across `ResortStates`
    /// renumbering so diagnostics and tests can refer to "the state built
    /// from goto(s0, EXPR)" independent of final table layout.
    pub initial_statenum: usize,
    configurations: BTreeMap<Configuration, usize>,
    pub basis: Vec<Configuration>,
    pub actions: Vec<Action>,
    pub default_reduce: Option<Rule>,
    pub auto_reduce: bool,
    pub n_token_actions: usize,
    pub n_non_terminal_actions: usize,
    pub token_offset: Option<i32>,
    pub non_terminal_offset: Option<i32>,
}

impl State {
    /// Every configuration in this state's full closure, in sorted order.
    pub fn configurations(&self) -> impl Iterator<Item = &Configuration> {
        self.configurations.keys()
    }

    pub fn is_basis(&self, config: &Configuration) -> bool {
        self.basis.contains(config)
    }
}

/// A single node in the propagation-link graph: one (state,
/// configuration) pair together with its accumulated follow-set and
/// the list of other nodes it feeds (spec.md §4.3 "FindLinks"/
/// "FindFollowSets").
#[derive(Debug)]
pub struct Node {
    pub state: usize,
    pub config: Configuration,
    pub follow: SymbolSet,
    pub links: Vec<usize>,
}

pub struct Automaton {
    pub states: Vec<State>,
    pub nodes: Vec<Node>,
    pub start_rule: Rule,
    pub wildcard: Option<Symbol>,
}

impl Automaton {
    pub fn follow_set(&self, state: usize, config: &Configuration) -> &SymbolSet {
        let node_id = self.states[state].configurations[config];
        &self.nodes[node_id].follow
    }
}

fn basis_key(configs: &[Configuration]) -> Vec<(usize, usize)> {
    let mut key: Vec<(usize, usize)> = configs.iter().map(|c| (c.rule.index(), c.dot)).collect();
    key.sort();
    key
}

fn index_rules_by_lhs(rules: &[Rule]) -> HashMap<usize, Vec<Rule>> {
    let mut map: HashMap<usize, Vec<Rule>> = HashMap::new();
    for rule in rules {
        map.entry(rule.lhs().index()).or_default().push(rule.clone());
    }
    map
}

/// `FindStates` + `FindLinks` + `FindFollowSets` + `FindActions`.
pub fn build(grammar: &Grammar) -> Result<Automaton, Error> {
    find_rule_precedences(&grammar.rules);
    find_first_sets(&grammar.rules);
    let rules_by_lhs = index_rules_by_lhs(&grammar.rules);

    let start_rule = match &grammar.options.start_symbol {
        Some(name) => grammar
            .rules
            .iter()
            .find(|r| r.lhs().name() == name)
            .cloned()
            .ok_or_else(|| Error::UnknownStartSymbol(name.clone()))?,
        None => grammar.rules.first().cloned().ok_or(Error::NoRules)?,
    };
    let end_marker = grammar
        .symbols
        .get_token("$")
        .cloned()
        .expect("end-of-input symbol must be interned before the builder runs");

    let mut nodes: Vec<Node> = Vec::new();
    let mut states: Vec<State> = Vec::new();
    let mut basis_to_state: HashMap<Vec<(usize, usize)>, usize> = HashMap::new();
    let mut queue: VecDeque<usize> = VecDeque::new();

    let start_config = Configuration::new(start_rule.clone());
    let seed_follow = {
        let mut s = SymbolSet::new();
        s.insert(end_marker.index());
        s
    };
    let state0 = new_state(&mut states, &mut nodes, 0, vec![start_config], vec![seed_follow]);
    basis_to_state.insert(vec![(start_rule.index(), 0)], state0);
    close_state(state0, &mut states, &mut nodes, &rules_by_lhs);
    queue.push_back(state0);

    while let Some(s) = queue.pop_front() {
        // Collect, for every distinct "next symbol" in this state's full
        // closure, the shifted kernel it produces (spec.md's "Goto").
        let mut per_symbol: Vec<(Symbol, Vec<Configuration>)> = Vec::new();
        let config_list: Vec<Configuration> = states[s].configurations.keys().cloned().collect();
        for config in &config_list {
            if let Some(symbol) = config.next_symbol().cloned() {
                let shifted = config.shifted();
                match per_symbol.iter_mut().find(|(sym, _)| *sym == symbol) {
                    Some((_, list)) => list.push(shifted),
                    None => per_symbol.push((symbol, vec![shifted])),
                }
            }
        }
        per_symbol.sort_by_key(|(sym, _)| sym.index());

        for (symbol, mut kernel) in per_symbol {
            kernel.sort();
            kernel.dedup();
            let key = basis_key(&kernel);
            let target = match basis_to_state.get(&key) {
                Some(&t) => t,
                None => {
                    let follows = vec![SymbolSet::new(); kernel.len()];
                    let t = new_state(&mut states, &mut nodes, states.len(), kernel.clone(), follows);
                    basis_to_state.insert(key, t);
                    close_state(t, &mut states, &mut nodes, &rules_by_lhs);
                    queue.push_back(t);
                    t
                }
            };

            // Link every source config with this next symbol to its
            // shifted counterpart in the target state: shifting never
            // changes a lookahead, so this link always fires (spec.md
            // "FindLinks": cross-state propagation).
            for config in config_list.iter().filter(|c| c.next_symbol() == Some(&symbol)) {
                let shifted = config.shifted();
                let from = states[s].configurations[config];
                let to = states[target].configurations[&shifted];
                if !nodes[from].links.contains(&to) {
                    nodes[from].links.push(to);
                }
            }

            // Record the (un-resolved) shift/goto action(s). A
            // MULTITERMINAL slot expands into one Shift per member
            // terminal, all to the same target (spec.md GLOSSARY).
            for member in expand_multi_terminal(&symbol) {
                states[s]
                    .actions
                    .push(Action::new(member, ActionKind::Shift(target)));
            }
        }
    }

    propagate_follow_sets(&mut nodes);
    find_actions(&mut states, &nodes, &start_rule, &end_marker);

    Ok(Automaton {
        states,
        nodes,
        start_rule,
        wildcard: grammar.options.wildcard.clone(),
    })
}

fn expand_multi_terminal(symbol: &Symbol) -> Vec<Symbol> {
    if symbol.is_multi_terminal() {
        symbol.subsymbols()
    } else {
        vec![symbol.clone()]
    }
}

fn new_state(
    states: &mut Vec<State>,
    nodes: &mut Vec<Node>,
    statenum: usize,
    kernel: Vec<Configuration>,
    follows: Vec<SymbolSet>,
) -> usize {
    let idx = states.len();
    let mut configurations = BTreeMap::new();
    let basis = kernel.clone();
    for (config, follow) in kernel.into_iter().zip(follows.into_iter()) {
        let node_id = nodes.len();
        nodes.push(Node {
            state: idx,
            config: config.clone(),
            follow,
            links: Vec::new(),
        });
        configurations.insert(config, node_id);
    }
    states.push(State {
        statenum,
        initial_statenum: statenum,
        configurations,
        basis,
        actions: Vec::new(),
        default_reduce: None,
        auto_reduce: false,
        n_token_actions: 0,
        n_non_terminal_actions: 0,
        token_offset: None,
        non_terminal_offset: None,
    });
    idx
}

/// Expands a state's kernel into its full closure (spec.md §4.3
/// "Closure"): for every item `A -> alpha . B beta` with `B` a
/// non-terminal, add `B -> . gamma` for every rule `B -> gamma`,
/// wiring up direct FIRST(beta) lookaheads and, when beta is nullable,
/// an intra-state propagation link from the parent item.
fn close_state(
    state_idx: usize,
    states: &mut Vec<State>,
    nodes: &mut Vec<Node>,
    rules_by_lhs: &HashMap<usize, Vec<Rule>>,
) {
    let mut worklist: Vec<Configuration> = states[state_idx].configurations.keys().cloned().collect();
    while let Some(parent) = worklist.pop() {
        let parent_node = states[state_idx].configurations[&parent];
        let next = match parent.next_symbol() {
            Some(s) if s.is_non_terminal() => s.clone(),
            _ => continue,
        };
        let tail = parent.rhs_tail();
        let (direct, nullable_tail) = first_of_sequence(tail.get(1..).unwrap_or(&[]));

        let producing = rules_by_lhs.get(&next.index()).cloned().unwrap_or_default();
        for rule in producing {
            let child = Configuration::new(rule);
            let existing = states[state_idx].configurations.get(&child).copied();
            let child_node = match existing {
                Some(id) => id,
                None => {
                    let id = nodes.len();
                    nodes.push(Node {
                        state: state_idx,
                        config: child.clone(),
                        follow: SymbolSet::new(),
                        links: Vec::new(),
                    });
                    states[state_idx].configurations.insert(child.clone(), id);
                    worklist.push(child.clone());
                    id
                }
            };
            nodes[child_node].follow.union_with(&direct);
            if nullable_tail && !nodes[parent_node].links.contains(&child_node) {
                nodes[parent_node].links.push(child_node);
            }
        }
    }
}

fn propagate_follow_sets(nodes: &mut [Node]) {
    loop {
        let mut changed = false;
        for i in 0..nodes.len() {
            let follow = nodes[i].follow.clone();
            let links = nodes[i].links.clone();
            for target in links {
                if nodes[target].follow.union_with(&follow) {
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
}

/// `FindActions`: for every reducible item in every state, append a
/// `Reduce` action for each terminal in its follow set (or `Accept` if
/// it is the start rule reducing on end-of-input).
fn find_actions(states: &mut [State], nodes: &[Node], start_rule: &Rule, end_marker: &Symbol) {
    // A terminal-index -> Symbol lookup so a raw bit index from a
    // `SymbolSet` can be turned back into the `Symbol` an `Action`
    // needs. Any terminal that made it into a follow set was reached
    // through `terminal_indices()`, so every index below `end_marker`'s
    // own index range is one of the real (non-multi) terminals; the
    // simplest correct source for that reverse map is the rule RHS's
    // own terminal symbols, collected once up front.
    let mut by_index: HashMap<usize, Symbol> = HashMap::new();
    by_index.insert(end_marker.index(), end_marker.clone());
    for state in states.iter() {
        for config in state.configurations() {
            for rule_symbol in config.rule.rhs() {
                let symbol = &rule_symbol.symbol;
                if symbol.is_multi_terminal() {
                    for member in symbol.subsymbols() {
                        by_index.insert(member.index(), member);
                    }
                } else if symbol.is_terminal() {
                    by_index.insert(symbol.index(), symbol.clone());
                }
            }
        }
    }

    for state in states.iter_mut() {
        let reducible: Vec<(Configuration, usize)> = state
            .configurations
            .iter()
            .filter(|(c, _)| c.is_reducible())
            .map(|(c, &n)| (c.clone(), n))
            .collect();
        for (config, node_id) in reducible {
            let rule = config.rule.clone();
            let is_start = rule == *start_rule;
            for idx in nodes[node_id].follow.iter() {
                let lookahead = match by_index.get(&idx) {
                    Some(s) => s.clone(),
                    None => continue,
                };
                if is_start && lookahead == *end_marker {
                    state.actions.push(Action::accept(lookahead));
                } else {
                    state.actions.push(Action::reduce(lookahead, rule.clone()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn build_grammar(src: &str) -> Grammar {
        crate::frontend::parse(src, "t.y", &HashSet::new()).unwrap()
    }

    #[test]
    fn simple_expression_grammar_has_accept_and_shift_reduce() {
        let grammar = build_grammar(
            "%start_symbol S.\n%left PLUS.\nS ::= E.\nE ::= E PLUS T.\nE ::= T.\nT ::= NUM.\n",
        );
        let automaton = build(&grammar).unwrap();
        assert!(automaton.states.len() >= 4);
        let has_accept = automaton.states[0]
            .configurations()
            .next()
            .is_some();
        assert!(has_accept);
        let any_reduce = automaton
            .states
            .iter()
            .any(|s| s.actions.iter().any(|a| a.kind == ActionKind::Reduce));
        assert!(any_reduce);
        let any_accept = automaton
            .states
            .iter()
            .any(|s| s.actions.iter().any(|a| a.kind == ActionKind::Accept));
        assert!(any_accept);
    }

    #[test]
    fn nullable_non_terminal_is_detected() {
        let grammar = build_grammar("S ::= A B.\nA ::= .\nA ::= X.\nB ::= Y.\n");
        find_rule_precedences(&grammar.rules);
        find_first_sets(&grammar.rules);
        let a = grammar.symbols.get_non_terminal("A").unwrap();
        assert!(a.is_lambda());
    }

    #[test]
    fn first_sets_propagate_through_nullable_prefixes() {
        let grammar = build_grammar("S ::= A B.\nA ::= .\nA ::= X.\nB ::= Y.\n");
        find_rule_precedences(&grammar.rules);
        find_first_sets(&grammar.rules);
        let s = grammar.symbols.get_non_terminal("S").unwrap();
        let x = grammar.symbols.get_token("X").unwrap();
        let y = grammar.symbols.get_token("Y").unwrap();
        assert!(s.first_set().contains(x.index()));
        assert!(s.first_set().contains(y.index()));
    }

    #[test]
    fn multi_terminal_shift_is_expanded_per_member() {
        let grammar = build_grammar("S ::= A.\nA ::= NUM|STR.\n");
        let automaton = build(&grammar).unwrap();
        let shifts_on_a_rule = automaton.states[0]
            .actions
            .iter()
            .filter(|a| matches!(a.kind, ActionKind::Shift(_)))
            .count();
        // NUM, STR and the goto on A: three shift/goto actions from state 0.
        assert_eq!(shifts_on_a_rule, 3);
    }
}
