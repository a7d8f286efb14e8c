//! Action table packing (spec.md §4.6): squeezes every state's
//! token/non-terminal action lists into one flat `yy_action` array with
//! a parallel `yy_lookahead` array, via first-fit offset search —
//! a sparse-matrix packing scheme, the same shape as the original's
//! `acttab` (not present in the retrieved source pack; the prose
//! algorithm is authoritative, see DESIGN.md).
use crate::automaton::{ActionKind, State};
use crate::rule::Rule;

/// Sentinel stored in `token_offset`/`non_terminal_offset` for a state
/// whose axis has no live actions at all; replaced by `action.len()`
/// once the whole table is packed (spec.md: "the lookahead mismatch
/// path is taken").
pub const NO_OFFSET: i32 = i32::MIN;

pub struct Constants {
    pub min_shift_reduce: i32,
    pub err_action: i32,
    pub acc_action: i32,
    pub no_action: i32,
    pub min_reduce: i32,
    pub max_action: i32,
}

impl Constants {
    pub fn new(nstate: usize, nrule: usize) -> Self {
        let min_shift_reduce = nstate as i32;
        let err_action = min_shift_reduce + nrule as i32;
        let acc_action = err_action + 1;
        let no_action = acc_action + 1;
        let min_reduce = no_action + 1;
        let max_action = min_reduce + nrule as i32;
        Self {
            min_shift_reduce,
            err_action,
            acc_action,
            no_action,
            min_reduce,
            max_action,
        }
    }

    /// Encodes one live action's payload per spec.md §4.6. A
    /// `ShiftReduce`'s rule always has a non-terminal LHS (every rule
    /// does, in this grammar model), so it always takes the "implicit
    /// post-reduce goto" `min_reduce` encoding rather than
    /// `min_shift_reduce` — see DESIGN.md's note on this Open Question.
    pub fn encode(&self, kind: &ActionKind) -> Option<i32> {
        match kind {
            ActionKind::Shift(target) => Some(*target as i32),
            ActionKind::ShiftReduce(_) => None, // resolved via `rule` by the caller
            ActionKind::Reduce => None,
            ActionKind::Accept => Some(self.acc_action),
            _ => None,
        }
    }

    pub fn encode_reduce(&self, rule: &Rule) -> i32 {
        self.min_reduce + rule.final_index() as i32
    }
}

pub struct PackedTables {
    pub action: Vec<i32>,
    pub lookahead: Vec<i32>,
    pub token_offset: Vec<i32>,
    pub non_terminal_offset: Vec<i32>,
    pub constants: Constants,
}

struct Table {
    action: Vec<i32>,
    lookahead: Vec<i32>,
    no_action: i32,
    sentinel_lookahead: i32,
}

impl Table {
    fn new(no_action: i32, sentinel_lookahead: i32) -> Self {
        Self {
            action: Vec::new(),
            lookahead: Vec::new(),
            no_action,
            sentinel_lookahead,
        }
    }

    fn ensure_len(&mut self, len: usize) {
        if self.action.len() < len {
            self.action.resize(len, self.no_action);
            self.lookahead.resize(len, self.sentinel_lookahead);
        }
    }

    fn fits_at(&self, entries: &[(usize, i32)], offset: i64) -> bool {
        for &(sym, act) in entries {
            let pos = offset + sym as i64;
            if pos < 0 {
                return false;
            }
            let pos = pos as usize;
            if pos < self.action.len() {
                let occupied = self.action[pos] != self.no_action;
                if occupied && !(self.lookahead[pos] == sym as i32 && self.action[pos] == act) {
                    return false;
                }
            }
        }
        true
    }

    /// First-fit placement: the smallest non-negative offset at which
    /// every `(symbol, action)` pair either lands on an empty slot or
    /// one already holding the identical pair (spec.md §4.6).
    fn place(&mut self, entries: &[(usize, i32)]) -> i32 {
        let mut offset: i64 = 0;
        loop {
            if self.fits_at(entries, offset) {
                break;
            }
            offset += 1;
        }
        let max_pos = entries.iter().map(|&(sym, _)| offset + sym as i64).max().unwrap_or(offset);
        self.ensure_len((max_pos + 1) as usize);
        for &(sym, act) in entries {
            let pos = (offset + sym as i64) as usize;
            self.action[pos] = act;
            self.lookahead[pos] = sym as i32;
        }
        offset as i32
    }
}

/// Gathers a state's live terminal-axis (`is_tkn = true`) or
/// non-terminal-axis actions as `(symbol index, encoded action)` pairs.
fn axis_entries(state: &State, constants: &Constants, is_tkn: bool) -> Vec<(usize, i32)> {
    state
        .actions
        .iter()
        .filter(|a| a.lookahead.is_terminal() == is_tkn)
        .filter_map(|a| {
            let code = match a.kind {
                ActionKind::Shift(target) => target as i32,
                ActionKind::ShiftReduce(_) | ActionKind::Reduce => {
                    constants.encode_reduce(a.rule.as_ref().expect("reduce carries a rule"))
                }
                ActionKind::Accept => constants.acc_action,
                _ => return None,
            };
            Some((a.lookahead.index(), code))
        })
        .collect()
}

/// `nxstate` is the count of states actually packed into the shift
/// table (spec.md §4.5's trailing `auto_reduce` states are excluded —
/// they are emitted as plain default-reduce entries instead).
pub fn pack(states: &[State], nxstate: usize, nterminal: usize, nrule: usize) -> PackedTables {
    let constants = Constants::new(states.len(), nrule);
    let sentinel_lookahead = nterminal as i32;
    let mut table = Table::new(constants.no_action, sentinel_lookahead);

    #[derive(Clone, Copy)]
    struct AxisSet {
        state: usize,
        is_tkn: bool,
        count: usize,
    }

    let mut axsets: Vec<AxisSet> = Vec::with_capacity(nxstate * 2);
    for state in 0..nxstate {
        for is_tkn in [true, false] {
            let entries = axis_entries(&states[state], &constants, is_tkn);
            axsets.push(AxisSet {
                state,
                is_tkn,
                count: entries.len(),
            });
        }
    }
    axsets.sort_by(|a, b| b.count.cmp(&a.count));

    let mut token_offset = vec![NO_OFFSET; states.len()];
    let mut non_terminal_offset = vec![NO_OFFSET; states.len()];

    for axset in axsets {
        if axset.count == 0 {
            continue;
        }
        let entries = axis_entries(&states[axset.state], &constants, axset.is_tkn);
        let offset = table.place(&entries);
        if axset.is_tkn {
            token_offset[axset.state] = offset;
        } else {
            non_terminal_offset[axset.state] = offset;
        }
    }

    PackedTables {
        action: table.action,
        lookahead: table.lookahead,
        token_offset,
        non_terminal_offset,
        constants,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::build;
    use crate::compress::{compress_tables, resort_states};
    use crate::conflict::resolve_conflicts;
    use crate::rule::assign_final_indices;
    use std::collections::HashSet;

    fn build_packed(src: &str) -> (PackedTables, usize, usize, usize, usize) {
        let grammar = crate::frontend::parse(src, "t.y", &HashSet::new()).unwrap();
        assign_final_indices(&grammar.rules);
        let mut automaton = build(&grammar).unwrap();
        resolve_conflicts(&mut automaton.states);
        compress_tables(&mut automaton.states, automaton.wildcard.as_ref());
        let nxstate = resort_states(&mut automaton.states);
        let nterminal = grammar.symbols.terminal_count();
        let nsymbol = nterminal + grammar.symbols.non_terminal_count();
        let nrule = grammar.rules.len();
        let packed = pack(&automaton.states, nxstate, nterminal, nrule);
        (packed, nxstate, nterminal, nsymbol, nrule)
    }

    /// Every occupied slot (per the action cell, not the lookahead
    /// sentinel) must round-trip its own symbol index as lookahead —
    /// on both axes. The non-terminal axis is the one where using
    /// `lookahead == nterminal` as the "unoccupied" test goes wrong:
    /// the first non-terminal's own index is `nterminal`, so that slot
    /// would be misread as empty and silently overwritten.
    #[test]
    fn every_occupied_slot_round_trips_its_own_lookahead() {
        let (packed, nxstate, _nterminal, nsymbol, _nrule) = build_packed("S ::= A B.\nA ::= X.\nB ::= Y.\n");
        for state in 0..nxstate {
            for &offset_field in &[packed.token_offset[state], packed.non_terminal_offset[state]] {
                if offset_field == NO_OFFSET {
                    continue;
                }
                for sym in 0..nsymbol {
                    let pos = offset_field as i64 + sym as i64;
                    if pos < 0 || pos as usize >= packed.action.len() {
                        continue;
                    }
                    let pos = pos as usize;
                    if packed.action[pos] != packed.constants.no_action {
                        assert_eq!(packed.lookahead[pos], sym as i32);
                    }
                }
            }
        }
    }

    #[test]
    fn unused_slots_carry_the_sentinel_lookahead() {
        let (packed, _nxstate, nterminal, _nsymbol, _nrule) = build_packed("S ::= X.\n");
        for (pos, &act) in packed.action.iter().enumerate() {
            if act == packed.constants.no_action {
                assert_eq!(packed.lookahead[pos], nterminal as i32);
            }
        }
    }
}
