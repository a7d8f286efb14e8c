//! The `.out` report, `-g` reprint, `-s` statistics, and `-S` SQL dump
//! (spec.md §4.8, supplemented per SPEC_FULL.md from `report.c`'s
//! `ReportOutput`/`PrintAction`/`ConfigPrint`/`ReportTable` family).
use std::io::Write;

use crate::automaton::{Action, ActionKind, State};
use crate::conflict::ConflictCounts;
use crate::error::Error;
use crate::frontend::Grammar;

fn action_label(action: &Action, show_resolved: bool) -> Option<String> {
    match &action.kind {
        ActionKind::Shift(target) => Some(format!("shift  {}", target)),
        ActionKind::ShiftReduce(target) => Some(format!(
            "shift  {} (then reduce {})",
            target,
            action.rule.as_ref().map(|r| r.final_index()).unwrap_or(0)
        )),
        ActionKind::Reduce => Some(format!(
            "reduce {}",
            action.rule.as_ref().map(|r| r.final_index()).unwrap_or(0)
        )),
        ActionKind::Accept => Some("accept".to_string()),
        ActionKind::SrConflict => Some("** shift/reduce conflict **".to_string()),
        ActionKind::RrConflict => Some("** reduce/reduce conflict **".to_string()),
        ActionKind::SsConflict => Some("** shift/shift conflict (internal error) **".to_string()),
        ActionKind::ShResolved if show_resolved => Some("shift  (resolved by precedence)".to_string()),
        ActionKind::RdResolved if show_resolved => Some("reduce (resolved by precedence)".to_string()),
        ActionKind::ShResolved | ActionKind::RdResolved | ActionKind::NotUsed => None,
        ActionKind::Error => Some("error".to_string()),
    }
}

/// Writes the full `.out` report for every state: its items (basis only
/// if `basis_only`, else the full closure) followed by its actions.
pub fn write_report(
    grammar: &Grammar,
    states: &[State],
    conflicts: &ConflictCounts,
    basis_only: bool,
    show_resolved: bool,
    out: &mut impl Write,
) -> Result<(), Error> {
    for state in states {
        writeln!(out, "State {}:", state.statenum)?;
        if basis_only {
            for config in &state.basis {
                writeln!(out, "    {}", config)?;
            }
        } else {
            for config in state.configurations() {
                let marker = if state.is_basis(config) { "" } else { "  (closure)" };
                writeln!(out, "    {}{}", config, marker)?;
            }
        }
        for action in &state.actions {
            if let Some(label) = action_label(action, show_resolved) {
                writeln!(out, "    {:>10} {}", action.lookahead.name(), label)?;
            }
        }
        writeln!(out)?;
    }

    writeln!(out, "Symbols:")?;
    for terminal in grammar.symbols.terminals() {
        match terminal.precedence() {
            Some(p) => writeln!(out, "  {} ({}, precedence {})", terminal.name(), terminal.associativity(), p)?,
            None => writeln!(out, "  {}", terminal.name())?,
        }
    }
    for non_terminal in grammar.symbols.non_terminals() {
        let first_set: Vec<String> = non_terminal
            .first_set()
            .iter()
            .filter_map(|idx| grammar.symbols.terminals().iter().find(|t| t.index() == idx))
            .map(|t| t.name().to_string())
            .collect();
        writeln!(out, "  {}: first = {{{}}}{}", non_terminal.name(), first_set.join(", "), if non_terminal.is_lambda() { " (nullable)" } else { "" })?;
    }

    writeln!(out)?;
    writeln!(out, "Syntax-only symbols (never bound to a label):")?;
    for rule in &grammar.rules {
        for rule_symbol in rule.rhs() {
            if rule_symbol.alias.is_none() {
                writeln!(out, "  {} (rule {})", rule_symbol.symbol.name(), rule.final_index())?;
            }
        }
    }

    writeln!(out)?;
    writeln!(out, "Rules:")?;
    for rule in &grammar.rules {
        match rule.precedence() {
            Some((_, p)) => writeln!(out, "  {:3} {} [{}]", rule.final_index(), rule, p)?,
            None => writeln!(out, "  {:3} {}", rule.final_index(), rule)?,
        }
    }

    writeln!(out)?;
    writeln!(
        out,
        "{} shift/reduce conflict(s), {} reduce/reduce conflict(s), {} shift/shift conflict(s)",
        conflicts.shift_reduce, conflicts.reduce_reduce, conflicts.shift_shift
    )?;
    Ok(())
}

/// `-g`: reprints the grammar stripped of code fragments, in input
/// order, one rule per line (spec.md E6).
pub fn reprint(grammar: &Grammar, out: &mut impl Write) -> Result<(), Error> {
    for rule in &grammar.rules {
        write!(out, "{}", rule.lhs().name())?;
        if let Some(alias) = rule.lhs_alias() {
            write!(out, "({})", alias)?;
        }
        write!(out, " ::=")?;
        for rule_symbol in rule.rhs() {
            write!(out, " {}", rule_symbol.symbol.name())?;
            if let Some(alias) = &rule_symbol.alias {
                write!(out, "({})", alias)?;
            }
        }
        write!(out, " .")?;
        if let Some((_, precedence)) = rule.precedence() {
            write!(out, " [{}]", precedence)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// `-s`: one-line-per-metric statistics, to stdout.
pub fn print_statistics(grammar: &Grammar, states: &[State], conflicts: &ConflictCounts, out: &mut impl Write) -> Result<(), Error> {
    writeln!(out, "{} terminal symbols", grammar.symbols.terminal_count())?;
    writeln!(out, "{} non-terminal symbols", grammar.symbols.non_terminal_count())?;
    writeln!(out, "{} rules", grammar.rules.len())?;
    writeln!(out, "{} states", states.len())?;
    writeln!(out, "{} conflicts", conflicts.total())?;
    Ok(())
}

fn sql_escape(text: &str) -> String {
    text.replace('\'', "''")
}

/// `-S`: the `.sql` dump of `symbol`/`rule`/`rulerhs` tables (spec.md
/// §6.3, supplemented from `report.c::ReportTable`'s inline SQL block —
/// see SPEC_FULL.md and DESIGN.md).
pub fn write_sql_dump(grammar: &Grammar, out: &mut impl Write) -> Result<(), Error> {
    writeln!(out, "BEGIN;")?;
    writeln!(out, "CREATE TABLE symbol(id INTEGER PRIMARY KEY, name TEXT, is_terminal BOOLEAN);")?;
    for terminal in grammar.symbols.terminals() {
        writeln!(out, "INSERT INTO symbol VALUES({}, '{}', TRUE);", terminal.index(), sql_escape(terminal.name()))?;
    }
    for non_terminal in grammar.symbols.non_terminals() {
        writeln!(out, "INSERT INTO symbol VALUES({}, '{}', FALSE);", non_terminal.index(), sql_escape(non_terminal.name()))?;
    }
    writeln!(out, "CREATE TABLE rule(id INTEGER PRIMARY KEY, lhs INTEGER);")?;
    writeln!(out, "CREATE TABLE rulerhs(rule_id INTEGER, position INTEGER, symbol_id INTEGER);")?;
    for rule in &grammar.rules {
        writeln!(out, "INSERT INTO rule VALUES({}, {});", rule.final_index(), rule.lhs().index())?;
        for (position, rule_symbol) in rule.rhs().iter().enumerate() {
            writeln!(
                out,
                "INSERT INTO rulerhs VALUES({}, {}, {});",
                rule.final_index(),
                position,
                rule_symbol.symbol.index()
            )?;
        }
    }
    writeln!(out, "COMMIT;")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::build;
    use crate::conflict::resolve_conflicts;
    use crate::rule::assign_final_indices;
    use std::collections::HashSet;

    fn pipeline(src: &str) -> (Grammar, Vec<State>, ConflictCounts) {
        let grammar = crate::frontend::parse(src, "t.y", &HashSet::new()).unwrap();
        assign_final_indices(&grammar.rules);
        let mut automaton = build(&grammar).unwrap();
        let counts = resolve_conflicts(&mut automaton.states);
        (grammar, automaton.states, counts)
    }

    #[test]
    fn report_lists_every_state() {
        let (grammar, states, counts) = pipeline("S ::= A.\nA ::= NUM.\n");
        let mut buf = Vec::new();
        write_report(&grammar, &states, &counts, false, false, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        for state in &states {
            assert!(text.contains(&format!("State {}:", state.statenum)));
        }
    }

    #[test]
    fn reprint_strips_code_fragments() {
        let (grammar, _states, _counts) = pipeline("S ::= A. { do_something(); }\nA ::= NUM.\n");
        let mut buf = Vec::new();
        reprint(&grammar, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(!text.contains("do_something"));
        assert!(text.contains("S ::= A ."));
    }

    #[test]
    fn sql_dump_emits_one_row_per_rule() {
        let (grammar, _states, _counts) = pipeline("S ::= A.\nA ::= NUM.\n");
        let mut buf = Vec::new();
        write_sql_dump(&grammar, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.matches("INSERT INTO rule ").count(), grammar.rules.len());
    }
}
