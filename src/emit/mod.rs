//! Code emitter (spec.md §4.7): merges the computed tables into a
//! template, in the `%%`-separated emit order, translating every rule's
//! semantic action along the way. Grounded on
//! `report.c::tplt_print/translate_code/print_stack_union` for the
//! mechanics and on `alap_gen_ng/src/grammar.rs`'s one-`write_xxx_code`-
//! method-per-section idiom for the Rust shape.
pub mod action_text;
pub mod template;

use std::collections::HashMap;
use std::io::Write;

use crate::automaton::State;
use crate::error::Error;
use crate::frontend::Grammar;
use crate::pack::PackedTables;
use crate::symbol::Symbol;

/// Assigns each symbol a stack-union slot (`dtnum`): terminals always
/// share slot 0, non-terminals are grouped by their declared (or
/// default) type string. The original dedups via a rolling hash with
/// linear probing over a table sized `2*nsymbol`; a plain `HashMap`
/// from canonical type string to slot number is observably equivalent
/// (same partition, an arbitrary but stable numbering) and is the
/// idiom the rest of this crate already uses for small lookup tables —
/// see DESIGN.md's note on this substitution.
pub fn assign_dtnums(grammar: &Grammar) -> HashMap<String, u32> {
    let mut slots: HashMap<String, u32> = HashMap::new();
    let mut next = 1u32;
    for non_terminal in grammar.symbols.non_terminals() {
        let type_string = non_terminal
            .data_type()
            .or_else(|| grammar.options.default_type.clone())
            .unwrap_or_default();
        if type_string.is_empty() {
            continue;
        }
        slots.entry(type_string).or_insert_with(|| {
            let slot = next;
            next += 1;
            slot
        });
    }
    slots
}

fn dtnum_of<'a>(symbol: &Symbol, slots: &'a HashMap<String, u32>, default_type: Option<&str>) -> u32 {
    if symbol.is_terminal() {
        return 0;
    }
    let type_string = symbol.data_type().or_else(|| default_type.map(str::to_string)).unwrap_or_default();
    if type_string.is_empty() {
        0
    } else {
        *slots.get(&type_string).unwrap_or(&0)
    }
}

pub struct Emitter<'a> {
    pub grammar: &'a Grammar,
    pub states: &'a [State],
    pub nxstate: usize,
    pub packed: &'a PackedTables,
    pub parser_name: String,
    dtnum_slots: HashMap<String, u32>,
}

impl<'a> Emitter<'a> {
    pub fn new(grammar: &'a Grammar, states: &'a [State], nxstate: usize, packed: &'a PackedTables) -> Self {
        let parser_name = grammar.options.name.clone().unwrap_or_else(|| "Parse".to_string());
        let dtnum_slots = assign_dtnums(grammar);
        Self {
            grammar,
            states,
            nxstate,
            packed,
            parser_name,
            dtnum_slots,
        }
    }

    fn dtnum(&self, symbol: &Symbol) -> u32 {
        dtnum_of(symbol, &self.dtnum_slots, self.grammar.options.default_type.as_deref())
    }

    /// Token `#define`s, also used verbatim for the `.h` file (spec.md
    /// §6.3: suppressed there when `-m` is given or output is
    /// unchanged).
    pub fn write_token_defines(&self, out: &mut impl Write) -> Result<(), Error> {
        let prefix = self.grammar.options.token_prefix.as_deref().unwrap_or("");
        for terminal in self.grammar.symbols.terminals() {
            if terminal.name() == "$" {
                continue;
            }
            writeln!(out, "#define {}{} {}", prefix, terminal.name(), terminal.index() + 1)?;
        }
        Ok(())
    }

    fn write_size_type_macros(&self, out: &mut impl Write) -> Result<(), Error> {
        writeln!(out, "#define YYNOCODE {}", self.grammar.symbols.terminal_count() + self.grammar.symbols.non_terminal_count())?;
        writeln!(out, "#define YYNSTATE {}", self.states.len())?;
        writeln!(out, "#define YYNRULE {}", self.grammar.rules.len())?;
        Ok(())
    }

    fn write_stack_union(&self, out: &mut impl Write) -> Result<(), Error> {
        writeln!(out, "typedef union {{")?;
        writeln!(out, "  int yyinit;")?;
        let mut seen = std::collections::HashSet::new();
        for (type_string, slot) in &self.dtnum_slots {
            if seen.insert(*slot) {
                writeln!(out, "  {} yy{};", type_string, slot)?;
            }
        }
        if let Some(token_type) = &self.grammar.options.token_type {
            writeln!(out, "  {} yy0;", token_type)?;
        }
        writeln!(out, "}} YYMINORTYPE;")?;
        Ok(())
    }

    fn write_stack_depth(&self, out: &mut impl Write) -> Result<(), Error> {
        let depth = self.grammar.options.stack_size.unwrap_or(100);
        writeln!(out, "#ifndef YYSTACKDEPTH")?;
        writeln!(out, "#define YYSTACKDEPTH {}", depth)?;
        writeln!(out, "#endif")?;
        Ok(())
    }

    fn write_argument_macros(&self, out: &mut impl Write) -> Result<(), Error> {
        if let Some(extra) = &self.grammar.options.extra_argument {
            writeln!(out, "#define {} {}", self.parser_name.to_uppercase() + "_ARG_PARAM", extra.text)?;
        }
        Ok(())
    }

    fn write_error_symbol_info(&self, out: &mut impl Write) -> Result<(), Error> {
        let has_error = self.grammar.symbols.get_non_terminal("error").is_some();
        writeln!(out, "#define YYERRORSYMBOL {}", if has_error { 1 } else { 0 })?;
        Ok(())
    }

    fn write_fallback_table(&self, out: &mut impl Write) -> Result<(), Error> {
        let has_fallback = !self.grammar.fallbacks.is_empty();
        writeln!(out, "#define YYFALLBACK {}", if has_fallback { 1 } else { 0 })?;
        if has_fallback {
            let nterminal = self.grammar.symbols.terminal_count();
            let mut table = vec![0usize; nterminal];
            for (target, members) in &self.grammar.fallbacks {
                for member in members {
                    table[member.index()] = target.index();
                }
            }
            writeln!(out, "static const YYCODETYPE yyFallback[] = {{")?;
            for entry in table {
                writeln!(out, "  {},", entry)?;
            }
            writeln!(out, "}};")?;
        }
        Ok(())
    }

    fn write_action_table(&self, out: &mut impl Write) -> Result<(), Error> {
        writeln!(out, "static const YYACTIONTYPE yy_action[] = {{")?;
        for entry in &self.packed.action {
            writeln!(out, "  {},", entry)?;
        }
        writeln!(out, "}};")?;
        Ok(())
    }

    fn write_lookahead_table(&self, out: &mut impl Write) -> Result<(), Error> {
        writeln!(out, "static const YYCODETYPE yy_lookahead[] = {{")?;
        for entry in &self.packed.lookahead {
            writeln!(out, "  {},", entry)?;
        }
        writeln!(out, "}};")?;
        Ok(())
    }

    fn write_offset_table(&self, out: &mut impl Write, name: &str, offsets: &[i32]) -> Result<(), Error> {
        let no_offset_replacement = self.packed.action.len() as i32;
        writeln!(out, "static const short {}[] = {{", name)?;
        for &offset in offsets.iter().take(self.nxstate) {
            let value = if offset == crate::pack::NO_OFFSET { no_offset_replacement } else { offset };
            writeln!(out, "  {},", value)?;
        }
        writeln!(out, "}};")?;
        Ok(())
    }

    fn write_default_table(&self, out: &mut impl Write) -> Result<(), Error> {
        writeln!(out, "static const YYACTIONTYPE yy_default[] = {{")?;
        for state in self.states {
            let value = match &state.default_reduce {
                Some(rule) => self.packed.constants.encode_reduce(rule),
                None => self.packed.constants.err_action,
            };
            writeln!(out, "  {},", value)?;
        }
        writeln!(out, "}};")?;
        Ok(())
    }

    fn write_symbol_names(&self, out: &mut impl Write) -> Result<(), Error> {
        writeln!(out, "static const char *const yyTokenName[] = {{")?;
        for terminal in self.grammar.symbols.terminals() {
            writeln!(out, "  \"{}\",", terminal.name())?;
        }
        for non_terminal in self.grammar.symbols.non_terminals() {
            writeln!(out, "  \"{}\",", non_terminal.name())?;
        }
        writeln!(out, "}};")?;
        Ok(())
    }

    fn write_rule_text(&self, out: &mut impl Write) -> Result<(), Error> {
        writeln!(out, "static const char *const yyRuleName[] = {{")?;
        for rule in self.grammar.rules.iter() {
            writeln!(out, "  /* {:3} */ \"{}\",", rule.final_index(), rule)?;
        }
        writeln!(out, "}};")?;
        Ok(())
    }

    fn write_destructor_switch(&self, out: &mut impl Write) -> Result<(), Error> {
        writeln!(out, "static void yy_destructor(YYCODETYPE yymajor, YYMINORTYPE *yypminor) {{")?;
        writeln!(out, "  switch (yymajor) {{")?;
        for terminal in self.grammar.symbols.terminals() {
            if let Some(code) = self.grammar.options.token_destructor.as_ref().map(|c| c.text.clone()).or_else(|| terminal.destructor()) {
                writeln!(out, "    case {}: {{ {} }} break;", terminal.index() + 1, code)?;
            }
        }
        for non_terminal in self.grammar.symbols.non_terminals() {
            if let Some(code) = non_terminal.destructor() {
                writeln!(out, "    case {}: {{ {} }} break;", non_terminal.index() + 1, code)?;
            }
        }
        writeln!(out, "    default: break;")?;
        writeln!(out, "  }}")?;
        writeln!(out, "}}")?;
        Ok(())
    }

    fn write_overflow_code(&self, out: &mut impl Write) -> Result<(), Error> {
        if let Some(overflow) = &self.grammar.options.stack_overflow {
            writeln!(out, "{}", overflow.text)?;
        }
        Ok(())
    }

    fn write_rule_lhs_table(&self, out: &mut impl Write) -> Result<(), Error> {
        let mut ordered: Vec<&crate::rule::Rule> = self.grammar.rules.iter().collect();
        ordered.sort_by_key(|r| r.final_index());
        writeln!(out, "static const YYCODETYPE yyRuleInfoLhs[] = {{")?;
        for rule in ordered {
            writeln!(out, "  {},", rule.lhs().index())?;
        }
        writeln!(out, "}};")?;
        Ok(())
    }

    fn write_rule_rhs_count_table(&self, out: &mut impl Write) -> Result<(), Error> {
        let mut ordered: Vec<&crate::rule::Rule> = self.grammar.rules.iter().collect();
        ordered.sort_by_key(|r| r.final_index());
        writeln!(out, "static const signed char yyRuleInfoNRhs[] = {{")?;
        for rule in ordered {
            writeln!(out, "  {},", -(rule.len() as i64))?;
        }
        writeln!(out, "}};")?;
        Ok(())
    }

    /// The reduce-action switch: one `case` per rule, emitting its
    /// translated semantic action (spec.md §4.7's per-rule translation
    /// rules, via `action_text::translate_rule_action`).
    fn write_reduce_switch(&self, out: &mut impl Write) -> Result<(), Error> {
        let mut ordered: Vec<&crate::rule::Rule> = self.grammar.rules.iter().filter(|r| r.has_code()).collect();
        ordered.sort_by_key(|r| r.final_index());
        writeln!(out, "  switch (yyruleno) {{")?;
        for rule in ordered {
            let translated = action_text::translate_rule_action(rule, &|s| self.dtnum(s))
                .map_err(|e| Error::Emit(e.to_string()))?;
            writeln!(out, "    case {}: /* {} */ {{", rule.final_index(), rule)?;
            for (position, destructor) in &translated.destructors {
                writeln!(out, "      {{ {} }} /* destructor for RHS slot {} */", destructor, position)?;
            }
            writeln!(out, "      {}", translated.body)?;
            if rule.lhs_alias().is_some() && !translated.direct_lhs_slot {
                writeln!(out, "      yymsp[{}].minor.yy{} = yylhsminor.yy{};", 1 - rule.len() as isize, self.dtnum(rule.lhs()), self.dtnum(rule.lhs()))?;
            }
            writeln!(out, "    }} break;")?;
        }
        writeln!(out, "    default: break;")?;
        writeln!(out, "  }}")?;
        Ok(())
    }

    fn write_hooks(&self, out: &mut impl Write) -> Result<(), Error> {
        if let Some(code) = &self.grammar.options.syntax_error {
            writeln!(out, "/* syntax_error */ {{ {} }}", code.text)?;
        }
        if let Some(code) = &self.grammar.options.parse_accept {
            writeln!(out, "/* parse_accept */ {{ {} }}", code.text)?;
        }
        if let Some(code) = &self.grammar.options.parse_failure {
            writeln!(out, "/* parse_failure */ {{ {} }}", code.text)?;
        }
        Ok(())
    }

    fn write_extra_code(&self, out: &mut impl Write) -> Result<(), Error> {
        for block in &self.grammar.options.extra_code {
            writeln!(out, "{}", block.text)?;
        }
        Ok(())
    }

    /// Runs the full emit order from spec.md §4.7: header passthrough,
    /// then each generated section in sequence, merged with the
    /// template's literal text between `%%` separators.
    pub fn emit(&self, template_sections: &[String], out: &mut impl Write) -> Result<(), Error> {
        let mut sections = template_sections.iter();
        macro_rules! passthrough {
            () => {
                if let Some(section) = sections.next() {
                    write!(out, "{}", section)?;
                }
            };
        }
        passthrough!(); // header
        for include in &self.grammar.options.include {
            writeln!(out, "{}", include.text)?;
        }
        passthrough!();
        self.write_token_defines(out)?;
        passthrough!();
        self.write_size_type_macros(out)?;
        self.write_stack_union(out)?;
        passthrough!();
        self.write_stack_depth(out)?;
        passthrough!();
        self.write_argument_macros(out)?;
        passthrough!();
        self.write_error_symbol_info(out)?;
        passthrough!();
        self.write_fallback_table(out)?;
        passthrough!();
        self.write_action_table(out)?;
        passthrough!();
        self.write_lookahead_table(out)?;
        passthrough!();
        self.write_offset_table(out, "yy_shift_ofst", &self.packed.token_offset)?;
        passthrough!();
        self.write_offset_table(out, "yy_reduce_ofst", &self.packed.non_terminal_offset)?;
        passthrough!();
        self.write_default_table(out)?;
        passthrough!();
        self.write_symbol_names(out)?;
        passthrough!();
        self.write_rule_text(out)?;
        passthrough!();
        self.write_destructor_switch(out)?;
        passthrough!();
        self.write_overflow_code(out)?;
        passthrough!();
        self.write_rule_lhs_table(out)?;
        self.write_rule_rhs_count_table(out)?;
        passthrough!();
        self.write_reduce_switch(out)?;
        passthrough!();
        self.write_hooks(out)?;
        passthrough!();
        self.write_extra_code(out)?;
        for section in sections {
            write!(out, "{}", section)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::build;
    use crate::compress::{compress_tables, resort_states};
    use crate::conflict::resolve_conflicts;
    use crate::pack::pack;
    use crate::rule::assign_final_indices;
    use std::collections::HashSet;

    fn emitted(src: &str) -> String {
        let grammar = crate::frontend::parse(src, "t.y", &HashSet::new()).unwrap();
        assign_final_indices(&grammar.rules);
        let mut automaton = build(&grammar).unwrap();
        resolve_conflicts(&mut automaton.states);
        compress_tables(&mut automaton.states, automaton.wildcard.as_ref());
        let nxstate = resort_states(&mut automaton.states);
        let nterminal = grammar.symbols.terminal_count();
        let nrule = grammar.rules.len();
        let packed = pack(&automaton.states, nxstate, nterminal, nrule);
        let emitter = Emitter::new(&grammar, &automaton.states, nxstate, &packed);
        let sections = template::split_sections("H%%%%%%%%%%%%%%%%%%%%%%%%", &emitter.parser_name);
        let mut buf = Vec::new();
        emitter.emit(&sections, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn emitted_parser_contains_action_and_lookahead_tables() {
        let text = emitted("S ::= A.\nA ::= NUM.\n");
        assert!(text.contains("yy_action"));
        assert!(text.contains("yy_lookahead"));
        assert!(text.contains("yyRuleName"));
    }

    #[test]
    fn rule_with_action_emits_a_reduce_case() {
        let text = emitted("%type expr {int}\nS ::= expr(A) PLUS expr(B). { A = A + B; }\nexpr(C) ::= NUM(D). { C = D; }\n");
        assert!(text.contains("switch (yyruleno)"));
    }
}
