//! End-to-end pipeline tests over small grammars: frontend parse
//! through conflict resolution, compression, packing, and emission
//! against a minimal literal template (so no on-disk `lempar.c` is
//! required to run these).
use std::collections::HashSet;

use lalr1gen::{automaton, compress, conflict, emit, frontend, pack, rule};

const MINIMAL_TEMPLATE: &str = "/* header */%%%%%%%%%%%%%%%%%%%%%%%%";

fn parse_and_resolve(src: &str) -> (frontend::Grammar, Vec<automaton::State>, conflict::ConflictCounts) {
    let grammar = frontend::parse(src, "golden.y", &HashSet::new()).expect("grammar should parse");
    assert_eq!(grammar.error_count, 0, "unexpected grammar errors: {:?}", grammar.diagnostics);
    rule::assign_final_indices(&grammar.rules);
    let mut built = automaton::build(&grammar).expect("automaton should build");
    let conflicts = conflict::resolve_conflicts(&mut built.states);
    (grammar, built.states, conflicts)
}

/// Runs the whole pipeline through emission and returns the generated
/// source alongside the grammar/conflicts, for tests that need both.
fn full_pipeline(src: &str) -> (frontend::Grammar, conflict::ConflictCounts, String) {
    let (grammar, mut states, conflicts) = parse_and_resolve(src);
    compress::compress_tables(&mut states, None);
    let nxstate = compress::resort_states(&mut states);
    let nterminal = grammar.symbols.terminal_count();
    let nrule = grammar.rules.len();
    let packed = pack::pack(&states, nxstate, nterminal, nrule);
    let emitter = emit::Emitter::new(&grammar, &states, nxstate, &packed);
    let sections = emit::template::split_sections(MINIMAL_TEMPLATE, &emitter.parser_name);
    let mut buf = Vec::new();
    emitter.emit(&sections, &mut buf).expect("emission should succeed");
    let source = String::from_utf8(buf).unwrap();
    (grammar, conflicts, source)
}

#[test]
fn unambiguous_expression_grammar_has_no_conflicts() {
    let src = "\
%type expr {i64}
%type NUM {i64}

S ::= expr(A). { println!(\"{}\", A); }
expr(A) ::= expr(B) PLUS expr(C). { A = B + C; }
expr(A) ::= NUM(B). { A = B; }
";
    let (_grammar, conflicts, source) = full_pipeline(src);
    assert_eq!(conflicts.total(), 0);
    assert!(source.contains("yy_action"));
    assert!(source.contains("yy_lookahead"));
    assert!(source.contains("switch (yyruleno)"));
}

#[test]
fn left_associative_precedence_resolves_the_dangling_operator_conflict() {
    let src = "\
%left PLUS.
%left TIMES.

S ::= expr.
expr ::= expr PLUS expr.
expr ::= expr TIMES expr.
expr ::= NUM.
";
    let (_grammar, _states, conflicts) = parse_and_resolve(src);
    assert_eq!(conflicts.total(), 0, "precedence declarations should resolve every shift/reduce conflict");
}

#[test]
fn dangling_else_is_resolved_by_rule_order_precedence() {
    let src = "\
S ::= stmt.
stmt ::= IF expr THEN stmt.
stmt ::= IF expr THEN stmt ELSE stmt.
stmt ::= OTHER.
expr ::= NUM.
";
    let (_grammar, conflicts, source) = full_pipeline(src);
    assert!(source.contains("yyRuleName"));
    assert!(conflicts.shift_reduce <= 1, "classic dangling-else has at most one unresolved conflict");
}

#[test]
fn nxstate_excludes_only_the_trailing_auto_reduce_run() {
    let (_grammar, mut states, _conflicts) = parse_and_resolve("S ::= A.\nA ::= NUM.\n");
    compress::compress_tables(&mut states, None);
    let nxstate = compress::resort_states(&mut states);
    assert!(nxstate <= states.len());
    for state in &states[nxstate..] {
        assert!(state.auto_reduce, "every state past nxstate must be auto_reduce");
    }
}

#[test]
fn sql_dump_and_report_cover_every_rule() {
    let (grammar, states, conflicts) = parse_and_resolve("S ::= A B.\nA ::= X.\nB ::= Y.\n");
    let mut sql = Vec::new();
    lalr1gen::report::write_sql_dump(&grammar, &mut sql).unwrap();
    let sql = String::from_utf8(sql).unwrap();
    assert_eq!(sql.matches("INSERT INTO rule ").count(), grammar.rules.len());

    let mut report = Vec::new();
    lalr1gen::report::write_report(&grammar, &states, &conflicts, false, false, &mut report).unwrap();
    let report = String::from_utf8(report).unwrap();
    for state in &states {
        assert!(report.contains(&format!("State {}:", state.statenum)));
    }
}
