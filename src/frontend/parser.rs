//! The declaration/rule state machine. Grounded on `lemon/sliced/parse.c`'s
//! `parseonetoken` (spec.md §4.2 "Rule Parser (state machine)"): tokens
//! drive an explicit state enum that builds up a [`Grammar`], resyncing
//! to the next `.` or `%` on error instead of aborting, so that one bad
//! grammar file can still be reported with more than one diagnostic.
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::intern::StringInterner;
use crate::location::Location;
use crate::rule::{Rule, RuleSymbol};
use crate::symbol::{Associativity, Symbol, SymbolTable};

use super::preprocessor::{self, preprocess};
use super::scanner::{Scanner, Token, TokenKind};

#[derive(Debug)]
pub enum Error {
    Preprocessor(preprocessor::Error),
    Scanner(super::scanner::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Preprocessor(e) => write!(f, "{}", e),
            Error::Scanner(e) => write!(f, "{}", e),
        }
    }
}

impl From<preprocessor::Error> for Error {
    fn from(e: preprocessor::Error) -> Self {
        Error::Preprocessor(e)
    }
}

impl From<super::scanner::Error> for Error {
    fn from(e: super::scanner::Error) -> Self {
        Error::Scanner(e)
    }
}

/// A host-language code fragment captured verbatim, with the line its
/// opening brace started on (for `#line` emission).
#[derive(Debug, Clone)]
pub struct CodeBlock {
    pub text: String,
    pub line: u32,
}

/// Declarations that take a single code/identifier payload and are not
/// followed by a `.` (the brace is self-delimiting), in `lemon`'s
/// terms: `%include`, `%code`, `%token_destructor`, ...
#[derive(Debug, Default)]
pub struct Options {
    pub name: Option<String>,
    pub include: Vec<CodeBlock>,
    pub extra_code: Vec<CodeBlock>,
    pub token_destructor: Option<CodeBlock>,
    pub default_destructor: Option<CodeBlock>,
    pub token_prefix: Option<String>,
    pub syntax_error: Option<CodeBlock>,
    pub parse_accept: Option<CodeBlock>,
    pub parse_failure: Option<CodeBlock>,
    pub stack_overflow: Option<CodeBlock>,
    pub extra_argument: Option<CodeBlock>,
    pub extra_context: Option<CodeBlock>,
    pub token_type: Option<String>,
    pub default_type: Option<String>,
    pub stack_size: Option<u32>,
    pub start_symbol: Option<String>,
    pub wildcard: Option<Symbol>,
}

/// One diagnostic accumulated by the frontend. Non-fatal: the parser
/// resyncs and keeps going so a single run can surface many of these
/// (spec.md §7).
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub location: Location,
    pub message: String,
    pub is_warning: bool,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = if self.is_warning { "Warning" } else { "Error" };
        write!(f, "{}: {}: {}.", self.location, kind, self.message)
    }
}

/// The fully parsed grammar: every interned symbol, every rule in
/// input order, the accumulated declarations, and any diagnostics.
#[derive(Debug, Default)]
pub struct Grammar {
    pub symbols: SymbolTable,
    pub rules: Vec<Rule>,
    pub options: Options,
    pub fallbacks: Vec<(Symbol, Vec<Symbol>)>,
    pub token_classes: Vec<Symbol>,
    pub diagnostics: Vec<Diagnostic>,
    pub error_count: u32,
    pub warning_count: u32,
}

impl Grammar {
    fn report_error(&mut self, location: &Location, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            location: location.clone(),
            message: message.into(),
            is_warning: false,
        });
        self.error_count += 1;
    }

    fn report_warning(&mut self, location: &Location, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            location: location.clone(),
            message: message.into(),
            is_warning: true,
        });
        self.warning_count += 1;
    }
}

struct TokenCursor<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> TokenCursor<'a> {
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token<'a>> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn is_punct(tok: &Token<'a>, ch: char) -> bool {
        tok.kind == TokenKind::Punct && tok.text.len() == 1 && tok.text.starts_with(ch)
    }

    /// Skips forward to (and consumes) the next `.` or leaves the
    /// cursor sitting on the next `%`, matching
    /// RESYNC_AFTER_RULE_ERROR/RESYNC_AFTER_DECL_ERROR.
    fn resync(&mut self) {
        while let Some(tok) = self.peek() {
            if Self::is_punct(tok, '.') {
                self.bump();
                return;
            }
            if Self::is_punct(tok, '%') {
                return;
            }
            self.bump();
        }
    }
}

fn loc(file_name: &Rc<str>, line: u32) -> Location {
    Location::new(file_name, line as usize)
}

/// Reads identifiers up to (and consuming) the terminating `.`.
fn read_ident_list<'a>(cursor: &mut TokenCursor<'a>) -> Vec<Token<'a>> {
    let mut out = Vec::new();
    while let Some(tok) = cursor.peek().cloned() {
        if TokenCursor::is_punct(&tok, '.') {
            cursor.bump();
            break;
        }
        if tok.kind == TokenKind::Id {
            out.push(tok);
            cursor.bump();
        } else {
            break;
        }
    }
    out
}

/// Parses one `LHS[(alias)] ::= RHS...` rule body, starting after the
/// LHS identifier has already been consumed by the caller.
#[allow(clippy::too_many_arguments)]
fn parse_rule_tail<'a>(
    cursor: &mut TokenCursor<'a>,
    grammar: &mut Grammar,
    file_name: &Rc<str>,
    lhs: Symbol,
    lhs_alias: Option<String>,
    rule_line: u32,
    rule_index: u32,
) -> Option<Rule> {
    match cursor.bump() {
        Some(tok) if tok.kind == TokenKind::Arrow => {}
        Some(tok) => {
            grammar.report_error(&loc(file_name, tok.line), "expected '::='");
            cursor.resync();
            return None;
        }
        None => return None,
    }

    let mut rhs: Vec<RuleSymbol> = Vec::new();
    loop {
        let tok = match cursor.peek().cloned() {
            Some(t) => t,
            None => {
                grammar.report_error(
                    &loc(file_name, rule_line),
                    "unexpected end of file in rule",
                );
                return None;
            }
        };
        if TokenCursor::is_punct(&tok, '.') {
            cursor.bump();
            break;
        }
        match tok.kind {
            TokenKind::Id => {
                cursor.bump();
                let symbol = grammar.symbols.symbol_new(tok.text, &loc(file_name, tok.line));
                symbol.add_used_at(&loc(file_name, tok.line));
                let alias = parse_optional_alias(cursor, grammar, file_name);
                rhs.push(RuleSymbol { symbol, alias });
            }
            TokenKind::MultiTerminal => {
                cursor.bump();
                let member_name = &tok.text[1..];
                let member = grammar
                    .symbols
                    .symbol_new(member_name, &loc(file_name, tok.line));
                member.add_used_at(&loc(file_name, tok.line));
                match rhs.pop() {
                    Some(last) if last.symbol.is_multi_terminal() => {
                        if let Err(e) = grammar.symbols.extend_multi_terminal(&last.symbol, member) {
                            grammar.report_error(&loc(file_name, tok.line), e.to_string());
                        }
                        rhs.push(last);
                    }
                    Some(last) => match grammar
                        .symbols
                        .new_multi_terminal(last.symbol.name(), last.symbol.clone())
                    {
                        Ok(multi) => {
                            if let Err(e) =
                                grammar.symbols.extend_multi_terminal(&multi, member)
                            {
                                grammar.report_error(&loc(file_name, tok.line), e.to_string());
                            }
                            rhs.push(RuleSymbol {
                                symbol: multi,
                                alias: last.alias,
                            });
                        }
                        Err(e) => {
                            grammar.report_error(&loc(file_name, tok.line), e.to_string());
                            rhs.push(last);
                        }
                    },
                    None => {
                        grammar.report_error(
                            &loc(file_name, tok.line),
                            "'|'/'/ ' with no preceding symbol",
                        );
                    }
                }
            }
            _ => {
                grammar.report_error(&loc(file_name, tok.line), "illegal RHS symbol");
                cursor.resync();
                return None;
            }
        }
    }

    let precedence_symbol = parse_optional_precedence_tag(cursor, grammar, file_name);

    let (code, code_line) = if let Some(tok) = cursor.peek().cloned() {
        if tok.kind == TokenKind::Brace {
            cursor.bump();
            let inner = &tok.text[1..tok.text.len() - 1];
            if inner.trim_start().starts_with("NEVER-REDUCE") {
                (Some("{NEVER-REDUCE".to_string()), tok.line)
            } else {
                (Some(inner.to_string()), tok.line)
            }
        } else {
            (None, rule_line)
        }
    } else {
        (None, rule_line)
    };

    let rule = Rule::new(rule_index, lhs, lhs_alias, rhs, code, code_line, rule_line);
    if let Some(precedence_symbol) = precedence_symbol {
        if let Some((assoc, prec)) = precedence_symbol.precedence().map(|p| (precedence_symbol.associativity(), p)) {
            rule.set_precedence(assoc, prec);
        } else {
            grammar.report_error(
                &loc(file_name, rule_line),
                format!("\"{}\" has no declared precedence", precedence_symbol.name()),
            );
        }
    }
    Some(rule)
}

fn parse_optional_alias<'a>(
    cursor: &mut TokenCursor<'a>,
    grammar: &mut Grammar,
    file_name: &Rc<str>,
) -> Option<String> {
    let open = cursor.peek().cloned()?;
    if !TokenCursor::is_punct(&open, '(') {
        return None;
    }
    cursor.bump();
    let name_tok = match cursor.bump() {
        Some(t) if t.kind == TokenKind::Id => t,
        Some(t) => {
            grammar.report_error(&loc(file_name, t.line), "expected alias identifier");
            return None;
        }
        None => return None,
    };
    match cursor.bump() {
        Some(t) if TokenCursor::is_punct(&t, ')') => {}
        Some(t) => grammar.report_error(&loc(file_name, t.line), "expected ')' after alias"),
        None => {}
    }
    Some(name_tok.text.to_string())
}

fn parse_optional_precedence_tag<'a>(
    cursor: &mut TokenCursor<'a>,
    grammar: &mut Grammar,
    file_name: &Rc<str>,
) -> Option<Symbol> {
    let open = cursor.peek().cloned()?;
    if !TokenCursor::is_punct(&open, '[') {
        return None;
    }
    cursor.bump();
    let name_tok = match cursor.bump() {
        Some(t) if t.kind == TokenKind::Id => t,
        Some(t) => {
            grammar.report_error(&loc(file_name, t.line), "expected precedence symbol");
            return None;
        }
        None => return None,
    };
    match cursor.bump() {
        Some(t) if TokenCursor::is_punct(&t, ']') => {}
        Some(t) => grammar.report_error(&loc(file_name, t.line), "expected ']'"),
        None => {}
    }
    Some(
        grammar
            .symbols
            .token_used_at(name_tok.text, &loc(file_name, name_tok.line)),
    )
}

fn parse_declaration<'a>(
    cursor: &mut TokenCursor<'a>,
    grammar: &mut Grammar,
    file_name: &Rc<str>,
    precedence_counter: &mut i32,
    keyword: &Token<'a>,
) {
    let line = keyword.line;
    match keyword.text {
        "name" => match cursor.bump() {
            Some(t) if t.kind == TokenKind::Id => {
                grammar.options.name = Some(t.text.to_string());
                expect_dot(cursor, grammar, file_name);
            }
            _ => grammar.report_error(&loc(file_name, line), "%name expects an identifier"),
        },
        "token_prefix" => match cursor.bump() {
            Some(t) if t.kind == TokenKind::Id => {
                grammar.options.token_prefix = Some(t.text.to_string());
                expect_dot(cursor, grammar, file_name);
            }
            _ => grammar.report_error(&loc(file_name, line), "%token_prefix expects an identifier"),
        },
        "start_symbol" => match cursor.bump() {
            Some(t) if t.kind == TokenKind::Id => {
                grammar.options.start_symbol = Some(t.text.to_string());
                expect_dot(cursor, grammar, file_name);
            }
            _ => grammar.report_error(&loc(file_name, line), "%start_symbol expects an identifier"),
        },
        "stack_size" => match cursor.bump() {
            Some(t) if t.kind == TokenKind::Id && t.text.chars().all(|c| c.is_ascii_digit()) => {
                grammar.options.stack_size = t.text.parse().ok();
                expect_dot(cursor, grammar, file_name);
            }
            _ => grammar.report_error(&loc(file_name, line), "%stack_size expects an integer"),
        },
        "wildcard" => match cursor.bump() {
            Some(t) if t.kind == TokenKind::Id => {
                let symbol = grammar.symbols.token_used_at(t.text, &loc(file_name, t.line));
                grammar.options.wildcard = Some(symbol);
                expect_dot(cursor, grammar, file_name);
            }
            _ => grammar.report_error(&loc(file_name, line), "%wildcard expects an identifier"),
        },
        "include" | "code" | "token_destructor" | "default_destructor" | "syntax_error"
        | "parse_accept" | "parse_failure" | "stack_overflow" | "extra_argument"
        | "extra_context" | "token_type" | "default_type" => {
            match cursor.bump() {
                Some(t) if t.kind == TokenKind::Brace => {
                    let text = t.text[1..t.text.len() - 1].to_string();
                    let block = CodeBlock { text: text.clone(), line: t.line };
                    match keyword.text {
                        "include" => grammar.options.include.push(block),
                        "code" => grammar.options.extra_code.push(block),
                        "token_destructor" => grammar.options.token_destructor = Some(block),
                        "default_destructor" => grammar.options.default_destructor = Some(block),
                        "syntax_error" => grammar.options.syntax_error = Some(block),
                        "parse_accept" => grammar.options.parse_accept = Some(block),
                        "parse_failure" => grammar.options.parse_failure = Some(block),
                        "stack_overflow" => grammar.options.stack_overflow = Some(block),
                        "extra_argument" => grammar.options.extra_argument = Some(block),
                        "extra_context" => grammar.options.extra_context = Some(block),
                        "token_type" => grammar.options.token_type = Some(text),
                        "default_type" => grammar.options.default_type = Some(text),
                        _ => unreachable!(),
                    }
                }
                _ => grammar.report_error(
                    &loc(file_name, line),
                    format!("%{} expects a {{code}} block", keyword.text),
                ),
            }
        }
        "left" | "right" | "nonassoc" => {
            let assoc = match keyword.text {
                "left" => Associativity::Left,
                "right" => Associativity::Right,
                _ => Associativity::NonAssoc,
            };
            *precedence_counter += 1;
            let names = read_ident_list(cursor);
            let symbols: Vec<Symbol> = names
                .iter()
                .map(|t| grammar.symbols.token_used_at(t.text, &loc(file_name, t.line)))
                .collect();
            grammar
                .symbols
                .set_precedences(assoc, &symbols, *precedence_counter);
        }
        "token" => {
            let names = read_ident_list(cursor);
            for t in names {
                grammar.symbols.token_used_at(t.text, &loc(file_name, t.line));
            }
        }
        "fallback" => {
            let names = read_ident_list(cursor);
            if let Some((first, rest)) = names.split_first() {
                let fallback_symbol = grammar
                    .symbols
                    .token_used_at(first.text, &loc(file_name, first.line));
                let members: Vec<Symbol> = rest
                    .iter()
                    .map(|t| grammar.symbols.token_used_at(t.text, &loc(file_name, t.line)))
                    .collect();
                for member in &members {
                    member.set_fallback(fallback_symbol.clone());
                }
                grammar.fallbacks.push((fallback_symbol, members));
            } else {
                grammar.report_error(&loc(file_name, line), "%fallback expects at least one symbol");
            }
        }
        "token_class" => {
            let names = read_ident_list(cursor);
            match names.split_first() {
                Some((class_name, members)) if !members.is_empty() => {
                    let first_member = grammar
                        .symbols
                        .token_used_at(members[0].text, &loc(file_name, members[0].line));
                    match grammar
                        .symbols
                        .new_multi_terminal(class_name.text, first_member)
                    {
                        Ok(class_symbol) => {
                            for t in &members[1..] {
                                let member =
                                    grammar.symbols.token_used_at(t.text, &loc(file_name, t.line));
                                if let Err(e) =
                                    grammar.symbols.extend_multi_terminal(&class_symbol, member)
                                {
                                    grammar.report_error(&loc(file_name, t.line), e.to_string());
                                }
                            }
                            grammar.token_classes.push(class_symbol);
                        }
                        Err(e) => grammar.report_error(&loc(file_name, line), e.to_string()),
                    }
                }
                _ => grammar.report_error(&loc(file_name, line), "%token_class expects a name and members"),
            }
        }
        "destructor" | "type" => {
            let name_tok = match cursor.bump() {
                Some(t) if t.kind == TokenKind::Id => t,
                _ => {
                    grammar.report_error(&loc(file_name, line), format!("%{} expects an identifier", keyword.text));
                    return;
                }
            };
            let code_tok = match cursor.bump() {
                Some(t) if t.kind == TokenKind::Brace => t,
                _ => {
                    grammar.report_error(&loc(file_name, name_tok.line), format!("%{} expects a {{code}} block", keyword.text));
                    return;
                }
            };
            let text = code_tok.text[1..code_tok.text.len() - 1].to_string();
            if keyword.text == "destructor" {
                let symbol = grammar
                    .symbols
                    .symbol_new(name_tok.text, &loc(file_name, name_tok.line));
                symbol.set_destructor(&text, code_tok.line);
            } else {
                let symbol = grammar
                    .symbols
                    .symbol_new(name_tok.text, &loc(file_name, name_tok.line));
                if symbol.data_type().is_some() {
                    grammar.report_warning(
                        &loc(file_name, name_tok.line),
                        format!("\"{}\" data type redeclared", symbol.name()),
                    );
                }
                symbol.set_data_type(&text);
            }
        }
        other => {
            grammar.report_error(&loc(file_name, line), format!("unknown declaration \"%{}\"", other));
        }
    }
}

fn expect_dot<'a>(cursor: &mut TokenCursor<'a>, grammar: &mut Grammar, file_name: &Rc<str>) {
    match cursor.bump() {
        Some(t) if TokenCursor::is_punct(&t, '.') => {}
        Some(t) => grammar.report_error(&loc(file_name, t.line), "expected '.'"),
        None => {}
    }
}

/// Runs the preprocessor, tokenizes, and drives the declaration/rule
/// state machine to completion. Grammar-level errors accumulate on the
/// returned [`Grammar`] rather than aborting; only a fatal
/// preprocessor/scanner failure returns `Err`.
pub fn parse(text: &str, file_name: &str, defines: &HashSet<String>) -> Result<Grammar, Error> {
    lazy_static::lazy_static! {
        static ref FILE_NAMES: StringInterner = StringInterner::new();
    }
    let preprocessed = preprocess(text, defines)?;
    let file_name: Rc<str> = FILE_NAMES.intern(file_name);

    let mut scanner = Scanner::new(&preprocessed);
    let mut tokens = Vec::new();
    while let Some(tok) = scanner.next_token()? {
        tokens.push(tok);
    }
    let mut cursor = TokenCursor { tokens, pos: 0 };

    let mut grammar = Grammar::default();
    let mut precedence_counter: i32 = 0;
    let mut rule_index: u32 = 0;

    while let Some(tok) = cursor.peek().cloned() {
        if TokenCursor::is_punct(&tok, '%') {
            cursor.bump();
            match cursor.bump() {
                Some(kw) if kw.kind == TokenKind::Id => {
                    parse_declaration(&mut cursor, &mut grammar, &file_name, &mut precedence_counter, &kw);
                }
                Some(t) => {
                    grammar.report_error(&loc(&file_name, t.line), "expected declaration keyword after '%'");
                    cursor.resync();
                }
                None => {
                    grammar.report_error(&loc(&file_name, tok.line), "'%' at end of file");
                }
            }
        } else if tok.kind == TokenKind::Id {
            cursor.bump();
            let lhs_line = tok.line;
            let lhs = match grammar
                .symbols
                .non_terminal_defined_at(tok.text, &loc(&file_name, lhs_line))
            {
                Ok(symbol) => symbol,
                Err(e) => {
                    grammar.report_error(&loc(&file_name, lhs_line), e.to_string());
                    cursor.resync();
                    continue;
                }
            };
            let alias = parse_optional_alias(&mut cursor, &mut grammar, &file_name);
            match parse_rule_tail(&mut cursor, &mut grammar, &file_name, lhs, alias, lhs_line, rule_index) {
                Some(rule) => {
                    rule_index += 1;
                    grammar.rules.push(rule);
                }
                None => {}
            }
        } else if tok.kind == TokenKind::Brace {
            // A stray code block not immediately following a rule's
            // `.`/`[PREC]` attaches to the previous rule (spec.md §4.2:
            // "A leading `{...}` after a rule attaches the code to the
            // previous rule"); we do not currently support rewriting an
            // already-built `Rule`'s code in place, so this is reported
            // instead of silently accepted.
            cursor.bump();
            grammar.report_warning(&loc(&file_name, tok.line), "ignoring code block with no preceding rule");
        } else {
            grammar.report_error(&loc(&file_name, tok.line), "expected a declaration or a rule");
            cursor.resync();
        }
    }

    grammar.symbols.end_of_input();
    grammar.symbols.finalize_indices();
    Ok(grammar)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Grammar {
        parse(src, "t.y", &HashSet::new()).unwrap()
    }

    #[test]
    fn parses_a_minimal_grammar() {
        let g = parse_ok("%start_symbol line.\nline ::= expr.\nexpr ::= NUM.\n");
        assert_eq!(g.error_count, 0);
        assert_eq!(g.rules.len(), 2);
        assert_eq!(g.options.start_symbol.as_deref(), Some("line"));
    }

    #[test]
    fn left_declaration_sets_precedence() {
        let g = parse_ok("%left PLUS MINUS.\n%left TIMES.\nexpr ::= expr PLUS expr.\nexpr ::= NUM.\n");
        let plus = g.symbols.get_token("PLUS").unwrap();
        let times = g.symbols.get_token("TIMES").unwrap();
        assert!(times.precedence().unwrap() > plus.precedence().unwrap());
        assert_eq!(plus.associativity(), Associativity::Left);
    }

    #[test]
    fn rule_code_and_aliases_are_captured() {
        let g = parse_ok("expr(A) ::= expr(B) PLUS expr(C). { A = B + C; }\nexpr ::= NUM.\n");
        let rule = &g.rules[0];
        assert_eq!(rule.lhs_alias(), Some("A"));
        assert_eq!(rule.code(), Some(" A = B + C; "));
        assert_eq!(rule.rhs()[0].alias.as_deref(), Some("B"));
    }

    #[test]
    fn multi_terminal_rhs_fuses_alternatives() {
        let g = parse_ok("expr ::= NUM|STR/ID.\n");
        let rule = &g.rules[0];
        assert!(rule.rhs()[0].symbol.is_multi_terminal());
        assert_eq!(rule.rhs()[0].symbol.subsymbols().len(), 3);
    }

    #[test]
    fn multi_terminal_rejects_non_terminal_members() {
        let g = parse_ok("expr ::= NUM|lower.\n");
        assert!(g.error_count > 0);
    }

    #[test]
    fn undeclared_token_in_precedence_tag_is_an_error() {
        let g = parse_ok("expr ::= expr PLUS expr [UNSEEN].\nexpr ::= NUM.\n");
        assert!(g.error_count > 0);
    }

    #[test]
    fn resync_recovers_after_a_bad_rule() {
        let g = parse_ok("expr ::= + +.\nexpr ::= NUM.\n");
        assert!(g.error_count > 0);
        assert_eq!(g.rules.len(), 1);
    }

    #[test]
    fn never_reduce_marker_is_recognised() {
        let g = parse_ok("expr ::= NUM. {NEVER-REDUCE whatever, no matter}\n");
        assert_eq!(g.rules[0].code(), Some("{NEVER-REDUCE".to_string()).as_deref());
    }
}
