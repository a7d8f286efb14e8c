use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::location::Location;
use crate::set::SymbolSet;

/// A terminal's declared associativity, used to break shift/reduce ties
/// at equal precedence (spec.md §4.4). `Unknown` is the state of a
/// terminal that has never appeared on a `%left`/`%right`/`%nonassoc`
/// line at all, distinct from an explicit `%nonassoc` declaration: the
/// conflict resolver treats the two differently (spec.md §3, §4.4 —
/// `UNK` vs `NONASSOC`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Unknown,
    NonAssoc,
    Left,
    Right,
}

impl Default for Associativity {
    fn default() -> Self {
        Associativity::Unknown
    }
}

impl fmt::Display for Associativity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Associativity::Unknown => write!(f, "unknown"),
            Associativity::NonAssoc => write!(f, "nonassoc"),
            Associativity::Left => write!(f, "left"),
            Associativity::Right => write!(f, "right"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Terminal,
    NonTerminal,
    MultiTerminal,
}

#[derive(Debug, Default)]
struct SymbolData {
    index: Cell<u32>,
    name: String,
    kind: SymbolKind,
    defined_at: RefCell<Option<Location>>,
    used_at: RefCell<Vec<Location>>,
    associativity: Cell<Associativity>,
    /// 0 means "not set", matching the original's convention that real
    /// precedence values are always positive.
    precedence: Cell<i32>,
    /// Whether a non-terminal can derive the empty string.
    lambda: Cell<bool>,
    first_set: RefCell<SymbolSet>,
    data_type: RefCell<Option<String>>,
    destructor: RefCell<Option<String>>,
    destructor_line: Cell<u32>,
    fallback: RefCell<Option<Symbol>>,
    use_count: Cell<u32>,
    /// For a multi-terminal (`A|B|C` combined token), the constituent
    /// terminals it was fused from.
    subsymbols: RefCell<Vec<Symbol>>,
}

impl Default for SymbolKind {
    fn default() -> Self {
        SymbolKind::Terminal
    }
}

/// A cheap, `Rc`-backed handle to an interned grammar symbol.
///
/// Mirrors the shape of the teacher's `symbol/terminal.rs::Token` and
/// `symbol/non_terminal.rs::NonTerminal`: identity lives in one
/// allocation, mutable attributes (precedence, associativity, first
/// set, ...) are `Cell`/`RefCell` fields filled in as the frontend and
/// automaton builder learn more about the symbol.
#[derive(Debug, Clone)]
pub struct Symbol(Rc<SymbolData>);

impl Symbol {
    fn new(index: u32, name: &str, kind: SymbolKind, defined_at: Option<Location>) -> Self {
        Symbol(Rc::new(SymbolData {
            index: Cell::new(index),
            name: name.to_string(),
            kind,
            defined_at: RefCell::new(defined_at),
            ..SymbolData::default()
        }))
    }

    /// A `MULTITERMINAL` slot. Carries no index of its own (see
    /// `SymbolTable::new_multi_terminal`); `index()` stays `0` since it
    /// is never read for one of these.
    fn new_multi(name: &str) -> Self {
        Symbol(Rc::new(SymbolData {
            index: Cell::new(0),
            name: name.to_string(),
            kind: SymbolKind::MultiTerminal,
            defined_at: RefCell::new(None),
            ..SymbolData::default()
        }))
    }

    pub fn index(&self) -> usize {
        self.0.index.get() as usize
    }

    pub(crate) fn set_index(&self, index: u32) {
        self.0.index.set(index);
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> SymbolKind {
        self.0.kind
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.0.kind, SymbolKind::Terminal | SymbolKind::MultiTerminal)
    }

    pub fn is_non_terminal(&self) -> bool {
        self.0.kind == SymbolKind::NonTerminal
    }

    pub fn is_multi_terminal(&self) -> bool {
        self.0.kind == SymbolKind::MultiTerminal
    }

    pub fn defined_at(&self) -> Option<Location> {
        self.0.defined_at.borrow().clone()
    }

    pub fn set_defined_at(&self, location: &Location) {
        *self.0.defined_at.borrow_mut() = Some(location.clone());
    }

    pub fn add_used_at(&self, location: &Location) {
        self.0.used_at.borrow_mut().push(location.clone());
        self.0.use_count.set(self.0.use_count.get() + 1);
    }

    pub fn use_count(&self) -> u32 {
        self.0.use_count.get()
    }

    pub fn associativity(&self) -> Associativity {
        self.0.associativity.get()
    }

    /// Precedence, or `None` if it was never declared. Terminals get
    /// their precedence from `%left`/`%right`/`%nonassoc`; rules
    /// inherit a precedence from the first (leftmost) terminal in their
    /// RHS that has one, unless overridden by a `[TAG]` (see
    /// `FindRulePrecedences`).
    pub fn precedence(&self) -> Option<i32> {
        let p = self.0.precedence.get();
        if p == 0 {
            None
        } else {
            Some(p)
        }
    }

    pub fn set_precedence(&self, associativity: Associativity, precedence: i32) {
        self.0.associativity.set(associativity);
        self.0.precedence.set(precedence);
    }

    pub fn is_lambda(&self) -> bool {
        self.0.lambda.get()
    }

    pub fn set_lambda(&self, value: bool) -> bool {
        let changed = self.0.lambda.get() != value;
        self.0.lambda.set(value);
        changed
    }

    pub fn first_set(&self) -> std::cell::Ref<SymbolSet> {
        self.0.first_set.borrow()
    }

    /// Merges `other` into this symbol's FIRST set. Returns `true` if
    /// anything changed, so `FindFirstSets` can detect its fixpoint.
    pub fn union_first_set(&self, other: &SymbolSet) -> bool {
        self.0.first_set.borrow_mut().union_with(other)
    }

    pub fn data_type(&self) -> Option<String> {
        self.0.data_type.borrow().clone()
    }

    pub fn set_data_type(&self, data_type: &str) {
        *self.0.data_type.borrow_mut() = Some(data_type.to_string());
    }

    pub fn destructor(&self) -> Option<String> {
        self.0.destructor.borrow().clone()
    }

    pub fn set_destructor(&self, code: &str, line: u32) {
        *self.0.destructor.borrow_mut() = Some(code.to_string());
        self.0.destructor_line.set(line);
    }

    pub fn fallback(&self) -> Option<Symbol> {
        self.0.fallback.borrow().clone()
    }

    pub fn set_fallback(&self, fallback: Symbol) {
        *self.0.fallback.borrow_mut() = Some(fallback);
    }

    pub fn subsymbols(&self) -> Vec<Symbol> {
        self.0.subsymbols.borrow().clone()
    }

    /// The real terminal indices this RHS slot stands for: a plain
    /// terminal's own index, or every member's index for a
    /// `MULTITERMINAL` (which carries no meaningful index of its own —
    /// see `Symbol::new_multi`). Used wherever FIRST/lookahead sets are
    /// built from a symbol appearing on a rule's RHS (spec.md §4.3
    /// "for MULTITERMINAL, union all sub-symbol indices").
    pub fn terminal_indices(&self) -> Vec<usize> {
        if self.is_multi_terminal() {
            self.0
                .subsymbols
                .borrow()
                .iter()
                .map(|s| s.index())
                .collect()
        } else {
            vec![self.index()]
        }
    }

    pub fn push_subsymbol(&self, symbol: Symbol) {
        self.0.subsymbols.borrow_mut().push(symbol);
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index().cmp(&other.index())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug)]
pub enum Error {
    AlreadyDefined(Symbol),
    ConflictsWithTerminal(Symbol),
    MultiTerminalMember(Symbol),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::AlreadyDefined(symbol) => {
                if let Some(location) = symbol.defined_at() {
                    write!(f, "\"{}\" already defined at {}", symbol.name(), location)
                } else {
                    write!(f, "\"{}\" already defined", symbol.name())
                }
            }
            Error::ConflictsWithTerminal(symbol) => {
                write!(f, "\"{}\" is already a token", symbol.name())
            }
            Error::MultiTerminalMember(symbol) => write!(
                f,
                "\"{}\" is a non-terminal: multi-terminal slots may only hold terminals",
                symbol.name()
            ),
        }
    }
}

/// Owns every interned symbol and hands out stable, zero-based indices:
/// terminals first `[0, nterminal)`, then non-terminals
/// `[nterminal, nsymbol)`, matching the layout the original generator
/// relies on when it tests `index < nterminal` (see the SHIFTREDUCE
/// fusion exclusion in `compress.rs`). `MULTITERMINAL` symbols never
/// enter either map — they are sugar at the `Rule` RHS level (see
/// `new_multi_terminal`) and are naturally excluded from the final
/// count, per spec.md §4.1's sort comparator.
#[derive(Debug, Default)]
pub struct SymbolTable {
    terminals: BTreeMap<String, Symbol>,
    non_terminals: BTreeMap<String, Symbol>,
    terminal_order: Vec<Symbol>,
    non_terminal_order: Vec<Symbol>,
    finalized: bool,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Symbol_new`: classify a bare RHS/LHS identifier by the
    /// original's case convention (uppercase-leading => terminal) and
    /// intern/fetch it, the way the frontend does for symbols that
    /// never appeared in a `%token` declaration.
    pub fn symbol_new(&mut self, name: &str, used_at: &Location) -> Symbol {
        let is_terminal = name
            .chars()
            .next()
            .map(|c| c.is_ascii_uppercase())
            .unwrap_or(false);
        if is_terminal {
            self.token_used_at(name, used_at)
        } else {
            self.non_terminal_used_at(name, used_at)
        }
    }

    /// Creates a fresh anonymous `MULTITERMINAL` slot seeded with
    /// `first` (the symbol standing alone before a `|X`/`/X` suffix
    /// promoted it), per spec.md §4.2's "first occurrence promotes the
    /// prior single symbol into a new MULTITERMINAL" rule. The new
    /// symbol is *not* registered in either name map: it is referenced
    /// only from the `Rule` slot that owns it.
    pub fn new_multi_terminal(&mut self, name: &str, first: Symbol) -> Result<Symbol, Error> {
        if !first.is_terminal() {
            return Err(Error::MultiTerminalMember(first));
        }
        let multi = Symbol::new_multi(name);
        multi.push_subsymbol(first);
        Ok(multi)
    }

    /// Appends another alternative to an existing `MULTITERMINAL` slot
    /// (the second and later `|X`/`/X` on one RHS position).
    pub fn extend_multi_terminal(&self, multi: &Symbol, member: Symbol) -> Result<(), Error> {
        if !member.is_terminal() {
            return Err(Error::MultiTerminalMember(member));
        }
        multi.push_subsymbol(member);
        Ok(())
    }

    pub fn is_known_token(&self, name: &str) -> bool {
        self.terminals.contains_key(name)
    }

    pub fn is_known_non_terminal(&self, name: &str) -> bool {
        self.non_terminals.contains_key(name)
    }

    pub fn get_token(&self, name: &str) -> Option<&Symbol> {
        self.terminals.get(name)
    }

    pub fn get_non_terminal(&self, name: &str) -> Option<&Symbol> {
        self.non_terminals.get(name)
    }

    pub fn add_token(&mut self, name: &str, defined_at: &Location) -> Result<Symbol, Error> {
        if let Some(existing) = self.terminals.get(name) {
            return Err(Error::AlreadyDefined(existing.clone()));
        }
        let index = self.terminal_order.len() as u32;
        let symbol = Symbol::new(index, name, SymbolKind::Terminal, Some(defined_at.clone()));
        self.terminals.insert(name.to_string(), symbol.clone());
        self.terminal_order.push(symbol.clone());
        Ok(symbol)
    }

    /// Looks up `name` as a terminal, interning it on first use (a
    /// token referenced only on a rule's RHS, never declared with
    /// `%token`, is legal and gets its location recorded here).
    pub fn token_used_at(&mut self, name: &str, used_at: &Location) -> Symbol {
        if let Some(symbol) = self.terminals.get(name) {
            symbol.add_used_at(used_at);
            return symbol.clone();
        }
        let index = self.terminal_order.len() as u32;
        let symbol = Symbol::new(index, name, SymbolKind::Terminal, None);
        symbol.add_used_at(used_at);
        self.terminals.insert(name.to_string(), symbol.clone());
        self.terminal_order.push(symbol.clone());
        symbol
    }

    pub fn non_terminal_used_at(&mut self, name: &str, used_at: &Location) -> Symbol {
        if let Some(symbol) = self.non_terminals.get(name) {
            symbol.add_used_at(used_at);
            return symbol.clone();
        }
        let index = self.non_terminal_order.len() as u32;
        let symbol = Symbol::new(index, name, SymbolKind::NonTerminal, None);
        symbol.add_used_at(used_at);
        self.non_terminals.insert(name.to_string(), symbol.clone());
        self.non_terminal_order.push(symbol.clone());
        symbol
    }

    pub fn non_terminal_defined_at(
        &mut self,
        name: &str,
        defined_at: &Location,
    ) -> Result<Symbol, Error> {
        if self.terminals.contains_key(name) {
            return Err(Error::ConflictsWithTerminal(self.terminals[name].clone()));
        }
        let symbol = self.non_terminal_used_at(name, defined_at);
        if symbol.defined_at().is_none() {
            symbol.set_defined_at(defined_at);
        }
        Ok(symbol)
    }

    /// The synthetic end-of-input terminal (`$` in diagnostics and
    /// reports), interned lazily and excluded from the normal
    /// uppercase-leading classification rule since `$` is neither
    /// upper- nor lower-case.
    pub fn end_of_input(&mut self) -> Symbol {
        if let Some(symbol) = self.terminals.get("$") {
            return symbol.clone();
        }
        let index = self.terminal_order.len() as u32;
        let symbol = Symbol::new(index, "$", SymbolKind::Terminal, None);
        self.terminals.insert("$".to_string(), symbol.clone());
        self.terminal_order.push(symbol.clone());
        symbol
    }

    /// Sets precedence/associativity for a list of already-interned
    /// terminals declared together on one `%left`/`%right`/`%nonassoc`
    /// line, using an ascending counter (`preccounter++` in the
    /// original `parse.c`, one per declaration line).
    pub fn set_precedences(&mut self, associativity: Associativity, symbols: &[Symbol], precedence: i32) {
        for symbol in symbols {
            symbol.set_precedence(associativity, precedence);
        }
    }

    /// Terminals in declaration order, including the implicitly
    /// interned ones, with index 0..nterminal.
    pub fn terminals(&self) -> &[Symbol] {
        &self.terminal_order
    }

    pub fn non_terminals(&self) -> &[Symbol] {
        &self.non_terminal_order
    }

    pub fn terminal_count(&self) -> usize {
        self.terminal_order.len()
    }

    pub fn non_terminal_count(&self) -> usize {
        self.non_terminal_order.len()
    }

    /// Sorts and reindexes every real symbol per spec.md §4.1: `$`
    /// forced last among terminals (otherwise alphabetical), `error`
    /// forced first among non-terminals (otherwise alphabetical),
    /// non-terminals following terminals. Must be called once, after
    /// the frontend has finished interning every symbol and before the
    /// automaton builder runs.
    pub fn finalize_indices(&mut self) {
        self.terminal_order.sort_by(|a, b| {
            let key = |s: &Symbol| {
                if s.name() == "$" {
                    (1u8, String::new())
                } else {
                    (0u8, s.name().to_string())
                }
            };
            key(a).cmp(&key(b))
        });
        self.non_terminal_order.sort_by(|a, b| {
            let key = |s: &Symbol| {
                if s.name() == "error" {
                    (0u8, String::new())
                } else {
                    (1u8, s.name().to_string())
                }
            };
            key(a).cmp(&key(b))
        });
        for (i, symbol) in self.terminal_order.iter().enumerate() {
            symbol.set_index(i as u32);
        }
        let base = self.terminal_order.len() as u32;
        for (i, symbol) in self.non_terminal_order.iter().enumerate() {
            symbol.set_index(base + i as u32);
        }
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Location {
        let name: Rc<str> = Rc::from("t.y");
        Location::new(&name, 1)
    }

    #[test]
    fn tokens_get_sequential_indices() {
        let mut table = SymbolTable::new();
        let a = table.add_token("PLUS", &loc()).unwrap();
        let b = table.add_token("MINUS", &loc()).unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
    }

    #[test]
    fn redefining_a_token_is_an_error() {
        let mut table = SymbolTable::new();
        table.add_token("PLUS", &loc()).unwrap();
        assert!(table.add_token("PLUS", &loc()).is_err());
    }

    #[test]
    fn finalize_indices_places_non_terminals_after_terminals() {
        let mut table = SymbolTable::new();
        table.add_token("PLUS", &loc()).unwrap();
        let e = table.non_terminal_used_at("expr", &loc());
        table.finalize_indices();
        assert_eq!(e.index(), 1);
    }
}
