//! `%if`/`%ifdef`/`%ifndef`/`%else`/`%endif` handling, run once over the
//! whole grammar file before the scanner sees it. Grounded on
//! spec.md §4.2 "Preprocessor" (the original's `lemon/sliced/parse.c`
//! does not export this step separately, so the prose is authoritative
//! here).
use std::collections::HashSet;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    UnterminatedIf(u32),
    DanglingElse(u32),
    DanglingEndif(u32),
    BadExpression(u32, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnterminatedIf(line) => write!(f, "line {}: unterminated %if", line),
            Error::DanglingElse(line) => write!(f, "line {}: %else without %if", line),
            Error::DanglingEndif(line) => write!(f, "line {}: %endif without %if", line),
            Error::BadExpression(line, msg) => {
                write!(f, "%if syntax error on line {}: {}", line, msg)
            }
        }
    }
}

struct Frame {
    /// Whether the branch currently being copied is live, i.e. every
    /// enclosing frame is live and this frame's own condition held.
    active: bool,
    /// Whether *any* branch of this `%if`/`%else` chain has been taken
    /// yet, so a later `%else` knows not to activate a second time.
    taken: bool,
    opened_at: u32,
}

/// A small recursive-descent evaluator for `%if` expressions:
/// identifiers (true iff present in `defines`), prefix `!`, and
/// left-to-right `&&`/`||` at equal precedence. Unlike the original's
/// negative-offset re-entry trick (DESIGN NOTES §9), this returns an
/// explicit `Result`, propagating the first syntax error straight to
/// the top level.
struct BoolExpr<'a> {
    bytes: &'a [u8],
    pos: usize,
    defines: &'a HashSet<String>,
}

impl<'a> BoolExpr<'a> {
    fn new(text: &'a str, defines: &'a HashSet<String>) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
            defines,
        }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat_str(&mut self, s: &str) -> bool {
        let sb = s.as_bytes();
        if self.bytes[self.pos..].starts_with(sb) {
            self.pos += sb.len();
            true
        } else {
            false
        }
    }

    fn read_ident(&mut self) -> Option<String> {
        let start = self.pos;
        while self
            .bytes
            .get(self.pos)
            .map(|b| b.is_ascii_alphanumeric() || *b == b'_')
            .unwrap_or(false)
        {
            self.pos += 1;
        }
        if self.pos == start {
            None
        } else {
            Some(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
        }
    }

    fn eval(&mut self) -> Result<bool, String> {
        self.skip_ws();
        let mut result = self.eval_unary()?;
        loop {
            self.skip_ws();
            if self.eat_str("&&") {
                let rhs = self.eval_unary()?;
                result = result && rhs;
            } else if self.eat_str("||") {
                let rhs = self.eval_unary()?;
                result = result || rhs;
            } else {
                break;
            }
        }
        Ok(result)
    }

    fn eval_unary(&mut self) -> Result<bool, String> {
        self.skip_ws();
        match self.peek() {
            Some(b'!') => {
                self.pos += 1;
                Ok(!self.eval_unary()?)
            }
            Some(b'(') => {
                self.pos += 1;
                let inner = self.eval()?;
                self.skip_ws();
                if self.peek() != Some(b')') {
                    return Err("')' expected".to_string());
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => {
                let ident = self.read_ident().unwrap();
                Ok(self.defines.contains(&ident))
            }
            _ => Err("term expected".to_string()),
        }
    }

    fn finish(&mut self) -> Result<bool, String> {
        let value = self.eval()?;
        self.skip_ws();
        if self.pos != self.bytes.len() {
            return Err("operator expected".to_string());
        }
        Ok(value)
    }
}

fn eval_condition(text: &str, defines: &HashSet<String>) -> Result<bool, String> {
    BoolExpr::new(text, defines).finish()
}

/// Runs the `%if` family over `input`, replacing every byte of an
/// excluded branch (and of the directive lines themselves) with a
/// space so that line numbers in downstream diagnostics are unaffected
/// — the "trailing error line numbers unchanged" property in E4.
pub fn preprocess(input: &str, defines: &HashSet<String>) -> Result<String, Error> {
    let mut out = String::with_capacity(input.len());
    let mut stack: Vec<Frame> = Vec::new();
    let mut line_no: u32 = 1;

    for line in input.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        let is_directive = trimmed.starts_with('%')
            && (trimmed[1..].starts_with("if")
                || trimmed[1..].starts_with("else")
                || trimmed[1..].starts_with("endif"));
        let currently_active = stack.iter().all(|f| f.active);

        if is_directive {
            let body = &trimmed[1..];
            if let Some(rest) = body.strip_prefix("ifdef") {
                let name = rest.trim();
                let cond = defines.contains(name);
                stack.push(Frame {
                    active: currently_active && cond,
                    taken: cond,
                    opened_at: line_no,
                });
            } else if let Some(rest) = body.strip_prefix("ifndef") {
                let name = rest.trim();
                let cond = !defines.contains(name);
                stack.push(Frame {
                    active: currently_active && cond,
                    taken: cond,
                    opened_at: line_no,
                });
            } else if let Some(rest) = body.strip_prefix("if") {
                let cond = eval_condition(rest.trim(), defines)
                    .map_err(|msg| Error::BadExpression(line_no, msg))?;
                stack.push(Frame {
                    active: currently_active && cond,
                    taken: cond,
                    opened_at: line_no,
                });
            } else if body.trim_start().starts_with("else") {
                match stack.last_mut() {
                    Some(frame) => {
                        let parent_active = stack[..stack.len() - 1].iter().all(|f| f.active);
                        let frame = stack.last_mut().unwrap();
                        frame.active = parent_active && !frame.taken;
                        frame.taken = true;
                    }
                    None => return Err(Error::DanglingElse(line_no)),
                }
            } else if body.trim_start().starts_with("endif") {
                if stack.pop().is_none() {
                    return Err(Error::DanglingEndif(line_no));
                }
            }
            // The directive line itself is always blanked, whether or
            // not the branch it opens/closes is active.
            for _ in trimmed.chars() {
                out.push(' ');
            }
            if line.len() > trimmed.len() {
                out.push_str(&line[trimmed.len()..]);
            }
        } else if currently_active {
            out.push_str(line);
        } else {
            for _ in trimmed.chars() {
                out.push(' ');
            }
            if line.len() > trimmed.len() {
                out.push_str(&line[trimmed.len()..]);
            }
        }

        line_no += line.matches('\n').count() as u32;
    }

    if let Some(frame) = stack.first() {
        return Err(Error::UnterminatedIf(frame.opened_at));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defines(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn excluded_branch_is_blanked_but_same_length() {
        let input = "%ifdef FOO\nfoo ::= bar.\n%endif\nbaz ::= qux.\n";
        let out = preprocess(input, &defines(&[])).unwrap();
        assert_eq!(out.lines().count(), input.lines().count());
        assert!(!out.contains("foo ::= bar"));
        assert!(out.contains("baz ::= qux."));
    }

    #[test]
    fn included_branch_survives_when_defined() {
        let input = "%ifdef FOO\nfoo ::= bar.\n%endif\n";
        let out = preprocess(input, &defines(&["FOO"])).unwrap();
        assert!(out.contains("foo ::= bar."));
    }

    #[test]
    fn ifndef_is_negated_ifdef() {
        let input = "%ifndef FOO\nfoo ::= bar.\n%endif\n";
        assert!(preprocess(input, &defines(&["FOO"]))
            .unwrap()
            .trim()
            .is_empty());
        assert!(preprocess(input, &defines(&[]))
            .unwrap()
            .contains("foo ::= bar."));
    }

    #[test]
    fn boolean_expression_short_circuits_alternation() {
        let input = "%if FOO && BAR\nx ::= y.\n%endif\n";
        assert!(preprocess(input, &defines(&["FOO", "BAR"]))
            .unwrap()
            .contains("x ::= y."));
        assert!(preprocess(input, &defines(&["FOO"]))
            .unwrap()
            .trim()
            .is_empty());
    }

    #[test]
    fn malformed_expression_is_a_syntax_error() {
        let input = "%if FOO BAR\nx ::= y.\n%endif\n";
        assert!(preprocess(input, &defines(&["FOO", "BAR"])).is_err());
    }

    #[test]
    fn unterminated_if_is_fatal() {
        let input = "%ifdef FOO\nx ::= y.\n";
        assert!(preprocess(input, &defines(&[])).is_err());
    }
}
