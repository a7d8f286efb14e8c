//! The byte-at-a-time grammar-file scanner. Grounded directly on
//! `lemon/sliced/parse.c`'s `Parse()` token loop (spec.md §4.2
//! "Scanner"), reworked per DESIGN NOTES §9 to yield `(text, line)`
//! slices instead of mutating the input buffer in place with
//! temporary null terminators.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `[A-Za-z0-9_]+` — the scanner starts identifiers on any
    /// alphanumeric byte, including a leading digit (see spec.md §9
    /// Open Questions: preserved as-is).
    Id,
    /// A double-quoted string literal, including its quotes.
    String,
    /// A brace-delimited code block, including its outer braces.
    Brace,
    /// The literal three-byte arrow `::=`.
    Arrow,
    /// `|X` or `/X`: a multi-terminal continuation, text includes the
    /// leading punctuation.
    MultiTerminal,
    /// Any other single byte of punctuation (`.`, `(`, `)`, `[`, `]`,
    /// `%`, `,`, etc).
    Punct,
}

#[derive(Debug, Clone)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub line: u32,
}

#[derive(Debug)]
pub enum Error {
    UnterminatedString(u32),
    UnterminatedBrace(u32),
    UnterminatedComment(u32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnterminatedString(line) => write!(f, "line {}: unterminated string", line),
            Error::UnterminatedBrace(line) => write!(f, "line {}: unterminated {{code}}", line),
            Error::UnterminatedComment(line) => write!(f, "line {}: unterminated comment", line),
        }
    }
}

pub struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), Error> {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.bump();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start_line = self.line;
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            None => return Err(Error::UnterminatedComment(start_line)),
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            _ => {
                                self.bump();
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn scan_string(&mut self) -> Result<Token<'a>, Error> {
        let start_line = self.line;
        let start = self.pos;
        self.bump(); // opening quote
        loop {
            match self.peek() {
                None => return Err(Error::UnterminatedString(start_line)),
                Some(b'"') => {
                    self.bump();
                    break;
                }
                Some(b'\\') => {
                    self.bump();
                    self.bump();
                }
                _ => {
                    self.bump();
                }
            }
        }
        Ok(Token {
            kind: TokenKind::String,
            text: &self.src[start..self.pos],
            line: start_line,
        })
    }

    fn scan_brace(&mut self) -> Result<Token<'a>, Error> {
        let start_line = self.line;
        let start = self.pos;
        let mut depth: u32 = 0;
        loop {
            match self.peek() {
                None => return Err(Error::UnterminatedBrace(start_line)),
                Some(b'{') => {
                    depth += 1;
                    self.bump();
                }
                Some(b'}') => {
                    depth -= 1;
                    self.bump();
                    if depth == 0 {
                        break;
                    }
                }
                Some(b'"') => {
                    self.bump();
                    loop {
                        match self.peek() {
                            None => return Err(Error::UnterminatedBrace(start_line)),
                            Some(b'"') => {
                                self.bump();
                                break;
                            }
                            Some(b'\\') => {
                                self.bump();
                                self.bump();
                            }
                            _ => {
                                self.bump();
                            }
                        }
                    }
                }
                Some(b'\'') => {
                    self.bump();
                    loop {
                        match self.peek() {
                            None => return Err(Error::UnterminatedBrace(start_line)),
                            Some(b'\'') => {
                                self.bump();
                                break;
                            }
                            Some(b'\\') => {
                                self.bump();
                                self.bump();
                            }
                            _ => {
                                self.bump();
                            }
                        }
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.bump();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            None => return Err(Error::UnterminatedBrace(start_line)),
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            _ => {
                                self.bump();
                            }
                        }
                    }
                }
                _ => {
                    self.bump();
                }
            }
        }
        Ok(Token {
            kind: TokenKind::Brace,
            text: &self.src[start..self.pos],
            line: start_line,
        })
    }

    pub fn next_token(&mut self) -> Result<Option<Token<'a>>, Error> {
        self.skip_whitespace_and_comments()?;
        let start_line = self.line;
        let start = self.pos;
        let c = match self.peek() {
            None => return Ok(None),
            Some(c) => c,
        };

        if c == b'"' {
            return Ok(Some(self.scan_string()?));
        }
        if c == b'{' {
            return Ok(Some(self.scan_brace()?));
        }
        if c.is_ascii_alphanumeric() || c == b'_' {
            while self
                .peek()
                .map(|b| b.is_ascii_alphanumeric() || b == b'_')
                .unwrap_or(false)
            {
                self.bump();
            }
            return Ok(Some(Token {
                kind: TokenKind::Id,
                text: &self.src[start..self.pos],
                line: start_line,
            }));
        }
        if c == b':' && self.peek_at(1) == Some(b':') && self.peek_at(2) == Some(b'=') {
            self.bump();
            self.bump();
            self.bump();
            return Ok(Some(Token {
                kind: TokenKind::Arrow,
                text: &self.src[start..self.pos],
                line: start_line,
            }));
        }
        if (c == b'|' || c == b'/')
            && self
                .peek_at(1)
                .map(|b| b.is_ascii_alphanumeric() || b == b'_')
                .unwrap_or(false)
        {
            self.bump();
            while self
                .peek()
                .map(|b| b.is_ascii_alphanumeric() || b == b'_')
                .unwrap_or(false)
            {
                self.bump();
            }
            return Ok(Some(Token {
                kind: TokenKind::MultiTerminal,
                text: &self.src[start..self.pos],
                line: start_line,
            }));
        }
        self.bump();
        Ok(Some(Token {
            kind: TokenKind::Punct,
            text: &self.src[start..self.pos],
            line: start_line,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(src: &str) -> Vec<(TokenKind, &str)> {
        let mut scanner = Scanner::new(src);
        let mut out = Vec::new();
        while let Some(tok) = scanner.next_token().unwrap() {
            out.push((tok.kind, tok.text));
        }
        out
    }

    #[test]
    fn scans_a_simple_rule() {
        let toks = scan_all("expr ::= expr PLUS expr. // comment\n");
        assert_eq!(
            toks,
            vec![
                (TokenKind::Id, "expr"),
                (TokenKind::Arrow, "::="),
                (TokenKind::Id, "expr"),
                (TokenKind::Id, "PLUS"),
                (TokenKind::Id, "expr"),
                (TokenKind::Punct, "."),
            ]
        );
    }

    #[test]
    fn scans_multi_terminal_suffix() {
        let toks = scan_all("x ::= A|B/C.");
        assert_eq!(
            toks,
            vec![
                (TokenKind::Id, "x"),
                (TokenKind::Arrow, "::="),
                (TokenKind::Id, "A"),
                (TokenKind::MultiTerminal, "|B"),
                (TokenKind::MultiTerminal, "/C"),
                (TokenKind::Punct, "."),
            ]
        );
    }

    #[test]
    fn scans_brace_block_with_nesting_and_strings() {
        let toks = scan_all(r#"{ if (x) { y("}"); } }"#);
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].0, TokenKind::Brace);
        assert!(toks[0].1.starts_with('{') && toks[0].1.ends_with('}'));
    }

    #[test]
    fn unterminated_brace_is_an_error() {
        let mut scanner = Scanner::new("{ incomplete");
        assert!(scanner.next_token().is_err());
    }

    #[test]
    fn tracks_line_numbers_across_block_comments() {
        let mut scanner = Scanner::new("/* line1\nline2 */ id");
        let tok = scanner.next_token().unwrap().unwrap();
        assert_eq!(tok.line, 2);
    }
}
