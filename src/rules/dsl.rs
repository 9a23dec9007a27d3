//! Rule DSL parser
//!
//! Turns rule text into a [`RuleNode`] tree. One entry per pattern:
//!
//! ```text
//! # comment
//! '\e7'            => t_save_cursor                 # literal → leaf
//! ESC '['          => t_csi_unknown @csi => {       # submode branch
//!     'H'          => t_cursor_position             # final-byte dispatch
//! }
//! IAC WILL         => { * => t_telnet_will }        # wildcard captures
//! [0x20-0x7E]      => t_printable                   # byte class
//! ```
//!
//! Literal atoms (quoted strings, `0xHH`, control names) are concatenated
//! into one multi-byte pattern.

use super::{named_byte, BytePattern, ByteSet, RuleNode, Submode};
use crate::error::CompileError;

/// Parse rule text into the root branch of a rule tree
pub fn parse(source: &str) -> Result<RuleNode, CompileError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        eof: end_position(source),
    };
    let edges = parser.parse_entries(false)?;
    Ok(RuleNode::branch(edges))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Quoted(Vec<u8>),
    Hex(u8),
    Ident(String),
    Arrow,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Star,
    At,
    Pipe,
    Comma,
    Dash,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Quoted(_) => "quoted literal".to_string(),
            Token::Hex(b) => format!("0x{:02X}", b),
            Token::Ident(name) => format!("`{}`", name),
            Token::Arrow => "`=>`".to_string(),
            Token::LBrace => "`{`".to_string(),
            Token::RBrace => "`}`".to_string(),
            Token::LBracket => "`[`".to_string(),
            Token::RBracket => "`]`".to_string(),
            Token::Star => "`*`".to_string(),
            Token::At => "`@`".to_string(),
            Token::Pipe => "`|`".to_string(),
            Token::Comma => "`,`".to_string(),
            Token::Dash => "`-`".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    line: usize,
    column: usize,
}

fn syntax(line: usize, column: usize, message: impl Into<String>) -> CompileError {
    CompileError::Syntax {
        line,
        column,
        message: message.into(),
    }
}

fn end_position(source: &str) -> (usize, usize) {
    let line = source.lines().count().max(1);
    let column = source.lines().last().map(|l| l.len() + 1).unwrap_or(1);
    (line, column)
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(byte)
    }

    fn tokenize(mut self) -> Result<Vec<Spanned>, CompileError> {
        let mut tokens = Vec::new();

        while let Some(byte) = self.peek() {
            let (line, column) = (self.line, self.column);
            let token = match byte {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.bump();
                    continue;
                }
                b'#' => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                    continue;
                }
                b'=' if self.peek_at(1) == Some(b'>') => {
                    self.bump();
                    self.bump();
                    Token::Arrow
                }
                b'{' => self.single(Token::LBrace),
                b'}' => self.single(Token::RBrace),
                b'[' => self.single(Token::LBracket),
                b']' => self.single(Token::RBracket),
                b'*' => self.single(Token::Star),
                b'@' => self.single(Token::At),
                b'|' => self.single(Token::Pipe),
                b',' => self.single(Token::Comma),
                b'-' => self.single(Token::Dash),
                b'\'' => Token::Quoted(self.quoted()?),
                b'0' if matches!(self.peek_at(1), Some(b'x') | Some(b'X')) => {
                    Token::Hex(self.hex_literal()?)
                }
                b if b.is_ascii_alphabetic() || b == b'_' => Token::Ident(self.ident()),
                other => {
                    return Err(syntax(
                        line,
                        column,
                        format!("unexpected character {:?}", other as char),
                    ))
                }
            };
            tokens.push(Spanned {
                token,
                line,
                column,
            });
        }

        Ok(tokens)
    }

    fn single(&mut self, token: Token) -> Token {
        self.bump();
        token
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.bump();
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn hex_literal(&mut self) -> Result<u8, CompileError> {
        let (line, column) = (self.line, self.column);
        self.bump();
        self.bump();
        let mut value: u32 = 0;
        let mut digits = 0;
        while let Some(b) = self.peek() {
            let Some(d) = (b as char).to_digit(16) else {
                break;
            };
            value = value * 16 + d;
            digits += 1;
            self.bump();
            if digits > 2 {
                break;
            }
        }
        if digits == 0 || digits > 2 {
            return Err(syntax(line, column, "hex literal must have one or two digits"));
        }
        Ok(value as u8)
    }

    fn quoted(&mut self) -> Result<Vec<u8>, CompileError> {
        let (line, column) = (self.line, self.column);
        self.bump();
        let mut bytes = Vec::new();

        loop {
            let (esc_line, esc_column) = (self.line, self.column);
            match self.bump() {
                None | Some(b'\n') => {
                    return Err(syntax(line, column, "unterminated quoted literal"));
                }
                Some(b'\'') => break,
                Some(b'\\') => bytes.push(self.escape(esc_line, esc_column)?),
                Some(b) if b.is_ascii() => bytes.push(b),
                Some(_) => {
                    return Err(syntax(
                        esc_line,
                        esc_column,
                        "non-ASCII character in literal; use a \\x escape",
                    ));
                }
            }
        }

        if bytes.is_empty() {
            return Err(syntax(line, column, "empty quoted literal"));
        }
        Ok(bytes)
    }

    fn escape(&mut self, line: usize, column: usize) -> Result<u8, CompileError> {
        let Some(c) = self.bump() else {
            return Err(syntax(line, column, "unterminated escape"));
        };
        let byte = match c {
            b'e' => 0x1B,
            b'a' => 0x07,
            b'b' => 0x08,
            b't' => 0x09,
            b'n' => 0x0A,
            b'v' => 0x0B,
            b'f' => 0x0C,
            b'r' => 0x0D,
            b'\\' => b'\\',
            b'\'' => b'\'',
            b'"' => b'"',
            b'x' => {
                let mut value: u32 = 0;
                for _ in 0..2 {
                    let digit = self.peek().and_then(|b| (b as char).to_digit(16));
                    match digit {
                        Some(d) => {
                            value = value * 16 + d;
                            self.bump();
                        }
                        None => return Err(syntax(line, column, "\\x needs two hex digits")),
                    }
                }
                value as u8
            }
            b'0'..=b'7' => {
                let mut value = (c - b'0') as u32;
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + (d - b'0') as u32;
                            self.bump();
                        }
                        _ => break,
                    }
                }
                if value > 0xFF {
                    return Err(syntax(line, column, "octal escape out of range"));
                }
                value as u8
            }
            other => {
                return Err(syntax(
                    line,
                    column,
                    format!("unknown escape \\{}", other as char),
                ))
            }
        };
        Ok(byte)
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    eof: (usize, usize),
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn next(&mut self) -> Option<Spanned> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn position(&self) -> (usize, usize) {
        self.tokens
            .get(self.pos)
            .map(|s| (s.line, s.column))
            .unwrap_or(self.eof)
    }

    /// Error positioned at the current token (or end of input)
    fn error_here(&self, message: impl Into<String>) -> CompileError {
        let (line, column) = self.position();
        syntax(line, column, message)
    }

    fn expect(&mut self, expected: Token) -> Result<(), CompileError> {
        match self.peek() {
            Some(tok) if *tok == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(tok) => Err(self.error_here(format!(
                "expected {}, found {}",
                expected.describe(),
                tok.describe()
            ))),
            None => Err(self.error_here(format!(
                "expected {}, found end of input",
                expected.describe()
            ))),
        }
    }

    fn parse_entries(
        &mut self,
        nested: bool,
    ) -> Result<Vec<(BytePattern, RuleNode)>, CompileError> {
        let mut entries = Vec::new();
        loop {
            match self.peek() {
                None if nested => return Err(self.error_here("expected `}` to close branch")),
                None => break,
                Some(Token::RBrace) if nested => {
                    self.pos += 1;
                    break;
                }
                Some(Token::RBrace) => return Err(self.error_here("unmatched `}`")),
                Some(_) => entries.push(self.parse_entry()?),
            }
        }
        Ok(entries)
    }

    fn parse_entry(&mut self) -> Result<(BytePattern, RuleNode), CompileError> {
        let pattern = self.parse_pattern()?;
        self.expect(Token::Arrow)?;

        if self.peek() == Some(&Token::LBrace) {
            self.pos += 1;
            let edges = self.parse_entries(true)?;
            return Ok((pattern, RuleNode::branch(edges)));
        }

        let action = match self.next() {
            Some(Spanned {
                token: Token::Ident(name),
                ..
            }) => name,
            Some(other) => {
                return Err(syntax(
                    other.line,
                    other.column,
                    format!("expected action name, found {}", other.token.describe()),
                ))
            }
            None => return Err(self.error_here("expected action name, found end of input")),
        };

        let mut submode = None;
        if self.peek() == Some(&Token::At) {
            self.pos += 1;
            submode = Some(self.parse_submode()?);
        }

        if self.peek() != Some(&Token::Arrow) {
            return Ok(match submode {
                Some(mode) => (pattern, RuleNode::submode(action, mode, Vec::new())),
                None => (pattern, RuleNode::leaf(action)),
            });
        }

        let (line, column) = self.position();
        self.pos += 1;
        self.expect(Token::LBrace)?;
        let edges = self.parse_entries(true)?;
        match submode {
            Some(mode) => Ok((pattern, RuleNode::submode(action, mode, edges))),
            None => Err(syntax(
                line,
                column,
                format!(
                    "branch action `{}` needs a submode (@csi, @osc or @telnet_sb)",
                    action
                ),
            )),
        }
    }

    fn parse_submode(&mut self) -> Result<Submode, CompileError> {
        match self.next() {
            Some(Spanned {
                token: Token::Ident(name),
                line,
                column,
            }) => Submode::from_name(&name)
                .ok_or_else(|| syntax(line, column, format!("unknown submode `{}`", name))),
            Some(other) => Err(syntax(
                other.line,
                other.column,
                format!("expected submode name, found {}", other.token.describe()),
            )),
            None => Err(self.error_here("expected submode name, found end of input")),
        }
    }

    fn parse_pattern(&mut self) -> Result<BytePattern, CompileError> {
        match self.peek() {
            Some(Token::Star) => {
                self.pos += 1;
                Ok(BytePattern::Wildcard)
            }
            Some(Token::LBracket) => {
                self.pos += 1;
                self.parse_class()
            }
            Some(Token::Quoted(_)) | Some(Token::Hex(_)) | Some(Token::Ident(_)) => {
                let mut bytes = Vec::new();
                while let Some(Token::Quoted(_) | Token::Hex(_) | Token::Ident(_)) = self.peek() {
                    bytes.extend(self.parse_atom()?);
                }
                Ok(BytePattern::Literal(bytes))
            }
            Some(tok) => {
                let message = format!("expected pattern, found {}", tok.describe());
                Err(self.error_here(message))
            }
            None => Err(self.error_here("expected pattern, found end of input")),
        }
    }

    fn parse_atom(&mut self) -> Result<Vec<u8>, CompileError> {
        let Some(spanned) = self.next() else {
            return Err(self.error_here("expected byte, found end of input"));
        };
        match spanned.token {
            Token::Quoted(bytes) => Ok(bytes),
            Token::Hex(b) => Ok(vec![b]),
            Token::Ident(name) => named_byte(&name).map(|b| vec![b]).ok_or_else(|| {
                syntax(
                    spanned.line,
                    spanned.column,
                    format!("unknown byte name `{}`", name),
                )
            }),
            other => Err(syntax(
                spanned.line,
                spanned.column,
                format!("expected byte, found {}", other.describe()),
            )),
        }
    }

    fn parse_single_byte(&mut self) -> Result<u8, CompileError> {
        let at = self.error_here("class items must be single bytes");
        let bytes = self.parse_atom()?;
        match bytes.as_slice() {
            [b] => Ok(*b),
            _ => Err(at),
        }
    }

    fn parse_class(&mut self) -> Result<BytePattern, CompileError> {
        let mut set = ByteSet::new();
        loop {
            match self.peek() {
                Some(Token::RBracket) => {
                    self.pos += 1;
                    break;
                }
                Some(Token::Pipe) | Some(Token::Comma) => {
                    self.pos += 1;
                }
                Some(_) => {
                    let lo = self.parse_single_byte()?;
                    if self.peek() == Some(&Token::Dash) {
                        self.pos += 1;
                        let at = self.error_here("inverted byte range");
                        let hi = self.parse_single_byte()?;
                        if lo > hi {
                            return Err(at);
                        }
                        set.insert_range(lo, hi);
                    } else {
                        set.insert(lo);
                    }
                }
                None => return Err(self.error_here("expected `]` to close class")),
            }
        }

        if set.is_empty() {
            return Err(self.error_here("empty byte class"));
        }
        Ok(BytePattern::Class(set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(node: RuleNode) -> Vec<(BytePattern, RuleNode)> {
        match node {
            RuleNode::Branch { edges, .. } => edges,
            RuleNode::Leaf { .. } => panic!("expected branch"),
        }
    }

    #[test]
    fn test_parse_literal_leaf() {
        let rules = entries(parse("'\\e7' => t_save_cursor").unwrap());
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].0, BytePattern::Literal(vec![0x1B, b'7']));
        assert_eq!(rules[0].1, RuleNode::leaf("t_save_cursor"));
    }

    #[test]
    fn test_parse_concatenated_atoms() {
        let rules = entries(parse("ESC '[' 0x3F => t_x").unwrap());
        assert_eq!(rules[0].0, BytePattern::Literal(b"\x1b[?".to_vec()));
    }

    #[test]
    fn test_parse_escapes() {
        let rules = entries(parse(r"'\x1b\033\a\\\'' => t_x").unwrap());
        assert_eq!(
            rules[0].0,
            BytePattern::Literal(vec![0x1B, 0x1B, 0x07, b'\\', b'\''])
        );
    }

    #[test]
    fn test_parse_class_and_wildcard() {
        let src = "[0x20-0x7E | 0x80 - 0xFE] => t_printable\nIAC WILL => { * => t_will }";
        let rules = entries(parse(src).unwrap());

        let mut expected = ByteSet::range(0x20, 0x7E);
        expected.insert_range(0x80, 0xFE);
        assert_eq!(rules[0].0, BytePattern::Class(expected));

        assert_eq!(rules[1].0, BytePattern::Literal(vec![0xFF, 0xFB]));
        assert_eq!(
            rules[1].1,
            RuleNode::branch(vec![(BytePattern::Wildcard, RuleNode::leaf("t_will"))])
        );
    }

    #[test]
    fn test_parse_submode_branch() {
        let src = "
            # CSI
            ESC '[' => t_csi_unknown @csi => {
                'H' => t_cursor_position
                '?' => { 'h' => t_dec_set }
            }
            ESC ']' => t_osc @osc
        ";
        let rules = entries(parse(src).unwrap());
        assert_eq!(rules.len(), 2);
        assert_eq!(
            rules[0].1,
            RuleNode::submode(
                "t_csi_unknown",
                Submode::Csi,
                vec![
                    (BytePattern::literal("H"), RuleNode::leaf("t_cursor_position")),
                    (
                        BytePattern::literal("?"),
                        RuleNode::branch(vec![(
                            BytePattern::literal("h"),
                            RuleNode::leaf("t_dec_set")
                        )])
                    ),
                ]
            )
        );
        assert_eq!(rules[1].1, RuleNode::submode("t_osc", Submode::Osc, vec![]));
    }

    #[test]
    fn test_branch_action_without_submode_is_rejected() {
        let err = parse("ESC => t_x => { 'a' => t_y }").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { line: 1, .. }), "{err}");
    }

    #[test]
    fn test_syntax_error_positions() {
        let err = parse("ESC => t_x\n  'a' t_y").unwrap_err();
        assert_eq!(
            err,
            CompileError::Syntax {
                line: 2,
                column: 7,
                message: "unknown byte name `t_y`".to_string(),
            }
        );
    }

    #[test]
    fn test_syntax_errors() {
        for src in [
            "'abc => t_x",
            "'' => t_x",
            "BOGUS => t_x",
            "[] => t_x",
            "['z'-'a'] => t_x",
            "['ab'] => t_x",
            "ESC => { 'a' => t_x",
            "} ",
            "ESC => t_x @dcs",
            "'\\q' => t_x",
            "0x => t_x",
            "ESC =>",
        ] {
            assert!(
                matches!(parse(src), Err(CompileError::Syntax { .. })),
                "expected syntax error for {src:?}"
            );
        }
    }

    #[test]
    fn test_comments_and_blank_input() {
        let rules = entries(parse("# nothing here\n\n   # still nothing\n").unwrap());
        assert!(rules.is_empty());
    }
}
