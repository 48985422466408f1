// Copyright 2024 Oxide Computer Company

use crate::ast::Directive;
use crate::error::TokenError;
use crate::number::Number;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum Kind {
    //
    // statement keywords
    //
    Add,
    SetDefault,
    Remove,
    Expect,
    NoPacket,
    Packet,
    Wait,
    CheckCounter,
    Directive(Directive),

    //
    // lexical elements
    //
    ParenOpen,
    ParenClose,
    SquareOpen,
    SquareClose,
    Colon,
    Comma,
    Dot,
    DotDot,
    Forwardslash,
    Mask,

    //
    // operators
    //
    Equals,
    DoubleEquals,
    NotEquals,
    AngleOpen,
    AngleClose,
    LessThanEquals,
    GreaterThanEquals,

    //
    // literals
    //
    Number(Number),
    Identifier(String),

    /// Raw text taken from the remainder of a line.
    Data(String),

    Newline,
    Eof,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            Kind::Add => write!(f, "keyword add"),
            Kind::SetDefault => write!(f, "keyword setdefault"),
            Kind::Remove => write!(f, "keyword remove"),
            Kind::Expect => write!(f, "keyword expect"),
            Kind::NoPacket => write!(f, "keyword no_packet"),
            Kind::Packet => write!(f, "keyword packet"),
            Kind::Wait => write!(f, "keyword wait"),
            Kind::CheckCounter => write!(f, "keyword check_counter"),
            Kind::Directive(d) => write!(f, "directive {}", d),

            Kind::ParenOpen => write!(f, "("),
            Kind::ParenClose => write!(f, ")"),
            Kind::SquareOpen => write!(f, "["),
            Kind::SquareClose => write!(f, "]"),
            Kind::Colon => write!(f, ":"),
            Kind::Comma => write!(f, ","),
            Kind::Dot => write!(f, "."),
            Kind::DotDot => write!(f, ".."),
            Kind::Forwardslash => write!(f, "/"),
            Kind::Mask => write!(f, "&&&"),

            Kind::Equals => write!(f, "="),
            Kind::DoubleEquals => write!(f, "=="),
            Kind::NotEquals => write!(f, "!="),
            Kind::AngleOpen => write!(f, "<"),
            Kind::AngleClose => write!(f, ">"),
            Kind::LessThanEquals => write!(f, "<="),
            Kind::GreaterThanEquals => write!(f, ">="),

            Kind::Number(n) => write!(f, "numeric literal {}", n),
            Kind::Identifier(id) => write!(f, "identifier {}", id),
            Kind::Data(d) => write!(f, "data '{}'", d),

            Kind::Newline => write!(f, "end of line"),
            Kind::Eof => write!(f, "end of file"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The kind of token this is.
    pub kind: Kind,

    /// Line number of this token.
    pub line: usize,

    /// Column number of the first character in this token.
    pub col: usize,

    /// The file this token came from.
    pub file: Arc<String>,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {:?}", self.line, self.col, self.kind)
    }
}

/// Line oriented lexer. Every line of input ends with a `Newline` token and
/// the input as a whole ends with `Eof`. Statement keywords are only
/// recognized as the first token on a line, so names elsewhere may reuse
/// them. Comments start with `#` and run to the end of the line.
pub struct Lexer<'a> {
    pub line: usize,
    pub col: usize,
    pub show_tokens: bool,

    pub(crate) lines: Vec<&'a str>,
    pub(crate) file: Arc<String>,
    cursor: &'a str,
    line_start: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(lines: Vec<&'a str>, file: Arc<String>) -> Self {
        let cursor = lines.first().copied().unwrap_or("");
        Self {
            cursor,
            line: 0,
            col: 0,
            lines,
            file,
            show_tokens: false,
            line_start: true,
        }
    }

    pub fn next(&mut self) -> Result<Token, TokenError> {
        let token = self.do_next()?;
        if self.show_tokens {
            println!("{}", token);
        }
        Ok(token)
    }

    fn do_next(&mut self) -> Result<Token, TokenError> {
        if self.line >= self.lines.len() {
            return Ok(self.token(Kind::Eof, self.col));
        }

        self.skip_whitespace();

        if self.cursor.is_empty() || self.cursor.starts_with('#') {
            let token = self.token(Kind::Newline, self.col);
            self.skip_line();
            return Ok(token);
        }

        let line_start = self.line_start;
        self.line_start = false;

        for (text, kind) in [
            ("&&&", Kind::Mask),
            ("..", Kind::DotDot),
            ("==", Kind::DoubleEquals),
            ("!=", Kind::NotEquals),
            ("<=", Kind::LessThanEquals),
            (">=", Kind::GreaterThanEquals),
            ("(", Kind::ParenOpen),
            (")", Kind::ParenClose),
            ("[", Kind::SquareOpen),
            ("]", Kind::SquareClose),
            (":", Kind::Colon),
            (",", Kind::Comma),
            (".", Kind::Dot),
            ("/", Kind::Forwardslash),
            ("=", Kind::Equals),
            ("<", Kind::AngleOpen),
            (">", Kind::AngleClose),
        ] {
            if let Some(t) = self.match_token(text, kind) {
                return Ok(t);
            }
        }

        if let Some(t) = self.match_integer()? {
            return Ok(t);
        }

        if let Some(t) = self.match_identifier(line_start) {
            return Ok(t);
        }

        let len = self.peek_token().len().max(1);
        Err(self.error(len, "unrecognized token"))
    }

    /// Consume the rest of the current line, up to any comment, as a single
    /// `Data` token. The next token returned after this is `Newline`.
    pub fn rest_of_line(&mut self) -> Token {
        self.skip_whitespace();
        let col = self.col;
        let end = self.cursor.find('#').unwrap_or(self.cursor.len());
        let text = self.cursor[..end].trim_end().to_string();
        self.col += end;
        self.cursor = &self.cursor[end..];
        self.line_start = false;
        self.token(Kind::Data(text), col)
    }

    /// Abandon whatever remains of the current line.
    pub fn skip_line(&mut self) {
        self.line += 1;
        self.col = 0;
        self.cursor = self.lines.get(self.line).copied().unwrap_or("");
        self.line_start = true;
    }

    /// True when nothing has been consumed from the current line yet.
    pub fn at_line_start(&self) -> bool {
        self.line_start
    }

    fn token(&self, kind: Kind, col: usize) -> Token {
        Token {
            kind,
            col,
            line: self.line,
            file: self.file.clone(),
        }
    }

    fn error(&self, len: usize, message: &str) -> TokenError {
        TokenError {
            line: self.line,
            col: self.col,
            len,
            message: message.into(),
            source: self.lines.get(self.line).copied().unwrap_or("").into(),
            file: self.file.clone(),
        }
    }

    fn advance(&mut self, len: usize) {
        self.col += len;
        self.cursor = &self.cursor[len..];
    }

    fn match_token(&mut self, text: &str, kind: Kind) -> Option<Token> {
        if self.cursor.starts_with(text) {
            let token = self.token(kind, self.col);
            self.advance(text.len());
            Some(token)
        } else {
            None
        }
    }

    fn match_integer(&mut self) -> Result<Option<Token>, TokenError> {
        if !self.cursor.starts_with(|c: char| c.is_ascii_digit()) {
            return Ok(None);
        }
        let tok = self.peek_token();
        let len = tok.len();
        match Number::parse(tok) {
            Some(n) => {
                let token = self.token(Kind::Number(n), self.col);
                self.advance(len);
                Ok(Some(token))
            }
            None => Err(self.error(
                len,
                &format!("invalid numeric literal '{}'", tok),
            )),
        }
    }

    fn match_identifier(&mut self, line_start: bool) -> Option<Token> {
        let tok = self.peek_token();
        let len = tok.len();
        let mut chars = tok.chars();
        match chars.next() {
            Some(c) if Self::is_letter(c) => {}
            _ => return None,
        }
        if !chars.all(|c| Self::is_letter(c) || c.is_ascii_digit()) {
            return None;
        }
        let kind = match line_start {
            true => Self::keyword(tok),
            false => None,
        };
        let kind = kind.unwrap_or_else(|| Kind::Identifier(tok.into()));
        let token = self.token(kind, self.col);
        self.advance(len);
        Some(token)
    }

    fn keyword(text: &str) -> Option<Kind> {
        Some(match text {
            "add" => Kind::Add,
            "setdefault" => Kind::SetDefault,
            "remove" => Kind::Remove,
            "expect" => Kind::Expect,
            "no_packet" => Kind::NoPacket,
            "packet" => Kind::Packet,
            "wait" => Kind::Wait,
            "check_counter" => Kind::CheckCounter,
            verb => Kind::Directive(Directive::from_verb(verb)?),
        })
    }

    fn is_letter(c: char) -> bool {
        c.is_ascii_alphabetic() || c == '_' || c == '$'
    }

    fn skip_whitespace(&mut self) {
        let n = self
            .cursor
            .find(|c: char| !c.is_whitespace())
            .unwrap_or(self.cursor.len());
        self.advance(n);
    }

    fn peek_token(&self) -> &'a str {
        let end = self
            .cursor
            .find(Self::is_separator)
            .unwrap_or(self.cursor.len());
        &self.cursor[..end]
    }

    fn is_separator(c: char) -> bool {
        c.is_whitespace()
            || matches!(
                c,
                '.' | '['
                    | ']'
                    | '('
                    | ')'
                    | ':'
                    | '/'
                    | ','
                    | '='
                    | '!'
                    | '<'
                    | '>'
                    | '&'
                    | '#'
            )
    }
}
