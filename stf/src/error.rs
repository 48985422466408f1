// Copyright 2024 Oxide Computer Company

use crate::lexer::Token;
use colored::Colorize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ParserError {
    /// Token where the error was encountered
    pub at: Token,

    /// Message associated with this error.
    pub message: String,

    /// The source line the error occured on.
    pub source: String,
}

impl ParserError {
    pub fn line(&self) -> usize {
        self.at.line
    }
}

impl fmt::Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loc = format!(
            "[{}:{}:{}]",
            self.at.file,
            self.at.line + 1,
            self.at.col + 1
        )
        .as_str()
        .bright_red();
        writeln!(f, "{} {}\n", loc, self.message.bright_white())?;
        writeln!(f, "  {}", self.source)?;
        write!(f, "  {}", carat_line(&self.source, self.at.col, 1).bright_red())
    }
}

impl std::error::Error for ParserError {}

#[derive(Debug, Clone)]
pub struct TokenError {
    /// Line where the token error was encountered.
    pub line: usize,

    /// Column where the token error was encountered.
    pub col: usize,

    /// Length of the erronious token.
    pub len: usize,

    /// What was wrong with the token.
    pub message: String,

    /// The source line the token error occured on.
    pub source: String,

    /// File the token came from.
    pub file: Arc<String>,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loc = format!("[{}:{}:{}]", self.file, self.line + 1, self.col + 1)
            .as_str()
            .bright_red();
        writeln!(f, "{} {}\n", loc, self.message.bright_white())?;
        writeln!(f, "  {}", self.source)?;
        write!(
            f,
            "  {}",
            carat_line(&self.source, self.col, self.len.max(1)).bright_red()
        )
    }
}

impl std::error::Error for TokenError {}

// The presence of tabs makes presenting error indicators purely based on
// column position impossible, so here we iterate over the existing string and
// mask out the non whitespace text inserting the error indicators and
// preserving any tab/space mixture.
fn carat_line(source: &str, col: usize, len: usize) -> String {
    let mut line: String = source
        .chars()
        .enumerate()
        .map(|(i, x)| {
            if i >= col && i < col + len {
                return '^';
            }
            if x.is_whitespace() {
                x
            } else {
                ' '
            }
        })
        .collect();
    // errors at end of line point just past the last character
    if col >= source.chars().count() {
        line.push('^');
    }
    line
}

#[derive(Debug, Clone)]
pub enum Error {
    Lexer(TokenError),
    Parser(ParserError),
}

impl Error {
    /// Zero based line the error was found on.
    pub fn line(&self) -> usize {
        match self {
            Self::Lexer(e) => e.line,
            Self::Parser(e) => e.at.line,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Lexer(e) => &e.message,
            Self::Parser(e) => &e.message,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            Self::Lexer(e) => e.fmt(f),
            Self::Parser(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for Error {}

impl From<TokenError> for Error {
    fn from(e: TokenError) -> Self {
        Self::Lexer(e)
    }
}

impl From<ParserError> for Error {
    fn from(e: ParserError) -> Self {
        Self::Parser(e)
    }
}
