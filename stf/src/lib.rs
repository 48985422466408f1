// Copyright 2024 Oxide Computer Company

pub mod ast;
pub mod error;
pub mod lexer;
pub mod number;
pub mod parser;

use std::sync::Arc;

/// Parse scenario text. `file` is only used for error locations.
pub fn parse(text: &str, file: Arc<String>, show_tokens: bool) -> ast::Scenario {
    let lines: Vec<&str> = text.lines().collect();
    let mut lexer = lexer::Lexer::new(lines, file);
    lexer.show_tokens = show_tokens;
    let mut parser = parser::Parser::new(lexer);
    parser.run()
}
