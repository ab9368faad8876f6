//! SQL front end: lexer, AST and recursive-descent parser.

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::*;
pub use lexer::{tokenize, SqlLexer, Token, TokenKind};
pub use parser::{parse, parse_sql, SqlParser};
