use serde::Serialize;

use crate::error::{SqlError, SqlResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    Keyword,
    Identifier,
    String,
    Number,
    Star,       // *
    Comma,      // ,
    Dot,        // .
    At,         // @
    LeftParen,  // (
    RightParen, // )
    Operator,   // = != > >= < <=
    Semicolon,  // ;
    Eof,
}

/// A lexed token. Keyword text is upper-cased; identifier text keeps its case;
/// string text excludes the quotes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub offset: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, offset: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            offset,
        }
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text == keyword
    }

    /// Human-readable form used in syntax errors.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::String => format!("string '{}'", self.text),
            _ => format!("'{}'", self.text),
        }
    }
}

/// Reserved words. Anything else made of word characters is an identifier.
pub const KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "AND", "OR", "AS", "INNER", "JOIN", "ON", "GROUP", "BY", "HAVING",
    "ORDER", "ASC", "DESC", "LIMIT", "TRUE", "FALSE", "NULL",
    // Statements we recognise only to reject them
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "REPLACE", "MERGE",
    "GRANT", "REVOKE", "INTO", "VALUES", "SET", "WITH", "EXPLAIN", "SHOW",
];

pub struct SqlLexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
}

impl SqlLexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Self {
            input: chars,
            position: 0,
            current_char,
        }
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.current_char {
            self.advance();
            if ch == '\n' {
                break;
            }
        }
    }

    fn read_number(&mut self) -> Token {
        let start = self.position;
        let mut num_str = String::new();
        let mut has_dot = false;

        if self.current_char == Some('-') {
            num_str.push('-');
            self.advance();
        }

        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                num_str.push(ch);
                self.advance();
            } else if ch == '.' && !has_dot && self.peek().is_some_and(|c| c.is_ascii_digit()) {
                has_dot = true;
                num_str.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        Token::new(TokenKind::Number, num_str, start)
    }

    fn read_string(&mut self) -> SqlResult<Token> {
        let start = self.position;
        let quote = self.current_char;
        self.advance(); // opening quote

        let mut string = String::new();

        while let Some(ch) = self.current_char {
            if Some(ch) == quote {
                self.advance(); // closing quote
                return Ok(Token::new(TokenKind::String, string, start));
            }
            string.push(ch);
            self.advance();
        }

        Err(SqlError::UnterminatedString { position: start })
    }

    fn read_word(&mut self) -> Token {
        let start = self.position;
        let mut word = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_alphanumeric() || ch == '_' {
                word.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        let upper = word.to_uppercase();
        if KEYWORDS.contains(&upper.as_str()) {
            Token::new(TokenKind::Keyword, upper, start)
        } else {
            Token::new(TokenKind::Identifier, word, start)
        }
    }

    fn single(&mut self, kind: TokenKind, text: &str) -> Token {
        let token = Token::new(kind, text, self.position);
        self.advance();
        token
    }

    pub fn next_token(&mut self) -> SqlResult<Token> {
        loop {
            self.skip_whitespace();
            if self.current_char == Some('-') && self.peek() == Some('-') {
                self.skip_line_comment();
                continue;
            }
            break;
        }

        let start = self.position;
        let token = match self.current_char {
            None => Token::new(TokenKind::Eof, "", start),

            Some(ch) if ch.is_ascii_digit() => self.read_number(),
            Some('-') if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.read_number(),

            Some('\'') | Some('"') => self.read_string()?,

            Some(ch) if ch.is_alphabetic() || ch == '_' => self.read_word(),

            Some('*') => self.single(TokenKind::Star, "*"),
            Some(',') => self.single(TokenKind::Comma, ","),
            Some('.') => self.single(TokenKind::Dot, "."),
            Some('@') => self.single(TokenKind::At, "@"),
            Some('(') => self.single(TokenKind::LeftParen, "("),
            Some(')') => self.single(TokenKind::RightParen, ")"),
            Some(';') => self.single(TokenKind::Semicolon, ";"),
            Some('=') => self.single(TokenKind::Operator, "="),

            Some('!') => {
                if self.peek() == Some('=') {
                    self.advance();
                    self.single(TokenKind::Operator, "!=")
                } else {
                    return Err(SqlError::UnexpectedCharacter {
                        ch: '!',
                        position: start,
                    });
                }
            }

            Some('<') => {
                self.advance();
                match self.current_char {
                    Some('=') => {
                        self.advance();
                        Token::new(TokenKind::Operator, "<=", start)
                    }
                    Some('>') => {
                        self.advance();
                        Token::new(TokenKind::Operator, "!=", start) // <>
                    }
                    _ => Token::new(TokenKind::Operator, "<", start),
                }
            }

            Some('>') => {
                self.advance();
                if self.current_char == Some('=') {
                    self.advance();
                    Token::new(TokenKind::Operator, ">=", start)
                } else {
                    Token::new(TokenKind::Operator, ">", start)
                }
            }

            Some(ch) => {
                return Err(SqlError::UnexpectedCharacter {
                    ch,
                    position: start,
                });
            }
        };

        Ok(token)
    }

    pub fn tokenize(&mut self) -> SqlResult<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }

        Ok(tokens)
    }
}

/// Tokenize a SQL source string. The result always ends with an EOF token.
pub fn tokenize(source: &str) -> SqlResult<Vec<Token>> {
    SqlLexer::new(source).tokenize()
}
