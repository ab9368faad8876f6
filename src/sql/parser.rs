use super::ast::*;
use super::lexer::{tokenize, Token, TokenKind};
use crate::error::{SqlError, SqlResult};
use crate::value::Value;

/// Statements that modify data. They are named in the rejection message.
pub const WRITE_COMMANDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "REPLACE", "MERGE",
    "GRANT", "REVOKE",
];

/// Recursive-descent parser over a token stream.
pub struct SqlParser {
    tokens: Vec<Token>,
    position: usize,
    eof: Token,
}

impl SqlParser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let end = tokens.last().map(|t| t.offset + t.text.len()).unwrap_or(0);
        Self {
            tokens,
            position: 0,
            eof: Token {
                kind: TokenKind::Eof,
                text: String::new(),
                offset: end,
            },
        }
    }

    fn current_token(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&self.eof)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current_token().kind == kind
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        self.current_token().is_keyword(keyword)
    }

    fn error(&self, expected: impl Into<String>) -> SqlError {
        let token = self.current_token();
        SqlError::UnexpectedToken {
            expected: expected.into(),
            found: token.describe(),
            position: token.offset,
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> SqlResult<Token> {
        if self.check(kind) {
            let token = self.current_token().clone();
            self.advance();
            Ok(token)
        } else {
            Err(self.error(what))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> SqlResult<()> {
        if self.check_keyword(keyword) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(keyword))
        }
    }

    fn expect_identifier(&mut self) -> SqlResult<String> {
        self.expect(TokenKind::Identifier, "identifier")
            .map(|t| t.text)
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn parse(&mut self) -> SqlResult<SelectStatement> {
        self.check_command()?;
        let stmt = self.parse_select()?;

        if self.check(TokenKind::Semicolon) {
            self.advance();
        }
        self.expect(TokenKind::Eof, "end of input")?;

        Ok(stmt)
    }

    /// Only SELECT gets past this point.
    fn check_command(&self) -> SqlResult<()> {
        let first = self.current_token();
        match first.kind {
            TokenKind::Eof => Err(SqlError::EmptyQuery),
            _ if first.is_keyword("SELECT") => Ok(()),
            TokenKind::Keyword | TokenKind::Identifier => {
                let command = first.text.to_uppercase();
                if WRITE_COMMANDS.contains(&command.as_str()) {
                    Err(SqlError::WriteNotSupported(command))
                } else {
                    Err(SqlError::UnsupportedCommand(command))
                }
            }
            _ => Err(self.error("SELECT")),
        }
    }

    fn parse_select(&mut self) -> SqlResult<SelectStatement> {
        self.expect_keyword("SELECT")?;

        let columns = self.parse_column_list()?;

        self.expect_keyword("FROM")?;
        let (from, index_hint) = self.parse_table_ref()?;

        let joins = self.parse_joins()?;

        let where_clause = if self.consume_keyword("WHERE") {
            Some(self.parse_or_expression()?)
        } else {
            None
        };

        let group_by = if self.consume_keyword("GROUP") {
            self.expect_keyword("BY")?;
            self.parse_group_by_list()?
        } else {
            Vec::new()
        };

        let having = if self.consume_keyword("HAVING") {
            Some(self.parse_or_expression()?)
        } else {
            None
        };

        let order_by = if self.consume_keyword("ORDER") {
            self.expect_keyword("BY")?;
            self.parse_order_by_list()?
        } else {
            Vec::new()
        };

        let limit = if self.consume_keyword("LIMIT") {
            let token = self.current_token();
            match (token.kind, token.text.parse::<usize>()) {
                (TokenKind::Number, Ok(n)) => {
                    self.advance();
                    Some(n)
                }
                _ => return Err(self.error("non-negative integer after LIMIT")),
            }
        } else {
            None
        };

        Ok(SelectStatement {
            columns,
            from,
            index_hint,
            joins,
            where_clause,
            group_by,
            having,
            order_by,
            limit,
        })
    }

    fn parse_column_list(&mut self) -> SqlResult<Vec<ColumnExpression>> {
        if self.check(TokenKind::Star) {
            self.advance();
            return Ok(vec![ColumnExpression::Star]);
        }

        let mut columns = Vec::new();
        loop {
            columns.push(self.parse_column()?);
            if self.check(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(columns)
    }

    fn parse_column(&mut self) -> SqlResult<ColumnExpression> {
        let name = self.expect_identifier()?;

        if self.check(TokenKind::LeftParen) {
            let args = self.parse_function_args()?;
            let alias = self.parse_optional_alias()?;
            return Ok(ColumnExpression::Function(FunctionCall {
                name: name.to_uppercase(),
                args,
                alias,
            }));
        }

        if self.check(TokenKind::Dot) {
            self.advance();
            if self.check(TokenKind::Star) {
                self.advance();
                return Ok(ColumnExpression::TableStar(name));
            }
            let field = self.expect_identifier()?;
            let alias = self.parse_optional_alias()?;
            return Ok(ColumnExpression::Column {
                table: Some(name),
                name: field,
                alias,
            });
        }

        let alias = self.parse_optional_alias()?;
        Ok(ColumnExpression::Column {
            table: None,
            name,
            alias,
        })
    }

    fn parse_optional_alias(&mut self) -> SqlResult<Option<String>> {
        if self.consume_keyword("AS") {
            Ok(Some(self.expect_identifier()?))
        } else {
            Ok(None)
        }
    }

    /// `( arg, ... )` where an arg is `*`, `name`, `table.name`, `table.*` or a
    /// nested call.
    fn parse_function_args(&mut self) -> SqlResult<Vec<ColumnExpression>> {
        self.expect(TokenKind::LeftParen, "'('")?;

        let mut args = Vec::new();
        if self.check(TokenKind::RightParen) {
            self.advance();
            return Ok(args);
        }

        loop {
            let arg = if self.check(TokenKind::Star) {
                self.advance();
                ColumnExpression::Star
            } else {
                let name = self.expect_identifier()?;
                if self.check(TokenKind::LeftParen) {
                    ColumnExpression::Function(FunctionCall {
                        name: name.to_uppercase(),
                        args: self.parse_function_args()?,
                        alias: None,
                    })
                } else if self.check(TokenKind::Dot) {
                    self.advance();
                    if self.check(TokenKind::Star) {
                        self.advance();
                        ColumnExpression::TableStar(name)
                    } else {
                        ColumnExpression::Column {
                            table: Some(name),
                            name: self.expect_identifier()?,
                            alias: None,
                        }
                    }
                } else {
                    ColumnExpression::Column {
                        table: None,
                        name,
                        alias: None,
                    }
                }
            };
            args.push(arg);

            if self.check(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }

        self.expect(TokenKind::RightParen, "')'")?;
        Ok(args)
    }

    /// `table` or `table@index`
    fn parse_table_ref(&mut self) -> SqlResult<(String, Option<String>)> {
        let table = self.expect_identifier()?;
        let hint = if self.check(TokenKind::At) {
            self.advance();
            Some(self.expect_identifier()?)
        } else {
            None
        };
        Ok((table, hint))
    }

    fn parse_joins(&mut self) -> SqlResult<Vec<JoinClause>> {
        let mut joins = Vec::new();

        loop {
            if self.consume_keyword("INNER") {
                self.expect_keyword("JOIN")?;
            } else if !self.consume_keyword("JOIN") {
                break;
            }

            let (table, index_hint) = self.parse_table_ref()?;
            self.expect_keyword("ON")?;

            let mut conditions = vec![self.parse_join_condition()?];
            while self.consume_keyword("AND") {
                conditions.push(self.parse_join_condition()?);
            }

            joins.push(JoinClause {
                table,
                index_hint,
                conditions,
            });
        }

        Ok(joins)
    }

    fn parse_qualified_name(&mut self) -> SqlResult<(String, String)> {
        let table = self.expect_identifier()?;
        self.expect(TokenKind::Dot, "'.' (join columns must be table-qualified)")?;
        let field = self.expect_identifier()?;
        Ok((table, field))
    }

    fn parse_join_condition(&mut self) -> SqlResult<JoinCondition> {
        let (left_table, left_field) = self.parse_qualified_name()?;
        if !(self.check(TokenKind::Operator) && self.current_token().text == "=") {
            return Err(self.error("'=' in JOIN condition"));
        }
        self.advance();
        let (right_table, right_field) = self.parse_qualified_name()?;

        Ok(JoinCondition {
            left_table,
            left_field,
            right_table,
            right_field,
        })
    }

    fn parse_or_expression(&mut self) -> SqlResult<WhereClause> {
        let mut left = self.parse_and_expression()?;

        while self.consume_keyword("OR") {
            let right = self.parse_and_expression()?;
            left = WhereClause::Or(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_and_expression(&mut self) -> SqlResult<WhereClause> {
        let mut left = self.parse_comparison()?;

        while self.consume_keyword("AND") {
            let right = self.parse_comparison()?;
            left = WhereClause::And(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_comparison(&mut self) -> SqlResult<WhereClause> {
        if self.check(TokenKind::LeftParen) {
            self.advance();
            let inner = self.parse_or_expression()?;
            self.expect(TokenKind::RightParen, "')'")?;
            return Ok(inner);
        }

        let name = self.expect_identifier()?;

        let (table, field, function) = if self.check(TokenKind::LeftParen) {
            let call = FunctionCall {
                name: name.to_uppercase(),
                args: self.parse_function_args()?,
                alias: None,
            };
            (None, call.signature(), Some(call))
        } else if self.check(TokenKind::Dot) {
            self.advance();
            (Some(name), self.expect_identifier()?, None)
        } else {
            (None, name, None)
        };

        let operator = match self.current_token() {
            t if t.kind == TokenKind::Operator => ComparisonOperator::from_symbol(&t.text),
            _ => None,
        }
        .ok_or_else(|| self.error("comparison operator"))?;
        self.advance();

        let value = self.parse_literal()?;

        Ok(WhereClause::Comparison(Comparison {
            table,
            field,
            operator,
            value,
            function,
        }))
    }

    fn parse_literal(&mut self) -> SqlResult<Value> {
        let token = self.current_token().clone();
        let value = match token.kind {
            TokenKind::String => Value::String(token.text),
            TokenKind::Number => token
                .text
                .parse::<f64>()
                .map(Value::Number)
                .map_err(|_| self.error("number"))?,
            TokenKind::Keyword if token.text == "TRUE" => Value::Boolean(true),
            TokenKind::Keyword if token.text == "FALSE" => Value::Boolean(false),
            TokenKind::Keyword if token.text == "NULL" => Value::Null,
            _ => return Err(self.error("literal value")),
        };
        self.advance();
        Ok(value)
    }

    fn parse_group_by_list(&mut self) -> SqlResult<Vec<GroupByClause>> {
        let mut items = Vec::new();

        loop {
            let (table, field) = self.parse_optionally_qualified()?;
            items.push(GroupByClause { table, field });

            if self.check(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }

        Ok(items)
    }

    fn parse_order_by_list(&mut self) -> SqlResult<Vec<OrderByClause>> {
        let mut items = Vec::new();

        loop {
            let (table, field) = self.parse_optionally_qualified()?;

            let direction = if self.consume_keyword("DESC") {
                SortDirection::Desc
            } else {
                self.consume_keyword("ASC");
                SortDirection::Asc
            };

            items.push(OrderByClause {
                table,
                field,
                direction,
            });

            if self.check(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }

        Ok(items)
    }

    fn parse_optionally_qualified(&mut self) -> SqlResult<(Option<String>, String)> {
        let first = self.expect_identifier()?;
        if self.check(TokenKind::Dot) {
            self.advance();
            Ok((Some(first), self.expect_identifier()?))
        } else {
            Ok((None, first))
        }
    }
}

/// Parse a token stream into a SELECT statement.
pub fn parse(tokens: Vec<Token>) -> SqlResult<SelectStatement> {
    SqlParser::new(tokens).parse()
}

/// Tokenize and parse in one step.
pub fn parse_sql(source: &str) -> SqlResult<SelectStatement> {
    parse(tokenize(source)?)
}
