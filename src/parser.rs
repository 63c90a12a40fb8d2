use std::collections::HashMap;

use crate::ast::{ASTNode, Expression, Function, Prototype};
use crate::lexer::{Lexer, Token};

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum ParserError {
    #[error("expected ')', found {0}")]
    ExpectedCloseParen(Token),
    #[error("expected ',' or ')' in argument list, found {0}")]
    ExpectedArgumentSeparator(Token),
    #[error("unknown token {0} when expecting an expression")]
    UnknownToken(Token),
    #[error("expected function name in prototype, found {0}")]
    ExpectedFunctionName(Token),
    #[error("expected '(' in prototype, found {0}")]
    ExpectedPrototypeOpen(Token),
    #[error("expected ')' in prototype, found {0}")]
    ExpectedPrototypeClose(Token),
}

pub type PartialParseResult = Result<Expression, ParserError>;

/// Binding strength of every binary operator the grammar accepts.
pub fn default_precedence() -> HashMap<char, i32> {
    let mut operator_precedence = HashMap::new();
    operator_precedence.insert('<', 10);
    operator_precedence.insert('+', 20);
    operator_precedence.insert('-', 20);
    operator_precedence.insert('*', 40);
    operator_precedence.insert('/', 40);
    operator_precedence
}

/// Recursive-descent parser holding one token of lookahead.
#[derive(Debug, Clone)]
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token,
    pub operator_precedence: HashMap<char, i32>,
}

impl<'src> Parser<'src> {
    pub fn new(input: &'src str) -> Self {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token();
        Self {
            lexer,
            current,
            operator_precedence: default_precedence(),
        }
    }

    fn advance(&mut self) -> &Token {
        self.current = self.lexer.next_token();
        &self.current
    }

    fn expect_char(&self, c: char) -> bool {
        self.current == Token::Char(c)
    }

    /// Precedence of the current token, -1 for anything that is not a known
    /// binary operator.
    fn token_precedence(&self) -> i32 {
        match self.current {
            Token::Char(op) => self.operator_precedence.get(&op).copied().unwrap_or(-1),
            _ => -1,
        }
    }

    fn parse_number(&mut self, value: f64) -> PartialParseResult {
        self.advance();
        Ok(Expression::Literal(value))
    }

    fn parse_nested(&mut self) -> PartialParseResult {
        self.advance(); // (
        let res = self.parse_expr()?;
        if !self.expect_char(')') {
            return Err(ParserError::ExpectedCloseParen(self.current.clone()));
        }
        self.advance();
        Ok(res)
    }

    fn parse_identifier(&mut self, ident: String) -> PartialParseResult {
        self.advance();
        if !self.expect_char('(') {
            return Ok(Expression::Variable(ident));
        }
        self.advance();

        let mut args = Vec::new();
        if !self.expect_char(')') {
            loop {
                args.push(self.parse_expr()?);
                if self.expect_char(')') {
                    break;
                }
                if !self.expect_char(',') {
                    return Err(ParserError::ExpectedArgumentSeparator(
                        self.current.clone(),
                    ));
                }
                self.advance();
            }
        }
        self.advance(); // )

        Ok(Expression::Call(ident, args))
    }

    fn parse_primary(&mut self) -> PartialParseResult {
        match self.current.clone() {
            Token::Number(value) => self.parse_number(value),
            Token::Ident(ident) => self.parse_identifier(ident),
            Token::Char('(') => self.parse_nested(),
            other => Err(ParserError::UnknownToken(other)),
        }
    }

    /// Precedence climbing: folds `(op primary)*` onto `lhs` while the
    /// operators bind at least as tightly as `expr_precedence`.
    fn parse_rhs(&mut self, expr_precedence: i32, lhs: Expression) -> PartialParseResult {
        let mut result = lhs;

        loop {
            let precedence = self.token_precedence();
            if precedence < expr_precedence {
                return Ok(result);
            }
            let operator = match self.current {
                Token::Char(op) => op,
                _ => return Ok(result),
            };
            self.advance();

            let mut rhs = self.parse_primary()?;

            if precedence < self.token_precedence() {
                rhs = self.parse_rhs(precedence + 1, rhs)?;
            }

            result = Expression::Binary(operator, Box::new(result), Box::new(rhs));
        }
    }

    pub fn parse_expr(&mut self) -> PartialParseResult {
        let lhs = self.parse_primary()?;
        self.parse_rhs(0, lhs)
    }

    pub fn parse_prototype(&mut self) -> Result<Prototype, ParserError> {
        let name = match &self.current {
            Token::Ident(name) => name.clone(),
            other => return Err(ParserError::ExpectedFunctionName(other.clone())),
        };
        self.advance();

        if !self.expect_char('(') {
            return Err(ParserError::ExpectedPrototypeOpen(self.current.clone()));
        }

        let mut args = Vec::new();
        while let Token::Ident(arg) = self.advance() {
            args.push(arg.clone());
        }

        if !self.expect_char(')') {
            return Err(ParserError::ExpectedPrototypeClose(self.current.clone()));
        }
        self.advance();

        Ok(Prototype::new(name, args))
    }

    pub fn parse_definition(&mut self) -> Result<Function, ParserError> {
        self.advance(); // def
        let prototype = self.parse_prototype()?;
        let body = self.parse_expr()?;
        Ok(Function { prototype, body })
    }

    pub fn parse_extern(&mut self) -> Result<Prototype, ParserError> {
        self.advance(); // extern
        self.parse_prototype()
    }

    pub fn parse_top_level_expr(&mut self) -> Result<Function, ParserError> {
        let body = self.parse_expr()?;
        Ok(Function {
            prototype: Prototype::anonymous(),
            body,
        })
    }

    /// Parses the next top-level construct, or `None` once the input is
    /// exhausted. After an error the parser is not resynchronised.
    pub fn parse_top_level(&mut self) -> Option<Result<ASTNode, ParserError>> {
        while self.expect_char(';') {
            self.advance();
        }

        let node = match self.current {
            Token::Eof => return None,
            Token::Def => self.parse_definition().map(ASTNode::Function),
            Token::Extern => self.parse_extern().map(ASTNode::Extern),
            _ => self.parse_top_level_expr().map(ASTNode::TopLevel),
        };
        Some(node)
    }

    pub fn parse_str(input: &str) -> Result<Vec<ASTNode>, ParserError> {
        let mut parser = Parser::new(input);
        let mut ast = Vec::new();
        while let Some(node) = parser.parse_top_level() {
            ast.push(node?);
        }
        Ok(ast)
    }
}
