use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::{
    ArithmeticOp, ComparisonOp, Expression, LogicalOp, Program, Statement, VariablePath,
};
use crate::lexer::{LexError, Lexer};
use crate::runtime::{Class, Method};
use crate::token::Token;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("Expected {expected}, got {found}")]
    UnexpectedToken { expected: String, found: String },
    #[error("Unknown class '{name}'")]
    UnknownClass { name: String },
    #[error("Unknown base class '{name}'")]
    UnknownBaseClass { name: String },
    #[error("Invalid assignment target")]
    InvalidAssignmentTarget,
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Recursive-descent parser over the lexer's one-token-lookahead stream.
///
/// Class definitions are resolved eagerly: the parser assembles
/// `runtime::Class` objects as it encounters them so that base-class
/// references and instantiation sites can share the object via `Rc`.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    classes: HashMap<String, Rc<Class>>,
}

impl<'a> Parser<'a> {
    pub fn new(lexer: Lexer<'a>) -> Self {
        Self {
            lexer,
            classes: HashMap::new(),
        }
    }

    pub fn parse_program(mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();
        while !matches!(self.lexer.current(), Token::Eof) {
            if self.consume_newlines()? {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        match self.lexer.current() {
            Token::Class => self.parse_class_definition(),
            Token::If => self.parse_if_else(),
            Token::Return => self.parse_return(),
            Token::Print => self.parse_print(),
            _ => self.parse_assignment_or_expression(),
        }
    }

    fn parse_class_definition(&mut self) -> ParseResult<Statement> {
        self.advance()?; // class
        let name = self.expect_id()?;
        let parent = if matches!(self.lexer.current(), Token::Char('(')) {
            self.advance()?;
            let base = self.expect_id()?;
            let class = self
                .classes
                .get(&base)
                .cloned()
                .ok_or(ParseError::UnknownBaseClass { name: base })?;
            self.expect_char(')')?;
            Some(class)
        } else {
            None
        };
        self.expect_char(':')?;
        self.expect_token(&Token::Newline)?;
        self.expect_token(&Token::Indent)?;

        let mut methods = Vec::new();
        while !matches!(self.lexer.current(), Token::Dedent | Token::Eof) {
            if self.consume_newlines()? {
                continue;
            }
            methods.push(self.parse_method()?);
        }
        self.consume_dedent()?;

        let class = Rc::new(Class::new(name.clone(), methods, parent));
        self.classes.insert(name, Rc::clone(&class));
        Ok(Statement::ClassDefinition(class))
    }

    fn parse_method(&mut self) -> ParseResult<Method> {
        self.expect_token(&Token::Def)?;
        let name = self.expect_id()?;
        self.expect_char('(')?;
        let mut formal_params = Vec::new();
        if !matches!(self.lexer.current(), Token::Char(')')) {
            formal_params.push(self.expect_id()?);
            while matches!(self.lexer.current(), Token::Char(',')) {
                self.advance()?;
                formal_params.push(self.expect_id()?);
            }
        }
        self.expect_char(')')?;
        self.expect_char(':')?;
        // The receiver is bound by the call protocol, not positionally.
        if formal_params.first().is_some_and(|param| param == "self") {
            formal_params.remove(0);
        }
        let body = self.parse_suite()?;
        Ok(Method {
            name,
            formal_params,
            body,
        })
    }

    fn parse_if_else(&mut self) -> ParseResult<Statement> {
        self.advance()?; // if
        let condition = self.parse_expression()?;
        self.expect_char(':')?;
        let then_body = self.parse_suite()?;
        let mut else_body = Vec::new();
        if matches!(self.lexer.current(), Token::Else) {
            self.advance()?;
            self.expect_char(':')?;
            else_body = self.parse_suite()?;
        }
        Ok(Statement::IfElse {
            condition,
            then_body,
            else_body,
        })
    }

    fn parse_return(&mut self) -> ParseResult<Statement> {
        self.advance()?; // return
        if matches!(self.lexer.current(), Token::Newline | Token::Eof) {
            self.end_statement()?;
            return Ok(Statement::Return(Expression::None));
        }
        let value = self.parse_expression()?;
        self.end_statement()?;
        Ok(Statement::Return(value))
    }

    fn parse_print(&mut self) -> ParseResult<Statement> {
        self.advance()?; // print
        let mut args = Vec::new();
        if !matches!(self.lexer.current(), Token::Newline | Token::Eof) {
            args.push(self.parse_expression()?);
            while matches!(self.lexer.current(), Token::Char(',')) {
                self.advance()?;
                args.push(self.parse_expression()?);
            }
        }
        self.end_statement()?;
        Ok(Statement::Print(args))
    }

    fn parse_assignment_or_expression(&mut self) -> ParseResult<Statement> {
        let expr = self.parse_expression()?;
        if !matches!(self.lexer.current(), Token::Char('=')) {
            self.end_statement()?;
            return Ok(Statement::Expr(expr));
        }
        self.advance()?;
        let value = self.parse_expression()?;
        self.end_statement()?;
        match expr {
            Expression::Variable(mut path) => {
                if let Some(field) = path.fields.pop() {
                    Ok(Statement::FieldAssignment {
                        object: path,
                        field,
                        value,
                    })
                } else {
                    Ok(Statement::Assignment {
                        var: path.name,
                        value,
                    })
                }
            }
            _ => Err(ParseError::InvalidAssignmentTarget),
        }
    }

    /// `NEWLINE INDENT statement+ DEDENT`
    fn parse_suite(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect_token(&Token::Newline)?;
        self.expect_token(&Token::Indent)?;
        let mut body = Vec::new();
        while !matches!(self.lexer.current(), Token::Dedent | Token::Eof) {
            if self.consume_newlines()? {
                continue;
            }
            body.push(self.parse_statement()?);
        }
        self.consume_dedent()?;
        Ok(body)
    }

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_and()?;
        while matches!(self.lexer.current(), Token::Or) {
            self.advance()?;
            let right = self.parse_and()?;
            expr = Expression::Logical {
                op: LogicalOp::Or,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_not()?;
        while matches!(self.lexer.current(), Token::And) {
            self.advance()?;
            let right = self.parse_not()?;
            expr = Expression::Logical {
                op: LogicalOp::And,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> ParseResult<Expression> {
        if matches!(self.lexer.current(), Token::Not) {
            self.advance()?;
            let argument = self.parse_not()?;
            return Ok(Expression::Not(Box::new(argument)));
        }
        self.parse_comparison()
    }

    /// A single, non-associative comparison level.
    fn parse_comparison(&mut self) -> ParseResult<Expression> {
        let expr = self.parse_additive()?;
        let op = match self.lexer.current() {
            Token::Eq => ComparisonOp::Equal,
            Token::NotEq => ComparisonOp::NotEqual,
            Token::Char('<') => ComparisonOp::Less,
            Token::Char('>') => ComparisonOp::Greater,
            Token::LessOrEq => ComparisonOp::LessOrEqual,
            Token::GreaterOrEq => ComparisonOp::GreaterOrEqual,
            _ => return Ok(expr),
        };
        self.advance()?;
        let right = self.parse_additive()?;
        Ok(Expression::Comparison {
            op,
            left: Box::new(expr),
            right: Box::new(right),
        })
    }

    fn parse_additive(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.lexer.current() {
                Token::Char('+') => ArithmeticOp::Add,
                Token::Char('-') => ArithmeticOp::Sub,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_multiplicative()?;
            expr = Expression::Arithmetic {
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_primary()?;
        loop {
            let op = match self.lexer.current() {
                Token::Char('*') => ArithmeticOp::Mul,
                Token::Char('/') => ArithmeticOp::Div,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_primary()?;
            expr = Expression::Arithmetic {
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        match self.lexer.current() {
            Token::Number(value) => {
                let value = *value;
                self.advance()?;
                Ok(Expression::Number(value))
            }
            Token::Str(text) => {
                let text = text.clone();
                self.advance()?;
                Ok(Expression::Str(text))
            }
            Token::True => {
                self.advance()?;
                Ok(Expression::Bool(true))
            }
            Token::False => {
                self.advance()?;
                Ok(Expression::Bool(false))
            }
            Token::None => {
                self.advance()?;
                Ok(Expression::None)
            }
            Token::Char('(') => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect_char(')')?;
                self.parse_postfix_calls(expr)
            }
            Token::Id(_) => self.parse_name_expression(),
            other => Err(ParseError::UnexpectedToken {
                expected: "an expression".to_string(),
                found: other.to_string(),
            }),
        }
    }

    /// Parses an identifier-rooted expression: a dotted read path,
    /// optionally ending in a call. A call on a bare name instantiates a
    /// class (`Point(1, 2)`); a call after a dot invokes a method. `str(x)`
    /// is the built-in coercion form.
    fn parse_name_expression(&mut self) -> ParseResult<Expression> {
        let name = self.expect_id()?;
        if name == "str" && matches!(self.lexer.current(), Token::Char('(')) {
            self.advance()?;
            let argument = self.parse_expression()?;
            self.expect_char(')')?;
            return self.parse_postfix_calls(Expression::Stringify(Box::new(argument)));
        }

        let mut path = VariablePath {
            name,
            fields: Vec::new(),
        };
        loop {
            match self.lexer.current() {
                Token::Char('.') => {
                    self.advance()?;
                    path.fields.push(self.expect_id()?);
                }
                Token::Char('(') => {
                    let args = self.parse_call_args()?;
                    let expr = if let Some(method) = path.fields.pop() {
                        Expression::MethodCall {
                            object: Box::new(Expression::Variable(path)),
                            method,
                            args,
                        }
                    } else {
                        let class = self.lookup_class(&path.name)?;
                        Expression::NewInstance { class, args }
                    };
                    return self.parse_postfix_calls(expr);
                }
                _ => return Ok(Expression::Variable(path)),
            }
        }
    }

    /// Method-call chains on a computed value (`B().g().h()`). Field reads
    /// only root at variables, so a dot here must introduce a call.
    fn parse_postfix_calls(&mut self, mut expr: Expression) -> ParseResult<Expression> {
        while matches!(self.lexer.current(), Token::Char('.')) {
            self.advance()?;
            let method = self.expect_id()?;
            if !matches!(self.lexer.current(), Token::Char('(')) {
                return Err(ParseError::UnexpectedToken {
                    expected: Token::Char('(').to_string(),
                    found: self.lexer.current().to_string(),
                });
            }
            let args = self.parse_call_args()?;
            expr = Expression::MethodCall {
                object: Box::new(expr),
                method,
                args,
            };
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> ParseResult<Vec<Expression>> {
        self.expect_char('(')?;
        let mut args = Vec::new();
        if !matches!(self.lexer.current(), Token::Char(')')) {
            args.push(self.parse_expression()?);
            while matches!(self.lexer.current(), Token::Char(',')) {
                self.advance()?;
                args.push(self.parse_expression()?);
            }
        }
        self.expect_char(')')?;
        Ok(args)
    }

    fn lookup_class(&self, name: &str) -> ParseResult<Rc<Class>> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| ParseError::UnknownClass {
                name: name.to_string(),
            })
    }

    fn advance(&mut self) -> ParseResult<()> {
        self.lexer.next_token()?;
        Ok(())
    }

    fn expect_token(&mut self, expected: &Token) -> ParseResult<()> {
        self.lexer.expect(expected)?;
        self.advance()
    }

    fn expect_char(&mut self, ch: char) -> ParseResult<()> {
        self.expect_token(&Token::Char(ch))
    }

    fn expect_id(&mut self) -> ParseResult<String> {
        let name = self.lexer.expect_id()?.to_string();
        self.advance()?;
        Ok(name)
    }

    fn consume_newlines(&mut self) -> ParseResult<bool> {
        let mut consumed = false;
        while matches!(self.lexer.current(), Token::Newline) {
            self.advance()?;
            consumed = true;
        }
        Ok(consumed)
    }

    /// Block terminator; a file may end inside a block.
    fn consume_dedent(&mut self) -> ParseResult<()> {
        if matches!(self.lexer.current(), Token::Dedent) {
            self.advance()?;
        }
        Ok(())
    }

    /// Statement terminator: a logical line end, or the end of the file.
    fn end_statement(&mut self) -> ParseResult<()> {
        match self.lexer.current() {
            Token::Newline => self.advance(),
            Token::Eof => Ok(()),
            other => Err(ParseError::UnexpectedToken {
                expected: Token::Newline.to_string(),
                found: other.to_string(),
            }),
        }
    }
}

/// Parses a whole source text into a program.
pub fn parse(input: &str) -> ParseResult<Program> {
    let lexer = Lexer::new(input)?;
    Parser::new(lexer).parse_program()
}
