use thiserror::Error;

use crate::token::Token;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("Unexpected character '{character}' at position {position}")]
    UnexpectedCharacter { character: char, position: usize },
    #[error("Expected a two-character comparison operator at position {position}, got '{found}'")]
    BadComparisonOperator { found: String, position: usize },
    #[error("Unterminated string literal at position {position}")]
    UnterminatedString { position: usize },
    #[error("Number literal '{literal}' is out of range at position {position}")]
    NumberOutOfRange { literal: String, position: usize },
    #[error("Expected {expected}, got {found}")]
    UnexpectedToken { expected: String, found: String },
}

pub type LexResult<T> = Result<T, LexError>;

/// Scanner with one token of lookahead.
///
/// Indentation is tracked in two-space units. A change of depth between
/// logical lines is held in `indent_diff` and drained as a burst of
/// `Indent` or `Dedent` tokens before normal scanning resumes. Runs of
/// blank and comment lines collapse into a single logical line end.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    indent: i32,
    indent_diff: i32,
    token: Token,
}

impl<'a> Lexer<'a> {
    /// Builds a lexer and primes it so that `current()` already holds the
    /// first token of the stream.
    pub fn new(input: &'a str) -> LexResult<Self> {
        let mut lexer = Self {
            input,
            pos: 0,
            indent: 0,
            indent_diff: 0,
            token: Token::Newline,
        };
        lexer.skip_useless();
        lexer.next_token()?;
        Ok(lexer)
    }

    /// Most recently produced token; never advances.
    pub fn current(&self) -> &Token {
        &self.token
    }

    /// Advances the stream and returns the new current token.
    pub fn next_token(&mut self) -> LexResult<&Token> {
        let token = self.scan_token()?;
        self.token = token;
        Ok(&self.token)
    }

    /// Fails with `LexError::UnexpectedToken` unless the current token
    /// equals `expected`.
    pub fn expect(&self, expected: &Token) -> LexResult<()> {
        if self.token == *expected {
            return Ok(());
        }
        Err(LexError::UnexpectedToken {
            expected: expected.to_string(),
            found: self.token.to_string(),
        })
    }

    /// Returns the current token's identifier payload or fails.
    pub fn expect_id(&self) -> LexResult<&str> {
        match &self.token {
            Token::Id(name) => Ok(name),
            other => Err(LexError::UnexpectedToken {
                expected: "Id".to_string(),
                found: other.to_string(),
            }),
        }
    }

    /// Advances, then asserts the new current token equals `expected`.
    pub fn expect_next(&mut self, expected: &Token) -> LexResult<()> {
        self.next_token()?;
        self.expect(expected)
    }

    fn scan_token(&mut self) -> LexResult<Token> {
        if self.token == Token::Eof {
            return Ok(Token::Eof);
        }
        if self.token == Token::Newline {
            self.skip_useless();
        }
        if self.indent_diff != 0 {
            return Ok(self.pending_indentation());
        }

        // Spaces inside a line carry no meaning.
        while self.peek() == Some(' ') {
            self.bump();
        }

        let Some(ch) = self.peek() else {
            // Close the last logical line before the terminal token.
            if matches!(self.token, Token::Indent | Token::Dedent | Token::Newline) {
                return Ok(Token::Eof);
            }
            return Ok(Token::Newline);
        };

        match ch {
            '\n' => {
                self.bump();
                Ok(Token::Newline)
            }
            '#' => {
                self.discard_line();
                self.skip_useless();
                match self.peek() {
                    None => Ok(Token::Eof),
                    Some('#') => self.scan_token(),
                    Some(_) => Ok(Token::Newline),
                }
            }
            quote @ ('\'' | '"') => {
                let start = self.pos;
                self.bump();
                self.read_string_literal(quote, start)
            }
            '=' if self.peek_second() != Some('=') => {
                self.bump();
                Ok(Token::Char('='))
            }
            '=' | '!' | '<' | '>' if self.peek_second() == Some('=') => {
                self.read_comparison_operator()
            }
            c if c.is_ascii_digit() => self.read_number(),
            c if c.is_ascii_alphabetic() || c == '_' => Ok(self.read_name()),
            '.' | ',' | ':' | '+' | '-' | '*' | '/' | '(' | ')' | '<' | '>' => {
                self.bump();
                Ok(Token::Char(ch))
            }
            _ => Err(LexError::UnexpectedCharacter {
                character: ch,
                position: self.pos,
            }),
        }
    }

    /// Drains one pending indentation step toward zero.
    fn pending_indentation(&mut self) -> Token {
        if self.indent_diff > 0 {
            self.indent_diff -= 1;
            Token::Indent
        } else {
            self.indent_diff += 1;
            Token::Dedent
        }
    }

    /// Skips blank lines and comment lines, then records the depth of the
    /// next real line: `indent_diff` becomes the signed step count and
    /// `indent` the new depth. Fractional indents round down.
    fn skip_useless(&mut self) {
        let mut spaces: i32 = 0;
        while self.peek() == Some(' ') {
            self.bump();
            spaces += 1;
        }
        match self.peek() {
            Some('#') => {
                self.discard_line();
                self.skip_useless();
            }
            Some('\n') => {
                self.bump();
                self.skip_useless();
            }
            _ => {
                self.indent_diff = spaces / 2 - self.indent;
                self.indent = spaces / 2;
            }
        }
    }

    fn read_number(&mut self) -> LexResult<Token> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        let literal = &self.input[start..self.pos];
        let value = literal
            .parse::<i64>()
            .map_err(|_| LexError::NumberOutOfRange {
                literal: literal.to_string(),
                position: start,
            })?;
        Ok(Token::Number(value))
    }

    fn read_string_literal(&mut self, quote: char, start: usize) -> LexResult<Token> {
        let mut text = String::new();
        loop {
            let Some(ch) = self.bump() else {
                return Err(LexError::UnterminatedString { position: start });
            };
            if ch == quote {
                break;
            }
            if ch == '\\' {
                let Some(escaped) = self.bump() else {
                    return Err(LexError::UnterminatedString { position: start });
                };
                match escaped {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    other => text.push(other),
                }
            } else {
                text.push(ch);
            }
        }
        Ok(Token::Str(text))
    }

    fn read_name(&mut self) -> Token {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        let word = &self.input[start..self.pos];
        Token::keyword(word).unwrap_or_else(|| Token::Id(word.to_string()))
    }

    fn read_comparison_operator(&mut self) -> LexResult<Token> {
        let position = self.pos;
        let (Some(first), Some(second)) = (self.bump(), self.bump()) else {
            return Err(LexError::BadComparisonOperator {
                found: String::new(),
                position,
            });
        };
        match (first, second) {
            ('=', '=') => Ok(Token::Eq),
            ('!', '=') => Ok(Token::NotEq),
            ('<', '=') => Ok(Token::LessOrEq),
            ('>', '=') => Ok(Token::GreaterOrEq),
            _ => Err(LexError::BadComparisonOperator {
                found: [first, second].iter().collect(),
                position,
            }),
        }
    }

    /// Discards everything up to and including the next line end.
    fn discard_line(&mut self) {
        while let Some(ch) = self.bump() {
            if ch == '\n' {
                break;
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }
}

/// Drains a whole source text into a token vector ending in `Eof`.
pub fn tokenize(input: &str) -> LexResult<Vec<Token>> {
    let mut lexer = Lexer::new(input)?;
    let mut tokens = vec![lexer.current().clone()];
    while !matches!(lexer.current(), Token::Eof) {
        tokens.push(lexer.next_token()?.clone());
    }
    Ok(tokens)
}
