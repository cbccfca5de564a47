use std::fmt;

/// Tokens produced by the lexer.
///
/// Payload-bearing variants compare by payload, everything else by tag
/// alone. `Indent`/`Dedent` are synthetic: they bracket a change of
/// indentation depth rather than spelling out characters from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Base-10 numeric constant
    Number(i64),
    /// User-defined name (variable, class, method, field)
    Id(String),
    /// Single structural symbol
    Char(char),
    /// String literal with escapes already decoded
    Str(String),

    // Keywords
    Class,
    Return,
    If,
    Else,
    Def,
    Print,
    And,
    Or,
    Not,
    None,
    True,
    False,

    // Structural
    Newline,
    Indent,
    Dedent,

    // Two-character comparison operators
    Eq,
    NotEq,
    LessOrEq,
    GreaterOrEq,

    Eof,
}

impl Token {
    /// Maps a scanned word onto its keyword token, if it is one.
    pub(crate) fn keyword(word: &str) -> Option<Token> {
        let token = match word {
            "class" => Token::Class,
            "return" => Token::Return,
            "if" => Token::If,
            "else" => Token::Else,
            "def" => Token::Def,
            "print" => Token::Print,
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "None" => Token::None,
            "True" => Token::True,
            "False" => Token::False,
            _ => return Option::None,
        };
        Some(token)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(value) => write!(f, "Number{{{value}}}"),
            Token::Id(name) => write!(f, "Id{{{name}}}"),
            Token::Char(ch) => write!(f, "Char{{{ch}}}"),
            Token::Str(text) => write!(f, "String{{{text}}}"),
            Token::Class => f.write_str("Class"),
            Token::Return => f.write_str("Return"),
            Token::If => f.write_str("If"),
            Token::Else => f.write_str("Else"),
            Token::Def => f.write_str("Def"),
            Token::Print => f.write_str("Print"),
            Token::And => f.write_str("And"),
            Token::Or => f.write_str("Or"),
            Token::Not => f.write_str("Not"),
            Token::None => f.write_str("None"),
            Token::True => f.write_str("True"),
            Token::False => f.write_str("False"),
            Token::Newline => f.write_str("Newline"),
            Token::Indent => f.write_str("Indent"),
            Token::Dedent => f.write_str("Dedent"),
            Token::Eq => f.write_str("Eq"),
            Token::NotEq => f.write_str("NotEq"),
            Token::LessOrEq => f.write_str("LessOrEq"),
            Token::GreaterOrEq => f.write_str("GreaterOrEq"),
            Token::Eof => f.write_str("Eof"),
        }
    }
}
