use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::{ast::op::Operator, number::Number, range::Range};

#[derive(PartialEq, Debug, Clone)]
pub struct Token {
    pub range: Range,
    pub kind: TokenKind,
}

#[derive(PartialEq, Debug, Clone)]
pub enum TokenKind {
    NullLiteral,
    BoolLiteral(bool),
    NumberLiteral(Number),
    StringLiteral(SmolStr),
    /// Raw text of a property path such as `a.b[0].c(x)`.
    Property(SmolStr),
    /// Source range of the text between `[` and `]`.
    InlineCollection(Range),
    Operator(Operator),
    Not,
    Tilde,
    Assign,
    CompoundAssign(Operator),
    Increment,
    Decrement,
    Question,
    Colon,
    SemiColon,
    Comma,
    LParen,
    RParen,
    LBrace,
    RBrace,
    If,
    Else,
    Foreach,
    For,
    While,
    Until,
    Do,
    Def,
    Return,
    New,
    Eof,
}

impl TokenKind {
    pub fn keyword(word: &str) -> Option<TokenKind> {
        Some(match word {
            "null" | "nil" => TokenKind::NullLiteral,
            "true" => TokenKind::BoolLiteral(true),
            "false" => TokenKind::BoolLiteral(false),
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "foreach" => TokenKind::Foreach,
            "for" => TokenKind::For,
            "while" => TokenKind::While,
            "until" => TokenKind::Until,
            "do" => TokenKind::Do,
            "def" | "function" => TokenKind::Def,
            "return" => TokenKind::Return,
            "new" => TokenKind::New,
            _ => return Operator::from_word(word).map(TokenKind::Operator),
        })
    }

    /// Tokens after which a statement is complete.
    pub fn ends_statement(&self) -> bool {
        matches!(self, TokenKind::SemiColon | TokenKind::RBrace | TokenKind::Eof)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.kind)
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            TokenKind::NullLiteral => write!(f, "null"),
            TokenKind::BoolLiteral(b) => write!(f, "{}", b),
            TokenKind::NumberLiteral(n) => write!(f, "{}", n),
            TokenKind::StringLiteral(s) => write!(f, "{:?}", s.as_str()),
            TokenKind::Property(p) => write!(f, "{}", p),
            TokenKind::InlineCollection(_) => write!(f, "[...]"),
            TokenKind::Operator(op) => write!(f, "{}", op),
            TokenKind::Not => write!(f, "!"),
            TokenKind::Tilde => write!(f, "~"),
            TokenKind::Assign => write!(f, "="),
            TokenKind::CompoundAssign(op) => write!(f, "{}=", op),
            TokenKind::Increment => write!(f, "++"),
            TokenKind::Decrement => write!(f, "--"),
            TokenKind::Question => write!(f, "?"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::SemiColon => write!(f, ";"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::If => write!(f, "if"),
            TokenKind::Else => write!(f, "else"),
            TokenKind::Foreach => write!(f, "foreach"),
            TokenKind::For => write!(f, "for"),
            TokenKind::While => write!(f, "while"),
            TokenKind::Until => write!(f, "until"),
            TokenKind::Do => write!(f, "do"),
            TokenKind::Def => write!(f, "def"),
            TokenKind::Return => write!(f, "return"),
            TokenKind::New => write!(f, "new"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}
