use smol_str::SmolStr;
use thiserror::Error;

use crate::{
    lexer::{error::LexerError, token::Token},
    range::Range,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error("Unexpected token `{0}`")]
    UnexpectedToken(Token),
    #[error("Expected `{expected}` but got `{found}`")]
    Expected { expected: &'static str, found: Token },
    #[error("Missing operand")]
    MissingOperand(Range),
    #[error("`?` without a matching `:`")]
    IncompleteTernary(Range),
    #[error("Only a property path can be assigned to")]
    InvalidAssignmentTarget(Range),
    #[error("Unclosed `{construct}` block")]
    UnclosedBlock { construct: &'static str, range: Range },
    #[error("Unmatched `}}`: no block is open")]
    UnmatchedBlockEnd(Range),
    #[error("Unclosed `(`")]
    UnclosedParen(Range),
    #[error("Invalid property path `{0}`")]
    InvalidPath(SmolStr, Range),
    #[error("Inline collection mixes list and map entries")]
    MixedCollection(Range),
}

impl ParseError {
    pub fn range(&self) -> Range {
        match self {
            ParseError::Lexer(err) => err.range(),
            ParseError::UnexpectedToken(token) | ParseError::Expected { found: token, .. } => token.range,
            ParseError::MissingOperand(range)
            | ParseError::IncompleteTernary(range)
            | ParseError::InvalidAssignmentTarget(range)
            | ParseError::UnclosedBlock { range, .. }
            | ParseError::UnmatchedBlockEnd(range)
            | ParseError::UnclosedParen(range)
            | ParseError::InvalidPath(_, range)
            | ParseError::MixedCollection(range) => *range,
        }
    }
}
