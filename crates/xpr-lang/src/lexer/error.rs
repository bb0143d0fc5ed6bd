use smol_str::SmolStr;
use thiserror::Error;

use crate::range::Range;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexerError {
    #[error("Unexpected character `{0}`")]
    UnexpectedCharacter(char, Range),
    #[error("Unterminated string literal")]
    UnterminatedString(Range),
    #[error("Unterminated block comment")]
    UnterminatedComment(Range),
    #[error("Unbalanced `{0}`")]
    UnbalancedBracket(char, Range),
    #[error("Malformed number `{0}`")]
    MalformedNumber(SmolStr, Range),
}

impl LexerError {
    pub fn range(&self) -> Range {
        match self {
            LexerError::UnexpectedCharacter(_, range)
            | LexerError::UnterminatedString(range)
            | LexerError::UnterminatedComment(range)
            | LexerError::UnbalancedBracket(_, range)
            | LexerError::MalformedNumber(_, range) => *range,
        }
    }
}
