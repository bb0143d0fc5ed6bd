use smol_str::SmolStr;
use thiserror::Error;

use crate::{ast::error::ParseError, range::Range, shape::TypeHint};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Incompatible operand types for `{op}`: {left} and {right}")]
    IncompatibleTypes {
        op: SmolStr,
        left: TypeHint,
        right: TypeHint,
        range: Option<Range>,
    },
    #[error("Unknown import `{0}`")]
    UnknownImport(SmolStr),
    #[error("Unknown type `{0}`")]
    UnknownType(SmolStr, Option<Range>),
    #[error("Invalid compiled expression: {0}")]
    Encoding(String),
    #[error("Compiled expression format {found} is not supported, expected {expected}")]
    FormatVersion { found: u32, expected: u32 },
}

impl CompileError {
    pub fn range(&self) -> Option<Range> {
        match self {
            CompileError::Parse(err) => Some(err.range()),
            CompileError::IncompatibleTypes { range, .. } | CompileError::UnknownType(_, range) => *range,
            CompileError::UnknownImport(_) | CompileError::Encoding(_) | CompileError::FormatVersion { .. } => None,
        }
    }
}
