use smol_str::SmolStr;
use thiserror::Error;

use crate::{accessor::error::PropertyError, number::ArithmeticError, range::Range, shape::HostError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Cannot apply `{op}` to {left} and {right}")]
    TypeMismatch {
        op: SmolStr,
        left: SmolStr,
        right: SmolStr,
    },
    #[error("Cannot apply `{op}` to {operand}")]
    UnaryTypeMismatch { op: SmolStr, operand: SmolStr },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Numeric overflow")]
    Overflow,
    #[error("Loop exceeded {0} iterations")]
    IterationLimit(usize),
    #[error("Maximum call depth {0} exceeded")]
    RecursionLimit(usize),
    #[error("Condition must be a boolean, got {0}")]
    NonBooleanCondition(SmolStr),
    #[error(transparent)]
    Property(#[from] PropertyError),
    #[error("Invalid regular expression `{0}`: {1}")]
    InvalidRegex(SmolStr, String),
    #[error("Cannot convert {value} to {target}")]
    Conversion { value: SmolStr, target: SmolStr },
    #[error("Cannot iterate over {0}")]
    NotIterable(SmolStr),
    #[error("Unknown type `{0}`")]
    UnknownType(SmolStr),
    #[error("No constructor of {ty} accepts ({args})")]
    NoConstructor { ty: SmolStr, args: SmolStr },
    #[error("`{name}` expects {expected} arguments, got {got}")]
    Arity { name: SmolStr, expected: usize, got: usize },
    #[error("{context} failed: {source}")]
    Host {
        context: SmolStr,
        #[source]
        source: HostError,
    },
    #[error("{1}")]
    Located(Range, Box<EvalError>),
}

impl EvalError {
    /// Attaches `span` unless the error already carries a location.
    pub(crate) fn at(self, span: Option<Range>) -> EvalError {
        match (self, span) {
            (located @ EvalError::Located(..), _) => located,
            (err, Some(range)) => EvalError::Located(range, Box::new(err)),
            (err, None) => err,
        }
    }

    pub fn range(&self) -> Option<Range> {
        match self {
            EvalError::Located(range, _) => Some(*range),
            _ => None,
        }
    }

    /// The error without its location.
    pub fn kind(&self) -> &EvalError {
        match self {
            EvalError::Located(_, inner) => inner.kind(),
            err => err,
        }
    }

    pub(crate) fn is_type_mismatch(&self) -> bool {
        matches!(self.kind(), EvalError::TypeMismatch { .. })
    }
}

impl From<ArithmeticError> for EvalError {
    fn from(err: ArithmeticError) -> Self {
        match err {
            ArithmeticError::DivisionByZero => EvalError::DivisionByZero,
            ArithmeticError::Overflow => EvalError::Overflow,
        }
    }
}
