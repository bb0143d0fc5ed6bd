use miette::{Diagnostic, SourceOffset, SourceSpan};

use crate::{
    accessor::error::PropertyError,
    ast::error::ParseError,
    compiler::error::CompileError,
    eval::error::EvalError,
    lexer::error::LexerError,
    range::Range,
};

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum InnerError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error(transparent)]
    Parse(ParseError),
    #[error(transparent)]
    Compile(CompileError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl From<ParseError> for InnerError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Lexer(err) => InnerError::Lexer(err),
            err => InnerError::Parse(err),
        }
    }
}

impl From<CompileError> for InnerError {
    fn from(err: CompileError) -> Self {
        match err {
            CompileError::Parse(err) => err.into(),
            err => InnerError::Compile(err),
        }
    }
}

impl InnerError {
    fn range(&self) -> Option<Range> {
        match self {
            InnerError::Lexer(err) => Some(err.range()),
            InnerError::Parse(err) => Some(err.range()),
            InnerError::Compile(err) => err.range(),
            InnerError::Eval(err) => err.range(),
        }
    }
}

/// Represents a high-level error with diagnostic information for the user.
#[derive(PartialEq, Debug, thiserror::Error)]
#[error("{cause}")]
pub struct Error {
    /// The underlying cause of the error.
    pub cause: InnerError,
    /// The source code related to the error.
    pub source_code: String,
    /// The location in the source code for diagnostics.
    pub location: SourceSpan,
}

impl Error {
    pub fn from_error(source_code: impl Into<String>, cause: impl Into<InnerError>) -> Self {
        let source_code = source_code.into();
        let cause = cause.into();
        let location = match cause.range() {
            Some(range) => {
                let start = range.start.min(source_code.len());
                let end = range.end.clamp(start, source_code.len());
                SourceSpan::new(SourceOffset::from(start), std::cmp::max(end - start, 1))
            }
            None => SourceSpan::new(SourceOffset::from(0), 0),
        };

        Self {
            cause,
            source_code,
            location,
        }
    }

    /// The evaluation error, with its location removed.
    pub fn eval_error(&self) -> Option<&EvalError> {
        match &self.cause {
            InnerError::Eval(err) => Some(err.kind()),
            _ => None,
        }
    }
}

fn property_code(err: &PropertyError) -> &'static str {
    match err {
        PropertyError::Unresolvable { .. } => "PropertyError::Unresolvable",
        PropertyError::NoOverload { .. } => "PropertyError::NoOverload",
        PropertyError::NullDereference { .. } => "PropertyError::NullDereference",
        PropertyError::NotWritable { .. } => "PropertyError::NotWritable",
        PropertyError::IndexOutOfBounds { .. } => "PropertyError::IndexOutOfBounds",
        PropertyError::InvalidIndex { .. } => "PropertyError::InvalidIndex",
        PropertyError::Host { .. } => "PropertyError::Host",
    }
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let c = match &self.cause {
            InnerError::Lexer(LexerError::UnexpectedCharacter(..)) => "LexerError::UnexpectedCharacter",
            InnerError::Lexer(LexerError::UnterminatedString(_)) => "LexerError::UnterminatedString",
            InnerError::Lexer(LexerError::UnterminatedComment(_)) => "LexerError::UnterminatedComment",
            InnerError::Lexer(LexerError::UnbalancedBracket(..)) => "LexerError::UnbalancedBracket",
            InnerError::Lexer(LexerError::MalformedNumber(..)) => "LexerError::MalformedNumber",
            InnerError::Parse(ParseError::Lexer(_)) => "ParseError::Lexer",
            InnerError::Parse(ParseError::UnexpectedToken(_)) => "ParseError::UnexpectedToken",
            InnerError::Parse(ParseError::Expected { .. }) => "ParseError::Expected",
            InnerError::Parse(ParseError::MissingOperand(_)) => "ParseError::MissingOperand",
            InnerError::Parse(ParseError::IncompleteTernary(_)) => "ParseError::IncompleteTernary",
            InnerError::Parse(ParseError::InvalidAssignmentTarget(_)) => "ParseError::InvalidAssignmentTarget",
            InnerError::Parse(ParseError::UnclosedBlock { .. }) => "ParseError::UnclosedBlock",
            InnerError::Parse(ParseError::UnmatchedBlockEnd(_)) => "ParseError::UnmatchedBlockEnd",
            InnerError::Parse(ParseError::UnclosedParen(_)) => "ParseError::UnclosedParen",
            InnerError::Parse(ParseError::InvalidPath(..)) => "ParseError::InvalidPath",
            InnerError::Parse(ParseError::MixedCollection(_)) => "ParseError::MixedCollection",
            InnerError::Compile(CompileError::Parse(_)) => "CompileError::Parse",
            InnerError::Compile(CompileError::IncompatibleTypes { .. }) => "CompileError::IncompatibleTypes",
            InnerError::Compile(CompileError::UnknownImport(_)) => "CompileError::UnknownImport",
            InnerError::Compile(CompileError::UnknownType(..)) => "CompileError::UnknownType",
            InnerError::Compile(CompileError::Encoding(_)) => "CompileError::Encoding",
            InnerError::Compile(CompileError::FormatVersion { .. }) => "CompileError::FormatVersion",
            InnerError::Eval(err) => match err.kind() {
                EvalError::TypeMismatch { .. } => "EvalError::TypeMismatch",
                EvalError::UnaryTypeMismatch { .. } => "EvalError::UnaryTypeMismatch",
                EvalError::DivisionByZero => "EvalError::DivisionByZero",
                EvalError::Overflow => "EvalError::Overflow",
                EvalError::IterationLimit(_) => "EvalError::IterationLimit",
                EvalError::RecursionLimit(_) => "EvalError::RecursionLimit",
                EvalError::NonBooleanCondition(_) => "EvalError::NonBooleanCondition",
                EvalError::Property(err) => property_code(err),
                EvalError::InvalidRegex(..) => "EvalError::InvalidRegex",
                EvalError::Conversion { .. } => "EvalError::Conversion",
                EvalError::NotIterable(_) => "EvalError::NotIterable",
                EvalError::UnknownType(_) => "EvalError::UnknownType",
                EvalError::NoConstructor { .. } => "EvalError::NoConstructor",
                EvalError::Arity { .. } => "EvalError::Arity",
                EvalError::Host { .. } => "EvalError::Host",
                EvalError::Located(..) => "EvalError::Located",
            },
        };

        Some(Box::new(c))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let msg = match &self.cause {
            InnerError::Lexer(LexerError::UnterminatedString(_)) => {
                Some("Close the string literal with the quote it was opened with.".to_string())
            }
            InnerError::Parse(ParseError::UnclosedBlock { construct, .. }) => {
                Some(format!("Add the `}}` that closes this `{construct}` block."))
            }
            InnerError::Parse(ParseError::MissingOperand(_)) => {
                Some("An operator is missing its left or right operand.".to_string())
            }
            InnerError::Compile(CompileError::UnknownImport(import)) => Some(format!(
                "Register the type with `Engine::register_type` before importing `{import}`."
            )),
            InnerError::Compile(CompileError::IncompatibleTypes { .. }) => {
                Some("Strong typing is enabled; convert one operand explicitly.".to_string())
            }
            InnerError::Eval(err) => match err.kind() {
                EvalError::IterationLimit(_) => {
                    Some("Raise `max_loop_iterations` or check the loop condition.".to_string())
                }
                EvalError::RecursionLimit(_) => Some("Check for unbounded recursion.".to_string()),
                EvalError::NonBooleanCondition(_) => {
                    Some("Conditions and `&&`/`||` operands must be booleans or null.".to_string())
                }
                EvalError::Property(PropertyError::NullDereference { .. }) => {
                    Some("Use `.?` to read through a value that may be null.".to_string())
                }
                EvalError::Property(PropertyError::Unresolvable { segment, .. }) => Some(format!(
                    "'{segment}' is neither a getter, field, map key, variable nor method."
                )),
                _ => None,
            },
            _ => None,
        };

        msg.map(|m| Box::new(m) as Box<dyn std::fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(miette::LabeledSpan::new_with_span(
            Some(format!("{}", self.cause)),
            self.location,
        ))))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.source_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::lexer(
        InnerError::Lexer(LexerError::UnterminatedString(Range { start: 4, end: 8 })),
        "a + \"abc",
        (4, 4),
        "LexerError::UnterminatedString"
    )]
    #[case::located_eval(
        InnerError::Eval(EvalError::DivisionByZero.at(Some(Range { start: 0, end: 5 }))),
        "1 / 0",
        (0, 5),
        "EvalError::DivisionByZero"
    )]
    #[case::unlocated_eval(InnerError::Eval(EvalError::Overflow), "x", (0, 0), "EvalError::Overflow")]
    #[case::clamped(
        InnerError::Parse(ParseError::MissingOperand(Range { start: 10, end: 12 })),
        "1 +",
        (3, 1),
        "ParseError::MissingOperand"
    )]
    fn test_from_error(
        #[case] cause: InnerError,
        #[case] source: &str,
        #[case] (offset, len): (usize, usize),
        #[case] code: &str,
    ) {
        let error = Error::from_error(source, cause);
        assert_eq!(error.source_code, source);
        assert_eq!(error.location, SourceSpan::new(SourceOffset::from(offset), len));
        assert_eq!(error.code().map(|c| c.to_string()), Some(code.to_string()));
    }

    #[test]
    fn test_lexer_error_inside_parse_error_is_lifted() {
        let cause: InnerError = ParseError::Lexer(LexerError::UnterminatedComment(Range::default())).into();
        assert!(matches!(cause, InnerError::Lexer(_)));
    }

    #[test]
    fn test_eval_error_strips_location() {
        let error = Error::from_error("x", EvalError::DivisionByZero.at(Some(Range { start: 0, end: 1 })));
        assert_eq!(error.eval_error(), Some(&EvalError::DivisionByZero));
        assert!(error.help().is_none());
    }
}
