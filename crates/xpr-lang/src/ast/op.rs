use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    StrAppend,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    And,
    Or,
    Contains,
    SoundsLike,
    Similarity,
    Regex,
    InstanceOf,
    ConvertibleTo,
    Ternary,
    TernaryElse,
    EndOfStatement,
}

impl Operator {
    /// Binding strength; larger binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            Operator::Pow => 12,
            Operator::Mul | Operator::Div | Operator::Rem => 11,
            Operator::Add | Operator::Sub | Operator::StrAppend => 10,
            Operator::Shl | Operator::Shr | Operator::UShr => 9,
            Operator::Lt
            | Operator::Gt
            | Operator::Le
            | Operator::Ge
            | Operator::InstanceOf
            | Operator::ConvertibleTo
            | Operator::Contains
            | Operator::SoundsLike
            | Operator::Similarity
            | Operator::Regex => 8,
            Operator::Eq | Operator::Ne => 7,
            Operator::BitAnd => 6,
            Operator::BitXor => 5,
            Operator::BitOr => 4,
            Operator::And => 3,
            Operator::Or => 2,
            Operator::Ternary | Operator::TernaryElse => 1,
            Operator::EndOfStatement => 0,
        }
    }

    /// Operators reduced from two operands on the stack.
    pub fn is_binary(self) -> bool {
        self.precedence() > Operator::And.precedence()
    }

    /// Arithmetic and bitwise operators usable in compound assignment.
    pub fn is_compound(self) -> bool {
        matches!(
            self,
            Operator::Add
                | Operator::Sub
                | Operator::Mul
                | Operator::Div
                | Operator::Rem
                | Operator::StrAppend
                | Operator::BitAnd
                | Operator::BitOr
                | Operator::BitXor
                | Operator::Shl
                | Operator::Shr
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Rem => "%",
            Operator::Pow => "**",
            Operator::StrAppend => "#",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::BitAnd => "&",
            Operator::BitOr => "|",
            Operator::BitXor => "^",
            Operator::Shl => "<<",
            Operator::Shr => ">>",
            Operator::UShr => ">>>",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Contains => "contains",
            Operator::SoundsLike => "soundslike",
            Operator::Similarity => "strsim",
            Operator::Regex => "~=",
            Operator::InstanceOf => "instanceof",
            Operator::ConvertibleTo => "convertable_to",
            Operator::Ternary => "?",
            Operator::TernaryElse => ":",
            Operator::EndOfStatement => ";",
        }
    }

    /// Word operators recognized where an identifier would otherwise start.
    pub fn from_word(word: &str) -> Option<Operator> {
        Some(match word {
            "contains" => Operator::Contains,
            "soundslike" => Operator::SoundsLike,
            "strsim" => Operator::Similarity,
            "instanceof" | "is" => Operator::InstanceOf,
            "convertable_to" => Operator::ConvertibleTo,
            _ => return None,
        })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    BitNot,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::BitNot => write!(f, "~"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Operator::Pow, Operator::Mul)]
    #[case(Operator::Mul, Operator::Add)]
    #[case(Operator::StrAppend, Operator::Shl)]
    #[case(Operator::Lt, Operator::Eq)]
    #[case(Operator::BitAnd, Operator::BitXor)]
    #[case(Operator::BitOr, Operator::And)]
    #[case(Operator::And, Operator::Or)]
    #[case(Operator::Or, Operator::Ternary)]
    #[case(Operator::Ternary, Operator::EndOfStatement)]
    fn test_precedence_order(#[case] tighter: Operator, #[case] looser: Operator) {
        assert!(tighter.precedence() > looser.precedence());
    }

    #[rstest]
    #[case(Operator::BitOr, true)]
    #[case(Operator::And, false)]
    #[case(Operator::Ternary, false)]
    fn test_is_binary(#[case] op: Operator, #[case] expected: bool) {
        assert_eq!(op.is_binary(), expected);
    }
}
