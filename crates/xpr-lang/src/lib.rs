//! `xpr-lang` is an embeddable expression language for reading and writing
//! host object graphs.
//!
//! Expressions are compiled once and executed many times against varying
//! root objects. Property paths such as `order.customer.name` resolve to
//! accessor chains that are cached on the expression and promoted to
//! specialized accessors once they run hot.
//!
//! ## Examples
//!
//! ```rust
//! use xpr_lang::{CompileOptions, Engine, Value};
//!
//! let engine = Engine::default();
//! let expr = engine
//!     .compile("total = price * qty; total > 100 ? 'bulk' : 'single'", &CompileOptions::default())
//!     .unwrap();
//!
//! let root = Value::map([("price".into(), Value::from(30)), ("qty".into(), Value::from(4))]);
//! assert_eq!(expr.execute(&root, ()).unwrap(), Value::from("bulk"));
//!
//! // One-off evaluation straight from source
//! assert_eq!(xpr_lang::eval("xs = [1, 2, 3]; xs.size()", &Value::Null, ()).unwrap(), Value::from(3));
//! ```
mod accessor;
mod arena;
mod ast;
mod compiler;
mod engine;
mod error;
mod eval;
mod lexer;
mod number;
mod optimizer;
mod range;
mod shape;
mod value;

pub use accessor::AccessorCache;
pub use accessor::error::PropertyError;
pub use arena::{Arena, ArenaId};
pub use ast::error::ParseError;
pub use ast::node::{Block, Function, LoopKind, Node as AstNode, NodeKind as AstNodeKind, Program};
pub use ast::parser::Parser as AstParser;
pub use ast::{NodeId, Operator, PropertyPath, Segment, UnaryOp};
pub use compiler::error::CompileError;
pub use compiler::{CompileOptions, CompiledExpression, Metadata};
pub use engine::{Engine, EngineOptions};
pub use error::{Error, InnerError};
pub use eval::Options as EvalOptions;
pub use eval::error::EvalError;
pub use eval::scope::{Scope, VariableScope, Variables};
pub use lexer::Lexer;
pub use lexer::error::LexerError;
pub use lexer::token::{Token, TokenKind};
pub use number::{ArithmeticError, DecimalContext, Number, NumberKind, RoundingMode};
pub use optimizer::{OptimizerConfig, OptimizerState, Tier, TieredAccessor};
pub use range::{Position, Range};
pub use shape::{
    BuiltinType, Field, HostError, HostObject, Method, Shape, ShapeBuilder, ShapeId, ShapeKey, TypeHint, TypeRef,
    TypeRegistry,
};
pub use value::{MapKey, Value};

pub type XprResult = Result<Value, Error>;

/// Compiles `source` with default options on a fresh engine.
pub fn compile(source: &str) -> Result<CompiledExpression, Error> {
    Engine::default().compile(source, &CompileOptions::default())
}

/// Interprets `source` once against `root`.
pub fn eval(source: &str, root: &Value, variables: impl Into<Variables>) -> XprResult {
    Engine::default().eval(source, root, variables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::arithmetic("1 + 2 * 3", Value::from(7))]
    #[case::string_concat("'a' + 1", Value::from("a1"))]
    #[case::ternary("1 > 2 ? 'x' : 'y'", Value::from("y"))]
    fn test_eval(#[case] source: &str, #[case] expected: Value) {
        assert_eq!(eval(source, &Value::Null, ()).unwrap(), expected);
    }

    #[test]
    fn test_compile() {
        let expr = compile("a + b").unwrap();
        let vars = [("a", Value::from(1)), ("b", Value::from(2))];
        assert_eq!(expr.execute(&Value::Null, vars).unwrap(), Value::from(3));
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
        assert_send_sync::<CompiledExpression>();
        assert_send_sync::<OptimizerState>();
        assert_send_sync::<Value>();
    }
}
