//! Property-based tests: the tree evaluator, the stack evaluator and
//! streaming evaluation must agree on every expression.
use proptest::prelude::*;
use xpr_lang::{CompileOptions, Engine, EvalError, Value};

mod strategies {
    use super::*;

    /// An arithmetic expression together with its value, when it can be
    /// computed without `*` or `/`.
    #[derive(Debug, Clone)]
    pub struct Arith {
        pub source: String,
        pub value: Option<i64>,
    }

    fn leaf() -> impl Strategy<Value = Arith> {
        (0i64..100).prop_map(|n| Arith {
            source: n.to_string(),
            value: Some(n),
        })
    }

    pub fn arith() -> impl Strategy<Value = Arith> {
        leaf().prop_recursive(4, 32, 2, |inner| {
            prop_oneof![
                (inner.clone(), prop::sample::select(vec!["+", "-", "*", "/", "%"]), inner.clone()).prop_map(
                    |(l, op, r)| {
                        let value = match (op, l.value, r.value) {
                            ("+", Some(a), Some(b)) => Some(a + b),
                            ("-", Some(a), Some(b)) => Some(a - b),
                            _ => None,
                        };
                        Arith {
                            source: format!("({}) {op} ({})", l.source, r.source),
                            value,
                        }
                    }
                ),
                inner.prop_map(|e| Arith {
                    source: format!("({})", e.source),
                    value: e.value,
                }),
            ]
        })
    }

    /// Boolean expressions mixing comparisons, `&&`, `||`, `!` and `?:`.
    pub fn logic() -> impl Strategy<Value = String> {
        let cmp = (
            arith(),
            prop::sample::select(vec!["<", "<=", ">", ">=", "==", "!="]),
            arith(),
        )
            .prop_map(|(l, op, r)| format!("{} {op} {}", l.source, r.source));
        let leaf = prop_oneof![cmp, Just("true".to_string()), Just("false".to_string()), Just("null".to_string())];
        leaf.prop_recursive(3, 16, 3, |inner| {
            prop_oneof![
                (inner.clone(), prop::sample::select(vec!["&&", "||"]), inner.clone())
                    .prop_map(|(l, op, r)| format!("{l} {op} {r}")),
                inner.clone().prop_map(|e| format!("!({e})")),
                (inner.clone(), inner.clone(), inner).prop_map(|(c, t, f)| format!("({c}) ? ({t}) : ({f})")),
            ]
        })
    }
}

/// Results of one source under every evaluation mode, errors without their
/// location.
fn outcomes(source: &str) -> [Result<Value, Option<EvalError>>; 3] {
    let engine = Engine::default();
    let expr = engine.compile(source, &CompileOptions::default()).unwrap();
    let strip = |result: Result<Value, xpr_lang::Error>| result.map_err(|err| err.eval_error().cloned());
    [
        strip(expr.execute(&Value::Null, ())),
        strip(expr.execute_interpreted(&Value::Null, ())),
        strip(engine.eval(source, &Value::Null, ())),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn evaluators_agree_on_arithmetic(expr in strategies::arith()) {
        let [compiled, interpreted, streamed] = outcomes(&expr.source);
        prop_assert_eq!(&compiled, &interpreted, "source: {}", expr.source);
        prop_assert_eq!(&compiled, &streamed, "source: {}", expr.source);
        if let Some(expected) = expr.value {
            prop_assert_eq!(compiled, Ok(Value::from(expected)), "source: {}", expr.source);
        }
    }

    #[test]
    fn evaluators_agree_on_logic(source in strategies::logic()) {
        let [compiled, interpreted, streamed] = outcomes(&source);
        prop_assert_eq!(&compiled, &interpreted, "source: {}", source);
        prop_assert_eq!(&compiled, &streamed, "source: {}", source);
    }

    #[test]
    fn execution_is_repeatable(expr in strategies::arith()) {
        let compiled = xpr_lang::compile(&expr.source).unwrap();
        let first = compiled.execute(&Value::Null, ()).map_err(|err| err.eval_error().cloned());
        let second = compiled.execute(&Value::Null, ()).map_err(|err| err.eval_error().cloned());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn lexer_never_panics(source in "\\PC{0,64}") {
        let _ = xpr_lang::compile(&source);
    }
}
