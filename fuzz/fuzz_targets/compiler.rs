#![no_main]

use arbitrary::Arbitrary;
use itertools::Itertools;
use libfuzzer_sys::fuzz_target;
use xpr_lang::{CompileOptions, Engine, EngineOptions, EvalOptions, Value};

#[derive(Debug, Clone, Arbitrary)]
enum Stmt {
    Assign(String, String),
    Def(String, Vec<String>, String),
    Call(String, Vec<String>),
    If(String, String, Option<String>),
    Foreach(String, String, String),
    Ternary(String, String, String),
    Raw(String),
}

impl Stmt {
    fn render(&self) -> String {
        match self {
            Stmt::Assign(name, value) => format!("{name} = {value}"),
            Stmt::Def(name, params, body) => format!("def {name}({}) {{ {body} }}", params.join(", ")),
            Stmt::Call(name, args) => format!("{name}({})", args.join(", ")),
            Stmt::If(cond, then, Some(otherwise)) => format!("if ({cond}) {{ {then} }} else {{ {otherwise} }}"),
            Stmt::If(cond, then, None) => format!("if ({cond}) {{ {then} }}"),
            Stmt::Foreach(var, items, body) => format!("foreach ({var} : {items}) {{ {body} }}"),
            Stmt::Ternary(cond, a, b) => format!("{cond} ? {a} : {b}"),
            Stmt::Raw(code) => code.clone(),
        }
    }
}

#[derive(Debug, Clone, Arbitrary)]
struct Input {
    raw: Option<String>,
    statements: Vec<Stmt>,
    strong_typing: bool,
}

fuzz_target!(|input: Input| {
    let source = match &input.raw {
        Some(raw) => raw.clone(),
        None => input.statements.iter().map(Stmt::render).join("; "),
    };

    let engine = Engine::new(EngineOptions {
        eval: EvalOptions {
            max_loop_iterations: 1_000,
            max_call_depth: 16,
            ..Default::default()
        },
        ..Default::default()
    });
    let options = CompileOptions::default().with_strong_typing(input.strong_typing);
    if let Ok(expr) = engine.compile(&source, &options) {
        let compiled = expr.execute(&Value::Null, ()).map_err(|err| err.eval_error().cloned());
        let interpreted = expr
            .execute_interpreted(&Value::Null, ())
            .map_err(|err| err.eval_error().cloned());
        // Function values compare by identity, so only their presence is checked
        if let (Ok(Value::Function(_)), Ok(Value::Function(_))) = (&compiled, &interpreted) {
            return;
        }
        assert_eq!(compiled, interpreted, "evaluators disagree on {source:?}");
        if let Ok(bytes) = expr.to_bytes() {
            let _ = engine.load(&bytes).map(|loaded| loaded.execute(&Value::Null, ()));
        }
    }
    let _ = engine.eval(&source, &Value::Null, ());
});
