use std::any::Any;
use std::sync::{Arc, LazyLock};

use xpr_lang::{CompileOptions, CompiledExpression, Engine, HostObject, Shape, ShapeBuilder, Value};

fn main() {
    divan::main();
}

#[derive(Debug)]
struct Account {
    owner: Value,
    balance: i64,
}

impl HostObject for Account {
    fn shape(&self) -> Arc<Shape> {
        static SHAPE: LazyLock<Arc<Shape>> = LazyLock::new(|| {
            ShapeBuilder::<Account>::new("bench.Account")
                .getter("owner", |a| a.owner.clone())
                .getter("balance", |a| Value::from(a.balance))
                .build()
        });
        SHAPE.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn account() -> Value {
    Value::object(Account {
        owner: Value::map([("name".into(), Value::from("Ada")), ("tier".into(), Value::from(2))]),
        balance: 1200,
    })
}

fn compile(engine: &Engine, source: &str) -> CompiledExpression {
    engine.compile(source, &CompileOptions::default()).unwrap()
}

const RULE: &str = "owner.tier > 1 && balance >= 1000 ? owner.name + ' qualifies' : 'no'";

#[divan::bench]
fn compile_rule() -> CompiledExpression {
    compile(&Engine::default(), RULE)
}

#[divan::bench]
fn execute_rule(bencher: divan::Bencher) {
    let engine = Engine::default();
    let expr = compile(&engine, RULE);
    let root = account();
    bencher.bench_local(|| expr.execute(&root, ()).unwrap());
}

#[divan::bench]
fn execute_rule_interpreted(bencher: divan::Bencher) {
    let engine = Engine::default();
    let expr = compile(&engine, RULE);
    let root = account();
    bencher.bench_local(|| expr.execute_interpreted(&root, ()).unwrap());
}

#[divan::bench]
fn eval_rule(bencher: divan::Bencher) {
    let engine = Engine::default();
    let root = account();
    bencher.bench_local(|| engine.eval(RULE, &root, ()).unwrap());
}

#[divan::bench]
fn property_hot_path(bencher: divan::Bencher) {
    let engine = Engine::default();
    let expr = compile(&engine, "owner.name");
    let root = account();
    for _ in 0..1000 {
        expr.execute(&root, ()).unwrap();
    }
    bencher.bench_local(|| expr.execute(&root, ()).unwrap());
}

#[divan::bench]
fn resolve_get(bencher: divan::Bencher) {
    let engine = Engine::default();
    let root = account();
    bencher.bench_local(|| engine.resolve_get("owner.tier", &root).unwrap());
}

#[divan::bench(args = [1_000, 100_000])]
fn loop_sum(bencher: divan::Bencher, n: i64) {
    let engine = Engine::default();
    let expr = compile(&engine, "s = 0; for (i = 0; i < n; i++) { s += i }; s");
    bencher.bench_local(|| expr.execute(&Value::Null, [("n", Value::from(n))]).unwrap());
}

#[divan::bench(args = [15])]
fn fibonacci(bencher: divan::Bencher, n: i64) {
    let engine = Engine::default();
    let expr = compile(&engine, "def fib(x) { x < 2 ? x : fib(x - 1) + fib(x - 2) }; fib(n)");
    bencher.bench_local(|| expr.execute(&Value::Null, [("n", Value::from(n))]).unwrap());
}
