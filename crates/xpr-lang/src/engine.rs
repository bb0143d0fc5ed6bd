use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::debug;

use crate::{
    accessor::{self, AccessorCache},
    arena::Arena,
    ast::{NodeKind, Program, error::ParseError, parser::Parser, path::PropertyPath},
    compiler::{self, CompileOptions, Compiled, CompiledExpression, Metadata},
    error::Error,
    eval::{self, EvalContext, Flow, Mode, eval_block, scope::Variables},
    optimizer::{OptimizerConfig, OptimizerState},
    range::Range,
    shape::{Shape, TypeRegistry},
    value::Value,
};

/// Paths cached by `resolve_get`/`resolve_set` before the cache is dropped.
const PATH_CACHE_LIMIT: usize = 4096;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOptions {
    pub eval: eval::Options,
    pub optimizer: OptimizerConfig,
}

/// State shared by an engine and every expression it compiled.
#[derive(Debug)]
pub(crate) struct Runtime {
    pub(crate) options: EngineOptions,
    pub(crate) optimizer: Arc<OptimizerState>,
    pub(crate) types: RwLock<TypeRegistry>,
}

impl Runtime {
    fn new(options: EngineOptions, types: TypeRegistry) -> Self {
        Self {
            optimizer: Arc::new(OptimizerState::new(options.optimizer.clone())),
            options,
            types: RwLock::new(types),
        }
    }
}

/// A property path parsed once for `resolve_get` and `resolve_set`.
#[derive(Debug)]
struct CachedPath {
    program: Program,
    path: PropertyPath,
    get: AccessorCache,
    set: AccessorCache,
}

#[derive(Debug)]
pub struct Engine {
    runtime: Arc<Runtime>,
    paths: RwLock<FxHashMap<SmolStr, Arc<CachedPath>>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            runtime: Arc::new(Runtime::new(options, TypeRegistry::default())),
            paths: RwLock::new(FxHashMap::default()),
        }
    }

    /// Replaces the evaluation options. Expressions compiled earlier keep
    /// the options they were compiled with.
    pub fn with_eval_options(self, eval: eval::Options) -> Self {
        let options = EngineOptions {
            eval,
            ..self.runtime.options.clone()
        };
        self.rebuild(options)
    }

    pub fn with_optimizer_config(self, optimizer: OptimizerConfig) -> Self {
        let options = EngineOptions {
            optimizer,
            ..self.runtime.options.clone()
        };
        self.rebuild(options)
    }

    pub fn set_max_loop_iterations(self, max_loop_iterations: usize) -> Self {
        let eval = eval::Options {
            max_loop_iterations,
            ..self.runtime.options.eval.clone()
        };
        self.with_eval_options(eval)
    }

    fn rebuild(self, options: EngineOptions) -> Self {
        let types = self.runtime.types.read().clone();
        Self {
            runtime: Arc::new(Runtime::new(options, types)),
            paths: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.runtime.options
    }

    pub fn optimizer(&self) -> &Arc<OptimizerState> {
        &self.runtime.optimizer
    }

    /// Makes a host type available to imports, `new` and `instanceof`.
    pub fn register_type(&self, shape: Arc<Shape>) {
        debug!(name = %shape.name(), "Registered type");
        self.runtime.types.write().register(shape);
    }

    pub fn compile(&self, source: &str, options: &CompileOptions) -> Result<CompiledExpression, Error> {
        let types = self.runtime.types.read();
        let (program, metadata) =
            compiler::compile(source, options, &types).map_err(|err| Error::from_error(source, err))?;
        Ok(CompiledExpression::new(
            Compiled::new(source, program, metadata),
            Arc::clone(&self.runtime),
        ))
    }

    /// Interprets `source` statement by statement; each statement is parsed
    /// only after the previous one has run.
    pub fn eval(&self, source: &str, root: &Value, variables: impl Into<Variables>) -> Result<Value, Error> {
        let variables = variables.into();
        let meta = Metadata::default();
        let mut arena = Arena::new(64);
        let mut parser = Parser::new(source, &mut arena);
        let mut last = Value::Null;

        while let Some(statement) = parser.next_statement().map_err(|err| Error::from_error(source, err))? {
            let ctx = EvalContext {
                arena: parser.arena(),
                root,
                scope: Arc::clone(variables.scope()),
                runtime: &self.runtime,
                meta: &meta,
                depth: 0,
                mode: Mode::Interpreted,
                detached: false,
            };
            match eval_block(&ctx, &statement).map_err(|err| Error::from_error(source, err))? {
                Flow::Normal(value) => last = value,
                Flow::Return(value) => return Ok(value),
            }
        }
        Ok(last)
    }

    /// Reads `path` from `root` outside of any expression.
    pub fn resolve_get(&self, path: &str, root: &Value) -> Result<Value, Error> {
        let cached = self.cached_path(path)?;
        let meta = Metadata::default();
        let ctx = self.path_context(&cached, root, &meta);
        accessor::get(&ctx, &cached.path, &cached.get).map_err(|err| Error::from_error(path, err))
    }

    /// Writes `value` to `path` on `root` outside of any expression.
    pub fn resolve_set(&self, path: &str, root: &Value, value: Value) -> Result<(), Error> {
        let cached = self.cached_path(path)?;
        let meta = Metadata::default();
        let ctx = self.path_context(&cached, root, &meta);
        accessor::set(&ctx, &cached.path, &cached.set, value).map_err(|err| Error::from_error(path, err))
    }

    fn path_context<'a>(&'a self, cached: &'a CachedPath, root: &'a Value, meta: &'a Metadata) -> EvalContext<'a> {
        EvalContext {
            arena: &cached.program.arena,
            root,
            scope: Variables::default().scope().clone(),
            runtime: &self.runtime,
            meta,
            depth: 0,
            mode: Mode::Compiled,
            detached: true,
        }
    }

    fn cached_path(&self, path: &str) -> Result<Arc<CachedPath>, Error> {
        if let Some(cached) = self.paths.read().get(path) {
            return Ok(Arc::clone(cached));
        }

        let cached = Arc::new(parse_path(path).map_err(|err| Error::from_error(path, err))?);
        let mut paths = self.paths.write();
        if paths.len() >= PATH_CACHE_LIMIT {
            debug!(limit = PATH_CACHE_LIMIT, "Path cache full, clearing");
            paths.clear();
        }
        paths.insert(SmolStr::new(path), Arc::clone(&cached));
        Ok(cached)
    }

    /// Loads an expression written by [`CompiledExpression::to_bytes`]. Every
    /// accessor starts generic.
    pub fn load(&self, bytes: &[u8]) -> Result<CompiledExpression, Error> {
        CompiledExpression::from_bytes(bytes, Arc::clone(&self.runtime))
    }

    pub const fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

fn parse_path(path: &str) -> Result<CachedPath, ParseError> {
    let mut arena = Arena::new(8);
    let root = Parser::new(path, &mut arena).parse_program()?;
    let mut program = Program { arena, root };
    compiler::fold::Folder::fold_program(&mut program);

    let invalid = || ParseError::InvalidPath(path.into(), Range { start: 0, end: path.len() });
    let mut chain = program.root.chain(&program.arena).filter(|(_, node)| !node.is_end_of_statement());
    let property = match (chain.next(), chain.next()) {
        (Some((_, node)), None) => match &node.kind {
            NodeKind::Property(property) => property.path.clone(),
            _ => return Err(invalid()),
        },
        _ => return Err(invalid()),
    };
    drop(chain);

    Ok(CachedPath {
        program,
        path: property,
        get: AccessorCache::default(),
        set: AccessorCache::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_engine_default() {
        let engine = Engine::default();
        assert_eq!(engine.options(), &EngineOptions::default());
        assert_eq!(engine.optimizer().config().tenure_threshold, 50);
    }

    #[test]
    fn test_set_max_loop_iterations() {
        let engine = Engine::default().set_max_loop_iterations(10);
        assert_eq!(engine.options().eval.max_loop_iterations, 10);
    }

    #[test]
    fn test_version() {
        assert!(!Engine::version().is_empty());
    }

    #[rstest]
    #[case::simple("a")]
    #[case::nested("a.b[0].?c")]
    #[case::call("items.size()")]
    fn test_parse_path(#[case] path: &str) {
        assert_eq!(parse_path(path).unwrap().path.text, path);
    }

    #[rstest]
    #[case::arithmetic("a + 1")]
    #[case::two_statements("a; b")]
    #[case::literal("1")]
    fn test_parse_path_rejects(#[case] path: &str) {
        assert!(matches!(parse_path(path), Err(ParseError::InvalidPath(..))));
    }

    #[test]
    fn test_path_cache_is_reused() {
        let engine = Engine::default();
        let root = Value::map([("a".into(), Value::from(1))]);
        assert_eq!(engine.resolve_get("a", &root).unwrap(), Value::from(1));
        assert_eq!(engine.resolve_get("a", &root).unwrap(), Value::from(1));
        assert_eq!(engine.paths.read().len(), 1);
    }

    #[test]
    fn test_eval_streams_statements() {
        let engine = Engine::default();
        assert_eq!(engine.eval("x = 2; x * 3", &Value::Null, ()).unwrap(), Value::from(6));
    }
}
