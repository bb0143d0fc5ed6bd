use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use super::{Metadata, error::CompileError};
use crate::{
    arena::Arena,
    ast::{Node, NodeKind, Program},
    engine::Runtime,
    error::Error,
    eval::{EvalContext, Flow, Mode, eval_block, scope::Variables},
    optimizer::Tier,
    value::Value,
};

/// Bumped whenever the serialized node layout changes.
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Compiled {
    format: u32,
    source: String,
    program: Program,
    metadata: Metadata,
}

impl Compiled {
    pub(crate) fn new(source: &str, program: Program, metadata: Metadata) -> Self {
        Self {
            format: FORMAT_VERSION,
            source: source.to_string(),
            program,
            metadata,
        }
    }
}

/// A parsed, folded and type-annotated expression.
///
/// Executing it never reparses the source. Property nodes keep the accessor
/// chains they resolved, so clones and concurrent executions share the
/// optimizer's work.
#[derive(Clone)]
pub struct CompiledExpression {
    compiled: Arc<Compiled>,
    runtime: Arc<Runtime>,
}

impl CompiledExpression {
    pub(crate) fn new(compiled: Compiled, runtime: Arc<Runtime>) -> Self {
        Self {
            compiled: Arc::new(compiled),
            runtime,
        }
    }

    /// Evaluates the folded operator trees against `root`.
    pub fn execute(&self, root: &Value, variables: impl Into<Variables>) -> Result<Value, Error> {
        self.run(root, variables.into(), Mode::Compiled)
    }

    /// Evaluates the flat node chains with the stack evaluator.
    pub fn execute_interpreted(&self, root: &Value, variables: impl Into<Variables>) -> Result<Value, Error> {
        self.run(root, variables.into(), Mode::Interpreted)
    }

    fn run(&self, root: &Value, variables: Variables, mode: Mode) -> Result<Value, Error> {
        let Compiled {
            source,
            program,
            metadata,
            ..
        } = &*self.compiled;
        let ctx = EvalContext {
            arena: &program.arena,
            root,
            scope: Arc::clone(variables.scope()),
            runtime: &self.runtime,
            meta: metadata,
            depth: 0,
            mode,
            detached: false,
        };
        eval_block(&ctx, &program.root)
            .map(Flow::into_value)
            .map_err(|err| Error::from_error(source.as_str(), err))
    }

    pub fn source(&self) -> &str {
        &self.compiled.source
    }

    pub fn metadata(&self) -> &Metadata {
        &self.compiled.metadata
    }

    /// Property paths that have resolved an accessor, with their tier.
    pub fn tiers(&self) -> Vec<(SmolStr, Tier)> {
        let mut tiers = Vec::new();
        collect_tiers(&self.compiled.program.arena, &mut tiers);
        tiers
    }

    /// Serializes the compiled form. Accessor caches are not written.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        bincode::serialize(&*self.compiled).map_err(|err| {
            Error::from_error(self.source(), CompileError::Encoding(err.to_string()))
        })
    }

    pub(crate) fn from_bytes(bytes: &[u8], runtime: Arc<Runtime>) -> Result<Self, Error> {
        let compiled: Compiled = bincode::deserialize(bytes)
            .map_err(|err| Error::from_error("", CompileError::Encoding(err.to_string())))?;
        if compiled.format != FORMAT_VERSION {
            return Err(Error::from_error(
                compiled.source,
                CompileError::FormatVersion {
                    found: compiled.format,
                    expected: FORMAT_VERSION,
                },
            ));
        }
        Ok(Self::new(compiled, runtime))
    }
}

fn collect_tiers(arena: &Arena<Node>, tiers: &mut Vec<(SmolStr, Tier)>) {
    for (_, node) in arena.iter() {
        match &node.kind {
            NodeKind::Property(property) => {
                if let Some(tier) = property.cache.tier() {
                    tiers.push((property.path.text.clone(), tier));
                }
            }
            NodeKind::Assignment(assignment) => {
                if let Some(tier) = assignment.set_cache.tier() {
                    tiers.push((assignment.target.path.text.clone(), tier));
                }
            }
            NodeKind::Def(function) => collect_tiers(&function.program.arena, tiers),
            _ => {}
        }
    }
}

impl fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledExpression")
            .field("source", &self.compiled.source)
            .field("metadata", &self.compiled.metadata)
            .finish()
    }
}
