//! Compilation of source text into a reusable [`CompiledExpression`].
//!
//! Compiling parses the whole source into flat chains, folds every statement
//! into an operator tree and annotates the trees with result types. Both
//! forms are kept: [`CompiledExpression::execute`] walks the trees,
//! [`CompiledExpression::execute_interpreted`] the chains.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::debug;

mod compiled;
pub mod error;
pub(crate) mod fold;
pub(crate) mod typing;

pub use compiled::CompiledExpression;
pub(crate) use compiled::Compiled;

use crate::{
    arena::Arena,
    ast::{Program, parser::Parser},
    shape::{TypeHint, TypeRegistry},
};
use error::CompileError;
use fold::Folder;
use typing::TypeChecker;

#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    /// Keep source ranges on nodes for error locations.
    pub debug_symbols: bool,
    /// Reject operators whose operand types can never combine.
    pub strong_typing: bool,
    /// Input variables with the types they will have at execution.
    pub known_inputs: FxHashMap<SmolStr, TypeHint>,
    /// Qualified type names or `package.*` wildcards.
    pub imports: Vec<String>,
    pub source_name: Option<SmolStr>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            debug_symbols: true,
            strong_typing: false,
            known_inputs: FxHashMap::default(),
            imports: Vec::new(),
            source_name: None,
        }
    }
}

impl CompileOptions {
    pub fn with_debug_symbols(mut self, debug_symbols: bool) -> Self {
        self.debug_symbols = debug_symbols;
        self
    }

    pub fn with_strong_typing(mut self, strong_typing: bool) -> Self {
        self.strong_typing = strong_typing;
        self
    }

    pub fn with_input(mut self, name: impl Into<SmolStr>, ty: TypeHint) -> Self {
        self.known_inputs.insert(name.into(), ty);
        self
    }

    pub fn with_import(mut self, import: impl Into<String>) -> Self {
        self.imports.push(import.into());
        self
    }

    pub fn with_source_name(mut self, name: impl Into<SmolStr>) -> Self {
        self.source_name = Some(name.into());
        self
    }
}

/// Compile options that still matter at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub source_name: Option<SmolStr>,
    pub known_inputs: FxHashMap<SmolStr, TypeHint>,
    /// Simple type names mapped to the qualified names they import.
    pub imports: FxHashMap<SmolStr, SmolStr>,
    pub debug_symbols: bool,
    pub strong_typing: bool,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            source_name: None,
            known_inputs: FxHashMap::default(),
            imports: FxHashMap::default(),
            debug_symbols: true,
            strong_typing: false,
        }
    }
}

pub(crate) fn compile(
    source: &str,
    options: &CompileOptions,
    types: &TypeRegistry,
) -> Result<(Program, Metadata), CompileError> {
    let imports = types
        .resolve_imports(&options.imports)
        .map_err(CompileError::UnknownImport)?;

    let mut arena = Arena::new(source.len().max(16));
    let root = Parser::new(source, &mut arena)
        .with_debug_symbols(options.debug_symbols)
        .parse_program()?;
    let mut program = Program { arena, root };

    Folder::fold_program(&mut program);
    let result = TypeChecker::new(&options.known_inputs, &imports, types, options.strong_typing)
        .check_program(&mut program)?;

    debug!(
        source_name = options.source_name.as_deref(),
        nodes = program.arena.len(),
        statements = program.root.roots.len(),
        result = ?result,
        "Compiled expression"
    );

    Ok((
        program,
        Metadata {
            source_name: options.source_name.clone(),
            known_inputs: options.known_inputs.clone(),
            imports,
            debug_symbols: options.debug_symbols,
            strong_typing: options.strong_typing,
        },
    ))
}
