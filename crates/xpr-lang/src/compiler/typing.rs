use std::sync::Arc;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::error::CompileError;
use crate::{
    arena::Arena,
    ast::{Block, Literal, Node, NodeId, NodeKind, Operator, Program, UnaryOp},
    number::NumberKind,
    range::Range,
    shape::{BuiltinType, TypeHint, TypeRegistry},
};

/// Annotates folded trees with result types.
///
/// Types stay advisory: unknown operands never fail. With strong typing an
/// operator whose operand types are both known and can never combine is a
/// compile error, as is `new` of a type nobody registered.
pub(crate) struct TypeChecker<'a> {
    inputs: &'a FxHashMap<SmolStr, TypeHint>,
    imports: &'a FxHashMap<SmolStr, SmolStr>,
    types: &'a TypeRegistry,
    strong: bool,
    locals: FxHashMap<SmolStr, TypeHint>,
}

impl<'a> TypeChecker<'a> {
    pub(crate) fn new(
        inputs: &'a FxHashMap<SmolStr, TypeHint>,
        imports: &'a FxHashMap<SmolStr, SmolStr>,
        types: &'a TypeRegistry,
        strong: bool,
    ) -> Self {
        Self {
            inputs,
            imports,
            types,
            strong,
            locals: FxHashMap::default(),
        }
    }

    pub(crate) fn check_program(&mut self, program: &mut Program) -> Result<Option<TypeHint>, CompileError> {
        let Program { arena, root } = program;
        self.check_block(arena, root)
    }

    fn check_block(&mut self, arena: &mut Arena<Node>, block: &Block) -> Result<Option<TypeHint>, CompileError> {
        let mut last = None;
        for &root in &block.roots {
            last = self.infer(arena, root)?;
        }
        Ok(last)
    }

    fn infer(&mut self, arena: &mut Arena<Node>, id: NodeId) -> Result<Option<TypeHint>, CompileError> {
        let mut kind = std::mem::replace(&mut arena[id].kind, NodeKind::Literal(Literal::Null));
        let span = arena[id].span;
        let inferred = self.infer_kind(arena, &mut kind, span);
        arena[id].kind = kind;

        let hint = inferred?.filter(|hint| *hint != TypeHint::Any);
        arena[id].egress = hint.clone();
        Ok(hint)
    }

    fn infer_kind(
        &mut self,
        arena: &mut Arena<Node>,
        kind: &mut NodeKind,
        span: Option<Range>,
    ) -> Result<Option<TypeHint>, CompileError> {
        Ok(match kind {
            NodeKind::Literal(literal) => literal.hint(),
            NodeKind::Operator(_) => None,
            NodeKind::Property(property) => {
                for block in property.path.blocks_mut() {
                    self.check_block(arena, block)?;
                }
                property.path.simple_name().and_then(|name| self.variable(name))
            }
            NodeKind::Unary { op, operand } => {
                let operand = self.infer(arena, *operand)?;
                self.unary(*op, operand, span)?
            }
            NodeKind::Substatement(block) | NodeKind::Return(block) => self.check_block(arena, block)?,
            NodeKind::Assignment(assignment) => {
                for block in assignment.target.path.blocks_mut() {
                    self.check_block(arena, block)?;
                }
                let value = self.check_block(arena, &assignment.value)?;
                let name = assignment.target.path.simple_name().cloned();
                let hint = match assignment.op {
                    Some(op) => {
                        let current = name.as_deref().and_then(|name| self.variable(name));
                        self.binary(op, current, value, span)?
                    }
                    None => value,
                };
                if let Some(name) = name {
                    match &hint {
                        Some(hint) => self.locals.insert(name, hint.clone()),
                        None => self.locals.remove(&name),
                    };
                }
                hint
            }
            NodeKind::BinaryOp { op, left, right } => {
                let (op, left, right) = (*op, *left, *right);
                let left = self.infer(arena, left)?;
                let right = self.infer(arena, right)?;
                self.binary(op, left, right, span)?
            }
            NodeKind::And { left, right } => self.logic("&&", arena, *left, *right, span)?,
            NodeKind::Or { left, right } => self.logic("||", arena, *left, *right, span)?,
            NodeKind::Ternary { cond, then, otherwise } => {
                let (cond, then, otherwise) = (*cond, *then, *otherwise);
                self.infer(arena, cond)?;
                let then = self.infer(arena, then)?;
                let otherwise = self.infer(arena, otherwise)?;
                then.filter(|then| otherwise.as_ref() == Some(then))
            }
            NodeKind::InlineList(items) => {
                for item in items {
                    self.check_block(arena, item)?;
                }
                Some(TypeHint::List)
            }
            NodeKind::InlineMap(entries) => {
                for (key, value) in entries {
                    self.check_block(arena, key)?;
                    self.check_block(arena, value)?;
                }
                Some(TypeHint::Map)
            }
            NodeKind::Constructor { type_name, args } => {
                for arg in args.iter() {
                    self.check_block(arena, arg)?;
                }
                self.constructed(type_name, span)?
            }
            NodeKind::Foreach { var, collection, body } => {
                self.check_block(arena, collection)?;
                self.locals.remove(var.as_str());
                self.check_block(arena, body)?;
                None
            }
            NodeKind::Def(function) => {
                let function = Arc::make_mut(function);
                let mut checker = TypeChecker::new(self.inputs, self.imports, self.types, self.strong);
                for param in &function.params {
                    checker.locals.insert(param.clone(), TypeHint::Any);
                }
                checker.check_program(&mut function.program)?;
                None
            }
            NodeKind::If { .. } | NodeKind::For { .. } | NodeKind::Loop { .. } => {
                for block in kind.blocks_mut() {
                    self.check_block(arena, block)?;
                }
                None
            }
        })
    }

    fn logic(
        &mut self,
        symbol: &str,
        arena: &mut Arena<Node>,
        left: NodeId,
        right: NodeId,
        span: Option<Range>,
    ) -> Result<Option<TypeHint>, CompileError> {
        let left = self.infer(arena, left)?;
        let right = self.infer(arena, right)?;
        for hint in [&left, &right] {
            self.require(symbol, hint, &left, &right, span, |h| *h == TypeHint::Bool)?;
        }
        Ok(Some(TypeHint::Bool))
    }

    fn variable(&self, name: &str) -> Option<TypeHint> {
        self.locals.get(name).or_else(|| self.inputs.get(name)).cloned()
    }

    fn constructed(&self, type_name: &SmolStr, span: Option<Range>) -> Result<Option<TypeHint>, CompileError> {
        if let Some(builtin) = BuiltinType::from_name(type_name) {
            return Ok(Some(builtin.hint()));
        }
        let qualified = self.imports.get(type_name).unwrap_or(type_name);
        if self.types.get(qualified).is_some() {
            Ok(Some(TypeHint::Object(qualified.clone())))
        } else if self.strong {
            Err(CompileError::UnknownType(type_name.clone(), span))
        } else {
            Ok(None)
        }
    }

    fn unary(&self, op: UnaryOp, operand: Option<TypeHint>, span: Option<Range>) -> Result<Option<TypeHint>, CompileError> {
        let symbol = op.to_string();
        let fits = |hint: &TypeHint| match op {
            UnaryOp::Not => *hint == TypeHint::Bool,
            UnaryOp::Neg => numeric_kind(hint).is_some() || *hint == TypeHint::Number,
            UnaryOp::BitNot => numeric_kind(hint).is_some_and(NumberKind::is_integral),
        };
        if self.strong
            && let Some(hint) = &operand
            && !is_opaque(hint)
            && !fits(hint)
        {
            return Err(CompileError::IncompatibleTypes {
                op: symbol.into(),
                left: hint.clone(),
                right: hint.clone(),
                range: span,
            });
        }
        Ok(match op {
            UnaryOp::Not => Some(TypeHint::Bool),
            UnaryOp::Neg | UnaryOp::BitNot => operand,
        })
    }

    /// Result type of `left op right`.
    fn binary(
        &self,
        op: Operator,
        left: Option<TypeHint>,
        right: Option<TypeHint>,
        span: Option<Range>,
    ) -> Result<Option<TypeHint>, CompileError> {
        let symbol = op.symbol();
        let either_string = [&left, &right]
            .iter()
            .any(|hint| matches!(hint, Some(TypeHint::String)));

        Ok(match op {
            Operator::Add if either_string => Some(TypeHint::String),
            Operator::Add | Operator::Sub | Operator::Mul | Operator::Div | Operator::Rem | Operator::Pow => {
                for hint in [&left, &right] {
                    self.require(symbol, hint, &left, &right, span, |h| {
                        numeric_kind(h).is_some() || *h == TypeHint::Number
                    })?;
                }
                widest(&left, &right)
            }
            Operator::StrAppend => Some(TypeHint::String),
            Operator::Eq | Operator::Ne | Operator::InstanceOf | Operator::ConvertibleTo | Operator::Contains => {
                Some(TypeHint::Bool)
            }
            Operator::Lt | Operator::Gt | Operator::Le | Operator::Ge => {
                if let (Some(l), Some(r)) = (&left, &right)
                    && !is_opaque(l)
                    && !is_opaque(r)
                {
                    let ordered = (is_numeric(l) && is_numeric(r))
                        || (matches!(l, TypeHint::String | TypeHint::Char) && l == r);
                    if self.strong && !ordered {
                        return Err(self.incompatible(symbol, &left, &right, span));
                    }
                }
                Some(TypeHint::Bool)
            }
            Operator::SoundsLike | Operator::Similarity | Operator::Regex => {
                for hint in [&left, &right] {
                    self.require(symbol, hint, &left, &right, span, |h| {
                        matches!(h, TypeHint::String | TypeHint::Char)
                    })?;
                }
                Some(if op == Operator::Similarity {
                    TypeHint::Double
                } else {
                    TypeHint::Bool
                })
            }
            Operator::BitAnd | Operator::BitOr | Operator::BitXor => {
                if left == Some(TypeHint::Bool) && right == Some(TypeHint::Bool) {
                    Some(TypeHint::Bool)
                } else {
                    for hint in [&left, &right] {
                        self.require(symbol, hint, &left, &right, span, |h| {
                            *h == TypeHint::Bool || numeric_kind(h).is_some_and(NumberKind::is_integral)
                        })?;
                    }
                    widest(&left, &right)
                }
            }
            Operator::Shl | Operator::Shr | Operator::UShr => {
                for hint in [&left, &right] {
                    self.require(symbol, hint, &left, &right, span, |h| {
                        numeric_kind(h).is_some_and(NumberKind::is_integral)
                    })?;
                }
                left.filter(|hint| numeric_kind(hint).is_some())
            }
            Operator::And | Operator::Or => Some(TypeHint::Bool),
            Operator::Ternary | Operator::TernaryElse | Operator::EndOfStatement => None,
        })
    }

    /// With strong typing, fails when `hint` is known and rejected by `accepts`.
    fn require(
        &self,
        op: &str,
        hint: &Option<TypeHint>,
        left: &Option<TypeHint>,
        right: &Option<TypeHint>,
        span: Option<Range>,
        accepts: impl Fn(&TypeHint) -> bool,
    ) -> Result<(), CompileError> {
        match hint {
            Some(hint) if self.strong && !is_opaque(hint) && !accepts(hint) => {
                Err(self.incompatible(op, left, right, span))
            }
            _ => Ok(()),
        }
    }

    fn incompatible(
        &self,
        op: &str,
        left: &Option<TypeHint>,
        right: &Option<TypeHint>,
        span: Option<Range>,
    ) -> CompileError {
        CompileError::IncompatibleTypes {
            op: op.into(),
            left: left.clone().unwrap_or(TypeHint::Any),
            right: right.clone().unwrap_or(TypeHint::Any),
            range: span,
        }
    }
}

/// Hints that may hold anything at run time.
fn is_opaque(hint: &TypeHint) -> bool {
    matches!(hint, TypeHint::Any | TypeHint::Object(_))
}

fn is_numeric(hint: &TypeHint) -> bool {
    numeric_kind(hint).is_some() || *hint == TypeHint::Number
}

/// Chars take part in arithmetic as ints.
fn numeric_kind(hint: &TypeHint) -> Option<NumberKind> {
    match hint {
        TypeHint::Char => Some(NumberKind::Int),
        hint => hint.number_kind(),
    }
}

fn widest(left: &Option<TypeHint>, right: &Option<TypeHint>) -> Option<TypeHint> {
    let left = numeric_kind(left.as_ref()?)?;
    let right = numeric_kind(right.as_ref()?)?;
    Some(TypeHint::of_number(left.max(right)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ast::parser::Parser, compiler::fold::Folder};
    use rstest::rstest;

    fn check(source: &str, strong: bool, inputs: &[(&str, TypeHint)]) -> Result<Option<TypeHint>, CompileError> {
        let mut arena = Arena::new(32);
        let root = Parser::new(source, &mut arena).parse_program()?;
        let mut program = Program { arena, root };
        Folder::fold_program(&mut program);

        let inputs: FxHashMap<SmolStr, TypeHint> = inputs.iter().map(|(k, v)| (SmolStr::new(k), v.clone())).collect();
        let imports = FxHashMap::default();
        let types = TypeRegistry::default();
        TypeChecker::new(&inputs, &imports, &types, strong).check_program(&mut program)
    }

    #[rstest]
    #[case::int_arithmetic("1 + 2 * 3", Some(TypeHint::Int))]
    #[case::promotion("1 + 2L * 1.5", Some(TypeHint::Double))]
    #[case::string_concat("'a' + 1", Some(TypeHint::String))]
    #[case::comparison("1 < 2", Some(TypeHint::Bool))]
    #[case::logic("a && b", Some(TypeHint::Bool))]
    #[case::local("x = 1L; x + 1", Some(TypeHint::Long))]
    #[case::unknown_property("a + 1", None)]
    #[case::ternary_same("c ? 1 : 2", Some(TypeHint::Int))]
    #[case::ternary_mixed("c ? 1 : 'a'", None)]
    #[case::list("[1, 2]", Some(TypeHint::List))]
    #[case::similarity("'a' strsim 'b'", Some(TypeHint::Double))]
    fn test_infer(#[case] source: &str, #[case] expected: Option<TypeHint>) {
        assert_eq!(check(source, false, &[]), Ok(expected));
    }

    #[rstest]
    #[case::string_times_int("\"a\" * 2", "*")]
    #[case::bool_minus("true - 1", "-")]
    #[case::string_shift("'a' << 1", "<<")]
    #[case::not_a_string("!'a'", "!")]
    #[case::ordering("'a' < 1", "<")]
    #[case::known_input("name * 2", "*")]
    #[case::local_type("s = 'x'; s / 2", "/")]
    fn test_strong_typing_rejects(#[case] source: &str, #[case] op: &str) {
        let result = check(source, true, &[("name", TypeHint::String)]);
        assert!(
            matches!(&result, Err(CompileError::IncompatibleTypes { op: o, .. }) if o == op),
            "{result:?}"
        );
    }

    #[rstest]
    #[case::unknown_operands("a * b")]
    #[case::object_input("p * 2")]
    #[case::any_input("v - 1")]
    #[case::loose_mode_string_math("1 + 1")]
    fn test_strong_typing_accepts(#[case] source: &str) {
        let inputs = [("p", TypeHint::Object("geo.Point".into())), ("v", TypeHint::Any)];
        assert!(check(source, true, &inputs).is_ok());
    }

    #[test]
    fn test_weak_typing_never_fails() {
        assert_eq!(check("\"a\" * 2", false, &[]), Ok(None));
    }

    #[test]
    fn test_strong_typing_unknown_constructor() {
        assert!(matches!(
            check("new geo.Point(1)", true, &[]),
            Err(CompileError::UnknownType(name, _)) if name == "geo.Point"
        ));
        assert_eq!(check("new ArrayList()", true, &[]), Ok(Some(TypeHint::List)));
    }
}
