use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::{
    accessor::AccessorCache,
    arena::Arena,
    number::Number,
    range::Range,
    shape::TypeHint,
    value::Value,
};

use super::{NodeId, Operator, UnaryOp, path::PropertyPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    /// Kept only when compiled with debug symbols.
    pub span: Option<Range>,
    /// The node yields no operand; statement separators carry it.
    pub discard: bool,
    pub egress: Option<TypeHint>,
    pub next: Option<NodeId>,
}

impl Node {
    pub fn new(kind: NodeKind, span: Option<Range>) -> Self {
        Self {
            kind,
            span,
            discard: false,
            egress: None,
            next: None,
        }
    }

    pub fn end_of_statement() -> Self {
        Self {
            discard: true,
            ..Self::new(NodeKind::Operator(Operator::EndOfStatement), None)
        }
    }

    pub fn is_end_of_statement(&self) -> bool {
        matches!(self.kind, NodeKind::Operator(Operator::EndOfStatement))
    }

    /// The operator this node contributes to a flat chain, if any.
    pub fn operator(&self) -> Option<Operator> {
        match self.kind {
            NodeKind::Operator(op) => Some(op),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(Number),
    String(SmolStr),
}

impl Literal {
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Number(n) => Value::Number(*n),
            Literal::String(s) => Value::String(s.clone()),
        }
    }

    pub fn hint(&self) -> Option<TypeHint> {
        match self {
            Literal::Null => None,
            Literal::Bool(_) => Some(TypeHint::Bool),
            Literal::Number(n) => Some(TypeHint::of_number(n.kind())),
            Literal::String(_) => Some(TypeHint::String),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub path: PropertyPath,
    #[serde(skip)]
    pub cache: AccessorCache,
}

impl Property {
    pub fn new(path: PropertyPath) -> Self {
        Self {
            path,
            cache: AccessorCache::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub target: Property,
    /// Compound assignment operator, `+` for `+=`.
    pub op: Option<Operator>,
    pub value: Block,
    #[serde(skip)]
    pub set_cache: AccessorCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopKind {
    While,
    Until,
    DoWhile,
    DoUntil,
}

impl LoopKind {
    pub fn name(self) -> &'static str {
        match self {
            LoopKind::While | LoopKind::DoWhile => "while",
            LoopKind::Until | LoopKind::DoUntil => "until",
        }
    }

    /// Body runs once before the first condition check.
    pub fn is_post_test(self) -> bool {
        matches!(self, LoopKind::DoWhile | LoopKind::DoUntil)
    }

    /// Loop continues while the condition equals this.
    pub fn continue_on(self) -> bool {
        matches!(self, LoopKind::While | LoopKind::DoWhile)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKind {
    Literal(Literal),
    Property(Property),
    /// Binary, boolean or ternary operator between two operands of a flat chain.
    Operator(Operator),
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Substatement(Block),
    Assignment(Box<Assignment>),
    BinaryOp {
        op: Operator,
        left: NodeId,
        right: NodeId,
    },
    And {
        left: NodeId,
        right: NodeId,
    },
    Or {
        left: NodeId,
        right: NodeId,
    },
    Ternary {
        cond: NodeId,
        then: NodeId,
        otherwise: NodeId,
    },
    InlineList(Vec<Block>),
    InlineMap(Vec<(Block, Block)>),
    Constructor {
        type_name: SmolStr,
        args: Vec<Block>,
    },
    If {
        branches: Vec<(Block, Block)>,
        otherwise: Option<Block>,
    },
    Foreach {
        var: SmolStr,
        collection: Block,
        body: Block,
    },
    For {
        init: Block,
        cond: Block,
        step: Block,
        body: Block,
    },
    Loop {
        kind: LoopKind,
        cond: Block,
        body: Block,
    },
    Def(Arc<Function>),
    Return(Block),
}

impl NodeKind {
    /// Nested blocks owned by this node, in source order.
    pub(crate) fn blocks_mut(&mut self) -> Vec<&mut Block> {
        match self {
            NodeKind::Property(property) => property.path.blocks_mut(),
            NodeKind::Assignment(assignment) => {
                let Assignment { target, value, .. } = assignment.as_mut();
                let mut blocks = target.path.blocks_mut();
                blocks.push(value);
                blocks
            }
            NodeKind::Substatement(block) | NodeKind::Return(block) => vec![block],
            NodeKind::InlineList(items) | NodeKind::Constructor { args: items, .. } => items.iter_mut().collect(),
            NodeKind::InlineMap(entries) => entries.iter_mut().flat_map(|(k, v)| [k, v]).collect(),
            NodeKind::If { branches, otherwise } => branches
                .iter_mut()
                .flat_map(|(cond, body)| [cond, body])
                .chain(otherwise.iter_mut())
                .collect(),
            NodeKind::Foreach { collection, body, .. } => vec![collection, body],
            NodeKind::For {
                init,
                cond,
                step,
                body,
            } => vec![init, cond, step, body],
            NodeKind::Loop { cond, body, .. } => vec![cond, body],
            NodeKind::Literal(_)
            | NodeKind::Operator(_)
            | NodeKind::Unary { .. }
            | NodeKind::BinaryOp { .. }
            | NodeKind::And { .. }
            | NodeKind::Or { .. }
            | NodeKind::Ternary { .. }
            | NodeKind::Def(_) => Vec::new(),
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(
            self,
            NodeKind::If { .. }
                | NodeKind::Foreach { .. }
                | NodeKind::For { .. }
                | NodeKind::Loop { .. }
                | NodeKind::Def(_)
                | NodeKind::Return(_)
        )
    }
}

/// A statement sequence.
///
/// `head` is the flat chain, statements separated by end-of-statement nodes;
/// `roots` holds one folded tree per statement once the folder has run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Block {
    pub head: Option<NodeId>,
    pub roots: Vec<NodeId>,
    pub folded: bool,
}

impl Block {
    pub fn new(head: Option<NodeId>) -> Self {
        Self {
            head,
            roots: Vec::new(),
            folded: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Walks the flat chain.
    pub fn chain<'a>(&self, arena: &'a Arena<Node>) -> impl Iterator<Item = (NodeId, &'a Node)> + 'a {
        std::iter::successors(self.head.map(|id| (id, &arena[id])), move |(_, node)| {
            node.next.map(|id| (id, &arena[id]))
        })
    }
}

/// Nodes plus the top-level block, the unit a function body or an expression
/// compiles into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub arena: Arena<Node>,
    pub root: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub(crate) name: SmolStr,
    pub(crate) params: Vec<SmolStr>,
    pub(crate) program: Program,
}

impl Function {
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn params(&self) -> &[SmolStr] {
        &self.params
    }
}

/// Incrementally links nodes into a flat chain.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Chain {
    pub(crate) head: Option<NodeId>,
    tail: Option<NodeId>,
}

impl Chain {
    pub(crate) fn push(&mut self, arena: &mut Arena<Node>, id: NodeId) {
        self.append(
            arena,
            Chain {
                head: Some(id),
                tail: Some(id),
            },
        );
    }

    pub(crate) fn append(&mut self, arena: &mut Arena<Node>, other: Chain) {
        let Some(head) = other.head else {
            return;
        };
        match self.tail {
            Some(tail) => arena[tail].next = Some(head),
            None => self.head = Some(head),
        }
        self.tail = other.tail;
    }

    /// Appends `other` as a new statement.
    pub(crate) fn append_statement(&mut self, arena: &mut Arena<Node>, other: Chain) {
        if other.head.is_none() {
            return;
        }
        if self.head.is_some() {
            let separator = arena.alloc(Node::end_of_statement());
            self.push(arena, separator);
        }
        self.append(arena, other);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub(crate) fn into_block(self) -> Block {
        Block::new(self.head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_append_statement() {
        let mut arena = Arena::new(8);
        let mut chain = Chain::default();

        let mut first = Chain::default();
        let a = arena.alloc(Node::new(NodeKind::Literal(Literal::Number(1.into())), None));
        first.push(&mut arena, a);
        chain.append_statement(&mut arena, first);

        let mut second = Chain::default();
        let b = arena.alloc(Node::new(NodeKind::Literal(Literal::Number(2.into())), None));
        second.push(&mut arena, b);
        chain.append_statement(&mut arena, second);

        let block = chain.into_block();
        let nodes: Vec<_> = block.chain(&arena).map(|(_, node)| node.is_end_of_statement()).collect();
        assert_eq!(nodes, vec![false, true, false]);
    }

    #[test]
    fn test_loop_kind() {
        assert!(LoopKind::DoUntil.is_post_test());
        assert!(!LoopKind::Until.continue_on());
        assert!(LoopKind::While.continue_on());
    }
}
