use std::sync::Arc;

use crate::{
    arena::Arena,
    ast::{Block, Literal, Node, NodeId, NodeKind, Operator, Program},
    range::Range,
};

/// Flat chain element seen by the boolean pass.
#[derive(Debug, Clone, Copy)]
enum Item {
    Operand(NodeId),
    Op(Operator),
}

/// Folds flat statement chains into operator trees.
///
/// The folder only adds nodes: every block keeps its flat chain for the
/// stack evaluator and gains one root per statement for the tree evaluator.
/// Operands are shared between both forms, so a property node caches a
/// single accessor chain whichever evaluator reaches it.
pub(crate) struct Folder<'ar> {
    arena: &'ar mut Arena<Node>,
}

impl<'ar> Folder<'ar> {
    pub(crate) fn new(arena: &'ar mut Arena<Node>) -> Self {
        Self { arena }
    }

    pub(crate) fn fold_program(program: &mut Program) {
        let Program { arena, root } = program;
        Folder::new(arena).fold_block(root);
    }

    pub(crate) fn fold_block(&mut self, block: &mut Block) {
        if block.folded {
            return;
        }

        let ids: Vec<NodeId> = block.chain(self.arena).map(|(id, _)| id).collect();
        for &id in &ids {
            self.fold_nested(id);
        }

        let arena = &*self.arena;
        let statements: Vec<&[NodeId]> = ids
            .split(|id| arena[*id].is_end_of_statement())
            .filter(|statement| !statement.is_empty())
            .collect();
        block.roots = statements
            .into_iter()
            .map(|statement| self.fold_statement(statement))
            .collect();
        block.folded = true;
    }

    fn fold_nested(&mut self, id: NodeId) {
        let mut kind = std::mem::replace(&mut self.arena[id].kind, NodeKind::Literal(Literal::Null));

        for block in kind.blocks_mut() {
            self.fold_block(block);
        }
        match &mut kind {
            NodeKind::Unary { operand, .. } => self.fold_nested(*operand),
            NodeKind::Def(function) => Folder::fold_program(&mut Arc::make_mut(function).program),
            _ => {}
        }

        self.arena[id].kind = kind;
    }

    fn fold_statement(&mut self, statement: &[NodeId]) -> NodeId {
        let items = self.fold_arithmetic(statement);
        self.fold_logic(&items)
    }

    /// First pass: merges binary operators left to right, keeping boolean
    /// and ternary operators as separators for the second pass.
    fn fold_arithmetic(&mut self, statement: &[NodeId]) -> Vec<Item> {
        let mut items = Vec::with_capacity(statement.len());
        let mut tree: Option<NodeId> = None;
        let mut pending: Option<Operator> = None;

        for &id in statement {
            match self.arena[id].operator() {
                Some(op) if op.is_binary() => pending = Some(op),
                Some(op) => {
                    if let Some(tree) = tree.take() {
                        items.push(Item::Operand(tree));
                    }
                    items.push(Item::Op(op));
                }
                None => {
                    tree = Some(match (tree, pending.take()) {
                        (Some(tree), Some(op)) => self.merge(tree, op, id),
                        _ => id,
                    });
                }
            }
        }
        if let Some(tree) = tree {
            items.push(Item::Operand(tree));
        }
        items
    }

    /// Appends `op rhs` to `tree`, nesting into the right branch while `op`
    /// binds tighter than the branch's root.
    fn merge(&mut self, tree: NodeId, op: Operator, rhs: NodeId) -> NodeId {
        if let NodeKind::BinaryOp {
            op: root_op,
            left,
            right,
        } = self.arena[tree].kind
            && op.precedence() > root_op.precedence()
        {
            let right = self.merge(right, op, rhs);
            let span = self.join(left, right);
            let node = &mut self.arena[tree];
            node.kind = NodeKind::BinaryOp {
                op: root_op,
                left,
                right,
            };
            node.span = span;
            return tree;
        }

        let span = self.join(tree, rhs);
        self.arena.alloc(Node::new(
            NodeKind::BinaryOp {
                op,
                left: tree,
                right: rhs,
            },
            span,
        ))
    }

    /// Second pass: the first top-level `?` splits the statement, then the
    /// last `||`, then the last `&&`.
    fn fold_logic(&mut self, items: &[Item]) -> NodeId {
        match items {
            [Item::Operand(id)] => return *id,
            [] => return self.arena.alloc(Node::new(NodeKind::Literal(Literal::Null), None)),
            _ => {}
        }

        if let Some(question) = items.iter().position(|item| matches!(item, Item::Op(Operator::Ternary))) {
            let colon = matching_colon(items, question).unwrap_or(items.len());
            let cond = self.fold_logic(&items[..question]);
            let then = self.fold_logic(&items[question + 1..colon]);
            let otherwise = self.fold_logic(items.get(colon + 1..).unwrap_or_default());
            let span = self.join(cond, otherwise);
            return self
                .arena
                .alloc(Node::new(NodeKind::Ternary { cond, then, otherwise }, span));
        }

        let splits: [(Operator, fn(NodeId, NodeId) -> NodeKind); 2] = [
            (Operator::Or, |left, right| NodeKind::Or { left, right }),
            (Operator::And, |left, right| NodeKind::And { left, right }),
        ];
        for (op, make) in splits {
            if let Some(split) = items.iter().rposition(|item| matches!(item, Item::Op(o) if *o == op)) {
                let left = self.fold_logic(&items[..split]);
                let right = self.fold_logic(&items[split + 1..]);
                let span = self.join(left, right);
                return self.arena.alloc(Node::new(make(left, right), span));
            }
        }

        // operands always alternate with operators in a parsed chain
        match items.first() {
            Some(Item::Operand(id)) => *id,
            _ => self.arena.alloc(Node::new(NodeKind::Literal(Literal::Null), None)),
        }
    }

    fn join(&self, a: NodeId, b: NodeId) -> Option<Range> {
        match (self.arena[a].span, self.arena[b].span) {
            (Some(a), Some(b)) => Some(a.join(&b)),
            (span, None) | (None, span) => span,
        }
    }
}

fn matching_colon(items: &[Item], question: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, item) in items.iter().enumerate().skip(question + 1) {
        match item {
            Item::Op(Operator::Ternary) => depth += 1,
            Item::Op(Operator::TernaryElse) if depth == 0 => return Some(i),
            Item::Op(Operator::TernaryElse) => depth -= 1,
            _ => {}
        }
    }
    None
}
