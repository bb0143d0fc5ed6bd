use std::sync::Arc;

use smol_str::SmolStr;

use super::error::ParseError;
use super::node::{Assignment, Block, Chain, Function, Literal, LoopKind, Node, NodeKind, Program, Property};
use super::path::{PropertyPath, RawSegment, Segment, entry_colon, split_segments, split_top_level};
use super::{NodeId, Operator, UnaryOp};
use crate::arena::Arena;
use crate::lexer::Lexer;
use crate::lexer::token::{Token, TokenKind};
use crate::number::Number;
use crate::range::Range;

/// Builds flat node chains from the token stream.
///
/// Tokens are pulled from the lexer on demand. Nested source regions that the
/// lexer captures whole (path indexes, call arguments, inline collections)
/// are parsed by sub-parsers over the same arena.
pub struct Parser<'a, 'ar> {
    source: &'a str,
    lexer: Lexer<'a>,
    arena: &'ar mut Arena<Node>,
    open_blocks: Vec<(&'static str, Range)>,
    debug_symbols: bool,
}

impl<'a, 'ar> Parser<'a, 'ar> {
    pub fn new(source: &'a str, arena: &'ar mut Arena<Node>) -> Self {
        Self {
            source,
            lexer: Lexer::new(source),
            arena,
            open_blocks: Vec::new(),
            debug_symbols: true,
        }
    }

    pub fn with_debug_symbols(mut self, debug_symbols: bool) -> Self {
        self.debug_symbols = debug_symbols;
        self
    }

    /// Nodes parsed so far.
    pub(crate) fn arena(&self) -> &Arena<Node> {
        self.arena
    }

    pub fn parse_program(&mut self) -> Result<Block, ParseError> {
        let mut chain = Chain::default();
        while let Some(statement) = self.top_statement()? {
            chain.append_statement(self.arena, statement);
        }
        Ok(chain.into_block())
    }

    /// Parses the next top-level statement, or `None` at end of input.
    pub fn next_statement(&mut self) -> Result<Option<Block>, ParseError> {
        Ok(self.top_statement()?.map(Chain::into_block))
    }

    fn top_statement(&mut self) -> Result<Option<Chain>, ParseError> {
        if let Some(statement) = self.statement()? {
            return Ok(Some(statement));
        }
        let token = self.lexer.next_token()?;
        match token.kind {
            TokenKind::Eof => Ok(None),
            TokenKind::RBrace => Err(ParseError::UnmatchedBlockEnd(token.range)),
            _ => Err(ParseError::UnexpectedToken(token)),
        }
    }

    /// One statement, or `None` before `}`, `)` or end of input.
    fn statement(&mut self) -> Result<Option<Chain>, ParseError> {
        let token = loop {
            let token = self.lexer.next_token()?;
            if token.kind != TokenKind::SemiColon {
                break token;
            }
        };

        let node = match token.kind {
            TokenKind::Eof | TokenKind::RBrace | TokenKind::RParen => {
                self.lexer.back();
                return Ok(None);
            }
            TokenKind::If => self.parse_if(token)?,
            TokenKind::Foreach => self.parse_foreach(token)?,
            TokenKind::For => self.parse_for(token)?,
            TokenKind::While => self.parse_loop(token, LoopKind::While)?,
            TokenKind::Until => self.parse_loop(token, LoopKind::Until)?,
            TokenKind::Do => self.parse_do(token)?,
            TokenKind::Def => self.parse_def(token)?,
            TokenKind::Return => self.parse_return(token)?,
            _ => {
                self.lexer.back();
                let chain = self.simple_statement()?;
                if self.lexer.peek_token()?.kind == TokenKind::SemiColon {
                    self.lexer.next_token()?;
                }
                return Ok(Some(chain));
            }
        };

        let mut chain = Chain::default();
        chain.push(self.arena, node);
        Ok(Some(chain))
    }

    /// An assignment or an expression.
    fn simple_statement(&mut self) -> Result<Chain, ParseError> {
        let token = self.lexer.next_token()?;
        if let TokenKind::Property(text) = &token.kind {
            let op = match self.lexer.peek_token()?.kind {
                TokenKind::Assign => Some(None),
                TokenKind::CompoundAssign(op) => Some(Some(op)),
                TokenKind::Increment => return self.increment(&token, Operator::Add),
                TokenKind::Decrement => return self.increment(&token, Operator::Sub),
                _ => None,
            };
            if let Some(op) = op {
                self.lexer.next_token()?;
                let value = self.simple_statement()?.into_block();
                return self.assignment(text, token.range, op, value);
            }
        }
        self.lexer.back();
        self.expression()
    }

    fn increment(&mut self, target: &Token, op: Operator) -> Result<Chain, ParseError> {
        let step = self.lexer.next_token()?;
        let TokenKind::Property(text) = &target.kind else {
            return Err(ParseError::InvalidAssignmentTarget(target.range));
        };
        let one = self.alloc(NodeKind::Literal(Literal::Number(Number::Int(1))), step.range);
        let mut value = Chain::default();
        value.push(self.arena, one);
        self.assignment(text, target.range.join(&step.range), Some(op), value.into_block())
    }

    fn assignment(&mut self, text: &str, range: Range, op: Option<Operator>, value: Block) -> Result<Chain, ParseError> {
        let target = self.property_path(text, Range::new(range.start, range.start + text.len()))?;
        if matches!(target.segments.last(), Some(Segment::Call { .. })) {
            return Err(ParseError::InvalidAssignmentTarget(range));
        }

        let node = self.alloc(
            NodeKind::Assignment(Box::new(Assignment {
                target: Property::new(target),
                op,
                value,
                set_cache: Default::default(),
            })),
            range,
        );
        let mut chain = Chain::default();
        chain.push(self.arena, node);
        Ok(chain)
    }

    /// Operands alternating with binary, boolean and ternary operators, up to
    /// `;`, `}`, `)` or end of input.
    fn expression(&mut self) -> Result<Chain, ParseError> {
        let mut chain = Chain::default();
        let mut ternaries: Vec<Range> = Vec::new();

        loop {
            let token = self.lexer.next_token()?;
            let operand = self.operand(token)?;
            chain.push(self.arena, operand);

            let token = self.lexer.next_token()?;
            let op = match token.kind {
                TokenKind::Operator(op) => op,
                TokenKind::Question => {
                    ternaries.push(token.range);
                    Operator::Ternary
                }
                TokenKind::Colon if ternaries.pop().is_some() => Operator::TernaryElse,
                TokenKind::Assign | TokenKind::CompoundAssign(_) | TokenKind::Increment | TokenKind::Decrement => {
                    return Err(ParseError::InvalidAssignmentTarget(token.range));
                }
                TokenKind::SemiColon | TokenKind::RBrace | TokenKind::RParen | TokenKind::Eof => {
                    self.lexer.back();
                    break;
                }
                _ => return Err(ParseError::UnexpectedToken(token)),
            };
            let node = self.alloc(NodeKind::Operator(op), token.range);
            chain.push(self.arena, node);
        }

        match ternaries.pop() {
            Some(range) => Err(ParseError::IncompleteTernary(range)),
            None => Ok(chain),
        }
    }

    fn operand(&mut self, token: Token) -> Result<NodeId, ParseError> {
        let kind = match token.kind {
            TokenKind::NullLiteral => NodeKind::Literal(Literal::Null),
            TokenKind::BoolLiteral(b) => NodeKind::Literal(Literal::Bool(b)),
            TokenKind::NumberLiteral(n) => NodeKind::Literal(Literal::Number(n)),
            TokenKind::StringLiteral(s) => NodeKind::Literal(Literal::String(s)),
            TokenKind::Property(text) => NodeKind::Property(Property::new(self.property_path(&text, token.range)?)),
            TokenKind::InlineCollection(inner) => self.inline_collection(inner, token.range)?,
            TokenKind::LParen => {
                let (block, close) = self.parenthesized(token.range)?;
                return Ok(self.alloc(NodeKind::Substatement(block), token.range.join(&close)));
            }
            TokenKind::New => return self.constructor(token),
            TokenKind::Not => return self.unary(token.range, UnaryOp::Not),
            TokenKind::Tilde => return self.unary(token.range, UnaryOp::BitNot),
            TokenKind::Operator(Operator::Sub) => return self.unary(token.range, UnaryOp::Neg),
            TokenKind::Operator(_)
            | TokenKind::Question
            | TokenKind::Colon
            | TokenKind::SemiColon
            | TokenKind::RBrace
            | TokenKind::RParen
            | TokenKind::Eof => return Err(ParseError::MissingOperand(token.range)),
            _ => return Err(ParseError::UnexpectedToken(token)),
        };
        Ok(self.alloc(kind, token.range))
    }

    fn unary(&mut self, range: Range, op: UnaryOp) -> Result<NodeId, ParseError> {
        let token = self.lexer.next_token()?;
        let end = token.range;
        let operand = self.operand(token)?;

        if op == UnaryOp::Neg
            && let NodeKind::Literal(Literal::Number(n)) = &self.arena[operand].kind
        {
            let negated = n.neg();
            let node = &mut self.arena[operand];
            node.kind = NodeKind::Literal(Literal::Number(negated));
            if self.debug_symbols {
                node.span = Some(range.join(&end));
            }
            return Ok(operand);
        }
        Ok(self.alloc(NodeKind::Unary { op, operand }, range.join(&end)))
    }

    /// Statements up to the `)` matching an already consumed `(`.
    fn parenthesized(&mut self, open: Range) -> Result<(Block, Range), ParseError> {
        let mut chain = Chain::default();
        loop {
            let statement = self.simple_statement()?;
            chain.append_statement(self.arena, statement);

            let token = self.lexer.next_token()?;
            match token.kind {
                TokenKind::SemiColon => continue,
                TokenKind::RParen => return Ok((chain.into_block(), token.range)),
                TokenKind::Eof | TokenKind::RBrace => return Err(ParseError::UnclosedParen(open)),
                _ => return Err(ParseError::UnexpectedToken(token)),
            }
        }
    }

    fn condition(&mut self) -> Result<Block, ParseError> {
        let open = self.expect(TokenKind::LParen, "(")?;
        self.parenthesized(open.range).map(|(block, _)| block)
    }

    fn braced(&mut self) -> Result<Block, ParseError> {
        let open = self.expect(TokenKind::LBrace, "{")?;
        let mut chain = Chain::default();
        while let Some(statement) = self.statement()? {
            chain.append_statement(self.arena, statement);
        }

        let close = self.lexer.next_token()?;
        match close.kind {
            TokenKind::RBrace => Ok(chain.into_block()),
            TokenKind::Eof => {
                let (construct, range) = self.open_blocks.last().copied().unwrap_or(("block", open.range));
                Err(ParseError::UnclosedBlock { construct, range })
            }
            _ => Err(ParseError::UnexpectedToken(close)),
        }
    }

    fn parse_if(&mut self, keyword: Token) -> Result<NodeId, ParseError> {
        self.open_blocks.push(("if", keyword.range));
        let mut branches = Vec::new();
        let mut otherwise = None;

        loop {
            let cond = self.condition()?;
            let body = self.braced()?;
            branches.push((cond, body));

            if self.lexer.peek_token()?.kind != TokenKind::Else {
                break;
            }
            self.lexer.next_token()?;
            if self.lexer.peek_token()?.kind == TokenKind::If {
                self.lexer.next_token()?;
                continue;
            }
            otherwise = Some(self.braced()?);
            break;
        }

        self.open_blocks.pop();
        Ok(self.alloc(NodeKind::If { branches, otherwise }, keyword.range))
    }

    fn parse_foreach(&mut self, keyword: Token) -> Result<NodeId, ParseError> {
        self.open_blocks.push(("foreach", keyword.range));
        let open = self.expect(TokenKind::LParen, "(")?;
        let node = self.foreach_rest(keyword.range, open.range)?;
        self.open_blocks.pop();
        Ok(node)
    }

    /// `var : collection) { body }`
    fn foreach_rest(&mut self, keyword: Range, open: Range) -> Result<NodeId, ParseError> {
        let var = self.lexer.next_token()?;
        let var = match &var.kind {
            TokenKind::Property(name) if is_identifier(name) => name.clone(),
            _ => {
                return Err(ParseError::Expected {
                    expected: "loop variable",
                    found: var,
                });
            }
        };
        self.expect(TokenKind::Colon, ":")?;
        let (collection, _) = self.parenthesized(open)?;
        let body = self.braced()?;
        Ok(self.alloc(NodeKind::Foreach { var, collection, body }, keyword))
    }

    fn parse_for(&mut self, keyword: Token) -> Result<NodeId, ParseError> {
        self.open_blocks.push(("for", keyword.range));
        let open = self.expect(TokenKind::LParen, "(")?;

        let mut lookahead = self.lexer.clone();
        let is_foreach = matches!(lookahead.next_token()?.kind, TokenKind::Property(ref name) if is_identifier(name))
            && lookahead.next_token()?.kind == TokenKind::Colon;
        if is_foreach {
            let node = self.foreach_rest(keyword.range, open.range)?;
            self.open_blocks.pop();
            return Ok(node);
        }

        let init = self.optional_statement(TokenKind::SemiColon)?;
        self.expect(TokenKind::SemiColon, ";")?;
        let cond = self.optional_statement(TokenKind::SemiColon)?;
        self.expect(TokenKind::SemiColon, ";")?;
        let step = self.optional_statement(TokenKind::RParen)?;
        self.expect(TokenKind::RParen, ")")?;
        let body = self.braced()?;

        self.open_blocks.pop();
        Ok(self.alloc(
            NodeKind::For {
                init,
                cond,
                step,
                body,
            },
            keyword.range,
        ))
    }

    fn optional_statement(&mut self, terminator: TokenKind) -> Result<Block, ParseError> {
        if self.lexer.peek_token()?.kind == terminator {
            Ok(Block::default())
        } else {
            Ok(self.simple_statement()?.into_block())
        }
    }

    fn parse_loop(&mut self, keyword: Token, kind: LoopKind) -> Result<NodeId, ParseError> {
        self.open_blocks.push((kind.name(), keyword.range));
        let cond = self.condition()?;
        let body = self.braced()?;
        self.open_blocks.pop();
        Ok(self.alloc(NodeKind::Loop { kind, cond, body }, keyword.range))
    }

    fn parse_do(&mut self, keyword: Token) -> Result<NodeId, ParseError> {
        self.open_blocks.push(("do", keyword.range));
        let body = self.braced()?;
        let token = self.lexer.next_token()?;
        let kind = match token.kind {
            TokenKind::While => LoopKind::DoWhile,
            TokenKind::Until => LoopKind::DoUntil,
            _ => {
                return Err(ParseError::Expected {
                    expected: "while",
                    found: token,
                });
            }
        };
        let cond = self.condition()?;
        self.open_blocks.pop();
        Ok(self.alloc(NodeKind::Loop { kind, cond, body }, keyword.range))
    }

    fn parse_def(&mut self, keyword: Token) -> Result<NodeId, ParseError> {
        self.open_blocks.push(("def", keyword.range));
        let token = self.lexer.next_token()?;
        let TokenKind::Property(signature) = &token.kind else {
            return Err(ParseError::Expected {
                expected: "function name",
                found: token,
            });
        };
        let invalid = || ParseError::InvalidPath(signature.clone(), token.range);

        let (name, params) = match split_segments(signature).as_deref() {
            Some([RawSegment::Name { name, null_safe: false }]) => (name.clone(), Vec::new()),
            Some([RawSegment::Call {
                name,
                args,
                null_safe: false,
            }]) => {
                let params = args
                    .iter()
                    .map(|arg| {
                        let param = signature[arg.start..arg.end].trim();
                        is_identifier(param).then(|| SmolStr::new(param)).ok_or_else(invalid)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                (name.clone(), params)
            }
            _ => return Err(invalid()),
        };

        let mut arena = Arena::new(32);
        let mut body_parser = Parser {
            source: self.source,
            lexer: self.lexer.clone(),
            arena: &mut arena,
            open_blocks: std::mem::take(&mut self.open_blocks),
            debug_symbols: self.debug_symbols,
        };
        let body = body_parser.braced();
        self.lexer = body_parser.lexer;
        self.open_blocks = body_parser.open_blocks;
        let root = body?;

        self.open_blocks.pop();
        let function = Function {
            name,
            params,
            program: Program { arena, root },
        };
        Ok(self.alloc(NodeKind::Def(Arc::new(function)), keyword.range))
    }

    fn parse_return(&mut self, keyword: Token) -> Result<NodeId, ParseError> {
        let value = match self.lexer.peek_token()?.kind {
            TokenKind::SemiColon | TokenKind::RBrace | TokenKind::Eof => Block::default(),
            _ => self.simple_statement()?.into_block(),
        };
        Ok(self.alloc(NodeKind::Return(value), keyword.range))
    }

    fn constructor(&mut self, keyword: Token) -> Result<NodeId, ParseError> {
        let token = self.lexer.next_token()?;
        let TokenKind::Property(text) = &token.kind else {
            return Err(ParseError::Expected {
                expected: "type name",
                found: token,
            });
        };
        let invalid = || ParseError::InvalidPath(text.clone(), token.range);
        let segments = split_segments(text).ok_or_else(invalid)?;

        let last = segments.len() - 1;
        let mut names = Vec::with_capacity(segments.len());
        let mut arg_ranges = Vec::new();
        for (i, segment) in segments.into_iter().enumerate() {
            match segment {
                RawSegment::Name { name, null_safe: false } => names.push(name),
                RawSegment::Call {
                    name,
                    args,
                    null_safe: false,
                } if i == last => {
                    names.push(name);
                    arg_ranges = args;
                }
                _ => return Err(invalid()),
            }
        }

        let args = arg_ranges
            .into_iter()
            .map(|r| self.fragment_block(Range::new(token.range.start + r.start, token.range.start + r.end)))
            .collect::<Result<Vec<_>, _>>()?;
        let type_name = SmolStr::new(names.join("."));
        Ok(self.alloc(NodeKind::Constructor { type_name, args }, keyword.range.join(&token.range)))
    }

    fn inline_collection(&mut self, inner: Range, outer: Range) -> Result<NodeKind, ParseError> {
        let source = self.source;
        if source[inner.start..inner.end].trim() == ":" {
            return Ok(NodeKind::InlineMap(Vec::new()));
        }

        let pieces = split_top_level(source, inner, ',');
        let colons: Vec<_> = pieces.iter().map(|piece| entry_colon(source, *piece)).collect();

        if !colons.is_empty() && colons.iter().all(Option::is_some) {
            let entries = pieces
                .iter()
                .zip(colons.into_iter().flatten())
                .map(|(piece, colon)| {
                    let key = self.fragment_block(Range::new(piece.start, colon))?;
                    let value = self.fragment_block(Range::new(colon + 1, piece.end))?;
                    Ok((key, value))
                })
                .collect::<Result<Vec<_>, ParseError>>()?;
            Ok(NodeKind::InlineMap(entries))
        } else if colons.iter().all(Option::is_none) {
            let items = pieces
                .into_iter()
                .map(|piece| self.fragment_block(piece))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(NodeKind::InlineList(items))
        } else {
            Err(ParseError::MixedCollection(outer))
        }
    }

    fn property_path(&mut self, text: &str, range: Range) -> Result<PropertyPath, ParseError> {
        let raw = split_segments(text).ok_or_else(|| ParseError::InvalidPath(text.into(), range))?;
        let shift = |r: Range| Range::new(range.start + r.start, range.start + r.end);

        let segments = raw
            .into_iter()
            .map(|segment| {
                Ok(match segment {
                    RawSegment::Name { name, null_safe } => Segment::Name { name, null_safe },
                    RawSegment::Index { inner } => Segment::Index {
                        expr: self.fragment_block(shift(inner))?,
                    },
                    RawSegment::Call { name, args, null_safe } => Segment::Call {
                        name,
                        args: args
                            .into_iter()
                            .map(|arg| self.fragment_block(shift(arg)))
                            .collect::<Result<Vec<_>, _>>()?,
                        null_safe,
                    },
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        Ok(PropertyPath {
            text: text.into(),
            segments,
        })
    }

    /// Parses `source[range]` as `;`-separated simple statements.
    fn fragment_block(&mut self, range: Range) -> Result<Block, ParseError> {
        let mut parser = Parser {
            source: self.source,
            lexer: Lexer::with_offset(&self.source[range.start..range.end], range.start),
            arena: &mut *self.arena,
            open_blocks: Vec::new(),
            debug_symbols: self.debug_symbols,
        };

        let mut chain = Chain::default();
        loop {
            let statement = parser.simple_statement()?;
            chain.append_statement(parser.arena, statement);

            let token = parser.lexer.next_token()?;
            match token.kind {
                TokenKind::SemiColon if parser.lexer.peek_token()?.kind != TokenKind::Eof => continue,
                TokenKind::SemiColon | TokenKind::Eof => return Ok(chain.into_block()),
                _ => return Err(ParseError::UnexpectedToken(token)),
            }
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<Token, ParseError> {
        let token = self.lexer.next_token()?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(ParseError::Expected { expected, found: token })
        }
    }

    fn alloc(&mut self, kind: NodeKind, range: Range) -> NodeId {
        let span = self.debug_symbols.then_some(range);
        self.arena.alloc(Node::new(kind, span))
    }
}

fn is_identifier(text: &str) -> bool {
    matches!(split_segments(text).as_deref(), Some([RawSegment::Name { null_safe: false, .. }]))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use itertools::Itertools;
    use rstest::rstest;

    pub(crate) fn render_block(arena: &Arena<Node>, block: &Block) -> String {
        block
            .chain(arena)
            .map(|(id, _)| render_node(arena, id))
            .join(" ")
            .replace(" ;", ";")
    }

    fn render_blocks(arena: &Arena<Node>, blocks: &[Block]) -> String {
        blocks.iter().map(|b| render_block(arena, b)).join(", ")
    }

    pub(crate) fn render_node(arena: &Arena<Node>, id: NodeId) -> String {
        match &arena[id].kind {
            NodeKind::Literal(Literal::String(s)) => format!("{:?}", s.as_str()),
            NodeKind::Literal(literal) => literal.to_value().to_string(),
            NodeKind::Property(property) => property.path.text.to_string(),
            NodeKind::Operator(op) => op.to_string(),
            NodeKind::Unary { op, operand } => format!("{}{}", op, render_node(arena, *operand)),
            NodeKind::Substatement(block) => format!("({})", render_block(arena, block)),
            NodeKind::Assignment(assignment) => format!(
                "{} {}= {}",
                assignment.target.path.text,
                assignment.op.map(|op| op.to_string()).unwrap_or_default(),
                render_block(arena, &assignment.value)
            ),
            NodeKind::BinaryOp { op, left, right } => {
                format!("({} {} {})", render_node(arena, *left), op, render_node(arena, *right))
            }
            NodeKind::And { left, right } => {
                format!("({} && {})", render_node(arena, *left), render_node(arena, *right))
            }
            NodeKind::Or { left, right } => {
                format!("({} || {})", render_node(arena, *left), render_node(arena, *right))
            }
            NodeKind::Ternary { cond, then, otherwise } => format!(
                "({} ? {} : {})",
                render_node(arena, *cond),
                render_node(arena, *then),
                render_node(arena, *otherwise)
            ),
            NodeKind::InlineList(items) => format!("[{}]", render_blocks(arena, items)),
            NodeKind::InlineMap(entries) => format!(
                "[{}]",
                if entries.is_empty() {
                    ":".to_string()
                } else {
                    entries
                        .iter()
                        .map(|(k, v)| format!("{}: {}", render_block(arena, k), render_block(arena, v)))
                        .join(", ")
                }
            ),
            NodeKind::Constructor { type_name, args } => format!("new {}({})", type_name, render_blocks(arena, args)),
            NodeKind::If { branches, otherwise } => {
                let mut out = branches
                    .iter()
                    .map(|(c, b)| format!("if ({}) {{{}}}", render_block(arena, c), render_block(arena, b)))
                    .join(" else ");
                if let Some(otherwise) = otherwise {
                    out.push_str(&format!(" else {{{}}}", render_block(arena, otherwise)));
                }
                out
            }
            NodeKind::Foreach { var, collection, body } => format!(
                "foreach ({} : {}) {{{}}}",
                var,
                render_block(arena, collection),
                render_block(arena, body)
            ),
            NodeKind::For {
                init,
                cond,
                step,
                body,
            } => format!(
                "for ({}; {}; {}) {{{}}}",
                render_block(arena, init),
                render_block(arena, cond),
                render_block(arena, step),
                render_block(arena, body)
            ),
            NodeKind::Loop { kind, cond, body } if kind.is_post_test() => format!(
                "do {{{}}} {} ({})",
                render_block(arena, body),
                kind.name(),
                render_block(arena, cond)
            ),
            NodeKind::Loop { kind, cond, body } => format!(
                "{} ({}) {{{}}}",
                kind.name(),
                render_block(arena, cond),
                render_block(arena, body)
            ),
            NodeKind::Def(function) => format!(
                "def {}({}) {{{}}}",
                function.name,
                function.params.iter().join(", "),
                render_block(&function.program.arena, &function.program.root)
            ),
            NodeKind::Return(value) => format!("return {}", render_block(arena, value)).trim_end().to_string(),
        }
    }

    fn parse(source: &str) -> Result<String, ParseError> {
        let mut arena = Arena::new(64);
        let block = Parser::new(source, &mut arena).parse_program()?;
        Ok(render_block(&arena, &block))
    }

    #[rstest]
    #[case::arithmetic("2 + 3 * 4", "2 + 3 * 4")]
    #[case::statements("x = 5; x + 1", "x = 5; x + 1")]
    #[case::compound("total += price * 2", "total += price * 2")]
    #[case::increment("i++", "i += 1")]
    #[case::chained_assignment("a = b = 1", "a = b = 1")]
    #[case::index_assignment("list[0] = 'v'", "list[0] = \"v\"")]
    #[case::negative_literal("-5 + -x", "-5 + -x")]
    #[case::not("!a && b", "!a && b")]
    #[case::ternary("a ? b : c ? d : e", "a ? b : c ? d : e")]
    #[case::substatement("(1 + 2) * 3", "(1 + 2) * 3")]
    #[case::inline_list("[1, 'a', [2]]", "[1, \"a\", [2]]")]
    #[case::inline_map("['k': 1, 'j': a ? 1 : 2]", "[\"k\": 1, \"j\": a ? 1 : 2]")]
    #[case::empty_map("[:]", "[:]")]
    #[case::empty_list("[]", "[]")]
    #[case::constructor("new geo.Point(1, 2)", "new geo.Point(1, 2)")]
    #[case::word_operators("name contains 'x' || v instanceof Integer", "name contains \"x\" || v instanceof Integer")]
    #[case::if_else(
        "if (a > 1) { b } else if (c) { d; e } else { f }",
        "if (a > 1) {b} else if (c) {d; e} else {f}"
    )]
    #[case::foreach("foreach (item : items) { total += item }", "foreach (item : items) {total += item}")]
    #[case::for_each_form("for (item : items) { x }", "foreach (item : items) {x}")]
    #[case::for_loop("for (i = 0; i < 10; i++) { s += i }", "for (i = 0; i < 10; i += 1) {s += i}")]
    #[case::while_loop("while (i < 3) { i = i + 1 }", "while (i < 3) {i = i + 1}")]
    #[case::until_loop("until (done) { step() }", "until (done) {step()}")]
    #[case::do_while("do { i++ } while (i < 3)", "do {i += 1} while (i < 3)")]
    #[case::def("def add(a, b) { return a + b }; add(1, 2)", "def add(a, b) {return a + b}; add(1, 2)")]
    #[case::statement_after_block("if (a) { b } c", "if (a) {b}; c")]
    fn test_parse(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(parse(source), Ok(expected.to_string()));
    }

    #[rstest]
    #[case::unclosed_if("x = 1;\nif (a) { b", ParseError::UnclosedBlock { construct: "if", range: Range::new(7, 9) })]
    #[case::unclosed_nested(
        "foreach (x : xs) { while (y) { z }",
        ParseError::UnclosedBlock { construct: "foreach", range: Range::new(0, 7) }
    )]
    #[case::unmatched_end("a }", ParseError::UnmatchedBlockEnd(Range::new(2, 3)))]
    #[case::missing_operand("1 + ", ParseError::MissingOperand(Range::new(4, 4)))]
    #[case::leading_operator("* 2", ParseError::MissingOperand(Range::new(0, 1)))]
    #[case::incomplete_ternary("a ? b", ParseError::IncompleteTernary(Range::new(2, 3)))]
    #[case::invalid_target("a + b = 1", ParseError::InvalidAssignmentTarget(Range::new(6, 7)))]
    #[case::call_target("f() = 1", ParseError::InvalidAssignmentTarget(Range::new(0, 3)))]
    #[case::unclosed_paren("(1 + 2", ParseError::UnclosedParen(Range::new(0, 1)))]
    #[case::mixed_collection("[1, 'k': 2]", ParseError::MixedCollection(Range::new(0, 11)))]
    fn test_parse_error(#[case] source: &str, #[case] expected: ParseError) {
        assert_eq!(parse(source), Err(expected));
    }

    #[test]
    fn test_missing_brace() {
        let err = parse("while (a) b").unwrap_err();
        assert!(matches!(err, ParseError::Expected { expected: "{", .. }));
    }

    #[test]
    fn test_next_statement_is_incremental() {
        let mut arena = Arena::new(16);
        let mut parser = Parser::new("a = 1; b = a + 1; ) junk", &mut arena);
        assert!(parser.next_statement().unwrap().is_some());
        assert!(parser.next_statement().unwrap().is_some());
        assert!(matches!(parser.next_statement(), Err(ParseError::UnexpectedToken(_))));
    }

    #[test]
    fn test_spans_follow_debug_symbols() {
        let mut arena = Arena::new(16);
        let block = Parser::new("a + 1", &mut arena)
            .with_debug_symbols(false)
            .parse_program()
            .unwrap();
        assert!(block.chain(&arena).all(|(_, node)| node.span.is_none()));

        let mut arena = Arena::new(16);
        let block = Parser::new("a + 1", &mut arena).parse_program().unwrap();
        let spans: Vec<_> = block.chain(&arena).map(|(_, node)| node.span).collect();
        assert_eq!(
            spans,
            vec![Some(Range::new(0, 1)), Some(Range::new(2, 3)), Some(Range::new(4, 5))]
        );
    }
}
