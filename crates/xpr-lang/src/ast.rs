use crate::arena::ArenaId;

pub mod error;
pub mod node;
pub mod op;
pub mod parser;
pub mod path;

pub type NodeId = ArenaId<node::Node>;

pub use node::{Block, Function, Literal, Node, NodeKind, Program};
pub use op::{Operator, UnaryOp};
pub use path::{PropertyPath, Segment};
