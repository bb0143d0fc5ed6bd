use smol_str::SmolStr;
use thiserror::Error;

use crate::shape::HostError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropertyError {
    #[error("Cannot resolve `{segment}` of `{path}` on {shape}")]
    Unresolvable {
        segment: SmolStr,
        path: SmolStr,
        shape: SmolStr,
    },
    #[error("No overload of `{method}` on {shape} accepts ({args})")]
    NoOverload {
        method: SmolStr,
        shape: SmolStr,
        args: SmolStr,
    },
    #[error("`{segment}` of `{path}` dereferences null")]
    NullDereference { segment: SmolStr, path: SmolStr },
    #[error("Cannot assign `{segment}` of `{path}` on {shape}")]
    NotWritable {
        segment: SmolStr,
        path: SmolStr,
        shape: SmolStr,
    },
    #[error("Index {index} out of bounds for length {len} in `{path}`")]
    IndexOutOfBounds { path: SmolStr, index: i64, len: usize },
    #[error("Invalid index `{index}` for {shape} in `{path}`")]
    InvalidIndex {
        path: SmolStr,
        index: SmolStr,
        shape: SmolStr,
    },
    #[error("`{member}` on {shape} failed: {source}")]
    Host {
        member: SmolStr,
        shape: SmolStr,
        #[source]
        source: HostError,
    },
}

impl PropertyError {
    /// The path segment the error is about.
    pub fn segment(&self) -> Option<&SmolStr> {
        match self {
            PropertyError::Unresolvable { segment, .. }
            | PropertyError::NullDereference { segment, .. }
            | PropertyError::NotWritable { segment, .. } => Some(segment),
            PropertyError::NoOverload { method, .. } => Some(method),
            PropertyError::Host { member, .. } => Some(member),
            PropertyError::IndexOutOfBounds { .. } | PropertyError::InvalidIndex { .. } => None,
        }
    }
}
