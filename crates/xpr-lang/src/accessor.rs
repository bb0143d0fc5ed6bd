//! Property path access.
//!
//! A path such as `order.customer.?address[0].city` is resolved segment by
//! segment into an [`AccessorChain`](chain::AccessorChain) which is cached on
//! the node that owns the path and wrapped in a
//! [`TieredAccessor`](crate::optimizer::TieredAccessor) for promotion.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

pub(crate) mod chain;
pub mod error;
pub(crate) mod overload;
pub(crate) mod resolver;

use chain::AccessFailure;
use resolver::Resolver;

use crate::{
    ast::PropertyPath,
    eval::{EvalContext, error::EvalError},
    optimizer::{Tier, TieredAccessor},
    value::Value,
};

/// Lazily populated accessor slot of a property node.
///
/// Never serialized. Writes are idempotent: two threads resolving the same
/// path store equivalent chains and the last one wins.
#[derive(Default)]
pub struct AccessorCache(RwLock<Option<Arc<TieredAccessor>>>);

impl AccessorCache {
    pub(crate) fn load(&self) -> Option<Arc<TieredAccessor>> {
        self.0.read().clone()
    }

    pub(crate) fn store(&self, accessor: Arc<TieredAccessor>) {
        *self.0.write() = Some(accessor);
    }

    pub fn clear(&self) {
        *self.0.write() = None;
    }

    /// Tier of the cached chain, `None` before the first resolution.
    pub fn tier(&self) -> Option<Tier> {
        self.0.read().as_ref().map(|accessor| accessor.tier())
    }
}

impl Clone for AccessorCache {
    fn clone(&self) -> Self {
        AccessorCache(RwLock::new(self.load()))
    }
}

impl fmt::Debug for AccessorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessorCache").field(&self.tier()).finish()
    }
}

pub(crate) fn get(ctx: &EvalContext<'_>, path: &PropertyPath, cache: &AccessorCache) -> Result<Value, EvalError> {
    let resolver = Resolver::new(ctx, path);
    let Some(accessor) = cache.load() else {
        return resolver.get(cache, &[], resolver.start()?);
    };

    match accessor.get(ctx, path) {
        Ok(value) => Ok(value),
        Err(AccessFailure::Error(err)) => Err(err),
        Err(AccessFailure::Deopt(deopt)) => {
            trace!(path = %path, index = deopt.index, "Accessor chain deoptimized");
            resolver.get(cache, &accessor.chain().nodes, *deopt)
        }
    }
}

pub(crate) fn set(
    ctx: &EvalContext<'_>,
    path: &PropertyPath,
    cache: &AccessorCache,
    value: Value,
) -> Result<(), EvalError> {
    let resolver = Resolver::new(ctx, path);
    let Some(accessor) = cache.load().filter(|accessor| accessor.chain().target.is_some()) else {
        return resolver.set(cache, &[], resolver.start()?, value);
    };

    match accessor.set(ctx, path, value.clone()) {
        Ok(()) => Ok(()),
        Err(AccessFailure::Error(err)) => Err(err),
        Err(AccessFailure::Deopt(deopt)) => {
            trace!(path = %path, index = deopt.index, "Setter chain deoptimized");
            resolver.set(cache, &accessor.chain().nodes, *deopt, value)
        }
    }
}
