use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use super::backend::DirectAccessor;
use super::state::OptimizerState;
use crate::{
    accessor::chain::{AccessFailure, AccessorChain},
    ast::PropertyPath,
    eval::EvalContext,
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Generic,
    Specializing,
    Specialized,
}

impl Tier {
    fn from_u8(tier: u8) -> Tier {
        match tier {
            1 => Tier::Specializing,
            2 => Tier::Specialized,
            _ => Tier::Generic,
        }
    }
}

struct Specialized {
    epoch: u64,
    accessor: Arc<dyn DirectAccessor>,
}

/// An accessor chain together with its promotion state.
pub struct TieredAccessor {
    chain: AccessorChain,
    state: Arc<OptimizerState>,
    invocations: AtomicU32,
    window_start: AtomicU64,
    tier: AtomicU8,
    specialized: RwLock<Option<Specialized>>,
}

impl TieredAccessor {
    pub(crate) fn new(chain: AccessorChain, state: Arc<OptimizerState>) -> Self {
        let now = state.elapsed_nanos();
        Self {
            chain,
            state,
            invocations: AtomicU32::new(0),
            window_start: AtomicU64::new(now),
            tier: AtomicU8::new(Tier::Generic as u8),
            specialized: RwLock::new(None),
        }
    }

    pub(crate) fn chain(&self) -> &AccessorChain {
        &self.chain
    }

    /// Current tier; a chain recycled by the ceiling reads as generic.
    pub fn tier(&self) -> Tier {
        match Tier::from_u8(self.tier.load(Ordering::Acquire)) {
            Tier::Specialized if !self.is_current() => Tier::Generic,
            tier => tier,
        }
    }

    fn is_current(&self) -> bool {
        self.specialized
            .read()
            .as_ref()
            .is_some_and(|specialized| specialized.epoch == self.state.epoch())
    }

    fn specialized(&self) -> Option<Arc<dyn DirectAccessor>> {
        if self.tier.load(Ordering::Acquire) != Tier::Specialized as u8 {
            return None;
        }
        let stale = {
            let slot = self.specialized.read();
            let specialized = slot.as_ref()?;
            if specialized.epoch == self.state.epoch() {
                return Some(Arc::clone(&specialized.accessor));
            }
            specialized.epoch
        };
        self.demote(stale);
        None
    }

    /// Drops the specialization promoted in `epoch`. A slot refilled by a
    /// newer promotion in the meantime is left alone.
    fn demote(&self, epoch: u64) {
        let mut slot = self.specialized.write();
        if slot.as_ref().is_none_or(|specialized| specialized.epoch != epoch) {
            return;
        }
        if let Some(specialized) = slot.take() {
            self.state.release(specialized.epoch);
        }
        self.reset();
    }

    fn reset(&self) {
        self.invocations.store(0, Ordering::Release);
        self.window_start.store(self.state.elapsed_nanos(), Ordering::Release);
        self.tier.store(Tier::Generic as u8, Ordering::Release);
    }

    /// Counts a generic invocation and promotes once the chain is hot.
    fn record(&self) {
        let config = self.state.config();
        let now = self.state.elapsed_nanos();
        let start = self.window_start.load(Ordering::Acquire);
        let window = u64::try_from(config.tenure_window.as_nanos()).unwrap_or(u64::MAX);

        if now.saturating_sub(start) > window {
            self.window_start.store(now, Ordering::Release);
            self.invocations.store(1, Ordering::Release);
            return;
        }

        let count = self.invocations.fetch_add(1, Ordering::AcqRel) + 1;
        if count > config.tenure_threshold
            && self
                .tier
                .compare_exchange(
                    Tier::Generic as u8,
                    Tier::Specializing as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
        {
            self.promote();
        }
    }

    fn promote(&self) {
        match self.state.promote(&self.chain) {
            Some((epoch, accessor)) => {
                *self.specialized.write() = Some(Specialized { epoch, accessor });
                self.tier.store(Tier::Specialized as u8, Ordering::Release);
                debug!(epoch, nodes = self.chain.len(), "Promoted accessor chain");
            }
            None => self.reset(),
        }
    }

    pub(crate) fn get(&self, ctx: &EvalContext<'_>, path: &PropertyPath) -> Result<Value, AccessFailure> {
        if let Some(accessor) = self.specialized() {
            return accessor.get(ctx, path);
        }
        self.record();
        self.chain.get(ctx, path)
    }

    pub(crate) fn set(&self, ctx: &EvalContext<'_>, path: &PropertyPath, value: Value) -> Result<(), AccessFailure> {
        if let Some(accessor) = self.specialized() {
            return accessor.set(ctx, path, value);
        }
        self.record();
        self.chain.set(ctx, path, value)
    }
}

impl Drop for TieredAccessor {
    fn drop(&mut self) {
        if let Some(specialized) = self.specialized.get_mut().take() {
            self.state.release(specialized.epoch);
        }
    }
}

impl fmt::Debug for TieredAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TieredAccessor")
            .field("tier", &self.tier())
            .field("chain", &self.chain)
            .field("invocations", &self.invocations.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::optimizer::OptimizerConfig;

    fn accessor(tenure_window: Duration) -> TieredAccessor {
        let state = Arc::new(OptimizerState::new(OptimizerConfig {
            tenure_threshold: 2,
            tenure_window,
            ..Default::default()
        }));
        let chain = AccessorChain {
            nodes: Vec::new(),
            target: None,
        };
        TieredAccessor::new(chain, state)
    }

    #[test]
    fn test_calls_within_window_promote() {
        let accessor = accessor(Duration::from_secs(60));
        for _ in 0..3 {
            accessor.record();
        }
        assert_eq!(accessor.tier(), Tier::Specialized);
        assert_eq!(accessor.state.outstanding(), 1);
    }

    #[test]
    fn test_calls_spread_across_windows_stay_generic() {
        let accessor = accessor(Duration::from_millis(1));
        for _ in 0..6 {
            std::thread::sleep(Duration::from_millis(5));
            accessor.record();
        }
        assert_eq!(accessor.tier(), Tier::Generic);
        assert_eq!(accessor.invocations.load(Ordering::Acquire), 1);
        assert_eq!(accessor.state.outstanding(), 0);
    }

    #[test]
    fn test_late_demotion_keeps_newer_specialization() {
        let accessor = accessor(Duration::from_secs(60));
        for _ in 0..3 {
            accessor.record();
        }
        accessor.state.demote_all();
        assert!(accessor.specialized().is_none());
        assert_eq!(accessor.tier(), Tier::Generic);

        for _ in 0..3 {
            accessor.record();
        }
        assert_eq!(accessor.state.outstanding(), 1);

        // a caller that saw the epoch 0 slot before the re-promotion
        accessor.demote(0);
        assert_eq!(accessor.tier(), Tier::Specialized);
        assert_eq!(accessor.state.outstanding(), 1);

        accessor.demote(accessor.state.epoch());
        assert_eq!(accessor.tier(), Tier::Generic);
        assert_eq!(accessor.state.outstanding(), 0);
    }
}
