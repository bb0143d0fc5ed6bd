use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::backend::{ClosureBackend, DirectAccessor, SpecializationBackend};
use crate::accessor::chain::AccessorChain;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerConfig {
    /// Invocations within one window that trigger promotion.
    pub tenure_threshold: u32,
    pub tenure_window: Duration,
    /// Outstanding specializations allowed before all are recycled.
    pub max_specializations: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            tenure_threshold: 50,
            tenure_window: Duration::from_millis(100),
            max_specializations: 1500,
        }
    }
}

/// Promotion bookkeeping shared by every accessor of one engine.
///
/// Specialized accessors remember the epoch they were promoted in. Bumping
/// the epoch demotes all of them; each notices on its next call.
pub struct OptimizerState {
    config: OptimizerConfig,
    backend: Arc<dyn SpecializationBackend>,
    epoch: AtomicU64,
    outstanding: AtomicUsize,
    promotion: Mutex<()>,
    started: Instant,
}

impl OptimizerState {
    pub fn new(config: OptimizerConfig) -> Self {
        Self::with_backend(config, Arc::new(ClosureBackend))
    }

    pub(crate) fn with_backend(config: OptimizerConfig, backend: Arc<dyn SpecializationBackend>) -> Self {
        Self {
            config,
            backend,
            epoch: AtomicU64::new(0),
            outstanding: AtomicUsize::new(0),
            promotion: Mutex::new(()),
            started: Instant::now(),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Specialized chains promoted in the current epoch and still alive.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Demotes every specialized chain.
    pub fn demote_all(&self) {
        let _guard = self.promotion.lock();
        self.recycle();
        debug!(epoch = self.epoch(), "Demoted all specialized accessors");
    }

    pub(crate) fn elapsed_nanos(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    pub(crate) fn promote(&self, chain: &AccessorChain) -> Option<(u64, Arc<dyn DirectAccessor>)> {
        let _guard = self.promotion.lock();
        if self.outstanding() >= self.config.max_specializations {
            warn!(
                ceiling = self.config.max_specializations,
                "Specialization ceiling reached, recycling all specialized accessors"
            );
            self.recycle();
        }

        let accessor = self.backend.specialize(chain)?;
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        Some((self.epoch(), accessor))
    }

    /// Forgets a specialization that is going away.
    pub(crate) fn release(&self, epoch: u64) {
        let _guard = self.promotion.lock();
        if epoch == self.epoch() {
            let outstanding = self.outstanding();
            self.outstanding.store(outstanding.saturating_sub(1), Ordering::Release);
        }
    }

    fn recycle(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.outstanding.store(0, Ordering::Release);
    }
}

impl Default for OptimizerState {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

impl fmt::Debug for OptimizerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimizerState")
            .field("config", &self.config)
            .field("epoch", &self.epoch())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> AccessorChain {
        AccessorChain {
            nodes: Vec::new(),
            target: None,
        }
    }

    #[test]
    fn test_ceiling_recycles_epoch() {
        let state = OptimizerState::new(OptimizerConfig {
            max_specializations: 2,
            ..Default::default()
        });
        let (first, _) = state.promote(&chain()).unwrap();
        state.promote(&chain()).unwrap();
        assert_eq!(state.outstanding(), 2);

        let (third, _) = state.promote(&chain()).unwrap();
        assert_eq!(third, first + 1);
        assert_eq!(state.outstanding(), 1);
    }

    struct Declining;

    impl SpecializationBackend for Declining {
        fn specialize(&self, _: &AccessorChain) -> Option<Arc<dyn DirectAccessor>> {
            None
        }
    }

    #[test]
    fn test_declined_promotion_is_not_counted() {
        let state = OptimizerState::with_backend(OptimizerConfig::default(), Arc::new(Declining));
        assert!(state.promote(&chain()).is_none());
        assert_eq!(state.outstanding(), 0);
        assert_eq!(state.epoch(), 0);
    }

    #[test]
    fn test_release_ignores_stale_epoch() {
        let state = OptimizerState::default();
        let (epoch, _) = state.promote(&chain()).unwrap();
        state.demote_all();
        state.promote(&chain()).unwrap();
        state.release(epoch);
        assert_eq!(state.outstanding(), 1);
    }
}
