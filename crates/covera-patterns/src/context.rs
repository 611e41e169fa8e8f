//! Per-query state.

use crate::cache::{CancellationToken, ExhaustivenessCache};
use crate::config::ExhaustivenessConfig;
use crate::error::{CoverageError, CoverageResult};
use covera_types::TypeUniverse;
use std::cell::Cell;

/// Everything a query needs: the universe it runs against, the settings,
/// the shared cache and an optional cancellation flag.
///
/// A context is cheap to create and meant to live for one or a few queries on
/// a single thread. The cache it borrows may be shared across threads.
pub struct CoverageContext<'a> {
    pub universe: &'a TypeUniverse,
    pub config: &'a ExhaustivenessConfig,
    pub cache: &'a ExhaustivenessCache,
    cancel: Option<&'a CancellationToken>,
    depth: Cell<usize>,
}

impl<'a> CoverageContext<'a> {
    pub fn new(
        universe: &'a TypeUniverse,
        config: &'a ExhaustivenessConfig,
        cache: &'a ExhaustivenessCache,
    ) -> Self {
        cache.sync_with(universe);
        Self {
            universe,
            config,
            cache,
            cancel: None,
            depth: Cell::new(0),
        }
    }

    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub(crate) fn check_cancelled(&self) -> CoverageResult<()> {
        match self.cancel {
            Some(token) if token.is_cancelled() => Err(CoverageError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Enter one level of nested reduction.
    pub(crate) fn descend(&self) -> CoverageResult<DepthGuard<'_>> {
        let depth = self.depth.get() + 1;
        if depth > self.config.max_depth {
            return Err(CoverageError::DepthLimit(self.config.max_depth));
        }
        self.depth.set(depth);
        Ok(DepthGuard { depth: &self.depth })
    }
}

pub(crate) struct DepthGuard<'a> {
    depth: &'a Cell<usize>,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covera_types::UniverseBuilder;

    #[test]
    fn test_depth_guard_unwinds() {
        let universe = UniverseBuilder::new().build().unwrap();
        let config = ExhaustivenessConfig {
            max_depth: 2,
            ..Default::default()
        };
        let cache = ExhaustivenessCache::new();
        let ctx = CoverageContext::new(&universe, &config, &cache);

        {
            let _outer = ctx.descend().unwrap();
            let _inner = ctx.descend().unwrap();
            assert_eq!(ctx.descend().err(), Some(CoverageError::DepthLimit(2)));
        }
        assert!(ctx.descend().is_ok());
    }

    #[test]
    fn test_cancellation_is_reported() {
        let universe = UniverseBuilder::new().build().unwrap();
        let config = ExhaustivenessConfig::default();
        let cache = ExhaustivenessCache::new();
        let token = CancellationToken::new();
        let ctx = CoverageContext::new(&universe, &config, &cache).with_cancellation(&token);

        assert!(ctx.check_cancelled().is_ok());
        token.cancel();
        assert_eq!(ctx.check_cancelled(), Err(CoverageError::Cancelled));
    }
}
