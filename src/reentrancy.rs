//! Debug-only reentrancy check.
//!
//! The map runs caller-supplied code (digest providers, lifecycle hooks)
//! while its chains may be mid-walk. A hook that finds its way back into
//! the same map through a smuggled pointer would observe or corrupt that
//! transient state. In debug builds, entering a checked section twice
//! panics; in release builds this compiles to a no-op.

use core::cell::Cell;
use core::marker::PhantomData;

/// Per-map occupancy flag. Guard an operation with
/// `let _g = self.reentry.enter();` and hold the guard for its duration,
/// including any hook invocation.
#[derive(Debug)]
pub struct ReentryCheck {
    #[cfg(debug_assertions)]
    entered: Cell<bool>,
    // !Send + !Sync, matching the single-threaded map.
    _nosend: PhantomData<*mut ()>,
}

impl ReentryCheck {
    pub const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            entered: Cell::new(false),
            _nosend: PhantomData,
        }
    }

    /// Mark the map as busy. In debug builds, panics if it already is.
    #[inline]
    pub fn enter(&self) -> ReentryGuard<'_> {
        #[cfg(debug_assertions)]
        {
            assert!(
                !self.entered.replace(true),
                "map re-entered while an operation is in progress (hook called back into its own map?)"
            );
            return ReentryGuard { owner: self };
        }

        #[cfg(not(debug_assertions))]
        {
            return ReentryGuard { _lt: PhantomData };
        }
    }
}

impl Default for ReentryCheck {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by [`ReentryCheck::enter`].
pub struct ReentryGuard<'a> {
    #[cfg(debug_assertions)]
    owner: &'a ReentryCheck,
    #[cfg(not(debug_assertions))]
    _lt: PhantomData<&'a ()>,
}

impl<'a> Drop for ReentryGuard<'a> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.owner.entered.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::ReentryCheck;

    #[test]
    fn sequential_entries_are_fine() {
        let c = ReentryCheck::new();
        drop(c.enter());
        drop(c.enter());
    }

    #[cfg(debug_assertions)]
    #[test]
    fn nested_entry_panics_in_debug() {
        let c = ReentryCheck::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _g1 = c.enter();
            let _g2 = c.enter();
        }));
        assert!(res.is_err(), "expected nested enter to panic in debug builds");
    }

    /// Models hook dispatch: the map holds its guard across a
    /// caller-supplied callback, so a callback that re-enters trips the
    /// check before it can observe a mid-walk chain.
    #[cfg(debug_assertions)]
    #[test]
    fn callback_under_guard_cannot_reenter() {
        let c = ReentryCheck::new();
        let mut hook = |check: &ReentryCheck| {
            let _g = check.enter();
        };
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _g = c.enter();
            hook(&c);
        }));
        assert!(res.is_err(), "expected callback reentry to panic in debug builds");
    }

    #[cfg(debug_assertions)]
    #[test]
    fn flag_clears_after_unwind() {
        let c = ReentryCheck::new();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _g1 = c.enter();
            let _g2 = c.enter();
        }));
        // The guards dropped during unwind; entering again must succeed.
        drop(c.enter());
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn nested_entry_is_noop_in_release() {
        let c = ReentryCheck::new();
        let _g1 = c.enter();
        let _g2 = c.enter();
    }
}
