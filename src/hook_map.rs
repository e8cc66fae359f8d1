//! HookMap: the public map with per-entry access/release lifecycle hooks.
//!
//! The structural work happens in [`ChainMap`]; this layer stores each
//! value alongside its optional hooks and implements the hook protocol:
//! reads may be intercepted (`get`), logical drops may veto destruction
//! (`release`), hard deletes notify and destroy (`remove`). The map never
//! interprets values itself; refcounting, cache eviction and similar
//! policies are things callers assemble from these two callbacks.

use crate::chain_map::{ChainMap, EntryId, MaskError, DEFAULT_MASK};
use crate::digest::{DigestProvider, Xxh3Digest};
use crate::reentrancy::ReentryCheck;
use core::ops::ControlFlow;

/// Hook invoked inside [`HookMap::get`] before the value is returned. May
/// mutate or replace the stored value in place (e.g. bump a reference
/// count held within it).
pub type AccessHook<V> = Box<dyn FnMut(&str, &mut V)>;

/// Hook invoked on logical drop ([`HookMap::release`]), hard delete
/// ([`HookMap::remove`]), overwrite ([`HookMap::set`] on an existing key)
/// and map teardown. Its [`Verdict`] is only honored by `release`; the
/// other three call it as a notification and destroy regardless.
pub type ReleaseHook<V> = Box<dyn FnMut(&str, &mut V) -> Verdict>;

/// A release hook's decision: keep the entry alive or destroy it now.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Verdict {
    Keep,
    Destroy,
}

/// Outcome of [`HookMap::release`].
#[derive(Debug)]
pub enum ReleaseResult<'a, V> {
    /// No entry for the key.
    Absent,
    /// The entry survives (no release hook, or the hook said [`Verdict::Keep`]);
    /// borrows its current value.
    Live(&'a V),
    /// The hook said [`Verdict::Destroy`]; the entry was unlinked and its
    /// value is handed back.
    Removed(V),
}

struct Slot<V> {
    value: V,
    on_access: Option<AccessHook<V>>,
    on_release: Option<ReleaseHook<V>>,
}

pub struct HookMap<V, D = Xxh3Digest> {
    table: ChainMap<Slot<V>, D>,
    reentry: ReentryCheck,
}

impl<V> HookMap<V> {
    /// Map with [`DEFAULT_MASK`] (16 buckets) and the default digest
    /// provider.
    pub fn new() -> Self {
        Self::with_mask(DEFAULT_MASK).expect("DEFAULT_MASK is a valid mask")
    }
}

impl<V> Default for HookMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, D> HookMap<V, D>
where
    D: DigestProvider,
{
    pub fn with_mask(mask: u64) -> Result<Self, MaskError>
    where
        D: Default,
    {
        Self::with_mask_and_provider(mask, D::default())
    }

    pub fn with_mask_and_provider(mask: u64, provider: D) -> Result<Self, MaskError> {
        Ok(Self {
            table: ChainMap::with_mask_and_provider(mask, provider)?,
            reentry: ReentryCheck::new(),
        })
    }

    /// Store `value` under `key` with no hooks installed. Plain storage:
    /// sugar for [`HookMap::set_with_hooks`] with both hooks absent.
    pub fn set(&mut self, key: &str, value: V) {
        self.set_with_hooks(key, value, None, None)
    }

    /// Store `value` under `key` along with its hooks. If the key is
    /// already present this is the explicit release point for the old
    /// value: its release hook (if any) runs exactly once over it, as a
    /// notification, before value and both hooks are replaced and the old
    /// value is dropped.
    pub fn set_with_hooks(
        &mut self,
        key: &str,
        value: V,
        on_access: Option<AccessHook<V>>,
        on_release: Option<ReleaseHook<V>>,
    ) {
        let _g = self.reentry.enter();
        let slot = Slot {
            value,
            on_access,
            on_release,
        };
        match self.table.find(key) {
            Some(id) => {
                let old = self
                    .table
                    .value_mut(id)
                    .expect("entry just found must be live");
                if let Some(hook) = old.on_release.as_mut() {
                    let _ = hook(key, &mut old.value);
                }
                *old = slot;
            }
            None => {
                let _ = self
                    .table
                    .insert(key, slot)
                    .expect("key was just absent, insert cannot collide");
            }
        }
    }

    /// Look up `key`, firing its access hook first if one is installed.
    /// Returns the stored value as the hook left it. Absent key: `None`,
    /// and no hook runs.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let _g = self.reentry.enter();
        let id = self.table.find(key)?;
        let slot = self
            .table
            .value_mut(id)
            .expect("entry just found must be live");
        if let Some(hook) = slot.on_access.as_mut() {
            hook(key, &mut slot.value);
        }
        self.table.value(id).map(|s| &s.value)
    }

    /// Hook-free read of the stored value.
    pub fn peek(&self, key: &str) -> Option<&V> {
        let _g = self.reentry.enter();
        let id = self.table.find(key)?;
        self.table.value(id).map(|s| &s.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let _g = self.reentry.enter();
        self.table.contains_key(key)
    }

    /// Logical drop. With no release hook installed this is
    /// non-destructive and returns the current value. With one installed,
    /// the hook decides: [`Verdict::Keep`] leaves the entry untouched
    /// (refcount still positive), [`Verdict::Destroy`] unlinks it and
    /// hands the value back (the count-reached-zero path).
    pub fn release(&mut self, key: &str) -> ReleaseResult<'_, V> {
        let _g = self.reentry.enter();
        let Some(id) = self.table.find(key) else {
            return ReleaseResult::Absent;
        };
        let slot = self
            .table
            .value_mut(id)
            .expect("entry just found must be live");
        let verdict = match slot.on_release.as_mut() {
            None => Verdict::Keep,
            Some(hook) => hook(key, &mut slot.value),
        };
        match verdict {
            Verdict::Keep => {
                let slot = self.table.value(id).expect("kept entry must remain live");
                ReleaseResult::Live(&slot.value)
            }
            Verdict::Destroy => {
                let (_key, slot) = self
                    .table
                    .remove(id)
                    .expect("entry just found must be removable");
                ReleaseResult::Removed(slot.value)
            }
        }
    }

    /// Hard delete, irrespective of outstanding references. The release
    /// hook, if installed, runs once for final cleanup; its verdict is
    /// ignored and the entry is destroyed either way. Returns the removed
    /// value, or `None` if the key was absent.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let _g = self.reentry.enter();
        let id = self.table.find(key)?;
        let slot = self
            .table
            .value_mut(id)
            .expect("entry just found must be live");
        if let Some(hook) = slot.on_release.as_mut() {
            let _ = hook(key, &mut slot.value);
        }
        let (_key, slot) = self
            .table
            .remove(id)
            .expect("entry just found must be removable");
        Some(slot.value)
    }

    /// Install (or replace) the access hook on an existing entry. Returns
    /// `false` if the key is absent.
    pub fn on_access(&mut self, key: &str, hook: AccessHook<V>) -> bool {
        let _g = self.reentry.enter();
        let Some(id) = self.table.find(key) else {
            return false;
        };
        let slot = self
            .table
            .value_mut(id)
            .expect("entry just found must be live");
        slot.on_access = Some(hook);
        true
    }

    /// Install (or replace) the release hook on an existing entry. Returns
    /// `false` if the key is absent.
    pub fn on_release(&mut self, key: &str, hook: ReleaseHook<V>) -> bool {
        let _g = self.reentry.enter();
        let Some(id) = self.table.find(key) else {
            return false;
        };
        let slot = self
            .table
            .value_mut(id)
            .expect("entry just found must be live");
        slot.on_release = Some(hook);
        true
    }
}

// Structural operations: no digest provider, no user hooks involved.
impl<V, D> HookMap<V, D> {
    pub fn len(&self) -> usize {
        self.table.len()
    }
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
    pub fn mask(&self) -> u64 {
        self.table.mask()
    }
    pub fn bucket_count(&self) -> usize {
        self.table.bucket_count()
    }

    /// Double the bucket count. Entries are relinked from their stored
    /// digests; no hook fires and values are untouched. Iteration order
    /// changes.
    pub fn grow(&mut self) {
        let _g = self.reentry.enter();
        self.table.grow();
    }

    /// Halve the bucket count (floored at one bucket). Same contract as
    /// [`HookMap::grow`]: a structural move, not a value access.
    pub fn shrink(&mut self) {
        let _g = self.reentry.enter();
        self.table.shrink();
    }

    /// Iterate `(key, value)` over every live entry, buckets in index
    /// order, each chain head to tail. Deterministic for a fixed mask and
    /// insertion history; not insertion order, and reshuffled by
    /// grow/shrink. Never fires hooks.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.table.iter().map(|(_, k, slot)| (k, &slot.value))
    }

    /// Run `f` over every live entry in [`HookMap::iter`] order.
    /// `ControlFlow::Break(())` halts the walk. The map is busy for the
    /// whole walk: `f` must not call back into it.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &V) -> ControlFlow<()>,
    {
        let _g = self.reentry.enter();
        for (_, key, slot) in self.table.iter() {
            if f(key, &slot.value).is_break() {
                break;
            }
        }
    }

    /// Remove every entry, running each release hook once as a teardown
    /// notification (verdict ignored). As in [`HookMap::remove`], the hook
    /// fires while the entry is still live, then the entry is destroyed.
    pub fn clear(&mut self) {
        let _g = self.reentry.enter();
        let ids: Vec<EntryId> = self.table.iter().map(|(id, _, _)| id).collect();
        for id in ids {
            let (key, slot) = self
                .table
                .key_value_mut(id)
                .expect("id collected from live entries must be live");
            if let Some(hook) = slot.on_release.as_mut() {
                let _ = hook(key, &mut slot.value);
            }
            self.table
                .remove(id)
                .expect("id collected from live entries must be removable");
        }
    }
}

impl<V, D> Drop for HookMap<V, D> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn set_get_round_trip() {
        let mut m: HookMap<i32> = HookMap::new();
        m.set("k", 7);
        assert_eq!(m.get("k"), Some(&7));
        assert_eq!(m.peek("k"), Some(&7));
        assert_eq!(m.get("absent"), None);
    }

    /// Invariant: overwriting a key releases the old value exactly once
    /// through the *old* release hook, then installs the new value and
    /// hooks; exactly one entry remains.
    #[test]
    fn overwrite_releases_old_value_once() {
        let released = Rc::new(Cell::new(0));
        let seen = Rc::new(Cell::new(0));
        let mut m: HookMap<i32> = HookMap::new();

        let r1 = {
            let released = released.clone();
            let seen = seen.clone();
            Box::new(move |_k: &str, v: &mut i32| {
                released.set(released.get() + 1);
                seen.set(*v);
                Verdict::Keep
            })
        };
        m.set_with_hooks("k", 1, None, Some(r1));

        m.set("k", 2);
        assert_eq!(released.get(), 1, "old release hook fires exactly once");
        assert_eq!(seen.get(), 1, "hook saw the old value");
        assert_eq!(m.len(), 1);
        assert_eq!(m.get("k"), Some(&2));

        // The replacement installed no hooks; a further overwrite is silent.
        m.set("k", 3);
        assert_eq!(released.get(), 1);
        assert_eq!(m.get("k"), Some(&3));
    }

    /// Invariant: the access hook fires on `get` and can transform the
    /// value in place; `peek` and iteration never fire it.
    #[test]
    fn access_hook_fires_on_get_only() {
        let mut m: HookMap<i32> = HookMap::new();
        m.set_with_hooks("k", 0, Some(Box::new(|_k, v| *v += 1)), None);

        assert_eq!(m.peek("k"), Some(&0));
        assert_eq!(m.get("k"), Some(&1));
        assert_eq!(m.get("k"), Some(&2));
        assert_eq!(m.peek("k"), Some(&2));
        let total: i32 = m.iter().map(|(_, v)| *v).sum();
        assert_eq!(total, 2);
    }

    /// Invariant: release with no hook installed is non-destructive and
    /// returns the current value.
    #[test]
    fn release_without_hook_is_non_destructive() {
        let mut m: HookMap<i32> = HookMap::new();
        m.set("k", 5);
        match m.release("k") {
            ReleaseResult::Live(v) => assert_eq!(*v, 5),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(m.contains_key("k"));
        assert!(matches!(m.release("absent"), ReleaseResult::Absent));
    }

    /// Invariant: a Keep verdict leaves the entry in place; a Destroy
    /// verdict unlinks it and hands the value back.
    #[test]
    fn release_honors_verdict() {
        let mut m: HookMap<i32> = HookMap::new();
        m.set_with_hooks(
            "keep",
            1,
            None,
            Some(Box::new(|_k, _v| Verdict::Keep)),
        );
        m.set_with_hooks(
            "gone",
            2,
            None,
            Some(Box::new(|_k, _v| Verdict::Destroy)),
        );

        assert!(matches!(m.release("keep"), ReleaseResult::Live(&1)));
        assert!(m.contains_key("keep"));

        match m.release("gone") {
            ReleaseResult::Removed(v) => assert_eq!(v, 2),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!m.contains_key("gone"));
        assert!(matches!(m.release("gone"), ReleaseResult::Absent));
    }

    /// Invariant: `remove` destroys the entry even when the hook votes
    /// Keep, and also when no hook is installed at all.
    #[test]
    fn remove_ignores_verdict() {
        let notified = Rc::new(Cell::new(0));
        let mut m: HookMap<i32> = HookMap::new();
        let n = notified.clone();
        m.set_with_hooks(
            "k",
            9,
            None,
            Some(Box::new(move |_k, _v| {
                n.set(n.get() + 1);
                Verdict::Keep
            })),
        );
        assert_eq!(m.remove("k"), Some(9));
        assert_eq!(notified.get(), 1, "hook notified exactly once");
        assert_eq!(m.get("k"), None);

        m.set("plain", 1);
        assert_eq!(m.remove("plain"), Some(1));
        assert!(!m.contains_key("plain"));
        assert_eq!(m.remove("plain"), None);
    }

    /// Invariant: hooks can be installed and replaced after creation;
    /// installation on an absent key reports false.
    #[test]
    fn hook_installation_after_creation() {
        let mut m: HookMap<i32> = HookMap::new();
        m.set("k", 0);

        assert!(m.on_access("k", Box::new(|_k, v| *v += 10)));
        assert_eq!(m.get("k"), Some(&10));

        // Replacement takes effect; the old hook is gone.
        assert!(m.on_access("k", Box::new(|_k, v| *v += 1)));
        assert_eq!(m.get("k"), Some(&11));

        assert!(m.on_release("k", Box::new(|_k, _v| Verdict::Destroy)));
        assert!(matches!(m.release("k"), ReleaseResult::Removed(11)));

        assert!(!m.on_access("absent", Box::new(|_k, _v| {})));
        assert!(!m.on_release("absent", Box::new(|_k, _v| Verdict::Keep)));
    }

    /// Invariant: dropping the map (and `clear`) notifies each entry's
    /// release hook exactly once.
    #[test]
    fn drop_notifies_release_hooks() {
        let notified = Rc::new(Cell::new(0));
        {
            let mut m: HookMap<i32> = HookMap::new();
            for i in 0..4 {
                let n = notified.clone();
                m.set_with_hooks(
                    &format!("k{i}"),
                    i,
                    None,
                    Some(Box::new(move |_k, _v| {
                        n.set(n.get() + 1);
                        Verdict::Keep
                    })),
                );
            }
            m.set("plain", 99); // no hook, dropped silently
        }
        assert_eq!(notified.get(), 4);
    }

    #[test]
    fn clear_empties_and_notifies() {
        let notified = Rc::new(Cell::new(0));
        let mut m: HookMap<i32> = HookMap::new();
        let n = notified.clone();
        m.set_with_hooks(
            "k",
            1,
            None,
            Some(Box::new(move |_k, _v| {
                n.set(n.get() + 1);
                Verdict::Destroy
            })),
        );
        m.clear();
        assert!(m.is_empty());
        assert_eq!(notified.get(), 1);
        // Clearing an empty map is a no-op.
        m.clear();
        assert_eq!(notified.get(), 1);
    }

    /// Invariant: `clear` notifies each entry's release hook before the
    /// value is destroyed, the same ordering as [`HookMap::remove`].
    #[test]
    fn clear_notifies_before_destroying() {
        use std::cell::RefCell;

        struct Tracked {
            name: &'static str,
            log: Rc<RefCell<Vec<String>>>,
        }
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.log.borrow_mut().push(format!("destroy {}", self.name));
            }
        }

        let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let mut m: HookMap<Tracked> = HookMap::new();
        for name in ["a", "b", "c"] {
            let l = log.clone();
            m.set_with_hooks(
                name,
                Tracked {
                    name,
                    log: log.clone(),
                },
                None,
                Some(Box::new(move |k, _v| {
                    l.borrow_mut().push(format!("notify {k}"));
                    Verdict::Keep
                })),
            );
        }

        m.clear();
        assert!(m.is_empty());

        let log = log.borrow();
        for name in ["a", "b", "c"] {
            let n = log
                .iter()
                .position(|e| e == &format!("notify {name}"))
                .expect("hook must have fired");
            let d = log
                .iter()
                .position(|e| e == &format!("destroy {name}"))
                .expect("value must have dropped");
            assert!(n < d, "{name}: notification must precede destruction");
        }
    }

    /// Invariant: grow/shrink never fire hooks and preserve every entry's
    /// value and hook installation.
    #[test]
    fn resize_is_hook_silent() {
        let fired = Rc::new(Cell::new(0));
        let mut m: HookMap<i32> = HookMap::with_mask(0x01).unwrap();
        for i in 0..16 {
            let f = fired.clone();
            let g = fired.clone();
            m.set_with_hooks(
                &format!("k{i}"),
                i,
                Some(Box::new(move |_k, _v| f.set(f.get() + 1))),
                Some(Box::new(move |_k, _v| {
                    g.set(g.get() + 1);
                    Verdict::Keep
                })),
            );
        }

        m.grow();
        m.grow();
        m.shrink();
        assert_eq!(fired.get(), 0, "resize must not invoke hooks");
        assert_eq!(m.mask(), 0x01);

        for i in 0..16 {
            assert_eq!(m.peek(&format!("k{i}")), Some(&i));
        }
        // Hooks survived the relink: one access hook invocation per get.
        for i in 0..16 {
            m.get(&format!("k{i}"));
        }
        assert_eq!(fired.get(), 16);
    }

    /// Invariant: `for_each` visits every entry unless broken early.
    #[test]
    fn for_each_break_halts() {
        let mut m: HookMap<i32> = HookMap::new();
        for i in 0..8 {
            m.set(&format!("k{i}"), i);
        }

        let mut visited = 0;
        m.for_each(|_, _| {
            visited += 1;
            ControlFlow::Continue(())
        });
        assert_eq!(visited, 8);

        let mut stopped_after = 0;
        m.for_each(|_, _| {
            stopped_after += 1;
            if stopped_after == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(stopped_after, 3);
    }
}
