//! hook-hashmap: a single-threaded chained hash map from string keys to
//! owned values, with per-entry access/release lifecycle hooks that let a
//! caller layer reference counting, cache eviction, or instrumentation on
//! top of plain storage semantics.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: keep the table engine free of any lifecycle policy; each piece
//!   is a small layer that can be reasoned about independently.
//! - Layers:
//!   - ChainMap<V, D>: structural layer. Entries live in a slotmap arena
//!     and are addressed by generational `EntryId`s; buckets are chain
//!     heads selected by `digest & mask`, chains are doubly linked through
//!     arena ids. Includes a debug-only reentrancy check.
//!   - HookMap<V, D>: public API. Stores each value next to its optional
//!     `on_access`/`on_release` hooks and implements the hook protocol
//!     (get / release / remove / overwrite / teardown call points).
//!
//! Constraints
//! - Single-threaded: no atomics, no locking; guards are `!Send`/`!Sync`.
//! - One live entry per key; bucket placement is `(digest as u64) & mask`
//!   and only changes through an explicit grow/shrink relink.
//! - Each entry stores its 128-bit digest at insertion; the digest
//!   provider is never invoked again for that entry, so grow/shrink never
//!   run user code and never fire hooks.
//! - Hooks run synchronously inside the triggering operation and must not
//!   re-enter the map; debug builds panic on reentry, release builds are
//!   unchecked.
//! - Allocation failure is not modeled: the global allocator aborts, so
//!   the insert and resize paths are infallible.
//!
//! Why this split?
//! - Localize invariants: chain wiring bugs cannot hide behind hook
//!   semantics, and hook semantics are testable over a trusted structure.
//! - The structural layer never calls user code once a chain walk begins
//!   (the digest provider runs before the walk, hooks run above it).
//!
//! Notes and non-goals
//! - No iteration-order guarantees beyond determinism per mask: buckets in
//!   index order, each chain most-recent-first.
//! - No TTL/expiry, persistence, or concurrency; build those on top.
//! - Refcounting is deliberately *not* a map feature: the map's only
//!   obligation is to call the installed hooks at the documented points
//!   and act on the release verdict. See the tests for a refcount built
//!   from the hook contract alone.
//! - Public surface is `HookMap` and the digest seam; `chain_map` is an
//!   implementation detail kept public for scrutiny and benches.

pub mod chain_map;
mod chain_map_proptest;
pub mod digest;
mod hook_map;
mod reentrancy;

// Public surface
pub use chain_map::{MaskError, DEFAULT_MASK};
pub use digest::{DigestProvider, Xxh3Digest, Xxh3Seeded};
pub use hook_map::{AccessHook, HookMap, ReleaseHook, ReleaseResult, Verdict};
