// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Generational slot arena.
//!
//! Objects, contexts and bindings live in arenas and refer to each other
//! through copyable handles. Every slot carries a generation counter that is
//! bumped when the slot is freed, so a handle to a destroyed entry never
//! aliases whatever reuses the slot later.
//!
//! ```text
//! slots:  [gen 3: Some(A)] [gen 1: None] [gen 7: Some(C)]
//!                            ^ free list
//! handle {index: 0, generation: 3} -> A
//! handle {index: 1, generation: 0} -> stale, None
//! ```

use std::fmt;
use std::marker::PhantomData;

/// A raw reference to an arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaRef {
    index: u32,
    generation: u32,
}

impl ArenaRef {
    /// Returns the slot index of this reference.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Returns the generation this reference was issued for.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// A typed handle wrapping an [`ArenaRef`].
pub trait Handle: Copy + From<ArenaRef> + Into<ArenaRef> {}

/// Declares a typed arena handle.
macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name($crate::runtime::arena::ArenaRef);

        impl From<$crate::runtime::arena::ArenaRef> for $name {
            fn from(r: $crate::runtime::arena::ArenaRef) -> Self {
                $name(r)
            }
        }

        impl From<$name> for $crate::runtime::arena::ArenaRef {
            fn from(h: $name) -> Self {
                h.0
            }
        }

        impl $crate::runtime::arena::Handle for $name {}

        impl $name {
            /// Slot index, stable for the lifetime of the entry.
            pub fn index(&self) -> usize {
                self.0.index()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}:{}", $prefix, self.0.index(), self.0.generation())
            }
        }
    };
}

pub(crate) use define_handle;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A slot arena addressed by typed, generation-checked handles.
pub struct Arena<K: Handle, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    count: usize,
    _marker: PhantomData<K>,
}

impl<K: Handle, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Handle, T> fmt::Debug for Arena<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("count", &self.count)
            .field("capacity", &self.slots.len())
            .finish()
    }
}

impl<K: Handle, T> Arena<K, T> {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            count: 0,
            _marker: PhantomData,
        }
    }

    /// Stores a value, returning its handle.
    pub fn allocate(&mut self, value: T) -> K {
        self.count += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return K::from(ArenaRef {
                index,
                generation: slot.generation,
            });
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        K::from(ArenaRef {
            index,
            generation: 0,
        })
    }

    /// Gets a reference to the value behind `handle`.
    #[inline]
    pub fn get(&self, handle: K) -> Option<&T> {
        let r: ArenaRef = handle.into();
        self.slots
            .get(r.index())
            .filter(|slot| slot.generation == r.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Gets a mutable reference to the value behind `handle`.
    #[inline]
    pub fn get_mut(&mut self, handle: K) -> Option<&mut T> {
        let r: ArenaRef = handle.into();
        self.slots
            .get_mut(r.index())
            .filter(|slot| slot.generation == r.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Whether `handle` still refers to a live entry.
    #[inline]
    pub fn contains(&self, handle: K) -> bool {
        self.get(handle).is_some()
    }

    /// Removes the entry, invalidating every copy of `handle`.
    pub fn remove(&mut self, handle: K) -> Option<T> {
        let r: ArenaRef = handle.into();
        let slot = self.slots.get_mut(r.index())?;
        if slot.generation != r.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(r.index);
        self.count -= 1;
        Some(value)
    }

    /// Number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the arena holds no live entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Iterates over live entries.
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    K::from(ArenaRef {
                        index: index as u32,
                        generation: slot.generation,
                    }),
                    value,
                )
            })
        })
    }

    /// Handles of all live entries.
    pub fn handles(&self) -> Vec<K> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    /// Drops every entry. Outstanding handles become stale.
    pub fn reset(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    define_handle!(
        /// Test handle
        TestId,
        "t"
    );

    #[test]
    fn test_arena_allocate() {
        let mut arena: Arena<TestId, &str> = Arena::new();
        let a = arena.allocate("a");
        let b = arena.allocate("b");
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut arena: Arena<TestId, i32> = Arena::new();
        let a = arena.allocate(1);
        assert_eq!(arena.remove(a), Some(1));
        let b = arena.allocate(2);
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(b), Some(&2));
        assert_eq!(arena.remove(a), None);
    }

    #[test]
    fn test_reset_invalidates_everything() {
        let mut arena: Arena<TestId, i32> = Arena::new();
        let handles: Vec<_> = (0..4).map(|i| arena.allocate(i)).collect();
        arena.reset();
        assert!(arena.is_empty());
        assert!(handles.iter().all(|h| !arena.contains(*h)));
        let fresh = arena.allocate(9);
        assert_eq!(arena.iter().map(|(h, _)| h).collect::<Vec<_>>(), vec![fresh]);
    }

    #[test]
    fn test_handle_display() {
        let mut arena: Arena<TestId, ()> = Arena::new();
        let h = arena.allocate(());
        assert_eq!(h.to_string(), "t0:0");
    }
}
