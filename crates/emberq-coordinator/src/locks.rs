//! Rank-checked lock wrappers.
//!
//! The manager's locks form a strict global order: partition registry
//! (rank 1) → offset-expire lock (rank 2) → group monitor (rank 3). In debug
//! builds every acquisition is checked against a thread-local stack of held
//! ranks; acquiring a lock whose rank is not strictly greater than the
//! deepest held rank panics. Release builds compile down to the plain
//! `parking_lot` primitives.

use std::cell::RefCell;

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const RANK_PARTITION_REGISTRY: u8 = 1;
pub const RANK_OFFSET_EXPIRE: u8 = 2;
pub const RANK_GROUP_MONITOR: u8 = 3;

thread_local! {
    static HELD_RANKS: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
}

fn push_rank(rank: u8) {
    if cfg!(debug_assertions) {
        HELD_RANKS.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(&deepest) = held.last() {
                assert!(
                    rank > deepest,
                    "lock order violation: acquiring rank {rank} while holding rank {deepest}"
                );
            }
            held.push(rank);
        });
    }
}

fn pop_rank(rank: u8) {
    if cfg!(debug_assertions) {
        HELD_RANKS.with(|held| {
            let popped = held.borrow_mut().pop();
            debug_assert_eq!(popped, Some(rank));
        });
    }
}

pub struct RankedMutex<T> {
    rank: u8,
    inner: Mutex<T>,
}

impl<T> RankedMutex<T> {
    pub fn new(rank: u8, value: T) -> Self {
        Self {
            rank,
            inner: Mutex::new(value),
        }
    }

    pub fn lock(&self) -> RankedMutexGuard<'_, T> {
        push_rank(self.rank);
        RankedMutexGuard {
            rank: self.rank,
            guard: self.inner.lock(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for RankedMutex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankedMutex")
            .field("rank", &self.rank)
            .field("inner", &self.inner)
            .finish()
    }
}

pub struct RankedMutexGuard<'a, T> {
    rank: u8,
    guard: MutexGuard<'a, T>,
}

impl<T> std::ops::Deref for RankedMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> std::ops::DerefMut for RankedMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for RankedMutexGuard<'_, T> {
    fn drop(&mut self) {
        pop_rank(self.rank);
    }
}

pub struct RankedRwLock<T> {
    rank: u8,
    inner: RwLock<T>,
}

impl<T> RankedRwLock<T> {
    pub fn new(rank: u8, value: T) -> Self {
        Self {
            rank,
            inner: RwLock::new(value),
        }
    }

    pub fn read(&self) -> RankedReadGuard<'_, T> {
        push_rank(self.rank);
        RankedReadGuard {
            rank: self.rank,
            guard: self.inner.read(),
        }
    }

    pub fn write(&self) -> RankedWriteGuard<'_, T> {
        push_rank(self.rank);
        RankedWriteGuard {
            rank: self.rank,
            guard: self.inner.write(),
        }
    }
}

pub struct RankedReadGuard<'a, T> {
    rank: u8,
    guard: RwLockReadGuard<'a, T>,
}

impl<T> std::ops::Deref for RankedReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> Drop for RankedReadGuard<'_, T> {
    fn drop(&mut self) {
        pop_rank(self.rank);
    }
}

pub struct RankedWriteGuard<'a, T> {
    rank: u8,
    guard: RwLockWriteGuard<'a, T>,
}

impl<T> std::ops::Deref for RankedWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> std::ops::DerefMut for RankedWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for RankedWriteGuard<'_, T> {
    fn drop(&mut self) {
        pop_rank(self.rank);
    }
}
