//! Id-keyed one-shot and repeating timers on a single logical thread.
//!
//! The scheduler owns no thread and no clock. The event loop asks for the
//! [`next_deadline`](TimerScheduler::next_deadline), sleeps until then, and
//! drains due timers with [`pop_due`](TimerScheduler::pop_due), dispatching
//! each fired id itself. Callbacks therefore never overlap each other or the
//! request path.
//!
//! At most one timer is live per id: scheduling an id that is already live
//! replaces it, and the old [`TimerHandle`] goes stale so cancelling it is a
//! no-op.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Shortest period a repeating timer may have.
const MIN_REPEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Whether a timer fires once or keeps firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    OneShot,
    Repeating,
}

/// Typed handle to one scheduling of an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle<K> {
    id: K,
    generation: u64,
}

impl<K: Copy> TimerHandle<K> {
    /// Id this handle was scheduled under.
    pub fn id(&self) -> K {
        self.id
    }
}

#[derive(Debug, Clone)]
struct Entry {
    generation: u64,
    kind: TimerKind,
    interval: Duration,
    deadline: Instant,
}

/// Cancelable timer table keyed by `K`.
#[derive(Debug)]
pub struct TimerScheduler<K> {
    timers: HashMap<K, Entry>,
    next_generation: u64,
}

impl<K: Copy + Eq + Hash> TimerScheduler<K> {
    pub fn new() -> Self {
        Self {
            timers: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Schedule `id` to fire `interval` after `now`, replacing any live timer
    /// with the same id.
    pub fn schedule(
        &mut self,
        id: K,
        interval: Duration,
        kind: TimerKind,
        now: Instant,
    ) -> TimerHandle<K> {
        let interval = match kind {
            TimerKind::Repeating => interval.max(MIN_REPEAT_INTERVAL),
            TimerKind::OneShot => interval,
        };
        let generation = self.next_generation;
        self.next_generation += 1;
        self.timers.insert(
            id,
            Entry {
                generation,
                kind,
                interval,
                deadline: now + interval,
            },
        );
        TimerHandle { id, generation }
    }

    /// Cancel the scheduling behind `handle`.
    ///
    /// Returns `false` if the timer already fired (one-shot), was cancelled,
    /// or was replaced by a newer scheduling of the same id.
    pub fn cancel(&mut self, handle: TimerHandle<K>) -> bool {
        match self.timers.get(&handle.id) {
            Some(entry) if entry.generation == handle.generation => {
                self.timers.remove(&handle.id);
                true
            }
            _ => false,
        }
    }

    /// Whether the scheduling behind `handle` is still live.
    pub fn is_live(&self, handle: TimerHandle<K>) -> bool {
        self.timers
            .get(&handle.id)
            .is_some_and(|entry| entry.generation == handle.generation)
    }

    /// Whether any timer is live under `id`.
    pub fn is_scheduled(&self, id: K) -> bool {
        self.timers.contains_key(&id)
    }

    /// Earliest pending deadline, if any timer is live.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|entry| entry.deadline).min()
    }

    /// Pop the earliest timer due at `now`.
    ///
    /// One-shot timers are removed; repeating timers are re-armed one
    /// interval later, skipping periods that were missed entirely. Ties are
    /// broken by scheduling order.
    pub fn pop_due(&mut self, now: Instant) -> Option<K> {
        let (&id, _) = self
            .timers
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .min_by_key(|(_, entry)| (entry.deadline, entry.generation))?;

        let entry = self.timers.get_mut(&id)?;
        match entry.kind {
            TimerKind::OneShot => {
                self.timers.remove(&id);
            }
            TimerKind::Repeating => {
                let mut next = entry.deadline + entry.interval;
                if next <= now {
                    next = now + entry.interval;
                }
                entry.deadline = next;
            }
        }
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl<K: Copy + Eq + Hash> Default for TimerScheduler<K> {
    fn default() -> Self {
        Self::new()
    }
}
