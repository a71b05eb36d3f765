//! Bucketed deadline index
//!
//! Items are bucketed by an integer expiration time. The bucket for logical
//! time `t` is examined by the tick that closes `t`. Because expiration can
//! depend on mutable state (remaining processing time), each item's time is
//! recomputed when its bucket fires and the item is re-bucketed if it moved.
//!
//! The manager does not own the expiration function. Callers compute the
//! time on `add` and hand the function in on `tick`, so it can read an arena
//! the manager does not borrow. Returning `None` from the function means the item no longer
//! exists; it is then forgotten without being reported.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::model::Slot;

#[derive(Debug)]
pub struct ExpirationManager<T> {
    current_time: Slot,
    waiting: HashMap<Slot, Vec<T>>,
    expired: Vec<T>,
    /// Items either bucketed or waiting in `expired`
    tracked: HashSet<T>,
}

impl<T> Default for ExpirationManager<T> {
    fn default() -> Self {
        ExpirationManager {
            current_time: 0,
            waiting: HashMap::new(),
            expired: Vec::new(),
            tracked: HashSet::new(),
        }
    }
}

impl<T: Copy + Eq + Hash> ExpirationManager<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_time(&self) -> Slot {
        self.current_time
    }

    /// Number of items bucketed or awaiting a poll
    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.tracked.contains(item)
    }

    /// Register an item expiring at `expiration_time`.
    ///
    /// An item whose time already passed goes straight to the expired set.
    /// Adding an item that is still tracked is a no-op and returns `false`.
    pub fn add(&mut self, item: T, expiration_time: Slot) -> bool {
        if !self.tracked.insert(item) {
            return false;
        }
        self.place(item, expiration_time);
        true
    }

    /// Close the current logical time and advance it by one.
    pub fn tick<F>(&mut self, mut expiration_time: F)
    where
        F: FnMut(&T) -> Option<Slot>,
    {
        let closing = self.current_time;
        for item in self.waiting.remove(&closing).unwrap_or_default() {
            match expiration_time(&item) {
                None => {
                    self.tracked.remove(&item);
                }
                Some(time) if time == closing => self.expired.push(item),
                Some(time) => self.place(item, time),
            }
        }
        self.current_time += 1;
    }

    /// Drain everything that expired since the previous poll
    pub fn poll_expired(&mut self) -> Vec<T> {
        let expired = std::mem::take(&mut self.expired);
        for item in &expired {
            self.tracked.remove(item);
        }
        expired
    }

    fn place(&mut self, item: T, expiration_time: Slot) {
        if expiration_time < self.current_time {
            self.expired.push(item);
        } else {
            self.waiting.entry(expiration_time).or_default().push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_item_expires_when_its_time_closes() {
        let mut manager = ExpirationManager::new();
        manager.add(1u64, 2);

        for _ in 0..2 {
            manager.tick(|_| Some(2));
            assert!(manager.poll_expired().is_empty());
        }

        manager.tick(|_| Some(2));
        assert_eq!(manager.poll_expired(), vec![1]);
        assert!(manager.poll_expired().is_empty());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_past_item_is_expired_on_next_poll() {
        let mut manager = ExpirationManager::<u64>::new();
        manager.tick(|_| None);
        manager.tick(|_| None);

        manager.add(7u64, 1);
        assert_eq!(manager.poll_expired(), vec![7]);
    }

    #[test]
    fn test_item_at_current_time_waits_for_tick() {
        let mut manager = ExpirationManager::new();
        manager.add(7u64, 0);
        assert!(manager.poll_expired().is_empty());

        manager.tick(|_| Some(0));
        assert_eq!(manager.poll_expired(), vec![7]);
    }

    #[test]
    fn test_moved_item_is_rebucketed() {
        let mut times: HashMap<u64, Slot> = HashMap::new();
        times.insert(1, 1);
        let mut manager = ExpirationManager::new();
        manager.add(1u64, 1);

        manager.tick(|id| times.get(id).copied());
        // Processing pushed the expiration out
        times.insert(1, 3);
        manager.tick(|id| times.get(id).copied());
        assert!(manager.poll_expired().is_empty());
        assert!(manager.contains(&1));

        manager.tick(|id| times.get(id).copied());
        assert!(manager.poll_expired().is_empty());
        manager.tick(|id| times.get(id).copied());
        assert_eq!(manager.poll_expired(), vec![1]);
    }

    #[test]
    fn test_vanished_item_is_forgotten() {
        let mut manager = ExpirationManager::new();
        manager.add(1u64, 0);
        manager.add(2u64, 0);

        manager.tick(|id| if *id == 1 { None } else { Some(0) });
        assert_eq!(manager.poll_expired(), vec![2]);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_duplicate_registration_is_ignored() {
        let mut manager = ExpirationManager::new();
        assert!(manager.add(1u64, 1));
        assert!(!manager.add(1u64, 1));
        assert!(!manager.add(1u64, 5));
        assert_eq!(manager.len(), 1);

        manager.tick(|_| Some(1));
        manager.tick(|_| Some(1));
        assert_eq!(manager.poll_expired(), vec![1]);

        // Once reported it may be registered again
        assert!(manager.add(1u64, 0));
        assert_eq!(manager.poll_expired(), vec![1]);
    }

    #[test]
    fn test_every_item_reported_exactly_once() {
        let mut manager = ExpirationManager::new();
        for item in 0u64..50 {
            manager.add(item, (item % 10) as Slot);
        }

        let mut reported = Vec::new();
        for time in 0..12 {
            manager.tick(|item| Some((item % 10) as Slot));
            let batch = manager.poll_expired();
            for item in &batch {
                assert_eq!((item % 10) as Slot, time);
            }
            reported.extend(batch);
        }

        reported.sort_unstable();
        assert_eq!(reported, (0..50).collect::<Vec<_>>());
    }
}
