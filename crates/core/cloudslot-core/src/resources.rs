//! Machine lifecycle with a fixed provisioning delay
//!
//! A requested machine is *pending* for `vm_allocation_delay` slots and then
//! becomes *ready*. Each pending machine counts down on its own, so requests
//! issued in different slots become usable in different slots.

use std::collections::VecDeque;

use tracing::debug;

/// A machine that has been requested but is not usable yet
#[derive(Debug, Clone, Copy)]
struct PendingMachine {
    slots_until_ready: u32,
}

impl PendingMachine {
    fn is_ready(&self) -> bool {
        self.slots_until_ready == 0
    }

    fn tick(&mut self) {
        self.slots_until_ready = self.slots_until_ready.saturating_sub(1);
    }
}

/// Bounded pool of machines
#[derive(Debug)]
pub struct ResourceManager {
    max_machines: usize,
    allocation_delay: u32,
    ready: usize,
    /// Oldest request at the front
    pending: VecDeque<PendingMachine>,
}

impl ResourceManager {
    pub fn new(max_machines: usize, allocation_delay: u32) -> Self {
        ResourceManager {
            max_machines,
            allocation_delay,
            ready: 0,
            pending: VecDeque::new(),
        }
    }

    pub fn num_machines_ready(&self) -> usize {
        self.ready
    }

    pub fn num_machines_pending(&self) -> usize {
        self.pending.len()
    }

    /// Ready plus pending
    pub fn num_machines_total(&self) -> usize {
        self.ready + self.pending.len()
    }

    pub fn max_machines(&self) -> usize {
        self.max_machines
    }

    /// Move the pool toward `target` machines and return the signed change.
    ///
    /// A positive result is the number of newly requested machines.
    pub fn request_capacity(&mut self, target: usize) -> isize {
        let current = self.num_machines_total();
        let delta = target as isize - current as isize;
        if delta < 0 {
            self.deallocate(delta.unsigned_abs());
        } else if delta > 0 {
            self.allocate(delta as usize);
        }
        delta
    }

    /// Request `count` new machines
    ///
    /// # Panics
    /// If the pool would exceed `max_machines`.
    pub fn allocate(&mut self, count: usize) {
        assert!(
            self.num_machines_total() + count <= self.max_machines,
            "allocating {} machines exceeds the limit of {} ({} ready, {} pending)",
            count,
            self.max_machines,
            self.ready,
            self.pending.len()
        );

        self.pending.extend(std::iter::repeat_n(
            PendingMachine {
                slots_until_ready: self.allocation_delay,
            },
            count,
        ));
        debug!(count, pending = self.pending.len(), "Machines requested");
        self.promote_ready();
    }

    /// Release `count` machines, newest pending requests first
    ///
    /// # Panics
    /// If fewer than `count` machines exist.
    pub fn deallocate(&mut self, count: usize) {
        assert!(
            count <= self.num_machines_total(),
            "deallocating {} machines but only {} exist",
            count,
            self.num_machines_total()
        );

        let from_pending = count.min(self.pending.len());
        self.pending.truncate(self.pending.len() - from_pending);
        self.ready -= count - from_pending;
        debug!(count, from_pending, ready = self.ready, "Machines released");
    }

    /// Advance one slot
    pub fn tick(&mut self) {
        self.pending.iter_mut().for_each(PendingMachine::tick);
        self.promote_ready();
    }

    fn promote_ready(&mut self) {
        let before = self.pending.len();
        self.pending.retain(|machine| !machine.is_ready());
        self.ready += before - self.pending.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machines_become_ready_after_delay() {
        let mut manager = ResourceManager::new(5, 3);
        manager.allocate(2);

        assert_eq!(manager.num_machines_ready(), 0);
        assert_eq!(manager.num_machines_pending(), 2);

        manager.tick();
        manager.tick();
        assert_eq!(manager.num_machines_ready(), 0);

        manager.tick();
        assert_eq!(manager.num_machines_ready(), 2);
        assert_eq!(manager.num_machines_pending(), 0);
    }

    #[test]
    fn test_zero_delay_is_immediately_ready() {
        let mut manager = ResourceManager::new(2, 0);
        assert_eq!(manager.request_capacity(2), 2);
        assert_eq!(manager.num_machines_ready(), 2);
        assert_eq!(manager.num_machines_pending(), 0);
    }

    #[test]
    fn test_staggered_requests_ready_at_different_slots() {
        let mut manager = ResourceManager::new(10, 2);
        manager.request_capacity(1);
        manager.tick();
        manager.request_capacity(3);

        manager.tick();
        assert_eq!(manager.num_machines_ready(), 1);
        assert_eq!(manager.num_machines_pending(), 2);

        manager.tick();
        assert_eq!(manager.num_machines_ready(), 3);
        assert_eq!(manager.num_machines_pending(), 0);
    }

    #[test]
    fn test_request_capacity_returns_signed_delta() {
        let mut manager = ResourceManager::new(10, 0);
        assert_eq!(manager.request_capacity(4), 4);
        assert_eq!(manager.request_capacity(4), 0);
        assert_eq!(manager.request_capacity(1), -3);
        assert_eq!(manager.num_machines_ready(), 1);
    }

    #[test]
    fn test_deallocate_prefers_newest_pending() {
        let mut manager = ResourceManager::new(10, 2);
        manager.allocate(2);
        manager.tick();
        manager.tick();
        manager.allocate(1);
        manager.tick();
        manager.allocate(2);

        // ready: 2, pending: [1 slot left, 2 slots left, 2 slots left]
        assert_eq!(manager.num_machines_ready(), 2);
        assert_eq!(manager.num_machines_pending(), 3);

        manager.deallocate(2);
        assert_eq!(manager.num_machines_ready(), 2);
        assert_eq!(manager.num_machines_pending(), 1);

        // The surviving pending machine is the oldest request
        manager.tick();
        assert_eq!(manager.num_machines_ready(), 3);
    }

    #[test]
    fn test_deallocate_falls_back_to_ready() {
        let mut manager = ResourceManager::new(10, 1);
        manager.allocate(3);
        manager.tick();
        manager.allocate(1);

        manager.deallocate(2);
        assert_eq!(manager.num_machines_pending(), 0);
        assert_eq!(manager.num_machines_ready(), 2);
    }

    #[test]
    fn test_single_request_reaches_capped_capacity() {
        for delay in 0..4 {
            let mut manager = ResourceManager::new(3, delay);
            let requested = manager.request_capacity(7.min(manager.max_machines()));
            assert_eq!(requested, 3);
            for _ in 0..delay {
                manager.tick();
            }
            assert_eq!(manager.num_machines_ready(), 3);
        }
    }

    #[test]
    #[should_panic(expected = "exceeds the limit")]
    fn test_allocate_over_limit_panics() {
        let mut manager = ResourceManager::new(2, 0);
        manager.allocate(3);
    }

    #[test]
    #[should_panic(expected = "only 1 exist")]
    fn test_deallocate_too_many_panics() {
        let mut manager = ResourceManager::new(2, 1);
        manager.allocate(1);
        manager.deallocate(2);
    }
}
