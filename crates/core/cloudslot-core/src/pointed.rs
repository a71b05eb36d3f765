//! Ordered set that keeps track of the element at a fixed rank
//!
//! Rank 0 is the best (smallest) element. The pointer to the rank-`k` element
//! is maintained with one predecessor/successor step per mutation instead of
//! re-deriving the rank, so every operation stays O(log n).

use std::collections::BTreeSet;
use std::collections::btree_set::Iter;
use std::ops::Bound::{Excluded, Unbounded};

#[derive(Debug, Clone)]
pub struct PointedSet<T> {
    items: BTreeSet<T>,
    rank: usize,
    pointed: Option<T>,
}

impl<T: Ord + Clone> PointedSet<T> {
    /// Create a set tracking the element at `rank`
    pub fn new(rank: usize) -> Self {
        PointedSet {
            items: BTreeSet::new(),
            rank,
            pointed: None,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// The element at the tracked rank, if the set is large enough
    pub fn pointed(&self) -> Option<&T> {
        self.pointed.as_ref()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    /// Best element first
    pub fn iter(&self) -> Iter<'_, T> {
        self.items.iter()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    /// Insert an element. Returns `false` if it was already present.
    pub fn insert(&mut self, item: T) -> bool {
        if !self.items.insert(item.clone()) {
            return false;
        }
        match &self.pointed {
            None => {
                if self.items.len() == self.rank.saturating_add(1) {
                    self.pointed = self.items.last().cloned();
                }
            }
            Some(pointed) if item < *pointed => {
                self.pointed = self.items.range(..pointed.clone()).next_back().cloned();
            }
            Some(_) => {}
        }
        true
    }

    /// Remove an element. Returns `false` if it was not present.
    pub fn remove(&mut self, item: &T) -> bool {
        if !self.items.remove(item) {
            return false;
        }
        if let Some(pointed) = &self.pointed {
            if item <= pointed {
                self.pointed = self
                    .items
                    .range((Excluded(pointed.clone()), Unbounded))
                    .next()
                    .cloned();
            }
        }
        true
    }

    /// Remove and return the best element
    pub fn pop_first(&mut self) -> Option<T> {
        let first = self.items.first()?.clone();
        self.remove(&first);
        Some(first)
    }
}

impl<'a, T> IntoIterator for &'a PointedSet<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn brute_force_rank<T: Ord + Clone>(set: &PointedSet<T>) -> Option<T> {
        let mut sorted: Vec<T> = set.iter().cloned().collect();
        sorted.sort();
        sorted.get(set.rank()).cloned()
    }

    #[test]
    fn test_pointed_appears_at_rank() {
        let mut set = PointedSet::new(1);
        set.insert(5);
        assert_eq!(set.pointed(), None);
        set.insert(1);
        assert_eq!(set.pointed(), Some(&5));
        set.insert(3);
        assert_eq!(set.pointed(), Some(&3));
    }

    #[test]
    fn test_pointed_moves_on_removal() {
        let mut set = PointedSet::new(1);
        for value in [4, 8, 2, 6] {
            set.insert(value);
        }
        assert_eq!(set.pointed(), Some(&4));

        set.remove(&2);
        assert_eq!(set.pointed(), Some(&6));
        set.remove(&6);
        assert_eq!(set.pointed(), Some(&8));
        set.remove(&8);
        assert_eq!(set.pointed(), None);
        set.insert(9);
        assert_eq!(set.pointed(), Some(&9));
    }

    #[test]
    fn test_worse_insert_keeps_pointer() {
        let mut set = PointedSet::new(0);
        set.insert(3);
        assert_eq!(set.pointed(), Some(&3));
        set.insert(7);
        assert_eq!(set.pointed(), Some(&3));
        set.insert(1);
        assert_eq!(set.pointed(), Some(&1));
    }

    #[test]
    fn test_duplicates_and_missing_elements() {
        let mut set = PointedSet::new(0);
        assert!(set.insert(3));
        assert!(!set.insert(3));
        assert_eq!(set.len(), 1);
        assert!(!set.remove(&4));
        assert_eq!(set.pointed(), Some(&3));
    }

    #[test]
    fn test_pop_first() {
        let mut set = PointedSet::new(1);
        for value in [4, 8, 2] {
            set.insert(value);
        }
        assert_eq!(set.pop_first(), Some(2));
        assert_eq!(set.pointed(), Some(&8));
        assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![4, 8]);
    }

    #[test]
    fn test_unreachable_rank_never_points() {
        let mut set = PointedSet::new(usize::MAX);
        for value in 0..100 {
            set.insert(value);
        }
        assert_eq!(set.pointed(), None);
    }

    #[test]
    fn test_matches_brute_force_under_random_mutation() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for rank in [0usize, 1, 3, 10] {
            let mut set = PointedSet::new(rank);
            for _ in 0..2000 {
                let value: u32 = rng.gen_range(0..60);
                if rng.gen_bool(0.55) {
                    set.insert(value);
                } else {
                    set.remove(&value);
                }
                assert_eq!(set.pointed().cloned(), brute_force_rank(&set));
            }
        }
    }
}
