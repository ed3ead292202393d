//! Bounded binary min-heap with sentinel keys
//!
//! Slot 0 holds the infimum key and slots past the last element hold the
//! supremum, so sift-up never checks for the root and sift-down never checks
//! for a missing right child.

use std::mem;

#[derive(Debug, Clone)]
struct Slot<K, V> {
    key: K,
    value: Option<V>,
}

impl<K, V> Slot<K, V> {
    fn sentinel(key: K) -> Self {
        Self { key, value: None }
    }
}

/// Fixed-capacity min-heap keyed by `K`
#[derive(Debug, Clone)]
pub struct BinaryHeap<K, V> {
    data: Vec<Slot<K, V>>,
    size: usize,
    capacity: usize,
    infimum: K,
    supremum: K,
}

impl<K: PartialOrd + Copy, V> BinaryHeap<K, V> {
    /// Every key ever enqueued must lie strictly between `infimum` and
    /// `supremum`.
    pub fn new(capacity: usize, infimum: K, supremum: K) -> Self {
        let mut data = Vec::with_capacity(capacity + 2);
        data.push(Slot::sentinel(infimum));
        data.extend((0..=capacity).map(|_| Slot::sentinel(supremum)));
        Self {
            data,
            size: 0,
            capacity,
            infimum,
            supremum,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn infimum(&self) -> K {
        self.infimum
    }

    pub fn supremum(&self) -> K {
        self.supremum
    }

    /// Insert an element.
    ///
    /// # Panics
    ///
    /// Panics when the heap is already at capacity.
    pub fn enqueue(&mut self, key: K, value: V) {
        assert!(
            self.size < self.capacity,
            "binary heap overflow (capacity {})",
            self.capacity
        );
        self.size += 1;
        let mut hole = self.size;
        while key < self.data[hole / 2].key {
            self.data.swap(hole, hole / 2);
            hole /= 2;
        }
        self.data[hole] = Slot {
            key,
            value: Some(value),
        };
    }

    /// Remove and return the element with the smallest key
    pub fn dequeue(&mut self) -> Option<(K, V)> {
        if self.size == 0 {
            return None;
        }
        let last = self.size;
        let root = mem::replace(&mut self.data[1], Slot::sentinel(self.supremum));

        // Sink the hole to a leaf along the smaller children
        let mut hole = 1;
        let mut succ = 2;
        while succ < last {
            if self.data[succ + 1].key < self.data[succ].key {
                succ += 1;
            }
            self.data.swap(hole, succ);
            hole = succ;
            succ = 2 * hole;
        }

        // Move the last element into the hole and sift it up
        if hole != last {
            let key = self.data[last].key;
            let mut pred = hole / 2;
            while key < self.data[pred].key {
                self.data.swap(hole, pred);
                hole = pred;
                pred = hole / 2;
            }
            self.data.swap(hole, last);
        }
        self.data[last] = Slot::sentinel(self.supremum);
        self.size -= 1;

        root.value.map(|v| (root.key, v))
    }

    /// Smallest element without removing it
    pub fn first(&self) -> Option<(K, &V)> {
        if self.size == 0 {
            return None;
        }
        let slot = &self.data[1];
        slot.value.as_ref().map(|v| (slot.key, v))
    }

    /// Elements in storage order
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> + '_ {
        self.data[1..=self.size]
            .iter()
            .filter_map(|s| s.value.as_ref().map(|v| (s.key, v)))
    }

    pub fn clear(&mut self) {
        for slot in &mut self.data[1..=self.size] {
            *slot = Slot::sentinel(self.supremum);
        }
        self.size = 0;
    }

    /// Keep only the elements for which `keep` returns true, rebuilding the
    /// heap in place.
    pub fn retain<F: FnMut(K, &V) -> bool>(&mut self, mut keep: F) {
        let entries: Vec<(K, V)> = self.data[1..=self.size]
            .iter_mut()
            .filter_map(|s| s.value.take().map(|v| (s.key, v)))
            .collect();
        self.clear();
        for (key, value) in entries {
            if keep(key, &value) {
                self.enqueue(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn heap(capacity: usize) -> BinaryHeap<f32, usize> {
        BinaryHeap::new(capacity, f32::NEG_INFINITY, f32::INFINITY)
    }

    #[test]
    fn test_dequeue_in_order() {
        let mut h = heap(8);
        for (i, k) in [5.0, 1.0, 4.0, 2.0, 3.0].into_iter().enumerate() {
            h.enqueue(k, i);
        }
        assert_eq!(h.len(), 5);
        assert_eq!(h.first(), Some((1.0, &1)));

        let keys: Vec<f32> = std::iter::from_fn(|| h.dequeue().map(|(k, _)| k)).collect();
        assert_eq!(keys, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(h.is_empty());
        assert!(h.dequeue().is_none());
    }

    #[test]
    fn test_random_heap_sort() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut h = heap(1000);
        let mut keys: Vec<f32> = (0..1000).map(|_| rng.gen_range(-100.0..100.0)).collect();
        for (i, &k) in keys.iter().enumerate() {
            h.enqueue(k, i);
        }
        keys.sort_by(|a, b| a.partial_cmp(b).unwrap());
        for expected in keys {
            let (k, i) = h.dequeue().unwrap();
            assert_eq!(k, expected);
            assert!(i < 1000);
        }
    }

    #[test]
    fn test_interleaved() {
        let mut h = heap(4);
        h.enqueue(3.0, 0);
        h.enqueue(1.0, 1);
        assert_eq!(h.dequeue(), Some((1.0, 1)));
        h.enqueue(0.5, 2);
        h.enqueue(2.0, 3);
        h.enqueue(7.0, 4);
        assert_eq!(h.len(), 4);
        assert_eq!(h.dequeue(), Some((0.5, 2)));
        assert_eq!(h.dequeue(), Some((2.0, 3)));
        assert_eq!(h.dequeue(), Some((3.0, 0)));
        assert_eq!(h.dequeue(), Some((7.0, 4)));
    }

    #[test]
    #[should_panic(expected = "overflow")]
    fn test_overflow_panics() {
        let mut h = heap(2);
        h.enqueue(1.0, 0);
        h.enqueue(2.0, 1);
        h.enqueue(3.0, 2);
    }

    #[test]
    fn test_infinite_keys() {
        let mut h = heap(3);
        h.enqueue(f32::MAX, 0);
        h.enqueue(0.0, 1);
        assert_eq!(h.dequeue(), Some((0.0, 1)));
        assert_eq!(h.dequeue(), Some((f32::MAX, 0)));
    }

    #[test]
    fn test_retain_and_clear() {
        let mut h = heap(10);
        for i in 0..10 {
            h.enqueue(i as f32, i);
        }
        h.retain(|_, &v| v % 2 == 1);
        assert_eq!(h.len(), 5);
        assert_eq!(h.iter().count(), 5);
        assert_eq!(h.dequeue(), Some((1.0, 1)));

        h.clear();
        assert!(h.is_empty());
        assert!(h.first().is_none());
        h.enqueue(2.0, 2);
        assert_eq!(h.capacity(), 10);
        assert_eq!(h.dequeue(), Some((2.0, 2)));
    }
}
