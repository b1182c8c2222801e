//! Bounded priority queue for top-k selection. Handles f32 ordering for BinaryHeap.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A candidate with a distance and an id (external id or list index).
#[derive(Debug, Clone, Copy)]
pub struct Neighbor {
    pub distance: f32,
    pub id: u64,
}

impl Neighbor {
    /// A negative zero distance is stored as positive zero so equal distances
    /// always fall through to the id comparison.
    pub fn new(id: u64, distance: f32) -> Self {
        Self {
            distance: distance + 0.0,
            id,
        }
    }
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Total order: distance first, then id. NaN distances sort after everything else.
impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Keeps the `k` smallest neighbors seen so far. The worst kept neighbor sits
/// on top of an internal max-heap so each rejected candidate costs one compare.
///
/// Because `Neighbor` has a total order, the retained set does not depend on
/// the order candidates are pushed in.
#[derive(Debug)]
pub struct TopK {
    heap: BinaryHeap<Neighbor>,
    k: usize,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self::with_capacity(k, k)
    }

    /// Keep at most `k` neighbors, preallocating for `min(k, expected)`.
    pub fn with_capacity(k: usize, expected: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(k.min(expected)),
            k,
        }
    }

    pub fn push(&mut self, n: Neighbor) {
        if self.k == 0 {
            return;
        }
        if self.heap.len() < self.k {
            self.heap.push(n);
        } else if let Some(mut worst) = self.heap.peek_mut() {
            if n < *worst {
                *worst = n;
            }
        }
    }

    /// The largest kept neighbor, once the queue is full.
    pub fn worst(&self) -> Option<&Neighbor> {
        if self.heap.len() < self.k {
            None
        } else {
            self.heap.peek()
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drain into a Vec sorted ascending by (distance, id).
    pub fn into_sorted_vec(self) -> Vec<Neighbor> {
        self.heap.into_sorted_vec()
    }
}
