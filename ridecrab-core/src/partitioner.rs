//! # Partitioner
//!
//! Routing strategies for spreading records over parallel workers.

use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use ahash::AHasher;

/// Trait for partitioning data across parallel instances.
pub trait Partitioner<T>: Send + Sync {
    /// Determine which partition (0..num_partitions) this value should go to.
    fn partition(&self, value: &T, num_partitions: usize) -> usize;
}

/// Hash-based partitioner using a key selector function.
///
/// Every value with the same key lands on the same partition, so one worker
/// owns all state of a key.
pub struct HashPartitioner<K, F> {
    key_selector: F,
    _phantom: PhantomData<fn() -> K>,
}

impl<K, F> HashPartitioner<K, F> {
    /// Create a new hash partitioner with the given key selector.
    pub fn new(key_selector: F) -> Self {
        Self {
            key_selector,
            _phantom: PhantomData,
        }
    }
}

impl<K, T, F> Partitioner<T> for HashPartitioner<K, F>
where
    K: Hash,
    F: Fn(&T) -> K + Send + Sync,
{
    fn partition(&self, value: &T, num_partitions: usize) -> usize {
        let key = (self.key_selector)(value);
        let mut hasher = AHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % num_partitions
    }
}

/// Round-robin partitioner.
///
/// Spreads the records of one key over every worker, which forces partial
/// accumulators of that key to be merged afterwards.
#[derive(Default)]
pub struct RoundRobinPartitioner {
    counter: AtomicUsize,
}

impl RoundRobinPartitioner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> Partitioner<T> for RoundRobinPartitioner {
    fn partition(&self, _value: &T, num_partitions: usize) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed) % num_partitions
    }
}
