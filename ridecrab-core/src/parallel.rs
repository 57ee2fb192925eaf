//! # Parallel combine
//!
//! Global-window combine per key, executed on several worker threads.
//!
//! ```text
//! Source (caller thread)
//!     |
//!     | RoundRobin / ByKey routing
//!     v
//! Worker threads: partial accumulator per key
//!     |
//!     v
//! Collector (caller thread): CombineFn::merge per key, then extract
//! ```
//!
//! Workers share no mutable state. The only reconciliation between them is
//! [`CombineFn::merge`], which is why the combine must be associative and
//! commutative.
//!
//! Partials are merged in worker order, not arrival order. A combine that is
//! only commutative up to ties, like
//! [`LatestByTimestamp`](crate::combine::LatestByTimestamp) on equal event
//! times, therefore gives the same answer on every run with the same input
//! and parallelism. Which of the tied values wins can still change with the
//! parallelism or the distribution.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;
use std::thread;

use anyhow::{Result, anyhow, bail};
use crossbeam_channel::{Receiver, Sender, bounded};

use crate::combine::CombineFn;
use crate::partitioner::{HashPartitioner, Partitioner, RoundRobinPartitioner};
use crate::types::StreamElement;

/// Bounded capacity of each source -> worker channel.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// How records are routed to workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Distribution {
    /// Cycle through workers; the records of one key end up on many workers.
    #[default]
    RoundRobin,
    /// Hash the key; each key is owned by exactly one worker.
    ByKey,
}

/// Result of [`combine_per_key`].
#[derive(Debug)]
pub struct KeyedCombineResult<K, OUT> {
    pub outputs: HashMap<K, OUT>,
    /// Records skipped because they carried no key.
    pub unkeyed_dropped: u64,
    /// Number of cross-worker merges the collector performed.
    pub partials_merged: u64,
}

struct Partial<K, ACC> {
    worker_id: usize,
    accumulators: HashMap<K, ACC>,
    unkeyed_dropped: u64,
}

/// Combine `records` per key on `parallelism` worker threads.
pub fn combine_per_key<K, T, ACC, OUT, KF, CF>(
    records: Vec<T>,
    parallelism: usize,
    distribution: Distribution,
    key_fn: KF,
    combine_fn: CF,
) -> Result<KeyedCombineResult<K, OUT>>
where
    K: Hash + Eq + Send + 'static,
    T: Send + 'static,
    ACC: Send + 'static,
    KF: Fn(&T) -> Option<K> + Send + Sync + Clone + 'static,
    CF: CombineFn<T, ACC, OUT> + Clone + 'static,
{
    if parallelism == 0 {
        bail!("parallelism must be at least 1");
    }

    let (partial_tx, partial_rx) = bounded::<Partial<K, ACC>>(parallelism);

    let mut senders: Vec<Sender<StreamElement<T>>> = Vec::with_capacity(parallelism);
    let mut handles = Vec::with_capacity(parallelism);
    for worker_id in 0..parallelism {
        let (tx, rx) = bounded(DEFAULT_CHANNEL_CAPACITY);
        senders.push(tx);

        let key_fn = key_fn.clone();
        let combine_fn = combine_fn.clone();
        let partial_tx = partial_tx.clone();
        handles.push(thread::spawn(move || -> Result<()> {
            let partial =
                run_worker::<K, T, ACC, OUT, KF, CF>(worker_id, rx, &key_fn, &combine_fn)?;
            partial_tx
                .send(partial)
                .map_err(|_| anyhow!("collector dropped before worker {worker_id} finished"))
        }));
    }
    drop(partial_tx);

    let partitioner: Box<dyn Partitioner<T>> = match distribution {
        Distribution::RoundRobin => Box::new(RoundRobinPartitioner::new()),
        Distribution::ByKey => Box::new(HashPartitioner::new(key_fn)),
    };
    for record in records {
        let target = partitioner.partition(&record, parallelism);
        senders[target]
            .send(StreamElement::record(record))
            .map_err(|_| anyhow!("worker {target} exited early"))?;
    }
    for sender in &senders {
        sender
            .send(StreamElement::End)
            .map_err(|_| anyhow!("worker exited before end of input"))?;
    }
    drop(senders);

    let mut partials: Vec<Partial<K, ACC>> = partial_rx.iter().collect();
    partials.sort_by_key(|p| p.worker_id);

    let mut merged: HashMap<K, ACC> = HashMap::new();
    let mut unkeyed_dropped = 0;
    let mut partials_merged = 0;
    for partial in partials {
        unkeyed_dropped += partial.unkeyed_dropped;
        for (key, acc) in partial.accumulators {
            match merged.entry(key) {
                Entry::Occupied(mut existing) => {
                    combine_fn.merge(existing.get_mut(), acc);
                    partials_merged += 1;
                }
                Entry::Vacant(slot) => {
                    slot.insert(acc);
                }
            }
        }
    }

    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow!("combine worker panicked"))??;
    }

    let mut outputs = HashMap::with_capacity(merged.len());
    for (key, acc) in merged {
        let Some(out) = combine_fn.extract_output(&acc) else {
            bail!("accumulator for a keyed record extracted no output");
        };
        outputs.insert(key, out);
    }

    Ok(KeyedCombineResult {
        outputs,
        unkeyed_dropped,
        partials_merged,
    })
}

fn run_worker<K, T, ACC, OUT, KF, CF>(
    worker_id: usize,
    input: Receiver<StreamElement<T>>,
    key_fn: &KF,
    combine_fn: &CF,
) -> Result<Partial<K, ACC>>
where
    K: Hash + Eq,
    KF: Fn(&T) -> Option<K>,
    CF: CombineFn<T, ACC, OUT>,
{
    let mut accumulators: HashMap<K, ACC> = HashMap::new();
    let mut unkeyed_dropped = 0;
    loop {
        let element = input
            .recv()
            .map_err(|_| anyhow!("worker {worker_id}: source hung up without End"))?;
        match element {
            StreamElement::Record(rec) => {
                let Some(key) = key_fn(&rec.value) else {
                    unkeyed_dropped += 1;
                    tracing::warn!("worker {}: dropping record without a key", worker_id);
                    continue;
                };
                let acc = accumulators
                    .entry(key)
                    .or_insert_with(|| combine_fn.create_accumulator());
                combine_fn.add_input(acc, &rec.value);
            }
            // Global window: watermarks carry no meaning here.
            StreamElement::Watermark(_) => {}
            StreamElement::End => break,
        }
    }
    tracing::debug!(
        "worker {} finished with {} keys",
        worker_id,
        accumulators.len()
    );
    Ok(Partial {
        worker_id,
        accumulators,
        unkeyed_dropped,
    })
}
