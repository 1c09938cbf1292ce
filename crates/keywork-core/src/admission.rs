//! Bounded priority admission queue shared by the task managers.
//!
//! Tasks wait here for a run slot. Ordering is by priority first; within one
//! priority the configured [`AdmissionPolicy`] decides both which task runs
//! next and which task is displaced when the queue overflows.

use std::collections::{BTreeMap, VecDeque};
use std::hash::Hash;

use hashbrown::HashMap;
use ordered_float::OrderedFloat;

/// Tie-breaking policy for tasks sharing one priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// Oldest submission runs first; overflow displaces the oldest queued
    /// task of the lowest priority.
    #[default]
    Fifo,
    /// Newest submission runs first; overflow displaces the newest queued
    /// task of the lowest priority — which may be the incoming task itself.
    Lifo,
}

/// Outcome of [`AdmissionQueue::push`] on a bounded queue.
#[derive(Debug)]
pub enum Admitted<K, T> {
    /// The task was enqueued without displacing anything.
    Enqueued,
    /// The task was enqueued; the returned victim was displaced to make room.
    Displaced {
        /// Key of the displaced task.
        key: K,
        /// Payload of the displaced task.
        task: T,
    },
    /// The incoming task itself lost the admission contest and was refused.
    Refused {
        /// Key of the refused task, handed back to the caller.
        key: K,
        /// Payload of the refused task, handed back to the caller.
        task: T,
    },
}

/// A bounded collection of keyed tasks ordered by `(priority, policy)`.
///
/// At most one task per key may be queued. All operations are O(log P) in the
/// number of distinct priorities plus O(1) at the chosen bucket end, except
/// [`remove`](Self::remove) and [`get_mut`](Self::get_mut) which scan the
/// key's bucket.
pub struct AdmissionQueue<K, T> {
    buckets: BTreeMap<OrderedFloat<f64>, VecDeque<(K, T)>>,
    index: HashMap<K, f64>,
    capacity: usize,
    policy: AdmissionPolicy,
}

impl<K, T> AdmissionQueue<K, T>
where
    K: Hash + Eq + Clone,
{
    /// Creates a queue holding at most `capacity` tasks.
    pub fn new(capacity: usize, policy: AdmissionPolicy) -> Self {
        Self {
            buckets: BTreeMap::new(),
            index: HashMap::new(),
            capacity,
            policy,
        }
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Maximum number of queued tasks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True when `key` is queued.
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Enqueues `task` under `key`. When the queue is full, the displacement
    /// victim is the task minimizing `(priority, policy order)` among the
    /// queued tasks and the incoming one; the victim is returned to the
    /// caller so its subscribers can be notified.
    pub fn push(&mut self, key: K, task: T, priority: f64) -> Admitted<K, T> {
        self.admit(key, task, priority, BucketEnd::Tail)
    }

    /// Enqueues `task` at the head of its priority bucket, i.e. the position
    /// that pops next within that priority. Used to resume preempted work
    /// ahead of its peers. Overflow handling matches [`push`](Self::push).
    pub fn push_front(&mut self, key: K, task: T, priority: f64) -> Admitted<K, T> {
        self.admit(key, task, priority, BucketEnd::Head)
    }

    fn admit(&mut self, key: K, task: T, priority: f64, end: BucketEnd) -> Admitted<K, T> {
        assert!(
            !self.index.contains_key(&key),
            "admission queue already holds this key"
        );
        if self.capacity == 0 {
            return Admitted::Refused { key, task };
        }
        if self.len() >= self.capacity {
            let min_priority = self
                .buckets
                .first_key_value()
                .map(|(p, _)| p.0)
                .expect("non-empty queue has a minimum bucket");
            let incoming_loses = priority < min_priority
                || (priority == min_priority && self.policy == AdmissionPolicy::Lifo);
            if incoming_loses {
                return Admitted::Refused { key, task };
            }
            let (victim_key, victim_task) = self
                .pop_victim()
                .expect("full queue yields a displacement victim");
            self.insert(key, task, priority, end);
            return Admitted::Displaced {
                key: victim_key,
                task: victim_task,
            };
        }
        self.insert(key, task, priority, end);
        Admitted::Enqueued
    }

    /// Removes and returns the next task to run: highest priority, ties
    /// broken by the policy.
    pub fn pop_next(&mut self) -> Option<(K, T, f64)> {
        let mut entry = self.buckets.last_entry()?;
        let priority = entry.key().0;
        let bucket = entry.get_mut();
        let (key, task) = match self.policy {
            AdmissionPolicy::Fifo => bucket.pop_front(),
            AdmissionPolicy::Lifo => bucket.pop_back(),
        }
        .expect("buckets are removed when drained");
        if bucket.is_empty() {
            entry.remove();
        }
        self.index.remove(&key);
        Some((key, task, priority))
    }

    /// Removes a queued task by key.
    pub fn remove(&mut self, key: &K) -> Option<(T, f64)> {
        let priority = self.index.remove(key)?;
        let bucket = self
            .buckets
            .get_mut(&OrderedFloat(priority))
            .expect("indexed key has a bucket");
        let pos = bucket
            .iter()
            .position(|(k, _)| k == key)
            .expect("indexed key is in its bucket");
        let (_, task) = bucket.remove(pos).expect("position is in range");
        if bucket.is_empty() {
            self.buckets.remove(&OrderedFloat(priority));
        }
        Some((task, priority))
    }

    /// Mutable access to a queued task, e.g. to attach another subscriber.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut T> {
        let priority = *self.index.get(key)?;
        let bucket = self.buckets.get_mut(&OrderedFloat(priority))?;
        bucket
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, task)| task)
    }

    /// Priority of the next task [`pop_next`](Self::pop_next) would return.
    pub fn peek_priority(&self) -> Option<f64> {
        self.buckets.last_key_value().map(|(p, _)| p.0)
    }

    fn pop_victim(&mut self) -> Option<(K, T)> {
        let mut entry = self.buckets.first_entry()?;
        let bucket = entry.get_mut();
        let popped = match self.policy {
            AdmissionPolicy::Fifo => bucket.pop_front(),
            AdmissionPolicy::Lifo => bucket.pop_back(),
        };
        if bucket.is_empty() {
            entry.remove();
        }
        let (key, task) = popped?;
        self.index.remove(&key);
        Some((key, task))
    }

    fn insert(&mut self, key: K, task: T, priority: f64, end: BucketEnd) {
        let bucket = self.buckets.entry(OrderedFloat(priority)).or_default();
        match (end, self.policy) {
            // Buckets hold submission order front-to-back; the policy decides
            // which end pops. "Head of the bucket" means next-to-pop.
            (BucketEnd::Head, AdmissionPolicy::Fifo) => bucket.push_front((key.clone(), task)),
            (BucketEnd::Head, AdmissionPolicy::Lifo) => bucket.push_back((key.clone(), task)),
            (BucketEnd::Tail, _) => bucket.push_back((key.clone(), task)),
        }
        self.index.insert(key, priority);
    }

    /// Drains every queued task, lowest priority first.
    pub fn drain(&mut self) -> Vec<(K, T, f64)> {
        let mut drained = Vec::with_capacity(self.len());
        let buckets = std::mem::take(&mut self.buckets);
        self.index.clear();
        for (priority, bucket) in buckets {
            for (key, task) in bucket {
                drained.push((key, task, priority.0));
            }
        }
        drained
    }
}

#[derive(Clone, Copy)]
enum BucketEnd {
    Head,
    Tail,
}
