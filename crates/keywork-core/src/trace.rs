//! Per-instance trace id generation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of low bits reserved for the sequential counter. A factory that
/// hands out more than 2^16 ids per microsecond rolls into the time base,
/// which preserves monotonicity within the instance.
const SEQ_BITS: u32 = 16;

/// Factory for 64-bit monotonically increasing trace ids.
///
/// Ids are used for bookkeeping boundaries: cache entries record the id they
/// were inserted under, and job managers stamp each provider generation so
/// late results from cancelled runs can be told apart from live ones.
///
/// The base mixes in a wall-clock microsecond offset captured once at
/// construction, so ids from different factory instances (including a factory
/// rebuilt after [`reset`](Self::reset)) fall into disjoint ranges. After
/// construction the factory never reads the wall clock again.
#[derive(Debug)]
pub struct TraceIdFactory {
    base: AtomicU64,
    seq: AtomicU64,
}

impl TraceIdFactory {
    /// Creates a factory with a fresh wall-clock base.
    pub fn new() -> Self {
        Self {
            base: AtomicU64::new(Self::fresh_base()),
            seq: AtomicU64::new(0),
        }
    }

    /// Returns the next id. Ids are strictly increasing per instance.
    pub fn next(&self) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.base.load(Ordering::Relaxed).wrapping_add(seq)
    }

    /// Rebases the factory on a fresh wall-clock offset and restarts the
    /// sequence. Ids handed out before and after a reset never interleave.
    pub fn reset(&self) {
        self.base.store(Self::fresh_base(), Ordering::Relaxed);
        self.seq.store(0, Ordering::Relaxed);
    }

    fn fresh_base() -> u64 {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;
        micros.wrapping_shl(SEQ_BITS)
    }
}

impl Default for TraceIdFactory {
    fn default() -> Self {
        Self::new()
    }
}
