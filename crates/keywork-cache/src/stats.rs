//! Lookup statistics.

/// Terminal outcome classes of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    /// A present value was found.
    Hit,
    /// A stored known-absent marker was found.
    HitAbsent,
    /// Nothing usable was found (includes expired entries).
    Miss,
    /// The key failed validation.
    InvalidKey,
}

/// Counters accumulated across lookups, snapshotted by
/// [`BoundedCache::stats`](crate::BoundedCache::stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that returned a present value.
    pub hit_present: u64,
    /// Lookups that returned a known-absent marker.
    pub hit_absent: u64,
    /// Lookups that found nothing usable.
    pub miss: u64,
    /// Lookups rejected by the key validator.
    pub invalid_key: u64,
}

impl CacheStats {
    /// Total lookups that reached the store (invalid keys excluded).
    pub fn lookups(&self) -> u64 {
        self.hit_present + self.hit_absent + self.miss
    }

    /// Fraction of lookups answered from the store, counting absent markers
    /// as hits. Zero when no lookups have happened.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.lookups();
        if lookups == 0 {
            return 0.0;
        }
        (self.hit_present + self.hit_absent) as f64 / lookups as f64
    }

    pub(crate) fn record(&mut self, kind: LookupKind) {
        match kind {
            LookupKind::Hit => self.hit_present += 1,
            LookupKind::HitAbsent => self.hit_absent += 1,
            LookupKind::Miss => self.miss += 1,
            LookupKind::InvalidKey => self.invalid_key += 1,
        }
    }
}
