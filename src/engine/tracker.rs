//! Leaderboard tracker pool (spec §3 "Leaderboard Tracker", §4.E
//! "Tracker sharing").

use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackerId(pub u32);

/// Display format a tracker renders its value with; distinct formats
/// never share a tracker even if the underlying value is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerFormat {
    Value,
    Score,
    Time,
    Float,
}

#[derive(Debug, Clone)]
pub struct Tracker {
    pub id: TrackerId,
    pub display_string: String,
    pub raw_value: i64,
    pub format: TrackerFormat,
    pub reference_count: u32,
    pub value_djb2: u32,
}

/// `(format, djb2(value_expr_canonical), value_from_hits?)` (spec
/// §4.E). Two leaderboards whose Value expressions serialize to the
/// same canonical string, with the same format and hit-basis, share a
/// tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackerSignature {
    pub format: TrackerFormat,
    pub value_djb2: u32,
    pub value_from_hits: bool,
}

/// djb2, the hash rcheevos itself uses for string interning.
pub fn djb2(s: &str) -> u32 {
    let mut hash: u32 = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as u32);
    }
    hash
}

#[derive(Default)]
pub struct TrackerPool {
    trackers: Vec<Option<Tracker>>,
    by_signature: std::collections::HashMap<TrackerSignature, TrackerId>,
    free_ids: BTreeSet<u32>,
}

impl TrackerPool {
    pub fn new() -> Self {
        TrackerPool::default()
    }

    pub fn get(&self, id: TrackerId) -> Option<&Tracker> {
        self.trackers.get(id.0 as usize).and_then(|t| t.as_ref())
    }

    /// Acquires a tracker for `signature`, creating one with `initial`
    /// display state if the pool has none. Returns `(id, newly_created)`.
    pub fn acquire(&mut self, signature: TrackerSignature, initial_value: i64, initial_display: String) -> (TrackerId, bool) {
        if let Some(&id) = self.by_signature.get(&signature) {
            if let Some(t) = self.trackers[id.0 as usize].as_mut() {
                t.reference_count += 1;
                return (id, false);
            }
        }

        let id = match self.free_ids.iter().next().copied() {
            Some(free) => {
                self.free_ids.remove(&free);
                TrackerId(free)
            }
            None => TrackerId(self.trackers.len() as u32),
        };

        let tracker = Tracker {
            id,
            display_string: initial_display,
            raw_value: initial_value,
            format: signature.format,
            reference_count: 1,
            value_djb2: signature.value_djb2,
        };

        if id.0 as usize == self.trackers.len() {
            self.trackers.push(Some(tracker));
        } else {
            self.trackers[id.0 as usize] = Some(tracker);
        }
        self.by_signature.insert(signature, id);
        (id, true)
    }

    /// Drops one reference; returns `true` if the tracker was fully
    /// released (reference_count hit zero) this call.
    pub fn release(&mut self, id: TrackerId) -> bool {
        let Some(slot) = self.trackers.get_mut(id.0 as usize) else {
            return false;
        };
        let Some(t) = slot else {
            return false;
        };
        t.reference_count = t.reference_count.saturating_sub(1);
        if t.reference_count == 0 {
            self.by_signature.retain(|_, v| *v != id);
            *slot = None;
            self.free_ids.insert(id.0);
            true
        } else {
            false
        }
    }

    pub fn update(&mut self, id: TrackerId, raw_value: i64, display_string: String) -> bool {
        if let Some(Some(t)) = self.trackers.get_mut(id.0 as usize) {
            let changed = t.raw_value != raw_value || t.display_string != display_string;
            t.raw_value = raw_value;
            t.display_string = display_string;
            changed
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig() -> TrackerSignature {
        TrackerSignature { format: TrackerFormat::Value, value_djb2: djb2("0xH000E"), value_from_hits: false }
    }

    #[test]
    fn shares_tracker_for_identical_signature() {
        let mut pool = TrackerPool::new();
        let (id1, created1) = pool.acquire(sig(), 0, "0".into());
        let (id2, created2) = pool.acquire(sig(), 0, "0".into());
        assert_eq!(id1, id2);
        assert!(created1);
        assert!(!created2);
        assert_eq!(pool.get(id1).unwrap().reference_count, 2);
    }

    #[test]
    fn reclaims_smallest_free_id_first() {
        let mut pool = TrackerPool::new();
        let other_sig = TrackerSignature { format: TrackerFormat::Value, value_djb2: djb2("0xH000F"), value_from_hits: false };
        let (id_a, _) = pool.acquire(sig(), 0, String::new());
        let (id_b, _) = pool.acquire(other_sig, 0, String::new());
        assert!(pool.release(id_a));
        let third_sig = TrackerSignature { format: TrackerFormat::Score, value_djb2: djb2("0xH0010"), value_from_hits: false };
        let (id_c, created) = pool.acquire(third_sig, 0, String::new());
        assert!(created);
        assert_eq!(id_c, id_a);
        assert_ne!(id_c, id_b);
    }
}
