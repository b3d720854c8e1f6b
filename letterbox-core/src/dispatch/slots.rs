//! Correlation ids for in-flight worker tasks.
//!
//! Ids are the smallest non-negative integers not currently outstanding.
//! The live set is kept sorted, so the first index whose value differs from
//! the index itself is the first hole. Lookups are linear; outstanding task
//! counts stay in the low tens.

use tracing::warn;

/// Slot id attached to every request and echoed by its reply.
pub type Slot = u32;

#[derive(Debug, Default, Clone)]
pub struct SlotAllocator {
    /// Sorted, no duplicates.
    live: Vec<Slot>,
}

impl SlotAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the smallest free slot and mark it live.
    pub fn generate(&mut self) -> Slot {
        let mut pos = 0;
        while pos < self.live.len() && self.live[pos] as usize == pos {
            pos += 1;
        }
        let slot = pos as Slot;
        self.live.insert(pos, slot);
        slot
    }

    /// Release `slot`. Returns `false` if it was not live.
    pub fn revoke(&mut self, slot: Slot) -> bool {
        match self.live.binary_search(&slot) {
            Ok(pos) => {
                self.live.remove(pos);
                true
            }
            Err(_) => {
                debug_assert!(false, "revoke of slot {slot} that is not live");
                warn!(slot, "revoke of slot that is not live");
                false
            }
        }
    }

    /// Forget every live slot.
    pub fn clear(&mut self) {
        self.live.clear();
    }

    pub fn is_live(&self, slot: Slot) -> bool {
        self.live.binary_search(&slot).is_ok()
    }

    /// Live slots in ascending order.
    pub fn live(&self) -> &[Slot] {
        &self.live
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_sequential_ids_from_zero() {
        let mut slots = SlotAllocator::new();
        assert_eq!(slots.generate(), 0);
        assert_eq!(slots.generate(), 1);
        assert_eq!(slots.generate(), 2);
        assert_eq!(slots.live(), &[0, 1, 2]);
    }

    #[test]
    fn fills_the_lowest_hole_first() {
        let mut slots = SlotAllocator::new();
        for _ in 0..5 {
            slots.generate();
        }
        assert!(slots.revoke(3));
        assert!(slots.revoke(1));
        assert_eq!(slots.live(), &[0, 2, 4]);

        assert_eq!(slots.generate(), 1);
        assert_eq!(slots.generate(), 3);
        assert_eq!(slots.generate(), 5);
        assert_eq!(slots.live(), &[0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn always_returns_smallest_free_value() {
        // Deterministic pseudo-random generate/revoke mix checked against a model.
        let mut slots = SlotAllocator::new();
        let mut model: Vec<Slot> = Vec::new();
        let mut state = 0x2545_f491_u32;

        for _ in 0..2_000 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;

            if state % 3 == 0 && !model.is_empty() {
                let victim = model[(state as usize / 3) % model.len()];
                assert!(slots.revoke(victim));
                model.retain(|&s| s != victim);
            } else {
                let expected = (0..).find(|v| !model.contains(v)).unwrap();
                let got = slots.generate();
                assert_eq!(got, expected);
                model.push(got);
                model.sort_unstable();
            }
            assert_eq!(slots.live(), model.as_slice());
        }
    }

    #[test]
    fn clear_empties_the_live_set() {
        let mut slots = SlotAllocator::new();
        slots.generate();
        slots.generate();
        slots.clear();
        assert!(slots.is_empty());
        assert_eq!(slots.generate(), 0);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn revoking_an_absent_slot_is_reported() {
        let mut slots = SlotAllocator::new();
        assert!(!slots.revoke(7));
    }
}
