//! Radix Face Sorter
//!
//! Stable LSD radix sort over scalar depth keys: fixed 4 passes of 8 bits,
//! producing an index permutation in ascending key order. Stability matters —
//! faces with equal keys must keep their submission order so faces from the
//! same drawable stay contiguous and batchable.
//!
//! Keys are mapped through the standard order-preserving float transform
//! (flip all bits for negatives, flip the sign bit for positives), which
//! makes unsigned radix order equal total float order, negatives included.
//!
//! Scratch vectors are retained across frames; sorting allocates only when a
//! frame submits more faces than any frame before it.

/// Reusable radix sorter producing a back-to-front permutation.
#[derive(Debug, Default)]
pub struct RadixFaceSorter {
    bits: Vec<u32>,
    perm: Vec<u32>,
    swap: Vec<u32>,
}

/// Order-preserving map from `f32` to `u32`.
#[inline]
fn sortable_bits(key: f32) -> u32 {
    let bits = key.to_bits();
    if bits & 0x8000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000
    }
}

impl RadixFaceSorter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorts the given keys, returning the permutation: `perm[0]` is the
    /// position of the smallest key, ties in submission order.
    pub fn sort(&mut self, keys: impl ExactSizeIterator<Item = f32>) -> &[u32] {
        let n = keys.len();
        self.bits.clear();
        self.bits.extend(keys.map(sortable_bits));

        self.perm.clear();
        self.perm.extend(0..n as u32);
        self.swap.resize(n, 0);

        for pass in 0..4 {
            let shift = pass * 8;
            let mut histogram = [0usize; 256];
            for &i in &self.perm {
                histogram[((self.bits[i as usize] >> shift) & 0xFF) as usize] += 1;
            }

            // Exclusive prefix sum: histogram becomes per-bucket write offsets.
            let mut offset = 0;
            for count in &mut histogram {
                let next = offset + *count;
                *count = offset;
                offset = next;
            }

            for &i in &self.perm {
                let bucket = ((self.bits[i as usize] >> shift) & 0xFF) as usize;
                self.swap[histogram[bucket]] = i;
                histogram[bucket] += 1;
            }
            std::mem::swap(&mut self.perm, &mut self.swap);
        }

        &self.perm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted_keys(keys: &[f32]) -> Vec<f32> {
        let mut sorter = RadixFaceSorter::new();
        let perm = sorter.sort(keys.iter().copied());
        perm.iter().map(|&i| keys[i as usize]).collect()
    }

    #[test]
    fn test_ascending_order() {
        let keys = [3.0, 1.0, 2.0, 0.5, 2.5];
        let out = sorted_keys(&keys);
        assert!(out.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(out, vec![0.5, 1.0, 2.0, 2.5, 3.0]);
    }

    #[test]
    fn test_negative_and_positive_keys() {
        let keys = [1.0, -3.5, 0.0, -0.25, 2.0, -0.0];
        let out = sorted_keys(&keys);
        assert!(out.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(out[0], -3.5);
        assert_eq!(out[5], 2.0);
    }

    #[test]
    fn test_stability_on_equal_keys() {
        let keys = [1.0, 2.0, 1.0, 2.0, 1.0];
        let mut sorter = RadixFaceSorter::new();
        let perm = sorter.sort(keys.iter().copied());
        // Equal keys keep submission order.
        assert_eq!(perm, &[0, 2, 4, 1, 3]);
    }

    #[test]
    fn test_empty_and_single() {
        let mut sorter = RadixFaceSorter::new();
        assert!(sorter.sort(std::iter::empty()).is_empty());
        assert_eq!(sorter.sort([7.0].into_iter()), &[0]);
    }

    #[test]
    fn test_large_random_sequence() {
        // Deterministic LCG, no rand dependency needed for a smoke test.
        let mut state = 0x2545_f491u64;
        let keys: Vec<f32> = (0..10_000)
            .map(|_| {
                state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
                ((state >> 33) as i32 as f32) / 1024.0
            })
            .collect();
        let out = sorted_keys(&keys);
        assert!(out.windows(2).all(|w| w[0] <= w[1]));
    }
}
