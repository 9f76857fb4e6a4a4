use bit_vec::BitVec;
use seahash::hash;

/// Negative-lookup filter sitting in front of the key index.
pub struct BloomFilter {
    bits: BitVec,
    num_hashes: u32,
}

impl BloomFilter {
    /// expected_items: how many keys the store is sized for.
    /// false_positive_rate: e.g. 0.01 for 1%.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let expected_items = expected_items.max(1);
        // m = -(n * ln(p)) / (ln(2)^2), k = (m / n) * ln(2)
        let ln2 = 2.0f64.ln();
        let m = -((expected_items as f64 * false_positive_rate.ln()) / (ln2 * ln2));
        let k = (m / expected_items as f64) * ln2;

        Self {
            bits: BitVec::from_elem((m.ceil() as usize).max(8), false),
            num_hashes: (k.ceil() as u32).max(1),
        }
    }

    pub fn insert(&mut self, key: &str) {
        let m = self.bits.len() as u64;
        for idx in Self::bit_indices(key, self.num_hashes, m) {
            self.bits.set(idx, true);
        }
    }

    /// FALSE means the key was never inserted. TRUE means it might have been.
    pub fn might_contain(&self, key: &str) -> bool {
        let m = self.bits.len() as u64;
        Self::bit_indices(key, self.num_hashes, m).all(|idx| self.bits.get(idx).unwrap_or(false))
    }

    pub fn clear(&mut self) {
        self.bits.clear();
    }

    // Double hashing: g_i(x) = h1(x) + i * h2(x)
    fn bit_indices(key: &str, k: u32, m: u64) -> impl Iterator<Item = usize> {
        let h1 = hash(key.as_bytes());
        let h2 = h1.rotate_left(32) ^ 0x9E3779B97F4A7C15;
        (0..k as u64).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % m) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_keys_are_found() {
        let mut bf = BloomFilter::new(1000, 0.01);
        for i in 0..500 {
            bf.insert(&format!("user:{}", i));
        }
        assert!((0..500).all(|i| bf.might_contain(&format!("user:{}", i))));

        let false_hits = (500..1500).filter(|i| bf.might_contain(&format!("user:{}", i))).count();
        assert!(false_hits < 100, "too many false positives: {}", false_hits);
    }

    #[test]
    fn clear_forgets_everything() {
        let mut bf = BloomFilter::new(10, 0.01);
        bf.insert("a");
        bf.clear();
        assert!(!bf.might_contain("a"));
    }
}
