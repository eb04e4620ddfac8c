//! Chronologically sortable push keys.
//!
//! A key is 20 characters: 8 encode the millisecond timestamp, 12 are
//! random. Keys generated within the same millisecond reuse the previous
//! random part incremented by one, so lexical order matches push order.

use uuid::Uuid;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Default)]
pub struct PushIdGenerator {
    last_ms: Option<i64>,
    last_random: [u8; 12],
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a key for the given wall-clock millisecond.
    pub fn generate(&mut self, now_ms: i64) -> String {
        let now_ms = now_ms.max(0);

        if self.last_ms == Some(now_ms) {
            self.increment_random();
        } else {
            let bytes = Uuid::new_v4().into_bytes();
            for (slot, byte) in self.last_random.iter_mut().zip(bytes.iter()) {
                *slot = byte % 64;
            }
        }
        self.last_ms = Some(now_ms);

        let mut id = [0u8; 20];
        let mut t = now_ms;
        for slot in id[..8].iter_mut().rev() {
            *slot = PUSH_CHARS[(t % 64) as usize];
            t /= 64;
        }
        for (slot, digit) in id[8..].iter_mut().zip(self.last_random.iter()) {
            *slot = PUSH_CHARS[*digit as usize];
        }

        id.iter().map(|b| *b as char).collect()
    }

    fn increment_random(&mut self) {
        for digit in self.last_random.iter_mut().rev() {
            if *digit == 63 {
                *digit = 0;
            } else {
                *digit += 1;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shape() {
        let mut gen = PushIdGenerator::new();
        let key = gen.generate(1_704_103_200_000);
        assert_eq!(key.len(), 20);
        assert!(key.bytes().all(|b| PUSH_CHARS.contains(&b)));
    }

    #[test]
    fn test_same_millisecond_keys_increase() {
        let mut gen = PushIdGenerator::new();
        let keys: Vec<String> = (0..100).map(|_| gen.generate(1_000)).collect();
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_later_millisecond_sorts_after() {
        let mut gen = PushIdGenerator::new();
        let first = gen.generate(1_000);
        let second = gen.generate(1_001);
        assert!(first < second);
        assert_eq!(&first[..7], &second[..7]);
    }
}
