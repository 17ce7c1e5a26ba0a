use std::sync::Mutex;

use chrono::Utc;
use rand::Rng;

/// Alphabet in ASCII order so that generated keys sort lexicographically.
const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIME_CHARS: usize = 8;
const RANDOM_CHARS: usize = 12;

/// Generates 20-character child keys that sort in creation order.
///
/// The first eight characters encode the millisecond timestamp; the remaining
/// twelve are random. Keys generated within the same millisecond reuse the
/// previous random suffix incremented by one, so ordering holds even when the
/// clock does not advance between calls.
pub struct PushKeyGenerator {
    state: Mutex<PushState>,
}

struct PushState {
    last_millis: i64,
    last_random: [u8; RANDOM_CHARS],
}

impl PushKeyGenerator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PushState {
                last_millis: i64::MIN,
                last_random: [0; RANDOM_CHARS],
            }),
        }
    }

    pub fn next_key(&self) -> String {
        self.next_key_at(Utc::now().timestamp_millis())
    }

    pub fn next_key_at(&self, millis: i64) -> String {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // a clock stepping backwards is treated as the same millisecond
        let millis = millis.max(state.last_millis);

        if millis == state.last_millis {
            for digit in state.last_random.iter_mut().rev() {
                if *digit == 63 {
                    *digit = 0;
                } else {
                    *digit += 1;
                    break;
                }
            }
        } else {
            let mut rng = rand::thread_rng();
            for digit in state.last_random.iter_mut() {
                *digit = rng.gen_range(0..64);
            }
        }
        state.last_millis = millis;

        let mut key = [0u8; TIME_CHARS + RANDOM_CHARS];
        let mut remaining = millis.max(0) as u64;
        for slot in key[..TIME_CHARS].iter_mut().rev() {
            *slot = PUSH_CHARS[(remaining % 64) as usize];
            remaining /= 64;
        }
        for (slot, digit) in key[TIME_CHARS..].iter_mut().zip(state.last_random.iter()) {
            *slot = PUSH_CHARS[*digit as usize];
        }

        key.iter().map(|&b| b as char).collect()
    }
}

impl Default for PushKeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}
