//! Server transaction IDs.

use std::sync::atomic::{AtomicU32, Ordering};

/// Hands out the `ServerTransactionID` stamped on every response
/// envelope: strictly increasing, no duplicates, no gaps, starting at
/// 1. One atomic increment per call; this sits on the hot path of
/// every response.
///
/// Constructed once at startup and shared by handle, not held in a
/// global static.
#[derive(Debug, Default)]
pub struct TransactionSequencer {
    counter: AtomicU32,
}

impl TransactionSequencer {
    pub fn new() -> Self {
        Self {
            counter: AtomicU32::new(0),
        }
    }

    pub fn next(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_at_one_and_increments() {
        let seq = TransactionSequencer::new();
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        assert_eq!(seq.next(), 3);
    }

    #[test]
    fn concurrent_callers_get_a_contiguous_range() {
        const CALLERS: usize = 8;
        const PER_CALLER: usize = 1250;

        let seq = Arc::new(TransactionSequencer::new());
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let seq = Arc::clone(&seq);
                thread::spawn(move || {
                    (0..PER_CALLER).map(|_| seq.next()).collect::<Vec<u32>>()
                })
            })
            .collect();

        let mut all: Vec<u32> = Vec::with_capacity(CALLERS * PER_CALLER);
        for handle in handles {
            let ids = handle.join().expect("caller thread panicked");
            // Each caller individually observes strictly increasing IDs.
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            all.extend(ids);
        }

        all.sort_unstable();
        let expected: Vec<u32> = (1..=(CALLERS * PER_CALLER) as u32).collect();
        assert_eq!(all, expected, "IDs must form a gapless ascending range");
    }
}
