//! Per-account mutual exclusion.
//!
//! RULE: at most one scoring call trains or decodes a given account's
//! model at a time. Engines that run on separate threads (each with its
//! own store connection) share one `AccountLocks` through an `Arc` and
//! hold the card's lock for the whole scoring call.
//!
//! A slot lives only while some call holds or waits on it; the last
//! holder removes it, so the registry does not grow with every card seen.

use dashmap::DashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct AccountLocks {
    slots: DashMap<String, Arc<Mutex<()>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock slot for a card, created on first use.
    pub fn slot(&self, card_number: &str) -> Arc<Mutex<()>> {
        self.slots
            .entry(card_number.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `f` while holding the card's lock.
    pub fn with_lock<T>(&self, card_number: &str, f: impl FnOnce() -> T) -> T {
        let slot = self.slot(card_number);
        let result = {
            // A poisoned slot guards no data, so it is still usable.
            let _guard = slot.lock().unwrap_or_else(|e| e.into_inner());
            f()
        };
        self.release(card_number, &slot);
        result
    }

    /// Drop the card's slot if only the registry and `slot` still hold it.
    /// The check runs under the shard lock, so no caller can pick the slot
    /// up between the count and the removal.
    fn release(&self, card_number: &str, slot: &Arc<Mutex<()>>) {
        self.slots.remove_if(card_number, |_, current| {
            Arc::ptr_eq(current, slot) && Arc::strong_count(current) == 2
        });
    }

    /// Cards with a live slot.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
        time::Duration,
    };

    #[test]
    fn same_card_shares_one_slot() {
        let locks = AccountLocks::new();
        let a = locks.slot("4111");
        let b = locks.slot("4111");
        let c = locks.slot("5500");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn calls_on_one_card_never_overlap() {
        let locks = Arc::new(AccountLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    locks.with_lock("4111", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1, "Two calls held one card at once");
    }

    #[test]
    fn registry_empties_once_calls_finish() {
        let locks = Arc::new(AccountLocks::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let locks = Arc::clone(&locks);
                thread::spawn(move || {
                    let card = format!("card-{}", i % 4);
                    for _ in 0..10 {
                        locks.with_lock(&card, || thread::sleep(Duration::from_micros(50)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert!(locks.is_empty(), "{} slots left behind", locks.len());
    }

    #[test]
    fn held_slot_survives_another_callers_release() {
        let locks = AccountLocks::new();
        let outside = locks.slot("4111");
        locks.with_lock("4111", || ());
        assert_eq!(locks.len(), 1);

        drop(outside);
        locks.with_lock("4111", || ());
        assert!(locks.is_empty());
    }
}
