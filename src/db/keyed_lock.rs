//! Per-loan async locks.
//!
//! All mutations of one loan are funneled through its lock so that the store
//! commit and the event publish for a transition appear as one step to every
//! other task. Cross-process safety comes from the store's CAS guards; this
//! map removes in-process interleavings.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// A map of `loan_id -> async mutex`, created on first use.
///
/// Entries are never removed; the set of loans a process touches is bounded
/// by its working set and each entry is a few pointers.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting if another task holds it.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().expect("keyed lock map poisoned");
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}
