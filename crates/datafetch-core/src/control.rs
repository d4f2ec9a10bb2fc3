//! Fetch control: per-key leases and abort tokens.
//!
//! Every `fetch` holds the lease of its record key for the whole
//! submit/poll/download sequence, so two tasks in the same process never act
//! on one record at once. The registry also hands out an abort token per key;
//! a caller (or a timer) can trip it to stop a poll wait or a transfer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Error returned when a poll wait or a transfer is stopped by its abort token.
#[derive(Debug)]
pub struct FetchAborted;

impl std::fmt::Display for FetchAborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fetch aborted")
    }
}

impl std::error::Error for FetchAborted {}

/// Cloneable cancellation flag checked by blocking points (poll sleep, curl write callback).
#[derive(Debug, Clone, Default)]
pub struct AbortToken(Arc<AtomicBool>);

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Trip the token once `after` has elapsed. Must be called inside a tokio runtime.
    pub fn cancel_after(&self, after: Duration) -> tokio::task::JoinHandle<()> {
        let token = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            tracing::debug!(?after, "abort token timed out");
            token.abort();
        })
    }

    /// Resolves once the token trips.
    pub async fn cancelled(&self) {
        while !self.is_aborted() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Sleep for `total`, waking early if the token trips. Returns Err if aborted.
    pub async fn sleep(&self, total: Duration) -> Result<(), FetchAborted> {
        const SLICE: Duration = Duration::from_millis(100);
        let mut left = total;
        while !left.is_zero() {
            if self.is_aborted() {
                return Err(FetchAborted);
            }
            let step = left.min(SLICE);
            tokio::time::sleep(step).await;
            left = left.saturating_sub(step);
        }
        if self.is_aborted() {
            return Err(FetchAborted);
        }
        Ok(())
    }
}

/// Shared registry of record key -> (lease, abort token).
#[derive(Default)]
pub struct FetchControl {
    leases: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    tokens: Mutex<HashMap<String, AbortToken>>,
}

/// Held while a key is being fetched. Dropping it releases the key, and
/// forgets the key entirely once nobody else is waiting on it.
#[must_use]
pub struct KeyLease<'a> {
    control: &'a FetchControl,
    key: String,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for KeyLease<'_> {
    fn drop(&mut self) {
        // Under the map lock no `acquire` can clone the entry in between.
        let mut leases = self.control.leases.lock().unwrap_or_else(|e| e.into_inner());
        self.guard.take();
        if leases
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            leases.remove(&self.key);
        }
    }
}

/// Keeps an abort token reachable through `request_abort`; unregisters on drop,
/// including when the fetch future is dropped mid-flight.
#[must_use]
pub struct Registration<'a> {
    control: &'a FetchControl,
    key: String,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.control.unregister(&self.key);
    }
}

impl FetchControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn acquire(&self, key: &str) -> KeyLease<'_> {
        let lock = {
            let mut leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(leases.entry(key.to_string()).or_default())
        };
        KeyLease {
            control: self,
            key: key.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Register `token` for `key` so `request_abort` can reach it, until the
    /// returned guard is dropped.
    pub fn register(&self, key: &str, token: AbortToken) -> Registration<'_> {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), token);
        Registration {
            control: self,
            key: key.to_string(),
        }
    }

    fn unregister(&self, key: &str) {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    /// Trip the abort token of an in-flight fetch. Returns false if `key` is not running.
    pub fn request_abort(&self, key: &str) -> bool {
        match self
            .tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
        {
            Some(token) => {
                token.abort();
                true
            }
            None => false,
        }
    }
}
