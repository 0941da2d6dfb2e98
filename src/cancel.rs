//! Cooperative cancellation shared between racing branches.
//!
//! A token is cancelled when its own flag is set, when its deadline passes, or
//! when any ancestor it was derived from is cancelled. Searches poll the token
//! at candidate-generation boundaries; nothing is pre-empted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cross-platform wall-clock deadline
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    #[cfg(not(target_arch = "wasm32"))]
    start: std::time::Instant,
    #[cfg(target_arch = "wasm32")]
    start_ms: f64,
    limit_ms: u64,
}

impl Deadline {
    pub fn after_ms(limit_ms: u64) -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            start: std::time::Instant::now(),
            #[cfg(target_arch = "wasm32")]
            start_ms: js_sys::Date::now(),
            limit_ms,
        }
    }

    fn elapsed_ms(&self) -> f64 {
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.start.elapsed().as_secs_f64() * 1000.0
        }
        #[cfg(target_arch = "wasm32")]
        {
            js_sys::Date::now() - self.start_ms
        }
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed_ms() >= self.limit_ms as f64
    }
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    parent: Option<CancelToken>,
    deadline: Option<Deadline>,
}

/// Cheaply clonable cancellation signal. Clones share one flag; [`child`]
/// creates a new flag linked to this one.
///
/// [`child`]: CancelToken::child
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<Inner>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A root token that also cancels itself once `limit_ms` has elapsed.
    pub fn with_deadline(limit_ms: u64) -> Self {
        CancelToken(Arc::new(Inner {
            deadline: Some(Deadline::after_ms(limit_ms)),
            ..Inner::default()
        }))
    }

    /// A token cancelled by its own flag or by anything that cancels `self`.
    /// Cancelling the child leaves the parent untouched.
    pub fn child(&self) -> Self {
        CancelToken(Arc::new(Inner {
            parent: Some(self.clone()),
            ..Inner::default()
        }))
    }

    /// A child that also cancels itself once `limit_ms` has elapsed.
    pub fn child_with_deadline(&self, limit_ms: u64) -> Self {
        CancelToken(Arc::new(Inner {
            parent: Some(self.clone()),
            deadline: Some(Deadline::after_ms(limit_ms)),
            ..Inner::default()
        }))
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.0.cancelled.load(Ordering::Acquire) {
            return true;
        }
        if self.0.deadline.is_some_and(|d| d.is_expired()) {
            self.cancel();
            return true;
        }
        self.0.parent.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}
