//! Cooperative shutdown signal (§4.F graceful stop).
//!
//! Grounded on `casparian_worker/src/cancel.rs`'s `CancellationToken`: an
//! `Arc<AtomicBool>`, cheap to clone and share between the reserve/build
//! loop and whatever holds the shutdown handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}
