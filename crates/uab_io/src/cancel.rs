use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared flag checked by bulk operations between units of work
///
/// Cancelling never interrupts an object or entry that is already being processed;
/// work completed before the check stays intact.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
