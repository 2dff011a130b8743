use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Set by the host when it has given up on a run. Clones share the flag.
///
/// Once set, the gate dispatches nothing more for that run and a run that
/// has not started yet is skipped.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_see_the_abort() {
        let signal = AbortSignal::new();
        let seen_by_worker = signal.clone();
        assert!(!seen_by_worker.is_aborted());
        signal.abort();
        assert!(seen_by_worker.is_aborted());
    }
}
