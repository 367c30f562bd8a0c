//! Shared first-error-wins fault register.
//!
//! Every task of a swap holds the same [`ErrorSignal`]. The first task that
//! hits a fault deposits its error; later deposits are dropped. Any task can
//! inspect the slot at any time without removing the error, so no observer
//! has to put it back for the others.

use crate::error::SwapError;
use std::sync::OnceLock;

/// Single-slot, write-once error cell shared by all swap tasks
#[derive(Debug, Default)]
pub struct ErrorSignal {
    slot: OnceLock<SwapError>,
}

impl ErrorSignal {
    /// Create an empty signal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposit an error
    ///
    /// Returns `true` if this error now occupies the slot, `false` if an
    /// earlier error was already retained (the new one is dropped).
    pub fn raise(&self, err: SwapError) -> bool {
        match self.slot.set(err) {
            Ok(()) => true,
            Err(dropped) => {
                tracing::debug!("Error signal already raised, dropping: {}", dropped);
                false
            }
        }
    }

    /// Whether any task has deposited an error
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Borrow the retained error, if any
    #[must_use]
    pub fn get(&self) -> Option<&SwapError> {
        self.slot.get()
    }

    /// Clone the retained error, if any
    #[must_use]
    pub fn error(&self) -> Option<SwapError> {
        self.slot.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_empty_signal() {
        let signal = ErrorSignal::new();
        assert!(!signal.is_raised());
        assert!(signal.get().is_none());
        assert!(signal.error().is_none());
    }

    #[test]
    fn test_first_error_wins() {
        let signal = ErrorSignal::new();
        assert!(signal.raise(SwapError::InvalidBlockSize(0)));
        assert!(!signal.raise(SwapError::InvalidFileName));

        assert!(matches!(signal.get(), Some(SwapError::InvalidBlockSize(0))));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let signal = ErrorSignal::new();
        signal.raise(SwapError::Task("sink panicked".into()));

        for _ in 0..3 {
            assert!(signal.is_raised());
            assert!(matches!(signal.error(), Some(SwapError::Task(_))));
        }
    }

    #[test]
    fn test_concurrent_raise_retains_exactly_one() {
        let signal = Arc::new(ErrorSignal::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let signal = signal.clone();
                std::thread::spawn(move || signal.raise(SwapError::InvalidBlockSize(i)))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert!(signal.is_raised());
    }
}
