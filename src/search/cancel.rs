use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::SearchError;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
}

/// Shared cancellation signal, checked by scans once per entry.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// First reason wins; later calls are no-ops.
    pub fn cancel(&self, reason: impl Into<String>) {
        if let Ok(mut slot) = self.state.reason.lock() {
            if slot.is_none() {
                *slot = Some(reason.into());
            }
        }
        self.state.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        if !self.is_cancelled() {
            return None;
        }
        let reason = self.state.reason.lock().ok().and_then(|slot| slot.clone());
        Some(reason.unwrap_or_else(|| "aborted".to_string()))
    }

    pub fn check(&self) -> Result<(), SearchError> {
        match self.reason() {
            Some(reason) => Err(SearchError::Cancelled(reason)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_first_reason() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
        token.cancel("stale: fir");
        token.cancel("stale: firm");
        assert_eq!(
            token.check(),
            Err(SearchError::Cancelled("stale: fir".to_string()))
        );
    }

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel("gone");
        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("gone"));
    }
}
