//! Interrupt Controller (C10).
//!
//! Polls the terminal for an ESC keypress without blocking the
//! model/tool loop. The orchestrator checks [`InterruptController::poll`]
//! between streaming chunks and between tool-call waves; once tripped,
//! `pending()` stays true until the orchestrator calls
//! [`InterruptController::acknowledge`], at which point a user-role
//! interrupt message is injected into the session and the current turn
//! winds down cooperatively rather than being killed mid-tool-call.

use crossterm::event::{self, Event, KeyCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared, cheaply cloneable interrupt flag. `Arc` + `AtomicBool` rather
/// than a `Mutex` since the only operations are "is it set" and "set it".
#[derive(Clone, Default)]
pub struct InterruptController {
    flag: Arc<AtomicBool>,
}

impl InterruptController {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Non-blocking poll of the terminal for a pending ESC keypress.
    /// Returns immediately (`timeout` bounds how long to wait for an
    /// event before giving up, not how long to block); safe to call
    /// once per streamed chunk without perceptibly slowing the loop.
    pub fn poll(&self, timeout: Duration) -> crate::Result<bool> {
        if event::poll(timeout).map_err(crate::CoreError::Io)? {
            if let Event::Key(key) = event::read().map_err(crate::CoreError::Io)? {
                if key.code == KeyCode::Esc {
                    self.flag.store(true, Ordering::SeqCst);
                }
            }
        }
        Ok(self.flag.load(Ordering::SeqCst))
    }

    pub fn pending(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Consume the pending interrupt, returning whether one was set.
    pub fn acknowledge(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }

    /// Test/programmatic hook: trip the flag without going through the
    /// terminal (used by non-interactive callers and tests).
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear() {
        let ctl = InterruptController::new();
        assert!(!ctl.pending());
    }

    #[test]
    fn trigger_sets_pending() {
        let ctl = InterruptController::new();
        ctl.trigger();
        assert!(ctl.pending());
    }

    #[test]
    fn acknowledge_clears_and_reports_prior_state() {
        let ctl = InterruptController::new();
        ctl.trigger();
        assert!(ctl.acknowledge());
        assert!(!ctl.pending());
        assert!(!ctl.acknowledge());
    }

    #[test]
    fn clone_shares_the_same_flag() {
        let ctl = InterruptController::new();
        let clone = ctl.clone();
        clone.trigger();
        assert!(ctl.pending());
    }
}
