//! Per-test recovery state and the failure escalation ladder.
//!
//! The counters are an explicit struct threaded through the run loop rather
//! than ambient fields, so the ladder's transitions can be unit-tested
//! without a device or a model.

use crate::core::types::ErrorKind;

/// Configured ceilings for the recovery ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryLimits {
    /// Failures tolerated before the ladder escalates.
    pub max_retries: u32,
    /// Scroll gestures allowed per escalation sequence.
    pub max_scrolls: u32,
}

/// What the run loop should do after a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStep {
    /// Below the retry ceiling: re-plan and try again.
    Retry,
    /// Element-not-found with scroll budget left: issue a scroll gesture.
    Scroll,
    /// Press the back button once per escalation sequence.
    Back,
    /// Force-stop and relaunch the app once per escalation sequence.
    Relaunch,
    /// Every recovery option exhausted: abort the action loop.
    Abort,
}

/// Mutable per-test recovery counters.
///
/// A successful step resets everything. Each ladder escalation (scroll,
/// back, relaunch) resets the retry counter so the planner gets a full
/// retry budget after the recovery gesture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryState {
    retries: u32,
    scrolls: u32,
    back_tried: bool,
    relaunch_tried: bool,
}

impl RecoveryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all counters after a successful step.
    pub fn on_success(&mut self) {
        *self = Self::default();
    }

    /// Record a failed step and decide the next recovery move.
    pub fn on_failure(&mut self, error_kind: ErrorKind, limits: &RecoveryLimits) -> RecoveryStep {
        self.retries += 1;
        if self.retries < limits.max_retries {
            return RecoveryStep::Retry;
        }

        // Retry budget spent: walk the ladder in fixed order.
        if error_kind == ErrorKind::ElementNotFound && self.scrolls < limits.max_scrolls {
            self.scrolls += 1;
            self.retries = 0;
            return RecoveryStep::Scroll;
        }
        if !self.back_tried {
            self.back_tried = true;
            self.retries = 0;
            return RecoveryStep::Back;
        }
        if !self.relaunch_tried {
            self.relaunch_tried = true;
            self.retries = 0;
            return RecoveryStep::Relaunch;
        }
        RecoveryStep::Abort
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: RecoveryLimits = RecoveryLimits {
        max_retries: 3,
        max_scrolls: 2,
    };

    fn fail_until_escalation(state: &mut RecoveryState, kind: ErrorKind) -> RecoveryStep {
        for _ in 0..LIMITS.max_retries - 1 {
            assert_eq!(state.on_failure(kind, &LIMITS), RecoveryStep::Retry);
        }
        state.on_failure(kind, &LIMITS)
    }

    #[test]
    fn failures_below_threshold_just_retry() {
        let mut state = RecoveryState::new();
        assert_eq!(
            state.on_failure(ErrorKind::Transport, &LIMITS),
            RecoveryStep::Retry
        );
        assert_eq!(
            state.on_failure(ErrorKind::Transport, &LIMITS),
            RecoveryStep::Retry
        );
    }

    #[test]
    fn element_not_found_escalates_to_scroll_first() {
        let mut state = RecoveryState::new();
        let step = fail_until_escalation(&mut state, ErrorKind::ElementNotFound);
        assert_eq!(step, RecoveryStep::Scroll);
    }

    #[test]
    fn scroll_budget_exhausts_then_back_then_relaunch_then_abort() {
        let mut state = RecoveryState::new();
        assert_eq!(
            fail_until_escalation(&mut state, ErrorKind::ElementNotFound),
            RecoveryStep::Scroll
        );
        assert_eq!(
            fail_until_escalation(&mut state, ErrorKind::ElementNotFound),
            RecoveryStep::Scroll
        );
        // Scroll budget is spent: the ladder moves on even for not-found.
        assert_eq!(
            fail_until_escalation(&mut state, ErrorKind::ElementNotFound),
            RecoveryStep::Back
        );
        assert_eq!(
            fail_until_escalation(&mut state, ErrorKind::ElementNotFound),
            RecoveryStep::Relaunch
        );
        assert_eq!(
            fail_until_escalation(&mut state, ErrorKind::ElementNotFound),
            RecoveryStep::Abort
        );
    }

    #[test]
    fn non_not_found_failures_skip_scroll() {
        let mut state = RecoveryState::new();
        assert_eq!(
            fail_until_escalation(&mut state, ErrorKind::Timeout),
            RecoveryStep::Back
        );
        assert_eq!(
            fail_until_escalation(&mut state, ErrorKind::Timeout),
            RecoveryStep::Relaunch
        );
        assert_eq!(
            fail_until_escalation(&mut state, ErrorKind::Timeout),
            RecoveryStep::Abort
        );
    }

    #[test]
    fn escalation_resets_retry_counter() {
        let mut state = RecoveryState::new();
        assert_eq!(
            fail_until_escalation(&mut state, ErrorKind::ElementNotFound),
            RecoveryStep::Scroll
        );
        // A fresh retry budget applies after the scroll.
        assert_eq!(
            state.on_failure(ErrorKind::ElementNotFound, &LIMITS),
            RecoveryStep::Retry
        );
    }

    #[test]
    fn success_resets_everything() {
        let mut state = RecoveryState::new();
        let _ = fail_until_escalation(&mut state, ErrorKind::ElementNotFound);
        let _ = fail_until_escalation(&mut state, ErrorKind::ElementNotFound);
        state.on_success();
        assert_eq!(state, RecoveryState::new());
        // The full ladder is available again.
        assert_eq!(
            fail_until_escalation(&mut state, ErrorKind::ElementNotFound),
            RecoveryStep::Scroll
        );
    }
}
