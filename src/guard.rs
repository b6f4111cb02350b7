//! Arbitration between the independent signals that can end a session.
//!
//! Manual submit, timer expiry and focus loss all race to submit. Only the
//! first one observed while the guard is `Active` gets through; the check and
//! the transition happen under one `&mut` borrow, so nothing can interleave
//! between them on the single-threaded event loop.

use crate::assessment::SubmitReason;

/// An event that asks for the session to be submitted
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum Trigger {
    /// Candidate pressed "Submit Test"
    Manual,
    /// Countdown reached zero
    Timeout,
    /// Terminal lost focus (the tab-switch equivalent)
    VisibilityLost,
}

impl Trigger {
    pub fn reason(self) -> SubmitReason {
        match self {
            Trigger::Manual => SubmitReason::Manual,
            Trigger::Timeout => SubmitReason::TimeOver,
            Trigger::VisibilityLost => SubmitReason::TabSwitch,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardState {
    Active,
    Submitting,
    Terminal,
}

/// Tri-state flag admitting at most one submission per session
#[derive(Debug)]
pub struct SubmitGuard {
    state: GuardState,
    fired_by: Option<Trigger>,
}

impl Default for SubmitGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmitGuard {
    pub fn new() -> Self {
        Self {
            state: GuardState::Active,
            fired_by: None,
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == GuardState::Active
    }

    /// The trigger that won the race, if any
    pub fn fired_by(&self) -> Option<Trigger> {
        self.fired_by
    }

    /// Move `Active -> Submitting` and return the reason to submit with.
    /// Every call after the first is a no-op returning `None`.
    pub fn try_fire(&mut self, trigger: Trigger) -> Option<SubmitReason> {
        if self.state != GuardState::Active {
            tracing::debug!(%trigger, state = ?self.state, "trigger ignored");
            return None;
        }

        self.state = GuardState::Submitting;
        self.fired_by = Some(trigger);
        tracing::info!(%trigger, "submission triggered");
        Some(trigger.reason())
    }

    /// Submission resolved (either way); nothing may fire again
    pub fn finish(&mut self) {
        self.state = GuardState::Terminal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Trigger; 3] = [Trigger::Manual, Trigger::Timeout, Trigger::VisibilityLost];

    #[test]
    fn first_trigger_wins() {
        for first in ALL {
            let mut guard = SubmitGuard::new();
            assert_eq!(guard.try_fire(first), Some(first.reason()));
            assert_eq!(guard.state(), GuardState::Submitting);
            assert_eq!(guard.fired_by(), Some(first));

            for later in ALL {
                assert_eq!(guard.try_fire(later), None);
            }
            assert_eq!(guard.fired_by(), Some(first));
        }
    }

    #[test]
    fn every_interleaving_fires_exactly_once() {
        // all orderings of up to 6 signals drawn from the three sources
        let mut sequences: Vec<Vec<Trigger>> = vec![vec![]];
        for _ in 0..6 {
            sequences = sequences
                .into_iter()
                .flat_map(|seq| {
                    ALL.iter().map(move |t| {
                        let mut next = seq.clone();
                        next.push(*t);
                        next
                    })
                })
                .collect();
        }

        for seq in sequences {
            let mut guard = SubmitGuard::new();
            let fired = seq.iter().filter_map(|t| guard.try_fire(*t)).count();
            assert_eq!(fired, 1, "sequence {seq:?}");
        }
    }

    #[test]
    fn terminal_guard_ignores_everything() {
        let mut guard = SubmitGuard::new();
        guard.try_fire(Trigger::VisibilityLost);
        guard.finish();
        assert_eq!(guard.state(), GuardState::Terminal);

        for t in ALL {
            assert_eq!(guard.try_fire(t), None);
        }
    }

    #[test]
    fn trigger_reasons() {
        assert_eq!(Trigger::Manual.reason(), SubmitReason::Manual);
        assert_eq!(Trigger::Timeout.reason(), SubmitReason::TimeOver);
        assert_eq!(Trigger::VisibilityLost.reason(), SubmitReason::TabSwitch);
        assert!(!Trigger::Manual.reason().is_auto());
        assert!(Trigger::Timeout.reason().is_auto());
    }
}
