use crate::timer::Session;

/// Whole seconds left before `expires_at`, or 0 once it has passed.
///
/// A positive sub-second remainder counts as a full second so the display
/// never shows `00:00` while the session is still live.
pub fn remaining_secs(remaining_ms: i64) -> u64 {
    if remaining_ms <= 0 {
        0
    } else {
        ((remaining_ms + 999) / 1000) as u64
    }
}

/// Render seconds as `MM:SS`; minutes are not wrapped into hours
pub fn format_mmss(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Result of one tick of a running countdown
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    Remaining(u64),
    /// Emitted exactly once, on the tick that reaches zero
    Expired,
    /// Countdown already expired or was stopped; the tick is discarded
    Idle,
}

#[derive(Debug)]
pub enum CountdownStart {
    Running(Countdown),
    /// Deadline had already passed at construction; no ticking needed
    Expired,
}

/// Display clock derived from a stored deadline.
///
/// Every tick recomputes from the wall clock, so a suspended process
/// catches up immediately instead of drifting.
#[derive(Debug, Clone)]
pub struct Countdown {
    expires_at: i64,
    remaining_secs: u64,
    running: bool,
}

impl Countdown {
    pub fn start(session: &Session, now_ms: i64) -> CountdownStart {
        let secs = remaining_secs(session.remaining_ms(now_ms));
        if secs == 0 {
            return CountdownStart::Expired;
        }

        CountdownStart::Running(Self {
            expires_at: session.expires_at,
            remaining_secs: secs,
            running: true,
        })
    }

    pub fn tick(&mut self, now_ms: i64) -> Tick {
        if !self.running {
            return Tick::Idle;
        }

        self.remaining_secs = remaining_secs(self.expires_at - now_ms);
        if self.remaining_secs == 0 {
            self.running = false;
            Tick::Expired
        } else {
            Tick::Remaining(self.remaining_secs)
        }
    }

    /// Stop ticking without signalling expiry (session went terminal)
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn display(&self) -> String {
        format_mmss(self.remaining_secs)
    }
}
