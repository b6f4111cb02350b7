use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyEvent, KeyEventKind};

use crate::coordinator::{SubmissionCoordinator, SubmitOutcome, SubmitRequest};

/// Unified event type consumed by the test view's loop
#[derive(Debug)]
pub enum SessionEvent {
    Key(KeyEvent),
    /// Terminal lost focus: the candidate switched away
    FocusLost,
    FocusGained,
    /// Bracketed paste; blocked during a test
    Paste,
    Resize,
    Tick,
    /// A dispatched submission came back from the worker thread
    Submitted(SubmitOutcome),
}

/// Source of session events (keyboard, focus, worker results)
pub trait EventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<SessionEvent, RecvTimeoutError>;

    /// Handle for worker threads to post events back into the loop
    fn sender(&self) -> Sender<SessionEvent>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    tx: Sender<SessionEvent>,
    rx: Receiver<SessionEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let input_tx = tx.clone();

        std::thread::spawn(move || loop {
            let evt = match event::read() {
                Ok(CtEvent::Key(key)) if key.kind != KeyEventKind::Release => Some(SessionEvent::Key(key)),
                Ok(CtEvent::FocusLost) => Some(SessionEvent::FocusLost),
                Ok(CtEvent::FocusGained) => Some(SessionEvent::FocusGained),
                Ok(CtEvent::Paste(_)) => Some(SessionEvent::Paste),
                Ok(CtEvent::Resize(_, _)) => Some(SessionEvent::Resize),
                Ok(_) => None,
                Err(_) => break,
            };

            if let Some(evt) = evt {
                if input_tx.send(evt).is_err() {
                    break;
                }
            }
        });

        Self { tx, rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<SessionEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    fn sender(&self) -> Sender<SessionEvent> {
        self.tx.clone()
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    tx: Sender<SessionEvent>,
    rx: Receiver<SessionEvent>,
}

impl TestEventSource {
    /// Returns the source and a sender for scripting events into it
    pub fn new() -> (Self, Sender<SessionEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: tx.clone(), rx }, tx)
    }
}

impl EventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<SessionEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    fn sender(&self) -> Sender<SessionEvent> {
        self.tx.clone()
    }
}

/// Runner that advances the loop one event/tick at a time.
///
/// A tick that has come due is yielded before any queued input, so a busy
/// input stream can never starve the countdown.
pub struct Runner<E: EventSource, T: Ticker> {
    event_source: E,
    ticker: T,
    last_tick: Instant,
}

impl<E: EventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
            last_tick: Instant::now(),
        }
    }

    pub fn step(&mut self) -> SessionEvent {
        let interval = self.ticker.interval();
        let elapsed = self.last_tick.elapsed();
        if elapsed >= interval {
            self.last_tick = Instant::now();
            return SessionEvent::Tick;
        }

        match self.event_source.recv_timeout(interval - elapsed) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                self.last_tick = Instant::now();
                SessionEvent::Tick
            }
        }
    }

    /// Run the one allowed submission on a worker thread; its outcome comes
    /// back through the loop as [`SessionEvent::Submitted`].
    pub fn dispatch(&self, coordinator: &SubmissionCoordinator, request: SubmitRequest) {
        let coordinator = coordinator.clone();
        let tx = self.event_source.sender();
        std::thread::spawn(move || {
            let outcome = coordinator.dispatch(&request);
            let _ = tx.send(SessionEvent::Submitted(outcome));
        });
    }
}
