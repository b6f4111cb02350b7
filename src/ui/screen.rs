use ratatui::Frame;
use skilltest::{clock::Clock, store::KvStore};

use crate::{
    ui::{render_confirm, render_leave_warning, render_unavailable},
    App, AppState,
};

/// A UI Screen boundary: responsible for rendering one app state
pub trait Screen<S: KvStore + Clone, C: Clock + Clone> {
    fn render(&self, app: &App<S, C>, f: &mut Frame);
}

/// "Start Now" confirmation
pub struct ConfirmScreen;

impl<S: KvStore + Clone, C: Clock + Clone> Screen<S, C> for ConfirmScreen {
    fn render(&self, app: &App<S, C>, f: &mut Frame) {
        let area = f.area();
        render_confirm(app.duration_ms, app.now_ms(), area, f.buffer_mut());
    }
}

/// Questions while live, the outcome once terminal
pub struct TestScreen;

impl<S: KvStore + Clone, C: Clock + Clone> Screen<S, C> for TestScreen {
    fn render(&self, app: &App<S, C>, f: &mut Frame) {
        f.render_widget(app, f.area());
    }
}

/// Test view with the leave prompt on top
pub struct LeaveWarningScreen;

impl<S: KvStore + Clone, C: Clock + Clone> Screen<S, C> for LeaveWarningScreen {
    fn render(&self, app: &App<S, C>, f: &mut Frame) {
        let area = f.area();
        f.render_widget(app, area);
        render_leave_warning(area, f.buffer_mut());
    }
}

pub struct UnavailableScreen(String);

impl<S: KvStore + Clone, C: Clock + Clone> Screen<S, C> for UnavailableScreen {
    fn render(&self, _app: &App<S, C>, f: &mut Frame) {
        let area = f.area();
        render_unavailable(&self.0, area, f.buffer_mut());
    }
}

/// Helper to construct the appropriate screen for the current state
pub fn current_screen<S: KvStore + Clone, C: Clock + Clone>(state: &AppState) -> Box<dyn Screen<S, C>> {
    match state {
        AppState::Confirm => Box::new(ConfirmScreen),
        AppState::Test => Box::new(TestScreen),
        AppState::LeaveWarning => Box::new(LeaveWarningScreen),
        AppState::Unavailable(message) => Box::new(UnavailableScreen(message.clone())),
    }
}
