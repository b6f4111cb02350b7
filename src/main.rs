pub mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    event::{DisableBracketedPaste, DisableFocusChange, EnableBracketedPaste, EnableFocusChange, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use skilltest::{
    api::{AssessmentApi, HttpApi},
    app_dirs::AppDirs,
    assessment::{AnswerOption, ApplicationId},
    clock::{Clock, SystemClock},
    config::{Config, ConfigStore, FileConfigStore},
    controller::{start_attempt, OpenOutcome, TestController},
    coordinator::{SubmissionCoordinator, SubmitRequest},
    countdown::format_mmss,
    guard::Trigger,
    lock::AttemptLockRegistry,
    runtime::{CrosstermEventSource, EventSource, FixedTicker, Runner, SessionEvent, Ticker},
    session::SessionPhase,
    store::{KvStore, SqliteStore},
    timer::{SessionTimerStore, TimerRead},
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    rc::Rc,
    sync::Arc,
};

/// timed skill-assessment client: one attempt per application, no retakes
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Take a timed multiple-choice skill assessment for a job application. The deadline survives restarts, the test submits itself when time runs out or the terminal loses focus, and a test can never be started twice."
)]
pub struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// base URL of the job-board API
    #[clap(long, global = true)]
    api_url: Option<String>,

    /// bearer token for the API
    #[clap(long, global = true, env = "SKILLTEST_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// path of the local state database (timers and attempt locks)
    #[clap(long, global = true)]
    state_db: Option<PathBuf>,

    /// path of the JSON config file
    #[clap(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// confirm and start the test for an application (only ever once)
    Start { application_id: String },
    /// open the test view for an application that was already started
    Take { application_id: String },
    /// show the local lock and timer state without contacting the API
    Status { application_id: String },
}

impl Cli {
    fn load_config(&self) -> Config {
        let store = match &self.config {
            Some(path) => FileConfigStore::with_path(path),
            None => FileConfigStore::new(),
        };
        let mut config = store.load();
        if let Some(url) = &self.api_url {
            config.api_base_url = url.clone();
        }
        config
    }

    fn open_store(&self) -> Result<SqliteStore, skilltest::error::StoreError> {
        match &self.state_db {
            Some(path) => SqliteStore::open(path),
            None => SqliteStore::new(),
        }
    }
}

/// Shown when leaving is refused while the answers are in flight
const SUBMITTING_NOTICE: &str = "Submitting your answers. Please wait for the result.";

#[derive(Debug, Clone, PartialEq)]
pub enum AppState {
    /// "Start Now" confirmation with the rules
    Confirm,
    /// Questions, or the result once the session is terminal
    Test,
    /// Quit requested while the session is live
    LeaveWarning,
    Unavailable(String),
}

/// What the loop must do after an event
#[derive(Debug, PartialEq)]
pub enum Action {
    Continue,
    Dispatch(SubmitRequest),
    Quit,
}

pub struct App<S: KvStore + Clone, C: Clock + Clone> {
    pub application_id: ApplicationId,
    pub state: AppState,
    pub controller: Option<TestController<S, C>>,
    /// Index of the focused question
    pub cursor: usize,
    pub notice: Option<String>,
    pub duration_ms: i64,
    store: S,
    clock: C,
    api: Arc<dyn AssessmentApi>,
}

impl<S: KvStore + Clone, C: Clock + Clone> App<S, C> {
    pub fn new(application_id: ApplicationId, store: S, clock: C, api: Arc<dyn AssessmentApi>, duration_ms: i64) -> Self {
        Self {
            application_id,
            state: AppState::Confirm,
            controller: None,
            cursor: 0,
            notice: None,
            duration_ms,
            store,
            clock,
            api,
        }
    }

    fn timers(&self) -> SessionTimerStore<S, C> {
        SessionTimerStore::new(self.store.clone(), self.clock.clone())
    }

    pub fn locks(&self) -> AttemptLockRegistry<S> {
        AttemptLockRegistry::new(self.store.clone())
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Entry through `start`: a locked application never reaches the confirm screen
    pub fn gate(&mut self) {
        if self.locks().is_locked(&self.application_id) {
            self.state = AppState::Unavailable(
                "This test has already been started and cannot be retaken.".to_string(),
            );
        }
    }

    /// Candidate pressed "Start Now"
    pub fn confirm_start(&mut self) {
        match start_attempt(&self.locks(), &self.timers(), &self.application_id, self.duration_ms) {
            Ok(_) => self.open(),
            Err(e) => self.state = AppState::Unavailable(e.to_string()),
        }
    }

    /// Open the test view from whatever the store holds right now
    pub fn open(&mut self) {
        match TestController::open(&self.application_id, self.timers(), self.api.as_ref()) {
            OpenOutcome::Ready(controller) => {
                self.controller = Some(controller);
                self.cursor = 0;
                self.state = AppState::Test;
            }
            OpenOutcome::Unavailable(reason) => {
                self.controller = None;
                self.state = AppState::Unavailable(reason.message().to_string());
            }
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.controller
            .as_ref()
            .map(|c| c.phase())
            .unwrap_or(SessionPhase::NotStarted)
    }

    fn question_count(&self) -> usize {
        self.controller
            .as_ref()
            .map(|c| c.session().test.questions.len())
            .unwrap_or(0)
    }

    fn trigger(&mut self, trigger: Trigger) -> Action {
        match self.controller.as_mut().and_then(|c| c.on_trigger(trigger)) {
            Some(request) => Action::Dispatch(request),
            None => Action::Continue,
        }
    }

    pub fn handle(&mut self, event: SessionEvent) -> Action {
        match event {
            SessionEvent::Tick => match self.controller.as_mut().and_then(|c| c.on_tick()) {
                Some(request) => Action::Dispatch(request),
                None => Action::Continue,
            },
            SessionEvent::FocusLost => self.trigger(Trigger::VisibilityLost),
            SessionEvent::FocusGained | SessionEvent::Resize => Action::Continue,
            SessionEvent::Paste => {
                if self.phase() == SessionPhase::Active {
                    self.notice = Some("Copy / paste is disabled during the test.".to_string());
                }
                Action::Continue
            }
            SessionEvent::Submitted(outcome) => {
                if let Some(controller) = self.controller.as_mut() {
                    controller.settle(outcome);
                }
                if self.state == AppState::LeaveWarning {
                    self.state = AppState::Test;
                }
                self.notice = None;
                Action::Continue
            }
            SessionEvent::Key(key) => self.on_key(key),
        }
    }

    fn on_key(&mut self, key: KeyEvent) -> Action {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let quit_chord = ctrl && key.code == KeyCode::Char('c');

        match self.state.clone() {
            AppState::Confirm => match key.code {
                KeyCode::Enter | KeyCode::Char('y') => {
                    self.confirm_start();
                    Action::Continue
                }
                KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('q') => Action::Quit,
                _ if quit_chord => Action::Quit,
                _ => Action::Continue,
            },
            AppState::Unavailable(_) => match key.code {
                KeyCode::Enter | KeyCode::Esc | KeyCode::Char('q') => Action::Quit,
                _ if quit_chord => Action::Quit,
                _ => Action::Continue,
            },
            AppState::LeaveWarning => match key.code {
                KeyCode::Char('y') if self.phase() == SessionPhase::Submitting => {
                    self.state = AppState::Test;
                    self.notice = Some(SUBMITTING_NOTICE.to_string());
                    Action::Continue
                }
                KeyCode::Char('y') => Action::Quit,
                KeyCode::Char('n') | KeyCode::Esc => {
                    self.state = AppState::Test;
                    Action::Continue
                }
                _ => Action::Continue,
            },
            AppState::Test => self.on_test_key(key, ctrl, quit_chord),
        }
    }

    fn on_test_key(&mut self, key: KeyEvent, ctrl: bool, quit_chord: bool) -> Action {
        let live = matches!(self.phase(), SessionPhase::Active | SessionPhase::Submitting);

        if quit_chord || key.code == KeyCode::Esc || (!ctrl && key.code == KeyCode::Char('q')) {
            if self.phase() == SessionPhase::Submitting {
                self.notice = Some(SUBMITTING_NOTICE.to_string());
                return Action::Continue;
            }
            if live {
                self.state = AppState::LeaveWarning;
                return Action::Continue;
            }
            return Action::Quit;
        }

        if !live {
            return match key.code {
                KeyCode::Enter => Action::Quit,
                _ => Action::Continue,
            };
        }

        if ctrl {
            if let KeyCode::Char(c) = key.code {
                if ['v', 'x', 'a', 's', 'p'].contains(&c.to_ascii_lowercase()) {
                    self.notice = Some("Shortcuts are disabled during the test.".to_string());
                }
            }
            return Action::Continue;
        }

        let count = self.question_count();
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.cursor = self.cursor.saturating_sub(1);
                Action::Continue
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.cursor + 1 < count {
                    self.cursor += 1;
                }
                Action::Continue
            }
            KeyCode::Home => {
                self.cursor = 0;
                Action::Continue
            }
            KeyCode::End => {
                self.cursor = count.saturating_sub(1);
                Action::Continue
            }
            KeyCode::Backspace | KeyCode::Delete => {
                if let Some(question_id) = self.current_question_id() {
                    if let Some(controller) = self.controller.as_mut() {
                        controller.clear_answer(question_id);
                    }
                }
                Action::Continue
            }
            KeyCode::Char('s') => self.trigger(Trigger::Manual),
            KeyCode::Char(c) => {
                if let (Some(option), Some(question_id)) = (AnswerOption::from_key(c), self.current_question_id()) {
                    if let Some(controller) = self.controller.as_mut() {
                        controller.select(question_id, option);
                    }
                    self.notice = None;
                }
                Action::Continue
            }
            _ => Action::Continue,
        }
    }

    fn current_question_id(&self) -> Option<i64> {
        self.controller
            .as_ref()
            .and_then(|c| c.session().test.questions.get(self.cursor))
            .map(|q| q.id)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = cli.load_config();

    let _log_guard = match AppDirs::log_dir() {
        Some(dir) => skilltest::logging::init(&dir, "info").ok(),
        None => None,
    };

    let store = Rc::new(cli.open_store()?);

    let (application_id, fresh) = match &cli.command {
        Command::Start { application_id } => (ApplicationId::from(application_id.as_str()), true),
        Command::Take { application_id } => (ApplicationId::from(application_id.as_str()), false),
        Command::Status { application_id } => {
            let id = ApplicationId::from(application_id.as_str());
            println!("{}", status_line(&id, store, SystemClock));
            return Ok(());
        }
    };

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let api: Arc<dyn AssessmentApi> = Arc::new(HttpApi::new(
        &config.api_base_url,
        cli.token.clone(),
        config.request_timeout(),
    )?);
    let coordinator = SubmissionCoordinator::new(api.clone(), config.retry_policy());

    let mut app = App::new(application_id, store, SystemClock, api, config.duration_ms());
    if fresh {
        app.gate();
    } else {
        app.open();
    }

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange, EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let runner = Runner::new(CrosstermEventSource::new(), FixedTicker::new(config.tick_rate()));
    let outcome = start_tui(&mut terminal, &mut app, runner, &coordinator);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableBracketedPaste,
        DisableFocusChange,
        LeaveAlternateScreen,
    )?;
    terminal.show_cursor()?;

    outcome
}

fn start_tui<B: Backend, S: KvStore + Clone, C: Clock + Clone, E: EventSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    app: &mut App<S, C>,
    mut runner: Runner<E, T>,
    coordinator: &SubmissionCoordinator,
) -> Result<(), Box<dyn Error>> {
    terminal.draw(|f| ui(app, f))?;

    loop {
        match app.handle(runner.step()) {
            Action::Continue => {}
            Action::Dispatch(request) => runner.dispatch(coordinator, request),
            Action::Quit => break,
        }
        terminal.draw(|f| ui(app, f))?;
    }

    Ok(())
}

fn ui<S: KvStore + Clone, C: Clock + Clone>(app: &App<S, C>, f: &mut Frame) {
    ui::screen::current_screen::<S, C>(&app.state).render(app, f);
}

/// One-line summary of the local state for an application
fn status_line<S: KvStore, C: Clock>(application_id: &ApplicationId, store: S, clock: C) -> String {
    let locks = AttemptLockRegistry::new(&store);
    let locked = locks.is_locked(application_id);
    let timers = SessionTimerStore::new(&store, &clock);

    let timer = match timers.read(application_id) {
        TimerRead::Active(session) => format_mmss(skilltest::countdown::remaining_secs(
            session.remaining_ms(clock.now_ms()),
        )),
        TimerRead::Expired(_) => "expired".to_string(),
        TimerRead::NotFound => "none".to_string(),
        TimerRead::Invalid => "invalid".to_string(),
    };

    format!(
        "application {application_id}: {} · timer {timer}",
        if locked { "locked" } else { "not started" }
    )
}
