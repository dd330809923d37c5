use chrono::Utc;
use clap::{error::ErrorKind, CommandFactory, Parser, ValueEnum};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs,
    io::{self, stdin},
    path::Path,
    sync::mpsc::RecvTimeoutError,
    sync::Arc,
    time::Duration,
};
use webbrowser::Browser;

use studyhall::assignment::{
    AnswerSheet, AssignmentKind, AssignmentRecord, Roster, SubmissionStatus,
};
use studyhall::config::{Config, ConfigStore, FileConfigStore};
use studyhall::draft::{DraftStore, StoredDraft};
use studyhall::gateway::{
    spawn_fetch, spawn_submit, AssignmentGateway, GatewayError, GatewayEvent, HttpGateway,
    RosterQuery, SampleGateway, SubmitReceipt, SubmitRequest,
};
use studyhall::runtime::{CrosstermEventSource, Event, EventSource};
use studyhall::workspace::{
    Confirm, ResumePoint, Stage, SubmitBlock, SubmitDecision, Tick, Workspace,
};
use studyhall::TICK_RATE_MS;

mod ui;

/// classwork from the comfort of your terminal
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A terminal workspace for classwork: browse your assignment roster, write essays and take quizzes against a live countdown, and submit without leaving the keyboard."
)]
struct Cli {
    /// base URL of the class server API
    #[clap(short = 'g', long)]
    gateway: Option<String>,

    /// class to list assignments for
    #[clap(short = 'c', long)]
    class: Option<i64>,

    /// only list one kind of assignment
    #[clap(short = 'k', long, value_enum)]
    kind: Option<KindFilter>,

    /// bearer token for the class server
    #[clap(short = 't', long)]
    token: Option<String>,

    /// browse a built-in sample roster instead of a live server
    #[clap(long)]
    sample: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, strum_macros::Display)]
enum KindFilter {
    #[strum(serialize = "essay")]
    Essay,
    #[strum(serialize = "quiz")]
    Quiz,
    #[strum(serialize = "course_work")]
    CourseWork,
}

impl Cli {
    /// Flags win over the saved config; anything not given on the command
    /// line keeps its stored value.
    fn effective_config(&self, stored: Config) -> Config {
        let mut config = stored;
        if let Some(gateway) = &self.gateway {
            config.gateway_url = gateway.clone();
        }
        if let Some(token) = &self.token {
            config.api_token = Some(token.clone());
        }
        if let Some(class) = self.class {
            config.class_id = Some(class);
        }
        if let Some(kind) = self.kind {
            config.kind_filter = Some(kind.to_string());
        }
        config
    }
}

fn roster_query(config: &Config) -> RosterQuery {
    RosterQuery {
        class_id: config.class_id,
        kind: config.kind_filter.clone(),
    }
}

/// Turns an assignment title into a filename: lowercased, runs of
/// non-alphanumerics collapsed to single dashes.
fn export_file_name(title: &str) -> String {
    let mut stem = String::new();
    for c in title.chars() {
        if c.is_alphanumeric() {
            stem.extend(c.to_lowercase());
        } else if !stem.ends_with('-') {
            stem.push('-');
        }
    }
    let stem = stem.trim_matches('-');
    if stem.is_empty() {
        "submission.txt".to_string()
    } else {
        format!("{}.txt", stem)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// One-line status message shown at the bottom of the screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub text: String,
    pub level: NoticeLevel,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: NoticeLevel::Info,
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: NoticeLevel::Success,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: NoticeLevel::Error,
        }
    }
}

/// What the event loop should do after handling a key.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    None,
    Quit,
    Refresh,
    Submit(SubmitRequest),
    OpenFeedback(String),
}

pub struct App {
    pub roster: Roster,
    pub workspace: Option<Workspace>,
    pub confirm: Option<Confirm>,
    pub notice: Option<Notice>,
    pub fetching: bool,
    pub drafts: Option<DraftStore>,
}

impl App {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            roster: Roster::default(),
            workspace: None,
            confirm: None,
            notice: None,
            fetching: false,
            drafts: None,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.save_open_draft();
            return Action::Quit;
        }

        if self.confirm.is_some() {
            return self.handle_confirm_key(key);
        }

        match self.workspace.as_ref().map(|workspace| workspace.stage) {
            None => self.handle_roster_key(key),
            Some(Stage::NotStarted) => self.handle_briefing_key(key),
            Some(Stage::InProgress) => self.handle_editor_key(key),
            Some(Stage::Submitted) | Some(Stage::Graded) => self.handle_closed_key(key),
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                self.confirm = None;
                match self.start_submission() {
                    Some(request) => Action::Submit(request),
                    None => Action::None,
                }
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.confirm = None;
                Action::None
            }
            _ => Action::None,
        }
    }

    fn handle_roster_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => Action::Quit,
            KeyCode::Up | KeyCode::Char('k') => {
                self.roster.select_prev();
                Action::None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.roster.select_next();
                Action::None
            }
            KeyCode::Enter => {
                self.open_selected();
                Action::None
            }
            KeyCode::Char('r') => Action::Refresh,
            _ => Action::None,
        }
    }

    fn handle_briefing_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Char('b') | KeyCode::Enter => {
                self.begin_work();
                Action::None
            }
            KeyCode::Esc => {
                self.close_workspace();
                Action::None
            }
            _ => Action::None,
        }
    }

    fn handle_editor_key(&mut self, key: KeyEvent) -> Action {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            if key.code == KeyCode::Char('s') {
                return self.request_submit();
            }
            return Action::None;
        }
        if key.code == KeyCode::Esc {
            self.close_workspace();
            return Action::None;
        }

        let workspace = match self.workspace.as_mut() {
            Some(workspace) => workspace,
            None => return Action::None,
        };

        match &workspace.assignment.kind {
            AssignmentKind::Quiz { .. } => match key.code {
                KeyCode::Up => workspace.focus_prev(),
                KeyCode::Down => workspace.focus_next(),
                KeyCode::Char('x') => workspace.clear_answer(),
                KeyCode::Char(c) if c.is_ascii_digit() && c != '0' => {
                    workspace.select_option(c as usize - '1' as usize);
                }
                _ => {}
            },
            AssignmentKind::Essay { .. } | AssignmentKind::CourseWork => match key.code {
                KeyCode::Char(c) => workspace.type_char(c),
                KeyCode::Backspace => workspace.backspace(),
                KeyCode::Enter => workspace.newline(),
                _ => {}
            },
        }
        Action::None
    }

    fn handle_closed_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => {
                self.close_workspace();
                Action::None
            }
            KeyCode::Char('o') => {
                let url = self
                    .workspace
                    .as_ref()
                    .and_then(|workspace| workspace.assignment.submission.feedback_url.clone());
                match url {
                    Some(url) => Action::OpenFeedback(url),
                    None => Action::None,
                }
            }
            KeyCode::Char('s') => {
                self.export_submission(Path::new("."));
                Action::None
            }
            _ => Action::None,
        }
    }

    /// Writes the essay text of the open submission to a file under `dir`.
    /// Quizzes have nothing worth keeping, so the key does nothing.
    fn export_submission(&mut self, dir: &Path) {
        let workspace = match self.workspace.as_ref() {
            Some(workspace) => workspace,
            None => return,
        };
        let text = match &workspace.sheet {
            AnswerSheet::Essay(text) => text,
            AnswerSheet::Choices(_) => return,
        };
        let path = dir.join(export_file_name(&workspace.assignment.title));
        self.notice = Some(match fs::write(&path, text) {
            Ok(()) => Notice::success(format!("Saved a copy to {}.", path.display())),
            Err(err) => Notice::error(format!("Could not save a copy: {}", err)),
        });
    }

    fn begin_work(&mut self) {
        if let Some(workspace) = self.workspace.as_mut() {
            workspace.begin(Utc::now());
        }
        // Persist the start instant right away so a crash cannot reset the clock.
        self.save_open_draft();
    }

    fn request_submit(&mut self) -> Action {
        let decision = match self.workspace.as_ref() {
            Some(workspace) => workspace.submit_decision(),
            None => return Action::None,
        };
        match decision {
            SubmitDecision::Blocked(SubmitBlock::EmptyEssay) => {
                self.notice = Some(Notice::error("Please write something before submitting."));
                Action::None
            }
            SubmitDecision::Blocked(SubmitBlock::InFlight) => {
                self.notice = Some(Notice::info("Your work is already being submitted."));
                Action::None
            }
            SubmitDecision::Blocked(SubmitBlock::AlreadyClosed) => Action::None,
            SubmitDecision::NeedsConfirm(confirm) => {
                self.confirm = Some(confirm);
                Action::None
            }
        }
    }

    fn start_submission(&mut self) -> Option<SubmitRequest> {
        let workspace = self.workspace.as_mut()?;
        if workspace.submitting || workspace.is_locked() {
            return None;
        }
        workspace.submission_started();
        Some(SubmitRequest {
            assignment_id: workspace.assignment.id,
            kind: workspace.assignment.kind.wire_name().to_string(),
            sheet: workspace.sheet.clone(),
        })
    }

    /// One clock tick. Returns the submit request when the session just
    /// expired; the countdown latches, so this fires at most once.
    pub fn on_tick(&mut self) -> Option<SubmitRequest> {
        let expired = match self.workspace.as_mut() {
            Some(workspace) => workspace.tick() == Tick::Expired,
            None => return None,
        };

        self.save_open_draft();

        if expired {
            self.confirm = None;
            self.notice = Some(Notice::info("Time's up! Work auto-submitted."));
            return self.start_submission();
        }
        None
    }

    pub fn apply_gateway_event(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::RosterFetched(result) => {
                self.fetching = false;
                match result {
                    Ok(records) => self.apply_roster(records),
                    Err(err) => self.notice = Some(Notice::error(err.to_string())),
                }
            }
            GatewayEvent::SubmitFinished {
                assignment_id,
                auto,
                result,
            } => self.finish_submission(assignment_id, auto, result),
        }
    }

    fn apply_roster(&mut self, records: Vec<AssignmentRecord>) {
        // An instructor can add time mid-session; the refreshed roster
        // carries the new total and the open clock gets the difference.
        if let Some(workspace) = self.workspace.as_mut() {
            let total = records
                .iter()
                .find(|record| record.id == workspace.assignment.id)
                .and_then(|record| record.extra_minutes);
            if let Some(total) = total {
                let granted = total.saturating_sub(workspace.assignment.extra_minutes);
                if granted > 0 {
                    let applied = match workspace.stage {
                        // begin() reads the allowance later; no clock to touch yet.
                        Stage::NotStarted => true,
                        _ => workspace.grant_extension(granted),
                    };
                    if applied {
                        workspace.assignment.extra_minutes = total;
                        self.notice = Some(Notice::success(format!(
                            "Instructor granted {} extra minutes.",
                            granted
                        )));
                    }
                }
            }
        }

        self.roster.replace(records);
    }

    fn finish_submission(
        &mut self,
        assignment_id: i64,
        auto: bool,
        result: Result<SubmitReceipt, GatewayError>,
    ) {
        match result {
            Ok(_) => {
                let sheet = match self.workspace.as_mut() {
                    Some(workspace) if workspace.assignment.id == assignment_id => {
                        workspace.submission_succeeded();
                        Some(workspace.sheet.clone())
                    }
                    _ => None,
                };
                match sheet {
                    Some(sheet) => {
                        self.roster.mark_submitted(assignment_id, sheet);
                        // Accepted work lands back on the roster list.
                        self.workspace = None;
                        self.confirm = None;
                    }
                    None => {
                        if let Some(assignment) = self.roster.find_mut(assignment_id) {
                            assignment.submission.status = SubmissionStatus::Submitted;
                        }
                    }
                }
                if let Some(drafts) = &self.drafts {
                    if let Err(err) = drafts.delete(assignment_id) {
                        log::warn!("could not drop the stored draft: {}", err);
                    }
                }
                let text = if auto {
                    "Time's up! Work auto-submitted."
                } else {
                    "Work submitted successfully!"
                };
                self.notice = Some(Notice::success(text));
            }
            Err(err) => {
                if let Some(workspace) = self.workspace.as_mut() {
                    if workspace.assignment.id == assignment_id {
                        workspace.submission_failed();
                    }
                }
                self.notice = Some(Notice::error(format!(
                    "{}. Your work is safe; press ctrl+s to try again.",
                    err
                )));
            }
        }
    }

    fn open_selected(&mut self) {
        let assignment = match self.roster.selected() {
            Some(assignment) => assignment.clone(),
            None => return,
        };

        let resume = match &self.drafts {
            Some(drafts) => match drafts.load(assignment.id) {
                Ok(stored) => stored.map(ResumePoint::from),
                Err(err) => {
                    log::warn!("could not read the stored draft: {}", err);
                    None
                }
            },
            None => None,
        };

        self.confirm = None;
        self.notice = None;
        self.workspace = Some(Workspace::open(assignment, resume, Utc::now()));
    }

    fn close_workspace(&mut self) {
        self.save_open_draft();
        self.workspace = None;
        self.confirm = None;
    }

    fn save_open_draft(&mut self) {
        let workspace = match self.workspace.as_mut() {
            Some(workspace) => workspace,
            None => return,
        };
        if workspace.is_locked() || !workspace.is_dirty() {
            return;
        }
        let drafts = match &self.drafts {
            Some(drafts) => drafts,
            None => return,
        };

        let draft = StoredDraft {
            assignment_id: workspace.assignment.id,
            started_at: workspace.started_at,
            sheet: workspace.sheet.clone(),
            updated_at: Utc::now(),
        };
        match drafts.save(&draft) {
            Ok(()) => workspace.mark_saved(),
            Err(err) => log::warn!("could not save the draft: {}", err),
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let store = FileConfigStore::new();
    let config = cli.effective_config(store.load());
    if let Err(err) = store.save(&config) {
        log::warn!("could not save the config file: {}", err);
    }

    let gateway: Arc<dyn AssignmentGateway> = if cli.sample {
        Arc::new(SampleGateway::new())
    } else {
        Arc::new(HttpGateway::new(
            &config.gateway_url,
            config.api_token.clone(),
        )?)
    };

    let mut app = App::new();
    app.drafts = match DraftStore::new() {
        Ok(drafts) => Some(drafts),
        Err(err) => {
            log::warn!("drafts are off for this session: {}", err);
            None
        }
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app, gateway, roster_query(&config));

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    gateway: Arc<dyn AssignmentGateway>,
    query: RosterQuery,
) -> Result<(), Box<dyn Error>> {
    let events = CrosstermEventSource::new(Duration::from_millis(TICK_RATE_MS));
    let tx = events.sender();

    app.fetching = true;
    spawn_fetch(gateway.clone(), query.clone(), tx.clone());

    loop {
        terminal.draw(|f| f.render_widget(&*app, f.area()))?;

        let event = match events.recv_timeout(Duration::from_millis(TICK_RATE_MS)) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match event {
            Event::Tick => {
                if let Some(request) = app.on_tick() {
                    spawn_submit(gateway.clone(), request, true, tx.clone());
                }
            }
            Event::Resize => {}
            Event::Gateway(gateway_event) => app.apply_gateway_event(gateway_event),
            Event::Key(key) => match app.handle_key(key) {
                Action::Quit => break,
                Action::Refresh => {
                    app.fetching = true;
                    spawn_fetch(gateway.clone(), query.clone(), tx.clone());
                }
                Action::Submit(request) => {
                    spawn_submit(gateway.clone(), request, false, tx.clone());
                }
                Action::OpenFeedback(url) => {
                    if Browser::is_available() {
                        webbrowser::open(&url).unwrap_or_default();
                    }
                }
                Action::None => {}
            },
        }
    }

    Ok(())
}
