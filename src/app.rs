use std::io::{self, Stdout};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use crossterm::cursor;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing::{debug, info, trace};

use crate::exec::{Executor, JobEvent, JobOutcome};
use crate::filter::{LabelMatcher, SkimLabelMatcher, project};
use crate::jobs::{JobId, JobRegistry};
use crate::logs::{LogPanes, MAX_LOG_LINES, Stream};
use crate::model::Command;
use crate::nav::{Intent, Navigator, ScrollCommand};
use crate::reconcile::{RefreshRates, StatusUpdate, spawn_status_loop};
use crate::ui;

const EVENT_QUEUE_CAPACITY: usize = 1024;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize,
    Job(JobEvent),
    Status(StatusUpdate),
}

impl From<JobEvent> for AppEvent {
    fn from(event: JobEvent) -> Self {
        AppEvent::Job(event)
    }
}

impl From<StatusUpdate> for AppEvent {
    fn from(update: StatusUpdate) -> Self {
        AppEvent::Status(update)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiAction {
    None,
    Quit,
    Run(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitDisplay {
    Idle,
    Running {
        label: String,
        started: DateTime<Local>,
    },
    Finished {
        label: String,
        outcome: JobOutcome,
    },
}

impl ExitDisplay {
    pub fn label(&self) -> Option<&str> {
        match self {
            ExitDisplay::Idle => None,
            ExitDisplay::Running { label, .. } | ExitDisplay::Finished { label, .. } => {
                Some(label)
            }
        }
    }
}

pub fn run_tui(commands: Vec<Command>, rates: RefreshRates) -> Result<()> {
    let (tx, rx) = mpsc::sync_channel::<AppEvent>(EVENT_QUEUE_CAPACITY);
    let registry = Arc::new(JobRegistry::new());
    let executor = Executor::new(Arc::clone(&registry), tx.clone());
    let _status_loop = spawn_status_loop(Arc::clone(&registry), rates, tx.clone())?;

    let mut terminal = init_terminal()?;
    if let Err(err) = spawn_input_reader(tx) {
        let _ = restore_terminal(&mut terminal);
        return Err(err);
    }

    let mut app = AppState::new(commands);
    let result = run_loop(&mut terminal, &mut app, &rx, &executor);
    let restored = restore_terminal(&mut terminal);

    let running = registry.snapshot().running;
    if running > 0 {
        info!(running, "exiting with jobs still running");
    }
    result.and(restored)
}

fn init_terminal() -> Result<TuiTerminal> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("failed to create terminal")
}

fn restore_terminal(terminal: &mut TuiTerminal) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")
}

fn spawn_input_reader(events: SyncSender<AppEvent>) -> Result<()> {
    thread::Builder::new()
        .name("input".to_string())
        .spawn(move || {
            loop {
                let forwarded = match event::read() {
                    Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                        events.send(AppEvent::Key(key))
                    }
                    Ok(Event::Resize(_, _)) => events.send(AppEvent::Resize),
                    Ok(_) => continue,
                    Err(err) => {
                        debug!(error = %err, "terminal input closed");
                        break;
                    }
                };
                if forwarded.is_err() {
                    break;
                }
            }
        })
        .context("failed to start input thread")?;
    Ok(())
}

fn run_loop(
    terminal: &mut TuiTerminal,
    app: &mut AppState,
    events: &Receiver<AppEvent>,
    executor: &Executor<AppEvent>,
) -> Result<()> {
    loop {
        terminal.draw(|frame| ui::draw(frame, app))?;

        let Ok(event) = events.recv() else {
            return Ok(());
        };
        if dispatch(app, executor, event) == UiAction::Quit {
            return Ok(());
        }
        // Whatever piled up while we were busy is folded into a single redraw.
        while let Ok(event) = events.try_recv() {
            if dispatch(app, executor, event) == UiAction::Quit {
                return Ok(());
            }
        }
    }
}

fn dispatch(app: &mut AppState, executor: &Executor<AppEvent>, event: AppEvent) -> UiAction {
    match app.handle_event(event) {
        UiAction::Run(index) => {
            if let Some(command) = app.commands.get(index) {
                executor.spawn(command);
            }
            UiAction::None
        }
        other => other,
    }
}

pub struct AppState {
    pub(crate) commands: Vec<Command>,
    pub(crate) visible: Vec<usize>,
    pub(crate) selected: usize,
    pub(crate) list_viewport: usize,
    pub(crate) nav: Navigator,
    pub(crate) query: String,
    pub(crate) query_cursor: usize,
    pub(crate) status: String,
    pub(crate) panes: LogPanes,
    pub(crate) exit: ExitDisplay,
    matcher: Box<dyn LabelMatcher>,
}

impl AppState {
    pub fn new(commands: Vec<Command>) -> Self {
        Self::with_matcher(commands, Box::new(SkimLabelMatcher::default()))
    }

    pub fn with_matcher(commands: Vec<Command>, matcher: Box<dyn LabelMatcher>) -> Self {
        let visible = (0..commands.len()).collect();
        Self {
            commands,
            visible,
            selected: 0,
            list_viewport: 0,
            nav: Navigator::default(),
            query: String::new(),
            query_cursor: 0,
            status: "0 processes running".to_string(),
            panes: LogPanes::new(MAX_LOG_LINES),
            exit: ExitDisplay::Idle,
            matcher,
        }
    }

    pub fn handle_event(&mut self, event: AppEvent) -> UiAction {
        match event {
            AppEvent::Key(key) => self.on_key(key),
            AppEvent::Resize => UiAction::None,
            AppEvent::Job(event) => {
                self.on_job_event(event);
                UiAction::None
            }
            AppEvent::Status(update) => {
                self.on_status(update);
                UiAction::None
            }
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) -> UiAction {
        match self.nav.on_key(key) {
            Intent::Ignore | Intent::Focus(_) => UiAction::None,
            Intent::Quit => UiAction::Quit,
            Intent::Scroll(stream, command) => {
                self.scroll_pane(stream, command);
                UiAction::None
            }
            Intent::List(key) => self.on_list_key(key),
            Intent::FilterStarted => {
                self.query.clear();
                self.query_cursor = 0;
                self.status = "searching:".to_string();
                UiAction::None
            }
            Intent::FilterEdit(key) => {
                self.on_query_key(key);
                UiAction::None
            }
            Intent::FilterSubmitted => {
                let query = std::mem::take(&mut self.query);
                self.query_cursor = 0;
                if self.visible.is_empty() {
                    self.apply_filter("");
                }
                self.status = format!("searched: {query}");
                UiAction::None
            }
            Intent::FilterCanceled => {
                let query = std::mem::take(&mut self.query);
                self.query_cursor = 0;
                self.status = format!("canceled search: {query}");
                UiAction::None
            }
        }
    }

    pub fn on_job_event(&mut self, event: JobEvent) {
        match event {
            JobEvent::Started { job, label } => {
                // Ids grow monotonically, so the newest launch always wins the panes.
                if self.panes.owner().is_none_or(|owner| job > owner) {
                    self.panes.begin(job);
                    self.exit = ExitDisplay::Running {
                        label,
                        started: Local::now(),
                    };
                } else {
                    debug!(%job, "job started behind the foreground job");
                }
            }
            JobEvent::Line { job, stream, line } => {
                if !self.panes.append(job, stream, line) {
                    trace!(%job, ?stream, "dropped line from background job");
                }
            }
            JobEvent::Finished {
                job,
                label,
                outcome,
            } => {
                if self.is_foreground(job) {
                    self.exit = ExitDisplay::Finished { label, outcome };
                }
            }
        }
    }

    pub fn on_status(&mut self, update: StatusUpdate) {
        if !self.nav.is_filtering() {
            self.status = update.status_text();
        }
        if update.follow_output {
            self.panes.follow_output();
        }
    }

    pub fn visible_commands(&self) -> impl Iterator<Item = &Command> {
        self.visible.iter().map(|index| &self.commands[*index])
    }

    fn is_foreground(&self, job: JobId) -> bool {
        self.panes.owner() == Some(job)
    }

    fn scroll_pane(&mut self, stream: Stream, command: ScrollCommand) {
        let pane = self.panes.pane_mut(stream);
        match command {
            ScrollCommand::LineUp => pane.scroll_by(-1),
            ScrollCommand::LineDown => pane.scroll_by(1),
            ScrollCommand::PageUp => pane.page_up(),
            ScrollCommand::PageDown => pane.page_down(),
            ScrollCommand::Start => pane.scroll_to_start(),
            ScrollCommand::End => pane.scroll_to_end(),
        }
    }

    fn on_list_key(&mut self, key: KeyEvent) -> UiAction {
        match key.code {
            KeyCode::Enter => match self.visible.get(self.selected) {
                Some(index) => UiAction::Run(*index),
                None => UiAction::None,
            },
            KeyCode::Up => {
                self.move_selection(-1);
                UiAction::None
            }
            KeyCode::Down => {
                self.move_selection(1);
                UiAction::None
            }
            KeyCode::Char('k') if key.modifiers.is_empty() => {
                self.move_selection(-1);
                UiAction::None
            }
            KeyCode::Char('j') if key.modifiers.is_empty() => {
                self.move_selection(1);
                UiAction::None
            }
            KeyCode::PageUp => {
                self.step_selection(-(self.list_page() as isize));
                UiAction::None
            }
            KeyCode::PageDown => {
                self.step_selection(self.list_page() as isize);
                UiAction::None
            }
            KeyCode::Home => {
                self.selected = 0;
                UiAction::None
            }
            KeyCode::End => {
                self.selected = self.visible.len().saturating_sub(1);
                UiAction::None
            }
            _ => UiAction::None,
        }
    }

    fn on_query_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Backspace => {
                if self.query_cursor > 0 && remove_char_at(&mut self.query, self.query_cursor - 1) {
                    self.query_cursor -= 1;
                    self.refresh_filter();
                }
            }
            KeyCode::Delete => {
                if remove_char_at(&mut self.query, self.query_cursor) {
                    self.refresh_filter();
                }
            }
            KeyCode::Left => {
                self.query_cursor = self.query_cursor.saturating_sub(1);
            }
            KeyCode::Right => {
                if self.query_cursor < self.query.chars().count() {
                    self.query_cursor += 1;
                }
            }
            KeyCode::Home => self.query_cursor = 0,
            KeyCode::End => self.query_cursor = self.query.chars().count(),
            KeyCode::Char(ch)
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT =>
            {
                insert_char_at(&mut self.query, self.query_cursor, ch);
                self.query_cursor += 1;
                self.refresh_filter();
            }
            _ => {}
        }
    }

    fn refresh_filter(&mut self) {
        let query = self.query.clone();
        self.apply_filter(&query);
    }

    fn apply_filter(&mut self, query: &str) {
        self.visible = project(self.matcher.as_ref(), query, &self.commands);
        self.selected = 0;
    }

    fn move_selection(&mut self, direction: isize) {
        if self.visible.is_empty() {
            self.selected = 0;
            return;
        }

        let len = self.visible.len() as isize;
        let next = (self.selected as isize + direction).rem_euclid(len);
        self.selected = next as usize;
    }

    fn step_selection(&mut self, step: isize) {
        let last = self.visible.len().saturating_sub(1) as isize;
        self.selected = (self.selected as isize + step).clamp(0, last) as usize;
    }

    fn list_page(&self) -> usize {
        self.list_viewport.saturating_sub(2).max(1)
    }
}

fn insert_char_at(value: &mut String, char_index: usize, ch: char) {
    let byte_index = byte_index_for_char(value, char_index);
    value.insert(byte_index, ch);
}

fn remove_char_at(value: &mut String, char_index: usize) -> bool {
    let start = byte_index_for_char(value, char_index);
    if start >= value.len() {
        return false;
    }
    let end = byte_index_for_char(value, char_index + 1);
    value.replace_range(start..end, "");
    true
}

fn byte_index_for_char(value: &str, char_index: usize) -> usize {
    if char_index == 0 {
        return 0;
    }
    value
        .char_indices()
        .nth(char_index)
        .map(|(index, _)| index)
        .unwrap_or(value.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::LogLine;
    use crate::nav::Focus;

    fn command(label: &str) -> Command {
        Command {
            label: label.to_string(),
            program: "true".to_string(),
            args: Vec::new(),
            env: Vec::new(),
            working_dir: None,
        }
    }

    fn app() -> AppState {
        AppState::new(vec![command("build"), command("test"), command("deploy")])
    }

    fn press(app: &mut AppState, code: KeyCode) -> UiAction {
        app.on_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut AppState, text: &str) {
        for ch in text.chars() {
            press(app, KeyCode::Char(ch));
        }
    }

    fn visible_labels(app: &AppState) -> Vec<&str> {
        app.visible_commands().map(|c| c.label.as_str()).collect()
    }

    #[test]
    fn typing_a_filter_narrows_the_list() {
        let mut app = app();
        press(&mut app, KeyCode::Char('/'));
        assert_eq!(app.status, "searching:");
        type_text(&mut app, "de");
        assert_eq!(visible_labels(&app), vec!["deploy"]);

        press(&mut app, KeyCode::Backspace);
        press(&mut app, KeyCode::Backspace);
        assert_eq!(visible_labels(&app), vec!["build", "test", "deploy"]);
    }

    #[test]
    fn escape_keeps_the_filtered_view() {
        let mut app = app();
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Char('/'));
        type_text(&mut app, "zzz");
        assert!(app.visible.is_empty());

        assert_eq!(press(&mut app, KeyCode::Esc), UiAction::None);
        assert!(app.visible.is_empty());
        assert_eq!(app.nav.focus(), Focus::List);
        assert_eq!(app.status, "canceled search: zzz");
        assert!(app.query.is_empty());
    }

    #[test]
    fn enter_on_empty_result_restores_full_list() {
        let mut app = app();
        press(&mut app, KeyCode::Char('/'));
        type_text(&mut app, "zzz");
        press(&mut app, KeyCode::Enter);

        assert_eq!(visible_labels(&app), vec!["build", "test", "deploy"]);
        assert_eq!(app.status, "searched: zzz");
        assert!(!app.nav.is_filtering());
    }

    #[test]
    fn enter_with_results_keeps_them_and_launches_from_filtered_list() {
        let mut app = app();
        press(&mut app, KeyCode::Char('/'));
        type_text(&mut app, "de");
        press(&mut app, KeyCode::Enter);
        assert_eq!(visible_labels(&app), vec!["deploy"]);

        assert_eq!(press(&mut app, KeyCode::Enter), UiAction::Run(2));
    }

    #[test]
    fn query_cursor_edits_in_place() {
        let mut app = app();
        press(&mut app, KeyCode::Char('/'));
        type_text(&mut app, "tst");
        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Char('e'));
        assert_eq!(app.query, "test");
        assert_eq!(app.query_cursor, 2);
        press(&mut app, KeyCode::Delete);
        assert_eq!(app.query, "tet");
    }

    #[test]
    fn list_selection_wraps_and_enter_runs_selected() {
        let mut app = app();
        press(&mut app, KeyCode::Up);
        assert_eq!(app.selected, 2);
        press(&mut app, KeyCode::Down);
        assert_eq!(app.selected, 0);
        press(&mut app, KeyCode::End);
        assert_eq!(press(&mut app, KeyCode::Enter), UiAction::Run(2));
        press(&mut app, KeyCode::Home);
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn enter_with_empty_list_does_nothing() {
        let mut app = AppState::new(Vec::new());
        assert_eq!(press(&mut app, KeyCode::Enter), UiAction::None);
    }

    #[test]
    fn escape_outside_filter_quits() {
        let mut app = app();
        assert_eq!(press(&mut app, KeyCode::Esc), UiAction::Quit);
    }

    #[test]
    fn newest_job_owns_panes_and_exit_box() {
        let registry = JobRegistry::new();
        let build = registry.register();
        let test = registry.register();
        let mut app = app();

        app.on_job_event(JobEvent::Started {
            job: test,
            label: "test".to_string(),
        });
        // An older job starting late must not steal the panes.
        app.on_job_event(JobEvent::Started {
            job: build,
            label: "build".to_string(),
        });
        app.on_job_event(JobEvent::Line {
            job: build,
            stream: Stream::Stdout,
            line: LogLine::now("compiling"),
        });
        app.on_job_event(JobEvent::Line {
            job: test,
            stream: Stream::Stdout,
            line: LogLine::now("running 3 tests"),
        });
        app.on_job_event(JobEvent::Finished {
            job: build,
            label: "build".to_string(),
            outcome: JobOutcome::Exited(0),
        });

        assert_eq!(app.panes.stdout.buffer().len(), 1);
        assert!(matches!(&app.exit, ExitDisplay::Running { label, .. } if label == "test"));

        app.on_job_event(JobEvent::Finished {
            job: test,
            label: "test".to_string(),
            outcome: JobOutcome::Exited(101),
        });
        assert_eq!(
            app.exit,
            ExitDisplay::Finished {
                label: "test".to_string(),
                outcome: JobOutcome::Exited(101)
            }
        );
    }

    #[test]
    fn status_updates_do_not_clobber_filter_prompt() {
        let mut app = app();
        app.on_status(StatusUpdate {
            running: 2,
            follow_output: true,
        });
        assert_eq!(app.status, "2 running");

        press(&mut app, KeyCode::Char('/'));
        app.on_status(StatusUpdate {
            running: 1,
            follow_output: true,
        });
        assert_eq!(app.status, "searching:");
    }

    #[test]
    fn scrolling_a_log_pane_leaves_follow_mode() {
        let registry = JobRegistry::new();
        let job = registry.register();
        let mut app = app();
        app.on_job_event(JobEvent::Started {
            job,
            label: "build".to_string(),
        });
        for i in 0..40 {
            app.on_job_event(JobEvent::Line {
                job,
                stream: Stream::Stdout,
                line: LogLine::now(format!("line {i}")),
            });
        }
        app.panes.stdout.set_viewport(12);

        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::PageUp);
        assert_eq!(app.panes.stdout.visible_window(), (20, 30));
        press(&mut app, KeyCode::Home);
        assert_eq!(app.panes.stdout.visible_window(), (0, 10));

        app.on_status(StatusUpdate {
            running: 1,
            follow_output: true,
        });
        assert_eq!(app.panes.stdout.visible_window(), (30, 40));
    }
}
