use std::collections::VecDeque;

use chrono::{DateTime, Local};

use crate::jobs::JobId;

pub const MAX_LOG_LINES: usize = 10_000;

const BORDER_ROWS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub fn title(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogLine {
    pub at: DateTime<Local>,
    pub text: String,
}

impl LogLine {
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            at: Local::now(),
            text: text.into(),
        }
    }

    pub fn timestamp(&self) -> String {
        self.at.format("%H:%M:%S").to_string()
    }
}

#[derive(Debug)]
pub struct LogBuffer {
    lines: VecDeque<LogLine>,
    max_lines: usize,
    total_appended: u64,
}

impl LogBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            max_lines: max_lines.max(1),
            total_appended: 0,
        }
    }

    pub fn push(&mut self, line: LogLine) {
        self.lines.push_back(line);
        self.total_appended += 1;
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.total_appended = 0;
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }

    pub fn lines(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollState {
    pub top: usize,
    pub follow_end: bool,
}

impl Default for ScrollState {
    fn default() -> Self {
        Self {
            top: 0,
            follow_end: true,
        }
    }
}

#[derive(Debug)]
pub struct LogPane {
    pub stream: Stream,
    buffer: LogBuffer,
    scroll: ScrollState,
    viewport: usize,
}

impl LogPane {
    pub fn new(stream: Stream, max_lines: usize) -> Self {
        Self {
            stream,
            buffer: LogBuffer::new(max_lines),
            scroll: ScrollState::default(),
            viewport: 0,
        }
    }

    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    pub fn scroll(&self) -> ScrollState {
        self.scroll
    }

    pub fn set_viewport(&mut self, outer_height: u16) {
        self.viewport = outer_height as usize;
    }

    pub fn push(&mut self, line: LogLine) {
        self.buffer.push(line);
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scroll = ScrollState::default();
    }

    pub fn visible_window(&self) -> (usize, usize) {
        let rows = self.inner_rows().max(1);
        let top = self.effective_top();
        let end = (top + rows).min(self.buffer.len());
        (top, end)
    }

    pub fn scroll_by(&mut self, delta: isize) {
        let top = self.effective_top();
        let target = if delta < 0 {
            top.saturating_sub(delta.unsigned_abs())
        } else {
            top.saturating_add(delta as usize)
        };
        self.scroll_to(target);
    }

    pub fn page_up(&mut self) {
        self.scroll_by(-(self.page_size() as isize));
    }

    pub fn page_down(&mut self) {
        self.scroll_by(self.page_size() as isize);
    }

    pub fn scroll_to_start(&mut self) {
        self.scroll = ScrollState {
            top: 0,
            follow_end: false,
        };
    }

    pub fn scroll_to_end(&mut self) {
        self.scroll = ScrollState {
            top: self.max_top(),
            follow_end: true,
        };
    }

    fn scroll_to(&mut self, row: usize) {
        self.scroll = ScrollState {
            top: row.min(self.max_top()),
            follow_end: false,
        };
    }

    fn page_size(&self) -> usize {
        self.viewport.saturating_sub(BORDER_ROWS).max(1)
    }

    fn inner_rows(&self) -> usize {
        self.viewport.saturating_sub(BORDER_ROWS)
    }

    fn max_top(&self) -> usize {
        self.buffer.len().saturating_sub(self.inner_rows().max(1))
    }

    fn effective_top(&self) -> usize {
        if self.scroll.follow_end {
            self.max_top()
        } else {
            self.scroll.top.min(self.max_top())
        }
    }
}

// Only one job owns the panes at a time. Per-job output tabs would key these by job.
#[derive(Debug)]
pub struct LogPanes {
    pub stdout: LogPane,
    pub stderr: LogPane,
    owner: Option<JobId>,
}

impl LogPanes {
    pub fn new(max_lines: usize) -> Self {
        Self {
            stdout: LogPane::new(Stream::Stdout, max_lines),
            stderr: LogPane::new(Stream::Stderr, max_lines),
            owner: None,
        }
    }

    pub fn owner(&self) -> Option<JobId> {
        self.owner
    }

    pub fn begin(&mut self, job: JobId) {
        self.owner = Some(job);
        self.stdout.clear();
        self.stderr.clear();
    }

    pub fn append(&mut self, job: JobId, stream: Stream, line: LogLine) -> bool {
        if self.owner != Some(job) {
            return false;
        }
        self.pane_mut(stream).push(line);
        true
    }

    pub fn pane_mut(&mut self, stream: Stream) -> &mut LogPane {
        match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        }
    }

    pub fn follow_output(&mut self) {
        self.stdout.scroll_to_end();
        self.stderr.scroll_to_end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobRegistry;

    fn filled_pane(lines: usize, outer_height: u16) -> LogPane {
        let mut pane = LogPane::new(Stream::Stdout, MAX_LOG_LINES);
        for i in 0..lines {
            pane.push(LogLine::now(format!("line {i}")));
        }
        pane.set_viewport(outer_height);
        pane
    }

    #[test]
    fn buffer_keeps_only_newest_lines() {
        let mut buffer = LogBuffer::new(3);
        for i in 0..10 {
            buffer.push(LogLine::now(format!("{i}")));
        }
        let texts: Vec<_> = buffer.lines().map(|line| line.text.as_str()).collect();
        assert_eq!(texts, vec!["7", "8", "9"]);
        assert_eq!(buffer.total_appended(), 10);
    }

    #[test]
    fn default_cap_bounds_rendered_window() {
        let mut buffer = LogBuffer::new(MAX_LOG_LINES);
        for i in 0..(MAX_LOG_LINES + 25) {
            buffer.push(LogLine::now(i.to_string()));
        }
        assert_eq!(buffer.len(), MAX_LOG_LINES);
        assert_eq!(buffer.lines().next().map(|l| l.text.as_str()), Some("25"));
    }

    #[test]
    fn pane_follows_end_until_scrolled() {
        let mut pane = filled_pane(50, 12);
        assert_eq!(pane.visible_window(), (40, 50));

        pane.scroll_by(-3);
        assert_eq!(pane.visible_window(), (37, 47));
        assert!(!pane.scroll().follow_end);

        pane.push(LogLine::now("late"));
        assert_eq!(pane.visible_window(), (37, 47));

        pane.scroll_to_end();
        assert_eq!(pane.visible_window(), (41, 51));
    }

    #[test]
    fn paging_moves_by_height_minus_borders() {
        let mut pane = filled_pane(100, 12);
        pane.page_up();
        assert_eq!(pane.visible_window().0, 80);
        for _ in 0..12 {
            pane.page_up();
        }
        assert_eq!(pane.visible_window().0, 0);
        pane.page_down();
        assert_eq!(pane.visible_window().0, 10);
    }

    #[test]
    fn scroll_is_clamped_to_content() {
        let mut pane = filled_pane(5, 12);
        pane.scroll_by(20);
        assert_eq!(pane.visible_window(), (0, 5));
        pane.scroll_to_start();
        pane.scroll_by(-1);
        assert_eq!(pane.visible_window(), (0, 5));
    }

    #[test]
    fn only_foreground_job_writes_to_panes() {
        let registry = JobRegistry::new();
        let first = registry.register();
        let second = registry.register();
        let mut panes = LogPanes::new(MAX_LOG_LINES);

        panes.begin(first);
        assert!(panes.append(first, Stream::Stdout, LogLine::now("a")));
        panes.begin(second);
        assert!(panes.stdout.buffer().is_empty());
        assert!(!panes.append(first, Stream::Stderr, LogLine::now("stale")));
        assert!(panes.append(second, Stream::Stderr, LogLine::now("b")));
        assert_eq!(panes.stderr.buffer().len(), 1);
        assert_eq!(panes.owner(), Some(second));
    }
}
