use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::logs::Stream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    List,
    Stdout,
    Stderr,
}

impl Focus {
    pub fn stream(self) -> Option<Stream> {
        match self {
            Focus::List => None,
            Focus::Stdout => Some(Stream::Stdout),
            Focus::Stderr => Some(Stream::Stderr),
        }
    }

    fn next(self) -> Self {
        match self {
            Focus::List => Focus::Stdout,
            Focus::Stdout => Focus::Stderr,
            Focus::Stderr => Focus::List,
        }
    }

    fn previous(self) -> Self {
        match self {
            Focus::List => Focus::Stderr,
            Focus::Stdout => Focus::List,
            Focus::Stderr => Focus::Stdout,
        }
    }

    fn toggle(self) -> Self {
        match self {
            Focus::List => Focus::Stdout,
            Focus::Stdout | Focus::Stderr => Focus::List,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollCommand {
    LineUp,
    LineDown,
    PageUp,
    PageDown,
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Ignore,
    Quit,
    Focus(Focus),
    Scroll(Stream, ScrollCommand),
    List(KeyEvent),
    FilterStarted,
    FilterEdit(KeyEvent),
    FilterSubmitted,
    FilterCanceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigator {
    focus: Focus,
    filtering: bool,
}

impl Default for Navigator {
    fn default() -> Self {
        Self {
            focus: Focus::List,
            filtering: false,
        }
    }
}

impl Navigator {
    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn is_filtering(&self) -> bool {
        self.filtering
    }

    pub fn on_key(&mut self, key: KeyEvent) -> Intent {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Intent::Quit;
        }

        if self.filtering {
            return self.on_filter_key(key);
        }

        match key.code {
            KeyCode::Char('/') => {
                self.filtering = true;
                Intent::FilterStarted
            }
            KeyCode::Esc => Intent::Quit,
            KeyCode::Left | KeyCode::Right => self.move_focus(self.focus.toggle()),
            KeyCode::Tab => self.move_focus(self.focus.next()),
            KeyCode::BackTab => self.move_focus(self.focus.previous()),
            KeyCode::Up => self.scroll_or_list(key, ScrollCommand::LineUp),
            KeyCode::Down => self.scroll_or_list(key, ScrollCommand::LineDown),
            KeyCode::PageUp => self.scroll_or_list(key, ScrollCommand::PageUp),
            KeyCode::PageDown => self.scroll_or_list(key, ScrollCommand::PageDown),
            KeyCode::Home => self.scroll_or_list(key, ScrollCommand::Start),
            KeyCode::End => self.scroll_or_list(key, ScrollCommand::End),
            KeyCode::Enter => match self.focus {
                Focus::List => Intent::List(key),
                Focus::Stdout | Focus::Stderr => Intent::Ignore,
            },
            _ => {
                // Anything unbound drops back to the list.
                self.focus = Focus::List;
                Intent::List(key)
            }
        }
    }

    fn on_filter_key(&mut self, key: KeyEvent) -> Intent {
        match key.code {
            KeyCode::Enter => {
                self.end_filter();
                Intent::FilterSubmitted
            }
            KeyCode::Esc => {
                self.end_filter();
                Intent::FilterCanceled
            }
            _ => Intent::FilterEdit(key),
        }
    }

    fn end_filter(&mut self) {
        self.filtering = false;
        self.focus = Focus::List;
    }

    fn move_focus(&mut self, focus: Focus) -> Intent {
        self.focus = focus;
        Intent::Focus(focus)
    }

    fn scroll_or_list(&self, key: KeyEvent, command: ScrollCommand) -> Intent {
        match self.focus.stream() {
            Some(stream) => Intent::Scroll(stream, command),
            None => Intent::List(key),
        }
    }
}
