use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, List, ListItem, ListState, Paragraph};

use crate::ansi::styled_spans;
use crate::app::{AppState, ExitDisplay};
use crate::logs::{LogPane, Stream};
use crate::nav::Focus;

const ACTIVE_BORDER: Color = Color::Rgb(88, 150, 201);
const INACTIVE_BORDER: Color = Color::Rgb(70, 84, 96);
const BOTTOM_ROW_HEIGHT: u16 = 3;
// Left border plus the "/ " prompt.
const QUERY_PROMPT_COLS: usize = 3;

pub fn draw(frame: &mut Frame, app: &mut AppState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(6), Constraint::Length(BOTTOM_ROW_HEIGHT)])
        .split(frame.area());
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 3), Constraint::Ratio(2, 3)])
        .split(rows[0]);
    let logs = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Ratio(1, 2), Constraint::Ratio(1, 2)])
        .split(columns[1]);
    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Percentage(30),
            Constraint::Percentage(30),
        ])
        .split(rows[1]);

    app.list_viewport = columns[0].height as usize;
    app.panes.stdout.set_viewport(logs[0].height);
    app.panes.stderr.set_viewport(logs[1].height);

    let focus = app.nav.focus();
    draw_command_list(frame, app, columns[0]);
    draw_log_pane(frame, &app.panes.stdout, focus == Focus::Stdout, logs[0]);
    draw_log_pane(frame, &app.panes.stderr, focus == Focus::Stderr, logs[1]);
    draw_status_line(frame, app, bottom[0]);
    draw_query_field(frame, app, bottom[1]);
    draw_exit_box(frame, &app.exit, bottom[2]);
}

fn pane_block(title: String, active: bool) -> Block<'static> {
    let border_color = if active {
        ACTIVE_BORDER
    } else {
        INACTIVE_BORDER
    };
    Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(border_color))
}

fn draw_command_list(frame: &mut Frame, app: &AppState, area: Rect) {
    let active = app.nav.focus() == Focus::List && !app.nav.is_filtering();
    let title = format!("commands ({}/{})", app.visible.len(), app.commands.len());

    if app.visible.is_empty() {
        let empty = Paragraph::new("No matching commands")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray))
            .block(pane_block(title, active));
        frame.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem<'_>> = app
        .visible_commands()
        .map(|command| {
            ListItem::new(Line::from(Span::styled(
                command.label.clone(),
                Style::default().fg(Color::White),
            )))
        })
        .collect();

    let mut list_state = ListState::default();
    list_state.select(Some(app.selected));

    let list = List::new(items)
        .block(pane_block(title, active))
        .highlight_style(
            Style::default()
                .bg(Color::Rgb(42, 88, 116))
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");

    frame.render_stateful_widget(list, area, &mut list_state);
}

fn draw_log_pane(frame: &mut Frame, pane: &LogPane, active: bool, area: Rect) {
    let (marker, marker_color, text_color) = match pane.stream {
        Stream::Stdout => ("", Color::Green, Color::White),
        Stream::Stderr => ("! ", Color::Red, Color::LightRed),
    };
    let (start, end) = pane.visible_window();

    let lines: Vec<Line<'_>> = pane
        .buffer()
        .lines()
        .skip(start)
        .take(end - start)
        .map(|line| {
            let mut spans = vec![
                Span::styled(line.timestamp(), Style::default().fg(Color::DarkGray)),
                Span::styled(format!(" {marker}"), Style::default().fg(marker_color)),
            ];
            spans.extend(styled_spans(&line.text, Style::default().fg(text_color)));
            Line::from(spans)
        })
        .collect();

    let mut title = pane.stream.title().to_string();
    let buffer = pane.buffer();
    if !buffer.is_empty() {
        title.push_str(&format!(" [{}-{} of {}]", start + 1, end, buffer.len()));
    }
    let trimmed = buffer.total_appended() - buffer.len() as u64;
    if trimmed > 0 {
        title.push_str(&format!(" +{trimmed} trimmed"));
    }
    if !pane.scroll().follow_end {
        title.push_str(" (scrolled)");
    }

    frame.render_widget(Paragraph::new(lines).block(pane_block(title, active)), area);
}

fn draw_status_line(frame: &mut Frame, app: &AppState, area: Rect) {
    let status_color = if app.nav.is_filtering() {
        Color::Cyan
    } else {
        Color::White
    };
    let line = Line::from(vec![
        Span::styled("[ctrl+c]", Style::default().fg(Color::White)),
        Span::styled(" to quit | ", Style::default().fg(Color::Gray)),
        Span::styled(app.status.clone(), Style::default().fg(status_color)),
    ]);
    frame.render_widget(
        Paragraph::new(line).block(pane_block(String::new(), false)),
        area,
    );
}

fn draw_query_field(frame: &mut Frame, app: &AppState, area: Rect) {
    let filtering = app.nav.is_filtering();
    let room = (area.width as usize).saturating_sub(QUERY_PROMPT_COLS + 2);
    let (shown, cursor_col) = query_window(&app.query, app.query_cursor, room);
    let text = if filtering {
        Line::from(vec![
            Span::styled("/ ", Style::default().fg(Color::Cyan)),
            Span::styled(shown, Style::default().fg(Color::White)),
        ])
    } else {
        Line::from(Span::styled(
            "press / to filter",
            Style::default().fg(Color::DarkGray),
        ))
    };
    frame.render_widget(
        Paragraph::new(text).block(pane_block("filter".to_string(), filtering)),
        area,
    );

    if filtering {
        let offset = u16::try_from(QUERY_PROMPT_COLS + cursor_col).unwrap_or(u16::MAX);
        let x = area
            .x
            .saturating_add(offset)
            .min(area.right().saturating_sub(2));
        let y = area.y.saturating_add(1);
        frame.set_cursor_position((x, y));
    }
}

// Trailing slice of the query that keeps the cursor in view, and the cursor column within it.
fn query_window(query: &str, cursor: usize, room: usize) -> (String, usize) {
    let start = cursor.saturating_sub(room);
    let shown = query.chars().skip(start).take(room).collect();
    (shown, cursor - start)
}

fn draw_exit_box(frame: &mut Frame, exit: &ExitDisplay, area: Rect) {
    let title = match exit.label() {
        Some(label) => format!("exit code for: {label}"),
        None => "exit code".to_string(),
    };

    let line = match exit {
        ExitDisplay::Idle => Line::from(""),
        ExitDisplay::Running { label, started } => Line::from(vec![
            Span::styled(
                started.format("%H:%M:%S").to_string(),
                Style::default().fg(Color::Gray),
            ),
            Span::styled(" running command: ", Style::default().fg(Color::Cyan)),
            Span::styled(label.clone(), Style::default().fg(Color::White)),
        ]),
        ExitDisplay::Finished { outcome, .. } => {
            let color = if outcome.success() {
                Color::Green
            } else {
                Color::Red
            };
            let text = match outcome.code() {
                Some(code) => format!("Exit code: {code}"),
                None => "Terminated by signal".to_string(),
            };
            Line::from(Span::styled(text, Style::default().fg(color)))
        }
    };

    frame.render_widget(
        Paragraph::new(line).block(pane_block(title, false)),
        area,
    );
}
