use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;

const ESC: char = '\u{1b}';
const BEL: char = '\u{7}';
const TAB_WIDTH: usize = 4;

/// Splits a line of child output into styled spans.
///
/// SGR color and weight codes are honoured; every other escape sequence is removed
/// so a child can never move the cursor or repaint the dashboard.
pub fn styled_spans(text: &str, base: Style) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    let mut style = base;
    let mut buffer = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            ESC => {
                let sequence = match chars.peek().copied() {
                    Some('[') => {
                        chars.next();
                        let mut params = String::new();
                        let mut final_byte = None;
                        for next in chars.by_ref() {
                            if ('\u{40}'..='\u{7e}').contains(&next) {
                                final_byte = Some(next);
                                break;
                            }
                            params.push(next);
                        }
                        final_byte.map(|byte| (byte, params))
                    }
                    Some(']') => {
                        // OSC: runs until BEL or ESC \.
                        while let Some(next) = chars.next() {
                            if next == BEL {
                                break;
                            }
                            if next == ESC {
                                chars.next_if_eq(&'\\');
                                break;
                            }
                        }
                        None
                    }
                    Some(_) => {
                        chars.next();
                        None
                    }
                    None => None,
                };

                if let Some(('m', params)) = sequence {
                    if !buffer.is_empty() {
                        spans.push(Span::styled(std::mem::take(&mut buffer), style));
                    }
                    style = apply_sgr(&params, style, base);
                }
            }
            '\t' => buffer.push_str(&" ".repeat(TAB_WIDTH)),
            ch if ch.is_control() => {}
            ch => buffer.push(ch),
        }
    }

    if !buffer.is_empty() || spans.is_empty() {
        spans.push(Span::styled(buffer, style));
    }
    spans
}

fn apply_sgr(params: &str, mut style: Style, base: Style) -> Style {
    if params.is_empty() {
        return base;
    }

    let codes: Vec<u16> = params
        .split([';', ':'])
        .map(|part| part.parse::<u16>().unwrap_or(0))
        .collect();

    let mut i = 0usize;
    while i < codes.len() {
        let code = codes[i];
        style = match code {
            0 => base,
            1 => style.add_modifier(Modifier::BOLD),
            2 => style.add_modifier(Modifier::DIM),
            3 => style.add_modifier(Modifier::ITALIC),
            4 => style.add_modifier(Modifier::UNDERLINED),
            7 => style.add_modifier(Modifier::REVERSED),
            22 => style.remove_modifier(Modifier::BOLD | Modifier::DIM),
            23 => style.remove_modifier(Modifier::ITALIC),
            24 => style.remove_modifier(Modifier::UNDERLINED),
            27 => style.remove_modifier(Modifier::REVERSED),
            30..=37 | 90..=97 => style.fg(basic_color(code)),
            39 => match base.fg {
                Some(color) => style.fg(color),
                None => style.fg(Color::Reset),
            },
            40..=47 | 100..=107 => style.bg(basic_color(code - 10)),
            49 => style.bg(Color::Reset),
            38 | 48 => {
                let (color, consumed) = extended_color(&codes[i + 1..]);
                i += consumed;
                match (color, code) {
                    (Some(color), 38) => style.fg(color),
                    (Some(color), _) => style.bg(color),
                    (None, _) => style,
                }
            }
            _ => style,
        };
        i += 1;
    }
    style
}

fn extended_color(rest: &[u16]) -> (Option<Color>, usize) {
    let channel = |value: u16| value.min(u8::MAX as u16) as u8;
    match rest {
        [5, index, ..] => (Some(Color::Indexed(channel(*index))), 2),
        [2, r, g, b, ..] => (Some(Color::Rgb(channel(*r), channel(*g), channel(*b))), 4),
        _ => (None, 0),
    }
}

fn basic_color(code: u16) -> Color {
    match code {
        30 => Color::Black,
        31 => Color::Red,
        32 => Color::Green,
        33 => Color::Yellow,
        34 => Color::Blue,
        35 => Color::Magenta,
        36 => Color::Cyan,
        37 => Color::Gray,
        90 => Color::DarkGray,
        91 => Color::LightRed,
        92 => Color::LightGreen,
        93 => Color::LightYellow,
        94 => Color::LightBlue,
        95 => Color::LightMagenta,
        96 => Color::LightCyan,
        97 => Color::White,
        _ => Color::Reset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(spans: &[Span<'_>]) -> String {
        spans.iter().map(|span| span.content.as_ref()).collect()
    }

    #[test]
    fn colors_switch_and_reset() {
        let base = Style::default().fg(Color::White);
        let spans = styled_spans("ok \u{1b}[31mfail\u{1b}[0m done", base);
        assert_eq!(plain(&spans), "ok fail done");
        assert_eq!(spans[0].style, base);
        assert_eq!(spans[1].style.fg, Some(Color::Red));
        assert_eq!(spans[2].style, base);
    }

    #[test]
    fn cursor_control_is_stripped() {
        let spans = styled_spans(
            "\u{1b}[2K\u{1b}[?25lprogress\u{1b}[1A\u{1b}]0;title\u{7} 50%\r",
            Style::default(),
        );
        assert_eq!(plain(&spans), "progress 50%");
    }

    #[test]
    fn extended_colors_are_parsed() {
        let spans = styled_spans("\u{1b}[38;5;208mA\u{1b}[48;2;1;2;3mB", Style::default());
        assert_eq!(spans[0].style.fg, Some(Color::Indexed(208)));
        assert_eq!(spans[1].style.bg, Some(Color::Rgb(1, 2, 3)));
    }

    #[test]
    fn empty_line_still_yields_a_span() {
        assert_eq!(styled_spans("", Style::default()).len(), 1);
        assert_eq!(plain(&styled_spans("a\tb", Style::default())), "a    b");
    }
}
