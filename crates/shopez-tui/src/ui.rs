use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use shopez_core::ChatRole;
use unicode_width::UnicodeWidthChar;

use crate::app::{App, InputMode};

/// Turn `**bold**` runs into bold spans. An unmatched `**` is kept as text.
fn styled_line(text: &str, base: Style) -> Line<'static> {
    let parts: Vec<&str> = text.split("**").collect();
    let balanced = parts.len() % 2 == 1;
    let last = parts.len() - 1;

    let spans: Vec<Span<'static>> = parts
        .iter()
        .enumerate()
        .filter(|(_, part)| !part.is_empty())
        .map(|(i, part)| {
            if i % 2 == 0 {
                Span::styled(part.to_string(), base)
            } else if balanced || i != last {
                Span::styled(part.to_string(), base.add_modifier(Modifier::BOLD))
            } else {
                Span::styled(format!("**{}", part), base)
            }
        })
        .collect();

    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, transcript, composer, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_transcript(app, frame, chat_area);
    render_composer(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" 🛍️ Shop EZ AI Agent ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("v{} ", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(
            format!(" {} as {} ", app.base_url, app.user_id),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store viewport for scroll math and mouse hit-testing
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let border_color = if app.input_mode == InputMode::Normal {
        Color::Cyan
    } else {
        Color::DarkGray
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Chat ");

    let user_style = Style::default().fg(Color::Cyan);
    let agent_style = Style::default();

    let mut lines: Vec<Line> = Vec::new();
    for msg in app.session.messages() {
        match msg.role {
            ChatRole::User => {
                lines.push(
                    Line::from(Span::styled("You", user_style.add_modifier(Modifier::BOLD)))
                        .alignment(Alignment::Right),
                );
                for line in msg.content.lines() {
                    lines.push(styled_line(line, user_style).alignment(Alignment::Right));
                }
            }
            ChatRole::Assistant => {
                lines.push(Line::from(Span::styled(
                    "Agent",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    lines.push(styled_line(line, agent_style));
                }
            }
        }
        lines.push(Line::default());
    }

    if app.is_busy() {
        lines.push(Line::from(Span::styled(
            "Agent",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Finding deals{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true });

    // Wrapped height, borders included
    let total = chat.line_count(app.chat_width);
    let max_scroll = total.saturating_sub(area.height as usize).min(u16::MAX as usize) as u16;
    app.update_viewport(max_scroll);

    frame.render_widget(chat.scroll((app.scroll, 0)), area);
}

fn render_composer(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Type your shopping list... ");

    let inner_width = area.width.saturating_sub(2);
    let (visible, cursor_x) = composer_view(&app.input, app.cursor, inner_width);

    let input = Paragraph::new(visible).block(block);
    frame.render_widget(input, area);

    if editing {
        frame.set_cursor_position((area.x + 1 + cursor_x, area.y + 1));
    }
}

/// Slice of the composer text that fits in `width` cells with the cursor on
/// screen, and the cursor's column within it. Widths are display cells, so
/// wide glyphs count twice.
fn composer_view(input: &str, cursor: usize, width: u16) -> (String, u16) {
    let widths: Vec<(char, usize)> = input
        .chars()
        .map(|c| (c, UnicodeWidthChar::width(c).unwrap_or(0)))
        .collect();
    let cursor = cursor.min(widths.len());
    let width = width as usize;
    if width == 0 {
        return (String::new(), 0);
    }

    // Leave one cell for the cursor itself
    let mut start = 0;
    let mut before_cursor: usize = widths[..cursor].iter().map(|(_, w)| w).sum();
    while before_cursor > width - 1 && start < cursor {
        before_cursor -= widths[start].1;
        start += 1;
    }

    let mut used = 0;
    let visible: String = widths[start..]
        .iter()
        .take_while(|(_, w)| {
            used += w;
            used <= width
        })
        .map(|(c, _)| *c)
        .collect();

    (visible, before_cursor as u16)
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" EDIT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    let mut spans = vec![Span::styled(mode_text, mode_style)];
    let hints: &[(&str, &str)] = match app.input_mode {
        InputMode::Editing => &[
            ("Enter", "send"),
            ("^X", "abort order"),
            ("Esc", "scroll"),
            ("^C", "quit"),
        ],
        InputMode::Normal => &[
            ("i", "type"),
            ("j/k", "scroll"),
            ("x", "abort order"),
            ("q", "quit"),
        ],
    };
    for (key, label) in hints {
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {} ", label), label_style));
    }
    spans.push(Span::styled(
        "  try: proceed | show me the list | remove <item>",
        Style::default().fg(Color::DarkGray),
    ));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
