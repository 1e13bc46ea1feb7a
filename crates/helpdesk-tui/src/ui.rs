use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use helpdesk_core::markup::{self, LineKind, RenderedLine, Segment};
use helpdesk_core::{ChatMessage, ChatRole};
use crate::app::{App, InputMode};

const BULLET: &str = "  • ";

/// Convert one rendered markup line into styled spans
fn markup_line(line: &RenderedLine) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();

    if line.kind == LineKind::Bullet {
        spans.push(Span::styled(BULLET, Style::default().fg(Color::Yellow)));
    }

    for segment in &line.segments {
        let span = match segment {
            Segment::Text(text) => Span::raw(text.clone()),
            Segment::Bold(text) => {
                Span::styled(text.clone(), Style::default().add_modifier(Modifier::BOLD))
            }
            Segment::Italic(text) => {
                Span::styled(text.clone(), Style::default().add_modifier(Modifier::ITALIC))
            }
            Segment::Link { text, .. } => Span::styled(
                text.clone(),
                Style::default()
                    .fg(Color::Blue)
                    .add_modifier(Modifier::UNDERLINED),
            ),
        };
        spans.push(span);
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn assistant_label(message: Option<&ChatMessage>) -> Line<'static> {
    let mut spans = vec![Span::styled(
        "AI:",
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    )];
    if let Some(source) = message.and_then(|m| m.source.as_deref()) {
        spans.push(Span::styled(
            format!(" ({})", source),
            Style::default().fg(Color::DarkGray),
        ));
    }
    Line::from(spans)
}

fn thinking_line(frame: u8) -> Line<'static> {
    // Animated ellipsis: cycles through ".", "..", "..."
    let dots = ".".repeat((frame as usize) + 1);
    Line::from(Span::styled(
        format!("Thinking{}", dots),
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    ))
}

/// Build the transcript as display lines
fn chat_lines(app: &App) -> Vec<Line<'static>> {
    let conversation = &app.conversation;
    let mut lines: Vec<Line<'static>> = Vec::new();
    let in_progress = conversation.in_progress();

    for msg in conversation.messages() {
        match msg.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    lines.push(Line::from(line.to_string()));
                }
            }
            ChatRole::Assistant => {
                lines.push(assistant_label(Some(msg)));
                let streaming = in_progress.is_some_and(|m| std::ptr::eq(m, msg));
                if streaming && msg.content.is_empty() {
                    lines.push(thinking_line(app.animation_frame));
                } else {
                    lines.extend(markup::render(&msg.content).iter().map(markup_line));
                }
            }
        }
        lines.push(Line::default());
    }

    // Waiting for the response headers: no assistant slot yet
    if conversation.is_typing() && in_progress.is_none() {
        lines.push(assistant_label(None));
        lines.push(thinking_line(app.animation_frame));
        lines.push(Line::default());
    }

    if let Some(error) = conversation.last_error() {
        lines.push(Line::from(Span::styled(
            format!("Error: {}", error),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )));
    }

    lines
}

/// Rows `text` takes once word-wrapped to `width`, as the chat paragraph wraps it
fn wrapped_height(text: &Text<'static>, width: u16) -> u16 {
    let rows = Paragraph::new(text.clone())
        .wrap(Wrap { trim: false })
        .line_count(width.max(1));
    u16::try_from(rows).unwrap_or(u16::MAX)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" IT Helpdesk ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("{} ", app.client.endpoint()),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store area for mouse hit-testing
    app.chat_area = Some(area);

    let focused = app.input_mode == InputMode::Normal;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Conversation ");

    let chat_text = if app.conversation.messages().is_empty() && !app.conversation.is_typing() {
        app.set_chat_metrics(1, area.height.saturating_sub(2));
        Text::from(Span::styled(
            "Ask the helpdesk a question...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let text = Text::from(chat_lines(app));
        let total = wrapped_height(&text, area.width.saturating_sub(2));
        app.set_chat_metrics(total, area.height.saturating_sub(2));
        text
    };

    let chat = Paragraph::new(chat_text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };
    let title = if app.conversation.is_typing() {
        " Ask (waiting for answer) "
    } else {
        " Ask "
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.query_cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .query_input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    // Use cyan text to match the "You:" style
    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);

    frame.render_widget(input, area);

    // Show cursor when editing
    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let key_style = Style::default().fg(Color::Black).bg(Color::Gray);
    let label_style = Style::default().fg(Color::Gray);

    let (mode, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().fg(Color::Black).bg(Color::Cyan)),
        InputMode::Editing => (" EDIT ", Style::default().fg(Color::Black).bg(Color::Yellow)),
    };

    let mut spans = vec![Span::styled(mode, mode_style), Span::raw(" ")];
    match app.input_mode {
        InputMode::Normal => spans.extend([
            Span::styled(" j/k ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" i ", key_style),
            Span::styled(" ask ", label_style),
            Span::styled(" n ", key_style),
            Span::styled(" new ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ]),
        InputMode::Editing => spans.extend([
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" stop typing ", label_style),
        ]),
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
