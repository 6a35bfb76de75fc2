use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use serde_json::json;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::{App, InputPromptState, OverlayState, StatusKind};
use crate::session::SessionPhase;
use crate::store::{Message, Role, ToolCall, TraceStep};

mod theme;
use theme::*;

const SPINNER: [&str; 4] = ["◐", "◓", "◑", "◒"];

fn cell_width(text: &str) -> u16 {
    UnicodeWidthStr::width(text).min(u16::MAX as usize) as u16
}

pub fn render(f: &mut Frame<'_>, app: &mut App) {
    let size = f.size();
    if size.width < 60 || size.height < 16 {
        let block = Paragraph::new("Terminal too small, resize to at least 60x16.")
            .wrap(Wrap { trim: true })
            .alignment(Alignment::Center)
            .block(
                Block::default()
                    .title("Agent Console")
                    .borders(Borders::ALL)
                    .style(Style::default().fg(FG_PRIMARY).bg(PROMPT_BG)),
            )
            .style(Style::default().fg(FG_PRIMARY).bg(BG_PRIMARY));
        f.render_widget(block, size);
        return;
    }

    let base = Block::default().style(Style::default().bg(BG_PRIMARY));
    f.render_widget(base, size);

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(size);
    let workspace = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(vertical[1]);

    render_header(f, app, vertical[0]);
    render_chat(f, app, workspace[0]);
    render_telemetry(f, app, workspace[1]);
    render_status_bar(f, app, vertical[2]);

    if let Some(overlay) = app.overlay.as_ref() {
        render_overlay(f, overlay);
    }
}

fn render_header(f: &mut Frame<'_>, app: &App, area: Rect) {
    let bar = Style::default().fg(BAR_TEXT).bg(BAR_BG);
    let mut spans = vec![Span::styled(
        " Agent Console ",
        bar.bg(BAR_HIGHLIGHT_BG).add_modifier(Modifier::BOLD),
    )];
    match app.session.conversation() {
        Some(conversation) => {
            spans.push(Span::styled(format!(" {} ", conversation.id), bar));
            if let Some(title) = conversation.title.as_deref() {
                spans.push(Span::styled(format!("· {title} "), bar.fg(FG_DIM)));
            }
        }
        None => spans.push(Span::styled(" no conversation ", bar.fg(FG_DIM))),
    }
    if let Some(stream) = app.session.stream() {
        spans.push(Span::styled(
            format!(
                " {} streaming · {} tokens ",
                SPINNER[app.spinner % SPINNER.len()],
                stream.tokens()
            ),
            bar.fg(ROLE_ASSISTANT).add_modifier(Modifier::BOLD),
        ));
    }
    f.render_widget(Paragraph::new(Line::from(spans)).style(bar), area);
}

fn panel_block(title: String, focused: bool) -> Block<'static> {
    let border = if focused {
        Style::default()
            .fg(BORDER_FOCUS)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(BORDER_IDLE)
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(border)
        .title(Span::styled(title, Style::default().fg(FG_PRIMARY)))
        .style(Style::default().bg(BG_PANEL))
}

fn render_chat(f: &mut Frame<'_>, app: &App, area: Rect) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);
    render_messages(f, app, sections[0]);
    render_composer(f, app, sections[1]);
}

fn role_style(role: &Role) -> Style {
    let color = match role {
        Role::User => ROLE_USER,
        Role::Assistant => ROLE_ASSISTANT,
        Role::System => ROLE_SYSTEM,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

fn message_lines(message: &Message, streaming: bool, width: usize) -> Vec<Line<'static>> {
    let mut header = vec![
        Span::styled(message.role.label().to_string(), role_style(&message.role)),
        Span::styled(
            format!("  {}", local_time(&message.created_at)),
            Style::default().fg(FG_DIM),
        ),
    ];
    if message.is_local() {
        header.push(Span::styled(" (pending)", Style::default().fg(FG_DIM)));
    }
    let mut lines = vec![Line::from(header)];

    let body_style = Style::default().fg(FG_PRIMARY);
    if message.content.is_empty() {
        let placeholder = if streaming { "…" } else { "" };
        lines.push(Line::from(Span::styled(placeholder, Style::default().fg(FG_DIM))));
    } else {
        for line in message.content.lines() {
            push_wrapped_line(&mut lines, line, body_style, width);
        }
    }
    lines.push(Line::default());
    lines
}

fn render_messages(f: &mut Frame<'_>, app: &App, area: Rect) {
    let messages = app.session.messages();
    let block = panel_block(format!("Messages ({})", messages.len()), false);
    let inner = block.inner(area);
    let width = inner.width.max(1) as usize;

    let streaming = app.session.is_streaming();
    let lines: Vec<Line> = if messages.is_empty() {
        let hint = match app.session.phase() {
            SessionPhase::NoConversation => "Ctrl+N starts a conversation, Ctrl+O opens one by id.",
            _ => "No messages yet. Type below and press Enter.",
        };
        vec![Line::from(Span::styled(hint, Style::default().fg(FG_DIM)))]
    } else {
        let last = messages.len() - 1;
        messages
            .iter()
            .enumerate()
            .flat_map(|(idx, message)| message_lines(message, streaming && idx == last, width))
            .collect()
    };

    let overflow = lines.len().saturating_sub(inner.height as usize);
    let offset = overflow.saturating_sub(app.chat_scroll as usize);
    let paragraph = Paragraph::new(lines)
        .block(block)
        .scroll((offset.min(u16::MAX as usize) as u16, 0));
    f.render_widget(paragraph, area);
}

fn render_composer(f: &mut Frame<'_>, app: &App, area: Rect) {
    let phase = app.session.phase();
    let title = match phase {
        SessionPhase::NoConversation => "Message (no conversation)",
        SessionPhase::Idle => "Message (Enter to send)",
        SessionPhase::Streaming => "Message (waiting for reply)",
    };
    let block = panel_block(title.to_string(), phase == SessionPhase::Idle);
    let inner = block.inner(area);

    let line = if app.composer.is_empty() {
        Line::from(Span::styled(
            "Ask the agent something…",
            Style::default().fg(FG_DIM),
        ))
    } else {
        Line::from(Span::styled(
            app.composer.buffer().to_string(),
            Style::default().fg(FG_PRIMARY),
        ))
    };
    let column = app.composer.cursor_column();
    let scroll = column.saturating_sub(inner.width.saturating_sub(1));

    f.render_widget(Clear, area);
    f.render_widget(Paragraph::new(line).block(block).scroll((0, scroll)), area);

    if phase == SessionPhase::Idle && app.overlay.is_none() {
        f.set_cursor(inner.x.saturating_add(column - scroll), inner.y);
    }
}

fn render_telemetry(f: &mut Frame<'_>, app: &App, area: Rect) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);
    let view = &app.telemetry_view;
    let auto = if app.session.telemetry().auto_refresh() {
        "auto"
    } else {
        "manual"
    };

    let block = panel_block(
        format!("Trace steps ({}) · {}", view.trace_steps.len(), auto),
        false,
    );
    let width = block.inner(sections[0]).width.max(1) as usize;
    let lines: Vec<Line> = view
        .trace_steps
        .iter()
        .flat_map(|step| trace_step_lines(step, width))
        .collect();
    render_tail(f, block, lines, sections[0]);

    let payloads = if app.show_payloads { "payloads" } else { "Ctrl+P payloads" };
    let block = panel_block(
        format!("Tool calls ({}) · {}", view.tool_calls.len(), payloads),
        false,
    );
    let width = block.inner(sections[1]).width.max(1) as usize;
    let lines: Vec<Line> = view
        .tool_calls
        .iter()
        .flat_map(|call| tool_call_lines(call, app.show_payloads, width))
        .collect();
    render_tail(f, block, lines, sections[1]);
}

/// Renders `lines` scrolled so the newest entries stay visible.
fn render_tail(f: &mut Frame<'_>, block: Block<'static>, lines: Vec<Line<'static>>, area: Rect) {
    let height = block.inner(area).height as usize;
    let lines = if lines.is_empty() {
        vec![Line::from(Span::styled("Nothing yet.", Style::default().fg(FG_DIM)))]
    } else {
        lines
    };
    let offset = lines.len().saturating_sub(height);
    f.render_widget(
        Paragraph::new(lines)
            .block(block)
            .scroll((offset.min(u16::MAX as usize) as u16, 0)),
        area,
    );
}

fn trace_step_lines(step: &TraceStep, width: usize) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(vec![
        Span::styled(
            step.step_type.clone(),
            Style::default().fg(ROLE_SYSTEM).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("  {}", local_time(&step.created_at)),
            Style::default().fg(FG_DIM),
        ),
    ])];
    for line in step.content.lines() {
        push_wrapped_line(&mut lines, line, Style::default().fg(FG_PRIMARY), width);
    }
    lines
}

fn tool_call_lines(call: &ToolCall, show_payloads: bool, width: usize) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(vec![
        Span::styled(
            call.tool_name.clone(),
            Style::default().fg(ROLE_ASSISTANT).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("  {}", local_time(&call.created_at)),
            Style::default().fg(FG_DIM),
        ),
    ])];
    if show_payloads {
        for line in payload_text(call).lines() {
            push_wrapped_line(&mut lines, line, Style::default().fg(PAYLOAD_FG), width);
        }
    }
    lines
}

/// Pretty-printed `{input, output}` document of a tool call.
pub fn payload_text(call: &ToolCall) -> String {
    let document = json!({
        "input": call.input_payload,
        "output": call.output_payload,
    });
    serde_json::to_string_pretty(&document).unwrap_or_else(|_| document.to_string())
}

/// Formats a store timestamp as local wall-clock time.
///
/// Offset-less timestamps are read as local time; anything unparseable is
/// shown as received.
pub fn local_time(created_at: &str) -> String {
    const FORMAT: &str = "%H:%M:%S";
    if let Ok(stamp) = DateTime::parse_from_rfc3339(created_at) {
        return stamp.with_timezone(&Local).format(FORMAT).to_string();
    }
    NaiveDateTime::parse_from_str(created_at, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|stamp| stamp.format(FORMAT).to_string())
        .unwrap_or_else(|| created_at.to_string())
}

fn push_wrapped_line(lines: &mut Vec<Line<'static>>, text: &str, style: Style, width: usize) {
    for segment in wrap_to_width(text, width) {
        lines.push(Line::from(Span::styled(segment, style)));
    }
}

fn wrap_to_width(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }
    if text.is_empty() {
        return vec![String::new()];
    }
    let mut result = Vec::new();
    let mut current = String::new();
    let mut current_width = 0usize;
    for ch in text.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(1).max(1);
        if current_width + ch_width > width && !current.is_empty() {
            result.push(std::mem::take(&mut current));
            current_width = 0;
        }
        current.push(ch);
        current_width += ch_width;
    }
    result.push(current);
    result
}

fn render_status_bar(f: &mut Frame<'_>, app: &App, area: Rect) {
    let bg = match app.status.kind {
        StatusKind::Info => BAR_BG,
        StatusKind::Error => BAR_ERROR_BG,
    };
    let style = Style::default().fg(BAR_TEXT).bg(bg);

    let segments = [
        format!("[API:{}]", app.session.store_name()),
        format!(
            "[AUTO:{}]",
            if app.session.telemetry().auto_refresh() {
                "ON"
            } else {
                "OFF"
            }
        ),
        format!("[PAY:{}]", if app.show_payloads { "ON" } else { "OFF" }),
    ];
    let mut spans = Vec::new();
    let mut used = 0u16;
    for segment in segments {
        used = used.saturating_add(cell_width(&segment) + 1);
        spans.push(Span::styled(segment, style));
        spans.push(Span::styled(" ", style));
    }
    let remaining = area.width.saturating_sub(used) as usize;
    let notice = wrap_to_width(&app.status.text, remaining.max(1))
        .into_iter()
        .next()
        .unwrap_or_default();
    spans.push(Span::styled(notice, style.add_modifier(Modifier::BOLD)));

    f.render_widget(Clear, area);
    f.render_widget(Paragraph::new(Line::from(spans)).style(style), area);
}

fn render_overlay(f: &mut Frame<'_>, overlay: &OverlayState) {
    match overlay {
        OverlayState::InputPrompt(state) => render_input_prompt_overlay(f, state),
    }
}

fn render_input_prompt_overlay(f: &mut Frame<'_>, state: &InputPromptState) {
    let area = centered_rect(60, 30, f.size());
    f.render_widget(Clear, area);
    let block = Block::default()
        .title(Span::styled(
            state.title.as_str(),
            Style::default().fg(BAR_TEXT).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(PROMPT_BORDER))
        .style(Style::default().bg(PROMPT_BG));
    f.render_widget(block.clone(), area);
    let inner = block.inner(area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(inner);

    let placeholder =
        Paragraph::new(state.placeholder.as_str()).style(Style::default().fg(FG_DIM).bg(PROMPT_BG));
    f.render_widget(placeholder, chunks[0]);

    let input = Paragraph::new(Line::from(vec![
        Span::styled("> ", Style::default().fg(FG_PRIMARY)),
        Span::styled(state.value.as_str(), Style::default().fg(Color::White)),
        Span::styled(" ▍", Style::default().fg(BORDER_FOCUS)),
    ]))
    .style(Style::default().bg(PROMPT_BG));
    f.render_widget(input, chunks[1]);

    let footer = match state.error.as_ref() {
        Some(error) => {
            Paragraph::new(error.as_str()).style(Style::default().fg(Color::LightRed).bg(PROMPT_BG))
        }
        None => Paragraph::new("Enter confirm · Esc cancel")
            .style(Style::default().fg(FG_DIM).bg(PROMPT_BG)),
    };
    f.render_widget(footer, chunks[2]);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(horizontal[1])[1]
}
