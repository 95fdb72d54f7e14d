use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Wrap,
    },
};

use crate::app::{App, FocusPane, InputMode};
use crate::transcript::Role;

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut current_text = String::new();

    while let Some((_, c)) = chars.next() {
        if c == '*' {
            // Check for ** (bold)
            if chars.peek().map(|(_, c)| *c) == Some('*') {
                // Consume the second *
                chars.next();

                // Push any accumulated plain text
                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }

                // Find closing **
                let mut bold_text = String::new();
                let mut found_close = false;

                while let Some((_, c)) = chars.next() {
                    if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
                        chars.next(); // consume second *
                        found_close = true;
                        break;
                    }
                    bold_text.push(c);
                }

                if found_close && !bold_text.is_empty() {
                    spans.push(Span::styled(
                        bold_text,
                        Style::default().add_modifier(Modifier::BOLD),
                    ));
                } else {
                    // No closing **, treat as literal
                    current_text.push_str("**");
                    current_text.push_str(&bold_text);
                }
            } else {
                // Single * - could be italic, but for now treat as literal
                current_text.push(c);
            }
        } else {
            current_text.push(c);
        }
    }

    // Push any remaining text
    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    if app.panel_open {
        let [reader_area, panel_area] = Layout::horizontal([
            Constraint::Percentage(60),
            Constraint::Percentage(40),
        ])
        .areas(body_area);

        render_reader(app, frame, reader_area);
        render_assistant_panel(app, frame, panel_area);
    } else {
        app.chat_area = None;
        render_reader(app, frame, body_area);
    }

    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let page_indicator = match app.current_page {
        Some(idx) => format!(" [{}/{}]", idx + 1, app.book.pages().len()),
        None => String::new(),
    };

    let title = Line::from(vec![
        Span::styled(" docent ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(page_indicator, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_reader(app: &mut App, frame: &mut Frame, area: Rect) {
    // Split into navigation (left) and content (right)
    let [nav_area, content_area] = Layout::horizontal([
        Constraint::Length(28),
        Constraint::Min(0),
    ])
    .areas(area);

    // Store areas for mouse hit-testing
    app.nav_area = Some(nav_area);
    app.content_area = Some(content_area);

    render_navigation(app, frame, nav_area);
    render_content(app, frame, content_area);
}

fn render_navigation(app: &mut App, frame: &mut Frame, area: Rect) {
    let nav_focused = app.focus == FocusPane::Navigation;
    let border_color = if nav_focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Pages ");

    let items: Vec<ListItem> = app
        .book
        .pages()
        .iter()
        .map(|p| ListItem::new(format!(" {} ", p.title)))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.nav_state);
}

fn render_content(app: &mut App, frame: &mut Frame, area: Rect) {
    let content_focused = app.focus == FocusPane::Content;
    let border_color = if content_focused { Color::Cyan } else { Color::DarkGray };

    let title = app.current_page_title().unwrap_or("docent").to_string();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" {} ", title));

    let inner_area = block.inner(area);
    app.content_height = inner_area.height;

    if app.current_page.is_none() {
        let placeholder = Paragraph::new("No pages found in the docs directory")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    app.ensure_content_rows(inner_area.width);

    let total_rows = app.content_rows.len() as u16;
    let max_scroll = total_rows.saturating_sub(inner_area.height);
    if app.content_scroll > max_scroll {
        app.content_scroll = max_scroll;
    }

    let selection = app.selection_range();
    let cursor = app.content_cursor;

    // Rows are pre-wrapped so each visual row maps back to a source line;
    // styling is applied per row instead of through Wrap.
    let lines: Vec<Line> = app
        .content_rows
        .iter()
        .skip(app.content_scroll as usize)
        .take(inner_area.height as usize)
        .map(|row| {
            let in_selection =
                selection.is_some_and(|(start, end)| row.line >= start && row.line <= end);
            let is_cursor = content_focused && row.line == cursor;

            let style = if in_selection {
                let style = Style::default().bg(Color::Blue).fg(Color::White);
                if is_cursor {
                    style.add_modifier(Modifier::BOLD)
                } else {
                    style
                }
            } else if is_cursor {
                Style::default().bg(Color::DarkGray)
            } else {
                Style::default()
            };

            Line::from(Span::styled(row.text.clone(), style))
        })
        .collect();

    let paragraph = Paragraph::new(lines).block(block);
    frame.render_widget(paragraph, area);

    // Render scrollbar
    if total_rows > inner_area.height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("^"))
            .end_symbol(Some("v"));

        let mut scrollbar_state =
            ScrollbarState::new(total_rows as usize).position(app.content_scroll as usize);

        frame.render_stateful_widget(
            scrollbar,
            area.inner(ratatui::layout::Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

fn render_assistant_panel(app: &mut App, frame: &mut Frame, area: Rect) {
    // Chat history on top, input at the bottom
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll and wrap calculations
    // (inner size minus borders)
    app.chat_area = Some(chat_area);
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let chat_focused = app.focus == FocusPane::Transcript;
    let border_color = if chat_focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" AI Assistant ");

    let mut lines: Vec<Line> = Vec::new();

    for msg in app.transcript.messages() {
        let time = msg.timestamp.format("%H:%M");
        match msg.role {
            Role::User => {
                lines.push(Line::from(vec![
                    Span::styled(
                        "You",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(format!("  {time}"), Style::default().fg(Color::DarkGray)),
                ]));
                for line in msg.content.lines() {
                    lines.push(Line::from(line.to_string()));
                }
                lines.push(Line::default());
            }
            Role::Assistant => {
                lines.push(Line::from(vec![
                    Span::styled(
                        "AI",
                        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(format!("  {time}"), Style::default().fg(Color::DarkGray)),
                ]));
                // Split reply into lines and parse markdown
                for line in msg.content.lines() {
                    lines.push(parse_markdown_line(line));
                }
                lines.push(Line::default());
            }
        }
    }

    if app.loading {
        lines.push(Line::from(Span::styled(
            "AI",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            dots,
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    // Estimate the wrapped height so the view can stick to the newest
    // message. Use character count, not byte length, for UTF-8 content.
    let wrap_width = if app.chat_width > 0 {
        app.chat_width as usize
    } else {
        50
    };

    let mut total_lines: u16 = 0;
    for msg in app.transcript.messages() {
        total_lines += 1; // Role line
        for line in msg.content.lines() {
            let char_count = line.chars().count();
            if char_count == 0 {
                total_lines += 1; // Empty line still takes one line
            } else {
                total_lines += ((char_count / wrap_width) + 1) as u16;
            }
        }
        total_lines += 1; // Blank line after message
    }
    if app.loading {
        total_lines += 2; // Role line + animated dots
    }

    let max_scroll = total_lines.saturating_sub(app.chat_height);
    if app.transcript.stick_to_bottom() {
        app.chat_scroll = max_scroll;
    } else if app.chat_scroll >= max_scroll {
        // Scrolled back down to the newest message: resume sticking
        app.chat_scroll = max_scroll;
        app.transcript.set_stick_to_bottom(true);
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let input_focused = app.focus == FocusPane::Input;
    let editing = app.input_mode == InputMode::Editing;

    let border_color = if app.loading {
        Color::DarkGray
    } else if input_focused || editing {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let title = if app.loading {
        " Ask (waiting for reply) "
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
    let cursor_pos = app.input_cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let input = if app.input.is_empty() {
        Paragraph::new("Ask about the book content...")
            .style(Style::default().fg(Color::DarkGray))
            .block(block)
    } else {
        // Get the visible slice of the input
        let visible_text: String = app
            .input
            .chars()
            .skip(scroll_offset)
            .take(inner_width)
            .collect();

        // Cyan text to match the "You" transcript style
        Paragraph::new(visible_text)
            .style(Style::default().fg(Color::Cyan))
            .block(block)
    };

    frame.render_widget(input, area);

    // Show cursor when editing
    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let in_panel = matches!(app.focus, FocusPane::Transcript | FocusPane::Input);
    let mode_text = if in_panel { " ASSISTANT " } else { " READ " };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = match app.input_mode {
        InputMode::Editing => {
            let mut hints = vec![
                Span::styled(" Enter ", key_style),
                Span::styled(" send ", label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(" done ", label_style),
            ];
            if app.loading {
                hints.push(Span::styled(
                    " waiting for reply... ",
                    Style::default().fg(Color::DarkGray),
                ));
            }
            hints
        }
        InputMode::Normal => {
            let mut hints = match app.focus {
                FocusPane::Navigation => vec![
                    Span::styled(" j/k ", key_style),
                    Span::styled(" nav ", label_style),
                    Span::styled(" Enter ", key_style),
                    Span::styled(" open ", label_style),
                ],
                FocusPane::Content => vec![
                    Span::styled(" j/k ", key_style),
                    Span::styled(" move ", label_style),
                    Span::styled(" v ", key_style),
                    Span::styled(" select ", label_style),
                    Span::styled(" Esc ", key_style),
                    Span::styled(" clear ", label_style),
                ],
                FocusPane::Transcript => vec![
                    Span::styled(" j/k ", key_style),
                    Span::styled(" scroll ", label_style),
                    Span::styled(" g/G ", key_style),
                    Span::styled(" top/latest ", label_style),
                ],
                FocusPane::Input => vec![], // Handled by Editing mode
            };
            hints.extend(vec![
                Span::styled(" Tab ", key_style),
                Span::styled(" focus ", label_style),
                Span::styled(" a ", key_style),
                Span::styled(
                    if app.panel_open { " close " } else { " assistant " },
                    label_style,
                ),
                Span::styled(" q ", key_style),
                Span::styled(" quit ", label_style),
            ]);
            hints
        }
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}
