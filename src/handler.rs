use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::{App, FocusPane, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Selection(text) => app.submit_selection(text),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_key(app, key),
        InputMode::Editing => handle_editing_key(app, key),
    }
}

fn handle_normal_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => {
            app.should_quit = true;
            return;
        }
        KeyCode::Char('a') => {
            app.toggle_panel();
            return;
        }
        KeyCode::Tab => {
            cycle_focus(app);
            return;
        }
        _ => {}
    }

    match app.focus {
        FocusPane::Navigation => handle_nav_key(app, key),
        FocusPane::Content => handle_content_key(app, key),
        FocusPane::Transcript => handle_transcript_key(app, key),
        // The ask box is always in editing mode while focused
        FocusPane::Input => {}
    }
}

fn cycle_focus(app: &mut App) {
    app.focus = match app.focus {
        FocusPane::Navigation => FocusPane::Content,
        FocusPane::Content => {
            if app.panel_open {
                FocusPane::Transcript
            } else {
                FocusPane::Navigation
            }
        }
        FocusPane::Transcript => FocusPane::Input,
        FocusPane::Input => FocusPane::Navigation,
    };
    if app.focus == FocusPane::Input {
        app.input_mode = InputMode::Editing;
        app.input_cursor = app.input.chars().count();
    } else {
        app.input_mode = InputMode::Normal;
    }
}

fn handle_nav_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.nav_up(),
        KeyCode::Char('g') => app.nav_first(),
        KeyCode::Char('G') => app.nav_last(),
        KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => {
            app.open_selected_page();
            app.focus = FocusPane::Content;
        }
        _ => {}
    }
}

fn handle_content_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.content_cursor_down(app.half_page());
            report_selection_gesture(app);
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.content_cursor_up(app.half_page());
            report_selection_gesture(app);
        }
        KeyCode::Char('j') | KeyCode::Down => {
            app.content_cursor_down(1);
            report_selection_gesture(app);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.content_cursor_up(1);
            report_selection_gesture(app);
        }
        KeyCode::Char('g') => {
            app.content_cursor_top();
            report_selection_gesture(app);
        }
        KeyCode::Char('G') => {
            app.content_cursor_bottom();
            report_selection_gesture(app);
        }
        KeyCode::Char('v') => {
            app.toggle_selection_anchor();
            report_selection_gesture(app);
        }
        KeyCode::Esc => app.clear_selection(),
        KeyCode::Char('h') | KeyCode::Left | KeyCode::Backspace => {
            app.focus = FocusPane::Navigation;
        }
        _ => {}
    }
}

/// Selection-adjusting keys count as gesture ends while an anchor is active.
fn report_selection_gesture(app: &App) {
    if app.selection_anchor.is_some() {
        app.selection_watcher.gesture_end();
    }
}

fn handle_transcript_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.chat_scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.chat_scroll_up(1),
        KeyCode::Char('g') => {
            app.chat_scroll = 0;
            app.transcript.set_stick_to_bottom(false);
        }
        KeyCode::Char('G') => app.transcript.set_stick_to_bottom(true),
        KeyCode::Esc => app.focus = FocusPane::Content,
        _ => {}
    }
}

fn handle_editing_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
            app.focus = FocusPane::Transcript;
        }
        KeyCode::Tab => {
            app.input_mode = InputMode::Normal;
            app.focus = FocusPane::Navigation;
        }
        KeyCode::Enter => app.submit_typed(),
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            if app.input_cursor < app.input.chars().count() {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            app.input_cursor = (app.input_cursor + 1).min(app.input.chars().count());
        }
        KeyCode::Home => app.input_cursor = 0,
        KeyCode::End => app.input_cursor = app.input.chars().count(),
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
            app.input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
}

fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let in_nav = app.nav_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_content = app
        .content_area
        .map(|r| point_in_rect(x, y, r))
        .unwrap_or(false);
    let in_chat = app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            if in_chat {
                app.chat_scroll_down(3);
            } else if in_content {
                app.content_scroll_down(3);
            } else if in_nav {
                app.nav_down();
            }
        }
        MouseEventKind::ScrollUp => {
            if in_chat {
                app.chat_scroll_up(3);
            } else if in_content {
                app.content_scroll_up(3);
            } else if in_nav {
                app.nav_up();
            }
        }
        MouseEventKind::Down(MouseButton::Left) => {
            if in_content {
                if let Some(line) = app.content_line_at(x, y) {
                    app.focus = FocusPane::Content;
                    app.input_mode = InputMode::Normal;
                    app.content_cursor = line;
                    app.selection_anchor = Some(line);
                    app.mouse_dragging = false;
                    app.sync_selection_snapshot();
                }
            } else if in_nav {
                if let Some(idx) = app.nav_page_at(y) {
                    app.focus = FocusPane::Navigation;
                    app.input_mode = InputMode::Normal;
                    app.nav_state.select(Some(idx));
                    app.open_selected_page();
                }
            }
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            if app.selection_anchor.is_some() {
                if let Some(line) = app.content_line_at(x, y) {
                    app.mouse_dragging = true;
                    app.content_cursor = line;
                    app.sync_selection_snapshot();
                }
            }
        }
        MouseEventKind::Up(MouseButton::Left) => {
            if app.selection_anchor.is_some() {
                if app.mouse_dragging {
                    app.selection_watcher.gesture_end();
                } else {
                    // A plain click places the cursor without selecting
                    app.clear_selection();
                }
            }
            app.mouse_dragging = false;
        }
        _ => {}
    }
}
