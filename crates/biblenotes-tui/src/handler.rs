use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use std::cell::RefCell;
use std::rc::Rc;

use crate::app::{App, FocusPane, LoginField, NoteField, Overlay, PaneState, RightTab};
use crate::tui::AppEvent;

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {
            // Layout re-measures on the next render pass
        }
        AppEvent::Tick => {
            app.on_tick();
            app.poll_tasks().await;
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.overlay.is_none() {
        handle_normal_key(app, key);
    } else {
        handle_overlay_key(app, key);
    }
}

fn handle_normal_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Focus cycling
        KeyCode::Tab => {
            app.focus = match app.focus {
                FocusPane::Notes => FocusPane::Bible,
                FocusPane::Bible => FocusPane::Right,
                FocusPane::Right => FocusPane::Notes,
            };
        }

        // Row navigation / scrolling
        KeyCode::Char('j') | KeyCode::Down => match app.focus {
            FocusPane::Bible => app.select_adjacent_verse(1),
            FocusPane::Notes => scroll_pane(&app.notes_pane, 1.0),
            FocusPane::Right => {
                if app.right_tab == RightTab::Concordance {
                    let len = app.filtered_concordance_hits().len();
                    if len > 0 {
                        app.concordance_selected = (app.concordance_selected + 1).min(len - 1);
                    }
                } else {
                    scroll_pane(&app.right_pane, 1.0);
                }
            }
        },
        KeyCode::Char('k') | KeyCode::Up => match app.focus {
            FocusPane::Bible => app.select_adjacent_verse(-1),
            FocusPane::Notes => scroll_pane(&app.notes_pane, -1.0),
            FocusPane::Right => {
                if app.right_tab == RightTab::Concordance {
                    app.concordance_selected = app.concordance_selected.saturating_sub(1);
                } else {
                    scroll_pane(&app.right_pane, -1.0);
                }
            }
        },
        KeyCode::PageDown => scroll_focused_half_page(app, 1.0),
        KeyCode::PageUp => scroll_focused_half_page(app, -1.0),
        KeyCode::Char('g') => {
            if app.focus == FocusPane::Bible {
                if let Some(first) = app.chapter.as_ref().and_then(|c| c.verses.first()) {
                    let verse = first.verse;
                    app.select_verse_by_click(verse);
                    app.bible.borrow_mut().view.set_scroll(0.0);
                }
            }
        }
        KeyCode::Char('G') => {
            if app.focus == FocusPane::Bible {
                if let Some(last) = app.chapter.as_ref().and_then(|c| c.verses.last()) {
                    let verse = last.verse;
                    app.select_verse_by_click(verse);
                    let mut bible = app.bible.borrow_mut();
                    let max = bible.max_scroll();
                    bible.view.set_scroll(max);
                }
            }
        }

        // Word cursor within the selected verse
        KeyCode::Char('h') | KeyCode::Left => {
            if app.focus == FocusPane::Bible {
                app.move_word_cursor(-1);
            }
        }
        KeyCode::Char('l') | KeyCode::Right => {
            if app.focus == FocusPane::Bible {
                app.move_word_cursor(1);
            }
        }

        KeyCode::Enter => match app.focus {
            FocusPane::Bible => {
                if app.word_cursor.is_some() {
                    app.select_word();
                } else if let Some(verse) = app.selected_verse().map(|v| v.verse) {
                    app.select_verse_by_click(verse);
                }
            }
            FocusPane::Right => {
                if app.right_tab == RightTab::Concordance {
                    app.open_selected_hit();
                }
            }
            FocusPane::Notes => {}
        },

        // Chapter / book traversal
        KeyCode::Char('n') => app.change_chapter(1),
        KeyCode::Char('p') => app.change_chapter(-1),
        KeyCode::Char(']') => app.change_book(1),
        KeyCode::Char('[') => app.change_book(-1),

        // Pane toggles
        KeyCode::Char('s') => app.toggle_sync_notes(),
        KeyCode::Char('1') => app.set_right_tab(RightTab::Commentaries),
        KeyCode::Char('2') => app.set_right_tab(RightTab::Manuscripts),
        KeyCode::Char('3') => app.set_right_tab(RightTab::Concordance),

        // Tab-specific controls
        KeyCode::Char('e') => match (app.focus, app.right_tab) {
            (FocusPane::Right, RightTab::Manuscripts) => app.select_manuscript_edition(1),
            _ => app.open_note_editor_for_existing(),
        },
        KeyCode::Char('c') => {
            if app.right_tab == RightTab::Commentaries {
                app.cycle_commentator();
            }
        }
        KeyCode::Char('t') => {
            if app.right_tab == RightTab::Concordance {
                app.testament_filter = app.testament_filter.next();
                app.concordance_selected = 0;
            }
        }
        KeyCode::Char('f') => {
            if app.right_tab == RightTab::Concordance {
                app.cycle_book_filter();
            }
        }
        KeyCode::Char('x') => {
            if app.right_tab == RightTab::Concordance {
                app.toggle_concordance_expanded();
            }
        }
        KeyCode::Char('<') => app.nudge_alignment(-1),
        KeyCode::Char('>') => app.nudge_alignment(1),

        KeyCode::Char('T') => app.cycle_tag_filter(),
        KeyCode::Char('v') => app.toggle_selection_mode(),

        KeyCode::Char('b') => app.toggle_backlinks_for_selected_verse(),
        KeyCode::Char('a') => app.open_note_editor_for_selected_verse(),

        // Inputs
        KeyCode::Char(':') => app.overlay = Overlay::Reference { input: String::new() },
        KeyCode::Char('/') => {
            app.overlay = Overlay::ConcordanceSearch {
                input: app.concordance_query.clone(),
            }
        }
        KeyCode::Char('L') => {
            if app.is_authenticated() {
                app.logout();
            } else {
                app.overlay = Overlay::Login {
                    email: String::new(),
                    password: String::new(),
                    field: LoginField::Email,
                    signup: false,
                };
            }
        }

        _ => {}
    }
}

fn scroll_pane(pane: &Rc<RefCell<PaneState>>, delta: f32) {
    let mut state = pane.borrow_mut();
    let max = state.max_scroll();
    state.view.scroll_by(delta, max);
}

fn scroll_focused_half_page(app: &mut App, direction: f32) {
    let pane = match app.focus {
        FocusPane::Notes => &app.notes_pane,
        FocusPane::Bible => &app.bible,
        FocusPane::Right => &app.right_pane,
    };
    let mut state = pane.borrow_mut();
    let half = (state.viewport_rows / 2.0).max(1.0);
    let max = state.max_scroll();
    state.view.scroll_by(direction * half, max);
}

fn handle_overlay_key(app: &mut App, key: KeyEvent) {
    match &mut app.overlay {
        Overlay::None => {}

        Overlay::Reference { input } => match key.code {
            KeyCode::Esc => app.overlay = Overlay::None,
            KeyCode::Enter => {
                let text = input.clone();
                app.overlay = Overlay::None;
                app.go_to_reference_text(&text);
            }
            KeyCode::Backspace => {
                input.pop();
            }
            KeyCode::Char(c) => input.push(c),
            _ => {}
        },

        Overlay::ConcordanceSearch { input } => match key.code {
            KeyCode::Esc => app.overlay = Overlay::None,
            KeyCode::Enter => {
                let query = input.trim().to_string();
                app.overlay = Overlay::None;
                app.concordance_query = query;
                app.set_right_tab(RightTab::Concordance);
                app.spawn_concordance_fetch();
            }
            KeyCode::Backspace => {
                input.pop();
            }
            KeyCode::Char(c) => input.push(c),
            _ => {}
        },

        Overlay::Login { email, password, field, signup } => match key.code {
            KeyCode::Esc => app.overlay = Overlay::None,
            KeyCode::Tab => {
                *field = match field {
                    LoginField::Email => LoginField::Password,
                    LoginField::Password => LoginField::Email,
                };
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                *signup = !*signup;
            }
            KeyCode::Enter => {
                let (email, password, signup) = (email.clone(), password.clone(), *signup);
                app.overlay = Overlay::None;
                app.spawn_login(email, password, signup);
            }
            KeyCode::Backspace => {
                match field {
                    LoginField::Email => email.pop(),
                    LoginField::Password => password.pop(),
                };
            }
            KeyCode::Char(c) => match field {
                LoginField::Email => email.push(c),
                LoginField::Password => password.push(c),
            },
            _ => {}
        },

        Overlay::NoteEditor { title, content, tags, is_public, field, .. } => match key.code {
            KeyCode::Esc => app.overlay = Overlay::None,
            KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                app.spawn_note_save();
            }
            KeyCode::Char('p') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                *is_public = !*is_public;
            }
            KeyCode::Tab => {
                *field = match field {
                    NoteField::Title => NoteField::Content,
                    NoteField::Content => NoteField::Tags,
                    NoteField::Tags => NoteField::Title,
                };
            }
            KeyCode::Enter => match field {
                // Enter inside the body is a newline; elsewhere it advances
                NoteField::Content => content.push('\n'),
                NoteField::Title => *field = NoteField::Content,
                NoteField::Tags => app.spawn_note_save(),
            },
            KeyCode::Backspace => {
                match field {
                    NoteField::Title => title.pop(),
                    NoteField::Content => content.pop(),
                    NoteField::Tags => tags.pop(),
                };
            }
            KeyCode::Char(c) => match field {
                NoteField::Title => title.push(c),
                NoteField::Content => content.push(c),
                NoteField::Tags => tags.push(c),
            },
            _ => {}
        },
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let position = (mouse.column, mouse.row);
    match mouse.kind {
        MouseEventKind::Down(_) => {
            // A click in the Bible pane selects the verse under the cursor;
            // subscriber panes highlight without scrolling
            let hit = {
                let bible = app.bible.borrow();
                match bible.area {
                    Some(area) if contains(area, position) => {
                        let content_row =
                            (position.1 - area.y) as f32 + bible.view.scroll();
                        bible.verse_at_row(content_row)
                    }
                    _ => None,
                }
            };
            if let Some(verse) = hit {
                app.focus = FocusPane::Bible;
                app.select_verse_by_click(verse);
            }
        }
        MouseEventKind::ScrollDown => scroll_pane_at(app, position, 3.0),
        MouseEventKind::ScrollUp => scroll_pane_at(app, position, -3.0),
        _ => {}
    }
}

fn contains(area: ratatui::layout::Rect, position: (u16, u16)) -> bool {
    let (x, y) = position;
    x >= area.x && x < area.x + area.width && y >= area.y && y < area.y + area.height
}

fn scroll_pane_at(app: &mut App, position: (u16, u16), delta: f32) {
    for pane in [&app.notes_pane, &app.bible, &app.right_pane] {
        let in_area = pane
            .borrow()
            .area
            .map(|a| contains(a, position))
            .unwrap_or(false);
        if in_area {
            scroll_pane(pane, delta);
            return;
        }
    }
}
