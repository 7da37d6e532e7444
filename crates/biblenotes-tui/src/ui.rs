use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};
use std::cell::RefCell;
use std::rc::Rc;

use biblenotes_core::align::{aligned_source_index, content_token_indices, tokenize, AlignmentOverrides};
use biblenotes_core::model::Note;

use crate::app::{App, FocusPane, LoginField, NoteField, Overlay, PaneState, RightTab, RowLayout};
use crate::tui::now_ms;

/// Wrap text to fit within a given width, breaking on word boundaries
fn wrap_text_to_width(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if current_len == 0 {
            current_line = word.to_string();
            current_len = word_len;
        } else if current_len + 1 + word_len <= width {
            current_line.push(' ');
            current_line.push_str(word);
            current_len += 1 + word_len;
        } else {
            lines.push(current_line);
            current_line = word.to_string();
            current_len = word_len;
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}

/// Flow styled word spans into lines of at most `width` cells
fn flow_spans(words: Vec<Span<'static>>, width: usize) -> Vec<Line<'static>> {
    let width = width.max(1);
    let mut lines: Vec<Line> = Vec::new();
    let mut current: Vec<Span> = Vec::new();
    let mut current_len = 0usize;

    for word in words {
        let word_len = word.content.chars().count();
        if current_len > 0 && current_len + 1 + word_len > width {
            lines.push(Line::from(std::mem::take(&mut current)));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(Span::raw(" "));
            current_len += 1;
        }
        current_len += word_len;
        current.push(word);
    }
    if !current.is_empty() {
        lines.push(Line::from(current));
    }
    if lines.is_empty() {
        lines.push(Line::from(""));
    }
    lines
}

/// One verse-keyed row with its rendered lines; `lines.len()` is the
/// natural height the reconciler broadcasts
struct RowContent {
    verse: u32,
    lines: Vec<Line<'static>>,
}

pub fn render(frame: &mut Frame, app: &mut App) {
    let chunks = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(1),
    ])
    .split(frame.area());

    render_header(frame, app, chunks[0]);

    let panes = Layout::horizontal([
        Constraint::Percentage(28),
        Constraint::Percentage(40),
        Constraint::Percentage(32),
    ])
    .split(chunks[1]);

    render_notes_pane(frame, app, panes[0]);
    render_bible_pane(frame, app, panes[1]);
    render_right_pane(frame, app, panes[2]);

    render_status(frame, app, chunks[2]);
    render_overlay(frame, app);

    // Measurement pass: broadcast natural heights for the panes that
    // currently align; reconciliation converges over the next frames
    app.record_pane_measurement(&app.bible);
    app.record_pane_measurement(&app.notes_pane);
    app.record_pane_measurement(&app.right_pane);
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let sync = if app.sync_notes { "on" } else { "off" };
    let auth = if app.is_authenticated() {
        app.profile
            .as_ref()
            .and_then(|p| p.display_name.clone())
            .unwrap_or_else(|| "logged in".to_string())
    } else {
        "anonymous".to_string()
    };
    let line = Line::from(vec![
        Span::styled("Bible Notes", Style::default().bold().fg(Color::Cyan)),
        Span::raw(format!(
            "  {} · {} {}  sync:{}  [{}]",
            app.selected_version, app.selected_book, app.selected_chapter, sync, auth
        )),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
    let hint = match app.focus {
        FocusPane::Bible => "j/k verse  h/l word  Enter select  : goto  / search  a note  s sync",
        FocusPane::Notes => "j/k scroll  b backlinks  e edit  s sync",
        FocusPane::Right => match app.right_tab {
            RightTab::Commentaries => "1/2/3 tab  c commentator  j/k scroll",
            RightTab::Manuscripts => "1/2/3 tab  e edition  </> nudge alignment",
            RightTab::Concordance => "1/2/3 tab  j/k hit  Enter goto  t/f filter  x expand",
        },
    };
    let text = if app.status.is_empty() {
        hint.to_string()
    } else {
        format!("{}  ·  {}", app.status, hint)
    };
    frame.render_widget(
        Paragraph::new(text).style(Style::default().fg(Color::DarkGray)),
        area,
    );
}

fn pane_block<'a>(title: &'a str, focused: bool) -> Block<'a> {
    let border_style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(title)
}

/// Render a pane's verse-keyed rows: store layout geometry for the
/// reconciler and mouse hit-testing, then paint the visible slice with
/// forced heights and the alignment margin applied.
fn render_rows(
    frame: &mut Frame,
    state: &Rc<RefCell<PaneState>>,
    inner: Rect,
    header_lines: Vec<Line<'static>>,
    rows: Vec<RowContent>,
) {
    let mut pane = state.borrow_mut();
    pane.viewport_rows = inner.height as f32;
    pane.top_offset = header_lines.len() as f32;

    // Layout pass: natural heights from content, render heights from the
    // reconciler's forced constraints
    let mut layouts = Vec::with_capacity(rows.len());
    let mut top = 0.0f32;
    for row in &rows {
        let natural = row.lines.len() as f32;
        let height = pane.recon.row_height(row.verse, natural);
        layouts.push(RowLayout {
            verse: row.verse,
            top,
            height,
            natural,
        });
        top += height;
    }
    pane.rows = layouts;

    // Paint pass
    let mut lines: Vec<Line> = header_lines;
    let margin = pane.recon.extra_margin() as usize;
    for _ in 0..margin {
        lines.push(Line::from(""));
    }
    for (row, layout) in rows.into_iter().zip(pane.rows.iter()) {
        let padding = (layout.height - layout.natural).max(0.0) as usize;
        lines.extend(row.lines);
        for _ in 0..padding {
            lines.push(Line::from(""));
        }
    }

    let scroll = pane.view.scroll() as usize;
    let visible: Vec<Line> = lines.into_iter().skip(scroll).collect();
    frame.render_widget(Paragraph::new(visible), inner);
}

fn render_bible_pane(frame: &mut Frame, app: &App, area: Rect) {
    let block = pane_block("Bible Text", app.focus == FocusPane::Bible);
    let inner = block.inner(area);
    frame.render_widget(block, area);
    app.bible.borrow_mut().area = Some(inner);

    let Some(chapter) = app.chapter.as_ref() else {
        let message = if app.loading_chapter {
            "Loading chapter..."
        } else {
            "Select a version, book, and chapter to begin."
        };
        frame.render_widget(Paragraph::new(message).dim(), inner);
        app.bible.borrow_mut().rows.clear();
        return;
    };

    let now = now_ms();
    let width = inner.width.saturating_sub(1) as usize;
    let flashed = app.nav.highlighted_verse(now);
    let mut rows = Vec::with_capacity(chapter.verses.len());

    for verse in &chapter.verses {
        let selected = app.selected_verse_id == Some(verse.id);
        let number_style = if flashed == Some(verse.verse) {
            Style::default().fg(Color::Black).bg(Color::Yellow)
        } else if selected {
            Style::default().fg(Color::Yellow).bold()
        } else {
            Style::default().fg(Color::DarkGray)
        };

        let mut words: Vec<Span<'static>> =
            vec![Span::styled(format!("{}", verse.verse), number_style)];
        let tokens = tokenize(&verse.text);
        for (i, token) in tokens.iter().enumerate() {
            let style = if selected && app.word_cursor == Some(i) {
                Style::default().add_modifier(Modifier::REVERSED)
            } else if selected {
                Style::default()
            } else {
                Style::default().fg(Color::Gray)
            };
            words.push(Span::styled(token.clone(), style));
        }
        let mut lines = flow_spans(words, width);
        if !verse.backlinks.is_empty() {
            lines.push(Line::from(Span::styled(
                format!("Backlinks: {}", verse.backlinks.len()),
                Style::default().fg(Color::Blue),
            )));
        }
        lines.push(Line::from(""));
        rows.push(RowContent {
            verse: verse.verse,
            lines,
        });
    }

    render_rows(frame, &app.bible, inner, Vec::new(), rows);
}

fn render_notes_pane(frame: &mut Frame, app: &App, area: Rect) {
    let title = if app.sync_notes {
        "My Notes [sync]"
    } else {
        "My Notes"
    };
    let block = pane_block(title, app.focus == FocusPane::Notes);
    let inner = block.inner(area);
    frame.render_widget(block, area);
    app.notes_pane.borrow_mut().area = Some(inner);

    let width = inner.width.saturating_sub(1) as usize;
    let now = now_ms();
    let flashed = app.notes_pane.borrow().view.flashed_verse(now);

    let notes = app.visible_notes();

    if !app.sync_notes {
        // Plain chronological card list; not verse-keyed, so it does not
        // take part in height reconciliation
        let mut lines: Vec<Line> = Vec::new();
        if let Some(tag) = &app.active_tag {
            lines.push(Line::from(Span::styled(
                format!("Filter: #{tag}"),
                Style::default().fg(Color::Magenta),
            )));
        }
        if notes.is_empty() {
            lines.push(Line::from(Span::raw("No notes yet for this chapter.").dim()));
        }
        for note in notes.iter().copied() {
            push_note_card(&mut lines, note, width, false);
            lines.push(Line::from(""));
        }
        let scroll = app.notes_pane.borrow().view.scroll() as usize;
        let visible: Vec<Line> = lines.into_iter().skip(scroll).collect();
        frame.render_widget(Paragraph::new(visible), inner);
        app.notes_pane.borrow_mut().rows.clear();
        return;
    }

    // Sync mode: one row per verse, placeholder cards for verses without
    // notes, backlinks filtered to the current user's own notes
    let verses = app
        .chapter
        .as_ref()
        .map(|c| c.verses.as_slice())
        .unwrap_or(&[]);
    let my_id = app.current_user_id();
    let mut rows = Vec::with_capacity(verses.len());

    for verse in verses {
        let mut lines: Vec<Line> = Vec::new();
        let highlight = flashed == Some(verse.verse);
        let verse_notes: Vec<&Note> = notes
            .iter()
            .copied()
            .filter(|n| n.start_verse == verse.verse)
            .collect();

        let my_backlinks: Vec<_> = verse
            .backlinks
            .iter()
            .filter(|b| my_id.map(|id| b.note_owner_id == id).unwrap_or(false))
            .collect();

        if verse_notes.is_empty() {
            let style = if highlight {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            lines.push(Line::from(Span::styled(
                format!("{} {}:{} · no notes", app.selected_book, verse.chapter, verse.verse),
                style,
            )));
        } else {
            for note in verse_notes.iter().copied() {
                push_note_card(&mut lines, note, width, highlight);
            }
        }

        let open = app.open_backlinks.contains(&verse.verse);
        lines.push(Line::from(Span::styled(
            format!(
                "Backlinks ({}) {}",
                my_backlinks.len(),
                if open { "▾" } else { "▸" }
            ),
            Style::default().fg(Color::Blue),
        )));
        if open {
            for backlink in &my_backlinks {
                lines.push(Line::from(Span::raw(format!(
                    "  {} · by {}",
                    backlink.note_title.as_deref().unwrap_or("Untitled"),
                    backlink.note_owner_name.as_deref().unwrap_or("Unknown"),
                ))));
            }
        }
        lines.push(Line::from(""));
        rows.push(RowContent {
            verse: verse.verse,
            lines,
        });
    }

    render_rows(frame, &app.notes_pane, inner, Vec::new(), rows);
}

fn push_note_card(lines: &mut Vec<Line<'static>>, note: &Note, width: usize, highlight: bool) {
    let title_style = if highlight {
        Style::default().fg(Color::Yellow).bold()
    } else {
        Style::default().bold()
    };
    lines.push(Line::from(Span::styled(
        note.title.clone().unwrap_or_else(|| "Untitled".to_string()),
        title_style,
    )));
    let visibility = if note.is_public { "Public" } else { "Private" };
    lines.push(Line::from(Span::styled(
        format!(
            "{} {}:{}-{} · {} · {}",
            note.start_book,
            note.start_chapter,
            note.start_verse,
            note.end_verse,
            visibility,
            note.updated_at
        ),
        Style::default().fg(Color::DarkGray),
    )));
    for line in note.content_markdown.lines() {
        for wrapped in wrap_text_to_width(line, width) {
            lines.push(Line::from(wrapped));
        }
    }
    if !note.tags.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("Tags: {}", note.tags.join(", ")),
            Style::default().fg(Color::Magenta),
        )));
    }
    if !note.cross_references.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("References: {}", note.cross_references.join(", ")),
            Style::default().fg(Color::Blue),
        )));
    }
}

fn render_right_pane(frame: &mut Frame, app: &App, area: Rect) {
    let title = match app.right_tab {
        RightTab::Commentaries => "[1]Commentaries  2:Manuscripts  3:Concordance",
        RightTab::Manuscripts => "1:Commentaries  [2]Manuscripts  3:Concordance",
        RightTab::Concordance => "1:Commentaries  2:Manuscripts  [3]Concordance",
    };
    let block = pane_block(title, app.focus == FocusPane::Right);
    let inner = block.inner(area);
    frame.render_widget(block, area);
    app.right_pane.borrow_mut().area = Some(inner);

    match app.right_tab {
        RightTab::Commentaries => render_commentary_tab(frame, app, inner),
        RightTab::Manuscripts => render_manuscripts_tab(frame, app, inner),
        RightTab::Concordance => render_concordance_tab(frame, app, inner),
    }
}

fn render_commentary_tab(frame: &mut Frame, app: &App, inner: Rect) {
    let width = inner.width.saturating_sub(1) as usize;
    let author = app
        .subscriptions
        .iter()
        .find(|s| Some(s.author_id) == app.selected_author_id)
        .and_then(|s| s.author_display_name.clone())
        .unwrap_or_else(|| "none".to_string());
    let header = vec![
        Line::from(Span::styled(
            format!("Commentator: {author}"),
            Style::default().fg(Color::Cyan),
        )),
        Line::from(""),
    ];

    let chapter_notes = app.chapter_author_notes();

    if !app.sync_notes {
        let mut lines = header;
        if chapter_notes.is_empty() {
            lines.push(Line::from(
                Span::raw("Select a commentator to view notes for this chapter.").dim(),
            ));
        }
        for note in chapter_notes.iter().copied() {
            push_note_card(&mut lines, note, width, false);
            lines.push(Line::from(""));
        }
        let scroll = app.right_pane.borrow().view.scroll() as usize;
        let visible: Vec<Line> = lines.into_iter().skip(scroll).collect();
        frame.render_widget(Paragraph::new(visible), inner);
        app.right_pane.borrow_mut().rows.clear();
        return;
    }

    // Sync Notes also aligns the commentary pane: verse-keyed rows with
    // placeholders where the commentator is silent
    let verses = app
        .chapter
        .as_ref()
        .map(|c| c.verses.as_slice())
        .unwrap_or(&[]);
    let flashed = app.right_pane.borrow().view.flashed_verse(now_ms());
    let mut rows = Vec::with_capacity(verses.len());
    for verse in verses {
        let mut lines: Vec<Line> = Vec::new();
        let highlight = flashed == Some(verse.verse);
        let verse_notes: Vec<&Note> = chapter_notes
            .iter()
            .copied()
            .filter(|n| n.covers_verse(verse.verse))
            .collect();
        if verse_notes.is_empty() {
            lines.push(Line::from(Span::styled(
                format!("{}:{} ·", verse.chapter, verse.verse),
                Style::default().fg(Color::DarkGray),
            )));
        } else {
            for note in verse_notes {
                push_note_card(&mut lines, note, width, highlight);
            }
        }
        lines.push(Line::from(""));
        rows.push(RowContent {
            verse: verse.verse,
            lines,
        });
    }
    render_rows(frame, &app.right_pane, inner, header, rows);
}

fn render_manuscripts_tab(frame: &mut Frame, app: &App, inner: Rect) {
    let width = inner.width.saturating_sub(1) as usize;
    let edition = app
        .ms_chapter
        .as_ref()
        .and_then(|c| c.edition.as_ref())
        .cloned()
        .or_else(|| {
            app.editions
                .iter()
                .find(|e| Some(&e.code) == app.selected_edition.as_ref())
                .cloned()
        });

    let header_text = match &edition {
        Some(e) => format!("Edition: {} · {} · {}", e.name, e.language, e.scope),
        None => "No manuscript editions available for this book yet.".to_string(),
    };
    let header = vec![
        Line::from(Span::styled(header_text, Style::default().fg(Color::Cyan))),
        Line::from(""),
    ];

    let Some(ms) = app.ms_chapter.as_ref() else {
        frame.render_widget(Paragraph::new(header), inner);
        app.right_pane.borrow_mut().rows.clear();
        return;
    };

    let language = edition.as_ref().map(|e| e.language.as_str()).unwrap_or("");
    let rtl = edition.as_ref().map(|e| e.is_rtl()).unwrap_or(false);
    let selected_word = app.right_pane.borrow().selected_word.clone();
    let overrides = app.prefs.alignment_overrides();
    let flashed = app.right_pane.borrow().view.flashed_verse(now_ms());

    let mut rows = Vec::with_capacity(ms.verses.len());
    for verse in &ms.verses {
        let highlight_token = selected_word.as_ref().and_then(|word| {
            if word.book != app.selected_book || word.verse != verse.verse {
                return None;
            }
            let tokens = tokenize(&verse.text);
            let content = content_token_indices(&tokens, language);
            let key = AlignmentOverrides::key(
                &word.book,
                word.chapter,
                word.verse,
                word.non_stop_index,
            );
            aligned_source_index(
                word.non_stop_index,
                word.non_stop_count,
                content.len(),
                overrides.get(&key),
            )
            .and_then(|content_idx| content.get(content_idx).copied())
        });

        let meta_style = if flashed == Some(verse.verse) {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let mut lines = vec![Line::from(Span::styled(
            format!("{}:{}", verse.chapter, verse.verse),
            meta_style,
        ))];

        let tokens = tokenize(&verse.text);
        let words: Vec<Span<'static>> = tokens
            .iter()
            .enumerate()
            .map(|(i, token)| {
                let style = if highlight_token == Some(i) {
                    Style::default().add_modifier(Modifier::REVERSED)
                } else {
                    Style::default()
                };
                Span::styled(token.clone(), style)
            })
            .collect();
        let mut text_lines = flow_spans(words, width);
        if rtl {
            for line in &mut text_lines {
                *line = std::mem::take(line).right_aligned();
            }
        }
        lines.extend(text_lines);
        lines.push(Line::from(""));
        rows.push(RowContent {
            verse: verse.verse,
            lines,
        });
    }

    render_rows(frame, &app.right_pane, inner, header, rows);
}

fn render_concordance_tab(frame: &mut Frame, app: &App, inner: Rect) {
    let mut lines: Vec<Line> = Vec::new();
    let hits = app.filtered_concordance_hits();
    let total_occurrences: u32 = hits.iter().map(|h| h.occurrences).sum();

    lines.push(Line::from(Span::styled(
        format!("Search: {}", app.concordance_query),
        Style::default().fg(Color::Cyan),
    )));
    if !app.concordance.query.is_empty() {
        lines.push(Line::from(Span::styled(
            format!(
                "{} verses, {} occurrences · {} · {}",
                hits.len(),
                total_occurrences,
                app.testament_filter.label(),
                app.book_filter.as_deref().unwrap_or("All Books"),
            ),
            Style::default().fg(Color::DarkGray),
        )));
    }
    lines.push(Line::from(""));

    if hits.is_empty() && !app.concordance.query.is_empty() {
        lines.push(Line::from(Span::raw("No matches found.").dim()));
    }

    let width = inner.width.saturating_sub(1) as usize;
    for (i, hit) in hits.iter().enumerate() {
        let selected = i == app.concordance_selected;
        let style = if selected {
            Style::default().fg(Color::Yellow).bold()
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(
            format!(
                "{} {}:{} · {}x",
                hit.book, hit.chapter, hit.verse, hit.occurrences
            ),
            style,
        )));
        if app.concordance_expanded {
            if let Some(text) = &hit.text {
                for wrapped in wrap_text_to_width(text, width) {
                    lines.push(Line::from(Span::raw(wrapped).dim()));
                }
            }
        }
    }

    // Keep the selected hit in view
    let selected_line = 3 + app.concordance_selected;
    let viewport = inner.height as usize;
    let scroll = selected_line.saturating_sub(viewport.saturating_sub(2));
    let visible: Vec<Line> = lines.into_iter().skip(scroll).collect();
    frame.render_widget(Paragraph::new(visible), inner);
    app.right_pane.borrow_mut().rows.clear();
}

fn render_overlay(frame: &mut Frame, app: &App) {
    if app.overlay.is_none() {
        return;
    }
    let area = centered_rect(60, 40, frame.area());
    frame.render_widget(Clear, area);

    let (title, lines) = match &app.overlay {
        Overlay::None => return,
        Overlay::Reference { input } => (
            "Go to reference",
            vec![
                Line::from(format!("Reference: {input}_")),
                Line::from(""),
                Line::from(Span::raw("e.g. Romans 3:16 · Enter to go · Esc to cancel").dim()),
            ],
        ),
        Overlay::ConcordanceSearch { input } => (
            "Concordance search",
            vec![
                Line::from(format!("Word: {input}_")),
                Line::from(""),
                Line::from(Span::raw("Enter to search · Esc to cancel").dim()),
            ],
        ),
        Overlay::Login { email, password, field, signup } => {
            let mask: String = "*".repeat(password.chars().count());
            let mark = |f: LoginField| if *field == f { ">" } else { " " };
            (
                if *signup { "Create account" } else { "Login" },
                vec![
                    Line::from(format!("{} Email:    {email}", mark(LoginField::Email))),
                    Line::from(format!("{} Password: {mask}", mark(LoginField::Password))),
                    Line::from(""),
                    Line::from(
                        Span::raw("Tab field · Enter submit · Ctrl-U signup/login · Esc cancel")
                            .dim(),
                    ),
                ],
            )
        }
        Overlay::NoteEditor { title, content, tags, is_public, field, note_id, .. } => {
            let mark = |f: NoteField| if *field == f { ">" } else { " " };
            let mut lines = vec![
                Line::from(format!("{} Title:   {title}", mark(NoteField::Title))),
                Line::from(format!("{} Content:", mark(NoteField::Content))),
            ];
            for content_line in content.lines() {
                lines.push(Line::from(format!("    {content_line}")));
            }
            lines.push(Line::from(format!("{} Tags:    {tags}", mark(NoteField::Tags))));
            lines.push(Line::from(format!(
                "  {} (Ctrl-P toggles)",
                if *is_public { "Public" } else { "Private" }
            )));
            lines.push(Line::from(""));
            lines.push(Line::from(
                Span::raw("Tab field · Ctrl-S save · Esc cancel").dim(),
            ));
            (
                if note_id.is_some() { "Edit note" } else { "Add note" },
                lines,
            )
        }
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(area);
    let horizontal = Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(vertical[1]);
    horizontal[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_respects_word_boundaries() {
        let lines = wrap_text_to_width("In the beginning God created the heaven", 12);
        assert!(lines.iter().all(|l| l.chars().count() <= 12));
        let rejoined = lines.join(" ");
        assert_eq!(rejoined, "In the beginning God created the heaven".replace("  ", " "));
    }

    #[test]
    fn wrap_zero_width_passes_through() {
        assert_eq!(wrap_text_to_width("abc def", 0), vec!["abc def".to_string()]);
    }

    #[test]
    fn wrap_empty_yields_one_blank_line() {
        assert_eq!(wrap_text_to_width("", 10), vec![String::new()]);
    }

    #[test]
    fn flow_spans_fills_lines() {
        let words: Vec<Span<'static>> = ["alpha", "beta", "gamma", "delta"]
            .iter()
            .map(|w| Span::raw(w.to_string()))
            .collect();
        let lines = flow_spans(words, 11);
        // "alpha beta" fits, "gamma delta" goes to the next line
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn flow_spans_never_returns_empty() {
        assert_eq!(flow_spans(Vec::new(), 10).len(), 1);
    }
}
