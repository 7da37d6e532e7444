//! Per-pane view state: scroll position and the transient row flash.
//!
//! Panes are leaf consumers of the bus. They share only the verse-ordinal
//! keyspace; what a selection does to a pane depends on how it originated:
//! a click highlights the matching row without moving it (the click already
//! put the row in view in the originating pane), while programmatic
//! navigation scrolls the row into view.

use crate::bus::{SelectionSource, VerseSelected};

/// Flash duration for click-originated highlights
pub const FLASH_MS: u64 = 800;
/// Breathing room kept above a row scrolled into view
const SCROLL_PADDING: f32 = 1.0;

#[derive(Debug, Default)]
pub struct PaneView {
    scroll: f32,
    flash: Option<(u32, u64)>,
}

impl PaneView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scroll(&self) -> f32 {
        self.scroll
    }

    pub fn set_scroll(&mut self, scroll: f32) {
        self.scroll = scroll.max(0.0);
    }

    pub fn scroll_by(&mut self, delta: f32, max_scroll: f32) {
        self.scroll = (self.scroll + delta).clamp(0.0, max_scroll.max(0.0));
    }

    /// React to a verse selection. `row_top` maps a verse ordinal to its
    /// content-relative top position, when that row exists in this pane.
    pub fn on_verse_selected(
        &mut self,
        event: &VerseSelected,
        row_top: impl Fn(u32) -> Option<f32>,
        now_ms: u64,
    ) {
        match event.source {
            SelectionSource::Click => {
                // Highlight only; the scroll position stays put
                if row_top(event.verse).is_some() {
                    self.flash = Some((event.verse, now_ms + FLASH_MS));
                }
            }
            SelectionSource::Scroll => {
                if let Some(top) = row_top(event.verse) {
                    self.scroll = (top - SCROLL_PADDING).max(0.0);
                    self.flash = Some((event.verse, now_ms + FLASH_MS));
                }
            }
        }
    }

    /// Scroll a specific row into view (manuscripts-scroll requests)
    pub fn scroll_to_row(&mut self, top: f32) {
        self.scroll = (top - SCROLL_PADDING).max(0.0);
    }

    pub fn flashed_verse(&self, now_ms: u64) -> Option<u32> {
        self.flash
            .filter(|(_, until)| now_ms < *until)
            .map(|(verse, _)| verse)
    }

    pub fn reset(&mut self) {
        self.scroll = 0.0;
        self.flash = None;
    }
}
