//! Verse navigation: turn a reference request into pane actions.
//!
//! A request for a verse in another chapter (or version) is queued until
//! that chapter's verses arrive; if the loaded chapter never contains the
//! target ordinal the navigation is silently abandoned - chapter-switch
//! races make that a legitimate outcome, not an error. Row lookup after a
//! reload is retried across a bounded number of frames, because the pane
//! may not have laid its rows out yet; the retry state carries a
//! cancellation flag that teardown sets, so no attempt outlives its pane.

use std::cell::Cell;
use std::rc::Rc;

use crate::bus::{SelectionSource, VerseSelected};

/// Frame attempts before a goto gives up on finding its row
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 12;
/// How long the transient verse highlight lasts
pub const HIGHLIGHT_MS: u64 = 1200;

/// Cancellation flag shared with in-flight retries; checked before every
/// attempt
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Rc<Cell<bool>>,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.flag.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.get()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GotoRequest {
    pub book: String,
    pub chapter: u32,
    pub verse: u32,
    pub version: Option<String>,
}

/// What the caller must do next after a goto request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavEffect {
    /// The target chapter is already loaded; retries have begun
    Locating,
    /// Load this chapter first; navigation resumes on `chapter_loaded`
    LoadChapter {
        book: String,
        chapter: u32,
        version: Option<String>,
    },
}

/// A located verse to scroll into view and flag as selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollRequest {
    pub book: String,
    pub chapter: u32,
    pub verse: u32,
}

impl ScrollRequest {
    /// The selection notification to publish alongside the scroll
    pub fn selection(&self) -> VerseSelected {
        VerseSelected {
            book: self.book.clone(),
            chapter: self.chapter,
            verse: self.verse,
            source: SelectionSource::Scroll,
        }
    }
}

#[derive(Debug)]
struct Retry {
    book: String,
    chapter: u32,
    verse: u32,
    attempts_left: u32,
    cancel: CancelToken,
}

#[derive(Debug, Clone, Copy)]
struct Highlight {
    verse: u32,
    until_ms: u64,
}

#[derive(Debug, Default)]
pub struct NavigationController {
    pending: Option<GotoRequest>,
    retry: Option<Retry>,
    highlight: Option<Highlight>,
    retry_attempts: u32,
}

impl NavigationController {
    pub fn new() -> Self {
        Self {
            pending: None,
            retry: None,
            highlight: None,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }

    pub fn with_retry_attempts(attempts: u32) -> Self {
        Self {
            retry_attempts: attempts,
            ..Self::new()
        }
    }

    /// Request navigation to a reference. `loaded` is the (book, chapter)
    /// currently shown, if any.
    pub fn goto_reference(
        &mut self,
        request: GotoRequest,
        loaded: Option<(&str, u32)>,
    ) -> NavEffect {
        // A new request supersedes any in-flight retry
        if let Some(old) = self.retry.take() {
            old.cancel.cancel();
        }
        match loaded {
            Some((book, chapter)) if book == request.book && chapter == request.chapter => {
                self.start_retry(&request.book, request.chapter, request.verse);
                self.pending = None;
                NavEffect::Locating
            }
            _ => {
                let effect = NavEffect::LoadChapter {
                    book: request.book.clone(),
                    chapter: request.chapter,
                    version: request.version.clone(),
                };
                self.pending = Some(request);
                effect
            }
        }
    }

    /// A chapter finished loading. If it satisfies the queued request and
    /// contains the target ordinal, begin locating; otherwise the pending
    /// navigation is dropped silently.
    pub fn chapter_loaded(&mut self, book: &str, chapter: u32, verse_numbers: &[u32]) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if pending.book != book || pending.chapter != chapter {
            // Another switch won the race; abandon
            tracing::debug!(
                wanted = %pending.book,
                got = book,
                "pending navigation superseded"
            );
            return;
        }
        if !verse_numbers.contains(&pending.verse) {
            tracing::debug!(book, chapter, verse = pending.verse, "navigation miss");
            return;
        }
        self.start_retry(book, chapter, pending.verse);
    }

    fn start_retry(&mut self, book: &str, chapter: u32, verse: u32) {
        self.retry = Some(Retry {
            book: book.to_string(),
            chapter,
            verse,
            attempts_left: self.retry_attempts,
            cancel: CancelToken::default(),
        });
    }

    /// Cancellation token for the current retry, for teardown paths
    pub fn cancel_token(&self) -> Option<CancelToken> {
        self.retry.as_ref().map(|r| r.cancel.clone())
    }

    /// Cancel any in-flight retry and pending request (pane teardown)
    pub fn cancel(&mut self) {
        if let Some(retry) = self.retry.take() {
            retry.cancel.cancel();
        }
        self.pending = None;
    }

    /// One frame of the locate-and-scroll loop. `locate` reports whether
    /// the row for a verse ordinal is mounted. Returns the scroll request
    /// once located; gives up silently after the bounded attempts with no
    /// retry left behind.
    pub fn on_frame(
        &mut self,
        locate: impl Fn(u32) -> bool,
        now_ms: u64,
    ) -> Option<ScrollRequest> {
        self.expire_highlight(now_ms);

        let retry = self.retry.take()?;
        if retry.cancel.is_cancelled() {
            return None;
        }
        if locate(retry.verse) {
            self.highlight = Some(Highlight {
                verse: retry.verse,
                until_ms: now_ms + HIGHLIGHT_MS,
            });
            return Some(ScrollRequest {
                book: retry.book,
                chapter: retry.chapter,
                verse: retry.verse,
            });
        }
        let attempts_left = retry.attempts_left.saturating_sub(1);
        if attempts_left == 0 {
            tracing::debug!(verse = retry.verse, "goto gave up: row never appeared");
            return None;
        }
        self.retry = Some(Retry { attempts_left, ..retry });
        None
    }

    pub fn has_active_retry(&self) -> bool {
        self.retry.is_some()
    }

    /// The verse currently carrying the transient highlight, if it has not
    /// expired
    pub fn highlighted_verse(&self, now_ms: u64) -> Option<u32> {
        self.highlight
            .filter(|h| now_ms < h.until_ms)
            .map(|h| h.verse)
    }

    fn expire_highlight(&mut self, now_ms: u64) {
        if let Some(h) = self.highlight {
            if now_ms >= h.until_ms {
                self.highlight = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(book: &str, chapter: u32, verse: u32) -> GotoRequest {
        GotoRequest {
            book: book.to_string(),
            chapter,
            verse,
            version: None,
        }
    }

    #[test]
    fn same_chapter_locates_immediately() {
        let mut nav = NavigationController::new();
        let effect = nav.goto_reference(request("Genesis", 1, 3), Some(("Genesis", 1)));
        assert_eq!(effect, NavEffect::Locating);

        let scroll = nav.on_frame(|_| true, 0).unwrap();
        assert_eq!(scroll.verse, 3);
        assert_eq!(scroll.selection().source, SelectionSource::Scroll);
        assert!(!nav.has_active_retry());
        assert_eq!(nav.highlighted_verse(100), Some(3));
    }

    #[test]
    fn cross_chapter_request_is_queued_until_load() {
        let mut nav = NavigationController::new();
        let effect = nav.goto_reference(request("Romans", 3, 16), Some(("Genesis", 1)));
        assert_eq!(
            effect,
            NavEffect::LoadChapter {
                book: "Romans".to_string(),
                chapter: 3,
                version: None
            }
        );
        assert!(nav.on_frame(|_| true, 0).is_none());

        nav.chapter_loaded("Romans", 3, &[15, 16, 17]);
        let scroll = nav.on_frame(|_| true, 0).unwrap();
        assert_eq!((scroll.book.as_str(), scroll.chapter, scroll.verse), ("Romans", 3, 16));
    }

    #[test]
    fn navigation_miss_is_a_silent_noop() {
        let mut nav = NavigationController::new();
        nav.goto_reference(request("Romans", 3, 99), Some(("Genesis", 1)));
        nav.chapter_loaded("Romans", 3, &[1, 2, 3]);
        assert!(!nav.has_active_retry());
        assert!(nav.on_frame(|_| true, 0).is_none());
    }

    #[test]
    fn load_race_drops_stale_pending() {
        let mut nav = NavigationController::new();
        nav.goto_reference(request("Romans", 3, 16), Some(("Genesis", 1)));
        // A different chapter arrived first: the queued goto is dropped
        nav.chapter_loaded("Exodus", 2, &[16]);
        assert!(!nav.has_active_retry());
        nav.chapter_loaded("Romans", 3, &[16]);
        assert!(!nav.has_active_retry());
    }

    #[test]
    fn gives_up_after_bounded_attempts_without_live_retry() {
        let mut nav = NavigationController::with_retry_attempts(12);
        nav.goto_reference(request("Genesis", 1, 3), Some(("Genesis", 1)));

        for _ in 0..11 {
            assert!(nav.on_frame(|_| false, 0).is_none());
            assert!(nav.has_active_retry());
        }
        assert!(nav.on_frame(|_| false, 0).is_none());
        assert!(!nav.has_active_retry());
        // Further frames do nothing
        assert!(nav.on_frame(|_| true, 0).is_none());
    }

    #[test]
    fn cancellation_stops_retries_before_next_attempt() {
        let mut nav = NavigationController::new();
        nav.goto_reference(request("Genesis", 1, 3), Some(("Genesis", 1)));
        let token = nav.cancel_token().unwrap();
        token.cancel();
        assert!(nav.on_frame(|_| true, 0).is_none());
        assert!(!nav.has_active_retry());
    }

    #[test]
    fn new_request_supersedes_inflight_retry() {
        let mut nav = NavigationController::new();
        nav.goto_reference(request("Genesis", 1, 3), Some(("Genesis", 1)));
        let first_token = nav.cancel_token().unwrap();
        nav.goto_reference(request("Genesis", 1, 5), Some(("Genesis", 1)));
        assert!(first_token.is_cancelled());
        let scroll = nav.on_frame(|_| true, 0).unwrap();
        assert_eq!(scroll.verse, 5);
    }

    #[test]
    fn highlight_expires_after_its_window() {
        let mut nav = NavigationController::new();
        nav.goto_reference(request("Genesis", 1, 3), Some(("Genesis", 1)));
        nav.on_frame(|_| true, 1_000).unwrap();
        assert_eq!(nav.highlighted_verse(1_000 + HIGHLIGHT_MS - 1), Some(3));
        assert_eq!(nav.highlighted_verse(1_000 + HIGHLIGHT_MS), None);
    }
}
