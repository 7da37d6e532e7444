//! Per-pane row height reconciliation.
//!
//! When alignment is active, every participating pane measures its natural
//! row heights, broadcasts them, and applies the element-wise maximum of its
//! own and its peers' heights as a forced row height, plus an extra top
//! margin so verse 1 starts at the same offset everywhere. Margins only move
//! when the change exceeds a hysteresis threshold, which is what lets two
//! panes broadcasting at each other settle instead of oscillating on float
//! jitter. A chapter switch opens a stabilization window during which margin
//! changes are deferred, so the first flurry of measurements after a reload
//! cannot thrash the layout.

use crate::bus::{HeightMap, PaneHeights, PaneId};

/// Tunables for the reconciliation loop. The defaults are the empirically
/// chosen values from production; treat them as configuration, not as
/// constants with hidden meaning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncTuning {
    /// Margin changes at or below this many pixels are ignored
    pub hysteresis_px: f32,
    /// After a chapter switch, margin application is deferred this long
    pub stabilize_ms: u64,
    /// Acceptable residual top-of-row misalignment between panes
    pub top_tolerance_px: f32,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            hysteresis_px: 1.0,
            stabilize_ms: 250,
            top_tolerance_px: 2.0,
        }
    }
}

/// A pane's own measurement pass: natural (unconstrained) per-verse heights
/// and the raw distance from the scroll container's top to the first row,
/// including any compensating margin currently applied.
#[derive(Debug, Clone)]
pub struct Measurement {
    pub heights: HeightMap,
    pub raw_top_offset: f32,
}

/// One instance per pane. State is keyed to the active (book, chapter);
/// switching chapters resets everything.
#[derive(Debug)]
pub struct Reconciler {
    pane: PaneId,
    tuning: SyncTuning,
    active: bool,
    book: String,
    chapter: u32,
    natural: HeightMap,
    forced: HeightMap,
    base_top: f32,
    extra_margin: f32,
    pending_margin: Option<f32>,
    stabilize_until: Option<u64>,
}

impl Reconciler {
    pub fn new(pane: PaneId, tuning: SyncTuning) -> Self {
        Self {
            pane,
            tuning,
            active: false,
            book: String::new(),
            chapter: 0,
            natural: HeightMap::new(),
            forced: HeightMap::new(),
            base_top: 0.0,
            extra_margin: 0.0,
            pending_margin: None,
            stabilize_until: None,
        }
    }

    pub fn pane(&self) -> PaneId {
        self.pane
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Enable or disable alignment for this pane. Disabling restores the
    /// natural layout: all forced heights and margins are cleared.
    pub fn set_active(&mut self, active: bool) {
        if self.active == active {
            return;
        }
        self.active = active;
        if !active {
            self.forced.clear();
            self.extra_margin = 0.0;
            self.pending_margin = None;
            self.stabilize_until = None;
        }
    }

    /// Rekey to a new (book, chapter): drop all measured and forced state
    /// and open the stabilization window.
    pub fn begin_chapter(&mut self, book: &str, chapter: u32, now_ms: u64) {
        if self.book == book && self.chapter == chapter {
            return;
        }
        self.book = book.to_string();
        self.chapter = chapter;
        self.natural.clear();
        self.forced.clear();
        self.base_top = 0.0;
        self.extra_margin = 0.0;
        self.pending_margin = None;
        self.stabilize_until = Some(now_ms + self.tuning.stabilize_ms);
        tracing::debug!(pane = self.pane.as_str(), book, chapter, "reconciler rekeyed");
    }

    /// Record this pane's own measurement pass and produce the broadcast for
    /// the peers. The base offset excludes the margin we applied ourselves;
    /// the broadcast carries our effective top (base + margin) so peers can
    /// compute their spacer against it.
    pub fn record_measurement(&mut self, measurement: Measurement) -> Option<PaneHeights> {
        if !self.active {
            return None;
        }
        self.base_top = (measurement.raw_top_offset - self.extra_margin).max(0.0);
        self.natural = measurement.heights;
        Some(self.broadcast(self.natural.clone()))
    }

    /// React to a peer pane's height broadcast for the same (book, chapter).
    ///
    /// Returns a re-broadcast of the equalized heights when anything
    /// actually changed; repeated identical broadcasts converge to None,
    /// which is what terminates the cross-pane cascade.
    pub fn receive(&mut self, peer: &PaneHeights, now_ms: u64) -> Option<PaneHeights> {
        if !self.active || peer.pane == self.pane {
            return None;
        }
        if peer.book != self.book || peer.chapter != self.chapter {
            return None;
        }

        // Element-wise max over the union of keys. A verse the peer shows
        // but we do not still gets a placeholder row (natural height 0) so
        // the keyspace stays uniform; our own extra verses keep their
        // natural height.
        let mut changed = false;
        let keys: Vec<u32> = self
            .natural
            .keys()
            .chain(peer.heights.keys())
            .copied()
            .collect();
        for verse in keys {
            let own = self.natural.get(&verse).copied().unwrap_or(0.0);
            let theirs = peer.heights.get(&verse).copied().unwrap_or(0.0);
            let target = own.max(theirs).ceil();
            if self.forced.get(&verse).copied() != Some(target) {
                self.forced.insert(verse, target);
                changed = true;
            }
        }

        // Desired spacer so our effective top matches the peer's
        let desired = (peer.top_offset - self.base_top).round().max(0.0);
        let diff = (desired - self.extra_margin).abs();
        if diff > self.tuning.hysteresis_px {
            if self.in_stabilize_window(now_ms) {
                // Defer: keep the latest desired value, apply when the
                // window ends
                self.pending_margin = Some(desired);
            } else {
                self.extra_margin = desired;
                self.pending_margin = None;
                changed = true;
            }
        }

        if !changed {
            return None;
        }
        tracing::trace!(
            pane = self.pane.as_str(),
            peer = peer.pane.as_str(),
            margin = self.extra_margin,
            "reconciled heights against peer"
        );
        Some(self.broadcast(self.forced.clone()))
    }

    /// Advance time: when the stabilization window has elapsed with a
    /// deferred margin pending, apply it and re-broadcast.
    pub fn on_tick(&mut self, now_ms: u64) -> Option<PaneHeights> {
        if !self.active || self.in_stabilize_window(now_ms) {
            return None;
        }
        self.stabilize_until = None;
        let desired = self.pending_margin.take()?;
        if (desired - self.extra_margin).abs() <= self.tuning.hysteresis_px {
            return None;
        }
        self.extra_margin = desired;
        let heights = if self.forced.is_empty() {
            self.natural.clone()
        } else {
            self.forced.clone()
        };
        Some(self.broadcast(heights))
    }

    fn in_stabilize_window(&self, now_ms: u64) -> bool {
        self.stabilize_until.map(|t| now_ms < t).unwrap_or(false)
    }

    fn broadcast(&self, heights: HeightMap) -> PaneHeights {
        PaneHeights {
            pane: self.pane,
            book: self.book.clone(),
            chapter: self.chapter,
            heights,
            top_offset: self.base_top + self.extra_margin,
        }
    }

    /// Forced height for a verse row, if alignment has constrained it
    pub fn forced_height(&self, verse: u32) -> Option<f32> {
        if !self.active {
            return None;
        }
        self.forced.get(&verse).copied()
    }

    /// Height to render a row at: the forced height when constrained,
    /// otherwise the given natural height
    pub fn row_height(&self, verse: u32, natural: f32) -> f32 {
        self.forced_height(verse).map(|f| f.max(natural)).unwrap_or(natural)
    }

    pub fn extra_margin(&self) -> f32 {
        if self.active {
            self.extra_margin
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heights(pairs: &[(u32, f32)]) -> HeightMap {
        pairs.iter().copied().collect()
    }

    fn active_reconciler(pane: PaneId, book: &str, chapter: u32) -> Reconciler {
        let mut r = Reconciler::new(pane, SyncTuning::default());
        r.set_active(true);
        r.begin_chapter(book, chapter, 0);
        r
    }

    #[test]
    fn inactive_pane_neither_measures_nor_reconciles() {
        let mut r = Reconciler::new(PaneId::Notes, SyncTuning::default());
        r.begin_chapter("Genesis", 1, 0);
        assert!(r
            .record_measurement(Measurement { heights: heights(&[(1, 40.0)]), raw_top_offset: 0.0 })
            .is_none());
        assert!(r.forced_height(1).is_none());
    }

    #[test]
    fn converges_to_elementwise_max_and_stops() {
        let now = 1_000; // past the stabilization window
        let mut a = active_reconciler(PaneId::Bible, "Genesis", 1);
        let mut b = active_reconciler(PaneId::Manuscripts, "Genesis", 1);

        let bc_a = a
            .record_measurement(Measurement { heights: heights(&[(1, 40.0), (2, 100.0)]), raw_top_offset: 0.0 })
            .unwrap();
        let bc_b = b
            .record_measurement(Measurement { heights: heights(&[(1, 90.0), (2, 60.0)]), raw_top_offset: 0.0 })
            .unwrap();

        let re_b = b.receive(&bc_a, now).unwrap();
        let re_a = a.receive(&bc_b, now).unwrap();

        for r in [&a, &b] {
            assert_eq!(r.forced_height(1), Some(90.0));
            assert_eq!(r.forced_height(2), Some(100.0));
        }

        // The re-broadcasts carry equalized heights and cause no further
        // change on the other side: the cascade terminates.
        assert!(a.receive(&re_b, now).is_none());
        assert!(b.receive(&re_a, now).is_none());
        // Idempotent on repeated identical broadcasts
        assert!(b.receive(&bc_a, now).is_none());
    }

    #[test]
    fn placeholder_rows_for_verses_missing_locally() {
        let now = 1_000;
        let mut notes = active_reconciler(PaneId::Notes, "Genesis", 1);
        notes
            .record_measurement(Measurement { heights: heights(&[(1, 20.0)]), raw_top_offset: 0.0 })
            .unwrap();

        let peer = PaneHeights {
            pane: PaneId::Bible,
            book: "Genesis".to_string(),
            chapter: 1,
            heights: heights(&[(1, 30.0), (2, 44.0)]),
            top_offset: 0.0,
        };
        notes.receive(&peer, now).unwrap();
        assert_eq!(notes.forced_height(1), Some(30.0));
        // Verse 2 has no local row: it is forced to the peer height anyway
        assert_eq!(notes.forced_height(2), Some(44.0));
    }

    #[test]
    fn margin_hysteresis_suppresses_small_changes() {
        let now = 1_000;
        let mut r = active_reconciler(PaneId::Manuscripts, "Genesis", 1);
        r.record_measurement(Measurement { heights: heights(&[(1, 40.0)]), raw_top_offset: 12.0 })
            .unwrap();
        // base_top is 12 here; a peer top of 24 gives desired margin 12
        let mut peer = PaneHeights {
            pane: PaneId::Bible,
            book: "Genesis".to_string(),
            chapter: 1,
            heights: heights(&[(1, 40.0)]),
            top_offset: 24.0,
        };
        r.receive(&peer, now);
        assert_eq!(r.extra_margin(), 12.0);

        // Desired 12.6 rounds to 13, diff 1 -> within hysteresis, no update
        peer.top_offset = 24.6;
        assert!(r.receive(&peer, now).is_none());
        assert_eq!(r.extra_margin(), 12.0);

        // Desired 15, diff 3 -> applied
        peer.top_offset = 27.0;
        r.receive(&peer, now).unwrap();
        assert_eq!(r.extra_margin(), 15.0);
    }

    #[test]
    fn negative_spacer_clamps_to_zero() {
        let now = 1_000;
        let mut r = active_reconciler(PaneId::Notes, "Genesis", 1);
        r.record_measurement(Measurement { heights: heights(&[(1, 40.0)]), raw_top_offset: 30.0 })
            .unwrap();
        let peer = PaneHeights {
            pane: PaneId::Bible,
            book: "Genesis".to_string(),
            chapter: 1,
            heights: heights(&[(1, 40.0)]),
            top_offset: 5.0,
        };
        // Peer sits higher than our base: we cannot shrink, margin stays 0
        r.receive(&peer, now);
        assert_eq!(r.extra_margin(), 0.0);
    }

    #[test]
    fn stabilization_window_defers_margin_until_tick() {
        let mut r = Reconciler::new(PaneId::Manuscripts, SyncTuning::default());
        r.set_active(true);
        r.begin_chapter("Genesis", 1, 1_000); // window open until 1_250
        r.record_measurement(Measurement { heights: heights(&[(1, 40.0)]), raw_top_offset: 0.0 })
            .unwrap();

        let peer = PaneHeights {
            pane: PaneId::Bible,
            book: "Genesis".to_string(),
            chapter: 1,
            heights: heights(&[(1, 40.0)]),
            top_offset: 20.0,
        };
        r.receive(&peer, 1_100);
        // Heights are applied immediately, the margin is deferred
        assert_eq!(r.forced_height(1), Some(40.0));
        assert_eq!(r.extra_margin(), 0.0);

        assert!(r.on_tick(1_200).is_none());
        let rebroadcast = r.on_tick(1_300).unwrap();
        assert_eq!(r.extra_margin(), 20.0);
        assert_eq!(rebroadcast.top_offset, 20.0);
        // Nothing further pending
        assert!(r.on_tick(1_400).is_none());
    }

    #[test]
    fn chapter_switch_resets_state() {
        let now = 1_000;
        let mut r = active_reconciler(PaneId::Bible, "Genesis", 1);
        r.record_measurement(Measurement { heights: heights(&[(1, 40.0)]), raw_top_offset: 0.0 })
            .unwrap();
        let peer = PaneHeights {
            pane: PaneId::Manuscripts,
            book: "Genesis".to_string(),
            chapter: 1,
            heights: heights(&[(1, 90.0)]),
            top_offset: 10.0,
        };
        r.receive(&peer, now);
        assert_eq!(r.forced_height(1), Some(90.0));
        assert_eq!(r.extra_margin(), 10.0);

        r.begin_chapter("Genesis", 2, now);
        assert!(r.forced_height(1).is_none());
        assert_eq!(r.extra_margin(), 0.0);
        // Stale broadcasts for the old chapter are ignored
        assert!(r.receive(&peer, now + 500).is_none());
    }

    #[test]
    fn deactivation_restores_natural_layout() {
        let now = 1_000;
        let mut r = active_reconciler(PaneId::Notes, "Genesis", 1);
        r.record_measurement(Measurement { heights: heights(&[(1, 40.0)]), raw_top_offset: 0.0 })
            .unwrap();
        let peer = PaneHeights {
            pane: PaneId::Bible,
            book: "Genesis".to_string(),
            chapter: 1,
            heights: heights(&[(1, 75.0)]),
            top_offset: 8.0,
        };
        r.receive(&peer, now);
        assert_eq!(r.row_height(1, 40.0), 75.0);

        r.set_active(false);
        assert_eq!(r.row_height(1, 40.0), 40.0);
        assert_eq!(r.extra_margin(), 0.0);
    }

    #[test]
    fn end_to_end_two_pane_alignment() {
        // Genesis 1 with verses 1..5; manuscripts verse 3 is taller. After
        // one reconciliation pass both panes agree on verse 3's height and
        // verse 1's top offset within tolerance.
        let now = 10_000;
        let tuning = SyncTuning::default();
        let mut bible = active_reconciler(PaneId::Bible, "Genesis", 1);
        let mut ms = active_reconciler(PaneId::Manuscripts, "Genesis", 1);

        let bible_bc = bible
            .record_measurement(Measurement {
                heights: heights(&[(1, 30.0), (2, 30.0), (3, 30.0), (4, 30.0), (5, 30.0)]),
                raw_top_offset: 18.0,
            })
            .unwrap();
        let ms_bc = ms
            .record_measurement(Measurement {
                heights: heights(&[(1, 30.0), (2, 30.0), (3, 72.0), (4, 30.0), (5, 30.0)]),
                raw_top_offset: 6.0,
            })
            .unwrap();

        let ms_re = ms.receive(&bible_bc, now).unwrap();
        let bible_re = bible.receive(&ms_bc, now).unwrap();
        // Second half-round settles the remaining deltas
        bible.receive(&ms_re, now);
        ms.receive(&bible_re, now);

        assert_eq!(bible.forced_height(3), Some(72.0));
        assert_eq!(ms.forced_height(3), Some(72.0));

        let bible_top = 18.0 + bible.extra_margin();
        let ms_top = 6.0 + ms.extra_margin();
        assert!(
            (bible_top - ms_top).abs() <= tuning.top_tolerance_px,
            "verse 1 misaligned: bible {bible_top} vs manuscripts {ms_top}"
        );
    }
}
