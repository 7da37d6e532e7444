//! Typed publish/subscribe bus coupling sibling panes.
//!
//! Delivery is synchronous and in subscriber-registration order; subscribers
//! registered during a publish are not invoked for that publish, and a
//! handler already running on the stack is never re-entered. Events with no
//! subscribers are dropped silently. This is the only coupling mechanism
//! between panes - they never hold references to each other.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Measured row heights keyed by verse ordinal, scoped to one (book, chapter)
pub type HeightMap = BTreeMap<u32, f32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaneId {
    Bible,
    Notes,
    Commentary,
    Manuscripts,
}

impl PaneId {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaneId::Bible => "bible",
            PaneId::Notes => "notes",
            PaneId::Commentary => "commentary",
            PaneId::Manuscripts => "manuscripts",
        }
    }
}

/// How a verse became selected; subscribers highlight on Click and scroll on
/// Scroll (a click already put the row in view in the originating pane)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    Click,
    Scroll,
}

#[derive(Debug, Clone)]
pub struct WordSelect {
    pub book: String,
    pub chapter: u32,
    pub verse: u32,
    pub token_index: usize,
    pub token: String,
    pub source_token_count: usize,
    pub non_stop_index: usize,
    pub non_stop_count: usize,
    pub is_stopword: bool,
    pub mode: String,
}

#[derive(Debug, Clone)]
pub struct VerseSelected {
    pub book: String,
    pub chapter: u32,
    pub verse: u32,
    pub source: SelectionSource,
}

#[derive(Debug, Clone)]
pub struct OpenVerse {
    pub book: String,
    pub chapter: u32,
    pub verse: u32,
    pub version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PaneHeights {
    pub pane: PaneId,
    pub book: String,
    pub chapter: u32,
    pub heights: HeightMap,
    pub top_offset: f32,
}

#[derive(Debug, Clone)]
pub struct VerseTarget {
    pub book: String,
    pub chapter: u32,
    pub verse: u32,
}

/// The closed set of channels panes coordinate over
#[derive(Debug, Clone)]
pub enum Event {
    WordSelect(WordSelect),
    GotoVerse(VerseTarget),
    VerseSelected(VerseSelected),
    OpenVerse(OpenVerse),
    PaneHeights(PaneHeights),
    ManuscriptsScrollVerse(VerseTarget),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    WordSelect,
    GotoVerse,
    VerseSelected,
    OpenVerse,
    PaneHeights,
    ManuscriptsScrollVerse,
}

impl Event {
    pub fn channel(&self) -> Channel {
        match self {
            Event::WordSelect(_) => Channel::WordSelect,
            Event::GotoVerse(_) => Channel::GotoVerse,
            Event::VerseSelected(_) => Channel::VerseSelected,
            Event::OpenVerse(_) => Channel::OpenVerse,
            Event::PaneHeights(_) => Channel::PaneHeights,
            Event::ManuscriptsScrollVerse(_) => Channel::ManuscriptsScrollVerse,
        }
    }
}

type Handler = Rc<RefCell<dyn FnMut(&Event)>>;

struct Entry {
    channel: Channel,
    handler: Handler,
    alive: Rc<Cell<bool>>,
}

#[derive(Default)]
struct BusInner {
    entries: Vec<Entry>,
}

/// Cheaply cloneable handle to a single-threaded event bus
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<BusInner>>,
}

/// Unsubscribe capability; dropping it removes the handler
pub struct Subscription {
    alive: Rc<Cell<bool>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.alive.set(false);
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, channel: Channel, handler: F) -> Subscription
    where
        F: FnMut(&Event) + 'static,
    {
        let alive = Rc::new(Cell::new(true));
        let mut inner = self.inner.borrow_mut();
        inner.entries.retain(|e| e.alive.get());
        inner.entries.push(Entry {
            channel,
            handler: Rc::new(RefCell::new(handler)),
            alive: Rc::clone(&alive),
        });
        Subscription { alive }
    }

    /// Deliver `event` to every live subscriber of its channel, in
    /// registration order, then return. A handler that is already running
    /// (nested publish) is skipped rather than re-entered.
    pub fn publish(&self, event: &Event) {
        let channel = event.channel();
        let snapshot: Vec<(Handler, Rc<Cell<bool>>)> = {
            let inner = self.inner.borrow();
            inner
                .entries
                .iter()
                .filter(|e| e.channel == channel && e.alive.get())
                .map(|e| (Rc::clone(&e.handler), Rc::clone(&e.alive)))
                .collect()
        };
        if snapshot.is_empty() {
            tracing::trace!(?channel, "event dropped: no subscribers");
            return;
        }
        for (handler, alive) in snapshot {
            if !alive.get() {
                continue;
            }
            if let Ok(mut f) = handler.try_borrow_mut() {
                f(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(verse: u32) -> Event {
        Event::GotoVerse(VerseTarget {
            book: "Genesis".to_string(),
            chapter: 1,
            verse,
        })
    }

    #[test]
    fn delivers_in_registration_order() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let a = Rc::clone(&seen);
        let _s1 = bus.subscribe(Channel::GotoVerse, move |_| a.borrow_mut().push("first"));
        let b = Rc::clone(&seen);
        let _s2 = bus.subscribe(Channel::GotoVerse, move |_| b.borrow_mut().push("second"));

        bus.publish(&target(1));
        assert_eq!(*seen.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn channel_filter_and_silent_drop() {
        let bus = EventBus::new();
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        let _sub = bus.subscribe(Channel::VerseSelected, move |_| c.set(c.get() + 1));

        // No subscriber for GotoVerse: dropped without error
        bus.publish(&target(1));
        assert_eq!(count.get(), 0);

        bus.publish(&Event::VerseSelected(VerseSelected {
            book: "Genesis".to_string(),
            chapter: 1,
            verse: 1,
            source: SelectionSource::Click,
        }));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        let sub = bus.subscribe(Channel::GotoVerse, move |_| c.set(c.get() + 1));

        bus.publish(&target(1));
        sub.unsubscribe();
        bus.publish(&target(2));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn subscriber_registered_during_publish_is_not_invoked_for_it() {
        let bus = EventBus::new();
        let late_count = Rc::new(Cell::new(0u32));
        let late_subs = Rc::new(RefCell::new(Vec::new()));

        let bus2 = bus.clone();
        let lc = Rc::clone(&late_count);
        let ls = Rc::clone(&late_subs);
        let _s1 = bus.subscribe(Channel::GotoVerse, move |_| {
            let lc2 = Rc::clone(&lc);
            let sub = bus2.subscribe(Channel::GotoVerse, move |_| lc2.set(lc2.get() + 1));
            ls.borrow_mut().push(sub);
        });

        bus.publish(&target(1));
        assert_eq!(late_count.get(), 0);
        // But the late subscriber sees the next publish
        bus.publish(&target(2));
        assert_eq!(late_count.get(), 1);
    }

    #[test]
    fn nested_publish_does_not_reenter_running_handler() {
        let bus = EventBus::new();
        let calls = Rc::new(Cell::new(0u32));

        let bus2 = bus.clone();
        let c = Rc::clone(&calls);
        let _s = bus.subscribe(Channel::GotoVerse, move |ev| {
            c.set(c.get() + 1);
            if let Event::GotoVerse(t) = ev {
                if t.verse < 3 {
                    // Re-publishing from inside the handler must not recurse
                    // into this same handler
                    bus2.publish(&target(t.verse + 1));
                }
            }
        });

        bus.publish(&target(1));
        assert_eq!(calls.get(), 1);
    }
}
