use anyhow::Result;
use ratatui::layout::Rect;
use std::cell::RefCell;
use std::rc::Rc;
use tokio::task::JoinHandle;

use biblenotes_core::align::{content_token_indices, is_stopword, tokenize, AlignmentOverrides};
use biblenotes_core::bus::{
    Channel, Event, EventBus, HeightMap, OpenVerse, PaneId, SelectionSource, VerseSelected,
    VerseTarget, WordSelect,
};
use biblenotes_core::model::{
    AuthorSubscription, ChapterData, ConcordanceResponse, ManuscriptChapter, ManuscriptEdition,
    Note, NoteCreate, NotesResponse, NoteUpdate, SubscriptionsResponse, Token, UserProfile,
    Version,
};
use biblenotes_core::navigate::{GotoRequest, NavEffect, NavigationController};
use biblenotes_core::pane::PaneView;
use biblenotes_core::reconcile::{Measurement, Reconciler, SyncTuning};
use biblenotes_core::reference::{book_order, parse_reference, BOOKS};
use biblenotes_core::store::{JsonFileStore, Preferences};
use biblenotes_core::{ApiClient, Config};

use crate::tui::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Notes,
    Bible,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RightTab {
    Commentaries,
    Manuscripts,
    Concordance,
}

impl RightTab {
    pub fn as_str(&self) -> &'static str {
        match self {
            RightTab::Commentaries => "commentaries",
            RightTab::Manuscripts => "manuscripts",
            RightTab::Concordance => "concordance",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "commentaries" => Some(RightTab::Commentaries),
            "manuscripts" => Some(RightTab::Manuscripts),
            "concordance" => Some(RightTab::Concordance),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestamentFilter {
    All,
    Old,
    New,
}

impl TestamentFilter {
    pub fn next(self) -> Self {
        match self {
            TestamentFilter::All => TestamentFilter::Old,
            TestamentFilter::Old => TestamentFilter::New,
            TestamentFilter::New => TestamentFilter::All,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TestamentFilter::All => "All",
            TestamentFilter::Old => "OT",
            TestamentFilter::New => "NT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Email,
    Password,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteField {
    Title,
    Content,
    Tags,
}

/// Modal input surfaces; while one is open, keys edit it instead of
/// driving the panes
#[derive(Debug)]
pub enum Overlay {
    None,
    Reference {
        input: String,
    },
    ConcordanceSearch {
        input: String,
    },
    Login {
        email: String,
        password: String,
        field: LoginField,
        signup: bool,
    },
    NoteEditor {
        note_id: Option<i64>,
        start_verse_id: i64,
        end_verse_id: i64,
        title: String,
        content: String,
        tags: String,
        is_public: bool,
        field: NoteField,
    },
}

impl Overlay {
    pub fn is_none(&self) -> bool {
        matches!(self, Overlay::None)
    }
}

/// One rendered row in a verse-keyed pane. `top` and `height` are render
/// geometry (forced heights applied, margin excluded); `natural` is the
/// unconstrained content height the reconciler broadcasts.
#[derive(Debug, Clone, Copy)]
pub struct RowLayout {
    pub verse: u32,
    pub top: f32,
    pub height: f32,
    pub natural: f32,
}

/// Per-pane state shared with the event-bus handlers
pub struct PaneState {
    pub view: PaneView,
    pub recon: Reconciler,
    pub rows: Vec<RowLayout>,
    pub viewport_rows: f32,
    /// Structural content above the verse list (selectors, section titles)
    pub top_offset: f32,
    pub area: Option<Rect>,
    last_broadcast: Option<(HeightMap, f32)>,
    /// Word selection relayed from the Bible pane, for cross-highlighting
    pub selected_word: Option<WordSelect>,
}

impl PaneState {
    fn new(pane: PaneId, tuning: SyncTuning) -> Self {
        Self {
            view: PaneView::new(),
            recon: Reconciler::new(pane, tuning),
            rows: Vec::new(),
            viewport_rows: 0.0,
            top_offset: 0.0,
            area: None,
            last_broadcast: None,
            selected_word: None,
        }
    }

    /// Content-relative top of a verse row, including the alignment margin
    pub fn row_top(&self, verse: u32) -> Option<f32> {
        self.rows
            .iter()
            .find(|r| r.verse == verse)
            .map(|r| r.top + self.recon.extra_margin())
    }

    pub fn total_rows(&self) -> f32 {
        let content: f32 = self
            .rows
            .last()
            .map(|r| r.top + r.height)
            .unwrap_or(0.0);
        self.top_offset + self.recon.extra_margin() + content
    }

    pub fn max_scroll(&self) -> f32 {
        (self.total_rows() - self.viewport_rows).max(0.0)
    }

    pub fn verse_at_row(&self, content_row: f32) -> Option<u32> {
        let y = content_row - self.top_offset - self.recon.extra_margin();
        self.rows
            .iter()
            .find(|r| y >= r.top && y < r.top + r.height)
            .map(|r| r.verse)
    }
}

enum AppCommand {
    Goto(GotoRequest),
    SeedConcordance(String),
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub focus: FocusPane,
    pub overlay: Overlay,
    pub status: String,

    // Reference selection
    pub versions: Vec<Version>,
    pub selected_version: String,
    pub selected_book: String,
    pub selected_chapter: u32,

    // Chapter + notes data
    pub chapter: Option<ChapterData>,
    pub notes: Vec<Note>,
    pub active_tag: Option<String>,
    pub selected_verse_id: Option<i64>,
    pub loading_chapter: bool,

    // Commentary state
    pub subscriptions: Vec<AuthorSubscription>,
    pub selected_author_id: Option<i64>,
    pub author_notes: Vec<Note>,

    // Manuscripts state
    pub editions: Vec<ManuscriptEdition>,
    pub selected_edition: Option<String>,
    pub ms_chapter: Option<ManuscriptChapter>,

    // Concordance state
    pub concordance_query: String,
    pub concordance: ConcordanceResponse,
    pub concordance_selected: usize,
    pub testament_filter: TestamentFilter,
    pub book_filter: Option<String>,
    pub concordance_expanded: bool,

    pub right_tab: RightTab,
    pub sync_notes: bool,
    pub selection_mode: String,

    // Word selection within the selected Bible verse
    pub word_cursor: Option<usize>,

    // Expanded backlink panels in the notes pane, keyed by verse ordinal.
    // Toggling one changes that row's natural height, which re-triggers
    // measurement.
    pub open_backlinks: std::collections::HashSet<u32>,

    // Auth
    pub profile: Option<UserProfile>,

    // Sync subsystem
    pub bus: EventBus,
    pub nav: NavigationController,
    pub bible: Rc<RefCell<PaneState>>,
    pub notes_pane: Rc<RefCell<PaneState>>,
    pub right_pane: Rc<RefCell<PaneState>>,
    tuning: SyncTuning,
    commands: Rc<RefCell<Vec<AppCommand>>>,
    _subscriptions: Vec<biblenotes_core::bus::Subscription>,

    // Services
    pub api: ApiClient,
    pub prefs: Preferences,

    // In-flight backend calls, polled from the tick loop
    versions_task: Option<JoinHandle<Result<Vec<Version>>>>,
    chapter_task: Option<JoinHandle<Result<ChapterData>>>,
    notes_task: Option<JoinHandle<Result<NotesResponse>>>,
    subs_task: Option<JoinHandle<Result<SubscriptionsResponse>>>,
    author_notes_task: Option<JoinHandle<Result<NotesResponse>>>,
    editions_task: Option<JoinHandle<Result<biblenotes_core::model::ManuscriptEditionsResponse>>>,
    ms_chapter_task: Option<JoinHandle<Result<ManuscriptChapter>>>,
    concordance_task: Option<JoinHandle<Result<ConcordanceResponse>>>,
    login_task: Option<JoinHandle<Result<Token>>>,
    profile_task: Option<JoinHandle<Result<UserProfile>>>,
    note_save_task: Option<JoinHandle<Result<Note>>>,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = Config::load().unwrap_or_else(|_| Config::new());
        let store = JsonFileStore::open(JsonFileStore::default_path()?)?;
        let prefs = Preferences::new(Box::new(store));

        let mut api = ApiClient::new(&config.api_base_url);
        api.set_token(prefs.auth_token());

        Ok(Self::with_services(config, prefs, api))
    }

    pub fn with_services(config: Config, prefs: Preferences, api: ApiClient) -> Self {
        let tuning = config.sync_tuning();
        let bus = EventBus::new();
        let commands: Rc<RefCell<Vec<AppCommand>>> = Rc::new(RefCell::new(Vec::new()));

        let bible = Rc::new(RefCell::new(PaneState::new(PaneId::Bible, tuning)));
        let notes_pane = Rc::new(RefCell::new(PaneState::new(PaneId::Notes, tuning)));
        let right_tab = prefs
            .right_pane_tab()
            .as_deref()
            .and_then(RightTab::from_str)
            .unwrap_or(RightTab::Commentaries);
        let right_pane_id = match right_tab {
            RightTab::Manuscripts => PaneId::Manuscripts,
            _ => PaneId::Commentary,
        };
        let right_pane = Rc::new(RefCell::new(PaneState::new(right_pane_id, tuning)));

        let mut subscriptions = Vec::new();

        // Each pane reconciles against every other pane's height broadcast
        // and re-broadcasts when anything changed; the hysteresis in the
        // reconciler is what terminates the cascade.
        for state in [&bible, &notes_pane, &right_pane] {
            let st = Rc::clone(state);
            let bus2 = bus.clone();
            subscriptions.push(bus.subscribe(Channel::PaneHeights, move |event| {
                if let Event::PaneHeights(heights) = event {
                    let rebroadcast = st.borrow_mut().recon.receive(heights, now_ms());
                    if let Some(broadcast) = rebroadcast {
                        bus2.publish(&Event::PaneHeights(broadcast));
                    }
                }
            }));
        }

        // Click highlights in place; programmatic selection scrolls the
        // row into view
        for state in [&notes_pane, &right_pane] {
            let st = Rc::clone(state);
            subscriptions.push(bus.subscribe(Channel::VerseSelected, move |event| {
                if let Event::VerseSelected(sel) = event {
                    let mut pane = st.borrow_mut();
                    let top = pane.row_top(sel.verse);
                    pane.view.on_verse_selected(
                        sel,
                        |v| if v == sel.verse { top } else { None },
                        now_ms(),
                    );
                }
            }));
        }

        // Targeted scroll of the manuscripts pane only
        {
            let st = Rc::clone(&right_pane);
            subscriptions.push(bus.subscribe(Channel::ManuscriptsScrollVerse, move |event| {
                if let Event::ManuscriptsScrollVerse(target) = event {
                    let mut pane = st.borrow_mut();
                    if pane.recon.pane() == PaneId::Manuscripts {
                        if let Some(top) = pane.row_top(target.verse) {
                            pane.view.scroll_to_row(top);
                        }
                    }
                }
            }));
        }

        // Word selections feed the manuscripts cross-highlight and seed
        // the concordance
        {
            let st = Rc::clone(&right_pane);
            let queue = Rc::clone(&commands);
            subscriptions.push(bus.subscribe(Channel::WordSelect, move |event| {
                if let Event::WordSelect(word) = event {
                    st.borrow_mut().selected_word = Some(word.clone());
                    queue
                        .borrow_mut()
                        .push(AppCommand::SeedConcordance(word.token.clone()));
                }
            }));
        }

        // Global navigation requests (backlinks, concordance hits, goto
        // input) are queued and drained on the app side of the bus
        {
            let queue = Rc::clone(&commands);
            subscriptions.push(bus.subscribe(Channel::OpenVerse, move |event| {
                if let Event::OpenVerse(open) = event {
                    queue.borrow_mut().push(AppCommand::Goto(GotoRequest {
                        book: open.book.clone(),
                        chapter: open.chapter,
                        verse: open.verse,
                        version: open.version.clone(),
                    }));
                }
            }));
        }
        {
            let queue = Rc::clone(&commands);
            subscriptions.push(bus.subscribe(Channel::GotoVerse, move |event| {
                if let Event::GotoVerse(target) = event {
                    queue.borrow_mut().push(AppCommand::Goto(GotoRequest {
                        book: target.book.clone(),
                        chapter: target.chapter,
                        verse: target.verse,
                        version: None,
                    }));
                }
            }));
        }

        let sync_notes = prefs.sync_notes();
        let selected_version = prefs.selected_version().unwrap_or_default();
        let selected_edition = prefs.selected_edition();
        let selected_author_id = prefs.selected_author_id();
        let concordance_expanded = prefs.concordance_expanded();
        let selection_mode = prefs.selection_mode().unwrap_or_else(|| "verse".to_string());
        let concordance_query = prefs.last_word_token().unwrap_or_default();

        let mut app = Self {
            should_quit: false,
            focus: FocusPane::Bible,
            overlay: Overlay::None,
            status: String::new(),

            versions: Vec::new(),
            selected_version,
            selected_book: "Genesis".to_string(),
            selected_chapter: 1,

            chapter: None,
            notes: Vec::new(),
            active_tag: None,
            selected_verse_id: None,
            loading_chapter: false,

            subscriptions: Vec::new(),
            selected_author_id,
            author_notes: Vec::new(),

            editions: Vec::new(),
            selected_edition,
            ms_chapter: None,

            concordance_query,
            concordance: ConcordanceResponse::default(),
            concordance_selected: 0,
            testament_filter: TestamentFilter::All,
            book_filter: None,
            concordance_expanded,

            right_tab,
            sync_notes,
            selection_mode,

            word_cursor: None,

            open_backlinks: std::collections::HashSet::new(),

            profile: None,

            bus,
            nav: NavigationController::new(),
            bible,
            notes_pane,
            right_pane,
            tuning,
            commands,
            _subscriptions: subscriptions,

            api,
            prefs,

            versions_task: None,
            chapter_task: None,
            notes_task: None,
            subs_task: None,
            author_notes_task: None,
            editions_task: None,
            ms_chapter_task: None,
            concordance_task: None,
            login_task: None,
            profile_task: None,
            note_save_task: None,
        };

        app.update_alignment_actives();
        app.spawn_versions_fetch();
        if app.api.has_token() {
            app.spawn_profile_fetch();
            app.spawn_subscriptions_fetch();
        }
        app
    }

    pub fn is_authenticated(&self) -> bool {
        self.api.has_token()
    }

    pub fn current_user_id(&self) -> Option<i64> {
        self.profile
            .as_ref()
            .map(|p| p.id)
            .or_else(|| self.notes.first().map(|n| n.owner_id))
    }

    pub fn selected_verse(&self) -> Option<&biblenotes_core::Verse> {
        let chapter = self.chapter.as_ref()?;
        chapter.verse_by_id(self.selected_verse_id?)
    }

    // ---- alignment mode wiring -------------------------------------------

    /// Which panes force-align right now: the manuscripts tab always
    /// cross-aligns with the Bible pane; notes and commentary only when
    /// Sync Notes is on.
    fn update_alignment_actives(&mut self) {
        let right_active = match self.right_tab {
            RightTab::Manuscripts => true,
            RightTab::Commentaries => self.sync_notes,
            RightTab::Concordance => false,
        };
        let bible_active = self.sync_notes || right_active;
        self.bible.borrow_mut().recon.set_active(bible_active);
        self.notes_pane.borrow_mut().recon.set_active(self.sync_notes);
        self.right_pane.borrow_mut().recon.set_active(right_active);
    }

    pub fn toggle_sync_notes(&mut self) {
        self.sync_notes = !self.sync_notes;
        self.prefs.set_sync_notes(self.sync_notes);
        self.update_alignment_actives();
    }

    pub fn set_right_tab(&mut self, tab: RightTab) {
        if self.right_tab == tab {
            return;
        }
        self.right_tab = tab;
        self.prefs.set_right_pane_tab(tab.as_str());

        // The right pane's reconciliation identity follows the tab
        let pane_id = match tab {
            RightTab::Manuscripts => PaneId::Manuscripts,
            _ => PaneId::Commentary,
        };
        {
            let mut pane = self.right_pane.borrow_mut();
            pane.recon = Reconciler::new(pane_id, self.tuning);
            pane.recon
                .begin_chapter(&self.selected_book, self.selected_chapter, now_ms());
            pane.view.reset();
        }
        self.update_alignment_actives();

        match tab {
            RightTab::Manuscripts => self.spawn_editions_fetch(),
            RightTab::Commentaries => self.spawn_author_notes_fetch(),
            RightTab::Concordance => {}
        }
    }

    // ---- navigation -------------------------------------------------------

    /// Parse and dispatch a free-text reference ("Romans 3:16")
    pub fn go_to_reference_text(&mut self, text: &str) {
        let Some(reference) = parse_reference(text) else {
            self.status = format!("Unrecognized reference: {text}");
            return;
        };
        self.bus.publish(&Event::GotoVerse(VerseTarget {
            book: reference.book,
            chapter: reference.chapter,
            verse: reference.verse,
        }));
    }

    pub fn open_verse(&mut self, book: &str, chapter: u32, verse: u32, version: Option<String>) {
        self.bus.publish(&Event::OpenVerse(OpenVerse {
            book: book.to_string(),
            chapter,
            verse,
            version,
        }));
    }

    fn handle_goto(&mut self, request: GotoRequest) {
        let loaded = self
            .chapter
            .as_ref()
            .map(|c| (c.book.clone(), c.chapter));
        let effect = self.nav.goto_reference(
            request,
            loaded.as_ref().map(|(b, c)| (b.as_str(), *c)),
        );
        if let NavEffect::LoadChapter { book, chapter, version } = effect {
            if let Some(version) = version {
                if version != self.selected_version {
                    self.selected_version = version;
                    self.prefs.set_selected_version(Some(&self.selected_version));
                }
            }
            self.selected_book = book;
            self.selected_chapter = chapter;
            self.spawn_chapter_fetch();
        }
    }

    pub fn select_verse_by_click(&mut self, verse: u32) {
        let Some(chapter) = self.chapter.as_ref() else {
            return;
        };
        let Some(v) = chapter.verse_by_number(verse) else {
            return;
        };
        self.selected_verse_id = Some(v.id);
        self.word_cursor = None;
        self.bus.publish(&Event::VerseSelected(VerseSelected {
            book: chapter.book.clone(),
            chapter: chapter.chapter,
            verse,
            source: SelectionSource::Click,
        }));
    }

    pub fn select_adjacent_verse(&mut self, delta: i64) {
        let Some(chapter) = self.chapter.as_ref() else {
            return;
        };
        if chapter.verses.is_empty() {
            return;
        }
        let current = self
            .selected_verse_id
            .and_then(|id| chapter.verses.iter().position(|v| v.id == id))
            .unwrap_or(0);
        let next = (current as i64 + delta)
            .clamp(0, chapter.verses.len() as i64 - 1) as usize;
        let verse = chapter.verses[next].verse;
        self.select_verse_by_click(verse);
        // Keep the row visible in our own pane; peers only flash
        let mut bible = self.bible.borrow_mut();
        if let Some(top) = bible.row_top(verse) {
            let viewport = bible.viewport_rows;
            let scroll = bible.view.scroll();
            let height = bible
                .rows
                .iter()
                .find(|r| r.verse == verse)
                .map(|r| r.height)
                .unwrap_or(1.0);
            if top < scroll {
                bible.view.set_scroll(top);
            } else if top + height > scroll + viewport {
                bible.view.set_scroll(top + height - viewport);
            }
        }
    }

    pub fn change_chapter(&mut self, delta: i64) {
        let next = self.selected_chapter as i64 + delta;
        if next < 1 {
            return;
        }
        self.selected_chapter = next as u32;
        self.selected_verse_id = None;
        self.spawn_chapter_fetch();
    }

    pub fn change_book(&mut self, delta: i64) {
        let current = book_order(&self.selected_book).unwrap_or(0) as i64;
        let next = (current + delta).rem_euclid(BOOKS.len() as i64) as usize;
        self.selected_book = BOOKS[next].to_string();
        self.selected_chapter = 1;
        self.selected_verse_id = None;
        self.spawn_chapter_fetch();
    }

    // ---- word selection ---------------------------------------------------

    pub fn move_word_cursor(&mut self, delta: i64) {
        let Some(verse) = self.selected_verse() else {
            return;
        };
        let token_count = tokenize(&verse.text).len();
        if token_count == 0 {
            return;
        }
        let next = self
            .word_cursor
            .map(|c| (c as i64 + delta).clamp(0, token_count as i64 - 1) as usize)
            .unwrap_or(0);
        self.word_cursor = Some(next);
    }

    /// Publish the word under the cursor: the manuscripts pane aligns its
    /// source-language counterpart and the concordance seeds its query
    pub fn select_word(&mut self) {
        let Some(cursor) = self.word_cursor else {
            return;
        };
        let Some(chapter) = self.chapter.as_ref() else {
            return;
        };
        let Some(verse) = chapter.verse_by_id(self.selected_verse_id.unwrap_or(-1)) else {
            return;
        };
        let tokens = tokenize(&verse.text);
        let Some(token) = tokens.get(cursor) else {
            return;
        };
        let content = content_token_indices(&tokens, "en");
        let non_stop_index = content.iter().filter(|&&i| i < cursor).count();
        let stopword = is_stopword(token, "en");

        let source_token_count = self.manuscript_content_count(verse.verse);

        let clean: String = token
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        self.prefs.set_last_word_token(&clean);

        self.bus.publish(&Event::WordSelect(WordSelect {
            book: chapter.book.clone(),
            chapter: chapter.chapter,
            verse: verse.verse,
            token_index: cursor,
            token: clean,
            source_token_count,
            non_stop_index,
            non_stop_count: content.len(),
            is_stopword: stopword,
            mode: self.selection_mode.clone(),
        }));
    }

    fn manuscript_content_count(&self, verse: u32) -> usize {
        let Some(ms) = self.ms_chapter.as_ref() else {
            return 0;
        };
        let language = ms
            .edition
            .as_ref()
            .map(|e| e.language.clone())
            .unwrap_or_default();
        ms.verses
            .iter()
            .find(|v| v.verse == verse)
            .map(|v| {
                let tokens = tokenize(&v.text);
                content_token_indices(&tokens, &language).len()
            })
            .unwrap_or(0)
    }

    /// Manually correct the automatic word alignment for the selected word
    pub fn nudge_alignment(&mut self, delta: i64) {
        let selected = self.right_pane.borrow().selected_word.clone();
        let Some(word) = selected else {
            return;
        };
        let key = AlignmentOverrides::key(
            &word.book,
            word.chapter,
            word.verse,
            word.non_stop_index,
        );
        let mut overrides = self.prefs.alignment_overrides();
        overrides.nudge(&key, delta);
        self.prefs.set_alignment_overrides(&overrides);
    }

    // ---- per-frame work ---------------------------------------------------

    /// One frame: drain queued bus commands, advance navigation retries,
    /// flush deferred reconciler margins.
    pub fn on_tick(&mut self) {
        let now = now_ms();

        let drained: Vec<AppCommand> = self.commands.borrow_mut().drain(..).collect();
        for command in drained {
            match command {
                AppCommand::Goto(request) => self.handle_goto(request),
                AppCommand::SeedConcordance(token) => {
                    self.concordance_query = token;
                    self.set_right_tab(RightTab::Concordance);
                    self.spawn_concordance_fetch();
                }
            }
        }

        let scroll = {
            let bible = self.bible.borrow();
            self.nav
                .on_frame(|verse| bible.rows.iter().any(|r| r.verse == verse), now)
        };
        if let Some(request) = scroll {
            {
                let mut bible = self.bible.borrow_mut();
                if let Some(top) = bible.row_top(request.verse) {
                    bible.view.scroll_to_row(top);
                }
            }
            if let Some(v) = self
                .chapter
                .as_ref()
                .and_then(|c| c.verse_by_number(request.verse))
            {
                self.selected_verse_id = Some(v.id);
            }
            self.bus
                .publish(&Event::VerseSelected(request.selection()));
            if self.right_tab == RightTab::Manuscripts {
                self.bus
                    .publish(&Event::ManuscriptsScrollVerse(VerseTarget {
                        book: request.book.clone(),
                        chapter: request.chapter,
                        verse: request.verse,
                    }));
            }
        }

        for state in [&self.bible, &self.notes_pane, &self.right_pane] {
            let rebroadcast = state.borrow_mut().recon.on_tick(now);
            if let Some(broadcast) = rebroadcast {
                self.bus.publish(&Event::PaneHeights(broadcast));
            }
        }
    }

    /// Called from the render pass once a pane's natural rows are known.
    /// Publishes a height broadcast when the measurement actually changed.
    pub fn record_pane_measurement(&self, state: &Rc<RefCell<PaneState>>) {
        let broadcast = {
            let mut pane = state.borrow_mut();
            if !pane.recon.is_active() {
                pane.last_broadcast = None;
                return;
            }
            let heights: HeightMap = pane
                .rows
                .iter()
                .map(|r| (r.verse, r.natural))
                .collect();
            let raw_top = pane.top_offset + pane.recon.extra_margin();
            if pane.last_broadcast.as_ref() == Some(&(heights.clone(), raw_top)) {
                return;
            }
            pane.last_broadcast = Some((heights.clone(), raw_top));
            pane.recon.record_measurement(Measurement {
                heights,
                raw_top_offset: raw_top,
            })
        };
        if let Some(broadcast) = broadcast {
            self.bus.publish(&Event::PaneHeights(broadcast));
        }
    }

    // ---- data loading -----------------------------------------------------

    fn spawn_versions_fetch(&mut self) {
        let api = self.api.clone();
        self.versions_task = Some(tokio::spawn(async move { api.fetch_versions().await }));
    }

    pub fn spawn_chapter_fetch(&mut self) {
        if self.selected_version.is_empty() {
            return;
        }
        self.loading_chapter = true;
        let api = self.api.clone();
        let version = self.selected_version.clone();
        let book = self.selected_book.clone();
        let chapter = self.selected_chapter;
        self.chapter_task = Some(tokio::spawn(async move {
            api.fetch_chapter(&version, &book, chapter).await
        }));
    }

    fn spawn_notes_fetch(&mut self) {
        if !self.is_authenticated() {
            self.notes.clear();
            return;
        }
        let api = self.api.clone();
        self.notes_task = Some(tokio::spawn(async move { api.fetch_my_notes().await }));
    }

    fn spawn_profile_fetch(&mut self) {
        let api = self.api.clone();
        self.profile_task = Some(tokio::spawn(async move { api.fetch_my_profile().await }));
    }

    fn spawn_subscriptions_fetch(&mut self) {
        let api = self.api.clone();
        self.subs_task = Some(tokio::spawn(async move {
            api.fetch_note_subscriptions().await
        }));
    }

    pub fn spawn_author_notes_fetch(&mut self) {
        let Some(author_id) = self.selected_author_id else {
            self.author_notes.clear();
            return;
        };
        let api = self.api.clone();
        self.author_notes_task = Some(tokio::spawn(async move {
            api.fetch_author_notes(author_id).await
        }));
    }

    fn spawn_editions_fetch(&mut self) {
        let api = self.api.clone();
        let book = self.selected_book.clone();
        let chapter = self.selected_chapter;
        self.editions_task = Some(tokio::spawn(async move {
            api.fetch_manuscripts_available(&book, chapter).await
        }));
    }

    fn spawn_ms_chapter_fetch(&mut self) {
        let Some(edition) = self.selected_edition.clone() else {
            self.ms_chapter = None;
            return;
        };
        let api = self.api.clone();
        let book = self.selected_book.clone();
        let chapter = self.selected_chapter;
        self.ms_chapter_task = Some(tokio::spawn(async move {
            api.fetch_manuscript_chapter(&edition, &book, chapter).await
        }));
    }

    pub fn spawn_concordance_fetch(&mut self) {
        let query = self.concordance_query.trim().to_string();
        if query.is_empty() || self.selected_version.is_empty() {
            self.concordance = ConcordanceResponse::default();
            return;
        }
        let api = self.api.clone();
        let version = self.selected_version.clone();
        self.concordance_task = Some(tokio::spawn(async move {
            api.fetch_concordance(&version, &query, 10_000).await
        }));
    }

    pub fn spawn_login(&mut self, email: String, password: String, signup: bool) {
        let api = self.api.clone();
        self.login_task = Some(tokio::spawn(async move {
            if signup {
                api.signup(&email, &password, None).await
            } else {
                api.login(&email, &password).await
            }
        }));
    }

    pub fn logout(&mut self) {
        self.api.set_token(None);
        self.prefs.set_auth_token(None);
        self.profile = None;
        self.notes.clear();
        self.subscriptions.clear();
        self.selected_author_id = None;
        self.author_notes.clear();
        self.status = "Logged out".to_string();
    }

    pub fn spawn_note_save(&mut self) {
        let Overlay::NoteEditor {
            note_id,
            start_verse_id,
            end_verse_id,
            ref title,
            ref content,
            ref tags,
            is_public,
            ..
        } = self.overlay
        else {
            return;
        };
        let api = self.api.clone();
        let version = self.selected_version.clone();
        let title = title.clone();
        let content = content.clone();
        let tags = tags.clone();
        let task = match note_id {
            Some(id) => {
                // Partial update: send only the fields that changed
                let original = self.notes.iter().find(|n| n.id == id);
                let mut update = NoteUpdate::default();
                match original {
                    Some(orig) => {
                        if title != orig.title.clone().unwrap_or_default() {
                            update.title = Some(title);
                        }
                        if content != orig.content_markdown {
                            update.content_markdown = Some(content);
                        }
                        if is_public != orig.is_public {
                            update.is_public = Some(is_public);
                        }
                        if end_verse_id != orig.end_verse_id {
                            update.end_verse_id = Some(end_verse_id);
                        }
                        if tags != orig.tags.join(", ") {
                            update.tags = Some(tags);
                        }
                    }
                    None => {
                        update = NoteUpdate {
                            title: Some(title),
                            content_markdown: Some(content),
                            is_public: Some(is_public),
                            end_verse_id: Some(end_verse_id),
                            tags: Some(tags),
                        };
                    }
                }
                if update.is_empty() {
                    self.overlay = Overlay::None;
                    return;
                }
                tokio::spawn(async move { api.update_note(id, &update).await })
            }
            None => {
                let create = NoteCreate {
                    title,
                    content_markdown: content,
                    version_code: version,
                    start_verse_id,
                    end_verse_id,
                    is_public,
                    tags,
                };
                tokio::spawn(async move { api.create_note(&create).await })
            }
        };
        self.note_save_task = Some(task);
        self.overlay = Overlay::None;
    }

    // ---- task completion --------------------------------------------------

    /// Poll spawned backend calls; errors degrade to empty states
    pub async fn poll_tasks(&mut self) {
        if let Some(task) = &mut self.versions_task {
            if task.is_finished() {
                let task = self.versions_task.take().unwrap();
                match task.await {
                    Ok(Ok(versions)) => {
                        if self.selected_version.is_empty()
                            || !versions.iter().any(|v| v.code == self.selected_version)
                        {
                            self.selected_version = versions
                                .first()
                                .map(|v| v.code.clone())
                                .unwrap_or_default();
                        }
                        self.versions = versions;
                        self.spawn_chapter_fetch();
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(%err, "failed to load versions");
                        self.status = "Backend unavailable".to_string();
                    }
                    Err(err) => tracing::warn!(%err, "versions task aborted"),
                }
            }
        }

        if let Some(task) = &mut self.chapter_task {
            if task.is_finished() {
                let task = self.chapter_task.take().unwrap();
                self.loading_chapter = false;
                match task.await {
                    Ok(Ok(chapter)) => self.on_chapter_loaded(chapter),
                    Ok(Err(err)) => {
                        tracing::warn!(%err, "failed to load chapter");
                        self.chapter = None;
                    }
                    Err(err) => tracing::warn!(%err, "chapter task aborted"),
                }
            }
        }

        if let Some(task) = &mut self.notes_task {
            if task.is_finished() {
                let task = self.notes_task.take().unwrap();
                match task.await {
                    Ok(Ok(response)) => self.set_notes(response.notes),
                    Ok(Err(err)) => {
                        tracing::warn!(%err, "failed to load notes");
                        self.notes.clear();
                    }
                    Err(err) => tracing::warn!(%err, "notes task aborted"),
                }
            }
        }

        if let Some(task) = &mut self.subs_task {
            if task.is_finished() {
                let task = self.subs_task.take().unwrap();
                match task.await {
                    Ok(Ok(response)) => {
                        self.subscriptions = response.subscriptions;
                        if self.selected_author_id.is_none() {
                            self.selected_author_id =
                                self.subscriptions.first().map(|s| s.author_id);
                        }
                        self.spawn_author_notes_fetch();
                    }
                    Ok(Err(err)) => tracing::warn!(%err, "failed to load subscriptions"),
                    Err(err) => tracing::warn!(%err, "subscriptions task aborted"),
                }
            }
        }

        if let Some(task) = &mut self.author_notes_task {
            if task.is_finished() {
                let task = self.author_notes_task.take().unwrap();
                match task.await {
                    Ok(Ok(response)) => {
                        let mut notes = response.notes;
                        sort_canonical(&mut notes);
                        self.author_notes = notes;
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(%err, "failed to load author notes");
                        self.author_notes.clear();
                    }
                    Err(err) => tracing::warn!(%err, "author notes task aborted"),
                }
            }
        }

        if let Some(task) = &mut self.editions_task {
            if task.is_finished() {
                let task = self.editions_task.take().unwrap();
                match task.await {
                    Ok(Ok(response)) => {
                        self.editions = response.editions;
                        // Keep the persisted selection only while it is
                        // available for this chapter
                        let valid = self
                            .selected_edition
                            .as_ref()
                            .map(|code| self.editions.iter().any(|e| &e.code == code))
                            .unwrap_or(false);
                        if !valid {
                            self.selected_edition =
                                self.editions.first().map(|e| e.code.clone());
                            self.prefs
                                .set_selected_edition(self.selected_edition.as_deref());
                        }
                        self.spawn_ms_chapter_fetch();
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(%err, "failed to load manuscript editions");
                        self.editions.clear();
                        self.ms_chapter = None;
                    }
                    Err(err) => tracing::warn!(%err, "editions task aborted"),
                }
            }
        }

        if let Some(task) = &mut self.ms_chapter_task {
            if task.is_finished() {
                let task = self.ms_chapter_task.take().unwrap();
                match task.await {
                    Ok(Ok(chapter)) => self.ms_chapter = Some(chapter),
                    Ok(Err(err)) => {
                        tracing::warn!(%err, "failed to load manuscript chapter");
                        self.ms_chapter = None;
                    }
                    Err(err) => tracing::warn!(%err, "manuscript chapter task aborted"),
                }
            }
        }

        if let Some(task) = &mut self.concordance_task {
            if task.is_finished() {
                let task = self.concordance_task.take().unwrap();
                match task.await {
                    Ok(Ok(response)) => {
                        self.concordance = response;
                        self.concordance_selected = 0;
                        self.book_filter = None;
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(%err, "concordance search failed");
                        self.concordance = ConcordanceResponse::default();
                    }
                    Err(err) => tracing::warn!(%err, "concordance task aborted"),
                }
            }
        }

        if let Some(task) = &mut self.login_task {
            if task.is_finished() {
                let task = self.login_task.take().unwrap();
                match task.await {
                    Ok(Ok(token)) => {
                        self.prefs.set_auth_token(Some(&token.access_token));
                        self.api.set_token(Some(token.access_token));
                        self.overlay = Overlay::None;
                        self.status = "Logged in".to_string();
                        self.spawn_profile_fetch();
                        self.spawn_subscriptions_fetch();
                        self.spawn_notes_fetch();
                    }
                    Ok(Err(err)) => self.status = format!("Login failed: {err}"),
                    Err(err) => tracing::warn!(%err, "login task aborted"),
                }
            }
        }

        if let Some(task) = &mut self.profile_task {
            if task.is_finished() {
                let task = self.profile_task.take().unwrap();
                match task.await {
                    Ok(Ok(profile)) => self.profile = Some(profile),
                    Ok(Err(err)) => tracing::warn!(%err, "failed to load profile"),
                    Err(err) => tracing::warn!(%err, "profile task aborted"),
                }
            }
        }

        if let Some(task) = &mut self.note_save_task {
            if task.is_finished() {
                let task = self.note_save_task.take().unwrap();
                match task.await {
                    Ok(Ok(_)) => {
                        self.status = "Note saved".to_string();
                        self.spawn_notes_fetch();
                    }
                    Ok(Err(err)) => self.status = format!("Failed to save note: {err}"),
                    Err(err) => tracing::warn!(%err, "note save task aborted"),
                }
            }
        }
    }

    fn on_chapter_loaded(&mut self, chapter: ChapterData) {
        let now = now_ms();
        let numbers: Vec<u32> = chapter.verses.iter().map(|v| v.verse).collect();

        if self
            .selected_verse_id
            .map(|id| chapter.verse_by_id(id).is_none())
            .unwrap_or(true)
        {
            self.selected_verse_id = chapter.verses.first().map(|v| v.id);
        }
        self.word_cursor = None;

        for state in [&self.bible, &self.notes_pane, &self.right_pane] {
            let mut pane = state.borrow_mut();
            pane.recon.begin_chapter(&chapter.book, chapter.chapter, now);
            pane.view.reset();
            pane.rows.clear();
            pane.last_broadcast = None;
        }
        self.right_pane.borrow_mut().selected_word = None;

        self.nav.chapter_loaded(&chapter.book, chapter.chapter, &numbers);
        self.chapter = Some(chapter);

        self.spawn_notes_fetch();
        match self.right_tab {
            RightTab::Manuscripts => self.spawn_editions_fetch(),
            RightTab::Commentaries => {}
            RightTab::Concordance => {}
        }
    }

    fn set_notes(&mut self, all_notes: Vec<Note>) {
        let mut notes: Vec<Note> = all_notes
            .into_iter()
            .filter(|n| {
                n.start_book == self.selected_book && n.start_chapter == self.selected_chapter
            })
            .collect();
        sort_canonical(&mut notes);
        self.notes = notes;
        // Drop a tag filter that no longer matches anything
        if let Some(tag) = &self.active_tag {
            if !self.notes.iter().any(|n| n.tags.contains(tag)) {
                self.active_tag = None;
            }
        }
    }

    /// Notes visible in the pane after the single-tag filter
    pub fn visible_notes(&self) -> Vec<&Note> {
        self.notes
            .iter()
            .filter(|n| {
                self.active_tag
                    .as_ref()
                    .map(|tag| n.tags.contains(tag))
                    .unwrap_or(true)
            })
            .collect()
    }

    /// Cycle the tag filter through the tags present in the current list
    pub fn cycle_tag_filter(&mut self) {
        let mut tags: Vec<String> = Vec::new();
        for note in &self.notes {
            for tag in &note.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }
        tags.sort();
        self.active_tag = match &self.active_tag {
            None => tags.first().cloned(),
            Some(current) => match tags.iter().position(|t| t == current) {
                Some(i) if i + 1 < tags.len() => Some(tags[i + 1].clone()),
                _ => None,
            },
        };
    }

    pub fn toggle_selection_mode(&mut self) {
        self.selection_mode = if self.selection_mode == "verse" {
            "word".to_string()
        } else {
            "verse".to_string()
        };
        self.prefs.set_selection_mode(&self.selection_mode);
    }

    // ---- commentary helpers ----------------------------------------------

    pub fn cycle_commentator(&mut self) {
        if self.subscriptions.is_empty() {
            return;
        }
        let current = self
            .selected_author_id
            .and_then(|id| self.subscriptions.iter().position(|s| s.author_id == id));
        let next = match current {
            Some(i) => (i + 1) % self.subscriptions.len(),
            None => 0,
        };
        self.selected_author_id = Some(self.subscriptions[next].author_id);
        self.prefs.set_selected_author_id(self.selected_author_id);
        self.spawn_author_notes_fetch();
    }

    /// Commentary notes scoped to the loaded chapter
    pub fn chapter_author_notes(&self) -> Vec<&Note> {
        self.author_notes
            .iter()
            .filter(|n| {
                n.start_book == self.selected_book && n.start_chapter == self.selected_chapter
            })
            .collect()
    }

    pub fn select_manuscript_edition(&mut self, delta: i64) {
        if self.editions.is_empty() {
            return;
        }
        let current = self
            .selected_edition
            .as_ref()
            .and_then(|code| self.editions.iter().position(|e| &e.code == code))
            .unwrap_or(0);
        let next = (current as i64 + delta).rem_euclid(self.editions.len() as i64) as usize;
        self.selected_edition = Some(self.editions[next].code.clone());
        self.prefs
            .set_selected_edition(self.selected_edition.as_deref());
        self.spawn_ms_chapter_fetch();
    }

    // ---- concordance helpers ---------------------------------------------

    pub fn filtered_concordance_hits(&self) -> Vec<&biblenotes_core::model::ConcordanceHit> {
        use biblenotes_core::reference::{is_new_testament, is_old_testament};
        self.concordance
            .hits
            .iter()
            .filter(|h| match self.testament_filter {
                TestamentFilter::All => true,
                TestamentFilter::Old => is_old_testament(&h.book),
                TestamentFilter::New => is_new_testament(&h.book),
            })
            .filter(|h| {
                self.book_filter
                    .as_ref()
                    .map(|b| &h.book == b)
                    .unwrap_or(true)
            })
            .collect()
    }

    pub fn cycle_book_filter(&mut self) {
        let books: Vec<String> = {
            let mut seen = Vec::new();
            for hit in self.concordance.hits.iter() {
                if !seen.contains(&hit.book) {
                    seen.push(hit.book.clone());
                }
            }
            seen
        };
        self.book_filter = match &self.book_filter {
            None => books.first().cloned(),
            Some(current) => {
                let idx = books.iter().position(|b| b == current);
                match idx {
                    Some(i) if i + 1 < books.len() => Some(books[i + 1].clone()),
                    _ => None,
                }
            }
        };
        self.concordance_selected = 0;
    }

    pub fn toggle_concordance_expanded(&mut self) {
        self.concordance_expanded = !self.concordance_expanded;
        self.prefs.set_concordance_expanded(self.concordance_expanded);
    }

    /// Follow the selected concordance hit
    pub fn open_selected_hit(&mut self) {
        let hit = self
            .filtered_concordance_hits()
            .get(self.concordance_selected)
            .map(|h| (h.book.clone(), h.chapter, h.verse));
        if let Some((book, chapter, verse)) = hit {
            self.open_verse(&book, chapter, verse, None);
        }
    }

    pub fn toggle_backlinks_for_selected_verse(&mut self) {
        let Some(verse) = self.selected_verse().map(|v| v.verse) else {
            return;
        };
        if !self.open_backlinks.remove(&verse) {
            self.open_backlinks.insert(verse);
        }
    }

    // ---- note editor ------------------------------------------------------

    pub fn open_note_editor_for_selected_verse(&mut self) {
        if !self.is_authenticated() {
            self.overlay = Overlay::Login {
                email: String::new(),
                password: String::new(),
                field: LoginField::Email,
                signup: false,
            };
            return;
        }
        let Some(verse) = self.selected_verse() else {
            return;
        };
        self.overlay = Overlay::NoteEditor {
            note_id: None,
            start_verse_id: verse.id,
            end_verse_id: verse.id,
            title: String::new(),
            content: String::new(),
            tags: String::new(),
            is_public: false,
            field: NoteField::Title,
        };
    }

    pub fn open_note_editor_for_existing(&mut self) {
        let Some(verse) = self.selected_verse().map(|v| v.verse) else {
            return;
        };
        let Some(note) = self.notes.iter().find(|n| n.covers_verse(verse)) else {
            return;
        };
        self.overlay = Overlay::NoteEditor {
            note_id: Some(note.id),
            start_verse_id: note.start_verse_id,
            end_verse_id: note.end_verse_id,
            title: note.title.clone().unwrap_or_default(),
            content: note.content_markdown.clone(),
            tags: note.tags.join(", "),
            is_public: note.is_public,
            field: NoteField::Content,
        };
    }
}

/// Canonical sort: book order, then chapter, then start verse
pub fn sort_canonical(notes: &mut [Note]) {
    notes.sort_by(|a, b| {
        let ai = book_order(&a.start_book).unwrap_or(usize::MAX);
        let bi = book_order(&b.start_book).unwrap_or(usize::MAX);
        ai.cmp(&bi)
            .then(a.start_chapter.cmp(&b.start_chapter))
            .then(a.start_verse.cmp(&b.start_verse))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use biblenotes_core::model::Verse;
    use biblenotes_core::store::{JsonFileStore, Preferences};

    fn test_app() -> App {
        let config = Config::new();
        let prefs = Preferences::in_memory();
        let api = ApiClient::new("http://localhost:8000/api");
        App::with_services(config, prefs, api)
    }

    fn chapter(book: &str, chapter_no: u32, verses: u32) -> ChapterData {
        ChapterData {
            book: book.to_string(),
            chapter: chapter_no,
            verses: (1..=verses)
                .map(|v| Verse {
                    id: v as i64,
                    chapter: chapter_no,
                    verse: v,
                    text: format!("verse {v} text"),
                    backlinks: vec![],
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn manuscripts_tab_activates_alignment() {
        let mut app = test_app();
        assert!(!app.bible.borrow().recon.is_active());

        app.set_right_tab(RightTab::Manuscripts);
        assert!(app.bible.borrow().recon.is_active());
        assert!(app.right_pane.borrow().recon.is_active());
        assert!(!app.notes_pane.borrow().recon.is_active());

        app.set_right_tab(RightTab::Concordance);
        assert!(!app.bible.borrow().recon.is_active());
    }

    #[tokio::test]
    async fn sync_notes_toggle_activates_notes_pane() {
        let mut app = test_app();
        app.toggle_sync_notes();
        assert!(app.sync_notes);
        assert!(app.notes_pane.borrow().recon.is_active());
        assert!(app.bible.borrow().recon.is_active());
        app.toggle_sync_notes();
        assert!(!app.notes_pane.borrow().recon.is_active());
    }

    #[tokio::test]
    async fn click_selection_publishes_click_source() {
        let mut app = test_app();
        app.on_chapter_loaded(chapter("Genesis", 1, 5));

        // A subscriber pane with a scrolled view must not move on click
        app.notes_pane.borrow_mut().rows = vec![RowLayout {
            verse: 3,
            top: 10.0,
            height: 2.0,
            natural: 2.0,
        }];
        app.notes_pane.borrow_mut().view.set_scroll(5.0);

        app.select_verse_by_click(3);
        assert_eq!(app.selected_verse_id, Some(3));
        assert_eq!(app.notes_pane.borrow().view.scroll(), 5.0);
        assert_eq!(app.notes_pane.borrow().view.flashed_verse(now_ms()), Some(3));
    }

    #[tokio::test]
    async fn goto_over_bus_scrolls_subscriber_panes() {
        let mut app = test_app();
        app.on_chapter_loaded(chapter("Genesis", 1, 5));
        app.bible.borrow_mut().rows = (1..=5)
            .map(|v| RowLayout {
                verse: v,
                top: (v as f32 - 1.0) * 4.0,
                height: 4.0,
                natural: 4.0,
            })
            .collect();
        app.notes_pane.borrow_mut().rows = app.bible.borrow().rows.clone();

        app.go_to_reference_text("Genesis 1:4");
        app.on_tick(); // drain the queued goto; retry locates immediately

        // Scroll-sourced selection moves the notes pane to the row
        assert!(app.notes_pane.borrow().view.scroll() > 0.0);
        assert_eq!(app.selected_verse_id, Some(4));
    }

    #[tokio::test]
    async fn unknown_reference_is_reported_not_navigated() {
        let mut app = test_app();
        app.go_to_reference_text("Atlantis 3:16");
        assert!(app.status.contains("Unrecognized"));
    }

    #[tokio::test]
    async fn cross_chapter_goto_defers_until_load() {
        let mut app = test_app();
        app.selected_version = "KJV".to_string();
        app.on_chapter_loaded(chapter("Genesis", 1, 5));

        app.go_to_reference_text("Romans 3:16");
        app.on_tick();
        assert_eq!(app.selected_book, "Romans");
        assert_eq!(app.selected_chapter, 3);
        assert!(app.nav.has_active_retry() == false);

        // Chapter arrives with the target verse; retry begins
        app.on_chapter_loaded(chapter("Romans", 3, 20));
        assert!(app.nav.has_active_retry());
    }

    #[tokio::test]
    async fn word_select_seeds_concordance_and_switches_tab() {
        let mut app = test_app();
        app.selected_version = "KJV".to_string();
        app.on_chapter_loaded(chapter("Genesis", 1, 3));
        app.select_verse_by_click(2);
        app.move_word_cursor(1);
        app.select_word();
        app.on_tick();

        assert_eq!(app.right_tab, RightTab::Concordance);
        assert_eq!(app.concordance_query, "verse");
        assert!(app.right_pane.borrow().selected_word.is_some());
    }

    #[tokio::test]
    async fn alignment_nudges_accumulate_in_preferences() {
        let mut app = test_app();
        app.right_pane.borrow_mut().selected_word = Some(WordSelect {
            book: "John".to_string(),
            chapter: 1,
            verse: 1,
            token_index: 2,
            token: "word".to_string(),
            source_token_count: 5,
            non_stop_index: 1,
            non_stop_count: 3,
            is_stopword: false,
            mode: "verse".to_string(),
        });
        app.nudge_alignment(1);
        app.nudge_alignment(1);
        let key = AlignmentOverrides::key("John", 1, 1, 1);
        assert_eq!(app.prefs.alignment_overrides().get(&key), 2);
    }

    #[tokio::test]
    async fn measurement_pass_converges_panes() {
        let mut app = test_app();
        app.set_right_tab(RightTab::Manuscripts);
        app.on_chapter_loaded(chapter("Genesis", 1, 2));

        app.bible.borrow_mut().rows = vec![
            RowLayout { verse: 1, top: 0.0, height: 2.0, natural: 2.0 },
            RowLayout { verse: 2, top: 2.0, height: 5.0, natural: 5.0 },
        ];
        app.right_pane.borrow_mut().rows = vec![
            RowLayout { verse: 1, top: 0.0, height: 4.0, natural: 4.0 },
            RowLayout { verse: 2, top: 4.0, height: 3.0, natural: 3.0 },
        ];
        app.right_pane.borrow_mut().top_offset = 2.0;

        app.record_pane_measurement(&app.bible.clone());
        app.record_pane_measurement(&app.right_pane.clone());

        // Wait out the stabilization window, then flush deferred margins
        std::thread::sleep(std::time::Duration::from_millis(300));
        app.on_tick();

        let bible = app.bible.borrow();
        let right = app.right_pane.borrow();
        assert_eq!(bible.recon.forced_height(1), Some(4.0));
        assert_eq!(bible.recon.forced_height(2), Some(5.0));
        assert_eq!(right.recon.forced_height(1), Some(4.0));
        assert_eq!(right.recon.forced_height(2), Some(5.0));
        // Bible compensates for the manuscripts pane's selector header
        let bible_top = 0.0 + bible.recon.extra_margin();
        let right_top = 2.0 + right.recon.extra_margin();
        assert!((bible_top - right_top).abs() <= 2.0);
    }

    #[tokio::test]
    async fn preferences_survive_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        {
            let prefs = Preferences::new(Box::new(JsonFileStore::open(&path).unwrap()));
            let api = ApiClient::new("http://localhost:8000/api");
            let mut app = App::with_services(Config::new(), prefs, api);
            app.toggle_sync_notes();
            app.set_right_tab(RightTab::Manuscripts);
        }

        let prefs = Preferences::new(Box::new(JsonFileStore::open(&path).unwrap()));
        let api = ApiClient::new("http://localhost:8000/api");
        let app = App::with_services(Config::new(), prefs, api);
        assert!(app.sync_notes);
        assert_eq!(app.right_tab, RightTab::Manuscripts);
        // Restored toggles re-arm the reconcilers immediately
        assert!(app.notes_pane.borrow().recon.is_active());
        assert!(app.bible.borrow().recon.is_active());
    }

    #[test]
    fn canonical_note_sort() {
        let mk = |book: &str, chapter: u32, verse: u32| -> Note {
            serde_json::from_value(serde_json::json!({
                "id": 1, "owner_id": 1, "content_markdown": "", "content_html": "",
                "is_public": false, "version_code": "KJV",
                "start_verse_id": 1, "end_verse_id": 1,
                "start_book": book, "start_chapter": chapter, "start_verse": verse,
                "end_book": book, "end_chapter": chapter, "end_verse": verse,
                "updated_at": "2024-01-01T00:00:00Z"
            }))
            .unwrap()
        };
        let mut notes = vec![
            mk("Romans", 1, 1),
            mk("Genesis", 2, 5),
            mk("Genesis", 2, 3),
            mk("Genesis", 1, 9),
        ];
        sort_canonical(&mut notes);
        let order: Vec<(String, u32, u32)> = notes
            .iter()
            .map(|n| (n.start_book.clone(), n.start_chapter, n.start_verse))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Genesis".to_string(), 1, 9),
                ("Genesis".to_string(), 2, 3),
                ("Genesis".to_string(), 2, 5),
                ("Romans".to_string(), 1, 1),
            ]
        );
    }
}
