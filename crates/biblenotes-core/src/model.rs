use serde::{Deserialize, Serialize};

/// A Bible translation/version offered by the backend
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Version {
    pub code: String,
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A note by some author that cites a verse, attached to that verse by the backend
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Backlink {
    pub note_id: i64,
    #[serde(default)]
    pub note_title: Option<String>,
    #[serde(default)]
    pub note_owner_name: Option<String>,
    pub note_owner_id: i64,
    pub note_is_public: bool,
    #[serde(default)]
    pub source_book: Option<String>,
    #[serde(default)]
    pub source_chapter: Option<u32>,
    #[serde(default)]
    pub source_verse: Option<u32>,
}

/// One verse of a chapter payload. Identity is (book, chapter, verse);
/// `id` is the backend surrogate used for note ranges.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Verse {
    pub id: i64,
    pub chapter: u32,
    pub verse: u32,
    pub text: String,
    #[serde(default)]
    pub backlinks: Vec<Backlink>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChapterData {
    pub book: String,
    pub chapter: u32,
    pub verses: Vec<Verse>,
}

impl ChapterData {
    pub fn verse_by_number(&self, verse: u32) -> Option<&Verse> {
        self.verses.iter().find(|v| v.verse == verse)
    }

    pub fn verse_by_id(&self, id: i64) -> Option<&Verse> {
        self.verses.iter().find(|v| v.id == id)
    }
}

/// A personal note spanning an inclusive verse range within one chapter/version
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Note {
    pub id: i64,
    pub owner_id: i64,
    #[serde(default)]
    pub owner_display_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub content_markdown: String,
    pub content_html: String,
    pub is_public: bool,
    pub version_code: String,
    pub start_verse_id: i64,
    pub end_verse_id: i64,
    pub start_book: String,
    pub start_chapter: u32,
    pub start_verse: u32,
    pub end_book: String,
    pub end_chapter: u32,
    pub end_verse: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub cross_references: Vec<String>,
    pub updated_at: String,
}

impl Note {
    /// Whether this note's verse range includes the given verse number
    pub fn covers_verse(&self, verse: u32) -> bool {
        let lo = self.start_verse.min(self.end_verse);
        let hi = self.start_verse.max(self.end_verse);
        (lo..=hi).contains(&verse)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotesResponse {
    pub notes: Vec<Note>,
}

/// Partial note update; only set fields are sent (serde skips the rest)
#[derive(Debug, Serialize, Default, Clone)]
pub struct NoteUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_verse_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

impl NoteUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content_markdown.is_none()
            && self.is_public.is_none()
            && self.end_verse_id.is_none()
            && self.tags.is_none()
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct NoteCreate {
    pub title: String,
    pub content_markdown: String,
    pub version_code: String,
    pub start_verse_id: i64,
    pub end_verse_id: i64,
    pub is_public: bool,
    pub tags: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthorSubscription {
    pub author_id: i64,
    #[serde(default)]
    pub author_display_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubscriptionsResponse {
    pub subscriptions: Vec<AuthorSubscription>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ManuscriptEdition {
    pub code: String,
    pub name: String,
    pub language: String,
    pub scope: String,
    #[serde(default)]
    pub license_name: Option<String>,
}

impl ManuscriptEdition {
    /// Right-to-left scripts render right-aligned
    pub fn is_rtl(&self) -> bool {
        matches!(self.language.as_str(), "heb" | "arc" | "syr")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ManuscriptEditionsResponse {
    pub editions: Vec<ManuscriptEdition>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ManuscriptVerse {
    pub id: i64,
    pub chapter: u32,
    pub verse: u32,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ManuscriptChapter {
    #[serde(default)]
    pub edition: Option<ManuscriptEdition>,
    #[serde(default)]
    pub verses: Vec<ManuscriptVerse>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConcordanceHit {
    pub book: String,
    pub chapter: u32,
    pub verse: u32,
    pub occurrences: u32,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ConcordanceResponse {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub version_code: String,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub total_occurrences: u32,
    #[serde(default)]
    pub hits: Vec<ConcordanceHit>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub notes: Vec<Note>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_covers_inclusive_range() {
        let mut note: Note = serde_json::from_value(serde_json::json!({
            "id": 1, "owner_id": 2, "content_markdown": "m", "content_html": "h",
            "is_public": false, "version_code": "KJV",
            "start_verse_id": 10, "end_verse_id": 12,
            "start_book": "Genesis", "start_chapter": 1, "start_verse": 3,
            "end_book": "Genesis", "end_chapter": 1, "end_verse": 5,
            "updated_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(note.covers_verse(3));
        assert!(note.covers_verse(5));
        assert!(!note.covers_verse(6));

        // Reversed range still covers the span
        note.start_verse = 5;
        note.end_verse = 3;
        assert!(note.covers_verse(4));
    }

    #[test]
    fn note_update_serializes_only_set_fields() {
        let update = NoteUpdate {
            title: Some("New title".to_string()),
            ..NoteUpdate::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({"title": "New title"}));
        assert!(NoteUpdate::default().is_empty());
    }

    #[test]
    fn chapter_lookup_by_number_and_id() {
        let data = ChapterData {
            book: "John".to_string(),
            chapter: 3,
            verses: vec![
                Verse { id: 100, chapter: 3, verse: 16, text: "For God so loved".to_string(), backlinks: vec![] },
                Verse { id: 101, chapter: 3, verse: 17, text: "For God sent not".to_string(), backlinks: vec![] },
            ],
        };
        assert_eq!(data.verse_by_number(17).map(|v| v.id), Some(101));
        assert_eq!(data.verse_by_id(100).map(|v| v.verse), Some(16));
        assert!(data.verse_by_number(18).is_none());
    }

    #[test]
    fn rtl_editions() {
        let mut ed = ManuscriptEdition {
            code: "WLC".to_string(),
            name: "Westminster Leningrad Codex".to_string(),
            language: "heb".to_string(),
            scope: "OT".to_string(),
            license_name: None,
        };
        assert!(ed.is_rtl());
        ed.language = "grc".to_string();
        assert!(!ed.is_rtl());
    }
}
