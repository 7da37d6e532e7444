use regex::Regex;
use std::sync::OnceLock;

/// Canonical book order; verse keys are shared across panes, book order
/// drives note sorting.
pub const BOOKS: [&str; 66] = [
    "Genesis",
    "Exodus",
    "Leviticus",
    "Numbers",
    "Deuteronomy",
    "Joshua",
    "Judges",
    "Ruth",
    "1 Samuel",
    "2 Samuel",
    "1 Kings",
    "2 Kings",
    "1 Chronicles",
    "2 Chronicles",
    "Ezra",
    "Nehemiah",
    "Esther",
    "Job",
    "Psalms",
    "Proverbs",
    "Ecclesiastes",
    "Song of Solomon",
    "Isaiah",
    "Jeremiah",
    "Lamentations",
    "Ezekiel",
    "Daniel",
    "Hosea",
    "Joel",
    "Amos",
    "Obadiah",
    "Jonah",
    "Micah",
    "Nahum",
    "Habakkuk",
    "Zephaniah",
    "Haggai",
    "Zechariah",
    "Malachi",
    "Matthew",
    "Mark",
    "Luke",
    "John",
    "Acts",
    "Romans",
    "1 Corinthians",
    "2 Corinthians",
    "Galatians",
    "Ephesians",
    "Philippians",
    "Colossians",
    "1 Thessalonians",
    "2 Thessalonians",
    "1 Timothy",
    "2 Timothy",
    "Titus",
    "Philemon",
    "Hebrews",
    "James",
    "1 Peter",
    "2 Peter",
    "1 John",
    "2 John",
    "3 John",
    "Jude",
    "Revelation",
];

const OLD_TESTAMENT_COUNT: usize = 39;

/// Position of a book in canonical order, if it is one of ours
pub fn book_order(book: &str) -> Option<usize> {
    BOOKS.iter().position(|b| *b == book)
}

pub fn is_old_testament(book: &str) -> bool {
    book_order(book).map(|i| i < OLD_TESTAMENT_COUNT).unwrap_or(false)
}

pub fn is_new_testament(book: &str) -> bool {
    book_order(book).map(|i| i >= OLD_TESTAMENT_COUNT).unwrap_or(false)
}

fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Map a free-text book name ("1 cor", "songofsolomon") to its canonical
/// entry. Exact normalized match wins over a prefix match.
pub fn resolve_book(raw: &str) -> Option<&'static str> {
    let norm = normalize(raw);
    if norm.is_empty() {
        return None;
    }
    BOOKS
        .iter()
        .find(|b| normalize(b) == norm)
        .or_else(|| BOOKS.iter().find(|b| normalize(b).starts_with(&norm)))
        .copied()
}

/// A fully-resolved verse reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub book: String,
    pub chapter: u32,
    pub verse: u32,
}

impl Reference {
    pub fn new(book: impl Into<String>, chapter: u32, verse: u32) -> Self {
        Self { book: book.into(), chapter, verse }
    }

    pub fn label(&self) -> String {
        format!("{} {}:{}", self.book, self.chapter, self.verse)
    }
}

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "Romans 3:16", "1 Cor 5:7", or space-separated "Romans 3 16"
    RE.get_or_init(|| Regex::new(r"^\s*(.+?)\s+(\d+)[\s:](\d+)\s*$").unwrap())
}

/// Parse a free-text reference like "Romans 3:16". Returns None for
/// anything that does not resolve to a known book and positive numbers.
pub fn parse_reference(text: &str) -> Option<Reference> {
    let caps = reference_regex().captures(text)?;
    let book = resolve_book(caps.get(1)?.as_str())?;
    let chapter: u32 = caps.get(2)?.as_str().parse().ok()?;
    let verse: u32 = caps.get(3)?.as_str().parse().ok()?;
    if chapter == 0 || verse == 0 {
        return None;
    }
    Some(Reference::new(book, chapter, verse))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_exact_and_prefix_book_names() {
        assert_eq!(resolve_book("Romans"), Some("Romans"));
        assert_eq!(resolve_book("rom"), Some("Romans"));
        assert_eq!(resolve_book("1 cor"), Some("1 Corinthians"));
        assert_eq!(resolve_book("song of solomon"), Some("Song of Solomon"));
        assert_eq!(resolve_book("nonesuch"), None);
        assert_eq!(resolve_book(""), None);
    }

    #[test]
    fn exact_match_beats_prefix() {
        // "John" is a prefix of neither "1 John" nor vice versa after
        // normalization ordering; exact must win over "1 John" etc.
        assert_eq!(resolve_book("John"), Some("John"));
        assert_eq!(resolve_book("jude"), Some("Jude"));
    }

    #[test]
    fn parses_colon_and_space_forms() {
        assert_eq!(
            parse_reference("Romans 3:16"),
            Some(Reference::new("Romans", 3, 16))
        );
        assert_eq!(
            parse_reference("  1 Cor 5 7 "),
            Some(Reference::new("1 Corinthians", 5, 7))
        );
        assert_eq!(parse_reference("Romans"), None);
        assert_eq!(parse_reference("Romans 0:3"), None);
        assert_eq!(parse_reference("Atlantis 3:16"), None);
    }

    #[test]
    fn testament_split() {
        assert!(is_old_testament("Malachi"));
        assert!(is_new_testament("Matthew"));
        assert!(!is_old_testament("Matthew"));
        assert!(!is_new_testament("Not A Book"));
    }
}
