use chrono::{DateTime, Utc};
use serde::Serialize;

/// One recording known to the current browser session.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    /// Server-assigned filename, unique within the catalog.
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Ordered set of recordings visible to the current session, newest first.
#[derive(Debug, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepends a new entry. Inserting an already-present filename is a
    /// no-op that keeps the entry at its original position; returns whether
    /// anything changed.
    pub fn insert(&mut self, filename: &str) -> bool {
        if self.contains(filename) {
            return false;
        }
        self.entries.insert(
            0,
            CatalogEntry {
                filename: filename.to_owned(),
                uploaded_at: Utc::now(),
            },
        );
        true
    }

    /// Appends server-listed files in the order the server returned them,
    /// skipping filenames already present.
    pub fn insert_listing(&mut self, files: &[String]) -> usize {
        let mut added = 0;
        for filename in files {
            if !self.contains(filename) {
                self.entries.push(CatalogEntry {
                    filename: filename.clone(),
                    uploaded_at: Utc::now(),
                });
                added += 1;
            }
        }
        added
    }

    /// Removes an entry; no-op if absent. Returns whether anything changed.
    pub fn remove(&mut self, filename: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.filename != filename);
        self.entries.len() != before
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.entries.iter().any(|e| e.filename == filename)
    }

    pub fn files(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.filename.clone()).collect()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_newest_first() {
        let mut catalog = Catalog::new();
        assert!(catalog.insert("a.webm"));
        assert!(catalog.insert("b.webm"));
        assert_eq!(catalog.files(), vec!["b.webm", "a.webm"]);
    }

    #[test]
    fn duplicate_insert_keeps_original_position() {
        let mut catalog = Catalog::new();
        catalog.insert("a.webm");
        catalog.insert("b.webm");
        assert!(!catalog.insert("a.webm"));
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.files(), vec!["b.webm", "a.webm"]);
    }

    #[test]
    fn remove_absent_is_a_noop() {
        let mut catalog = Catalog::new();
        catalog.insert("a.webm");
        assert!(!catalog.remove("missing.webm"));
        assert!(catalog.remove("a.webm"));
        assert!(catalog.is_empty());
    }

    #[test]
    fn listing_preserves_server_order_and_skips_known_files() {
        let mut catalog = Catalog::new();
        catalog.insert("fresh.webm");
        let added = catalog.insert_listing(&[
            "fresh.webm".to_string(),
            "old_1.webm".to_string(),
            "old_2.webm".to_string(),
        ]);
        assert_eq!(added, 2);
        assert_eq!(catalog.files(), vec!["fresh.webm", "old_1.webm", "old_2.webm"]);
    }
}
