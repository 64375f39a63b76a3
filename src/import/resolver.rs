use std::collections::HashMap;

use serde_json::Value;

use crate::client::extract_id;
use crate::record::extract_title;

/// Run-scoped lookup from a parent's display title to its remote id.
///
/// Keys are trimmed and case-folded, so `"  sprint 1 "` finds `"Sprint 1"`.
/// Lives for one import run; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionMap {
    entries: HashMap<String, String>,
}

impl ResolutionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize_key(title: &str) -> String {
        title.trim().to_lowercase()
    }

    /// Map `title` to `id`, replacing an earlier parent with the same title.
    /// Blank titles are ignored.
    pub fn insert(&mut self, title: &str, id: impl Into<String>) {
        let key = Self::normalize_key(title);
        if !key.is_empty() {
            self.entries.insert(key, id.into());
        }
    }

    /// Like [`insert`](Self::insert) but keeps an existing mapping.
    pub fn insert_if_absent(&mut self, title: &str, id: impl Into<String>) {
        let key = Self::normalize_key(title);
        if !key.is_empty() {
            self.entries.entry(key).or_insert_with(|| id.into());
        }
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&Self::normalize_key(name))
            .map(String::as_str)
    }

    /// Add every titled, identified record of a remote listing without
    /// overriding what the current run already recorded.
    pub fn absorb_listing(&mut self, items: &[Value]) -> usize {
        let before = self.len();
        for item in items {
            let (Some(fields), Some(id)) = (item.as_object(), extract_id(item)) else {
                continue;
            };
            self.insert_if_absent(&extract_title(fields), id);
        }
        self.len() - before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: AsRef<str>, I: Into<String>> FromIterator<(T, I)> for ResolutionMap {
    fn from_iter<It: IntoIterator<Item = (T, I)>>(iter: It) -> Self {
        let mut map = ResolutionMap::new();
        for (title, id) in iter {
            map.insert(title.as_ref(), id);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_case_and_whitespace_insensitive() {
        let mut map = ResolutionMap::new();
        map.insert("Sprint 1", "42");
        assert_eq!(map.resolve("  sprint 1 "), Some("42"));
        assert_eq!(map.resolve("SPRINT 1"), Some("42"));
        assert_eq!(map.resolve("Sprint 2"), None);
    }

    #[test]
    fn test_later_insert_wins_but_absent_keeps() {
        let mut map = ResolutionMap::new();
        map.insert("Backlog", "1");
        map.insert("backlog", "2");
        assert_eq!(map.resolve("Backlog"), Some("2"));
        map.insert_if_absent("BACKLOG", "3");
        assert_eq!(map.resolve("Backlog"), Some("2"));
    }

    #[test]
    fn test_blank_titles_ignored() {
        let mut map = ResolutionMap::new();
        map.insert("   ", "1");
        assert!(map.is_empty());
    }

    #[test]
    fn test_absorb_listing() {
        let mut map: ResolutionMap = [("Sprint 1", "42")].into_iter().collect();
        let listing = vec![
            json!({"id": 7, "title": "sprint 1"}),
            json!({"id": 8, "title": {"rendered": "Backlog"}}),
            json!({"title": "No id"}),
            json!("junk"),
        ];
        assert_eq!(map.absorb_listing(&listing), 1);
        assert_eq!(map.resolve("sprint 1"), Some("42"));
        assert_eq!(map.resolve("backlog"), Some("8"));
        assert_eq!(map.len(), 2);
    }
}
