//! Long-term memory log
//!
//! An append-only list of free-text fact strings persisted as a JSON array.
//! Consumed by the response generator only when `memory_enabled` is set,
//! summarized into a bounded trailing character window for prompt inclusion.

use std::path::{Path, PathBuf};

use crate::Result;

/// Append-only fact store backed by a JSON file
#[derive(Debug, Clone)]
pub struct MemoryStore {
    path: PathBuf,
}

impl MemoryStore {
    /// Open the store at `path`, creating an empty log when absent
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, "[]")?;
            tracing::debug!(path = %path.display(), "created empty memory log");
        }
        Ok(Self { path })
    }

    /// Append a fact to the log
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or written
    pub fn add_fact(&self, fact: &str) -> Result<()> {
        let mut facts = self.read_all()?;
        facts.push(fact.to_string());
        self.write_all(&facts)
    }

    /// Read every stored fact in insertion order
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn read_all(&self) -> Result<Vec<String>> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Remove every stored fact
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn clear(&self) -> Result<()> {
        self.write_all(&[])
    }

    /// Summarize the log for prompt inclusion: facts joined with `" | "`,
    /// clipped to the trailing `max_chars` characters so the newest facts
    /// survive when the log outgrows the window.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read
    pub fn summarize_context(&self, max_chars: usize) -> Result<String> {
        let joined = self.read_all()?.join(" | ");
        Ok(tail_chars(&joined, max_chars).to_string())
    }

    /// Backing file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_all(&self, facts: &[String]) -> Result<()> {
        let json = serde_json::to_string_pretty(facts)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// The trailing `max_chars` characters of `text`, respecting UTF-8 boundaries
fn tail_chars(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    let skip = total - max_chars;
    match text.char_indices().nth(skip) {
        Some((byte_idx, _)) => &text[byte_idx..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path().join("memory.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn open_creates_empty_log() {
        let (_dir, store) = temp_store();
        assert!(store.read_all().unwrap().is_empty());
    }

    #[test]
    fn facts_append_in_order() {
        let (_dir, store) = temp_store();
        store.add_fact("likes rust").unwrap();
        store.add_fact("lives in berlin").unwrap();

        assert_eq!(
            store.read_all().unwrap(),
            vec!["likes rust".to_string(), "lives in berlin".to_string()]
        );
    }

    #[test]
    fn clear_empties_the_log() {
        let (_dir, store) = temp_store();
        store.add_fact("ephemeral").unwrap();
        store.clear().unwrap();
        assert!(store.read_all().unwrap().is_empty());
    }

    #[test]
    fn summarize_keeps_the_tail() {
        let (_dir, store) = temp_store();
        store.add_fact("oldest fact that should be clipped away").unwrap();
        store.add_fact("newest fact").unwrap();

        let summary = store.summarize_context(15).unwrap();
        assert_eq!(summary.chars().count(), 15);
        assert!(summary.ends_with("newest fact"));
    }

    #[test]
    fn summarize_is_utf8_safe() {
        let (_dir, store) = temp_store();
        store.add_fact("héllo wörld ünïcode").unwrap();

        // Clipping in the middle of multibyte characters must not panic
        for window in 0..25 {
            let _ = store.summarize_context(window).unwrap();
        }
    }

    #[test]
    fn tail_chars_counts_characters_not_bytes() {
        assert_eq!(tail_chars("αβγδ", 2), "γδ");
        assert_eq!(tail_chars("abc", 10), "abc");
        assert_eq!(tail_chars("abc", 0), "");
    }
}
