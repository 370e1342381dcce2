// File: src/core/word_table.rs
use crate::core::types::MeaningId;
use serde::{Deserialize, Serialize};

/// Index of a language row.
pub type LanguageId = usize;

/// Languages × meanings grid holding one word per cell (empty when no word
/// is attested). Every row has exactly one cell per meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordTable {
    num_meanings: usize,
    languages: Vec<String>,
    /// Row-major, `languages.len() * num_meanings` cells.
    cells: Vec<String>,
}

impl WordTable {
    pub fn new(num_meanings: usize) -> Self {
        Self { num_meanings, languages: Vec::new(), cells: Vec::new() }
    }

    /// Appends a language row. Panics if `words` does not hold one cell per meaning.
    pub fn push_language(&mut self, language: impl Into<String>, words: Vec<String>) -> LanguageId {
        assert_eq!(
            words.len(),
            self.num_meanings,
            "a language row needs one cell per meaning"
        );
        self.languages.push(language.into());
        self.cells.extend(words);
        self.languages.len() - 1
    }

    pub fn num_languages(&self) -> usize {
        self.languages.len()
    }

    pub fn num_meanings(&self) -> usize {
        self.num_meanings
    }

    /// True when there is exactly one cell per (language, meaning).
    /// Only a table read back from disk can fail this.
    pub fn is_well_formed(&self) -> bool {
        self.languages.len().checked_mul(self.num_meanings) == Some(self.cells.len())
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn word(&self, language: LanguageId, meaning: MeaningId) -> &str {
        &self.cells[language * self.num_meanings + meaning]
    }

    pub fn row(&self, language: LanguageId) -> &[String] {
        let start = language * self.num_meanings;
        &self.cells[start..start + self.num_meanings]
    }

    pub(crate) fn row_mut(&mut self, language: LanguageId) -> &mut [String] {
        let start = language * self.num_meanings;
        &mut self.cells[start..start + self.num_meanings]
    }

    /// Replaces every cell equal to `token` with the empty word.
    /// Returns the number of cells replaced.
    pub fn normalize_missing(&mut self, token: &str) -> usize {
        let mut replaced = 0;
        for cell in self.cells.iter_mut().filter(|cell| cell.as_str() == token) {
            cell.clear();
            replaced += 1;
        }
        replaced
    }

    /// Removes languages whose words are all empty. Returns how many were removed.
    pub fn drop_silent_languages(&mut self) -> usize {
        let before = self.languages.len();
        let mut kept_languages = Vec::with_capacity(before);
        let mut kept_cells = Vec::with_capacity(self.cells.len());

        let languages = std::mem::take(&mut self.languages);
        let mut cells = std::mem::take(&mut self.cells).into_iter();
        for language in languages {
            let row: Vec<String> = cells.by_ref().take(self.num_meanings).collect();
            if row.iter().any(|word| !word.is_empty()) {
                kept_languages.push(language);
                kept_cells.extend(row);
            }
        }

        self.languages = kept_languages;
        self.cells = kept_cells;
        before - self.languages.len()
    }

    /// Character length of every cell, row-major like the table itself.
    pub fn word_lengths(&self) -> Vec<usize> {
        self.cells.iter().map(|word| word_len(word)).collect()
    }
}

/// Word length in characters, not bytes.
#[inline]
pub fn word_len(word: &str) -> usize {
    word.chars().count()
}
