// File: src/corpus.rs
//! Reads the flat word-list corpus into a cleaned [`WordTable`].
//!
//! A language block starts with a line holding the language name followed by
//! `{`; the line right after the header carries block metadata and is skipped.
//! Every other line is an entry whose second and third whitespace-separated
//! fields are the meaning and the raw word.

use crate::core::types::Vocabulary;
use crate::core::word_table::WordTable;
use crate::error::{PermuteError, Result};
use log::{debug, info};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Marker characters removed from every word before it is stored.
pub const STRIPPED_CHARS: &[char] = &[
    '~', '`', '!', '@', '#', '$', '%', '^', '&', '*', '+', '/', '=', ':', ';', '.', ',', '?',
    '|', '"',
];

/// What ingestion skipped or normalized along the way.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub languages_read: usize,
    pub entries_stored: usize,
    pub malformed_lines: usize,
    pub unknown_meanings: usize,
    pub missing_words: usize,
    pub silent_languages: usize,
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} languages read, {} silent languages dropped, {} entries stored, \
             {} malformed lines, {} unknown meanings, {} missing words",
            self.languages_read,
            self.silent_languages,
            self.entries_stored,
            self.malformed_lines,
            self.unknown_meanings,
            self.missing_words
        )
    }
}

pub fn strip_markers(raw: &str) -> String {
    raw.chars().filter(|c| !STRIPPED_CHARS.contains(c)).collect()
}

pub fn parse_corpus_file(
    path: &Path,
    vocab: &Vocabulary,
    missing_token: &str,
) -> Result<(WordTable, IngestReport)> {
    let file = File::open(path).map_err(|e| PermuteError::io(path, e))?;
    let result = parse_corpus(BufReader::new(file), vocab, missing_token)
        .map_err(|e| match e {
            PermuteError::Io { source, .. } => PermuteError::io(path, source),
            other => other,
        })?;
    info!("{}: {} ({} languages kept)", path.display(), result.1, result.0.num_languages());
    Ok(result)
}

/// Parses the corpus, normalizes missing words and drops silent languages.
pub fn parse_corpus<R: BufRead>(
    reader: R,
    vocab: &Vocabulary,
    missing_token: &str,
) -> Result<(WordTable, IngestReport)> {
    let mut table = WordTable::new(vocab.num_meanings());
    let mut report = IngestReport::default();

    let mut current: Option<(String, Vec<String>)> = None;
    let mut skip_next = false;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| PermuteError::io(Path::new("<corpus>"), e))?;

        if let Some((name, _)) = line.split_once('{') {
            if let Some((language, words)) = current.take() {
                table.push_language(language, words);
            }
            current = Some((name.trim().to_string(), vec![String::new(); vocab.num_meanings()]));
            report.languages_read += 1;
            skip_next = true;
            continue;
        }
        if skip_next {
            skip_next = false;
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let (Some(block), [_, meaning, raw, ..]) = (current.as_mut(), fields.as_slice()) else {
            debug!("line {}: skipped malformed entry {:?}", line_no + 1, line);
            report.malformed_lines += 1;
            continue;
        };

        let Some(meaning_id) = vocab.meaning_id(meaning) else {
            report.unknown_meanings += 1;
            continue;
        };
        block.1[meaning_id] = strip_markers(raw);
        report.entries_stored += 1;
    }
    if let Some((language, words)) = current.take() {
        table.push_language(language, words);
    }

    report.missing_words = table.normalize_missing(missing_token);
    report.silent_languages = table.drop_silent_languages();
    Ok((table, report))
}
