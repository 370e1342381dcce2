// File: src/core/permuter.rs
use crate::core::word_table::{word_len, WordTable};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

/// Words shorter than this carry no bigram and never move.
pub const MIN_PERMUTABLE_LEN: usize = 2;

/// Returns a copy of `table` where, independently in every language row,
/// words of equal length (>= 2) are shuffled among their own positions.
pub fn permute<R: Rng + ?Sized>(table: &WordTable, rng: &mut R) -> WordTable {
    let mut permuted = table.clone();
    for language in 0..permuted.num_languages() {
        permute_row(permuted.row_mut(language), rng);
    }
    permuted
}

/// Shuffles one row in place within its length groups.
/// Groups are visited in ascending length so a seeded RNG gives one fixed result.
pub fn permute_row<R: Rng + ?Sized>(row: &mut [String], rng: &mut R) {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (position, word) in row.iter().enumerate() {
        let len = word_len(word);
        if len >= MIN_PERMUTABLE_LEN {
            groups.entry(len).or_default().push(position);
        }
    }

    for positions in groups.values().filter(|positions| positions.len() > 1) {
        let mut words: Vec<String> = positions
            .iter()
            .map(|&position| std::mem::take(&mut row[position]))
            .collect();
        words.shuffle(rng);
        for (&position, word) in positions.iter().zip(words) {
            row[position] = word;
        }
    }
}
