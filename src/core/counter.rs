// File: src/core/counter.rs
use crate::core::types::{MeaningId, PairId, SymbolId, Vocabulary};
use crate::core::word_table::WordTable;
use crate::error::{PermuteError, Result};
use rayon::prelude::*;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};

/// Dense SoundPair × Meaning table of presence counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundMeaningTable {
    num_meanings: usize,
    /// Pair-major: the counts of one sound pair across all meanings are contiguous.
    counts: Vec<u32>,
}

impl SoundMeaningTable {
    pub fn zeros(num_pairs: usize, num_meanings: usize) -> Self {
        Self { num_meanings, counts: vec![0; num_pairs * num_meanings] }
    }

    /// Builds the table from per-meaning columns given in meaning order.
    pub fn from_columns(num_pairs: usize, columns: &[Vec<u32>]) -> Self {
        let mut table = Self::zeros(num_pairs, columns.len());
        for (meaning, column) in columns.iter().enumerate() {
            for (pair, &count) in column.iter().enumerate() {
                table.counts[pair * table.num_meanings + meaning] = count;
            }
        }
        table
    }

    pub fn num_pairs(&self) -> usize {
        if self.num_meanings == 0 { 0 } else { self.counts.len() / self.num_meanings }
    }

    pub fn num_meanings(&self) -> usize {
        self.num_meanings
    }

    pub fn get(&self, pair: PairId, meaning: MeaningId) -> u32 {
        self.counts[pair * self.num_meanings + meaning]
    }

    /// Counts of one sound pair across every meaning.
    pub fn pair_row(&self, pair: PairId) -> &[u32] {
        let start = pair * self.num_meanings;
        &self.counts[start..start + self.num_meanings]
    }

    pub fn max_count(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }
}

/// Counts sound-pair presence per meaning on a fixed-size worker pool.
pub struct SoundCounter {
    pool: rayon::ThreadPool,
    partitions: usize,
}

impl SoundCounter {
    pub fn new(workers: usize, partitions: usize) -> Result<Self> {
        if workers == 0 || partitions == 0 {
            return Err(PermuteError::invalid_config(
                "workers and partitions must both be at least 1",
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("count-worker-{}", i))
            .build()
            .map_err(|e| PermuteError::WorkerFailure { message: e.to_string() })?;
        Ok(Self { pool, partitions })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Splits the meaning columns into contiguous groups, counts each group on
    /// the pool and stitches the groups back in column order. Any worker panic
    /// fails the whole table.
    pub fn count(&self, table: &WordTable, vocab: &Vocabulary) -> Result<SoundMeaningTable> {
        if table.num_meanings() != vocab.num_meanings() {
            return Err(PermuteError::invalid_config(format!(
                "word table has {} meaning columns, vocabulary has {}",
                table.num_meanings(),
                vocab.num_meanings()
            )));
        }

        let groups = split_columns(vocab.num_meanings(), self.partitions);
        let columns = self.fan_out(&groups, |range| count_columns(table, vocab, range))?;
        if columns.len() != vocab.num_meanings() {
            return Err(PermuteError::WorkerFailure {
                message: format!(
                    "workers returned {} columns, expected {}",
                    columns.len(),
                    vocab.num_meanings()
                ),
            });
        }
        Ok(SoundMeaningTable::from_columns(vocab.num_pairs(), &columns))
    }

    /// Runs `work` on every column group in the pool and concatenates the
    /// returned columns in group order. A panic in any group discards all of them.
    fn fan_out<F>(&self, groups: &[Range<usize>], work: F) -> Result<Vec<Vec<u32>>>
    where
        F: Fn(Range<usize>) -> Vec<Vec<u32>> + Sync,
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.pool.install(|| {
                groups
                    .par_iter()
                    .map(|range| work(range.clone()))
                    .collect::<Vec<Vec<Vec<u32>>>>()
            })
        }));

        let partials = outcome.map_err(|payload| PermuteError::WorkerFailure {
            message: panic_message(payload.as_ref()),
        })?;
        Ok(partials.into_iter().flatten().collect())
    }
}

/// Contiguous column ranges, `numpy.array_split` style: the first
/// `total % parts` ranges hold one extra column. Never returns empty ranges.
pub fn split_columns(total: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.clamp(1, total.max(1));
    let base = total / parts;
    let extra = total % parts;
    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let len = base + usize::from(i < extra);
        if len > 0 {
            ranges.push(start..start + len);
        }
        start += len;
    }
    ranges
}

fn count_columns(table: &WordTable, vocab: &Vocabulary, columns: Range<usize>) -> Vec<Vec<u32>> {
    columns.map(|meaning| count_column(table, vocab, meaning)).collect()
}

/// For one meaning, the number of languages whose word contains each pair.
/// A pair occurring several times in one word is counted once.
pub fn count_column(table: &WordTable, vocab: &Vocabulary, meaning: MeaningId) -> Vec<u32> {
    let mut column = vec![0u32; vocab.num_pairs()];
    // last language that touched each pair; dedupes repeats within a word
    let mut last_seen = vec![usize::MAX; vocab.num_pairs()];
    let mut symbols: Vec<Option<SymbolId>> = Vec::new();

    for language in 0..table.num_languages() {
        symbols.clear();
        symbols.extend(table.word(language, meaning).chars().map(|c| vocab.symbol_id(c)));
        for window in symbols.windows(2) {
            if let [Some(first), Some(second)] = window {
                let pair = vocab.pair_id(*first, *second);
                if last_seen[pair] != language {
                    last_seen[pair] = language;
                    column[pair] += 1;
                }
            }
        }
    }
    column
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("counting worker panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("counting worker panicked: {}", s)
    } else {
        "counting worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SoundPair;

    fn row(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn vocab(meanings: &[&str], symbols: &[char]) -> Vocabulary {
        Vocabulary::new(meanings.iter().map(|m| m.to_string()).collect(), symbols.to_vec()).unwrap()
    }

    fn pair(v: &Vocabulary, s: &str) -> PairId {
        let mut chars = s.chars();
        let p = SoundPair::new(chars.next().unwrap(), chars.next().unwrap());
        v.pair_id_of(p).unwrap()
    }

    #[test]
    fn single_language_scenario() {
        let v = vocab(&["I", "you"], &['a', 'b']);
        let mut table = WordTable::new(2);
        table.push_language("lang1", row(&["ab", "ba"]));

        let counts = SoundCounter::new(2, 2).unwrap().count(&table, &v).unwrap();
        assert_eq!(counts.get(pair(&v, "ab"), 0), 1);
        assert_eq!(counts.get(pair(&v, "ba"), 1), 1);
        assert_eq!(counts.get(pair(&v, "ab"), 1), 0);
        assert_eq!(counts.get(pair(&v, "ba"), 0), 0);
    }

    #[test]
    fn repeated_bigram_counts_once_per_language() {
        let v = vocab(&["I"], &['a', 'b']);
        let mut table = WordTable::new(1);
        table.push_language("l1", row(&["ababab"]));
        table.push_language("l2", row(&["ab"]));
        table.push_language("l3", row(&["a"]));

        let column = count_column(&table, &v, 0);
        assert_eq!(column[pair(&v, "ab")], 2);
        assert_eq!(column[pair(&v, "ba")], 1);
        assert_eq!(column[pair(&v, "aa")], 0);
    }

    #[test]
    fn bigrams_through_unknown_symbols_are_ignored() {
        let v = vocab(&["I"], &['a', 'b']);
        let mut table = WordTable::new(1);
        table.push_language("l1", row(&["a3b"]));
        let column = count_column(&table, &v, 0);
        assert!(column.iter().all(|&c| c == 0));
    }

    #[test]
    fn parallel_and_sequential_counts_agree() {
        let meanings = ["m0", "m1", "m2", "m3", "m4", "m5", "m6"];
        let v = vocab(&meanings, &['a', 'b', 'c']);
        let mut table = WordTable::new(meanings.len());
        table.push_language("l1", row(&["abc", "cab", "", "a", "bb", "abca", "cc"]));
        table.push_language("l2", row(&["ba", "", "ccc", "ab", "b", "acb", "bca"]));

        let columns: Vec<Vec<u32>> = (0..meanings.len()).map(|m| count_column(&table, &v, m)).collect();
        let sequential = SoundMeaningTable::from_columns(v.num_pairs(), &columns);
        for partitions in 1..=9 {
            let counter = SoundCounter::new(3, partitions).unwrap();
            assert_eq!(counter.count(&table, &v).unwrap(), sequential);
        }
    }

    #[test]
    fn mismatched_table_is_rejected() {
        let v = vocab(&["I", "you"], &['a']);
        let table = WordTable::new(3);
        let err = SoundCounter::new(1, 1).unwrap().count(&table, &v).unwrap_err();
        assert_eq!(err.kind(), "invalid_config");
    }

    #[test]
    fn panicking_worker_fails_the_whole_table() {
        let counter = SoundCounter::new(2, 3).unwrap();
        let groups = split_columns(6, 3);

        let err = counter
            .fan_out(&groups, |range| {
                if range.start == 2 {
                    panic!("column group {:?} gave up", range);
                }
                range.map(|_| vec![1u32; 4]).collect()
            })
            .unwrap_err();
        assert_eq!(err.kind(), "worker_failure");
        assert!(err.to_string().contains("gave up"), "{}", err);

        // the pool is still usable afterwards
        let columns = counter
            .fan_out(&groups, |range| range.map(|m| vec![m as u32; 4]).collect())
            .unwrap();
        assert_eq!(columns.len(), 6);
        assert_eq!(columns[5], vec![5; 4]);
    }

    #[test]
    fn split_matches_array_split() {
        assert_eq!(split_columns(40, 3), vec![0..14, 14..27, 27..40]);
        assert_eq!(split_columns(2, 3), vec![0..1, 1..2]);
        assert_eq!(split_columns(5, 1), vec![0..5]);
        assert!(split_columns(0, 3).is_empty());
    }
}
