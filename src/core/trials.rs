// File: src/core/trials.rs
use crate::core::counter::{SoundCounter, SoundMeaningTable};
use crate::core::permuter::permute;
use crate::core::types::{PairId, Vocabulary};
use crate::core::word_table::WordTable;
use crate::error::{PermuteError, Result};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Receives consecutive chunks of trial rows, in trial order.
pub trait BatchSink {
    fn append(&mut self, batch: &PermutationBatch) -> Result<()>;
}

/// Per-sound-pair rows of per-meaning counts, one row per trial, starting at
/// absolute trial index `first_trial`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermutationBatch {
    num_meanings: usize,
    first_trial: u64,
    trials: usize,
    /// One buffer per sound pair, `trials * num_meanings` counts each.
    rows: Vec<Vec<u32>>,
}

impl PermutationBatch {
    pub fn new(num_pairs: usize, num_meanings: usize, first_trial: u64) -> Self {
        Self::with_capacity(num_pairs, num_meanings, first_trial, 0)
    }

    /// Pre-sizes every pair buffer for `trials` rows.
    pub fn with_capacity(num_pairs: usize, num_meanings: usize, first_trial: u64, trials: usize) -> Self {
        Self {
            num_meanings,
            first_trial,
            trials: 0,
            rows: (0..num_pairs)
                .map(|_| Vec::with_capacity(trials * num_meanings))
                .collect(),
        }
    }

    pub fn num_pairs(&self) -> usize {
        self.rows.len()
    }

    pub fn num_meanings(&self) -> usize {
        self.num_meanings
    }

    pub fn first_trial(&self) -> u64 {
        self.first_trial
    }

    /// Absolute index of the trial that would come next.
    pub fn next_trial(&self) -> u64 {
        self.first_trial + self.trials as u64
    }

    pub fn len(&self) -> usize {
        self.trials
    }

    pub fn is_empty(&self) -> bool {
        self.trials == 0
    }

    /// Appends one trial's table as the next row of every pair.
    pub fn push(&mut self, table: &SoundMeaningTable) -> Result<()> {
        if table.num_pairs() != self.num_pairs() || table.num_meanings() != self.num_meanings {
            return Err(PermuteError::IncompatibleBatch {
                message: format!(
                    "table shape {}x{} does not match batch {}x{}",
                    table.num_pairs(),
                    table.num_meanings(),
                    self.num_pairs(),
                    self.num_meanings
                ),
            });
        }
        for (pair, buffer) in self.rows.iter_mut().enumerate() {
            buffer.extend_from_slice(table.pair_row(pair));
        }
        self.trials += 1;
        Ok(())
    }

    /// Rows of one sound pair in trial order.
    pub fn pair_rows(&self, pair: PairId) -> impl Iterator<Item = &[u32]> + '_ {
        self.rows[pair].chunks(self.num_meanings.max(1))
    }

    /// Empties the batch, keeping buffer capacity, and makes it start at `first_trial`.
    pub fn reset(&mut self, first_trial: u64) {
        for buffer in &mut self.rows {
            buffer.clear();
        }
        self.first_trial = first_trial;
        self.trials = 0;
    }
}

impl BatchSink for PermutationBatch {
    fn append(&mut self, batch: &PermutationBatch) -> Result<()> {
        if batch.num_pairs() != self.num_pairs() || batch.num_meanings != self.num_meanings {
            return Err(PermuteError::IncompatibleBatch {
                message: format!(
                    "batch shape {}x{} does not match {}x{}",
                    batch.num_pairs(),
                    batch.num_meanings,
                    self.num_pairs(),
                    self.num_meanings
                ),
            });
        }
        if batch.first_trial != self.next_trial() {
            return Err(PermuteError::CorruptBatch {
                message: format!(
                    "batch starts at trial {}, expected {}",
                    batch.first_trial,
                    self.next_trial()
                ),
            });
        }
        for (buffer, incoming) in self.rows.iter_mut().zip(&batch.rows) {
            buffer.extend_from_slice(incoming);
        }
        self.trials += batch.trials;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub first_trial: u64,
    pub trials_run: usize,
    pub trials_committed: u64,
}

/// Seed of one trial's RNG: a splitmix64 stream keyed by the run seed.
/// Distinct trial indices give distinct seeds for a given run seed.
pub fn trial_seed(run_seed: u64, trial: u64) -> u64 {
    let mut z = run_seed.wrapping_add(trial.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Runs permute-then-count trials over a fixed word table.
pub struct TrialRunner<'a> {
    table: &'a WordTable,
    vocab: &'a Vocabulary,
    counter: &'a SoundCounter,
    run_seed: u64,
    flush_every: usize,
}

impl<'a> TrialRunner<'a> {
    pub fn new(
        table: &'a WordTable,
        vocab: &'a Vocabulary,
        counter: &'a SoundCounter,
        run_seed: u64,
        flush_every: usize,
    ) -> Self {
        Self { table, vocab, counter, run_seed, flush_every: flush_every.max(1) }
    }

    /// One trial: permute with the trial's own RNG, then count.
    pub fn run_trial(&self, trial: u64) -> Result<SoundMeaningTable> {
        let mut rng = StdRng::seed_from_u64(trial_seed(self.run_seed, trial));
        let permuted = permute(self.table, &mut rng);
        self.counter.count(&permuted, self.vocab)
    }

    /// Runs trials `first_trial .. first_trial + num_trials`, handing the rows
    /// to `sink` in chunks of at most `flush_every` trials.
    pub fn run<S: BatchSink + ?Sized>(
        &self,
        first_trial: u64,
        num_trials: usize,
        sink: &mut S,
    ) -> Result<RunSummary> {
        let mut chunk = PermutationBatch::with_capacity(
            self.vocab.num_pairs(),
            self.vocab.num_meanings(),
            first_trial,
            self.flush_every.min(num_trials),
        );

        for done in 1..=num_trials {
            let trial = chunk.next_trial();
            let table = self.run_trial(trial)?;
            chunk.push(&table)?;
            info!("trial {}/{} completed (index {})", done, num_trials, trial);

            if chunk.len() == self.flush_every {
                debug!("flushing trials {}..{}", chunk.first_trial(), chunk.next_trial());
                sink.append(&chunk)?;
                let next = chunk.next_trial();
                chunk.reset(next);
            }
        }
        if !chunk.is_empty() {
            debug!("flushing trials {}..{}", chunk.first_trial(), chunk.next_trial());
            sink.append(&chunk)?;
        }

        Ok(RunSummary {
            first_trial,
            trials_run: num_trials,
            trials_committed: first_trial + num_trials as u64,
        })
    }

    /// Runs the trials and keeps every row in memory.
    pub fn collect(&self, first_trial: u64, num_trials: usize) -> Result<PermutationBatch> {
        let mut batch = PermutationBatch::with_capacity(
            self.vocab.num_pairs(),
            self.vocab.num_meanings(),
            first_trial,
            num_trials,
        );
        self.run(first_trial, num_trials, &mut batch)?;
        Ok(batch)
    }
}
