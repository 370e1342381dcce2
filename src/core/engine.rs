use crate::config::{RunConfig, RunMode};
use crate::core::counter::{SoundCounter, SoundMeaningTable};
use crate::core::trials::{RunSummary, TrialRunner};
use crate::core::types::Vocabulary;
use crate::core::word_table::WordTable;
use crate::corpus::parse_corpus_file;
use crate::error::{PermuteError, Result};
use crate::persistence::{load_snapshot, ResultWriter};
use log::{info, warn};

// The engine owns the vocabulary and the worker pool; word tables and
// batch files are handed to it per run.
pub struct PermuteEngine {
    config: RunConfig,
    vocab: Vocabulary,
    counter: SoundCounter,
}

impl PermuteEngine {
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        let vocab = config.vocabulary()?;
        let counter = SoundCounter::new(config.workers, config.partitions)?;
        Ok(Self { config, vocab, counter })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Counts the unpermuted table.
    pub fn count_original(&self, table: &WordTable) -> Result<SoundMeaningTable> {
        self.counter.count(table, &self.vocab)
    }

    pub fn run(&self) -> Result<RunSummary> {
        match self.config.mode {
            RunMode::Fresh => self.run_fresh(),
            RunMode::Append => self.run_append(),
        }
    }

    /// Reads the corpus and starts a new batch from it.
    pub fn run_fresh(&self) -> Result<RunSummary> {
        let (table, report) =
            parse_corpus_file(&self.config.corpus_path, &self.vocab, &self.config.missing_token)?;
        if table.num_languages() == 0 {
            warn!(
                "{}: no language has an attested word ({} entries stored, {} silent languages), \
                 every count will be zero",
                self.config.corpus_path.display(),
                report.entries_stored,
                report.silent_languages
            );
        }
        self.start_batch(&table)
    }

    /// Writes the original counts, word lengths and snapshot for `table`,
    /// resets the batch files and runs `num_trials` trials.
    pub fn start_batch(&self, table: &WordTable) -> Result<RunSummary> {
        let seed = self.config.seed.unwrap_or_else(rand::random);
        info!("starting fresh batch with run seed {}", seed);

        let original = self.count_original(table)?;
        let mut writer = ResultWriter::create(
            &self.config.output_dir,
            &self.vocab,
            self.config.escape_uppercase,
            seed,
            table,
            &original,
        )?;

        let runner = TrialRunner::new(table, &self.vocab, &self.counter, seed, self.config.flush_every);
        runner.run(0, self.config.num_trials, &mut writer)
    }

    /// Appends `num_trials` more trials to the batch on disk, using the
    /// snapshot and seed recorded when the batch was started.
    pub fn run_append(&self) -> Result<RunSummary> {
        let mut writer =
            ResultWriter::open(&self.config.output_dir, &self.vocab, self.config.escape_uppercase)?;
        let table = load_snapshot(&writer.snapshot_path())?;
        if table.num_meanings() != self.vocab.num_meanings() {
            return Err(PermuteError::IncompatibleBatch {
                message: format!(
                    "snapshot has {} meaning columns, vocabulary has {}",
                    table.num_meanings(),
                    self.vocab.num_meanings()
                ),
            });
        }

        let seed = writer.seed();
        if let Some(configured) = self.config.seed.filter(|&s| s != seed) {
            warn!("ignoring configured seed {}, batch was started with {}", configured, seed);
        }
        let first_trial = writer.trials_committed();
        info!("appending {} trials after trial {}", self.config.num_trials, first_trial);

        let runner = TrialRunner::new(&table, &self.vocab, &self.counter, seed, self.config.flush_every);
        runner.run(first_trial, self.config.num_trials, &mut writer)
    }
}
