// File: src/persistence.rs
use crate::core::counter::SoundMeaningTable;
use crate::core::trials::{BatchSink, PermutationBatch};
use crate::core::types::{PairId, SoundPair, Vocabulary};
use crate::core::word_table::WordTable;
use crate::error::{PermuteError, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const ORIGINAL_DIR: &str = "DataOriginal";
pub const PERMUTE_DIR: &str = "DataPermute";
pub const ORIGINAL_COUNTS_FILE: &str = "OriginalCnt.csv";
pub const WORD_LENGTH_FILE: &str = "LM_word_length.csv";
pub const SNAPSHOT_FILE: &str = "word_table.bin";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Follows every uppercase symbol in a storage key.
const UPPERCASE_MARK: char = '_';

/// File stem for a sound pair. With `escape_uppercase`, `aG` becomes `aG_`
/// so it cannot land on the same file as `ag` on a case-insensitive filesystem.
pub fn storage_key(pair: SoundPair, escape_uppercase: bool) -> String {
    let mut key = String::with_capacity(4);
    for symbol in [pair.first, pair.second] {
        key.push(symbol);
        if escape_uppercase && symbol.is_uppercase() {
            key.push(UPPERCASE_MARK);
        }
    }
    key
}

/// Storage key of every pair, indexed by `PairId`.
/// When escaping, keys are also checked for uniqueness after case folding.
pub fn storage_keys(vocab: &Vocabulary, escape_uppercase: bool) -> Result<Vec<String>> {
    let mut keys = Vec::with_capacity(vocab.num_pairs());
    let mut taken: HashMap<String, SoundPair> = HashMap::with_capacity(vocab.num_pairs());
    for pair in vocab.pairs() {
        let key = storage_key(pair, escape_uppercase);
        let folded = if escape_uppercase { key.to_lowercase() } else { key.clone() };
        if let Some(other) = taken.insert(folded, pair) {
            return Err(PermuteError::KeyCollision {
                first: other.to_string(),
                second: pair.to_string(),
                key,
            });
        }
        keys.push(key);
    }
    Ok(keys)
}

/// Describes the batch on disk. Rewritten after every completed flush, so
/// `trials_committed` only counts rows present in every pair file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchManifest {
    pub meanings: Vec<String>,
    pub symbols: Vec<char>,
    pub escape_uppercase: bool,
    pub seed: u64,
    pub trials_committed: u64,
}

impl BatchManifest {
    pub fn new(vocab: &Vocabulary, escape_uppercase: bool, seed: u64) -> Self {
        Self {
            meanings: vocab.meanings().to_vec(),
            symbols: vocab.symbols().to_vec(),
            escape_uppercase,
            seed,
            trials_committed: 0,
        }
    }

    pub fn check_compatible(&self, vocab: &Vocabulary, escape_uppercase: bool) -> Result<()> {
        let message = if self.meanings != vocab.meanings() {
            "meaning list differs from the one the batch was started with"
        } else if self.symbols != vocab.symbols() {
            "symbol alphabet differs from the one the batch was started with"
        } else if self.escape_uppercase != escape_uppercase {
            "uppercase escaping differs from the one the batch was started with"
        } else {
            return Ok(());
        };
        Err(PermuteError::IncompatibleBatch { message: message.to_string() })
    }
}

/// Writes the original-count tables and appends trial rows to the
/// per-pair batch files under `<root>/DataPermute`.
pub struct ResultWriter<'a> {
    vocab: &'a Vocabulary,
    root: PathBuf,
    keys: Vec<String>,
    manifest: BatchManifest,
}

impl<'a> ResultWriter<'a> {
    /// Starts a new, empty batch for `table`: writes its original counts,
    /// word lengths and snapshot, then resets every pair file to its header row.
    ///
    /// The previous manifest is removed before anything else is written and
    /// the new one only appears once the snapshot is in place, so a failed
    /// start can never be continued against another run's word table.
    pub fn create(
        root: &Path,
        vocab: &'a Vocabulary,
        escape_uppercase: bool,
        seed: u64,
        table: &WordTable,
        original: &SoundMeaningTable,
    ) -> Result<Self> {
        let writer = Self {
            vocab,
            root: root.to_path_buf(),
            keys: storage_keys(vocab, escape_uppercase)?,
            manifest: BatchManifest::new(vocab, escape_uppercase, seed),
        };

        writer.retire_manifest()?;
        writer.write_original_counts(original)?;
        writer.write_word_lengths(table)?;
        save_snapshot(table, &writer.snapshot_path())?;

        // manifest before the headers: a crash below leaves extra rows that open() trims
        writer.save_manifest()?;
        let header = table_header("sound", vocab);
        for pair in 0..vocab.num_pairs() {
            let path = writer.pair_path(pair);
            write_atomically(&path, |file| {
                let mut csv = csv_writer(file);
                csv.write_record(&header).map_err(|e| PermuteError::csv(&path, e))?;
                csv.flush().map_err(|e| PermuteError::io(&path, e))
            })?;
        }
        info!(
            "created {} batch files in {}",
            vocab.num_pairs(),
            writer.permute_dir().display()
        );
        Ok(writer)
    }

    /// Reopens an existing batch for continuation. Rows beyond the committed
    /// trial count, left by an interrupted flush, are trimmed.
    pub fn open(root: &Path, vocab: &'a Vocabulary, escape_uppercase: bool) -> Result<Self> {
        let manifest = load_manifest(&root.join(PERMUTE_DIR).join(MANIFEST_FILE))?;
        manifest.check_compatible(vocab, escape_uppercase)?;
        let writer = Self {
            vocab,
            root: root.to_path_buf(),
            keys: storage_keys(vocab, escape_uppercase)?,
            manifest,
        };
        writer.reconcile()?;
        info!(
            "reopened batch in {} at {} committed trials",
            writer.permute_dir().display(),
            writer.manifest.trials_committed
        );
        Ok(writer)
    }

    pub fn manifest(&self) -> &BatchManifest {
        &self.manifest
    }

    pub fn trials_committed(&self) -> u64 {
        self.manifest.trials_committed
    }

    pub fn seed(&self) -> u64 {
        self.manifest.seed
    }

    pub fn original_dir(&self) -> PathBuf {
        self.root.join(ORIGINAL_DIR)
    }

    pub fn permute_dir(&self) -> PathBuf {
        self.root.join(PERMUTE_DIR)
    }

    pub fn pair_path(&self, pair: PairId) -> PathBuf {
        self.permute_dir().join(format!("{}.csv", self.keys[pair]))
    }

    /// Writes the unpermuted SoundPair × Meaning counts.
    pub fn write_original_counts(&self, table: &SoundMeaningTable) -> Result<()> {
        let path = self.original_dir().join(ORIGINAL_COUNTS_FILE);
        write_atomically(&path, |file| {
            let mut csv = csv_writer(file);
            csv.write_record(table_header("sound", self.vocab))
                .map_err(|e| PermuteError::csv(&path, e))?;
            for pair in 0..self.vocab.num_pairs() {
                write_count_row(&mut csv, &self.vocab.pair(pair).to_string(), table.pair_row(pair))
                    .map_err(|e| PermuteError::csv(&path, e))?;
            }
            csv.flush().map_err(|e| PermuteError::io(&path, e))
        })
    }

    /// Writes the character length of every cell of the cleaned table.
    pub fn write_word_lengths(&self, table: &WordTable) -> Result<()> {
        let path = self.original_dir().join(WORD_LENGTH_FILE);
        let lengths = table.word_lengths();
        write_atomically(&path, |file| {
            let mut csv = csv_writer(file);
            csv.write_record(table_header("language", self.vocab))
                .map_err(|e| PermuteError::csv(&path, e))?;
            let rows = lengths.chunks(table.num_meanings().max(1));
            for (language, row) in table.languages().iter().zip(rows) {
                let record = std::iter::once(language.clone())
                    .chain(row.iter().map(|len| len.to_string()));
                csv.write_record(record).map_err(|e| PermuteError::csv(&path, e))?;
            }
            csv.flush().map_err(|e| PermuteError::io(&path, e))
        })
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.original_dir().join(SNAPSHOT_FILE)
    }

    /// All trial rows stored for one pair, in trial order.
    pub fn read_pair_rows(&self, pair: PairId) -> Result<Vec<Vec<u32>>> {
        let path = self.pair_path(pair);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .map_err(|e| PermuteError::csv(&path, e))?;
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| PermuteError::csv(&path, e))?;
            let row = record
                .iter()
                .skip(1)
                .map(|field| field.parse::<u32>())
                .collect::<std::result::Result<Vec<u32>, _>>()
                .map_err(|e| PermuteError::CorruptBatch {
                    message: format!("{}: {}", path.display(), e),
                })?;
            rows.push(row);
        }
        Ok(rows)
    }

    fn append_pair(&self, pair: PairId, batch: &PermutationBatch) -> Result<()> {
        let path = self.pair_path(pair);
        let label = self.vocab.pair(pair).to_string();
        write_atomically(&path, |file| {
            let mut existing = File::open(&path).map_err(|e| PermuteError::io(&path, e))?;
            io::copy(&mut existing, file).map_err(|e| PermuteError::io(&path, e))?;
            let mut csv = csv_writer(file);
            for row in batch.pair_rows(pair) {
                write_count_row(&mut csv, &label, row).map_err(|e| PermuteError::csv(&path, e))?;
            }
            csv.flush().map_err(|e| PermuteError::io(&path, e))
        })
    }

    fn reconcile(&self) -> Result<()> {
        let committed = self.manifest.trials_committed;
        for pair in 0..self.vocab.num_pairs() {
            let path = self.pair_path(pair);
            let text = fs::read_to_string(&path).map_err(|e| PermuteError::io(&path, e))?;
            let lines: Vec<&str> = text.split_inclusive('\n').collect();
            if lines.is_empty() {
                return Err(PermuteError::CorruptBatch {
                    message: format!("{}: missing header row", path.display()),
                });
            }

            let rows = (lines.len() - 1) as u64;
            if rows < committed {
                return Err(PermuteError::CorruptBatch {
                    message: format!(
                        "{}: {} trial rows, manifest records {}",
                        path.display(),
                        rows,
                        committed
                    ),
                });
            }
            if rows > committed {
                warn!(
                    "{}: trimming {} rows left by an interrupted flush",
                    path.display(),
                    rows - committed
                );
                let kept = lines[..=committed as usize].concat();
                write_atomically(&path, |file| {
                    file.write_all(kept.as_bytes()).map_err(|e| PermuteError::io(&path, e))
                })?;
            }
        }
        Ok(())
    }

    fn retire_manifest(&self) -> Result<()> {
        let path = self.permute_dir().join(MANIFEST_FILE);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("removed previous manifest {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PermuteError::io(&path, e)),
        }
    }

    fn save_manifest(&self) -> Result<()> {
        let path = self.permute_dir().join(MANIFEST_FILE);
        write_atomically(&path, |file| {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &self.manifest)
                .map_err(|source| PermuteError::Json { path: path.clone(), source })?;
            writer.flush().map_err(|e| PermuteError::io(&path, e))
        })
    }
}

impl BatchSink for ResultWriter<'_> {
    /// Extends every pair file with the batch rows, then commits the new
    /// trial count to the manifest.
    fn append(&mut self, batch: &PermutationBatch) -> Result<()> {
        if batch.num_pairs() != self.vocab.num_pairs()
            || batch.num_meanings() != self.vocab.num_meanings()
        {
            return Err(PermuteError::IncompatibleBatch {
                message: format!(
                    "batch shape {}x{} does not match vocabulary {}x{}",
                    batch.num_pairs(),
                    batch.num_meanings(),
                    self.vocab.num_pairs(),
                    self.vocab.num_meanings()
                ),
            });
        }
        if batch.first_trial() != self.manifest.trials_committed {
            return Err(PermuteError::CorruptBatch {
                message: format!(
                    "batch starts at trial {}, {} trials are committed",
                    batch.first_trial(),
                    self.manifest.trials_committed
                ),
            });
        }

        for pair in 0..self.vocab.num_pairs() {
            self.append_pair(pair, batch)?;
        }
        self.manifest.trials_committed = batch.next_trial();
        self.save_manifest()?;
        debug!(
            "appended {} trials, {} committed",
            batch.len(),
            self.manifest.trials_committed
        );
        Ok(())
    }
}

pub fn load_manifest(path: &Path) -> Result<BatchManifest> {
    let file = File::open(path).map_err(|e| PermuteError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|source| PermuteError::Json { path: path.to_path_buf(), source })
}

/// Saves the cleaned word table so continuation runs permute exactly the same data.
pub fn save_snapshot(table: &WordTable, path: &Path) -> Result<()> {
    write_atomically(path, |file| {
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, table)
            .map_err(|source| PermuteError::Snapshot { path: path.to_path_buf(), source })?;
        writer.flush().map_err(|e| PermuteError::io(path, e))
    })
}

pub fn load_snapshot(path: &Path) -> Result<WordTable> {
    let file = File::open(path).map_err(|e| PermuteError::io(path, e))?;
    let reader = BufReader::new(file);
    let table: WordTable = bincode::deserialize_from(reader)
        .map_err(|source| PermuteError::Snapshot { path: path.to_path_buf(), source })?;
    if !table.is_well_formed() {
        return Err(PermuteError::CorruptBatch {
            message: format!(
                "{}: snapshot cells do not cover {} languages x {} meanings",
                path.display(),
                table.num_languages(),
                table.num_meanings()
            ),
        });
    }
    Ok(table)
}

/// Fills a temp file next to `path`, then renames it over `path`.
/// Readers see either the old file or the complete new one.
fn write_atomically<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let parent_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent_dir).map_err(|e| PermuteError::io(parent_dir, e))?;

    let mut temp_file =
        NamedTempFile::new_in(parent_dir).map_err(|e| PermuteError::io(parent_dir, e))?;
    fill(temp_file.as_file_mut())?;
    temp_file.as_file().sync_all().map_err(|e| PermuteError::io(path, e))?;
    temp_file.persist(path).map_err(|e| PermuteError::io(path, e.error))?;
    Ok(())
}

fn csv_writer<W: Write>(inner: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(inner)
}

fn table_header(first: &str, vocab: &Vocabulary) -> Vec<String> {
    std::iter::once(first.to_string())
        .chain(vocab.meanings().iter().cloned())
        .collect()
}

fn write_count_row<W: Write>(csv: &mut csv::Writer<W>, label: &str, counts: &[u32]) -> csv::Result<()> {
    csv.write_record(std::iter::once(label.to_string()).chain(counts.iter().map(|c| c.to_string())))
}
