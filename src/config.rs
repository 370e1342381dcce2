// File: src/config.rs
use crate::core::types::Vocabulary;
use crate::error::{PermuteError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub const DEFAULT_MEANINGS: [&str; 40] = [
    "I", "you", "we", "one", "two", "person", "fish", "dog", "louse", "tree", "leaf", "skin",
    "blood", "bone", "horn", "ear", "eye", "nose", "tooth", "tongue", "knee", "hand", "breast",
    "liver", "drink", "see", "hear", "die", "come", "sun", "star", "water", "stone", "fire",
    "path", "mountain", "night", "full", "new", "name",
];

pub const DEFAULT_SYMBOLS: [char; 35] = [
    'p', 'b', 'f', 'v', 'm', 'w', 't', 'd', 's', 'z', 'c', 'n', 'r', 'l', 'S', 'Z', 'C', 'j',
    'T', 'y', 'k', 'g', 'x', 'N', 'q', 'X', 'h', 'L', 'G', 'i', 'e', 'E', 'a', 'u', 'o',
];

/// `fresh` starts a new batch; `append` continues the batch already on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Fresh,
    Append,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub corpus_path: PathBuf,
    pub output_dir: PathBuf,
    pub mode: RunMode,
    pub num_trials: usize,
    pub workers: usize,
    pub partitions: usize,
    /// Trials held in memory before they are appended to disk.
    pub flush_every: usize,
    /// Run seed for fresh batches; drawn from the OS when absent.
    /// Append runs always reuse the seed recorded in the manifest.
    pub seed: Option<u64>,
    pub missing_token: String,
    pub escape_uppercase: bool,
    pub meanings: Vec<String>,
    pub symbols: Vec<char>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            corpus_path: PathBuf::from("listss17.txt"),
            output_dir: PathBuf::from("."),
            mode: RunMode::Fresh,
            num_trials: 1000,
            workers: 3,
            partitions: 3,
            flush_every: 100,
            seed: None,
            missing_token: "XXX".to_string(),
            escape_uppercase: true,
            meanings: DEFAULT_MEANINGS.iter().map(|m| m.to_string()).collect(),
            symbols: DEFAULT_SYMBOLS.to_vec(),
        }
    }
}

impl RunConfig {
    /// Embedded defaults, overridden field by field by the JSON file if one is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            None => Self::default(),
            Some(path) => {
                let file = File::open(path).map_err(|e| PermuteError::io(path, e))?;
                serde_json::from_reader(BufReader::new(file)).map_err(|source| {
                    PermuteError::Json { path: path.to_path_buf(), source }
                })?
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(PermuteError::invalid_config("workers must be at least 1"));
        }
        if self.partitions == 0 {
            return Err(PermuteError::invalid_config("partitions must be at least 1"));
        }
        if self.flush_every == 0 {
            return Err(PermuteError::invalid_config("flush_every must be at least 1"));
        }
        if self.missing_token.is_empty() {
            return Err(PermuteError::invalid_config("missing_token must not be empty"));
        }
        // duplicate and empty vocabularies are reported by Vocabulary::new
        self.vocabulary().map(|_| ())
    }

    pub fn vocabulary(&self) -> Result<Vocabulary> {
        Vocabulary::new(self.meanings.clone(), self.symbols.clone())
    }
}
