// src/core/types.rs
use crate::error::{PermuteError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Column index of a meaning in the fixed meaning list.
pub type MeaningId = usize;
/// Index of a symbol in the fixed alphabet.
pub type SymbolId = usize;
/// Dense index of a sound pair: `first * alphabet_len + second`.
pub type PairId = usize;

/// An ordered pair of alphabet symbols, the unit being counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SoundPair {
    pub first: char,
    pub second: char,
}

impl SoundPair {
    pub fn new(first: char, second: char) -> Self {
        Self { first, second }
    }
}

impl fmt::Display for SoundPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.first, self.second)
    }
}

/// The closed meaning list and symbol alphabet, with the lookup tables
/// built once at startup. Shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    meanings: Vec<String>,
    symbols: Vec<char>,
    meaning_index: HashMap<String, MeaningId>,
    symbol_index: HashMap<char, SymbolId>,
}

impl Vocabulary {
    pub fn new(meanings: Vec<String>, symbols: Vec<char>) -> Result<Self> {
        if meanings.is_empty() {
            return Err(PermuteError::invalid_config("meaning list is empty"));
        }
        if symbols.is_empty() {
            return Err(PermuteError::invalid_config("symbol alphabet is empty"));
        }

        let mut meaning_index = HashMap::with_capacity(meanings.len());
        for (id, meaning) in meanings.iter().enumerate() {
            if meaning_index.insert(meaning.clone(), id).is_some() {
                return Err(PermuteError::invalid_config(format!(
                    "duplicate meaning '{}'",
                    meaning
                )));
            }
        }

        let mut symbol_index = HashMap::with_capacity(symbols.len());
        for (id, &symbol) in symbols.iter().enumerate() {
            if symbol_index.insert(symbol, id).is_some() {
                return Err(PermuteError::invalid_config(format!(
                    "duplicate symbol '{}'",
                    symbol
                )));
            }
        }

        Ok(Self { meanings, symbols, meaning_index, symbol_index })
    }

    pub fn meanings(&self) -> &[String] {
        &self.meanings
    }

    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    pub fn num_meanings(&self) -> usize {
        self.meanings.len()
    }

    pub fn num_pairs(&self) -> usize {
        self.symbols.len() * self.symbols.len()
    }

    pub fn meaning_id(&self, meaning: &str) -> Option<MeaningId> {
        self.meaning_index.get(meaning).copied()
    }

    pub fn symbol_id(&self, symbol: char) -> Option<SymbolId> {
        self.symbol_index.get(&symbol).copied()
    }

    #[inline]
    pub fn pair_id(&self, first: SymbolId, second: SymbolId) -> PairId {
        first * self.symbols.len() + second
    }

    pub fn pair_id_of(&self, pair: SoundPair) -> Option<PairId> {
        Some(self.pair_id(self.symbol_id(pair.first)?, self.symbol_id(pair.second)?))
    }

    pub fn pair(&self, id: PairId) -> SoundPair {
        let n = self.symbols.len();
        SoundPair::new(self.symbols[id / n], self.symbols[id % n])
    }

    /// All pairs in storage order: first symbol outer, second inner.
    pub fn pairs(&self) -> impl Iterator<Item = SoundPair> + '_ {
        (0..self.num_pairs()).map(move |id| self.pair(id))
    }
}
