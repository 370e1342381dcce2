// File: src/core/mod.rs
pub mod counter;
pub mod engine;
pub mod permuter;
pub mod trials;
pub mod types;
pub mod word_table;
