// src/lib.rs

pub mod config;
pub mod core;
pub mod corpus;
pub mod error;
pub mod persistence;
pub use crate::core::engine::PermuteEngine;
pub use crate::error::{PermuteError, Result};
