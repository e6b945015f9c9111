//! Sanad - semantic document search and question answering
//!
//! Stores text documents in SQLite, keeps an exact vector index of their
//! embeddings, and answers questions from the most relevant documents with
//! an optional generative backend. Every optional dependency degrades to a
//! deterministic fallback: lexical search when no embedding model loads,
//! an extractive answer when no generator is reachable.

pub mod api;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod qa;
pub mod search;
pub mod storage;

pub use error::{Result, SanadError};
