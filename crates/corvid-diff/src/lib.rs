//! Diff parsing, file filtering, and chunking.
//!
//! Turns a unified diff into ordered [`corvid_core::FileChange`]s, decides
//! which files are eligible for review, and splits each eligible file's
//! changed regions into bounded, line-addressable analysis chunks.

pub mod chunker;
pub mod filter;
pub mod parser;
