//! # Utilities Module
//!
//! Provides the helpers shared by step scripts: file I/O for JSON, JSONL and
//! text files, the named logger factory, and response text cleanup.

pub mod io;
pub mod logger;
pub mod text;
