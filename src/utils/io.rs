//! # File I/O Helpers
//!
//! Thin wrappers for reading and writing the JSON, JSONL, Markdown and text
//! files produced and consumed by step scripts. All files are UTF-8.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Loads data from a JSON file.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open JSON file: {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse JSON file: {}", path.display()))
}

/// Saves data to a JSON file, pretty-printed with a 2-space indent.
///
/// Non-ASCII characters are written as-is. An existing file is overwritten.
pub fn save_json<T: Serialize + ?Sized>(item: &T, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create JSON file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, item)
        .with_context(|| format!("Failed to serialize JSON to: {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush JSON file: {}", path.display()))
}

/// Loads every record of a JSON Lines file.
pub fn load_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    iter_jsonl(path)?.collect()
}

/// Lazily iterates over the records of a JSON Lines file.
///
/// The file is opened eagerly, so a missing file is reported here; each item
/// carries its own parse error, tagged with its 1-based line number.
/// Whitespace-only lines are skipped.
pub fn iter_jsonl<T: DeserializeOwned>(path: &Path) -> Result<impl Iterator<Item = Result<T>>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open JSONL file: {}", path.display()))?;
    let display_path = path.display().to_string();

    Ok(BufReader::new(file)
        .lines()
        .enumerate()
        .filter_map(move |(index, line)| {
            let line_no = index + 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err(anyhow::Error::new(e).context(format!(
                        "Failed to read line {} of {}",
                        line_no, display_path
                    ))))
                }
            };
            if line.trim().is_empty() {
                return None;
            }
            Some(serde_json::from_str(&line).with_context(|| {
                format!("Failed to parse line {} of {}", line_no, display_path)
            }))
        }))
}

fn write_jsonl<I>(items: I, file: File, path: &Path) -> Result<()>
where
    I: IntoIterator,
    I::Item: Serialize,
{
    let mut writer = BufWriter::new(file);
    for item in items {
        serde_json::to_writer(&mut writer, &item)
            .with_context(|| format!("Failed to serialize JSONL record to: {}", path.display()))?;
        writer
            .write_all(b"\n")
            .with_context(|| format!("Failed to write JSONL file: {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush JSONL file: {}", path.display()))
}

/// Appends items to a JSON Lines file, creating it if needed.
pub fn add_to_jsonl<I>(items: I, path: &Path) -> Result<()>
where
    I: IntoIterator,
    I::Item: Serialize,
{
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open JSONL file for appending: {}", path.display()))?;
    write_jsonl(items, file, path)
}

/// Saves items to a JSON Lines file, overwriting any existing content.
pub fn save_jsonl<I>(items: I, path: &Path) -> Result<()>
where
    I: IntoIterator,
    I::Item: Serialize,
{
    let file = File::create(path)
        .with_context(|| format!("Failed to create JSONL file: {}", path.display()))?;
    write_jsonl(items, file, path)
}

/// Loads a Markdown file as a string.
pub fn load_md(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("Failed to read Markdown file: {}", path.display()))
}

/// Loads a text file as a string.
pub fn load_text(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("Failed to read text file: {}", path.display()))
}

/// Loads a text file as a list of lines, without line terminators.
pub fn load_text_lines(path: &Path) -> Result<Vec<String>> {
    Ok(load_text(path)?.lines().map(str::to_string).collect())
}

/// Creates the output directory for the current step (and its parents) and
/// returns its path. An existing directory is fine.
pub fn set_output_dir(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    Ok(path.to_path_buf())
}
