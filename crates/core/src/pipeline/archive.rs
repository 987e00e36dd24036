use std::collections::HashSet;
use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::shared::error::PipelineError;

/// In-memory ZIP archive with one stored entry per file, in insertion order.
///
/// Entries are flat: any directory part of a name is dropped. Names are made
/// unique by inserting `_1`, `_2`, ... before the extension of a repeated
/// name.
pub struct ArchiveBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    names: HashSet<String>,
    entries: usize,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            names: HashSet::new(),
            entries: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Adds an entry and returns the name it was stored under.
    pub fn add(&mut self, name: &str, bytes: &[u8]) -> Result<String, PipelineError> {
        let name = unique_name(entry_name(name), &self.names);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        self.writer
            .start_file(name.as_str(), options)
            .map_err(|e| PipelineError::Archive(e.to_string()))?;
        self.writer.write_all(bytes)?;
        self.names.insert(name.clone());
        self.entries += 1;
        Ok(name)
    }

    pub fn finish(self) -> Result<Vec<u8>, PipelineError> {
        let cursor = self
            .writer
            .finish()
            .map_err(|e| PipelineError::Archive(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Last path component of a client-supplied name, under either separator.
fn entry_name(name: &str) -> &str {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    match base {
        "" | "." | ".." => "upload",
        base => base,
    }
}

fn unique_name(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };
    (1..)
        .map(|n| format!("{stem}_{n}{ext}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}
