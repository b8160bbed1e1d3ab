use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Source files read from disk for annotating disassembly, split into lines.
///
/// Owned by whoever drives the disassembly so several code objects can share
/// it, or not. Files that cannot be read are not cached and will be retried.
#[derive(Default)]
pub struct SourceCache {
    files: HashMap<PathBuf, Vec<String>>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&mut self, path: &Path) -> Option<&[String]> {
        if !self.files.contains_key(path) {
            let bytes = fs::read(path).ok()?;
            let lines = String::from_utf8_lossy(&bytes)
                .lines()
                .map(str::to_string)
                .collect();
            self.files.insert(path.to_path_buf(), lines);
        }
        self.files.get(path).map(Vec::as_slice)
    }

    /// Line `line` (1-based) of `path`, if the file and the line exist.
    pub fn line(&mut self, path: &Path, line: u64) -> Option<&str> {
        let index = usize::try_from(line.checked_sub(1)?).ok()?;
        self.lines(path)?.get(index).map(String::as_str)
    }
}
