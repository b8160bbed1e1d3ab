// Copyright (c) 2026 Codeobj-Helper Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::num::NonZeroU64;

/// Interned source file paths, as recorded in the debug info.
#[derive(Default)]
pub struct FileTable {
    files_by_id: BTreeMap<u32, String>,
    id_by_file: HashMap<String, u32>,
    next_id: u32,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, path: &str) -> u32 {
        if let Some(&id) = self.id_by_file.get(path) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.files_by_id.insert(id, path.to_string());
        self.id_by_file.insert(path.to_string(), id);
        id
    }

    pub fn get_by_id(&self, id: u32) -> Option<&str> {
        self.files_by_id.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files_by_id.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    pub file_id: u32,
    pub line: NonZeroU64,
}

/// Address-ordered source line table. One row per address.
#[derive(Default)]
pub struct LineTable {
    pub files: FileTable,
    entries: BTreeMap<u64, LineEntry>,
}

impl LineTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `address` to `file:line`, replacing any row already there.
    pub fn insert(&mut self, address: u64, file: &str, line: NonZeroU64) {
        let file_id = self.files.intern(file);
        self.entries.insert(address, LineEntry { file_id, line });
    }

    pub fn get(&self, address: u64) -> Option<&LineEntry> {
        self.entries.get(&address)
    }

    pub fn file_name(&self, entry: &LineEntry) -> &str {
        self.files.get_by_id(entry.file_id).unwrap_or("")
    }

    /// Walk backward from the floor row of `address`, stopping at the first
    /// row at least `context` bytes away or at the start of the table.
    pub fn context_start(&self, address: u64, context: u64) -> Option<u64> {
        let mut start = None;
        for (&row_address, _) in self.entries.range(..=address).rev() {
            start = Some(row_address);
            if address - row_address >= context {
                break;
            }
        }
        start
    }

    /// Every `(file_id, line)` pair that has an address of its own.
    pub fn mapped_lines(&self) -> HashSet<(u32, u64)> {
        self.entries
            .values()
            .map(|entry| (entry.file_id, entry.line.get()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &LineEntry)> {
        self.entries.iter().map(|(&address, entry)| (address, entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `[low_pc, high_pc)` of every compilation unit that declares both bounds.
#[derive(Default)]
pub struct UnitRanges {
    ranges: BTreeMap<u64, u64>,
}

impl UnitRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first unit recorded at a given `low_pc` is kept.
    pub fn insert(&mut self, low_pc: u64, high_pc: u64) {
        self.ranges.entry(low_pc).or_insert(high_pc);
    }

    /// Unit with the greatest `low_pc <= address`, whether or not it
    /// actually contains `address`.
    pub fn floor(&self, address: u64) -> Option<(u64, u64)> {
        self.ranges
            .range(..=address)
            .next_back()
            .map(|(&low, &high)| (low, high))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.ranges.iter().map(|(&low, &high)| (low, high))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Line table plus unit ranges of one code object.
#[derive(Default)]
pub struct DebugInfo {
    pub lines: LineTable,
    pub units: UnitRanges,
}
