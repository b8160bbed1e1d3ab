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

use std::ops::Range;

use object::{Object, ObjectSegment};

use crate::error::MemoryError;

/// Read primitive for the address space a code object is loaded into.
///
/// Used both by the `memory://` transport and for instruction fetch. A reader
/// may return fewer bytes than requested when the range crosses the end of a
/// mapping, but never an empty buffer on success.
pub trait MemoryReader {
    fn read_memory(&self, address: u64, len: usize) -> Result<Vec<u8>, MemoryError>;
}

/// Reader for hosts that have no address space to offer.
pub struct NoMemory;

impl MemoryReader for NoMemory {
    fn read_memory(&self, address: u64, _len: usize) -> Result<Vec<u8>, MemoryError> {
        Err(MemoryError::Unmapped { address })
    }
}

/// One loadable segment placed in the emulated address space.
pub struct MemoryRegion {
    pub name: String,
    pub start: u64,
    pub size: u64,
    pub align: u64,
    // File-backed bytes; anything past them up to `size` reads as zero.
    data: Vec<u8>,
}

impl MemoryRegion {
    pub fn new(name: String, start: u64, size: u64, align: u64, data: Vec<u8>) -> Self {
        Self {
            name,
            start,
            size,
            align,
            data,
        }
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end()
    }

    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.size)
    }

    pub fn clip_region(&self, low_addr: u64, high_addr: u64) -> Option<Range<u64>> {
        let new_start = self.start.max(low_addr);
        let new_end = self.end().min(high_addr);
        if new_start < new_end {
            Some(new_start..new_end)
        } else {
            None
        }
    }

    /// Bytes of `[address, address + len)` that fall inside this region.
    pub fn read(&self, address: u64, len: usize) -> Option<Vec<u8>> {
        let range = self.clip_region(address, address.saturating_add(len as u64))?;
        if range.start != address {
            return None;
        }
        let mut out = vec![0u8; (range.end - range.start) as usize];
        let from = (range.start - self.start) as usize;
        if from < self.data.len() {
            let n = out.len().min(self.data.len() - from);
            out[..n].copy_from_slice(&self.data[from..from + n]);
        }
        Some(out)
    }
}

/// Address space emulated from the loadable segments of an ELF image.
///
/// This is what the command-line tool uses in place of a live process: the
/// image is placed at `load_address` and every `PT_LOAD` segment becomes a
/// region.
#[derive(Default)]
pub struct ImageMemory {
    regions: Vec<MemoryRegion>,
}

impl ImageMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_elf(data: &[u8], load_address: u64) -> object::Result<Self> {
        let file = object::File::parse(data)?;
        let mut memory = Self::new();
        for (index, segment) in file.segments().enumerate() {
            let bytes = segment.data()?;
            memory.add_region(MemoryRegion::new(
                format!("LOAD#{}", index),
                load_address.wrapping_add(segment.address()),
                segment.size(),
                segment.align(),
                bytes.to_vec(),
            ));
        }
        log::debug!(
            "image memory: {} regions at {:#x}",
            memory.regions.len(),
            load_address
        );
        Ok(memory)
    }

    pub fn add_region(&mut self, region: MemoryRegion) {
        self.regions.push(region);
    }

    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }
}

impl MemoryReader for ImageMemory {
    fn read_memory(&self, address: u64, len: usize) -> Result<Vec<u8>, MemoryError> {
        self.regions
            .iter()
            .find(|region| region.contains(address))
            .and_then(|region| region.read(address, len))
            .filter(|bytes| !bytes.is_empty())
            .ok_or(MemoryError::Unmapped { address })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> MemoryRegion {
        MemoryRegion::new("LOAD#0".into(), 0x1000, 0x20, 0x10, vec![0xaa; 0x10])
    }

    #[test]
    fn clip_region_intersects() {
        let r = region();
        assert_eq!(r.clip_region(0x0, 0x1008), Some(0x1000..0x1008));
        assert_eq!(r.clip_region(0x1018, 0x2000), Some(0x1018..0x1020));
        assert_eq!(r.clip_region(0x1020, 0x2000), None);
    }

    #[test]
    fn reads_zero_fill_past_file_bytes() {
        let r = region();
        let bytes = r.read(0x100c, 8).unwrap();
        assert_eq!(bytes, vec![0xaa, 0xaa, 0xaa, 0xaa, 0, 0, 0, 0]);
    }

    #[test]
    fn image_memory_truncates_at_region_end() {
        let mut memory = ImageMemory::new();
        memory.add_region(region());
        assert_eq!(memory.read_memory(0x101e, 8).unwrap().len(), 2);
        assert!(matches!(
            memory.read_memory(0x1020, 8),
            Err(MemoryError::Unmapped { address: 0x1020 })
        ));
        assert!(NoMemory.read_memory(0x1000, 1).is_err());
    }
}
