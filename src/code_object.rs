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

//! A loaded code object: its locator, its materialized bytes and the lazily
//! built symbol and line indices.
//!
//! A `CodeObject` is not meant to be shared between threads; hosts that
//! handle faults concurrently serialize access to it.

use std::cell::OnceCell;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use object::elf;
use object::read::elf::{FileHeader, ProgramHeader};
use object::{Endianness, FileKind};

use crate::dwarf;
use crate::error::{IndexError, MaterializeError, SaveError};
use crate::line_table::DebugInfo;
use crate::memory::{ImageMemory, MemoryReader};
use crate::symbols::{self, SymbolInfo, SymbolTable};
use crate::uri;
use crate::utils::safe_file_name;

/// Source of the code objects a debugger runtime knows about.
pub trait LoadAddressProvider {
    type Id: Copy + std::fmt::Debug;

    fn load_address(&self, id: Self::Id) -> Option<u64>;
    fn uri(&self, id: Self::Id) -> Option<String>;
}

/// Exclusive owner of a code object's bytes, held in an anonymous temporary
/// file. The file is closed when the store is dropped.
#[derive(Debug)]
pub struct BackingStore {
    file: File,
}

impl BackingStore {
    /// Copy `bytes` into a fresh unnamed temporary file, rewound to the start.
    pub fn create(bytes: &[u8]) -> Result<Self, MaterializeError> {
        let mut file = tempfile::tempfile().map_err(MaterializeError::TempFile)?;
        file.write_all(bytes).map_err(MaterializeError::Write)?;
        file.seek(SeekFrom::Start(0))
            .map_err(MaterializeError::Write)?;
        Ok(Self { file })
    }

    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Map the whole store read-only.
    pub fn map(&self) -> io::Result<Mmap> {
        // SAFETY: the file is unnamed and owned by this store, nothing else
        // can truncate or rewrite it while the map is alive.
        unsafe { Mmap::map(&self.file) }
    }
}

impl Read for BackingStore {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for BackingStore {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

/// A successfully materialized image.
#[derive(Debug)]
pub struct Materialized {
    pub store: BackingStore,
    pub loaded_size: u64,
}

/// Persist `bytes` to a backing store and compute the loaded footprint from
/// the `PT_LOAD` program headers.
pub fn materialize(bytes: &[u8]) -> Result<Materialized, MaterializeError> {
    if bytes.is_empty() {
        return Err(MaterializeError::Empty);
    }
    let store = BackingStore::create(bytes)?;
    let map = store.map().map_err(MaterializeError::Map)?;
    let loaded_size = loaded_size(&map)?;
    drop(map);
    Ok(Materialized { store, loaded_size })
}

/// Highest `p_vaddr + p_memsz` over the loadable segments.
pub fn loaded_size(data: &[u8]) -> Result<u64, MaterializeError> {
    match FileKind::parse(data)? {
        FileKind::Elf32 => loaded_size_of::<elf::FileHeader32<Endianness>>(data),
        FileKind::Elf64 => loaded_size_of::<elf::FileHeader64<Endianness>>(data),
        _ => Err(MaterializeError::NotElf),
    }
}

fn loaded_size_of<Elf: FileHeader<Endian = Endianness>>(
    data: &[u8],
) -> Result<u64, MaterializeError> {
    let header = Elf::parse(data)?;
    let endian = header.endian()?;
    let segments = header.program_headers(endian, data)?;
    if segments.is_empty() {
        return Err(MaterializeError::NoProgramHeaders);
    }

    let mut size = 0u64;
    for phdr in segments {
        if phdr.p_type(endian) == elf::PT_LOAD {
            let vaddr: u64 = phdr.p_vaddr(endian).into();
            let memsz: u64 = phdr.p_memsz(endian).into();
            size = size.max(vaddr.wrapping_add(memsz));
        }
    }
    Ok(size)
}

pub struct CodeObject {
    load_address: u64,
    locator: String,
    loaded_size: u64,
    store: Option<BackingStore>,
    symbols: OnceCell<SymbolTable>,
    debug_info: OnceCell<DebugInfo>,
}

impl CodeObject {
    pub fn new(locator: impl Into<String>, load_address: u64) -> Self {
        Self {
            load_address,
            locator: locator.into(),
            loaded_size: 0,
            store: None,
            symbols: OnceCell::new(),
            debug_info: OnceCell::new(),
        }
    }

    /// Ask the runtime where `id` is loaded and where its bytes live. On
    /// failure the object is inert: it has no locator and cannot be opened.
    pub fn from_provider<P: LoadAddressProvider>(provider: &P, id: P::Id) -> Self {
        let Some(load_address) = provider.load_address(id) else {
            log::warn!("could not get the code object's load address");
            return Self::new(String::new(), 0);
        };
        let Some(locator) = provider.uri(id) else {
            log::warn!("could not get the code object's URI");
            return Self::new(String::new(), load_address);
        };
        Self::new(locator, load_address)
    }

    pub fn load_address(&self) -> u64 {
        self.load_address
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn loaded_size(&self) -> u64 {
        self.loaded_size
    }

    pub fn is_open(&self) -> bool {
        self.store.is_some()
    }

    pub fn backing_store(&self) -> Option<&BackingStore> {
        self.store.as_ref()
    }

    /// Fetch and materialize the bytes. Returns whether the object is usable.
    pub fn open(&mut self, memory: &dyn MemoryReader) -> bool {
        if self.is_open() {
            return true;
        }
        if self.locator.is_empty() {
            log::warn!("code object has no URI, cannot open it");
            return false;
        }
        let Some(bytes) = uri::resolve(&self.locator, memory) else {
            return false;
        };
        match materialize(&bytes) {
            Ok(Materialized { store, loaded_size }) => {
                log::debug!(
                    "opened `{}': {} bytes, loaded size {:#x}",
                    self.locator,
                    bytes.len(),
                    loaded_size
                );
                self.store = Some(store);
                self.loaded_size = loaded_size;
                true
            }
            Err(e) => {
                log::warn!("{} for `{}'", e, self.locator);
                false
            }
        }
    }

    fn map_store(&self) -> Result<Mmap, IndexError> {
        self.store
            .as_ref()
            .ok_or(IndexError::NotOpen)?
            .map()
            .map_err(IndexError::Map)
    }

    /// Build the symbol index on first use. `None` if the object is not open
    /// or its symbol tables cannot be parsed.
    pub fn load_symbols(&self) -> Option<&SymbolTable> {
        if let Some(table) = self.symbols.get() {
            return Some(table);
        }
        let table = self.map_store().and_then(|map| {
            symbols::load_function_symbols(&map, self.load_address).map_err(IndexError::from)
        });
        match table {
            Ok(table) => Some(self.symbols.get_or_init(|| table)),
            Err(e) => {
                log::warn!("could not load symbols of `{}': {}", self.locator, e);
                None
            }
        }
    }

    /// Build the line table and unit ranges on first use.
    pub fn load_debug_info(&self) -> Option<&DebugInfo> {
        if let Some(info) = self.debug_info.get() {
            return Some(info);
        }
        let info = self
            .map_store()
            .and_then(|map| dwarf::load_debug_info(&map, self.load_address));
        match info {
            Ok(info) => Some(self.debug_info.get_or_init(|| info)),
            Err(e) => {
                log::warn!("could not load debug info of `{}': {}", self.locator, e);
                None
            }
        }
    }

    pub fn symbols(&self) -> Option<&SymbolTable> {
        self.symbols.get()
    }

    pub fn debug_info(&self) -> Option<&DebugInfo> {
        self.debug_info.get()
    }

    /// Symbol containing `address`, with a demangled name.
    pub fn find_symbol(&self, address: u64) -> Option<SymbolInfo> {
        self.load_symbols()?.find(address)
    }

    /// `0x<addr>` followed by ` <name+offset>` when a symbol contains it.
    pub fn symbolize(&self, address: u64) -> String {
        match self.find_symbol(address) {
            Some(symbol) => format!(
                "{:#x} <{}+{}>",
                address,
                symbol.name,
                address - symbol.value
            ),
            None => format!("{:#x}", address),
        }
    }

    /// Address space made of this image's loadable segments at its load
    /// address.
    pub fn image_memory(&self) -> Option<ImageMemory> {
        let map = self.map_store().ok()?;
        match ImageMemory::from_elf(&map, self.load_address) {
            Ok(memory) => Some(memory),
            Err(e) => {
                log::warn!("could not map segments of `{}': {}", self.locator, e);
                None
            }
        }
    }

    /// Copy the materialized bytes to `directory`, under a name derived from
    /// the locator. Returns the written path.
    pub fn save(&self, directory: &Path) -> Result<PathBuf, SaveError> {
        let store = self.store.as_ref().ok_or(SaveError::NotOpen)?;
        let path = directory.join(safe_file_name(&self.locator));
        let io_error = |source: io::Error| SaveError::Io {
            path: path.clone(),
            source,
        };

        let expected = store.len().map_err(io_error)?;
        let mut source: &File = &store.file;
        source.seek(SeekFrom::Start(0)).map_err(io_error)?;
        let mut dest = File::create(&path).map_err(io_error)?;
        let written = io::copy(&mut source, &mut dest).map_err(io_error)?;
        dest.flush().map_err(io_error)?;
        if written != expected {
            return Err(SaveError::ShortCopy {
                path,
                written,
                expected,
            });
        }
        log::debug!("saved `{}' to {}", self.locator, path.display());
        Ok(path)
    }
}
