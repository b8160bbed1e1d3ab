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

//! Error types for every public operation of the crate.
//!
//! Transport and format errors are never propagated past the public
//! `CodeObject` operations; they are logged as warnings and the object is
//! left unusable. The typed errors exist so lower-level entry points
//! (`uri::try_resolve`, `code_object::materialize`) can report the reason.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure reading from a live (or emulated) address space.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("cannot access memory at address {address:#x}")]
    Unmapped { address: u64 },
    #[error("memory read at {address:#x} failed: {reason}")]
    Backend { address: u64, reason: String },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid uri `{0}' (missing `://')")]
    MalformedUri(String),
    #[error("\"{0}\" protocol not supported")]
    UnsupportedScheme(String),
    #[error("invalid number `{value}' for `{key}'")]
    InvalidNumber { key: String, value: String },
    #[error("invalid uri `{0}' (offset and size must be != 0)")]
    MissingRange(String),
    #[error("could not open `{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid uri `{0}' (file size < offset)")]
    OffsetBeyondEnd(PathBuf),
    #[error("short read from `{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not read memory at {address:#x}")]
    Memory {
        address: u64,
        #[source]
        source: MemoryError,
    },
}

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("code object is empty")]
    Empty,
    #[error("could not create a temporary file for code object: {0}")]
    TempFile(#[source] io::Error),
    #[error("could not write to the temporary file: {0}")]
    Write(#[source] io::Error),
    #[error("could not map the temporary file: {0}")]
    Map(#[source] io::Error),
    #[error("malformed image: {0}")]
    Format(#[from] object::Error),
    #[error("not an ELF image")]
    NotElf,
    #[error("image has no program header table")]
    NoProgramHeaders,
}

/// Failure while building the symbol or debug-line index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("code object is not opened")]
    NotOpen,
    #[error("could not map the backing store: {0}")]
    Map(#[source] io::Error),
    #[error(transparent)]
    Object(#[from] object::Error),
    #[error(transparent)]
    Dwarf(#[from] gimli::Error),
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("code object is not opened")]
    NotOpen,
    #[error("could not write `{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("short copy to `{path}': wrote {written} of {expected} bytes")]
    ShortCopy {
        path: PathBuf,
        written: u64,
        expected: u64,
    },
}

/// Error reported by an instruction decoder backend.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no valid instruction at {address:#x}")]
    Invalid { address: u64 },
    #[error("disassembler failure: {0}")]
    Backend(String),
}

/// Fatal disassembly errors. Anything else degrades the report instead.
#[derive(Debug, Error)]
pub enum DisasmError {
    #[error("could not get the instruction size from the architecture")]
    MissingInstructionSize,
    #[error(transparent)]
    Io(#[from] io::Error),
}
