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

//! Code object locators.
//!
//! A locator has the shape `scheme://path[?|#key=value[&key=value...]]`.
//! Two schemes are understood:
//!
//! - `file://<path>`: bytes of a file, optionally a slice of it selected with
//!   `offset=` and `size=`.
//! - `memory://<pid>#offset=<addr>&size=<len>`: bytes of the live address
//!   space, read through a [`MemoryReader`]. Both parameters are required.
//!
//! Numbers are decimal or `0x`-prefixed hexadecimal. When a key is repeated
//! the last occurrence wins.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{MemoryError, ResolveError};
use crate::memory::MemoryReader;
use crate::utils::{parse_number, path_from_bytes, percent_decode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    /// Lower-cased scheme.
    pub scheme: String,
    /// Percent-decoded path component.
    pub path: Vec<u8>,
    pub params: HashMap<String, String>,
}

impl Locator {
    pub fn parse(uri: &str) -> Result<Self, ResolveError> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| ResolveError::MalformedUri(uri.to_string()))?;

        let (path, query) = match rest.find(|c| c == '#' || c == '?') {
            Some(pos) => (&rest[..pos], Some(&rest[pos + 1..])),
            None => (rest, None),
        };

        let mut params = HashMap::new();
        for token in query.into_iter().flat_map(|q| q.split('&')) {
            if let Some((key, value)) = token.split_once('=') {
                params.insert(key.to_string(), value.to_string());
            }
        }

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            path: percent_decode(path).into_owned(),
            params,
        })
    }

    pub fn file_path(&self) -> PathBuf {
        path_from_bytes(&self.path)
    }

    fn number(&self, key: &str) -> Result<Option<u64>, ResolveError> {
        match self.params.get(key) {
            None => Ok(None),
            Some(value) => parse_number(value)
                .map(Some)
                .ok_or_else(|| ResolveError::InvalidNumber {
                    key: key.to_string(),
                    value: value.clone(),
                }),
        }
    }

    pub fn offset(&self) -> Result<u64, ResolveError> {
        Ok(self.number("offset")?.unwrap_or(0))
    }

    pub fn size(&self) -> Result<Option<u64>, ResolveError> {
        self.number("size")
    }
}

/// Fetch the bytes named by `uri`.
///
/// `Ok(None)` means there is nothing to load (an explicit `size=0`).
pub fn try_resolve(
    uri: &str,
    memory: &dyn MemoryReader,
) -> Result<Option<Vec<u8>>, ResolveError> {
    let locator = Locator::parse(uri)?;
    let offset = locator.offset()?;
    let size = locator.size()?;
    if size == Some(0) {
        log::debug!("`{}' has an explicit zero size, nothing to load", uri);
        return Ok(None);
    }

    match locator.scheme.as_str() {
        "file" => read_file(&locator.file_path(), offset, size).map(Some),
        "memory" => {
            let size = match size {
                Some(size) if offset != 0 => size,
                _ => return Err(ResolveError::MissingRange(uri.to_string())),
            };
            let len = usize::try_from(size).map_err(|_| ResolveError::InvalidNumber {
                key: "size".to_string(),
                value: size.to_string(),
            })?;
            memory
                .read_memory(offset, len)
                .and_then(|bytes| {
                    if bytes.len() as u64 == size {
                        Ok(bytes)
                    } else {
                        Err(MemoryError::Unmapped {
                            address: offset + bytes.len() as u64,
                        })
                    }
                })
                .map(Some)
                .map_err(|source| ResolveError::Memory {
                    address: offset,
                    source,
                })
        }
        other => Err(ResolveError::UnsupportedScheme(other.to_string())),
    }
}

/// Like [`try_resolve`], but every failure becomes a warning and `None`.
pub fn resolve(uri: &str, memory: &dyn MemoryReader) -> Option<Vec<u8>> {
    match try_resolve(uri, memory) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("{}", e);
            None
        }
    }
}

fn read_file(path: &Path, offset: u64, size: Option<u64>) -> Result<Vec<u8>, ResolveError> {
    let open_error = |source: io::Error| ResolveError::Open {
        path: path.to_path_buf(),
        source,
    };
    let read_error = |source: io::Error| ResolveError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(open_error)?;
    let size = match size {
        Some(size) => size,
        None => {
            let len = file.metadata().map_err(read_error)?.len();
            if len < offset {
                return Err(ResolveError::OffsetBeyondEnd(path.to_path_buf()));
            }
            len - offset
        }
    };

    file.seek(SeekFrom::Start(offset)).map_err(read_error)?;
    // Grows with what is actually read, not with what the locator claims.
    let mut buffer = Vec::new();
    file.by_ref()
        .take(size)
        .read_to_end(&mut buffer)
        .map_err(read_error)?;
    if buffer.len() as u64 != size {
        return Err(read_error(io::ErrorKind::UnexpectedEof.into()));
    }
    Ok(buffer)
}
