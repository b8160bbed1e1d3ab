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

//! Annotated disassembly around an instruction address.
//!
//! The listing covers a small context window before and after the address,
//! interleaved with the source lines the debug info maps to each instruction.
//! Without line information the window starts at the address itself, since
//! instructions are variable length and scanning backward could land in the
//! middle of one.

use std::collections::HashSet;
use std::io::Write;
use std::ops::Range;
use std::path::Path;

use crate::code_object::CodeObject;
use crate::error::{DecodeError, DisasmError};
use crate::line_table::{DebugInfo, LineEntry, LineTable};
use crate::memory::MemoryReader;
use crate::source_cache::SourceCache;
use crate::symbols::SymbolInfo;

/// Bytes of context shown on either side of the queried address.
pub const CONTEXT_BYTE_SIZE: u64 = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub text: String,
    /// Bytes consumed by the instruction.
    pub size: usize,
}

/// Decodes one instruction. `symbolizer` renders any address the decoder
/// wants to print, e.g. a branch target.
pub trait InstructionDecoder {
    fn decode(
        &self,
        address: u64,
        bytes: &[u8],
        symbolizer: &dyn Fn(u64) -> String,
    ) -> Result<DecodedInstruction, DecodeError>;
}

pub trait ArchitectureInfo {
    fn largest_instruction_size(&self) -> Option<usize>;
}

/// The collaborators a disassembly needs from its host.
pub struct Target<'a> {
    pub memory: &'a dyn MemoryReader,
    pub decoder: &'a dyn InstructionDecoder,
    pub arch: &'a dyn ArchitectureInfo,
}

/// Address range listed for `address`, clamped to its compilation unit.
pub fn context_window(info: &DebugInfo, address: u64) -> Range<u64> {
    let mut start = info
        .lines
        .context_start(address, CONTEXT_BYTE_SIZE)
        .unwrap_or(address);
    let mut end = address.saturating_add(CONTEXT_BYTE_SIZE);

    if let Some((low_pc, high_pc)) = info.units.floor(address) {
        if address < high_pc {
            start = start.max(low_pc);
            end = end.min(high_pc);
        }
    }
    start..end
}

/// Tracks the last printed source position so only changes are printed.
struct SourcePrinter<'a> {
    lines: &'a LineTable,
    mapped: HashSet<(u32, u64)>,
    prev_file: Option<u32>,
    prev_line: u64,
}

impl<'a> SourcePrinter<'a> {
    fn new(lines: &'a LineTable) -> Self {
        Self {
            lines,
            mapped: lines.mapped_lines(),
            prev_file: None,
            prev_line: 0,
        }
    }

    fn print<W: Write>(
        &mut self,
        out: &mut W,
        entry: &LineEntry,
        sources: &mut SourceCache,
    ) -> std::io::Result<()> {
        let file_name = self.lines.file_name(entry);
        let line = entry.line.get();
        let same_file = self.prev_file == Some(entry.file_id);

        if same_file && line == self.prev_line {
            return Ok(());
        }
        writeln!(out)?;
        if !same_file {
            writeln!(out, "{}:", file_name)?;
        }

        // A new file at the same line number only gets its header.
        if line != self.prev_line {
            self.print_lines(out, entry, same_file, sources)?;
        }

        self.prev_file = Some(entry.file_id);
        self.prev_line = line;
        Ok(())
    }

    fn print_lines<W: Write>(
        &self,
        out: &mut W,
        entry: &LineEntry,
        same_file: bool,
        sources: &mut SourceCache,
    ) -> std::io::Result<()> {
        let file_name = self.lines.file_name(entry);
        let line = entry.line.get();

        // Backfill the lines between the previous one and this one that have
        // no instructions of their own.
        let mut first = line;
        if same_file && line > self.prev_line {
            first -= 1;
            while first > self.prev_line && !self.mapped.contains(&(entry.file_id, first)) {
                first -= 1;
            }
            first += 1;
        }

        for n in first..=line {
            write!(out, "{:<8}", n)?;
            match sources.lines(Path::new(file_name)) {
                None => write!(out, "{}: No such file or directory.", file_name)?,
                Some(text) => {
                    if let Some(text) = usize::try_from(n - 1).ok().and_then(|i| text.get(i)) {
                        write!(out, "{}", text)?;
                    }
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

fn offset_label(address: u64, symbol: &SymbolInfo) -> String {
    if address >= symbol.value {
        format!("<+{}>", address - symbol.value)
    } else {
        format!("<-{}>", symbol.value - address)
    }
}

impl CodeObject {
    /// Write the annotated listing around `address` to `out`.
    ///
    /// Only a missing instruction size and a failing sink are errors. Missing
    /// symbols or debug info shorten the report; an unreadable or undecodable
    /// instruction ends the listing early.
    pub fn disassemble<W: Write>(
        &self,
        out: &mut W,
        address: u64,
        target: &Target<'_>,
        sources: &mut SourceCache,
    ) -> Result<(), DisasmError> {
        let largest_instruction_size = target
            .arch
            .largest_instruction_size()
            .filter(|&size| size > 0)
            .ok_or(DisasmError::MissingInstructionSize)?;

        let no_debug_info = DebugInfo::default();
        let info = self.load_debug_info().unwrap_or(&no_debug_info);
        let window = context_window(info, address);
        let symbol = self.find_symbol(address);
        log::debug!(
            "disassembling {:#x} in [{:#x}, {:#x})",
            address,
            window.start,
            window.end
        );

        writeln!(out)?;
        write!(out, "Disassembly")?;
        if let Some(symbol) = &symbol {
            write!(out, " for function {}", symbol.name)?;
        }
        writeln!(out, ":")?;
        writeln!(out, "    code object: {}", self.locator())?;
        writeln!(
            out,
            "    loaded at: [{:#x}-{:#x}]",
            self.load_address(),
            self.load_address().wrapping_add(self.loaded_size())
        )?;

        let symbolizer = |target_address: u64| self.symbolize(target_address);
        let mut source = SourcePrinter::new(&info.lines);
        let mut addr = window.start;
        while addr < window.end {
            if let Some(entry) = info.lines.get(addr) {
                source.print(&mut *out, entry, sources)?;
            }

            let bytes = match target.memory.read_memory(addr, largest_instruction_size) {
                Ok(bytes) if !bytes.is_empty() => bytes,
                Ok(_) | Err(_) => {
                    writeln!(out, "Cannot access memory at address {:#x}", addr)?;
                    break;
                }
            };

            let instruction = match target.decoder.decode(addr, &bytes, &symbolizer) {
                Ok(instruction) if instruction.size > 0 => instruction,
                Ok(_) => {
                    writeln!(out, "Cannot decode instruction at address {:#x}", addr)?;
                    break;
                }
                Err(e) => {
                    log::warn!("{}", e);
                    writeln!(out, "Cannot decode instruction at address {:#x}", addr)?;
                    break;
                }
            };

            write!(out, "{}", if addr == address { " => " } else { "    " })?;
            write!(out, "{:#x}", addr)?;
            if let Some(symbol) = &symbol {
                write!(out, " {}", offset_label(addr, symbol))?;
            }
            writeln!(out, ":    {}", instruction.text)?;

            addr = addr.saturating_add(instruction.size as u64);
        }

        writeln!(out)?;
        writeln!(out, "End of disassembly.")?;
        Ok(())
    }
}
