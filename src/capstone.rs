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

use std::sync::LazyLock;

use capstone::prelude::*;
use regex::Regex;

use crate::disasm::{ArchitectureInfo, DecodedInstruction, InstructionDecoder};
use crate::error::DecodeError;

/// A lone address operand, i.e. the target of a direct branch or call.
static TARGET_OPERAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#?)(0x[0-9a-fA-F]+)$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Arch {
    #[value(name = "x86-64")]
    X86_64,
    X86,
    Arm,
    Thumb,
}

impl Arch {
    pub fn largest_instruction_size(self) -> usize {
        match self {
            Arch::X86_64 | Arch::X86 => 15,
            Arch::Arm | Arch::Thumb => 4,
        }
    }

    /// Architecture of an ELF image, from its header.
    pub fn from_object(data: &[u8]) -> Option<Self> {
        use object::Object;

        let file = object::File::parse(data).ok()?;
        match file.architecture() {
            object::Architecture::X86_64 => Some(Arch::X86_64),
            object::Architecture::I386 => Some(Arch::X86),
            object::Architecture::Arm => {
                // Entry points with the low bit set are Thumb code.
                if file.entry() & 1 == 1 {
                    Some(Arch::Thumb)
                } else {
                    Some(Arch::Arm)
                }
            }
            _ => None,
        }
    }
}

pub struct Disassembler {
    cs: Capstone,
    arch: Arch,
}

impl Disassembler {
    pub fn new(target: Arch) -> Result<Self, capstone::Error> {
        let cs = match target {
            Arch::X86_64 => Capstone::new()
                .x86()
                .mode(arch::x86::ArchMode::Mode64)
                .build()?,
            Arch::X86 => Capstone::new()
                .x86()
                .mode(arch::x86::ArchMode::Mode32)
                .build()?,
            Arch::Arm => Capstone::new()
                .arm()
                .mode(arch::arm::ArchMode::Arm)
                .build()?,
            Arch::Thumb => Capstone::new()
                .arm()
                .mode(arch::arm::ArchMode::Thumb)
                .extra_mode([arch::arm::ArchExtraMode::V8].iter().copied())
                .build()?,
        };
        Ok(Self { cs, arch: target })
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }
}

/// Replace a lone address operand with its symbolized form.
fn symbolize_operands(op_str: &str, symbolizer: &dyn Fn(u64) -> String) -> String {
    let Some(caps) = TARGET_OPERAND.captures(op_str.trim()) else {
        return op_str.to_string();
    };
    let digits = &caps[2][2..];
    match u64::from_str_radix(digits, 16) {
        Ok(address) => format!("{}{}", &caps[1], symbolizer(address)),
        Err(_) => op_str.to_string(),
    }
}

impl InstructionDecoder for Disassembler {
    fn decode(
        &self,
        address: u64,
        bytes: &[u8],
        symbolizer: &dyn Fn(u64) -> String,
    ) -> Result<DecodedInstruction, DecodeError> {
        let insns = self
            .cs
            .disasm_count(bytes, address, 1)
            .map_err(|e| DecodeError::Backend(e.to_string()))?;
        let insn = insns
            .iter()
            .next()
            .ok_or(DecodeError::Invalid { address })?;

        let mnemonic = insn.mnemonic().unwrap_or("");
        let op_str = insn.op_str().unwrap_or("");
        let text = if op_str.is_empty() {
            mnemonic.to_string()
        } else {
            format!("{} {}", mnemonic, symbolize_operands(op_str, symbolizer))
        };
        Ok(DecodedInstruction {
            text,
            size: insn.bytes().len(),
        })
    }
}

impl ArchitectureInfo for Disassembler {
    fn largest_instruction_size(&self) -> Option<usize> {
        Some(self.arch.largest_instruction_size())
    }
}
