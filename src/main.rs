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

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use flexi_logger::{Logger, LoggerHandle};
use serde::Serialize;

use codeobj_helper::capstone::{Arch, Disassembler};
use codeobj_helper::utils::parse_address;
use codeobj_helper::{CodeObject, NoMemory, SourceCache, Target};

#[derive(Parser, Debug)]
#[command(name = "codeobj-helper", version, about = "Inspect and disassemble code objects")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Address the code object is loaded at
    #[arg(short = 'l', long = "load-address", global = true, default_value = "0", value_parser = parse_address)]
    load_address: u64,

    /// Enable debug output
    #[arg(short = 'd', long = "debug", global = true, default_value_t = false)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the load range and index sizes of a code object
    Info {
        uri: String,
        #[arg(long)]
        json: bool,
    },
    /// List the function symbols of a code object
    Symbols {
        uri: String,
        #[arg(long)]
        json: bool,
    },
    /// Dump the address to source line table
    Lines { uri: String },
    /// Disassemble around an address, annotated with source lines
    Disasm {
        uri: String,
        #[arg(value_parser = parse_address)]
        address: u64,
        /// Instruction set, detected from the ELF header when omitted
        #[arg(short = 'a', long = "arch", value_enum)]
        arch: Option<Arch>,
    },
    /// Copy the code object bytes into a directory
    Save { uri: String, directory: PathBuf },
}

#[derive(Serialize)]
struct InfoReport<'a> {
    uri: &'a str,
    load_address: String,
    loaded_size: String,
    symbols: usize,
    line_rows: usize,
    units: usize,
}

#[derive(Serialize)]
struct SymbolReport<'a> {
    name: &'a str,
    demangled: String,
    address: String,
    size: u64,
}

fn init_logging(debug: bool) -> Result<LoggerHandle> {
    let level = if debug { "debug" } else { "info" };
    let handle = Logger::try_with_env_or_str(level)?
        .log_to_stderr()
        .start()?;
    Ok(handle)
}

fn open(uri: &str, load_address: u64) -> Result<CodeObject> {
    let mut code_object = CodeObject::new(uri, load_address);
    // No live process here; only file:// locators can be fetched.
    if !code_object.open(&NoMemory) {
        bail!("could not open code object `{}'", uri);
    }
    Ok(code_object)
}

fn info(code_object: &CodeObject, json: bool) -> Result<()> {
    let symbols = code_object.load_symbols().map_or(0, |s| s.len());
    let (line_rows, units) = code_object
        .load_debug_info()
        .map_or((0, 0), |d| (d.lines.len(), d.units.len()));
    let report = InfoReport {
        uri: code_object.locator(),
        load_address: format!("{:#x}", code_object.load_address()),
        loaded_size: format!("{:#x}", code_object.loaded_size()),
        symbols,
        line_rows,
        units,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("code object: {}", report.uri);
        println!(
            "loaded at:   [{:#x}-{:#x}]",
            code_object.load_address(),
            code_object
                .load_address()
                .wrapping_add(code_object.loaded_size())
        );
        println!("symbols:     {}", report.symbols);
        println!("line rows:   {}", report.line_rows);
        println!("units:       {}", report.units);
    }
    Ok(())
}

fn symbols(code_object: &CodeObject, json: bool) -> Result<()> {
    let table = code_object
        .load_symbols()
        .context("no symbol table available")?;

    if json {
        let report: Vec<SymbolReport> = table
            .iter()
            .map(|s| SymbolReport {
                name: &s.name,
                demangled: codeobj_helper::symbols::demangle(&s.name),
                address: format!("{:#x}", s.address),
                size: s.size,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for s in table.iter() {
        writeln!(
            out,
            "{:#018x} {:>8} {}",
            s.address,
            s.size,
            codeobj_helper::symbols::demangle(&s.name)
        )?;
    }
    Ok(())
}

fn lines(code_object: &CodeObject) -> Result<()> {
    let info = code_object
        .load_debug_info()
        .context("no debug info available")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (low, high) in info.units.iter() {
        writeln!(out, "unit [{:#x}-{:#x})", low, high)?;
    }
    for (address, entry) in info.lines.iter() {
        writeln!(
            out,
            "{:#018x} {}:{}",
            address,
            info.lines.file_name(entry),
            entry.line
        )?;
    }
    Ok(())
}

fn disasm(code_object: &CodeObject, address: u64, arch: Option<Arch>) -> Result<()> {
    let arch = match arch {
        Some(arch) => arch,
        None => {
            let map = code_object
                .backing_store()
                .context("code object is not opened")?
                .map()?;
            Arch::from_object(&map).context("unknown architecture, pass --arch")?
        }
    };
    let memory = code_object
        .image_memory()
        .context("could not map the loadable segments")?;
    let disassembler = Disassembler::new(arch)?;
    let target = Target {
        memory: &memory,
        decoder: &disassembler,
        arch: &disassembler,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut sources = SourceCache::new();
    code_object.disassemble(&mut out, address, &target, &mut sources)?;
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _logger = init_logging(cli.global.debug)?;
    log::debug!("{:?}", cli);

    let load_address = cli.global.load_address;
    match cli.command {
        Command::Info { uri, json } => info(&open(&uri, load_address)?, json),
        Command::Symbols { uri, json } => symbols(&open(&uri, load_address)?, json),
        Command::Lines { uri } => lines(&open(&uri, load_address)?),
        Command::Disasm { uri, address, arch } => {
            disasm(&open(&uri, load_address)?, address, arch)
        }
        Command::Save { uri, directory } => {
            let path = open(&uri, load_address)?.save(&directory)?;
            println!("{}", path.display());
            Ok(())
        }
    }
}
