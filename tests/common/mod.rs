//! Hand-built little-endian ELF64 images for the integration tests.
#![allow(dead_code)]

use std::io::Write;
use std::path::Path;

pub const PT_LOAD: u32 = 1;
pub const PT_NOTE: u32 = 4;

pub const STT_OBJECT: u8 = 1;
pub const STT_FUNC: u8 = 2;

const EHDR_SIZE: usize = 64;
const PHDR_SIZE: usize = 56;
const SHDR_SIZE: usize = 64;
const SYM_SIZE: usize = 24;

const SHT_PROGBITS: u32 = 1;
const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;
const SHT_DYNSYM: u32 = 11;
const SHF_ALLOC: u64 = 2;
const SHF_EXECINSTR: u64 = 4;

pub struct ElfSymbol {
    name: Vec<u8>,
    value: u64,
    size: u64,
    kind: u8,
    defined: bool,
}

pub struct ElfBuilder {
    text_address: u64,
    text: Vec<u8>,
    symbols: Vec<ElfSymbol>,
    dynamic_symbols: Vec<ElfSymbol>,
    segments: Vec<(u32, u64, u64)>,
    sections: Vec<(String, Vec<u8>)>,
}

fn align(buf: &mut Vec<u8>, to: usize) {
    while buf.len() % to != 0 {
        buf.push(0);
    }
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

struct StrTab(Vec<u8>);

impl StrTab {
    fn new() -> Self {
        StrTab(vec![0])
    }

    fn add(&mut self, s: &[u8]) -> u32 {
        let offset = self.0.len() as u32;
        self.0.extend_from_slice(s);
        self.0.push(0);
        offset
    }
}

struct Shdr {
    name: u32,
    kind: u32,
    flags: u64,
    addr: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    align: u64,
    entsize: u64,
}

impl ElfBuilder {
    /// An image whose only loadable segment is `.text` at `text_address`.
    pub fn new(text_address: u64, text: Vec<u8>) -> Self {
        Self {
            text_address,
            text,
            symbols: Vec::new(),
            dynamic_symbols: Vec::new(),
            segments: Vec::new(),
            sections: Vec::new(),
        }
    }

    pub fn function(self, name: &str, value: u64, size: u64) -> Self {
        self.symbol(name.as_bytes(), value, size, STT_FUNC, true)
    }

    pub fn symbol(mut self, name: &[u8], value: u64, size: u64, kind: u8, defined: bool) -> Self {
        self.symbols.push(ElfSymbol {
            name: name.to_vec(),
            value,
            size,
            kind,
            defined,
        });
        self
    }

    /// A defined function in `.dynsym`.
    pub fn dynamic_function(mut self, name: &str, value: u64, size: u64) -> Self {
        self.dynamic_symbols.push(ElfSymbol {
            name: name.as_bytes().to_vec(),
            value,
            size,
            kind: STT_FUNC,
            defined: true,
        });
        self
    }

    /// An extra program header with no file contents.
    pub fn segment(mut self, p_type: u32, vaddr: u64, memsz: u64) -> Self {
        self.segments.push((p_type, vaddr, memsz));
        self
    }

    pub fn section(mut self, name: &str, data: Vec<u8>) -> Self {
        self.sections.push((name.to_string(), data));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let phnum = 1 + self.segments.len();
        let mut out = vec![0u8; EHDR_SIZE + phnum * PHDR_SIZE];
        let mut shstrtab = StrTab::new();
        let mut headers = vec![Shdr {
            name: 0,
            kind: 0,
            flags: 0,
            addr: 0,
            offset: 0,
            size: 0,
            link: 0,
            info: 0,
            align: 0,
            entsize: 0,
        }];

        align(&mut out, 16);
        let text_offset = out.len() as u64;
        out.extend_from_slice(&self.text);
        let text_index = headers.len() as u16;
        headers.push(Shdr {
            name: shstrtab.add(b".text"),
            kind: SHT_PROGBITS,
            flags: SHF_ALLOC | SHF_EXECINSTR,
            addr: self.text_address,
            offset: text_offset,
            size: self.text.len() as u64,
            link: 0,
            info: 0,
            align: 16,
            entsize: 0,
        });

        let tables = [
            (&self.symbols, ".strtab", ".symtab", SHT_SYMTAB),
            (&self.dynamic_symbols, ".dynstr", ".dynsym", SHT_DYNSYM),
        ];
        for (symbols, strtab_name, symtab_name, symtab_kind) in tables {
            if symtab_kind == SHT_DYNSYM && symbols.is_empty() {
                continue;
            }
            let mut strtab = StrTab::new();
            let mut symtab = vec![0u8; SYM_SIZE];
            for symbol in symbols.iter() {
                put_u32(&mut symtab, strtab.add(&symbol.name));
                // STB_GLOBAL
                symtab.push(0x10 | symbol.kind);
                symtab.push(0);
                put_u16(&mut symtab, if symbol.defined { text_index } else { 0 });
                put_u64(&mut symtab, symbol.value);
                put_u64(&mut symtab, symbol.size);
            }

            let strtab_index = headers.len() as u32;
            let strtab_offset = out.len() as u64;
            out.extend_from_slice(&strtab.0);
            headers.push(Shdr {
                name: shstrtab.add(strtab_name.as_bytes()),
                kind: SHT_STRTAB,
                flags: 0,
                addr: 0,
                offset: strtab_offset,
                size: strtab.0.len() as u64,
                link: 0,
                info: 0,
                align: 1,
                entsize: 0,
            });

            align(&mut out, 8);
            let symtab_offset = out.len() as u64;
            out.extend_from_slice(&symtab);
            headers.push(Shdr {
                name: shstrtab.add(symtab_name.as_bytes()),
                kind: symtab_kind,
                flags: 0,
                addr: 0,
                offset: symtab_offset,
                size: symtab.len() as u64,
                link: strtab_index,
                info: 1,
                align: 8,
                entsize: SYM_SIZE as u64,
            });
        }

        for (name, data) in &self.sections {
            align(&mut out, 8);
            let offset = out.len() as u64;
            out.extend_from_slice(data);
            headers.push(Shdr {
                name: shstrtab.add(name.as_bytes()),
                kind: SHT_PROGBITS,
                flags: 0,
                addr: 0,
                offset,
                size: data.len() as u64,
                link: 0,
                info: 0,
                align: 1,
                entsize: 0,
            });
        }

        let shstrtab_index = headers.len() as u16;
        let shstrtab_name = shstrtab.add(b".shstrtab");
        let shstrtab_offset = out.len() as u64;
        out.extend_from_slice(&shstrtab.0);
        headers.push(Shdr {
            name: shstrtab_name,
            kind: SHT_STRTAB,
            flags: 0,
            addr: 0,
            offset: shstrtab_offset,
            size: shstrtab.0.len() as u64,
            link: 0,
            info: 0,
            align: 1,
            entsize: 0,
        });

        align(&mut out, 8);
        let shoff = out.len() as u64;
        for h in &headers {
            put_u32(&mut out, h.name);
            put_u32(&mut out, h.kind);
            put_u64(&mut out, h.flags);
            put_u64(&mut out, h.addr);
            put_u64(&mut out, h.offset);
            put_u64(&mut out, h.size);
            put_u32(&mut out, h.link);
            put_u32(&mut out, h.info);
            put_u64(&mut out, h.align);
            put_u64(&mut out, h.entsize);
        }

        let mut ehdr = Vec::with_capacity(EHDR_SIZE);
        ehdr.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
        ehdr.extend_from_slice(&[0; 8]);
        put_u16(&mut ehdr, 3); // ET_DYN
        put_u16(&mut ehdr, 62); // EM_X86_64
        put_u32(&mut ehdr, 1);
        put_u64(&mut ehdr, self.text_address);
        put_u64(&mut ehdr, EHDR_SIZE as u64);
        put_u64(&mut ehdr, shoff);
        put_u32(&mut ehdr, 0);
        put_u16(&mut ehdr, EHDR_SIZE as u16);
        put_u16(&mut ehdr, PHDR_SIZE as u16);
        put_u16(&mut ehdr, phnum as u16);
        put_u16(&mut ehdr, SHDR_SIZE as u16);
        put_u16(&mut ehdr, headers.len() as u16);
        put_u16(&mut ehdr, shstrtab_index);

        let mut phdrs = Vec::with_capacity(phnum * PHDR_SIZE);
        let text_len = self.text.len() as u64;
        let load = (PT_LOAD, text_offset, self.text_address, text_len, text_len);
        let extra = self
            .segments
            .iter()
            .map(|&(p_type, vaddr, memsz)| (p_type, 0, vaddr, 0, memsz));
        for (p_type, offset, vaddr, filesz, memsz) in std::iter::once(load).chain(extra) {
            put_u32(&mut phdrs, p_type);
            put_u32(&mut phdrs, 5); // PF_R | PF_X
            put_u64(&mut phdrs, offset);
            put_u64(&mut phdrs, vaddr);
            put_u64(&mut phdrs, vaddr);
            put_u64(&mut phdrs, filesz);
            put_u64(&mut phdrs, memsz);
            put_u64(&mut phdrs, 16);
        }

        out[..EHDR_SIZE].copy_from_slice(&ehdr);
        out[EHDR_SIZE..EHDR_SIZE + phdrs.len()].copy_from_slice(&phdrs);
        out
    }
}

/// Write `bytes` to `dir/name` and return its `file://` locator.
pub fn write_image(dir: &Path, name: &str, bytes: &[u8]) -> String {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(bytes).unwrap();
    format!("file://{}", path.display())
}

/// DWARF 4 sections for one unit covering `[low_pc, low_pc + len)`, with a
/// line program mapping `low_pc + offset` to `line` of `dir/file`.
pub fn dwarf_sections(
    dir: &Path,
    file: &str,
    low_pc: u64,
    len: u64,
    rows: &[(u64, u64)],
) -> Vec<(String, Vec<u8>)> {
    use gimli::write::{
        Address, AttributeValue, DwarfUnit, EndianVec, LineProgram, LineString, Sections,
    };

    let encoding = gimli::Encoding {
        format: gimli::Format::Dwarf32,
        version: 4,
        address_size: 8,
    };
    let comp_dir = dir.to_string_lossy().into_owned().into_bytes();
    let mut dwarf = DwarfUnit::new(encoding);

    let mut program = LineProgram::new(
        encoding,
        gimli::LineEncoding::default(),
        LineString::String(comp_dir.clone()),
        LineString::String(file.as_bytes().to_vec()),
        None,
    );
    let directory = program.default_directory();
    let file_id = program.add_file(LineString::String(file.as_bytes().to_vec()), directory, None);
    program.begin_sequence(Some(Address::Constant(low_pc)));
    for &(offset, line) in rows {
        program.row().address_offset = offset;
        program.row().file = file_id;
        program.row().line = line;
        program.generate_row();
    }
    program.end_sequence(len);
    dwarf.unit.line_program = program;

    let root = dwarf.unit.root();
    let entry = dwarf.unit.get_mut(root);
    entry.set(gimli::DW_AT_name, AttributeValue::String(file.as_bytes().to_vec()));
    entry.set(gimli::DW_AT_comp_dir, AttributeValue::String(comp_dir));
    entry.set(
        gimli::DW_AT_low_pc,
        AttributeValue::Address(Address::Constant(low_pc)),
    );
    entry.set(gimli::DW_AT_high_pc, AttributeValue::Udata(len));

    let mut sections = Sections::new(EndianVec::new(gimli::LittleEndian));
    dwarf.write(&mut sections).unwrap();

    let mut out = Vec::new();
    sections
        .for_each(|id, data| {
            if !data.slice().is_empty() {
                out.push((id.name().to_string(), data.slice().to_vec()));
            }
            Ok::<(), gimli::write::Error>(())
        })
        .unwrap();
    out
}
