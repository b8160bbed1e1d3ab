use std::collections::BTreeMap;

use object::{elf, Object, ObjectSymbol, SymbolFlags};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub address: u64,
    pub size: u64,
}

/// Result of an address lookup. `name` is demangled when possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    pub name: String,
    pub value: u64,
    pub size: u64,
}

/// Function symbols of one code object, keyed by load-relocated start address.
#[derive(Default)]
pub struct SymbolTable {
    // BTreeMap gives O(log n) floor queries via range(..=addr).next_back().
    symbols_by_addr: BTreeMap<u64, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a symbol. When another symbol already starts at the same
    /// address the one with the larger size is kept; on equal sizes the first
    /// one stays. Returns whether `symbol` is now the entry at its address.
    pub fn insert(&mut self, symbol: Symbol) -> bool {
        match self.symbols_by_addr.get_mut(&symbol.address) {
            Some(existing) if symbol.size > existing.size => {
                *existing = symbol;
                true
            }
            Some(_) => false,
            None => {
                self.symbols_by_addr.insert(symbol.address, symbol);
                true
            }
        }
    }

    /// Find the symbol whose `[address, address + size)` contains `address`.
    pub fn lookup(&self, address: u64) -> Option<&Symbol> {
        let (&start_addr, symbol) = self.symbols_by_addr.range(..=address).next_back()?;
        if address - start_addr < symbol.size {
            Some(symbol)
        } else {
            None
        }
    }

    /// Like [`lookup`](Self::lookup), with the name demangled.
    pub fn find(&self, address: u64) -> Option<SymbolInfo> {
        self.lookup(address).map(|symbol| SymbolInfo {
            name: demangle(&symbol.name),
            value: symbol.address,
            size: symbol.size,
        })
    }

    pub fn len(&self) -> usize {
        self.symbols_by_addr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols_by_addr.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols_by_addr.values()
    }
}

/// Collect the defined function symbols of every symbol table in an ELF
/// image, relocated by `load_address`.
pub fn load_function_symbols(data: &[u8], load_address: u64) -> object::Result<SymbolTable> {
    let file = object::File::parse(data)?;
    let mut table = SymbolTable::new();
    for symbol in file.symbols().chain(file.dynamic_symbols()) {
        if !is_function(symbol.flags()) || symbol.is_undefined() {
            continue;
        }
        let Ok(name) = symbol.name_bytes() else {
            continue;
        };
        table.insert(Symbol {
            name: String::from_utf8_lossy(name).into_owned(),
            address: load_address.wrapping_add(symbol.address()),
            size: symbol.size(),
        });
    }
    log::debug!("loaded {} function symbols", table.len());
    Ok(table)
}

/// `STT_FUNC` only; `STT_GNU_IFUNC` resolvers are not function bodies.
fn is_function<S, Y>(flags: SymbolFlags<S, Y>) -> bool {
    matches!(flags, SymbolFlags::Elf { st_info, .. } if st_info & 0xf == elf::STT_FUNC)
}

/// Best-effort demangling: Rust first, then Itanium C++, else the raw name.
pub fn demangle(name: &str) -> String {
    if let Ok(demangled) = rustc_demangle::try_demangle(name) {
        return format!("{:#}", demangled);
    }
    if name.starts_with("_Z") {
        if let Ok(symbol) = cpp_demangle::Symbol::new(name) {
            if let Ok(out) = symbol.demangle() {
                return out;
            }
        }
    }
    name.to_string()
}
