// Crate root: declare modules and control visibility
pub mod capstone;
pub mod code_object;
pub mod disasm;
pub mod dwarf;
pub mod error;
pub mod line_table;
pub mod memory;
pub mod source_cache;
pub mod symbols;
pub mod uri;
pub mod utils;

// Re-export commonly used API from the library for binaries/tests
pub use code_object::{CodeObject, LoadAddressProvider};
pub use disasm::{ArchitectureInfo, DecodedInstruction, InstructionDecoder, Target};
pub use memory::{ImageMemory, MemoryReader, NoMemory};
pub use source_cache::SourceCache;
