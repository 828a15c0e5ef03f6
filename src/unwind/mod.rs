//! The unwind/symbol dumper: per referenced module, extract
//! build-id, sections, a filtered/sorted symbol table, and CFI, then
//! emit one C record the runtime backtracer includes.

pub mod emit;
pub mod frame;
pub mod module;

pub use module::{ModuleRecord, SectionRecord, SymbolRecord};
