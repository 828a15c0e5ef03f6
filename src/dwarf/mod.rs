//! The debug-info adapter: everything the rest of the crate
//! knows about one binary's DWARF/ELF, behind `object` + `gimli`.
//!
//! Grounded on the `gimli`+`object` pairing used by
//! `examples/other_examples` for exactly this job (`mstange-framehop`,
//! `fitzgen-dwprod`): `object` opens and classifies the file, `gimli`
//! walks the DWARF sections it hands back.

pub mod blacklist;
pub mod context;
pub mod cursor;
pub mod iter;
pub mod library;
pub mod loc2c;
pub mod scope;

pub use context::DebugInfo;
pub use cursor::Focus;
