//! Code-generation and symbol/unwind-data back end for a SystemTap-style
//! translator: takes an already-elaborated script session and emits the
//! C module the runtime loads, plus the unwind/symbol header the
//! backtracer needs.
//!
//! The parser, type checker, and tapset resolution that produce the
//! [`types::session::Session`] this crate consumes live upstream and are
//! out of scope here.

pub mod compat;
pub mod driver;
pub mod emit;
pub mod error;
pub mod ir;
pub mod plan;
pub mod symbol;
pub mod types;
pub mod unwind;

pub mod dwarf;

pub use error::{DwarfError, Result, TranslateError};
