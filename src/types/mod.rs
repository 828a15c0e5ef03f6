//! The input contract of the translator back end.
//!
//! The parser, macro expander, type checker, and tapset library live
//! upstream of this crate; what they hand the code
//! generator is an already-elaborated session object. This module defines
//! the Rust shape of that object so the rest of the crate has something
//! concrete to consume — the real translator's AST classes are out of
//! scope, but a library has to type *something* at its boundary.

pub mod ast;
pub mod session;

pub use ast::*;
pub use session::Session;

/// A dense, zero-based index into an arena-like `Vec`, used as a
/// lightweight newtype-over-`u32` in place of raw pointers or `usize`.
pub trait Idx: Copy + Eq + std::hash::Hash {
    fn from_usize(n: usize) -> Self;
    fn into_usize(self) -> usize;
}

#[macro_export]
macro_rules! mk_idx {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $crate::types::Idx for $name {
            fn from_usize(n: usize) -> Self { Self(u32::try_from(n).expect("index overflow")) }
            fn into_usize(self) -> usize { self.0 as usize }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}
