//! The session object: the top-level input to the translator back end,
//! already elaborated by the parser and type checker upstream.

use std::path::PathBuf;

use crate::compat::CompatVersion;
use crate::types::ast::{DerivedProbe, FunctionDecl, StatDecl, VarDecl};

bitflags::bitflags! {
    /// Session-wide boolean knobs, backed by `bitflags` so callers compose
    /// them with `|` instead of a struct of a dozen `bool` fields.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u32 {
        /// Collect and print per-probe hit/time histograms at exit.
        const TIMING        = 1 << 0;
        /// Reserve print-buffer space in bulk rather than per-call.
        const BULK          = 1 << 1;
        /// Fall back to the legacy (pre-compiled-printf) `_stp_printf`.
        const LEGACY_PRINTF = 1 << 2;
        /// Tolerate references to variables the DWARF adapter could not
        /// resolve, by emitting a runtime error instead of a translate
        /// error.
        const SKIP_BADVARS  = 1 << 3;
        /// Unprivileged-mode restrictions (narrower blacklist bypass,
        /// mandatory embedded-C privilege assertions).
        const UNPRIVILEGED  = 1 << 4;
        /// Bypass the DWARF adapter's function/section blacklist.
        const GURU_MODE     = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    I386,
    Arm64,
    Arm,
    Ppc64,
    S390x,
}

impl Arch {
    /// PLT entry size in bytes. `None` means unsupported for PLT
    /// enumeration.
    #[must_use]
    pub fn plt_entry_size(self) -> Option<u32> {
        match self {
            Arch::X86_64 | Arch::I386 => Some(16),
            _ => None,
        }
    }
}

/// The full set of declarations and knobs the back end needs.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub globals: Vec<VarDecl>,
    pub functions: Vec<FunctionDecl>,
    pub probes: Vec<DerivedProbe>,
    pub stats: Vec<StatDecl>,
    pub compat_version: Option<CompatVersion>,
    pub arch: Option<Arch>,
    pub kernel_build_tree: Option<PathBuf>,
    /// Modules whose unwind data is wanted by the unwind/symbol dumper:
    /// paths or kernel-module names/patterns.
    pub unwind_modules: Vec<String>,
    pub flags: Flags,
    /// `MAXMAPENTRIES` default when a `vardecl` doesn't override it.
    pub max_map_entries_default: u32,
    /// `MAXACTION`: the per-probe action budget.
    pub max_action: u32,
    /// `MAXNESTING`: the per-CPU function-call nesting cap.
    pub max_nesting: u32,
    pub tag_value_pairs: Vec<(String, String)>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_map_entries_default: 2048,
            max_action: 1000,
            max_nesting: 20,
            ..Self::default()
        }
    }
}
