//! Per-module record construction: build-id,
//! section list, filtered/sorted symbol table.

use object::{Object, ObjectKind, ObjectSection, ObjectSymbol, SymbolKind};

use crate::error::DwarfError;
use crate::types::session::Arch;

#[derive(Debug, Clone)]
pub struct SymbolRecord {
    /// Offset from the containing section's base; for kernel symbols
    /// this has already been biased so it is relative to `_stext`.
    pub offset: u64,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct SectionRecord {
    pub name: String,
    pub size: u64,
    pub symbols: Vec<SymbolRecord>,
    /// Only `.absolute`/`.dynamic`/`.text`/`_stext` carry their own
    /// synthesized `.debug_frame_hdr`.
    pub debug_frame_hdr: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleRecord {
    pub name: String,
    pub path: String,
    pub build_id: Vec<u8>,
    pub build_id_vaddr: u64,
    pub eh_frame: Vec<u8>,
    pub eh_frame_addr: u64,
    pub eh_frame_hdr: Vec<u8>,
    pub eh_frame_hdr_addr: u64,
    pub debug_frame: Vec<u8>,
    pub debug_frame_section_load_offset: u64,
    pub synthesized_debug_frame_hdr: Vec<u8>,
    pub sections: Vec<SectionRecord>,
    /// `_stext` bias applied to every other kernel symbol, and the
    /// `kretprobe_trampoline_holder` address; `None`
    /// for non-kernel modules.
    pub stext_bias: Option<u64>,
    pub kretprobe_trampoline: Option<u64>,
}

/// ARM mapping symbols (`$a`, `$t`, `$d`, ...) describe instruction-set
/// transitions, not real code/data locations, and are always dropped.
fn is_arm_mapping_symbol(name: &str) -> bool {
    matches!(name.as_bytes(), [b'$', b'a' | b't' | b'd' | b'x', ..])
}

/// Build the section list for one module.
pub fn build_sections(
    obj: &object::File<'_>,
    is_kernel: bool,
) -> Vec<SectionRecord> {
    match obj.kind() {
        ObjectKind::Executable => {
            let (start, end) = obj
                .sections()
                .map(|s| (s.address(), s.address() + s.size()))
                .fold((u64::MAX, 0), |(lo, hi), (a, b)| (lo.min(a), hi.max(b)));
            vec![SectionRecord {
                name: ".absolute".into(),
                size: end.saturating_sub(start),
                ..Default::default()
            }]
        }
        ObjectKind::Dynamic => {
            vec![SectionRecord {
                name: if is_kernel { "_stext".into() } else { ".dynamic".into() },
                size: obj.sections().map(|s| s.size()).sum(),
                ..Default::default()
            }]
        }
        _ => obj
            .sections()
            .filter(|s| {
                matches!(s.kind(), object::SectionKind::Text | object::SectionKind::Data | object::SectionKind::ReadOnlyData | object::SectionKind::UninitializedData)
            })
            .map(|s| SectionRecord {
                name: s.name().unwrap_or("").to_owned(),
                size: s.size(),
                ..Default::default()
            })
            .collect(),
    }
}

/// Filter and sort one module's symbol table.
///
/// PPC64 function-descriptor resolution through `.opd` is noted but not
/// performed here (no PPC64 fixture in this pack); the descriptor-vs-
/// entry-address distinction is left as a documented gap, see
/// `DESIGN.md`.
pub fn build_symbols(obj: &object::File<'_>, is_kernel: bool) -> Vec<SymbolRecord> {
    let mut out: Vec<SymbolRecord> = obj
        .symbols()
        .filter(|sym| {
            let name = sym.name().unwrap_or("");
            if is_arm_mapping_symbol(name) {
                return false;
            }
            if sym.is_undefined() || name.is_empty() {
                return false;
            }
            let keep_notype = (is_kernel || obj.kind() == ObjectKind::Relocatable)
                && sym.kind() == SymbolKind::Unknown;
            matches!(sym.kind(), SymbolKind::Text | SymbolKind::Data) || keep_notype
        })
        .map(|sym| SymbolRecord { offset: sym.address(), name: sym.name().unwrap_or("").to_owned() })
        .collect();
    out.sort_by_key(|s| s.offset);
    out
}

/// Apply the kernel `_stext` bias to an already-sorted symbol table
///: every symbol's offset becomes relative to
/// `_stext` instead of the link-time base.
pub fn bias_kernel_symbols(symbols: &mut [SymbolRecord], stext: u64) {
    for s in symbols {
        s.offset = s.offset.wrapping_sub(stext);
    }
}

#[must_use]
pub fn find_stext(symbols: &[SymbolRecord]) -> Option<u64> {
    symbols.iter().find(|s| s.name == "_stext").map(|s| s.offset)
}

#[must_use]
pub fn find_kretprobe_trampoline(symbols: &[SymbolRecord]) -> Option<u64> {
    symbols.iter().find(|s| s.name == "kretprobe_trampoline_holder").map(|s| s.offset)
}

/// Extract the GNU build-id note; for user modules,
/// relocate the note's virtual address against the module's dynamic
/// base. Kernel modules require the note to live in
/// `.note.gnu.build-id`.
pub fn build_id(obj: &object::File<'_>, is_kernel: bool) -> Result<(Vec<u8>, u64), DwarfError> {
    let Some(section) = obj.section_by_name(".note.gnu.build-id") else {
        if is_kernel {
            return Err(DwarfError::MissingDebugInfo {
                module: "kernel".into(),
                rpm_hint: "kernel-debuginfo".into(),
            });
        }
        return Ok((Vec::new(), 0));
    };
    let data = section.uncompressed_data().map_err(|source| DwarfError::Open {
        path: ".note.gnu.build-id".into(),
        source,
    })?;
    // GNU notes: namesz(4) descsz(4) type(4) name(namesz, padded) desc(descsz, padded).
    if data.len() < 12 {
        return Ok((Vec::new(), section.address()));
    }
    let namesz = u32::from_ne_bytes(data[0..4].try_into().unwrap()) as usize;
    let descsz = u32::from_ne_bytes(data[4..8].try_into().unwrap()) as usize;
    let name_start = 12;
    let name_pad = (4 - namesz % 4) % 4;
    let desc_start = name_start + namesz + name_pad;
    let desc = data.get(desc_start..desc_start + descsz).unwrap_or(&[]).to_vec();
    log::trace!("build-id {}", hex::encode(&desc));
    Ok((desc, section.address()))
}

pub fn arch_of(obj: &object::File<'_>) -> Option<Arch> {
    match obj.architecture() {
        object::Architecture::X86_64 => Some(Arch::X86_64),
        object::Architecture::I386 => Some(Arch::I386),
        object::Architecture::Aarch64 => Some(Arch::Arm64),
        object::Architecture::Arm => Some(Arch::Arm),
        object::Architecture::PowerPc64 => Some(Arch::Ppc64),
        object::Architecture::S390x => Some(Arch::S390x),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_mapping_symbols_are_recognized() {
        assert!(is_arm_mapping_symbol("$a"));
        assert!(is_arm_mapping_symbol("$t.3"));
        assert!(is_arm_mapping_symbol("$d"));
        assert!(!is_arm_mapping_symbol("$main"));
        assert!(!is_arm_mapping_symbol("do_fork"));
    }

    #[test]
    fn bias_applies_uniformly() {
        let mut syms =
            vec![SymbolRecord { offset: 100, name: "_stext".into() }, SymbolRecord { offset: 150, name: "foo".into() }];
        let stext = find_stext(&syms).unwrap();
        bias_kernel_symbols(&mut syms, stext);
        assert_eq!(syms[0].offset, 0);
        assert_eq!(syms[1].offset, 50);
    }
}
