//! CFI extraction and `.debug_frame_hdr` synthesis.

use byteorder::{WriteBytesExt, LE};
use object::{Object, ObjectSection};

/// Tables larger than this are dropped with a warning rather than
/// emitted.
pub const MAX_TABLE_BYTES: usize = 6 * 1024 * 1024;

/// One entry of a `.eh_frame`/`.debug_frame` FDE index: the PC the FDE
/// covers from, and that FDE's byte offset within the frame section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FdeIndexEntry {
    pub initial_location: u64,
    pub fde_offset: u32,
}

pub fn extract_section(obj: &object::File<'_>, name: &str) -> (Vec<u8>, u64) {
    match obj.section_by_name(name) {
        Some(s) => (s.uncompressed_data().map(|d| d.into_owned()).unwrap_or_default(), s.address()),
        None => (Vec::new(), 0),
    }
}

/// Synthesize a `.debug_frame_hdr` for a `.debug_frame` section that has
/// none: a 4-byte header (version 1, `DW_EH_PE_absptr`
/// pointer encoding, a word-size-dependent count encoding, `absptr`
/// table encoding) followed by the FDE index sorted by
/// `initial_location`.
///
/// Returns `None` (with a logged warning) if the synthesized table would
/// exceed [`MAX_TABLE_BYTES`].
#[must_use]
pub fn synthesize_debug_frame_hdr(mut entries: Vec<FdeIndexEntry>, is_64bit: bool) -> Option<Vec<u8>> {
    entries.sort_unstable();
    let word = if is_64bit { 8u32 } else { 4u32 };
    let table_bytes = 2 * word as usize * entries.len();
    let total = 4 + table_bytes;
    if total > MAX_TABLE_BYTES {
        log::warn!(
            "synthesized .debug_frame_hdr would be {total} bytes, over the {MAX_TABLE_BYTES} cap; dropping"
        );
        return None;
    }

    let mut out = Vec::with_capacity(total);
    // version
    out.push(1);
    // eh_frame_ptr_enc = DW_EH_PE_absptr (0x00)
    out.push(0x00);
    // fde_count_enc: DW_EH_PE_udata4 or DW_EH_PE_udata8, by pointer width
    out.push(if is_64bit { 0x04 } else { 0x03 });
    // table_enc = DW_EH_PE_absptr
    out.push(0x00);

    for e in &entries {
        if is_64bit {
            let _ = out.write_u64::<LE>(e.initial_location);
        } else {
            let _ = out.write_u32::<LE>(u32::try_from(e.initial_location).unwrap_or(u32::MAX));
        }
        let _ = out.write_u32::<LE>(e.fde_offset);
        if is_64bit {
            // pad fde_offset to a full word so (initial_location,
            // fde_offset) stays 2*word-sized per entry even at 64-bit.
            let _ = out.write_u32::<LE>(0);
        }
    }
    Some(out)
}

/// The exact byte length the synthesized header will have, used by the
/// "Unwind synthesis" testable property without actually building it.
#[must_use]
pub fn synthesized_len(num_fdes: usize, is_64bit: bool) -> usize {
    let w = if is_64bit { 8 } else { 4 };
    4 + 2 * w * num_fdes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_length_matches_spec_formula() {
        assert_eq!(synthesized_len(3, true), 4 + 2 * 8 * 3);
        assert_eq!(synthesized_len(3, false), 4 + 2 * 4 * 3);
    }

    #[test]
    fn entries_are_sorted_by_initial_location() {
        let entries = vec![
            FdeIndexEntry { initial_location: 200, fde_offset: 0x10 },
            FdeIndexEntry { initial_location: 100, fde_offset: 0x20 },
        ];
        let hdr = synthesize_debug_frame_hdr(entries, true).unwrap();
        assert_eq!(hdr[0], 1);
        // first table entry (after the 4-byte header) must be the lower address
        let first_addr = u64::from_le_bytes(hdr[4..12].try_into().unwrap());
        assert_eq!(first_addr, 100);
    }

    #[test]
    fn oversized_table_is_dropped() {
        let n = MAX_TABLE_BYTES / (2 * 8) + 10;
        let entries: Vec<_> = (0..n)
            .map(|i| FdeIndexEntry { initial_location: i as u64, fde_offset: 0 })
            .collect();
        assert!(synthesize_debug_frame_hdr(entries, true).is_none());
    }
}
