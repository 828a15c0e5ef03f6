//! Emit the `stap-symbols.h` surface: one
//! `_stp_module` C record per module, an index array, and the
//! `_stp_kretprobe_trampoline` scalar.

use std::fmt::Write as _;

use crate::ir::print::escape_c_string;
use crate::unwind::module::{ModuleRecord, SectionRecord, SymbolRecord};

fn c_byte_array(name: &str, bytes: &[u8]) -> String {
    let mut s = format!("static const char {name}[] = {{\n  ");
    for (i, b) in bytes.iter().enumerate() {
        let _ = write!(s, "0x{b:02x},");
        if i % 16 == 15 {
            s.push_str("\n  ");
        } else {
            s.push(' ');
        }
    }
    s.push_str("\n};\n");
    s
}

fn emit_symbol_table(prefix: &str, symbols: &[SymbolRecord]) -> String {
    let mut s = format!("static struct _stp_symbol {prefix}_symbols[] = {{\n");
    for sym in symbols {
        let _ = writeln!(s, "  {{ 0x{:x}UL, \"{}\" }},", sym.offset, escape_c_string(&sym.name));
    }
    s.push_str("};\n");
    s
}

fn emit_section(module_prefix: &str, idx: usize, sec: &SectionRecord) -> String {
    let prefix = format!("{module_prefix}_sec{idx}");
    let mut s = String::new();
    if !sec.symbols.is_empty() {
        s.push_str(&emit_symbol_table(&prefix, &sec.symbols));
    }
    if let Some(hdr) = &sec.debug_frame_hdr {
        s.push_str(&c_byte_array(&format!("{prefix}_dfh"), hdr));
    }
    let _ = writeln!(
        s,
        "static struct _stp_section {prefix} = {{ .name = \"{}\", .size = 0x{:x}UL, .symbols = {}, .num_symbols = {}, .debug_frame_hdr = {}, .debug_frame_hdr_len = {} }};",
        escape_c_string(&sec.name),
        sec.size,
        if sec.symbols.is_empty() { "NULL".into() } else { format!("{prefix}_symbols") },
        sec.symbols.len(),
        sec.debug_frame_hdr.as_ref().map_or("NULL".to_owned(), |_| format!("{prefix}_dfh")),
        sec.debug_frame_hdr.as_ref().map_or(0, Vec::len),
    );
    s
}

/// Render one module's full `_stp_module` record plus its supporting
/// byte arrays and section table.
#[must_use]
pub fn emit_module_record(index: usize, m: &ModuleRecord) -> String {
    let prefix = format!("_stp_module_{index}");
    let mut s = String::new();

    if !m.build_id.is_empty() {
        s.push_str(&c_byte_array(&format!("{prefix}_build_id"), &m.build_id));
    }
    if !m.eh_frame.is_empty() {
        s.push_str(&c_byte_array(&format!("{prefix}_eh_frame"), &m.eh_frame));
    }
    if !m.eh_frame_hdr.is_empty() {
        s.push_str(&c_byte_array(&format!("{prefix}_eh_frame_hdr"), &m.eh_frame_hdr));
    }
    if !m.debug_frame.is_empty() {
        s.push_str(&c_byte_array(&format!("{prefix}_debug_frame"), &m.debug_frame));
    }
    if !m.synthesized_debug_frame_hdr.is_empty() {
        s.push_str(&c_byte_array(&format!("{prefix}_synth_dfh"), &m.synthesized_debug_frame_hdr));
    }

    let section_names: Vec<String> = m
        .sections
        .iter()
        .enumerate()
        .map(|(i, sec)| {
            s.push_str(&emit_section(&prefix, i, sec));
            format!("&{prefix}_sec{i}")
        })
        .collect();
    let _ = writeln!(
        s,
        "static struct _stp_section *{prefix}_sections[] = {{ {} }};",
        section_names.join(", ")
    );

    let _ = writeln!(
        s,
        "struct _stp_module {prefix} = {{\n\
         \t.name = \"{}\",\n\
         \t.path = \"{}\",\n\
         \t.build_id_bytes = {},\n\
         \t.build_id_len = {},\n\
         \t.build_id_vaddr = 0x{:x}UL,\n\
         \t.eh_frame = {},\n\
         \t.eh_frame_len = {},\n\
         \t.eh_frame_addr = 0x{:x}UL,\n\
         \t.eh_frame_hdr = {},\n\
         \t.eh_frame_hdr_len = {},\n\
         \t.eh_frame_hdr_addr = 0x{:x}UL,\n\
         \t.debug_frame = {},\n\
         \t.debug_frame_len = {},\n\
         \t.debug_frame_section_load_offset = 0x{:x}UL,\n\
         \t.debug_frame_hdr = {},\n\
         \t.debug_frame_hdr_len = {},\n\
         \t.sections = {prefix}_sections,\n\
         \t.num_sections = {},\n\
         }};",
        escape_c_string(&m.name),
        escape_c_string(&m.path),
        if m.build_id.is_empty() { "NULL".into() } else { format!("{prefix}_build_id") },
        m.build_id.len(),
        m.build_id_vaddr,
        if m.eh_frame.is_empty() { "NULL".into() } else { format!("{prefix}_eh_frame") },
        m.eh_frame.len(),
        m.eh_frame_addr,
        if m.eh_frame_hdr.is_empty() { "NULL".into() } else { format!("{prefix}_eh_frame_hdr") },
        m.eh_frame_hdr.len(),
        m.eh_frame_hdr_addr,
        if m.debug_frame.is_empty() { "NULL".into() } else { format!("{prefix}_debug_frame") },
        m.debug_frame.len(),
        m.debug_frame_section_load_offset,
        if m.synthesized_debug_frame_hdr.is_empty() {
            "NULL".into()
        } else {
            format!("{prefix}_synth_dfh")
        },
        m.synthesized_debug_frame_hdr.len(),
        m.sections.len(),
    );
    s
}

/// Emit the full `stap-symbols.h` contents: every resolved module's
/// record, the `_stp_modules[]` index, the count, and the trampoline
/// scalar. Modules that failed to resolve are listed in
/// `undone` instead of getting a record.
#[must_use]
pub fn emit_header(modules: &[ModuleRecord], undone: &[String]) -> String {
    let mut s = String::from("/* generated by tapgen; do not edit */\n#pragma once\n\n");
    for (i, m) in modules.iter().enumerate() {
        s.push_str(&emit_module_record(i, m));
        s.push('\n');
    }
    let _ = writeln!(
        s,
        "struct _stp_module *_stp_modules[] = {{ {} }};",
        (0..modules.len()).map(|i| format!("&_stp_module_{i}")).collect::<Vec<_>>().join(", ")
    );
    let _ = writeln!(s, "unsigned _stp_num_modules = {};", modules.len());
    let trampoline =
        modules.iter().find_map(|m| m.kretprobe_trampoline).map(|a| a as i64).unwrap_or(-1);
    let _ = writeln!(s, "int64_t _stp_kretprobe_trampoline = {trampoline};");
    for u in undone {
        let _ = writeln!(s, "/* undone: {u} could not be resolved */");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_one_record_per_resolved_module_and_lists_the_rest() {
        let modules = vec![ModuleRecord { name: "kernel".into(), ..Default::default() }];
        let out = emit_header(&modules, &["nf_conntrack".into()]);
        assert!(out.contains("_stp_module_0"));
        assert!(out.contains("_stp_num_modules = 1"));
        assert!(out.contains("undone: nf_conntrack"));
    }

    #[test]
    fn trampoline_defaults_to_minus_one() {
        let out = emit_header(&[], &[]);
        assert!(out.contains("_stp_kretprobe_trampoline = -1;"));
    }
}
