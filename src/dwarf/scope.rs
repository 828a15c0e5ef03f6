//! Prologue resolution and scope walking.

use gimli::DebuggingInformationEntry;

use crate::dwarf::context::{CompUnit, R};
use crate::dwarf::iter::FunctionDie;
use crate::error::DwarfError;

/// Find the prologue end of `func`: the earliest line-table row whose
/// `(file, line)` differs from the declaration's, bounded above by the
/// function's high-PC. Synthetic (compiler-inserted) rows are skipped;
/// if the search runs off the end of the table, the last in-range row is
/// used instead (a tail-call-shaped function has no "body" row at all).
pub fn prologue_end(
    cu: &CompUnit,
    func: &FunctionDie,
    decl_file: u64,
    decl_line: u32,
) -> Result<Option<u64>, DwarfError> {
    let (Some(low), Some(high)) = (func.low_pc, func.high_pc) else { return Ok(None) };
    let Some(program) = cu.unit.line_program.clone() else { return Ok(None) };

    let mut rows = program.rows();
    let mut last_in_range = None;
    while let Some((_, row)) = rows.next_row()? {
        if row.address() < low || row.address() >= high {
            continue;
        }
        if row.end_sequence() {
            continue;
        }
        last_in_range = Some(row.address());
        let file = row.file_index();
        let line = row.line().map_or(0, u32::from);
        let is_synthetic = line == 0;
        if is_synthetic {
            continue;
        }
        if file != decl_file || line != decl_line {
            return Ok(Some(row.address()));
        }
    }
    Ok(last_in_range)
}

/// Walk cached parent pointers from `die` up to the root, following
/// `DW_AT_abstract_origin` exactly once when an inlined subroutine is
/// reached, so the lookup continues in the physical tree rather than the
/// abstract-instance tree.
pub fn getscopes(
    cu: &CompUnit,
    parent_of: &std::collections::HashMap<gimli::UnitOffset, gimli::UnitOffset>,
    mut die: gimli::UnitOffset,
) -> Result<Vec<gimli::UnitOffset>, DwarfError> {
    let mut scopes = vec![die];
    let mut followed_origin = false;
    loop {
        if !followed_origin {
            let entry = cu.unit.entry(die)?;
            if entry.tag() == gimli::DW_TAG_inlined_subroutine {
                if let Some(gimli::AttributeValue::UnitRef(origin)) =
                    entry.attr_value(gimli::DW_AT_abstract_origin)?
                {
                    followed_origin = true;
                    scopes.push(origin);
                    die = origin;
                    continue;
                }
            }
        }
        match parent_of.get(&die) {
            Some(&parent) => {
                scopes.push(parent);
                die = parent;
            }
            None => break,
        }
    }
    Ok(scopes)
}

/// Variable resolution: given a scope chain, a name, find the
/// declaring DIE. If the DIE has `DW_AT_external` set but neither
/// `DW_AT_location` nor `DW_AT_const_value` — a known compiler bug — a
/// sibling DIE with the same name and a usable location is searched for
/// instead.
pub fn resolve_variable(
    cu: &CompUnit,
    scopes: &[gimli::UnitOffset],
    name: &str,
    name_of: impl Fn(&DebuggingInformationEntry<R>) -> Result<Option<String>, DwarfError>,
) -> Result<Option<gimli::UnitOffset>, DwarfError> {
    for &scope in scopes {
        let scope_entry = cu.unit.entry(scope)?;
        let mut children = cu.unit.entries_at_offset(scope)?;
        let depth0 = children.next_dfs()?.map(|(d, _)| d).unwrap_or(0);
        while let Some((delta, entry)) = children.next_dfs()? {
            if delta <= 0 && entry.offset() != scope_entry.offset() {
                // left the scope's direct children
                break;
            }
            if !matches!(entry.tag(), gimli::DW_TAG_variable | gimli::DW_TAG_formal_parameter) {
                continue;
            }
            if name_of(entry)?.as_deref() != Some(name) {
                continue;
            }
            if has_usable_location(entry)? {
                return Ok(Some(entry.offset()));
            }
            if is_external_without_location(entry)? {
                if let Some(dupe) = find_sibling_with_location(cu, scope, name, &name_of)? {
                    return Ok(Some(dupe));
                }
            }
        }
        let _ = depth0;
    }
    Ok(None)
}

fn has_usable_location(entry: &DebuggingInformationEntry<R>) -> Result<bool, DwarfError> {
    Ok(entry.attr_value(gimli::DW_AT_location)?.is_some()
        || entry.attr_value(gimli::DW_AT_const_value)?.is_some())
}

fn is_external_without_location(entry: &DebuggingInformationEntry<R>) -> Result<bool, DwarfError> {
    let external = matches!(
        entry.attr_value(gimli::DW_AT_external)?,
        Some(gimli::AttributeValue::Flag(true))
    );
    Ok(external && !has_usable_location(entry)?)
}

fn find_sibling_with_location(
    cu: &CompUnit,
    scope: gimli::UnitOffset,
    name: &str,
    name_of: &impl Fn(&DebuggingInformationEntry<R>) -> Result<Option<String>, DwarfError>,
) -> Result<Option<gimli::UnitOffset>, DwarfError> {
    let mut entries = cu.unit.entries_at_offset(scope)?;
    while let Some((_, entry)) = entries.next_dfs()? {
        if !matches!(entry.tag(), gimli::DW_TAG_variable | gimli::DW_TAG_formal_parameter) {
            continue;
        }
        if name_of(entry)?.as_deref() == Some(name) && has_usable_location(entry)? {
            return Ok(Some(entry.offset()));
        }
    }
    Ok(None)
}

/// Walk outward from a variable's scope chain to find the enclosing
/// subprogram/inlined-subroutine that carries a frame-base attribute.
/// For an inlined subprogram, its physical-tree scopes are used instead.
pub fn frame_base_scope(
    cu: &CompUnit,
    scopes: &[gimli::UnitOffset],
) -> Result<Option<gimli::UnitOffset>, DwarfError> {
    for &off in scopes {
        let entry = cu.unit.entry(off)?;
        if matches!(entry.tag(), gimli::DW_TAG_subprogram | gimli::DW_TAG_inlined_subroutine)
            && entry.attr_value(gimli::DW_AT_frame_base)?.is_some()
        {
            return Ok(Some(off));
        }
    }
    Ok(None)
}
