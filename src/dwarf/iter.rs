//! Cooperative iteration over modules, CUs, functions, inline instances,
//! labels, and source lines.
//!
//! A single global flag is polled at every iterator boundary; observing
//! it set aborts the current iteration with a dedicated interrupt error.
//! Every cache here is owned by value (no arena to unwind by hand), so
//! aborting just means returning `Err` early — the caller's `DebugInfo`
//! drops normally.

use std::sync::atomic::{AtomicBool, Ordering};

use gimli::DebuggingInformationEntry;

use crate::dwarf::context::{CompUnit, Module, R};
use crate::error::DwarfError;

/// Set by an out-of-band signal handler or UI "stop" button; checked at
/// every iterator boundary in this module.
pub static PENDING_INTERRUPT: AtomicBool = AtomicBool::new(false);

pub fn request_interrupt() {
    PENDING_INTERRUPT.store(true, Ordering::SeqCst);
}

fn check_interrupt() -> Result<(), DwarfError> {
    if PENDING_INTERRUPT.swap(false, Ordering::SeqCst) {
        Err(DwarfError::Interrupted)
    } else {
        Ok(())
    }
}

/// Visit every CU in `module`, stopping early on interrupt or on `f`
/// returning `Err`.
pub fn for_each_cu(
    module: &Module,
    mut f: impl FnMut(usize, &CompUnit) -> Result<(), DwarfError>,
) -> Result<(), DwarfError> {
    for (idx, cu) in module.units.iter().enumerate() {
        check_interrupt()?;
        f(idx, cu)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionDie {
    pub offset: gimli::UnitOffset,
    pub low_pc: Option<u64>,
    pub high_pc: Option<u64>,
    pub name: Option<String>,
}

/// Visit every `DW_TAG_subprogram` DIE in `cu`.
pub fn for_each_function(
    dwarf: &gimli::Dwarf<R>,
    cu: &CompUnit,
    mut f: impl FnMut(&FunctionDie) -> Result<(), DwarfError>,
) -> Result<(), DwarfError> {
    let mut entries = cu.unit.entries();
    while let Some((_, entry)) = entries.next_dfs()? {
        check_interrupt()?;
        if entry.tag() == gimli::DW_TAG_subprogram {
            f(&function_die_of(dwarf, &cu.unit, entry)?)?;
        }
    }
    Ok(())
}

/// Visit every `DW_TAG_inlined_subroutine` instance whose
/// `DW_AT_abstract_origin` resolves to `origin_offset`.
pub fn for_each_inline_instance(
    cu: &CompUnit,
    origin_offset: gimli::UnitOffset,
    mut f: impl FnMut(gimli::UnitOffset) -> Result<(), DwarfError>,
) -> Result<(), DwarfError> {
    let mut entries = cu.unit.entries();
    while let Some((_, entry)) = entries.next_dfs()? {
        check_interrupt()?;
        if entry.tag() != gimli::DW_TAG_inlined_subroutine {
            continue;
        }
        if let Some(origin) = abstract_origin(&cu.unit, entry)? {
            if origin == origin_offset {
                f(entry.offset())?;
            }
        }
    }
    Ok(())
}

/// Visit every `DW_TAG_label` in `cu`.
pub fn for_each_label(
    cu: &CompUnit,
    mut f: impl FnMut(gimli::UnitOffset) -> Result<(), DwarfError>,
) -> Result<(), DwarfError> {
    let mut entries = cu.unit.entries();
    while let Some((_, entry)) = entries.next_dfs()? {
        check_interrupt()?;
        if entry.tag() == gimli::DW_TAG_label {
            f(entry.offset())?;
        }
    }
    Ok(())
}

/// Visit every source-line row in `cu`'s line program, in program order.
pub fn for_each_line(
    dwarf: &gimli::Dwarf<R>,
    cu: &CompUnit,
    mut f: impl FnMut(u64, u32, bool) -> Result<(), DwarfError>,
) -> Result<(), DwarfError> {
    let Some(program) = cu.unit.line_program.clone() else { return Ok(()) };
    let mut rows = program.rows();
    while let Some((_header, row)) = rows.next_row()? {
        check_interrupt()?;
        let line = row.line().map_or(0, |l| u32::from(l));
        f(row.address(), line, row.is_stmt())?;
    }
    let _ = dwarf;
    Ok(())
}

fn abstract_origin(
    unit: &gimli::Unit<R>,
    entry: &DebuggingInformationEntry<R>,
) -> Result<Option<gimli::UnitOffset>, DwarfError> {
    match entry.attr_value(gimli::DW_AT_abstract_origin)? {
        Some(gimli::AttributeValue::UnitRef(off)) => Ok(Some(off)),
        Some(gimli::AttributeValue::DebugInfoRef(off)) => {
            Ok(off.to_unit_offset(&unit.header))
        }
        _ => Ok(None),
    }
}

fn function_die_of(
    dwarf: &gimli::Dwarf<R>,
    unit: &gimli::Unit<R>,
    entry: &DebuggingInformationEntry<R>,
) -> Result<FunctionDie, DwarfError> {
    let low_pc = match entry.attr_value(gimli::DW_AT_low_pc)? {
        Some(gimli::AttributeValue::Addr(a)) => Some(a),
        _ => None,
    };
    let high_pc = match entry.attr_value(gimli::DW_AT_high_pc)? {
        Some(gimli::AttributeValue::Addr(a)) => Some(a),
        Some(gimli::AttributeValue::Udata(off)) => low_pc.map(|l| l + off),
        _ => None,
    };
    let name = match entry.attr_value(gimli::DW_AT_name)? {
        Some(v) => Some(dwarf.attr_string(unit, v)?.to_string_lossy().into_owned()),
        None => None,
    };
    Ok(FunctionDie { offset: entry.offset(), low_pc, high_pc, name })
}
