//! Per-binary debug-info context: owns the DWARF/ELF handles and every
//! lazily-populated cache the adapter's other operations consult.
//!
//! Every cache here is keyed by a plain offset
//! (`gimli::UnitOffset`/`DebugInfoOffset`) or by index into `self.units`,
//! and DIEs are re-looked-up from their unit on demand rather than held
//! as long-lived references — there is nothing to free but the context
//! itself.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use gimli::{EndianRcSlice, RunTimeEndian};
use object::{Object, ObjectSection};

use crate::error::DwarfError;

pub type R = EndianRcSlice<RunTimeEndian>;

/// A single compilation unit, parsed once and kept by value (its header
/// plus abbreviations are cheap; the entry tree is walked fresh for each
/// query rather than materialized into a Rust tree).
pub struct CompUnit {
    pub header: gimli::UnitHeader<R>,
    pub unit: gimli::Unit<R>,
}

/// One opened binary: a kernel image, kernel module, shared library, or
/// executable.
pub struct Module {
    pub name: String,
    pub path: PathBuf,
    pub object_data: Rc<[u8]>,
    pub dwarf: gimli::Dwarf<R>,
    pub units: Vec<CompUnit>,
    /// CU index -> name -> function DIE offset (multimap: a name can
    /// have several DIEs, e.g. a declaration and a definition).
    pub functions_by_name: HashMap<usize, HashMap<String, Vec<gimli::UnitOffset>>>,
    /// CU index -> inline-origin address -> inline-instance DIE offsets.
    pub inlines_by_origin: HashMap<usize, HashMap<u64, Vec<gimli::UnitOffset>>>,
    /// CU index -> DIE offset -> parent DIE offset, for scope walks that
    /// must not cross inline boundaries.
    pub parent_of: HashMap<usize, HashMap<gimli::UnitOffset, gimli::UnitOffset>>,
    /// Per-CU "global alias" cache: `{qualifier}name -> DIE offset`, used
    /// to bind forward declarations to their defining DIE, possibly in a
    /// different CU.
    pub global_aliases: HashMap<String, (usize, gimli::UnitOffset)>,
    /// Type-unit CUs already merged into this module's `units`.
    pub merged_type_units: std::collections::HashSet<u64>,
}

impl Module {
    fn open(path: &Path, name: String) -> Result<Self, DwarfError> {
        let data = fs::read(path)
            .map_err(|source| DwarfError::Io { path: path.display().to_string(), source })?;
        let object_data: Rc<[u8]> = Rc::from(data.into_boxed_slice());
        let obj = object::File::parse(&*object_data)
            .map_err(|source| DwarfError::Open { path: path.display().to_string(), source })?;
        let endian = if obj.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

        let load_section = |id: gimli::SectionId| -> Result<R, DwarfError> {
            let data: Rc<[u8]> = match obj.section_by_name(id.name()) {
                Some(section) => match section.uncompressed_data() {
                    Ok(data) => Rc::from(data.into_owned().into_boxed_slice()),
                    Err(_) => Rc::from(Vec::new().into_boxed_slice()),
                },
                None => Rc::from(Vec::new().into_boxed_slice()),
            };
            Ok(EndianRcSlice::new(data, endian))
        };
        let dwarf = gimli::Dwarf::load(load_section)?;

        let mut units = Vec::new();
        let mut headers = dwarf.units();
        while let Some(header) = headers.next().map_err(|source| DwarfError::Gimli {
            path: path.display().to_string(),
            source,
        })? {
            let unit = dwarf.unit(header.clone()).map_err(|source| DwarfError::Gimli {
                path: path.display().to_string(),
                source,
            })?;
            units.push(CompUnit { header, unit });
        }

        Ok(Self {
            name,
            path: path.to_owned(),
            object_data,
            dwarf,
            units,
            functions_by_name: HashMap::new(),
            inlines_by_origin: HashMap::new(),
            parent_of: HashMap::new(),
            global_aliases: HashMap::new(),
            merged_type_units: std::collections::HashSet::new(),
        })
    }
}

/// A predicate used to select which kernel modules an "open by set of
/// names" request actually wants. A name may be an exact
/// match or a wildcard pattern; basename `,`/`-` are collapsed to `_`
/// before comparing, matching how the kernel itself normalizes module
/// names.
#[derive(Debug, Clone)]
pub struct ModuleFilter {
    wanted: Vec<String>,
    seen: std::collections::HashSet<String>,
}

impl ModuleFilter {
    #[must_use]
    pub fn new(wanted: impl IntoIterator<Item = String>) -> Self {
        Self { wanted: wanted.into_iter().collect(), seen: std::collections::HashSet::new() }
    }

    #[must_use]
    pub fn normalize(basename: &str) -> String {
        basename.chars().map(|c| if c == ',' || c == '-' { '_' } else { c }).collect()
    }

    /// Record a module name as having been offered by the loader, and
    /// say whether it matches one of the wanted names/patterns.
    pub fn accept(&mut self, basename: &str) -> bool {
        let norm = Self::normalize(basename);
        for w in &self.wanted {
            let matched = if w.contains('*') || w.contains('?') {
                glob_match(w, &norm)
            } else {
                Self::normalize(w) == norm
            };
            if matched {
                self.seen.insert(w.clone());
                return true;
            }
        }
        false
    }

    /// True once every requested name has been seen at least once; the
    /// module-iteration loop stops as soon as this flips.
    #[must_use]
    pub fn satisfied(&self) -> bool {
        !self.wanted.is_empty() && self.wanted.iter().all(|w| self.seen.contains(w))
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => inner(&p[1..], t) || (!t.is_empty() && inner(p, &t[1..])),
            (Some(b'?'), Some(_)) => inner(&p[1..], &t[1..]),
            (Some(&pc), Some(&tc)) if pc == tc => inner(&p[1..], &t[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}

/// The adapter's top-level handle: either the running kernel (itself
/// plus whichever of its modules were requested) or a single user
/// binary.
pub struct DebugInfo {
    pub modules: Vec<Module>,
}

impl DebugInfo {
    /// Open a single user binary (executable or shared library).
    pub fn open_user(path: &Path) -> Result<Self, DwarfError> {
        let name = path.file_name().map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self { modules: vec![Module::open(path, name)?] })
    }

    /// Open the kernel image plus every offline module matching `filter`
    /// under `module_dir`.
    pub fn open_kernel(
        vmlinux: &Path,
        module_dir: &Path,
        mut filter: ModuleFilter,
    ) -> Result<Self, DwarfError> {
        let mut modules = vec![Module::open(vmlinux, "kernel".to_owned())?];
        if filter.wanted.is_empty() {
            return Ok(Self { modules });
        }
        let entries = fs::read_dir(module_dir)
            .map_err(|source| DwarfError::Io { path: module_dir.display().to_string(), source })?;
        for entry in entries.flatten() {
            if filter.satisfied() {
                break;
            }
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            if filter.accept(stem) {
                modules.push(Module::open(&path, stem.to_owned())?);
            }
        }
        Ok(Self { modules })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_collapses_separators_before_matching() {
        let mut f = ModuleFilter::new(["ext4".to_owned()]);
        assert!(f.accept("ext4"));
        assert!(f.satisfied());

        let mut f2 = ModuleFilter::new(["nf-conntrack".to_owned()]);
        assert!(f2.accept("nf_conntrack"));
    }

    #[test]
    fn wildcard_pattern_matches_basename() {
        let mut f = ModuleFilter::new(["nf_*".to_owned()]);
        assert!(f.accept("nf_conntrack"));
        assert!(!ModuleFilter::new(["nf_*".to_owned()]).accept("ext4"));
    }

    #[test]
    fn satisfied_stops_as_soon_as_every_name_seen() {
        let mut f = ModuleFilter::new(["a".to_owned(), "b".to_owned()]);
        assert!(!f.satisfied());
        f.accept("a");
        assert!(!f.satisfied());
        f.accept("b");
        assert!(f.satisfied());
    }
}
