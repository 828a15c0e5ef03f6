//! The kernel-side probe blacklist.
//!
//! Four compiled regexps gate whether a function/file/section may be
//! probed at all: `function`, `function` for return-probes specifically,
//! `file`, and `section`. `examples/original_source/dwflpp.cxx` pins the
//! section family to a fixed five patterns rather than a generic "usual
//! family" description — `SPEC_FULL` keeps that literal set so the unit
//! tests below can assert against it.

use regex::Regex;

/// Functions known to crash the kernel if probed: notifier chains, lock
/// primitives, page-fault/NMI handlers, paravirt ops, and
/// architecture-specific context-switch internals.
const BLACKLISTED_FUNCTIONS: &[&str] = &[
    "^notifier_call_chain$",
    "^atomic_notifier_call_chain$",
    "^.*_(raw_)?spin_(lock|unlock|trylock)(_irq(save|restore)?)?$",
    "^do_page_fault$",
    "^page_fault$",
    "^do_nmi$",
    "^nmi_handle$",
    "^native_(load|store)_(gdt|idt|tr)$",
    "^__switch_to$",
];

/// Functions additionally blacklisted only for return-probes (the
/// trampoline they'd need to install past is itself unsafe to re-enter).
const BLACKLISTED_RETURN_FUNCTIONS: &[&str] = &["^__switch_to$", "^do_exit$"];

const BLACKLISTED_FILES: &[&str] = &["^kernel/trace/.*$", "^arch/.*/kernel/entry.*\\.S$"];

/// The fixed five section patterns: init/exit text and the exception table, which is
/// walked by the fault handler itself.
const BLACKLISTED_SECTIONS: &[&str] =
    &["\\.init\\.", "\\.exit\\.", "^\\..*init\\.", "^\\..*exit\\.", "__ex_table"];

pub struct Blacklist {
    function: Vec<Regex>,
    return_function: Vec<Regex>,
    file: Vec<Regex>,
    section: Vec<Regex>,
}

impl Blacklist {
    /// # Panics
    /// If the fixed pattern set above fails to compile, which would be a
    /// bug in this module, not a runtime condition.
    #[must_use]
    pub fn new() -> Self {
        let compile = |pats: &[&str]| pats.iter().map(|p| Regex::new(p).unwrap()).collect();
        Self {
            function: compile(BLACKLISTED_FUNCTIONS),
            return_function: compile(BLACKLISTED_RETURN_FUNCTIONS),
            file: compile(BLACKLISTED_FILES),
            section: compile(BLACKLISTED_SECTIONS),
        }
    }

    #[must_use]
    pub fn is_function_blacklisted(&self, name: &str, is_return_probe: bool) -> bool {
        self.function.iter().any(|r| r.is_match(name))
            || (is_return_probe && self.return_function.iter().any(|r| r.is_match(name)))
    }

    #[must_use]
    pub fn is_file_blacklisted(&self, path: &str) -> bool {
        self.file.iter().any(|r| r.is_match(path))
    }

    #[must_use]
    pub fn is_section_blacklisted(&self, section: &str) -> bool {
        self.section.iter().any(|r| r.is_match(section))
    }

    /// Guru mode bypasses every rule in this module.
    #[must_use]
    pub fn allows(&self, name: &str, file: &str, section: &str, is_return_probe: bool, guru: bool) -> bool {
        guru
            || !(self.is_function_blacklisted(name, is_return_probe)
                || self.is_file_blacklisted(file)
                || self.is_section_blacklisted(section))
    }
}

impl Default for Blacklist {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blacklists_switch_to_on_all_archs_regardless_of_guru_absence() {
        let bl = Blacklist::new();
        assert!(bl.is_function_blacklisted("__switch_to", false));
    }

    #[test]
    fn guru_mode_bypasses_every_rule() {
        let bl = Blacklist::new();
        assert!(!bl.allows("__switch_to", "kernel/sched.c", ".text", false, false));
        assert!(bl.allows("__switch_to", "kernel/sched.c", ".text", false, true));
    }

    #[test]
    fn init_exit_sections_are_blacklisted() {
        let bl = Blacklist::new();
        assert!(bl.is_section_blacklisted(".init.text"));
        assert!(bl.is_section_blacklisted(".exit.text"));
        assert!(!bl.is_section_blacklisted(".text"));
    }
}
