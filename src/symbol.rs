//! String interning for identifiers (global/local names, probe-point
//! tokens, module names): a plain process-wide interner caching symbol
//! lookups behind a thread-local map, since translation is a one-shot
//! batch job with no need for scoped or reclaimable interning.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

thread_local! {
    static INTERNER: RefCell<Interner> = RefCell::new(Interner::default());
}

#[derive(Default)]
struct Interner {
    map: HashMap<Rc<str>, Symbol>,
    strings: Vec<Rc<str>>,
}

/// An interned string. Cheap to copy and compare; the backing bytes live
/// for the lifetime of the process (translation is a one-shot batch job,
/// so there is no need to reclaim interner space mid-run).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    #[must_use]
    pub fn as_str(self) -> Rc<str> {
        INTERNER.with(|i| i.borrow().strings[self.0 as usize].clone())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Intern `s`, returning the symbol that canonically represents it.
#[must_use]
pub fn intern(s: &str) -> Symbol {
    INTERNER.with(|i| {
        let mut i = i.borrow_mut();
        if let Some(&sym) = i.map.get(s) {
            return sym;
        }
        let rc: Rc<str> = Rc::from(s);
        let sym = Symbol(u32::try_from(i.strings.len()).expect("more than u32::MAX symbols"));
        i.strings.push(rc.clone());
        i.map.insert(rc, sym);
        sym
    })
}

/// Build a dense `symbol -> T` lookup table out of `(str, T)` pairs: used
/// to bind e.g. blacklisted function names to their reasons without a
/// hash lookup on the common "not blacklisted" path.
#[must_use]
pub fn init_dense_symbol_map<T: Copy>(pairs: &[(Symbol, T)]) -> Box<[Option<T>]> {
    let len = pairs.iter().map(|(s, _)| s.0 as usize + 1).max().unwrap_or(0);
    let mut out = vec![None; len].into_boxed_slice();
    for &(s, v) in pairs {
        out[s.0 as usize] = Some(v);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable_and_deduplicates() {
        let a = intern("s_foo");
        let b = intern("s_foo");
        let c = intern("s_bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(&*a.as_str(), "s_foo");
    }
}
