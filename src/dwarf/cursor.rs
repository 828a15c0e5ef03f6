//! The adapter's three-cursor focus model: current module,
//! current CU, current function. Changing a cursor resets every cursor
//! below it, and all per-CU caches in `context::Module` are keyed by CU
//! index rather than by the cursor itself, so resetting a cursor never
//! invalidates a cache entry another cursor position still needs.

#[derive(Debug, Clone, Copy, Default)]
pub struct Focus {
    module: Option<usize>,
    cu: Option<usize>,
    function: Option<gimli::UnitOffset>,
}

impl Focus {
    #[must_use]
    pub fn module(self) -> Option<usize> {
        self.module
    }

    #[must_use]
    pub fn cu(self) -> Option<usize> {
        self.cu
    }

    #[must_use]
    pub fn function(self) -> Option<gimli::UnitOffset> {
        self.function
    }

    /// Refocus on a module, resetting the CU and function cursors below it.
    pub fn set_module(&mut self, idx: usize) {
        self.module = Some(idx);
        self.cu = None;
        self.function = None;
    }

    /// Refocus on a CU within the current module, resetting the function
    /// cursor.
    pub fn set_cu(&mut self, idx: usize) {
        self.cu = Some(idx);
        self.function = None;
    }

    pub fn set_function(&mut self, off: gimli::UnitOffset) {
        self.function = Some(off);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changing_module_resets_cu_and_function() {
        let mut f = Focus::default();
        f.set_module(0);
        f.set_cu(1);
        f.set_function(gimli::UnitOffset(2));
        assert!(f.function().is_some());
        f.set_module(0);
        assert!(f.cu().is_none());
        assert!(f.function().is_none());
    }
}
