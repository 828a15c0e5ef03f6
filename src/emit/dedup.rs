//! Duplicate-probe elision:
//! probes whose lowered body is byte-identical modulo name collapse to one
//! emitted function, with every other identical probe's exported symbol
//! redirected to it.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::ir::stmt::CStmt;
use crate::types::ast::ProbeId;

/// A probe's dedup key: whether it needs global locks (two probes that
/// differ only in that flag are *not* duplicates, since one may skip
/// locking code the other emits) plus the structural hash of its
/// IR-printed body. Built from the already-lowered `CStmt`, not the
/// source AST, so that AST-level differences erased by lowering (e.g.
/// two syntactically different but identically-compiled format strings)
/// still collapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DupeKey {
    needs_global_locks: bool,
    body_hash: u64,
}

fn hash_stmt(s: &CStmt) -> u64 {
    let mut h = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut h);
    h.finish()
}

#[must_use]
pub fn dupe_key(needs_global_locks: bool, body: &CStmt) -> DupeKey {
    DupeKey { needs_global_locks, body_hash: hash_stmt(body) }
}

/// Group probes by dupe key, returning one canonical `ProbeId` per
/// distinct body and the full list of probes that redirect to it.
#[must_use]
pub fn group_duplicates(bodies: &[(ProbeId, bool, CStmt)]) -> HashMap<DupeKey, Vec<ProbeId>> {
    let mut groups: HashMap<DupeKey, Vec<ProbeId>> = HashMap::new();
    for (id, needs_locks, body) in bodies {
        groups.entry(dupe_key(*needs_locks, body)).or_default().push(*id);
    }
    groups
}

/// For every duplicate group, only the first probe (in body order) gets
/// its own emitted function; the rest alias its exported symbol name —
/// the runtime-visible probe table still lists every derived probe, but
/// duplicate entries point at the same function.
#[must_use]
pub fn canonical_function_name(group: &[ProbeId]) -> String {
    use crate::types::Idx;
    format!("probe_{}", group[0].into_usize())
}

/// A dense bitset, indexed by probe ordinal, marking which probes are the
/// canonical (actually-emitted) member of their dedup group. Used by the
/// driver as a cheap double-emission guard across the probe loop.
#[must_use]
pub fn canonical_mask(groups: &HashMap<DupeKey, Vec<ProbeId>>, total_probes: usize) -> bit_set::BitSet {
    use crate::types::Idx;
    let mut mask = bit_set::BitSet::with_capacity(total_probes);
    for group in groups.values() {
        mask.insert(group[0].into_usize());
    }
    mask
}

/// Context substructs a probe body never references are dead weight in
/// the per-CPU union.
#[must_use]
pub fn elide_dead_substructs(scope: &crate::plan::ScopeUnion) -> crate::plan::ScopeUnion {
    let mut out = scope.clone();
    out.children.retain(|c| !c.is_empty_recursive());
    for child in &mut out.children {
        *child = elide_dead_substructs(child);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expr::CExpr;
    use crate::types::Idx;

    #[test]
    fn identical_bodies_share_one_canonical_function() {
        let body_a = CStmt::Expr(CExpr::IntLit(1));
        let body_b = CStmt::Expr(CExpr::IntLit(1));
        let body_c = CStmt::Expr(CExpr::IntLit(2));
        let bodies = vec![
            (ProbeId::from_usize(0), true, body_a),
            (ProbeId::from_usize(1), true, body_b),
            (ProbeId::from_usize(2), true, body_c),
        ];
        let groups = group_duplicates(&bodies);
        assert_eq!(groups.len(), 2);
        let matching = groups.values().find(|g| g.len() == 2).unwrap();
        assert_eq!(canonical_function_name(matching), "probe_0");
    }

    #[test]
    fn differing_lock_requirement_breaks_the_match() {
        let body = CStmt::Expr(CExpr::IntLit(1));
        let a = dupe_key(true, &body);
        let b = dupe_key(false, &body);
        assert_ne!(a, b);
    }
}
