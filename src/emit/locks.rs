//! Per-probe global lock-set computation.
//!
//! Globals are locked in declaration order to avoid deadlock across
//! probes that touch an overlapping subset in different orders; a probe
//! that would block instead skips the attempt and bumps a per-global skip
//! counter, reported at module exit.

use std::collections::BTreeMap;

use hashbrown::HashMap;

use crate::ir::expr::CExpr;
use crate::ir::stmt::CStmt;
use crate::types::ast::{
    AssignOp, DerivedProbe, Expr, ExprKind, LValue, LockNeeds, Stmt, StmtKind, VarId,
};
use crate::types::session::Session;
use crate::types::Idx;

/// Walk a probe body and compute which globals it touches and how.
/// `<<<` (stats insert) counts as a read of the stats map's own lock
/// (the aggregate itself does finer-grained per-CPU locking); any other
/// assignment operator, `++`/`--`, or `delete` counts as a write.
#[must_use]
pub fn probe_lock_needs(probe: &DerivedProbe) -> BTreeMap<VarId, LockNeeds> {
    let mut needs = BTreeMap::new();
    walk_block(&probe.body, &mut needs);
    needs
}

fn walk_block(block: &crate::types::ast::Block, needs: &mut BTreeMap<VarId, LockNeeds>) {
    for stmt in &block.stmts {
        walk_stmt(stmt, needs);
    }
}

fn walk_stmt(stmt: &Stmt, needs: &mut BTreeMap<VarId, LockNeeds>) {
    match &stmt.kind {
        StmtKind::Block(b) => walk_block(b, needs),
        StmtKind::Try { body, catch_body, .. } => {
            walk_block(body, needs);
            walk_block(catch_body, needs);
        }
        StmtKind::ExprStmt(e) => walk_expr(e, needs),
        StmtKind::If { cond, then_branch, else_branch } => {
            walk_expr(cond, needs);
            walk_block(then_branch, needs);
            if let Some(e) = else_branch {
                walk_block(e, needs);
            }
        }
        StmtKind::For { init, cond, step, body } => {
            if let Some(s) = init {
                walk_stmt(s, needs);
            }
            if let Some(c) = cond {
                walk_expr(c, needs);
            }
            if let Some(s) = step {
                walk_stmt(s, needs);
            }
            walk_block(body, needs);
        }
        StmtKind::Foreach(f) => {
            mark(needs, f.array, LockNeeds::READ);
            if let Some(limit) = &f.limit {
                walk_expr(limit, needs);
            }
            walk_block(&f.body, needs);
        }
        StmtKind::Return(Some(e)) => walk_expr(e, needs),
        StmtKind::Delete(lv) => mark_lvalue(needs, lv, LockNeeds::WRITE),
        StmtKind::Return(None)
        | StmtKind::Next
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Null
        | StmtKind::EmbeddedC(_) => {}
    }
}

fn mark(needs: &mut BTreeMap<VarId, LockNeeds>, id: VarId, kind: LockNeeds) {
    needs.entry(id).or_insert(LockNeeds::empty()).insert(kind);
}

fn mark_lvalue(needs: &mut BTreeMap<VarId, LockNeeds>, lv: &LValue, kind: LockNeeds) {
    match lv {
        LValue::Var(id) => mark(needs, *id, kind),
        LValue::ArrayElem { array, indices } => {
            mark(needs, *array, kind);
            for i in indices {
                walk_expr(i, needs);
            }
        }
    }
}

fn walk_expr(e: &Expr, needs: &mut BTreeMap<VarId, LockNeeds>) {
    match &e.kind {
        ExprKind::Symbol(id) => mark(needs, *id, LockNeeds::READ),
        ExprKind::ArrayIndex { array, indices } => {
            mark(needs, *array, LockNeeds::READ);
            for i in indices {
                walk_expr(i, needs);
            }
        }
        ExprKind::Unary(_, a) | ExprKind::StatOp(_, a) | ExprKind::HistOp(_, a) => {
            walk_expr(a, needs);
        }
        ExprKind::Binary(_, a, b)
        | ExprKind::Logical(_, a, b)
        | ExprKind::Compare(_, a, b)
        | ExprKind::Concat(a, b) => {
            walk_expr(a, needs);
            walk_expr(b, needs);
        }
        ExprKind::Ternary(a, b, c) => {
            walk_expr(a, needs);
            walk_expr(b, needs);
            walk_expr(c, needs);
        }
        ExprKind::Call { args, .. } => {
            for a in args {
                walk_expr(a, needs);
            }
        }
        ExprKind::PrintFormat(pf) => {
            for a in &pf.args {
                walk_expr(a, needs);
            }
        }
        ExprKind::IncDec(_, lv) => mark_lvalue(needs, lv, LockNeeds::WRITE),
        ExprKind::Assign { op, lhs, rhs } => {
            walk_expr(rhs, needs);
            let kind = if matches!(op, AssignOp::StatsInsert) { LockNeeds::READ } else { LockNeeds::WRITE };
            mark_lvalue(needs, lhs, kind);
        }
        ExprKind::LiteralLong(_) | ExprKind::LiteralString(_) | ExprKind::EmbeddedC(_) => {}
    }
}

/// Globals that are only ever written from `begin`/`end` probes don't need
/// locking in the hot path at all:
/// a single-threaded setup/teardown probe can't race anything.
#[must_use]
pub fn is_lock_free_global(var_id: VarId, probes: &[DerivedProbe]) -> bool {
    probes.iter().all(|p| {
        let only_begin_end = p.point.as_str().starts_with("begin") || p.point.as_str().starts_with("end");
        if only_begin_end {
            return true;
        }
        !probe_lock_needs(p).contains_key(&var_id)
    })
}

/// Acquire order for a probe's lock set: declaration order over the
/// session's global list, never the order the probe body happens to
/// mention them in.
#[must_use]
pub fn acquire_order(needs: &BTreeMap<VarId, LockNeeds>, declared: &[VarId]) -> Vec<VarId> {
    declared.iter().copied().filter(|id| needs.contains_key(id)).collect()
}

/// Per-global skip counters, bumped whenever a probe's `trylock` would
/// have blocked and the probe chose to skip rather than wait. Reported
/// at module exit alongside the normal per-probe hit counts.
#[derive(Debug, Default, Clone)]
pub struct SkipReport {
    pub skips_by_global: HashMap<VarId, u64>,
}

impl SkipReport {
    pub fn record_skip(&mut self, id: VarId) {
        *self.skips_by_global.entry(id).or_insert(0) += 1;
    }
}

fn global_name(session: &Session, id: VarId) -> String {
    session.globals.get(id.into_usize()).map_or_else(|| format!("var{}", id.into_usize()), |v| v.name.to_string())
}

fn skip_counter_name(session: &Session, id: VarId) -> String {
    format!("skip_count_{}", global_name(session, id))
}

/// Wrap a probe body with the trylock-or-skip prologue/epilogue for every
/// global it touches, nested innermost-acquired-last so the release order
/// at the end of each scope is exactly the reverse of acquisition — no
/// unwind bookkeeping needed, it falls out of the nesting itself.
///
/// Globals are acquired in declaration order (see [`acquire_order`]); a
/// failed `trylock` bumps that global's skip counter and the whole probe
/// is abandoned for this hit (not just the one global), since a probe
/// holding a partial lock set is never a safe place to keep going.
#[must_use]
pub fn emit_lock_wrapper(session: &Session, needs: &BTreeMap<VarId, LockNeeds>, body: CStmt) -> CStmt {
    let order = acquire_order(needs, &session.globals.iter().map(|v| v.id).collect::<Vec<_>>());
    if order.is_empty() {
        return body;
    }
    let mut wrapped = body;
    for id in order.into_iter().rev() {
        let name = global_name(session, id);
        let write = needs.get(&id).is_some_and(|k| k.contains(LockNeeds::WRITE));
        let lock_fn = if write { "write_trylock" } else { "read_trylock" };
        let unlock_fn = if write { "write_unlock" } else { "read_unlock" };
        let lock_expr = CExpr::call(lock_fn, vec![CExpr::ident(format!("&global_{name}_lock"))]);
        wrapped = CStmt::If {
            cond: lock_expr,
            then_branch: Box::new(CStmt::Block(vec![
                wrapped,
                CStmt::Expr(CExpr::call(unlock_fn, vec![CExpr::ident(format!("&global_{name}_lock"))])),
            ])),
            else_branch: Some(Box::new(CStmt::Expr(CExpr::call(
                "_stp_atomic_inc",
                vec![CExpr::ident(format!("&{}", skip_counter_name(session, id)))],
            )))),
        };
    }
    wrapped
}

/// Compute the union of every probe's lock needs, keyed by global, for the
/// skip counters declared in global storage and read back at module exit.
#[must_use]
pub fn build_skip_report(per_probe_needs: &[BTreeMap<VarId, LockNeeds>]) -> SkipReport {
    let mut report = SkipReport::default();
    for needs in per_probe_needs {
        for id in needs.keys() {
            report.skips_by_global.entry(*id).or_insert(0);
        }
    }
    report
}

/// `atomic_t skip_count_<global>` declarations, one per global any probe
/// might skip locking for, initialized to zero.
#[must_use]
pub fn emit_skip_counters(session: &Session, report: &SkipReport) -> Vec<CStmt> {
    let mut ids: Vec<_> = report.skips_by_global.keys().copied().collect();
    ids.sort_by_key(|id| id.into_usize());
    ids.into_iter()
        .map(|id| CStmt::Decl {
            ty: "atomic_t".into(),
            name: skip_counter_name(session, id),
            init: Some(CExpr::Raw("ATOMIC_INIT(0)".into())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::intern;
    use crate::types::ast::{Block, Privilege, ProbeId, Token, Type};
    use crate::types::Idx;

    fn probe_with(body: Block) -> DerivedProbe {
        DerivedProbe {
            id: ProbeId::from_usize(0),
            name: intern("p"),
            point: intern("kernel.function(\"foo\")"),
            derivation: intern(""),
            locals: vec![],
            body,
            needs_global_locks: true,
            required_privilege: Privilege::empty(),
            tok: Token::synthetic("p"),
        }
    }

    #[test]
    fn stats_insert_only_needs_read_lock() {
        let v = VarId::from_usize(3);
        let lv = LValue::Var(v);
        let rhs = Expr { kind: ExprKind::LiteralLong(1), ty: Type::Long, tok: Token::synthetic("1") };
        let assign_expr = Expr {
            kind: ExprKind::Assign { op: AssignOp::StatsInsert, lhs: Box::new(lv), rhs: Box::new(rhs) },
            ty: Type::Long,
            tok: Token::synthetic("<<<"),
        };
        let body = Block { stmts: vec![Stmt { kind: StmtKind::ExprStmt(assign_expr), tok: Token::synthetic("s") }] };
        let probe = probe_with(body);
        let needs = probe_lock_needs(&probe);
        assert_eq!(needs.get(&v), Some(&LockNeeds::READ));
    }

    #[test]
    fn plain_assign_needs_write_lock() {
        let v = VarId::from_usize(1);
        let lv = LValue::Var(v);
        let rhs = Expr { kind: ExprKind::LiteralLong(1), ty: Type::Long, tok: Token::synthetic("1") };
        let assign_expr = Expr {
            kind: ExprKind::Assign { op: AssignOp::Set, lhs: Box::new(lv), rhs: Box::new(rhs) },
            ty: Type::Long,
            tok: Token::synthetic("="),
        };
        let body = Block { stmts: vec![Stmt { kind: StmtKind::ExprStmt(assign_expr), tok: Token::synthetic("s") }] };
        let probe = probe_with(body);
        let needs = probe_lock_needs(&probe);
        assert_eq!(needs.get(&v), Some(&LockNeeds::WRITE));
    }
}
