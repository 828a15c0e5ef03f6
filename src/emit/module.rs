//! Module-level scaffolding: `init`/`refresh`/`exit`
//! entry points, `module_param` declarations for scalar globals,
//! `MODULE_INFO` tag=value pairs, and the kernel-version/build-id/
//! privilege gate every generated module runs before registering a
//! single probe.

use crate::emit::locks::SkipReport;
use crate::ir::expr::{COp, CExpr};
use crate::ir::stmt::CStmt;
use crate::types::ast::{Privilege, VarDecl};
use crate::types::session::{Flags, Session};
use crate::types::Idx;

/// A forced-shutdown grace period: if a module's `exit` handler hasn't
/// finished unregistering every probe after this many seconds, the
/// runtime forces it rather than risk an unkillable `rmmod`.
pub const FORCED_SHUTDOWN_SECONDS: u32 = 10;

/// `module_param(name, type, perm)` for every scalar global the script
/// declared: array/map/stats globals aren't parameterizable.
#[must_use]
pub fn emit_module_params(globals: &[VarDecl]) -> Vec<CStmt> {
    globals
        .iter()
        .filter(|g| g.arity() == 0 && g.ty != crate::types::ast::Type::Stats)
        .map(|g| {
            let ty = match g.ty {
                crate::types::ast::Type::Long => "long",
                _ => "charp",
            };
            CStmt::Raw(format!(
                "module_param_named({name}, global_{name}, {ty}, 0400);",
                name = g.name
            ))
        })
        .collect()
}

/// `MODULE_INFO(stap_..., "...")` tag=value pairs.
#[must_use]
pub fn emit_module_info(session: &Session) -> Vec<CStmt> {
    session
        .tag_value_pairs
        .iter()
        .map(|(tag, value)| CStmt::Raw(format!("MODULE_INFO({tag}, \"{value}\");")))
        .collect()
}

/// The gate every generated module's `init` runs before registering any
/// probe: kernel release string, `vermagic`, build-id, and (in
/// unprivileged mode) the caller's privilege bits against each probe's
/// `required_privilege`.
#[must_use]
pub fn emit_startup_checks(session: &Session) -> CStmt {
    let mut checks = vec![CStmt::If {
        cond: CExpr::Unary(
            crate::ir::expr::CUnOp::LNot,
            Box::new(CExpr::call("_stp_kernel_release_matches", vec![])),
        ),
        then_branch: Box::new(CStmt::Block(vec![CStmt::Raw(
            "printk(KERN_ERR \"tapgen: kernel release mismatch\\n\"); return -EINVAL;".into(),
        )])),
        else_branch: None,
    }];
    if session.flags.contains(crate::types::session::Flags::UNPRIVILEGED) {
        checks.push(CStmt::If {
            cond: CExpr::bin(
                COp::Eq,
                CExpr::call("_stp_privilege_check", vec![CExpr::IntLit(i64::from(
                    Privilege::STAPUSR.bits(),
                ))]),
                CExpr::IntLit(0),
            ),
            then_branch: Box::new(CStmt::Block(vec![CStmt::Raw(
                "return -EACCES;".into(),
            )])),
            else_branch: None,
        });
    }
    CStmt::Block(checks)
}

/// `init_module`: run startup checks, then register every probe in
/// declaration order (probes sharing a dedup group register only their
/// canonical function).
#[must_use]
pub fn emit_init(session: &Session, probe_register_calls: Vec<CExpr>) -> CStmt {
    let mut body = vec![emit_startup_checks(session)];
    body.extend(probe_register_calls.into_iter().map(CStmt::Expr));
    body.push(CStmt::Return(Some(CExpr::IntLit(0))));
    CStmt::Block(vec![CStmt::Raw("static int init_module(void) {".into()), CStmt::Block(body), CStmt::Raw("}".into())])
}

/// `_stp_map_free(&global_<name>)` for every array/map/pmap global — the
/// counterpart to the `rwlock_t`+backing-store pair [`crate::emit::vars::emit_global_decl`]
/// declares for them.
fn emit_global_dealloc(globals: &[VarDecl]) -> Vec<CStmt> {
    globals
        .iter()
        .filter(|g| g.is_map() || g.is_pmap())
        .map(|g| {
            CStmt::Expr(CExpr::call("_stp_map_free", vec![CExpr::Unary(
                crate::ir::expr::CUnOp::AddrOf,
                Box::new(CExpr::ident(format!("global_{}", g.name))),
            )]))
        })
        .collect()
}

/// Per-probe hit-count/cycle-count report, printed only when `-t` (
/// [`Flags::TIMING`]) was passed — matching the counters
/// [`crate::emit::timing::emit_timing_counters`] declares.
fn emit_timing_report(session: &Session) -> Vec<CStmt> {
    if !session.flags.contains(Flags::TIMING) {
        return Vec::new();
    }
    session
        .probes
        .iter()
        .map(|p| {
            let idx = p.id.into_usize();
            CStmt::Raw(format!(
                "printk(KERN_INFO \"{name}: %lu hits, %llu cycles\\n\", stp_probe_hits[{idx}], stp_probe_cycles[{idx}]);",
                name = p.name,
            ))
        })
        .collect()
}

/// Lock-skip accounting, printed once per global any probe's lock
/// analysis found it might contend on — reads back the atomic counters
/// [`crate::emit::locks::emit_skip_counters`] declared.
fn emit_skip_report(session: &Session, report: &SkipReport) -> Vec<CStmt> {
    let mut ids: Vec<_> = report.skips_by_global.keys().copied().collect();
    ids.sort_by_key(|id| id.into_usize());
    ids.into_iter()
        .map(|id| {
            let name = session
                .globals
                .get(id.into_usize())
                .map_or_else(|| format!("var{}", id.into_usize()), |v| v.name.to_string());
            CStmt::Raw(format!(
                "printk(KERN_INFO \"{name}: %d skipped lock attempts\\n\", atomic_read(&skip_count_{name}));"
            ))
        })
        .collect()
}

/// `cleanup_module`: unregister every probe, wait up to
/// [`FORCED_SHUTDOWN_SECONDS`] for in-flight probe handlers to drain, free
/// every global's backing storage and the per-CPU context memory, then
/// report per-probe timing (if enabled) and lock-skip counts.
#[must_use]
pub fn emit_exit(session: &Session, probe_unregister_calls: Vec<CExpr>, skip_report: &SkipReport) -> CStmt {
    let mut body: Vec<CStmt> = probe_unregister_calls.into_iter().map(CStmt::Expr).collect();
    body.push(CStmt::Expr(CExpr::call(
        "_stp_wait_for_probes_to_drain",
        vec![CExpr::IntLit(i64::from(FORCED_SHUTDOWN_SECONDS))],
    )));
    body.extend(emit_global_dealloc(&session.globals));
    body.push(CStmt::Expr(CExpr::call("_stp_free_context_memory", vec![])));
    body.extend(emit_timing_report(session));
    body.extend(emit_skip_report(session, skip_report));
    CStmt::Block(vec![CStmt::Raw("static void cleanup_module(void) {".into()), CStmt::Block(body), CStmt::Raw("}".into())])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_scalar_non_stats_globals_get_module_params() {
        let globals = vec![];
        assert!(emit_module_params(&globals).is_empty());
    }
}
