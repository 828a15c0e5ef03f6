//! Per-probe hit/cycle counters, gated on `Flags::TIMING`. Printed as a
//! histogram of per-probe timing at module exit (`emit::module::emit_exit`).

use crate::ir::expr::CExpr;
use crate::ir::stmt::CStmt;
use crate::types::ast::DerivedProbe;
use crate::types::session::{Flags, Session};
use crate::types::Idx;

fn hits_array() -> &'static str {
    "stp_probe_hits"
}

fn cycles_array() -> &'static str {
    "stp_probe_cycles"
}

/// `unsigned long stp_probe_hits[NPROBES]; cycles_t stp_probe_cycles[NPROBES];`
/// declared once in global storage when timing is on; absent otherwise so a
/// `-tapgen` build without `-t` carries no per-hit overhead at all.
#[must_use]
pub fn emit_timing_counters(session: &Session, nprobes: usize) -> Vec<CStmt> {
    if !session.flags.contains(Flags::TIMING) {
        return Vec::new();
    }
    vec![
        CStmt::Decl {
            ty: "unsigned long".into(),
            name: format!("{}[{nprobes}]", hits_array()),
            init: None,
        },
        CStmt::Decl {
            ty: "cycles_t".into(),
            name: format!("{}[{nprobes}]", cycles_array()),
            init: None,
        },
    ]
}

/// Wrap a probe body with a cycle-count sample taken before and after, and
/// a hit increment, when timing is enabled. A no-op wrapper otherwise.
#[must_use]
pub fn wrap_probe_timing(session: &Session, probe: &DerivedProbe, body: CStmt) -> CStmt {
    if !session.flags.contains(Flags::TIMING) {
        return body;
    }
    let idx = || CExpr::IntLit(i64::try_from(probe.id.into_usize()).unwrap_or(i64::MAX));
    let hits_cell = CExpr::Index(Box::new(CExpr::ident(hits_array())), Box::new(idx()));
    let cycles_cell = CExpr::Index(Box::new(CExpr::ident(cycles_array())), Box::new(idx()));
    CStmt::Block(vec![
        CStmt::Decl {
            ty: "cycles_t".into(),
            name: "__tsc_start".into(),
            init: Some(CExpr::call("_stp_get_cycles", vec![])),
        },
        body,
        CStmt::Expr(CExpr::call(
            "atomic64_inc",
            vec![CExpr::Unary(crate::ir::expr::CUnOp::AddrOf, Box::new(hits_cell))],
        )),
        CStmt::Expr(CExpr::call(
            "atomic64_add",
            vec![
                CExpr::bin(
                    crate::ir::expr::COp::Sub,
                    CExpr::call("_stp_get_cycles", vec![]),
                    CExpr::ident("__tsc_start"),
                ),
                CExpr::Unary(crate::ir::expr::CUnOp::AddrOf, Box::new(cycles_cell)),
            ],
        )),
    ])
}
