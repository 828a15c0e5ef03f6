//! The action-count budget: `MAXACTION` decrements once per
//! statement and once per loop iteration, with a `goto out` on exhaustion.
//! The runtime error strings baked into the generated module live here too, next to the one thing that
//! triggers them most often.

use crate::emit::EmitCtx;
use crate::error::Result;
use crate::ir::expr::{COp, CExpr};
use crate::ir::stmt::CStmt;
use crate::types::ast::Stmt;

/// Per-function/probe compile-time budget bookkeeping. Currently just a
/// statement counter used to give each charge site a stable comment; the
/// actual enforcement is the generated `if (--c->actioncount <= 0) goto out;`
/// check emitted at every charge site.
pub struct Budget {
    sites: u32,
}

impl Budget {
    #[must_use]
    pub fn new() -> Self {
        Self { sites: 0 }
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::new()
    }
}

/// The runtime error strings the emitted module reports at `insmod`/probe
/// time. These never surface as Rust `Result`s; they are C
/// string literals baked into the generated source. [`error_stmt`] is the
/// only place that builds the `c->last_error = ...; goto out;` statement
/// pattern, so this list stays the actual source of truth for what the
/// generated module can report rather than a reference doc nobody reads.
pub const RUNTIME_ERRORS: &[&str] = &[
    "MAXACTION exceeded",
    "MAXNESTING exceeded",
    "division by zero",
    "array overflow, check MAXMAPENTRIES",
    "aggregation overflow",
    "empty aggregate",
    "histogram index out of range",
];

/// The one statement-level runtime-error shape every guard in the emitter
/// uses: set `c->last_error` and jump to the function's shared `out:`
/// label. `msg` may carry a dynamic suffix (e.g. a resolved `MAXMAPENTRIES`
/// value) as long as it starts with one of [`RUNTIME_ERRORS`].
#[must_use]
pub fn error_stmt(msg: impl Into<String>) -> CStmt {
    let msg = msg.into();
    debug_assert!(
        RUNTIME_ERRORS.iter().any(|known| msg.starts_with(known)),
        "runtime error string not in RUNTIME_ERRORS: {msg}"
    );
    CStmt::Block(vec![
        CStmt::Raw(format!("c->last_error = \"{msg}\";")),
        CStmt::Goto("out".into()),
    ])
}

fn charge(ctx: &mut EmitCtx<'_>) -> CStmt {
    ctx.budget.sites += 1;
    CStmt::If {
        cond: CExpr::bin(
            COp::Le,
            CExpr::call("_stp_dec_actioncount", vec![crate::emit::context::field("actioncount")]),
            CExpr::IntLit(0),
        ),
        then_branch: Box::new(error_stmt("MAXACTION exceeded")),
        else_branch: None,
    }
}

/// One charge per statement.
pub fn charge_stmt(ctx: &mut EmitCtx<'_>, _stmt: &Stmt) -> Result<CStmt> {
    Ok(charge(ctx))
}

/// One extra charge per loop iteration, on top of the charges the loop
/// body's own statements already incur.
pub fn charge_iteration(ctx: &mut EmitCtx<'_>) -> CStmt {
    charge(ctx)
}
