//! The per-CPU context struct: one `struct context` holding
//! `errorcount`, `nesting`, `last_stmt`, per-function/per-probe locals
//! overlaid via the planner's anonymous unions, and the lock-skip
//! counters.

use crate::ir::expr::CExpr;
use crate::ir::stmt::CStmt;
use crate::plan::ScopeUnion;
use crate::types::session::Session;

/// Emit the `struct context { ... }` declaration for one function/probe,
/// given its already-built plan tree. Unions with nothing reserved in them
/// are skipped entirely.
#[must_use]
pub fn emit_context_struct(name: &str, root: &ScopeUnion) -> CStmt {
    let mut fields = vec![
        CStmt::Decl { ty: "unsigned".into(), name: "errorcount".into(), init: None },
        CStmt::Decl { ty: "unsigned".into(), name: "nesting".into(), init: None },
        CStmt::Decl { ty: "const char*".into(), name: "last_stmt".into(), init: None },
        CStmt::Decl { ty: "unsigned".into(), name: "actioncount".into(), init: None },
    ];
    if !root.is_empty_recursive() {
        fields.push(emit_union(root));
    }
    CStmt::Block(vec![
        CStmt::Raw(format!("struct {} {{", struct_name(name))),
        CStmt::Block(fields),
        CStmt::Raw("};".into()),
    ])
}

fn emit_union(scope: &ScopeUnion) -> CStmt {
    let mut members: Vec<CStmt> = scope
        .slots
        .iter()
        .map(|s| CStmt::Decl { ty: s.c_type.into(), name: s.name.clone(), init: None })
        .collect();
    for (i, child) in scope.children.iter().enumerate() {
        if !child.is_empty_recursive() {
            let inner = emit_union(child);
            members.push(CStmt::Raw(format!("struct {{ /* child {i} */")));
            members.push(inner);
            members.push(CStmt::Raw("};".into()));
        }
    }
    CStmt::Block(vec![
        CStmt::Raw("union {".into()),
        CStmt::Block(members),
        CStmt::Raw("};".into()),
    ])
}

/// `c->errorcount`, `c->nesting`, etc: the context-field access pattern
/// every lowering function threads through.
#[must_use]
pub fn field(name: &str) -> CExpr {
    CExpr::ident("c").arrow(name)
}

/// Checked after `c->nesting` has already been incremented for the
/// function/probe being entered, so that every exit path (this guard, the
/// budget guard, a division guard, a plain `return`) lands on the same
/// shared `out:` label with exactly one decrement balancing exactly one
/// increment.
#[must_use]
pub fn nesting_guard(max_nesting: u32) -> CStmt {
    CStmt::If {
        cond: CExpr::bin(
            crate::ir::expr::COp::Gt,
            field("nesting"),
            CExpr::IntLit(i64::from(max_nesting)),
        ),
        then_branch: Box::new(crate::emit::budget::error_stmt("MAXNESTING exceeded")),
        else_branch: None,
    }
}

/// The `struct context_<tag>` tag for one function/probe's per-CPU
/// context, matching the tag [`emit_context_struct`] was built with.
#[must_use]
pub fn struct_name(tag: &str) -> String {
    format!("context_{tag}")
}

#[must_use]
pub fn session_max_nesting(session: &Session) -> u32 {
    session.max_nesting
}
