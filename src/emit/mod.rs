//! The C emitter: walks the elaborated AST once per
//! function/probe, consuming the planner's [`crate::plan::Plan`] through a
//! [`crate::plan::PlanCursor`], and produces [`crate::ir::stmt::CStmt`]
//! trees the driver hands to [`crate::ir::print::Printer`].

pub mod assign;
pub mod budget;
pub mod context;
pub mod control;
pub mod dedup;
pub mod embedded_c;
pub mod locks;
pub mod module;
pub mod printf;
pub mod timing;
pub mod vars;

use std::collections::BTreeMap;

use crate::error::{Result, TranslateError};
use crate::ir::expr::{COp, CExpr};
use crate::ir::stmt::CStmt;
use crate::plan::{plan_block, PlanCursor};
use crate::types::ast::{Block, DerivedProbe, FunctionDecl, LockNeeds, Stmt, StmtKind, VarId};
use crate::types::session::Session;

/// Everything the per-statement lowering functions need in scope, kept as
/// one struct rather than threading four parameters through every `emit_*`
/// call.
pub struct EmitCtx<'a> {
    pub session: &'a Session,
    pub cursor: PlanCursor<'a>,
    pub budget: budget::Budget,
    /// Statements a lowering function needed to hoist above the
    /// expression it's computing (runtime guards that must `goto out`
    /// can't live inside a C expression). Drained by the enclosing
    /// `emit_stmt` and prepended right before that statement's body.
    pub pending: Vec<CStmt>,
    /// Source of unique names for hoisted temporaries (`__divN`,
    /// `__mapptrN`, ...).
    pub guard_counter: u32,
    /// Every distinct `print`/`printf` format this body compiled a call
    /// to. Collected here rather than at the driver level since lowering
    /// is the only place that sees each `PrintFormat` AST node; drained
    /// by the caller once the body is fully lowered.
    pub printf_sigs: Vec<printf::PrintSig>,
}

impl<'a> EmitCtx<'a> {
    fn new(session: &'a Session, plan: &'a crate::plan::Plan) -> Self {
        Self {
            session,
            cursor: PlanCursor::new(plan),
            budget: budget::Budget::new(),
            pending: Vec::new(),
            guard_counter: 0,
            printf_sigs: Vec::new(),
        }
    }
}

/// Wrap a lowered function/probe body with the nesting-depth bookkeeping
/// every emitted function shares: increment on entry, guard against
/// `MAXNESTING`, run the body, then a single `out:` label (the target of
/// every guard's `goto out` as well as `next`/`return`) followed by the
/// matching decrement. `c->nesting` is therefore unchanged across any
/// call, regardless of which exit path was taken.
fn wrap_nesting(body: CStmt, max_nesting: u32) -> CStmt {
    CStmt::Block(vec![
        CStmt::Expr(CExpr::Assign(
            Box::new(context::field("nesting")),
            Box::new(CExpr::bin(COp::Add, context::field("nesting"), CExpr::IntLit(1))),
        )),
        context::nesting_guard(max_nesting),
        body,
        CStmt::Label("out".into()),
        CStmt::Expr(CExpr::Assign(
            Box::new(context::field("nesting")),
            Box::new(CExpr::bin(COp::Sub, context::field("nesting"), CExpr::IntLit(1))),
        )),
        CStmt::Return(Some(CExpr::IntLit(0))),
    ])
}

/// Lower one function body to a `CStmt` block, consuming temp slots from a
/// freshly built plan. Returns the function's own `struct context_<tag>`
/// declaration alongside the wrapped body, since the two are always
/// emitted together.
pub fn emit_function_body(
    session: &Session,
    func: &FunctionDecl,
) -> Result<(CStmt, CStmt, Vec<printf::PrintSig>)> {
    let plan = plan_block(&func.body);
    let mut ctx = EmitCtx::new(session, &plan);
    let body = emit_block(&mut ctx, &func.body)?;
    let tag = format!("fn_{}", func.name);
    let struct_decl = context::emit_context_struct(&tag, &plan.root);
    Ok((struct_decl, wrap_nesting(body, session.max_nesting), ctx.printf_sigs))
}

/// Lower one probe body the same way, additionally wrapping it with the
/// trylock-or-skip prologue/epilogue for every global the probe's lock
/// analysis (`crate::emit::locks`) found it touches.
pub fn emit_probe_body(
    session: &Session,
    probe: &DerivedProbe,
    lock_needs: &BTreeMap<VarId, LockNeeds>,
) -> Result<(CStmt, CStmt, Vec<printf::PrintSig>)> {
    let plan = plan_block(&probe.body);
    let mut ctx = EmitCtx::new(session, &plan);
    let body = emit_block(&mut ctx, &probe.body)?;
    let locked = locks::emit_lock_wrapper(session, lock_needs, body);
    let timed = timing::wrap_probe_timing(session, probe, locked);
    use crate::types::Idx;
    let tag = format!("probe_{}", probe.id.into_usize());
    let struct_decl = context::emit_context_struct(&tag, &plan.root);
    Ok((struct_decl, wrap_nesting(timed, session.max_nesting), ctx.printf_sigs))
}

pub(crate) fn emit_block(ctx: &mut EmitCtx<'_>, block: &Block) -> Result<CStmt> {
    let mut out = Vec::with_capacity(block.stmts.len());
    for stmt in &block.stmts {
        out.push(emit_stmt(ctx, stmt)?);
    }
    Ok(CStmt::Block(out))
}

pub(crate) fn emit_stmt(ctx: &mut EmitCtx<'_>, stmt: &Stmt) -> Result<CStmt> {
    let charge = budget::charge_stmt(ctx, stmt)?;
    let body = match &stmt.kind {
        StmtKind::Block(b) => {
            ctx.cursor.enter_child();
            let s = emit_block(ctx, b)?;
            ctx.cursor.exit_child();
            s
        }
        StmtKind::Try { body, catch_var, catch_body } => {
            control::emit_try(ctx, body, *catch_var, catch_body)?
        }
        StmtKind::ExprStmt(e) => CStmt::Expr(assign::lower_expr(ctx, e)?),
        StmtKind::If { cond, then_branch, else_branch } => {
            control::emit_if(ctx, cond, then_branch, else_branch.as_ref())?
        }
        StmtKind::For { init, cond, step, body } => {
            control::emit_for(ctx, init.as_deref(), cond.as_ref(), step.as_deref(), body)?
        }
        StmtKind::Foreach(f) => control::emit_foreach(ctx, f)?,
        StmtKind::Return(Some(e)) => CStmt::Return(Some(assign::lower_expr(ctx, e)?)),
        StmtKind::Return(None) => CStmt::Return(None),
        StmtKind::Next => CStmt::Goto("out".into()),
        StmtKind::Break => CStmt::Break,
        StmtKind::Continue => CStmt::Continue,
        StmtKind::Delete(lv) => CStmt::Expr(vars::lower_delete(ctx, lv)?),
        StmtKind::Null => CStmt::Block(vec![]),
        StmtKind::EmbeddedC(sym) => embedded_c::emit(ctx, *sym),
    };
    let hoisted = std::mem::take(&mut ctx.pending);
    let mut out = Vec::with_capacity(hoisted.len() + 2);
    out.push(charge);
    out.extend(hoisted);
    out.push(body);
    Ok(CStmt::Block(out))
}

pub(crate) fn indentation_leak(section: &'static str) -> TranslateError {
    TranslateError::IndentationLeak { section }
}
